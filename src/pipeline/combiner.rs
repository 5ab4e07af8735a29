//! Merging partial aggregates into the final result.
//!
//! The combiner is a single deterministic reduction over an unordered
//! collection of partials. Every merge rule is associative and
//! commutative, so the result is independent of chunk boundaries and of
//! the order workers finished in:
//!
//! - additive counters are summed elementwise over the key union;
//! - means come from merged (count, sum) pairs, divided once at the end;
//! - medians come from merged digests, queried once at the end;
//! - percentages are recomputed from the merged totals only;
//! - top-k flows are sorted with an explicit tie-break, never by arrival
//!   order.

use crate::models::{AgeSummary, FinalAggregate, FlowKey, PartialAggregate};
use std::collections::btree_map::Entry;

/// How many travel flows the final aggregate retains.
pub const TOP_FLOW_LIMIT: usize = 10_000;

/// Reduce all partials into one [`FinalAggregate`].
pub fn combine(partials: Vec<PartialAggregate>) -> FinalAggregate {
    let merged = partials
        .into_iter()
        .fold(PartialAggregate::default(), merge_partials);
    finalize(merged)
}

/// Fold `other` into `acc`, field by field.
pub fn merge_partials(mut acc: PartialAggregate, other: PartialAggregate) -> PartialAggregate {
    acc.records += other.records;

    for (key, count) in other.stratum_counts {
        *acc.stratum_counts.entry(key).or_default() += count;
    }

    for (key, stats) in other.age_stats {
        match acc.age_stats.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(stats),
            Entry::Vacant(entry) => {
                entry.insert(stats);
            }
        }
    }

    for (key, count) in other.bracket_counts {
        *acc.bracket_counts.entry(key).or_default() += count;
    }

    acc.dependency.dependents += other.dependency.dependents;
    acc.dependency.working_age += other.dependency.working_age;

    for (key, count) in other.flow_counts {
        *acc.flow_counts.entry(key).or_default() += count;
    }

    for (key, count) in other.pyramid_counts {
        *acc.pyramid_counts.entry(key).or_default() += count;
    }

    acc
}

/// Derive the final values from the fully-merged partial.
fn finalize(merged: PartialAggregate) -> FinalAggregate {
    let total_population: u64 = merged.stratum_counts.values().sum();

    let stratum_percentages = merged
        .stratum_counts
        .iter()
        .map(|(&stratum, &count)| {
            let share = count as f64 * 100.0 / total_population as f64;
            (stratum, round2(share))
        })
        .collect();

    let age_summary = merged
        .age_stats
        .iter()
        .filter_map(|(key, stats)| {
            let mean = stats.mean()?;
            let median = stats.median()?;
            Some((
                key.clone(),
                AgeSummary {
                    count: stats.count,
                    mean,
                    median,
                },
            ))
        })
        .collect();

    let dependency_index = merged.dependency.index();
    let top_flows = top_flows(&merged, TOP_FLOW_LIMIT);

    FinalAggregate {
        total_records: merged.records,
        stratum_counts: merged.stratum_counts,
        stratum_percentages,
        age_summary,
        bracket_counts: merged.bracket_counts,
        dependency: merged.dependency,
        dependency_index,
        flow_counts: merged.flow_counts,
        top_flows,
        pyramid_counts: merged.pyramid_counts,
    }
}

/// Busiest flows: count descending, ties by (origin, destination).
fn top_flows(merged: &PartialAggregate, limit: usize) -> Vec<(FlowKey, u64)> {
    let mut flows: Vec<(FlowKey, u64)> = merged
        .flow_counts
        .iter()
        .map(|(key, &count)| (key.clone(), count))
        .collect();

    flows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    flows.truncate(limit);
    flows
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BracketKey, GroupKey, RawRow};
    use crate::pipeline::aggregator::aggregate_chunk;

    const REFERENCE_YEAR: i32 = 2026;

    fn row(origin: &str, destination: &str, birth: &str, species: &str, gender: &str) -> RawRow {
        RawRow {
            origin: origin.to_string(),
            destination: destination.to_string(),
            birth_date: birth.to_string(),
            species: species.to_string(),
            gender: gender.to_string(),
        }
    }

    fn dataset() -> Vec<RawRow> {
        vec![
            row("28001", "08001", "2016-01-01", "HUMANO", "MACHO"),
            row("28002", "08001", "1986-01-01", "HUMANO", "MACHO"),
            row("28003", "41013", "1996-01-01", "HUMANO", "MACHO"),
            row("08001", "28001", "1956-01-01", "HUMANO", "HEMBRA"),
            row("08002", "28001", "1976-01-01", "ELFO", "HEMBRA"),
            row("08003", "28001", "", "ELFO", "HEMBRA"),
            row("41013", "28001", "1940-01-01", "ELFO", "MACHO"),
            row("41014", "08001", "2011-01-01", "HUMANO", "HEMBRA"),
        ]
    }

    /// Aggregate the dataset split at the given chunk boundaries.
    fn combine_with_boundaries(rows: &[RawRow], boundaries: &[usize]) -> FinalAggregate {
        let mut partials = Vec::new();
        let mut start = 0;
        for &end in boundaries {
            partials.push(aggregate_chunk(rows[start..end].to_vec(), REFERENCE_YEAR));
            start = end;
        }
        partials.push(aggregate_chunk(rows[start..].to_vec(), REFERENCE_YEAR));
        combine(partials)
    }

    fn group(species: &str, gender: &str) -> GroupKey {
        GroupKey {
            species: species.to_string(),
            gender: gender.to_string(),
        }
    }

    #[test]
    fn test_partition_invariance() {
        let rows = dataset();
        let whole = combine_with_boundaries(&rows, &[]);
        let split_a = combine_with_boundaries(&rows, &[3]);
        let split_b = combine_with_boundaries(&rows, &[1, 2, 5, 7]);

        for other in [&split_a, &split_b] {
            assert_eq!(whole.total_records, other.total_records);
            assert_eq!(whole.stratum_counts, other.stratum_counts);
            assert_eq!(whole.stratum_percentages, other.stratum_percentages);
            assert_eq!(whole.bracket_counts, other.bracket_counts);
            assert_eq!(whole.dependency, other.dependency);
            assert_eq!(whole.dependency_index, other.dependency_index);
            assert_eq!(whole.flow_counts, other.flow_counts);
            assert_eq!(whole.top_flows, other.top_flows);
            assert_eq!(whole.pyramid_counts, other.pyramid_counts);
            assert_eq!(whole.age_summary, other.age_summary);
        }
    }

    #[test]
    fn test_merge_is_commutative() {
        let rows = dataset();
        let left = aggregate_chunk(rows[..4].to_vec(), REFERENCE_YEAR);
        let right = aggregate_chunk(rows[4..].to_vec(), REFERENCE_YEAR);

        let ab = finalize(merge_partials(left.clone(), right.clone()));
        let ba = finalize(merge_partials(right, left));

        assert_eq!(ab.stratum_counts, ba.stratum_counts);
        assert_eq!(ab.age_summary, ba.age_summary);
        assert_eq!(ab.top_flows, ba.top_flows);
    }

    #[test]
    fn test_additivity_invariants() {
        let rows = dataset();
        let result = combine_with_boundaries(&rows, &[2, 4]);

        let stratum_total: u64 = result.stratum_counts.values().sum();
        assert_eq!(stratum_total, rows.len() as u64);

        let percentage_total: f64 = result.stratum_percentages.values().sum();
        assert!(
            (percentage_total - 100.0).abs() <= 0.1,
            "percentages sum to {percentage_total}"
        );
    }

    #[test]
    fn test_mean_is_merged_not_concatenated() {
        // Ages 10 and 30 land in different chunks; the global mean must be
        // 20, not either chunk's local mean.
        let rows = vec![
            row("10001", "20001", "2016-01-01", "A", "M"),
            row("10002", "20001", "1996-01-01", "A", "M"),
        ];
        let result = combine_with_boundaries(&rows, &[1]);

        let summary = result.age_summary.get(&group("A", "M")).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, 20.0);
    }

    #[test]
    fn test_median_is_merged_across_chunks() {
        // Ages 10, 40, 70 split so that no chunk holds the global median
        // candidates together.
        let rows = vec![
            row("10001", "20001", "2016-01-01", "A", "M"),
            row("10002", "20001", "1986-01-01", "A", "M"),
            row("10003", "20001", "1956-01-01", "A", "M"),
        ];
        let whole = combine_with_boundaries(&rows, &[]);
        let split = combine_with_boundaries(&rows, &[1, 2]);

        let summary = split.age_summary.get(&group("A", "M")).unwrap();
        assert_eq!(summary.median, 40.0);
        assert_eq!(whole.age_summary, split.age_summary);
    }

    #[test]
    fn test_dependency_index_exact() {
        // Two below 15, one above 64, four working-age.
        let rows = vec![
            row("10001", "20001", "2020-01-01", "A", "M"),
            row("10002", "20001", "2018-01-01", "A", "M"),
            row("10003", "20001", "1950-01-01", "A", "M"),
            row("10004", "20001", "1996-01-01", "A", "M"),
            row("10005", "20001", "1991-01-01", "A", "M"),
            row("10006", "20001", "1986-01-01", "A", "M"),
            row("10007", "20001", "1981-01-01", "A", "M"),
        ];
        let result = combine_with_boundaries(&rows, &[3, 5]);

        assert_eq!(result.dependency.dependents, 3);
        assert_eq!(result.dependency.working_age, 4);
        assert_eq!(result.dependency_index, Some(0.75));
    }

    #[test]
    fn test_dependency_index_undefined_without_working_age() {
        let rows = vec![row("10001", "20001", "2020-01-01", "A", "M")];
        let result = combine_with_boundaries(&rows, &[]);
        assert_eq!(result.dependency_index, None);
    }

    #[test]
    fn test_percentages_recomputed_from_totals() {
        // 3 of stratum '1', 1 of stratum '2' across uneven chunks: the
        // shares must come from the merged totals (75/25), not from any
        // per-chunk share.
        let rows = vec![
            row("10001", "20001", "", "A", "M"),
            row("11001", "20001", "", "A", "M"),
            row("12001", "20001", "", "A", "M"),
            row("20001", "10001", "", "A", "M"),
        ];
        let result = combine_with_boundaries(&rows, &[1]);

        assert_eq!(result.stratum_percentages.get(&'1'), Some(&75.0));
        assert_eq!(result.stratum_percentages.get(&'2'), Some(&25.0));
    }

    #[test]
    fn test_top_flows_tie_break_is_deterministic() {
        // Three flows with identical counts, fed in different chunkings:
        // the order must always be lexicographic by (origin, destination).
        let rows = vec![
            row("30001", "10001", "", "A", "M"),
            row("10001", "30001", "", "A", "M"),
            row("20001", "10001", "", "A", "M"),
        ];
        let forward = combine_with_boundaries(&rows, &[1]);
        let reversed: Vec<RawRow> = rows.iter().rev().cloned().collect();
        let backward = combine_with_boundaries(&reversed, &[2]);

        let order = |result: &FinalAggregate| {
            result
                .top_flows
                .iter()
                .map(|(key, _)| (key.origin.clone(), key.destination.clone()))
                .collect::<Vec<_>>()
        };

        let expected = vec![
            ("10001".to_string(), "30001".to_string()),
            ("20001".to_string(), "10001".to_string()),
            ("30001".to_string(), "10001".to_string()),
        ];
        assert_eq!(order(&forward), expected);
        assert_eq!(order(&backward), expected);
    }

    #[test]
    fn test_top_flows_sorted_and_truncated() {
        let mut partial = PartialAggregate::default();
        for (origin, count) in [("10001", 3u64), ("20001", 7), ("30001", 5)] {
            partial.flow_counts.insert(
                FlowKey {
                    origin: origin.to_string(),
                    destination: "99999".to_string(),
                },
                count,
            );
        }

        let flows = top_flows(&partial, 2);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].1, 7);
        assert_eq!(flows[1].1, 5);
    }

    #[test]
    fn test_combine_empty_input() {
        let result = combine(Vec::new());
        assert_eq!(result.total_records, 0);
        assert!(result.stratum_counts.is_empty());
        assert!(result.top_flows.is_empty());
        assert_eq!(result.dependency_index, None);
    }

    #[test]
    fn test_scenario_from_split_chunks() {
        // Ages {10, 40, 70, null}: mean (A, M) = 25, the age-10 record is
        // a dependent, brackets land as specified, and the null-age record
        // only shows up in the stratum totals.
        let rows = vec![
            row("28001", "08001", "2016-01-01", "A", "M"),
            row("28002", "08001", "1986-01-01", "A", "M"),
            row("08001", "28001", "1956-01-01", "A", "F"),
            row("08002", "28001", "", "A", "F"),
        ];
        let result = combine_with_boundaries(&rows, &[2]);

        let males = result.age_summary.get(&group("A", "M")).unwrap();
        assert_eq!(males.mean, 25.0);

        assert_eq!(result.dependency.dependents, 2);
        assert_eq!(result.dependency.working_age, 1);

        let bracket = |gender: &str, bracket| {
            result
                .bracket_counts
                .get(&BracketKey {
                    species: "A".to_string(),
                    gender: gender.to_string(),
                    bracket,
                })
                .copied()
                .unwrap_or(0)
        };
        assert_eq!(bracket("M", crate::models::AgeBracket::Child), 1);
        assert_eq!(bracket("M", crate::models::AgeBracket::Adult), 1);
        assert_eq!(bracket("F", crate::models::AgeBracket::Senior), 1);

        let stratum_total: u64 = result.stratum_counts.values().sum();
        assert_eq!(stratum_total, 4);
        let age_total: u64 = result.age_summary.values().map(|s| s.count).sum();
        assert_eq!(age_total, 3);
    }
}
