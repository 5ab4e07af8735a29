//! Per-chunk aggregation.
//!
//! One pure function from a chunk of raw rows to a [`PartialAggregate`].
//! Workers run it without coordination: no shared state, no I/O, and no
//! division — ratios are deferred to the combiner, after the full merge.

use crate::models::{
    AgeBracket, AgeStats, BracketKey, FlowKey, GroupKey, PartialAggregate, PyramidKey,
    QuinquennialGroup, RawRow, Record,
};
use std::collections::BTreeMap;

/// Aggregate one chunk into a partial summary.
///
/// Records without a parseable birth date keep contributing to the
/// stratum and flow counts but are excluded from every age-based
/// structure. A chunk with zero valid ages simply produces empty age
/// statistics.
pub fn aggregate_chunk(rows: Vec<RawRow>, reference_year: i32) -> PartialAggregate {
    let mut partial = PartialAggregate::default();
    let mut ages_by_group: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();

    for raw in rows {
        let record = Record::from_raw(raw, reference_year);
        partial.records += 1;

        if let Some(stratum) = record.stratum {
            *partial.stratum_counts.entry(stratum).or_default() += 1;
        }

        *partial
            .flow_counts
            .entry(FlowKey {
                origin: record.origin.clone(),
                destination: record.destination.clone(),
            })
            .or_default() += 1;

        let Some(age) = record.age else {
            continue;
        };

        ages_by_group
            .entry(GroupKey {
                species: record.species.clone(),
                gender: record.gender.clone(),
            })
            .or_default()
            .push(age as f64);

        *partial
            .bracket_counts
            .entry(BracketKey {
                species: record.species.clone(),
                gender: record.gender.clone(),
                bracket: AgeBracket::from_age(age),
            })
            .or_default() += 1;

        partial.dependency.observe(age);

        if let Some(group) = QuinquennialGroup::from_age(age) {
            *partial
                .pyramid_counts
                .entry(PyramidKey {
                    group,
                    gender: record.gender.clone(),
                })
                .or_default() += 1;
        }
    }

    for (group, ages) in ages_by_group {
        partial.age_stats.insert(group, AgeStats::from_ages(ages));
    }

    partial
}
