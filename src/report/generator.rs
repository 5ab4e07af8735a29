//! Text and JSON report generation.
//!
//! Builds a serializable [`Report`] from the final aggregate and renders
//! it in the fixed eight-section order.

use crate::models::{
    AgeRow, BracketRow, FinalAggregate, FlowRow, PyramidRow, Report, ReportMetadata, StratumRow,
};
use anyhow::Result;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::Path;

/// Entries shown in the mean/median/bracket sections.
const TOP_GROUPS: usize = 10;
/// Flows shown in the travel section.
const TOP_FLOWS_SHOWN: usize = 5;

/// Build the report structure from the merged aggregate.
pub fn build_report(
    aggregate: &FinalAggregate,
    metadata: ReportMetadata,
    chart_path: &Path,
) -> Report {
    let strata = aggregate
        .stratum_counts
        .iter()
        .map(|(&stratum, &count)| StratumRow {
            stratum,
            count,
            percentage: aggregate
                .stratum_percentages
                .get(&stratum)
                .copied()
                .unwrap_or(0.0),
        })
        .collect();

    let mean_ages = top_age_rows(aggregate, |summary| summary.mean);
    let median_ages = top_age_rows(aggregate, |summary| summary.median);

    let mut brackets: Vec<BracketRow> = aggregate
        .bracket_counts
        .iter()
        .map(|(key, &count)| BracketRow {
            species: key.species.clone(),
            gender: key.gender.clone(),
            bracket: key.bracket.label().to_string(),
            count,
        })
        .collect();
    brackets.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| {
            (&a.species, &a.gender, &a.bracket).cmp(&(&b.species, &b.gender, &b.bracket))
        })
    });
    brackets.truncate(TOP_GROUPS);

    let top_flows = aggregate
        .top_flows
        .iter()
        .take(TOP_FLOWS_SHOWN)
        .map(|(key, count)| FlowRow {
            origin: key.origin.clone(),
            destination: key.destination.clone(),
            count: *count,
        })
        .collect();

    let pyramid = aggregate
        .pyramid_counts
        .iter()
        .map(|(key, &count)| PyramidRow {
            group: key.group.label(),
            gender: key.gender.clone(),
            count,
        })
        .collect();

    Report {
        metadata,
        strata,
        mean_ages,
        median_ages,
        brackets,
        chart_path: chart_path.display().to_string(),
        dependency_index: aggregate.dependency_index,
        top_flows,
        pyramid,
    }
}

/// Top age rows by the selected statistic, descending, ties by group key.
fn top_age_rows(
    aggregate: &FinalAggregate,
    statistic: impl Fn(&crate::models::AgeSummary) -> f64,
) -> Vec<AgeRow> {
    let mut rows: Vec<AgeRow> = aggregate
        .age_summary
        .iter()
        .map(|(key, summary)| AgeRow {
            species: key.species.clone(),
            gender: key.gender.clone(),
            count: summary.count,
            value: statistic(summary),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (&a.species, &a.gender).cmp(&(&b.species, &b.gender)))
    });
    rows.truncate(TOP_GROUPS);
    rows
}

/// Render the report as the eight-section text output.
pub fn render_text_report(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== RESULTS ===");
    let _ = writeln!(out);

    let _ = writeln!(out, "1. Population by social stratum");
    for row in &report.strata {
        let _ = writeln!(
            out,
            "   - Stratum {}: {} persons",
            row.stratum, row.count
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "2. Population share by social stratum");
    for row in &report.strata {
        let _ = writeln!(out, "   - Stratum {}: {}%", row.stratum, row.percentage);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "3. Mean age by species and gender");
    for row in &report.mean_ages {
        let _ = writeln!(
            out,
            "   - {} / {}: mean = {:.2}",
            row.species, row.gender, row.value
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "4. Median age by species and gender");
    for row in &report.median_ages {
        let _ = writeln!(
            out,
            "   - {} / {}: median = {:.2}",
            row.species, row.gender, row.value
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "5. Population by species, gender and age bracket");
    for row in &report.brackets {
        let _ = writeln!(
            out,
            "   - {} / {} / {}: {} persons",
            row.species, row.gender, row.bracket, row.count
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "6. Age pyramid");
    let _ = writeln!(out, "   - chart saved to {}", report.chart_path);

    let _ = writeln!(out);
    let _ = writeln!(out, "7. Dependency index");
    match report.dependency_index {
        Some(index) => {
            let _ = writeln!(out, "   - {:.3}", index);
        }
        None => {
            let _ = writeln!(out, "   - undefined (no working-age population)");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "8. Busiest travel flows");
    for row in &report.top_flows {
        let _ = writeln!(
            out,
            "   - {} -> {}: {} trips",
            row.origin, row.destination, row.count
        );
    }

    out
}

/// Render the report as pretty-printed JSON.
pub fn generate_json_report(report: &Report) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawRow, ReportMetadata};
    use crate::pipeline::aggregator::aggregate_chunk;
    use crate::pipeline::combiner::combine;
    use chrono::Utc;

    fn row(origin: &str, destination: &str, birth: &str, species: &str, gender: &str) -> RawRow {
        RawRow {
            origin: origin.to_string(),
            destination: destination.to_string(),
            birth_date: birth.to_string(),
            species: species.to_string(),
            gender: gender.to_string(),
        }
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            source: "census.csv".to_string(),
            generated_at: Utc::now(),
            rows: 4,
            chunks: 1,
            workers: 2,
            reference_year: 2026,
            duration_seconds: 0.1,
        }
    }

    fn sample_report() -> Report {
        let rows = vec![
            row("28001", "08001", "2016-01-01", "HUMANO", "MACHO"),
            row("28002", "08001", "1986-01-01", "HUMANO", "MACHO"),
            row("08001", "28001", "1956-01-01", "ELFO", "HEMBRA"),
            row("08002", "28001", "", "ELFO", "HEMBRA"),
        ];
        let aggregate = combine(vec![aggregate_chunk(rows, 2026)]);
        build_report(&aggregate, metadata(), Path::new("age_pyramid.png"))
    }

    #[test]
    fn test_report_strata_sorted_by_key() {
        let report = sample_report();
        let strata: Vec<char> = report.strata.iter().map(|row| row.stratum).collect();
        assert_eq!(strata, vec!['0', '2']);

        let counts: Vec<u64> = report.strata.iter().map(|row| row.count).collect();
        assert_eq!(counts, vec![2, 2]);
        assert_eq!(report.strata[0].percentage, 50.0);
    }

    #[test]
    fn test_report_age_sections_sorted_descending() {
        let report = sample_report();

        assert_eq!(report.mean_ages[0].species, "ELFO");
        assert_eq!(report.mean_ages[0].value, 70.0);
        assert_eq!(report.mean_ages[1].species, "HUMANO");
        assert_eq!(report.mean_ages[1].value, 25.0);

        assert_eq!(report.median_ages[0].value, 70.0);
    }

    #[test]
    fn test_text_report_has_all_sections_in_order() {
        let report = sample_report();
        let text = render_text_report(&report);

        let sections = [
            "1. Population by social stratum",
            "2. Population share by social stratum",
            "3. Mean age by species and gender",
            "4. Median age by species and gender",
            "5. Population by species, gender and age bracket",
            "6. Age pyramid",
            "7. Dependency index",
            "8. Busiest travel flows",
        ];

        let mut last = 0;
        for section in sections {
            let position = text.find(section).unwrap_or_else(|| {
                panic!("missing section: {section}");
            });
            assert!(position > last || last == 0, "section out of order: {section}");
            last = position;
        }

        assert!(text.contains("chart saved to age_pyramid.png"));
    }

    #[test]
    fn test_text_report_undefined_dependency_index() {
        let rows = vec![row("28001", "08001", "2020-01-01", "HUMANO", "MACHO")];
        let aggregate = combine(vec![aggregate_chunk(rows, 2026)]);
        let report = build_report(&aggregate, metadata(), Path::new("age_pyramid.png"));

        let text = render_text_report(&report);
        assert!(text.contains("undefined"));
    }

    #[test]
    fn test_json_report_round_trip() {
        let report = sample_report();
        let json = generate_json_report(&report).unwrap();

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.strata.len(), report.strata.len());
        assert_eq!(parsed.dependency_index, report.dependency_index);
        assert_eq!(parsed.top_flows.len(), report.top_flows.len());
    }
}
