//! Age pyramid chart rendering.
//!
//! Thin presentation layer over the merged pyramid counts: one PNG with
//! horizontally mirrored bars, one gender drawn to the left of zero.

use crate::error::{DemostatError, Result};
use crate::models::{PyramidKey, QuinquennialGroup};
use plotters::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Gender drawn on the negative side of the axis.
pub const LEFT_SERIES: &str = "HEMBRA";
/// Gender drawn on the positive side of the axis.
pub const RIGHT_SERIES: &str = "MACHO";

const LEFT_COLOR: RGBColor = RGBColor(240, 128, 128);
const RIGHT_COLOR: RGBColor = RGBColor(70, 130, 180);

/// Pyramid data arranged for drawing: one row per five-year group, groups
/// sorted numerically with "90+" last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidSeries {
    /// Group labels, youngest first.
    pub labels: Vec<String>,
    /// Left-hand series counts, aligned with `labels`.
    pub left: Vec<u64>,
    /// Right-hand series counts, aligned with `labels`.
    pub right: Vec<u64>,
}

impl PyramidSeries {
    /// Largest single bar in either direction.
    pub fn max_count(&self) -> u64 {
        self.left
            .iter()
            .chain(self.right.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }
}

/// Arrange the merged pyramid counts into aligned, ordered series.
///
/// A gender absent from the data becomes an all-zero series; the chart is
/// still drawn.
pub fn build_series(pyramid: &BTreeMap<PyramidKey, u64>) -> PyramidSeries {
    let groups: BTreeSet<QuinquennialGroup> = pyramid.keys().map(|key| key.group).collect();

    let mut labels = Vec::with_capacity(groups.len());
    let mut left = Vec::with_capacity(groups.len());
    let mut right = Vec::with_capacity(groups.len());

    for group in groups {
        let count_for = |gender: &str| {
            pyramid
                .get(&PyramidKey {
                    group,
                    gender: gender.to_string(),
                })
                .copied()
                .unwrap_or(0)
        };

        labels.push(group.label());
        left.push(count_for(LEFT_SERIES));
        right.push(count_for(RIGHT_SERIES));
    }

    PyramidSeries {
        labels,
        left,
        right,
    }
}

/// Render the mirrored age pyramid to a PNG file.
pub fn render_pyramid(
    pyramid: &BTreeMap<PyramidKey, u64>,
    path: &Path,
    size: (u32, u32),
) -> Result<()> {
    let series = build_series(pyramid);
    let chart_err = |err: &dyn std::fmt::Display| DemostatError::Chart(err.to_string());

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| chart_err(&e))?;

    let bins = series.labels.len().max(1);
    let extent = (series.max_count().max(1) as i64) * 11 / 10;

    let mut chart = ChartBuilder::on(&root)
        .caption("Age Pyramid", ("sans-serif", 28))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(64)
        .build_cartesian_2d(-extent..extent, 0f64..bins as f64)
        .map_err(|e| chart_err(&e))?;

    let labels = series.labels.clone();
    chart
        .configure_mesh()
        .x_desc("Population")
        .y_desc("Age group")
        .x_label_formatter(&|x| x.abs().to_string())
        .y_labels(bins)
        .y_label_formatter(&move |y| {
            labels
                .get(y.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(|e| chart_err(&e))?;

    chart
        .draw_series(series.left.iter().enumerate().map(|(i, &count)| {
            Rectangle::new(
                [(0, i as f64 + 0.1), (-(count as i64), i as f64 + 0.9)],
                LEFT_COLOR.filled(),
            )
        }))
        .map_err(|e| chart_err(&e))?
        .label(LEFT_SERIES)
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], LEFT_COLOR.filled()));

    chart
        .draw_series(series.right.iter().enumerate().map(|(i, &count)| {
            Rectangle::new(
                [(0, i as f64 + 0.1), (count as i64, i as f64 + 0.9)],
                RIGHT_COLOR.filled(),
            )
        }))
        .map_err(|e| chart_err(&e))?
        .label(RIGHT_SERIES)
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], RIGHT_COLOR.filled()));

    // Center line between the mirrored halves.
    chart
        .draw_series(LineSeries::new(vec![(0, 0.0), (0, bins as f64)], &BLACK))
        .map_err(|e| chart_err(&e))?;

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()
        .map_err(|e| chart_err(&e))?;

    root.present().map_err(|e| chart_err(&e))?;
    info!("Age pyramid written to {}", path.display());

    Ok(())
}
