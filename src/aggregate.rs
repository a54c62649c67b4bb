//! KPI aggregates over a table or filtered view.
//!
//! Durations are stored in seconds and reported in minutes.

use crate::error::DashboardError;
use crate::table::Table;
use serde::Serialize;

/// Default histogram resolution of the dashboard.
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// Numeric values of `duration_column` converted from seconds to minutes.
///
/// Null and non-numeric values are skipped; an unknown column gives no values.
pub fn duration_minutes(table: &Table, duration_column: &str) -> Vec<f64> {
    table
        .column_values(duration_column)
        .map(|values| {
            values
                .filter_map(|value| value.as_f64())
                .filter(|seconds| seconds.is_finite())
                .map(|seconds| seconds / 60.0)
                .collect()
        })
        .unwrap_or_default()
}

/// Arithmetic mean of the duration column, in minutes.
///
/// # Errors
/// `UnknownColumn` if the column is absent from a non-empty table,
/// `EmptyAggregation` if there are no numeric durations to average.
pub fn mean_duration_minutes(table: &Table, duration_column: &str) -> Result<f64, DashboardError> {
    if !table.is_empty() && !table.has_column(duration_column) {
        return Err(DashboardError::unknown_column(duration_column));
    }
    let minutes = duration_minutes(table, duration_column);
    if minutes.is_empty() {
        return Err(DashboardError::empty_aggregation(duration_column));
    }
    Ok(minutes.iter().sum::<f64>() / minutes.len() as f64)
}

/// Number of records with a non-null case identifier. Unknown columns count as zero.
pub fn count(table: &Table, case_id_column: &str) -> usize {
    table
        .column_values(case_id_column)
        .map(|values| values.filter(|value| !value.is_null()).count())
        .unwrap_or(0)
}

/// One equal-width histogram bucket. `upper` is inclusive for the last bucket only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|bin| bin.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Buckets finite `values` into `bins` equal-width bins spanning min..=max.
///
/// When every value is identical a single bin holds them all.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Histogram::default();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if min == max {
        return Histogram {
            bins: vec![HistogramBin {
                lower: min,
                upper: max,
                count: finite.len(),
            }],
        };
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in &finite {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Histogram {
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(idx, count)| HistogramBin {
                lower: min + idx as f64 * width,
                upper: if idx == bins - 1 {
                    max
                } else {
                    min + (idx + 1) as f64 * width
                },
                count,
            })
            .collect(),
    }
}

/// KPI tiles of a render cycle. A `None` mean is shown as "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub mean_duration_minutes: Option<f64>,
    pub overall_mean_duration_minutes: Option<f64>,
    pub case_count: usize,
    pub overall_case_count: usize,
}

impl Kpis {
    /// Computes filtered and overall KPIs, recording recovered conditions in `warnings`.
    pub fn compute(
        filtered: &Table,
        all: &Table,
        duration_column: Option<&str>,
        case_id_column: Option<&str>,
        warnings: &mut Vec<DashboardError>,
    ) -> Kpis {
        let mut kpis = Kpis::default();

        if let Some(column) = duration_column {
            kpis.mean_duration_minutes = recover(mean_duration_minutes(filtered, column), warnings);
            kpis.overall_mean_duration_minutes = recover(mean_duration_minutes(all, column), warnings);
        }

        if let Some(column) = case_id_column {
            if !all.is_empty() && !all.has_column(column) {
                push_unique(warnings, DashboardError::unknown_column(column));
            }
            kpis.case_count = count(filtered, column);
            kpis.overall_case_count = count(all, column);
        }

        kpis
    }
}

fn recover(result: Result<f64, DashboardError>, warnings: &mut Vec<DashboardError>) -> Option<f64> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            push_unique(warnings, err);
            None
        }
    }
}

/// Appends `warning` unless an identical one is already recorded.
pub(crate) fn push_unique(warnings: &mut Vec<DashboardError>, warning: DashboardError) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}
