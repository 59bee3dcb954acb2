//! Report output: labelled CSV export, CSV read-back and an SVG scatter plot.
//!
//! The CSV has one row per observation in time order with the header
//! `Date,Returns,Regime`; dates advance by one day from a start date.

use crate::{
    config::{CSV_FILE_NAME, PLOT_FILE_NAME},
    errors::{validate_all_finite, RegimeAnalysisError, RegimeResult},
};
use chrono::{Days, NaiveDate};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRecord {
    /// Calendar date of the observation
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Observed return
    #[serde(rename = "Returns")]
    pub returns: f64,
    /// Assigned regime label
    #[serde(rename = "Regime")]
    pub regime: usize,
}

/// Files written by [`write_report`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    /// Labelled CSV
    pub csv: PathBuf,
    /// SVG scatter plot
    pub plot: PathBuf,
}

/// Pair returns with labels and consecutive daily dates.
pub fn build_records(
    returns: &[f64],
    labels: &[usize],
    start_date: NaiveDate,
) -> RegimeResult<Vec<RegimeRecord>> {
    check_lengths(returns, labels)?;
    returns
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (&r, &regime))| {
            let date = start_date
                .checked_add_days(Days::new(i as u64))
                .ok_or_else(|| RegimeAnalysisError::InvalidParameter {
                    parameter: "start_date".to_string(),
                    value: i as f64,
                    constraint: "date range must stay representable".to_string(),
                })?;
            Ok(RegimeRecord {
                date,
                returns: r,
                regime,
            })
        })
        .collect()
}

/// Write the labelled series as CSV.
pub fn write_regime_csv(
    path: &Path,
    returns: &[f64],
    labels: &[usize],
    start_date: NaiveDate,
) -> RegimeResult<()> {
    let records = build_records(returns, labels, start_date)?;
    let file = File::create(path)
        .map_err(|e| RegimeAnalysisError::io(format!("create {}", path.display()), e))?;
    let mut writer = csv::Writer::from_writer(file);
    for record in &records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|e| RegimeAnalysisError::io(format!("write {}", path.display()), e))?;
    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Read a CSV written by [`write_regime_csv`].
pub fn read_regime_csv(path: &Path) -> RegimeResult<Vec<RegimeRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<Result<Vec<RegimeRecord>, csv::Error>>()?;
    Ok(records)
}

/// Draw the returns as a scatter plot, one colour per regime label.
pub fn plot_regimes_svg(path: &Path, returns: &[f64], labels: &[usize]) -> RegimeResult<()> {
    check_lengths(returns, labels)?;
    validate_all_finite(returns, "returns")?;

    let (mut lo, mut hi) = returns
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| (lo.min(r), hi.max(r)));
    if returns.is_empty() {
        lo = -1.0;
        hi = 1.0;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 1.0 };
    lo -= pad;
    hi += pad;
    let num_labels = labels.iter().max().map_or(0, |m| m + 1);

    let root = SVGBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Returns by detected regime", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..returns.len().max(1) as f64, lo..hi)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc("Day")
        .y_desc("Return")
        .draw()
        .map_err(plot_error)?;

    for state in 0..num_labels {
        let color = Palette99::pick(state).to_rgba();
        chart
            .draw_series(
                returns
                    .iter()
                    .zip(labels)
                    .enumerate()
                    .filter(|(_, (_, &label))| label == state)
                    .map(|(t, (&r, _))| Circle::new((t as f64, r), 2, color.filled())),
            )
            .map_err(plot_error)?
            .label(format!("Regime {}", state))
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    log::info!("Wrote regime plot to {}", path.display());
    Ok(())
}

/// Write the CSV and the plot into `dir`, creating it if needed.
pub fn write_report(
    dir: &Path,
    returns: &[f64],
    labels: &[usize],
    start_date: NaiveDate,
) -> RegimeResult<ReportPaths> {
    std::fs::create_dir_all(dir)
        .map_err(|e| RegimeAnalysisError::io(format!("create directory {}", dir.display()), e))?;
    let paths = ReportPaths {
        csv: dir.join(CSV_FILE_NAME),
        plot: dir.join(PLOT_FILE_NAME),
    };
    write_regime_csv(&paths.csv, returns, labels, start_date)?;
    plot_regimes_svg(&paths.plot, returns, labels)?;
    Ok(paths)
}

fn check_lengths(returns: &[f64], labels: &[usize]) -> RegimeResult<()> {
    if returns.len() != labels.len() {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: "labels.len()".to_string(),
            value: labels.len() as f64,
            constraint: format!("equal to returns length {}", returns.len()),
        });
    }
    Ok(())
}

fn plot_error<E: std::error::Error + Send + Sync>(
    err: DrawingAreaErrorKind<E>,
) -> RegimeAnalysisError {
    RegimeAnalysisError::IoError {
        operation: format!("render plot: {}", err),
        source: None,
    }
}
