//! # Pipeline Configuration
//!
//! Settings for the end-to-end run: what to simulate, how many regimes to
//! fit, how to label them and where to write the report.

use crate::{
    errors::{RegimeAnalysisError, RegimeResult},
    generators::{bitcoin_like_segments, SegmentSpec},
    regime_config::{DecodeMethod, HmmFitConfig},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the CSV report written by the pipeline.
pub const CSV_FILE_NAME: &str = "regimes.csv";

/// Name of the SVG plot written by the pipeline.
pub const PLOT_FILE_NAME: &str = "regimes.svg";

/// Configuration of a full generate → fit → decode → report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Observations per simulated segment
    pub segment_length: usize,
    /// Simulated regimes, in order
    pub segments: Vec<SegmentSpec>,
    /// Seed of the single random stream
    pub seed: u64,
    /// Number of hidden states to fit
    pub num_states: usize,
    /// Label assignment method
    pub decode_method: DecodeMethod,
    /// Baum-Welch options
    pub fit: HmmFitConfig,
    /// Date of the first observation in the CSV
    pub start_date: NaiveDate,
    /// Directory receiving the CSV and the plot
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl PipelineConfig {
    /// Six Bitcoin-like segments of 1000 days, six states.
    pub fn standard() -> Self {
        Self {
            segment_length: 1000,
            segments: bitcoin_like_segments(),
            seed: 42,
            num_states: 6,
            decode_method: DecodeMethod::Posterior,
            fit: HmmFitConfig::standard(),
            start_date: default_start_date(),
            output_dir: PathBuf::from("output"),
        }
    }

    /// Short segments and a quick fit, for smoke tests.
    pub fn quick() -> Self {
        Self {
            segment_length: 200,
            fit: HmmFitConfig::quick(),
            ..Self::standard()
        }
    }

    /// Use a different output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Check the configuration before running.
    pub fn validate(&self) -> RegimeResult<()> {
        if self.num_states == 0 {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "num_states".to_string(),
                value: 0.0,
                constraint: "at least 1".to_string(),
            });
        }
        if self.segment_length == 0 || self.segments.is_empty() {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "segment_length * segments".to_string(),
                value: (self.segment_length * self.segments.len()) as f64,
                constraint: "at least one observation".to_string(),
            });
        }
        self.fit.validate()
    }

    /// Total number of simulated observations.
    pub fn total_length(&self) -> usize {
        self.segment_length * self.segments.len()
    }
}

/// 2018-01-01, the first date of the exported series.
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default()
}
