//! Emission models for Hidden Markov Model regime detection.
//!
//! An emission model is the per-state distribution of a scalar observation.
//! The HMM only needs three things from it: a log-density, a weighted
//! re-estimate for the M-step, and a notion of location and dispersion for
//! initialization and canonical state ordering.

use crate::{
    alpha_stable::{estimate_weighted, AlphaStableParams, StableDensityTable},
    errors::{RegimeAnalysisError, RegimeResult},
    math_utils::{constants, weighted_mean_variance},
};
use serde::{Deserialize, Serialize};

/// Per-state observation distribution.
pub trait EmissionModel: Clone + std::fmt::Debug {
    /// Number of free parameters, used by the information criteria
    const NUM_PARAMETERS: usize;

    /// Log-density of one observation.
    fn ln_density(&self, x: f64) -> f64;

    /// Re-estimate from observations weighted by posterior responsibility.
    fn fit_weighted(data: &[f64], weights: &[f64]) -> RegimeResult<Self>;

    /// Central location of the distribution.
    fn location(&self) -> f64;

    /// Spread of the distribution; states are ordered by it.
    fn dispersion(&self) -> f64;
}

/// Alpha-Stable emission with a cached density table.
#[derive(Debug, Clone)]
pub struct AlphaStableEmission {
    table: StableDensityTable,
}

impl AlphaStableEmission {
    /// Build an emission from validated parameters.
    pub fn new(params: AlphaStableParams) -> Self {
        Self {
            table: StableDensityTable::new(params),
        }
    }

    /// Parameters of this emission.
    pub fn params(&self) -> &AlphaStableParams {
        self.table.params()
    }
}

impl EmissionModel for AlphaStableEmission {
    const NUM_PARAMETERS: usize = 4;

    fn ln_density(&self, x: f64) -> f64 {
        self.table.ln_pdf(x)
    }

    fn fit_weighted(data: &[f64], weights: &[f64]) -> RegimeResult<Self> {
        estimate_weighted(data, weights).map(Self::new)
    }

    fn location(&self) -> f64 {
        self.params().delta
    }

    fn dispersion(&self) -> f64 {
        self.params().gamma
    }
}

/// Gaussian emission, kept as the light-tailed baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianEmission {
    /// Mean
    pub mean: f64,
    /// Standard deviation
    pub std_dev: f64,
}

impl GaussianEmission {
    /// Create a Gaussian emission; `std_dev` must be positive and finite.
    pub fn new(mean: f64, std_dev: f64) -> RegimeResult<Self> {
        if !mean.is_finite() || !(std_dev.is_finite() && std_dev > 0.0) {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "std_dev".to_string(),
                value: std_dev,
                constraint: "finite mean and positive finite std_dev".to_string(),
            });
        }
        Ok(Self { mean, std_dev })
    }
}

impl EmissionModel for GaussianEmission {
    const NUM_PARAMETERS: usize = 2;

    fn ln_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std_dev;
        -0.5 * (constants::LN_2PI + z * z) - self.std_dev.ln()
    }

    fn fit_weighted(data: &[f64], weights: &[f64]) -> RegimeResult<Self> {
        let (mean, var) = weighted_mean_variance(data, weights)?;
        Self::new(mean, var.max(constants::MIN_VARIANCE).sqrt())
    }

    fn location(&self) -> f64 {
        self.mean
    }

    fn dispersion(&self) -> f64 {
        self.std_dev
    }
}
