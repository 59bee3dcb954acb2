//! Configuration structures for HMM fitting and decoding.
//!
//! [`HmmFitConfig`] carries every knob of the Baum-Welch trainer. It comes with
//! three presets and a fluent [`HmmFitConfigBuilder`].

use crate::errors::{validate_parameter, RegimeAnalysisError, RegimeResult};
use serde::{Deserialize, Serialize};

/// What to do when a state's posterior responsibility mass collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollapsePolicy {
    /// Refit the state on a random contiguous block and reset its transition row
    Reinitialize,
    /// Keep the state's previous emission parameters
    Freeze,
    /// Stop fitting with `StateCollapse`
    Abort,
}

/// Label assignment method used after fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeMethod {
    /// Per-timestep arg max of the posterior state probabilities
    Posterior,
    /// Single most likely state path
    Viterbi,
}

/// Options for Baum-Welch fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmFitConfig {
    /// Maximum number of EM iterations
    pub max_iterations: usize,
    /// Absolute log-likelihood change below which EM has converged
    pub tolerance: f64,
    /// Consecutive log-likelihood decreases tolerated before stopping
    pub max_stagnation: usize,
    /// Handling of states whose responsibility mass collapses
    pub collapse_policy: CollapsePolicy,
    /// Minimum expected number of observations per state
    pub min_state_mass: f64,
    /// Upper bound on reinitializations over a whole fit
    pub max_reinitializations: usize,
    /// Length of the random block used to reinitialize a state
    pub reinit_block: usize,
    /// Initial self-transition probability
    pub initial_persistence: f64,
    /// Rolling window for the k-means initialization features
    pub init_window: usize,
    /// Turn an exhausted iteration budget into an error
    pub require_convergence: bool,
    /// Relabel states by ascending dispersion after fitting
    pub canonical_order: bool,
}

impl Default for HmmFitConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl HmmFitConfig {
    /// Quick configuration: few iterations, loose tolerance.
    pub fn quick() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-2,
            ..Self::standard()
        }
    }

    /// Standard configuration used by the pipeline.
    pub fn standard() -> Self {
        Self {
            max_iterations: 60,
            tolerance: 1e-3,
            max_stagnation: 5,
            collapse_policy: CollapsePolicy::Reinitialize,
            min_state_mass: 5.0,
            max_reinitializations: 10,
            reinit_block: 100,
            initial_persistence: 0.9,
            init_window: 20,
            require_convergence: false,
            canonical_order: true,
        }
    }

    /// Thorough configuration: long runs, tight tolerance.
    pub fn thorough() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-5,
            max_stagnation: 10,
            ..Self::standard()
        }
    }

    /// Check that all options are usable.
    pub fn validate(&self) -> RegimeResult<()> {
        if self.max_iterations == 0 {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "max_iterations".to_string(),
                value: 0.0,
                constraint: "at least 1".to_string(),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "tolerance".to_string(),
                value: self.tolerance,
                constraint: "finite and > 0".to_string(),
            });
        }
        validate_parameter(self.min_state_mass, 0.0, f64::MAX, "min_state_mass")?;
        validate_parameter(self.initial_persistence, 0.0, 1.0, "initial_persistence")?;
        if self.reinit_block < 2 || self.init_window < 2 {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "reinit_block/init_window".to_string(),
                value: self.reinit_block.min(self.init_window) as f64,
                constraint: "at least 2".to_string(),
            });
        }
        Ok(())
    }
}

/// Fluent builder for [`HmmFitConfig`].
#[derive(Debug, Clone, Default)]
pub struct HmmFitConfigBuilder {
    config: HmmFitConfig,
}

impl HmmFitConfigBuilder {
    /// Start from the standard preset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations.
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.config.max_iterations = iterations;
        self
    }

    /// Set convergence tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set the collapse policy.
    pub fn collapse_policy(mut self, policy: CollapsePolicy) -> Self {
        self.config.collapse_policy = policy;
        self
    }

    /// Set the minimum state mass.
    pub fn min_state_mass(mut self, mass: f64) -> Self {
        self.config.min_state_mass = mass;
        self
    }

    /// Set the initial self-transition probability.
    pub fn initial_persistence(mut self, persistence: f64) -> Self {
        self.config.initial_persistence = persistence;
        self
    }

    /// Set the initialization window.
    pub fn init_window(mut self, window: usize) -> Self {
        self.config.init_window = window;
        self
    }

    /// Require convergence within the iteration budget.
    pub fn require_convergence(mut self, require: bool) -> Self {
        self.config.require_convergence = require;
        self
    }

    /// Enable or disable canonical state ordering.
    pub fn canonical_order(mut self, enable: bool) -> Self {
        self.config.canonical_order = enable;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> RegimeResult<HmmFitConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
