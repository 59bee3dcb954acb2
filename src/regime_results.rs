//! Result structures for HMM fitting and regime detection.

use crate::alpha_stable::AlphaStableParams;
use serde::{Deserialize, Serialize};

/// Why the Baum-Welch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Log-likelihood change fell below the tolerance
    Converged,
    /// Log-likelihood kept decreasing
    Stagnated,
    /// Iteration budget exhausted
    IterationCap,
}

/// Summary of one Baum-Welch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// EM iterations performed
    pub iterations: usize,
    /// Log-likelihood of the fitted model
    pub log_likelihood: f64,
    /// Stop reason
    pub stop_reason: StopReason,
    /// Log-likelihood before each M-step
    pub log_likelihood_history: Vec<f64>,
    /// States refitted after collapsing
    pub reinitialized_states: usize,
    /// Emission fits rejected because they diverged
    pub rejected_emission_fits: usize,
}

impl FitReport {
    /// Whether the run ended on the tolerance criterion.
    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Converged
    }

    /// Log-likelihood change of the last recorded iteration.
    pub fn last_improvement(&self) -> f64 {
        match self.log_likelihood_history.as_slice() {
            [.., prev, last] => last - prev,
            _ => f64::NAN,
        }
    }
}

/// Regime detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDetectionResult {
    /// Regime label of every observation
    pub regime_sequence: Vec<usize>,
    /// Posterior probabilities for each state at each time
    pub state_probabilities: Vec<Vec<f64>>,
    /// Detected regime change points
    pub change_points: Vec<RegimeChangePoint>,
    /// Estimated HMM parameters
    pub hmm_params: HmmParameters,
    /// Log-likelihood of the model
    pub log_likelihood: f64,
    /// Model selection criteria
    pub model_criteria: ModelCriteria,
    /// Per-regime statistics
    pub regime_statistics: Vec<RegimeStatistics>,
    /// Baum-Welch run summary
    pub fit_report: FitReport,
}

/// Information about a detected regime change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeChangePoint {
    /// Time index of the first observation in the new regime
    pub time_index: usize,
    /// Previous regime state
    pub from_state: usize,
    /// New regime state
    pub to_state: usize,
    /// Posterior probability of the new state at the change
    pub confidence: f64,
    /// Change in emission location
    pub location_change: f64,
    /// Change in emission scale
    pub scale_change: f64,
    /// Duration of previous regime
    pub previous_regime_duration: usize,
}

/// Serializable HMM parameters for results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmmParameters {
    /// Number of states
    pub num_states: usize,
    /// Initial probabilities
    pub initial_probs: Vec<f64>,
    /// Transition matrix
    pub transition_matrix: Vec<Vec<f64>>,
    /// Emission parameters
    pub emission_params: Vec<AlphaStableParams>,
}

/// Model selection criteria for HMM
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCriteria {
    /// Akaike Information Criterion
    pub aic: f64,
    /// Bayesian Information Criterion
    pub bic: f64,
    /// Hannan-Quinn Information Criterion
    pub hqic: f64,
    /// Number of parameters
    pub num_parameters: usize,
}

impl ModelCriteria {
    /// Information criteria for a log-likelihood over `n` observations.
    pub fn new(log_likelihood: f64, num_parameters: usize, n: usize) -> Self {
        let k = num_parameters as f64;
        let n = (n as f64).max(3.0);
        Self {
            aic: 2.0 * k - 2.0 * log_likelihood,
            bic: k * n.ln() - 2.0 * log_likelihood,
            hqic: 2.0 * k * n.ln().ln() - 2.0 * log_likelihood,
            num_parameters,
        }
    }
}

/// Statistics for each detected regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStatistics {
    /// Regime state index
    pub state_index: usize,
    /// First occurrence time
    pub first_occurrence_time: Option<usize>,
    /// Last occurrence time
    pub last_occurrence_time: Option<usize>,
    /// Average run length in this regime
    pub average_duration: f64,
    /// Total time spent in this regime
    pub total_duration: usize,
    /// Number of separate runs of this regime
    pub occurrence_count: usize,
    /// Mean of the observations labelled with this regime
    pub mean_return: f64,
    /// Standard deviation of the observations labelled with this regime
    pub return_std: f64,
    /// Self-transition probability
    pub persistence_probability: f64,
    /// Fitted emission parameters
    pub emission: AlphaStableParams,
}

/// Number of free parameters of a `num_states` HMM with the given emission size.
pub fn calculate_hmm_parameters(num_states: usize, emission_parameters: usize) -> usize {
    if num_states == 0 {
        return 0;
    }
    let initial_params = num_states - 1;
    let transition_params = num_states * (num_states - 1);
    initial_params + transition_params + num_states * emission_parameters
}
