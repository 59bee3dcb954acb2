//! Error types and validation functions for regime analysis.
//!
//! Every fallible operation in the crate returns [`RegimeResult`]. Failures are
//! always recoverable by the caller; library code never aborts the process.

use std::sync::Arc;
use thiserror::Error;

/// Error types for data generation, model fitting, decoding and reporting.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RegimeAnalysisError {
    /// Input sequence is empty or too short for the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Invalid parameter value for a distribution, generator or configuration.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Baum-Welch hit the iteration cap while convergence was required.
    #[error(
        "EM did not converge after {iterations} iterations (last improvement {last_improvement:.3e})"
    )]
    ConvergenceFailure {
        /// Number of EM iterations performed
        iterations: usize,
        /// Log-likelihood improvement of the final iteration
        last_improvement: f64,
    },

    /// Fitting diverged or produced non-finite parameters or likelihoods.
    #[error("Numerical instability: {message}")]
    NumericalInstability {
        /// Description of the numerical instability
        message: String,
    },

    /// A hidden state lost (almost) all posterior responsibility.
    #[error("State {state} collapsed: responsibility mass {mass:.3e}")]
    StateCollapse {
        /// Index of the collapsed state
        state: usize,
        /// Posterior responsibility mass of the state
        mass: f64,
    },

    /// I/O operation error.
    #[error("I/O operation failed: {operation}")]
    IoError {
        /// I/O operation that failed
        operation: String,
        /// Underlying error if available
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization failed: {format}")]
    SerializationError {
        /// Format and reason of the failure
        format: String,
    },
}

/// Result type for regime analysis operations.
pub type RegimeResult<T> = Result<T, RegimeAnalysisError>;

impl RegimeAnalysisError {
    /// Wrap an I/O error together with the operation that produced it.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        RegimeAnalysisError::IoError {
            operation: operation.into(),
            source: Some(Arc::new(source)),
        }
    }
}

impl From<csv::Error> for RegimeAnalysisError {
    fn from(err: csv::Error) -> Self {
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => {
                RegimeAnalysisError::io(format!("CSV: {}", message), source)
            }
            _ => RegimeAnalysisError::SerializationError {
                format: format!("CSV: {}", message),
            },
        }
    }
}

/// Validates that data has sufficient length for analysis.
///
/// # Example
/// ```rust
/// use stable_regime::errors::validate_data_length;
///
/// let data = vec![1.0, 2.0, 3.0];
/// assert!(validate_data_length(&data, 2, "test").is_ok());
/// assert!(validate_data_length(&data, 5, "test").is_err());
/// ```
pub fn validate_data_length(
    data: &[f64],
    min_required: usize,
    operation: &str,
) -> RegimeResult<()> {
    if data.len() < min_required {
        log::debug!(
            "{} rejected input of length {} (minimum {})",
            operation,
            data.len(),
            min_required
        );
        Err(RegimeAnalysisError::InsufficientData {
            required: min_required,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is within expected bounds (inclusive).
///
/// # Example
/// ```rust
/// use stable_regime::errors::validate_parameter;
///
/// assert!(validate_parameter(1.5, 0.0, 2.0, "alpha").is_ok());
/// assert!(validate_parameter(2.5, 0.0, 2.0, "alpha").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> RegimeResult<()> {
    if value.is_nan() {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if min.is_nan() || max.is_nan() || min > max {
        return Err(RegimeAnalysisError::NumericalInstability {
            message: format!("Invalid bounds for parameter {}: min={}, max={}", name, min, max),
        });
    }

    if value < min || value > max {
        Err(RegimeAnalysisError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that a value is finite and not NaN.
pub fn validate_finite(value: f64, name: &str) -> RegimeResult<()> {
    if !value.is_finite() {
        Err(RegimeAnalysisError::NumericalInstability {
            message: format!("{} is not finite: {}", name, value),
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a slice are finite.
///
/// Returns on the first offending value and reports its index.
///
/// # Example
/// ```rust
/// use stable_regime::errors::validate_all_finite;
///
/// assert!(validate_all_finite(&[1.0, 2.0], "returns").is_ok());
/// assert!(validate_all_finite(&[1.0, f64::NAN], "returns").is_err());
/// ```
pub fn validate_all_finite(data: &[f64], name: &str) -> RegimeResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: format!("{}[{}]", name, i),
            value,
            constraint: "finite value".to_string(),
        });
    }
    Ok(())
}

/// Validates that a slice is a probability vector: non-negative entries summing to 1.
pub fn validate_probability_vector(probs: &[f64], tolerance: f64, name: &str) -> RegimeResult<()> {
    if probs.is_empty() {
        return Err(RegimeAnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if let Some((i, &p)) = probs
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0)
    {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: format!("{}[{}]", name, i),
            value: p,
            constraint: "non-negative finite probability".to_string(),
        });
    }
    let total: f64 = probs.iter().sum();
    if (total - 1.0).abs() > tolerance {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: format!("sum({})", name),
            value: total,
            constraint: format!("1 ± {:e}", tolerance),
        });
    }
    Ok(())
}
