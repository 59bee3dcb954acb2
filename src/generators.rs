//! Synthetic return series generators for testing and the demo pipeline.
//!
//! The main generator concatenates fixed-length Gaussian segments, one per
//! market regime, in the order given. Every draw comes from the caller's
//! [`SeededRng`], so a seed fully determines the series.

use crate::{
    alpha_stable::AlphaStableParams,
    errors::{RegimeAnalysisError, RegimeResult},
    seeded_rng::SeededRng,
};
use serde::{Deserialize, Serialize};

/// One Gaussian regime segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    /// Human-readable regime name
    pub label: String,
    /// Mean daily return
    pub mean: f64,
    /// Standard deviation of daily returns
    pub std_dev: f64,
}

impl SegmentSpec {
    /// Create a segment specification.
    pub fn new(label: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        Self {
            label: label.into(),
            mean,
            std_dev,
        }
    }

    fn validate(&self, index: usize) -> RegimeResult<()> {
        if !self.mean.is_finite() {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: format!("segments[{}].mean", index),
                value: self.mean,
                constraint: "finite".to_string(),
            });
        }
        if !(self.std_dev.is_finite() && self.std_dev > 0.0) {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: format!("segments[{}].std_dev", index),
                value: self.std_dev,
                constraint: "finite and > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// The six default regimes, in generation order.
///
/// Bull, bear and range markets, each at low then high volatility, with
/// magnitudes typical of daily Bitcoin returns.
pub fn bitcoin_like_segments() -> Vec<SegmentSpec> {
    vec![
        SegmentSpec::new("bull / low volatility", 0.002, 0.015),
        SegmentSpec::new("bull / high volatility", 0.004, 0.04),
        SegmentSpec::new("bear / low volatility", -0.002, 0.015),
        SegmentSpec::new("bear / high volatility", -0.004, 0.045),
        SegmentSpec::new("range / low volatility", 0.0, 0.008),
        SegmentSpec::new("range / high volatility", 0.0, 0.03),
    ]
}

/// Generate `segment_length` Gaussian returns for each segment and
/// concatenate them in order.
///
/// # Example
/// ```rust
/// use stable_regime::generators::{bitcoin_like_segments, generate_segmented_returns};
/// use stable_regime::seeded_rng::SeededRng;
///
/// let mut rng = SeededRng::with_seed(42);
/// let returns = generate_segmented_returns(100, &bitcoin_like_segments(), &mut rng).unwrap();
/// assert_eq!(returns.len(), 600);
/// ```
pub fn generate_segmented_returns(
    segment_length: usize,
    segments: &[SegmentSpec],
    rng: &mut SeededRng,
) -> RegimeResult<Vec<f64>> {
    validate_layout(segment_length, segments.len())?;
    for (i, segment) in segments.iter().enumerate() {
        segment.validate(i)?;
    }

    let mut series = Vec::with_capacity(segment_length * segments.len());
    for segment in segments {
        series.extend(rng.normal_vec(segment.mean, segment.std_dev, segment_length)?);
    }
    log::debug!(
        "Generated {} returns in {} segments of {}",
        series.len(),
        segments.len(),
        segment_length
    );
    Ok(series)
}

/// Generate Alpha-Stable segments (Chambers–Mallows–Stuck) and concatenate them.
pub fn generate_stable_segments(
    segment_length: usize,
    segments: &[AlphaStableParams],
    rng: &mut SeededRng,
) -> RegimeResult<Vec<f64>> {
    validate_layout(segment_length, segments.len())?;
    let mut series = Vec::with_capacity(segment_length * segments.len());
    for params in segments {
        series.extend(params.sample(rng, segment_length));
    }
    Ok(series)
}

/// Generate a single Alpha-Stable series of `length` observations.
pub fn generate_stable_series(
    params: &AlphaStableParams,
    length: usize,
    rng: &mut SeededRng,
) -> RegimeResult<Vec<f64>> {
    generate_stable_segments(length, std::slice::from_ref(params), rng)
}

/// True segment index of every observation of a segmented series.
pub fn segment_boundaries(segment_length: usize, num_segments: usize) -> Vec<usize> {
    (0..num_segments)
        .flat_map(|s| std::iter::repeat(s).take(segment_length))
        .collect()
}

fn validate_layout(segment_length: usize, num_segments: usize) -> RegimeResult<()> {
    if segment_length == 0 {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: "segment_length".to_string(),
            value: 0.0,
            constraint: "at least 1".to_string(),
        });
    }
    if num_segments == 0 {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: "segments".to_string(),
            value: 0.0,
            constraint: "at least one segment required".to_string(),
        });
    }
    Ok(())
}
