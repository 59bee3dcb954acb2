//! Numerical helpers shared by the density, estimator and HMM modules.
//!
//! Weighted order statistics, small regressions and quadrature. Everything here
//! works on plain slices and returns `RegimeResult` where inputs can be invalid.

use crate::errors::{RegimeAnalysisError, RegimeResult};
use std::collections::BinaryHeap;

/// Numerical constants.
pub mod constants {
    /// Smallest density value carried through log computations
    pub const MIN_DENSITY: f64 = 1e-300;

    /// Floor applied to transition probabilities before renormalization
    pub const MIN_TRANSITION_PROB: f64 = 1e-10;

    /// Minimum acceptable variance to avoid division by zero
    pub const MIN_VARIANCE: f64 = 1e-15;

    /// Ratio between the interquartile range and the scale of a Cauchy-like law,
    /// used to get a robust initial scale
    pub const IQR_SCALE_DIVISOR: f64 = 1.654;

    /// ln(2π)
    pub const LN_2PI: f64 = 1.837_877_066_409_345_3;
}

/// Safe comparison for floating point values (NaN sorts last).
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Check that weights are usable: same length as data, finite, non-negative,
/// with positive total. Returns the total weight.
pub fn validate_weights(data: &[f64], weights: &[f64]) -> RegimeResult<f64> {
    if data.len() != weights.len() {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: "weights.len()".to_string(),
            value: weights.len() as f64,
            constraint: format!("equal to data length {}", data.len()),
        });
    }
    let mut total = 0.0;
    for &w in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "weight".to_string(),
                value: w,
                constraint: "non-negative finite".to_string(),
            });
        }
        total += w;
    }
    if total <= 0.0 {
        return Err(RegimeAnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    Ok(total)
}

/// Weighted mean and (biased) variance.
pub fn weighted_mean_variance(data: &[f64], weights: &[f64]) -> RegimeResult<(f64, f64)> {
    let total = validate_weights(data, weights)?;
    let mean = data.iter().zip(weights).map(|(x, w)| x * w).sum::<f64>() / total;
    let var = data
        .iter()
        .zip(weights)
        .map(|(x, w)| {
            let d = x - mean;
            w * d * d
        })
        .sum::<f64>()
        / total;
    Ok((mean, var))
}

/// Weighted quantiles of `data` for each probability in `probs`.
///
/// Uses the weighted empirical CDF with midpoint interpolation between
/// neighbouring order statistics, so equal weights reproduce the usual
/// linear-interpolation percentile.
pub fn weighted_quantiles(data: &[f64], weights: &[f64], probs: &[f64]) -> RegimeResult<Vec<f64>> {
    let total = validate_weights(data, weights)?;

    let mut pairs: Vec<(f64, f64)> = data
        .iter()
        .zip(weights)
        .filter(|(_, &w)| w > 0.0)
        .map(|(&x, &w)| (x, w))
        .collect();
    pairs.sort_by(|a, b| float_total_cmp(&a.0, &b.0));

    // Cumulative weight at the midpoint of each point's mass
    let mut positions = Vec::with_capacity(pairs.len());
    let mut cumulative = 0.0;
    for &(_, w) in &pairs {
        positions.push((cumulative + 0.5 * w) / total);
        cumulative += w;
    }

    let quantile = |p: f64| -> f64 {
        if p <= positions[0] {
            return pairs[0].0;
        }
        let last = pairs.len() - 1;
        if p >= positions[last] {
            return pairs[last].0;
        }
        let idx = positions.partition_point(|&pos| pos < p);
        let (lo, hi) = (idx - 1, idx);
        let span = positions[hi] - positions[lo];
        if span <= 0.0 {
            return pairs[hi].0;
        }
        let frac = (p - positions[lo]) / span;
        pairs[lo].0 + frac * (pairs[hi].0 - pairs[lo].0)
    };

    Ok(probs.iter().map(|&p| quantile(p.clamp(0.0, 1.0))).collect())
}

/// Ordinary least squares `y = intercept + slope * x`.
///
/// Returns `(intercept, slope)`.
pub fn ols_line(x: &[f64], y: &[f64]) -> RegimeResult<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return Err(RegimeAnalysisError::InsufficientData {
            required: 2,
            actual: x.len().min(y.len()),
        });
    }
    if !x.iter().chain(y).all(|v| v.is_finite()) {
        return Err(RegimeAnalysisError::NumericalInstability {
            message: "Non-finite values in regression data".to_string(),
        });
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    if sxx < constants::MIN_VARIANCE {
        return Err(RegimeAnalysisError::NumericalInstability {
            message: "Predictor variable has zero variance".to_string(),
        });
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();
    let slope = sxy / sxx;
    Ok((mean_y - slope * mean_x, slope))
}

/// Composite Simpson's rule on `[a, b]` with `intervals` (rounded up to even).
///
/// Non-finite integrand values are treated as zero; this is how endpoint
/// singularities of the stable density integrand are handled.
pub fn simpson<F>(f: F, a: f64, b: f64, intervals: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    if !(b > a) {
        return 0.0;
    }
    let n = (intervals.max(2) + 1) & !1;
    let h = (b - a) / n as f64;
    let eval = |x: f64| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            0.0
        }
    };

    let mut sum = eval(a) + eval(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 1 { 4.0 } else { 2.0 } * eval(x);
    }
    sum * h / 3.0
}

/// Result of [`adaptive_simpson`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    /// Integral estimate
    pub value: f64,
    /// Summed Richardson error estimate of all panels
    pub error: f64,
    /// Integrand evaluations spent
    pub evaluations: usize,
    /// Whether the error target was met within the evaluation budget
    pub converged: bool,
}

/// Error target and evaluation budget for [`adaptive_simpson`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureLimits {
    /// Absolute error floor
    pub abs_tolerance: f64,
    /// Error target relative to the integral
    pub rel_tolerance: f64,
    /// Hard cap on integrand evaluations
    pub max_evaluations: usize,
}

/// One Simpson panel with its two-half refinement.
#[derive(Debug, Clone, Copy)]
struct Panel {
    a: f64,
    b: f64,
    // f at a, a+h/4, a+h/2, a+3h/4, b
    fs: [f64; 5],
    estimate: f64,
    error: f64,
}

impl Panel {
    fn new<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> Self {
        let m = 0.5 * (a + b);
        let flm = f(0.5 * (a + m));
        let frm = f(0.5 * (m + b));
        let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
        let halves = (m - a) / 6.0 * (fa + 4.0 * flm + fm) + (b - m) / 6.0 * (fm + 4.0 * frm + fb);
        let delta = halves - whole;
        Self {
            a,
            b,
            fs: [fa, flm, fm, frm, fb],
            estimate: halves + delta / 15.0,
            error: delta.abs() / 15.0,
        }
    }

    fn splittable(&self) -> bool {
        let quarter = 0.25 * (self.b - self.a);
        self.a + quarter > self.a && self.b - quarter < self.b
    }
}

impl PartialEq for Panel {
    fn eq(&self, other: &Self) -> bool {
        self.error.total_cmp(&other.error).is_eq()
    }
}

impl Eq for Panel {}

impl PartialOrd for Panel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Panel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.error.total_cmp(&other.error)
    }
}

/// Globally adaptive Simpson quadrature on `[a, b]`.
///
/// The panel with the largest error estimate is halved until the summed error
/// meets `limits` or the evaluation budget is spent. On an exhausted budget the
/// best estimate so far is returned with `converged == false`. Non-finite
/// integrand values are treated as zero.
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64, limits: &QuadratureLimits) -> Quadrature
where
    F: Fn(f64) -> f64,
{
    if !(b > a) {
        return Quadrature {
            value: 0.0,
            error: 0.0,
            evaluations: 0,
            converged: true,
        };
    }
    let evaluations = std::cell::Cell::new(0usize);
    let eval = |x: f64| {
        evaluations.set(evaluations.get() + 1);
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            0.0
        }
    };

    let (fa, fm, fb) = (eval(a), eval(0.5 * (a + b)), eval(b));
    let first = Panel::new(&eval, a, b, fa, fm, fb);
    let mut value = first.estimate;
    let mut error = first.error;
    let mut panels = BinaryHeap::from(vec![first]);

    let target = |value: f64| limits.abs_tolerance.max(limits.rel_tolerance * value.abs());
    while error > target(value) && evaluations.get() + 4 <= limits.max_evaluations {
        let panel = match panels.pop() {
            Some(p) if p.splittable() => p,
            Some(p) => {
                panels.push(p);
                break;
            }
            None => break,
        };
        let [pa, plm, pm, prm, pb] = panel.fs;
        let mid = 0.5 * (panel.a + panel.b);
        let left = Panel::new(&eval, panel.a, mid, pa, plm, pm);
        let right = Panel::new(&eval, mid, panel.b, pm, prm, pb);
        value += left.estimate + right.estimate - panel.estimate;
        error += left.error + right.error - panel.error;
        panels.push(left);
        panels.push(right);
    }

    // Re-sum to shed the drift of the running totals
    let value = panels.iter().map(|p| p.estimate).sum::<f64>();
    let error = panels.iter().map(|p| p.error).sum::<f64>();
    Quadrature {
        value,
        error,
        evaluations: evaluations.get(),
        converged: error <= target(value),
    }
}

/// Find the root of a monotone function on `[a, b]` by bisection.
///
/// `increasing` states the direction of monotonicity. If there is no sign
/// change, the result converges to the endpoint nearest the root. NaN values
/// are treated as lying beyond the root.
pub fn bisect_monotone<F>(f: F, mut a: f64, mut b: f64, increasing: bool, iterations: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    for _ in 0..iterations {
        let mid = 0.5 * (a + b);
        let fm = f(mid);
        if fm == 0.0 {
            return mid;
        }
        // Below the root an increasing function is negative
        let below_root = if increasing { fm < 0.0 } else { fm > 0.0 };
        if below_root {
            a = mid;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}
