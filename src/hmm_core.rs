//! Core Hidden Markov Model implementation for regime detection.
//!
//! This module contains the HMM structure and its algorithms: k-means++
//! initialization, scaled forward-backward, Baum-Welch re-estimation with a
//! collapse guard, posterior and Viterbi decoding. The model is generic over
//! the per-state [`EmissionModel`]; the pipeline uses Alpha-Stable emissions.

use crate::{
    emission_models::{AlphaStableEmission, EmissionModel},
    errors::{
        validate_all_finite, validate_data_length, validate_finite, validate_parameter,
        validate_probability_vector, RegimeAnalysisError, RegimeResult,
    },
    math_utils::{argmax, constants, float_total_cmp},
    regime_config::{CollapsePolicy, DecodeMethod, HmmFitConfig},
    regime_results::{calculate_hmm_parameters, FitReport, HmmParameters, StopReason},
    seeded_rng::SeededRng,
};
use nalgebra::Vector2;

/// Observations required per hidden state before fitting is attempted.
pub const MIN_OBSERVATIONS_PER_STATE: usize = 5;

const KMEANS_MAX_ITERATIONS: usize = 100;
const KMEANS_TOLERANCE: f64 = 1e-8;

/// Allowed deviation of probability vectors from unit sum.
const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Scaled forward and backward variables of one sequence.
///
/// Emission likelihoods are divided by their per-timestep maximum before the
/// recursions, and each forward step is normalized; the log-likelihood adds
/// both shifts back.
#[derive(Debug, Clone)]
pub struct ForwardBackward {
    /// Normalized forward variables
    pub alpha: Vec<Vec<f64>>,
    /// Backward variables scaled by the forward normalizers
    pub beta: Vec<Vec<f64>>,
    /// Emission likelihoods relative to the per-timestep maximum
    pub scaled_emissions: Vec<Vec<f64>>,
    /// Forward normalizer of each timestep
    pub scale: Vec<f64>,
    /// Log-likelihood of the sequence
    pub log_likelihood: f64,
}

impl ForwardBackward {
    /// Posterior state probabilities γ(t, j).
    pub fn posteriors(&self) -> Vec<Vec<f64>> {
        self.alpha
            .iter()
            .zip(&self.beta)
            .map(|(a, b)| {
                let mut row: Vec<f64> = a.iter().zip(b).map(|(x, y)| x * y).collect();
                let sum: f64 = row.iter().sum();
                if sum > 0.0 {
                    row.iter_mut().for_each(|p| *p /= sum);
                }
                row
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct FitCounters {
    reinitialized: usize,
    rejected: usize,
    reinitialized_last: bool,
}

/// Hidden Markov Model for regime detection
#[derive(Debug, Clone)]
pub struct RegimeHmm<E: EmissionModel> {
    /// Number of hidden states (regimes)
    pub num_states: usize,
    /// Initial state probabilities
    pub initial_probs: Vec<f64>,
    /// Transition probability matrix (state i to state j)
    pub transition_matrix: Vec<Vec<f64>>,
    /// Emission distribution of each state
    pub emissions: Vec<E>,
}

impl<E: EmissionModel> RegimeHmm<E> {
    /// Create an HMM with explicit emissions, a uniform initial distribution
    /// and self-transition probability `persistence`.
    pub fn with_emissions(emissions: Vec<E>, persistence: f64) -> RegimeResult<Self> {
        if emissions.is_empty() {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "num_states".to_string(),
                value: 0.0,
                constraint: "at least 1".to_string(),
            });
        }
        validate_parameter(persistence, 0.0, 1.0, "persistence")?;
        let num_states = emissions.len();
        Ok(Self {
            num_states,
            initial_probs: vec![1.0 / num_states as f64; num_states],
            transition_matrix: persistence_matrix(num_states, persistence),
            emissions,
        })
    }

    /// Create an HMM whose emissions are fitted to k-means++ clusters of
    /// rolling (mean, log-std) features.
    pub fn initialize(
        observations: &[f64],
        num_states: usize,
        config: &HmmFitConfig,
        rng: &mut SeededRng,
    ) -> RegimeResult<Self> {
        if num_states == 0 {
            return Err(RegimeAnalysisError::InvalidParameter {
                parameter: "num_states".to_string(),
                value: 0.0,
                constraint: "at least 1".to_string(),
            });
        }
        config.validate()?;
        validate_data_length(
            observations,
            MIN_OBSERVATIONS_PER_STATE * num_states,
            "HMM initialization",
        )?;
        validate_all_finite(observations, "observations")?;

        let features = rolling_features(observations, config.init_window);
        let assignments = kmeans_assignments(&features, num_states, rng);

        let mut emissions = Vec::with_capacity(num_states);
        for state in 0..num_states {
            let weights: Vec<f64> = assignments
                .iter()
                .map(|&a| if a == state { 1.0 } else { 0.0 })
                .collect();
            let members = assignments.iter().filter(|&&a| a == state).count();
            let fitted = if members >= MIN_OBSERVATIONS_PER_STATE {
                E::fit_weighted(observations, &weights).ok()
            } else {
                None
            };
            let emission = match fitted {
                Some(e) => e,
                None => {
                    log::warn!(
                        "Cluster {} ({} members) unusable for initialization; \
                         fitting a random block",
                        state,
                        members
                    );
                    fit_random_block(observations, config.reinit_block, rng)?
                }
            };
            emissions.push(emission);
        }

        Self::with_emissions(emissions, config.initial_persistence)
    }

    /// Fit the model to `observations` with Baum-Welch.
    ///
    /// The model is updated in place. Reaching the iteration cap is logged and
    /// reported, and only becomes an error when `require_convergence` is set.
    pub fn fit(
        &mut self,
        observations: &[f64],
        config: &HmmFitConfig,
        rng: &mut SeededRng,
    ) -> RegimeResult<FitReport> {
        config.validate()?;
        validate_data_length(
            observations,
            MIN_OBSERVATIONS_PER_STATE * self.num_states,
            "HMM fit",
        )?;
        validate_all_finite(observations, "observations")?;

        let mut history = Vec::with_capacity(config.max_iterations);
        let mut counters = FitCounters::default();
        let mut best: Option<(f64, Self)> = None;
        let mut stagnation_count = 0;
        let mut stop_reason = StopReason::IterationCap;
        let mut final_log_likelihood = None;

        for iteration in 0..config.max_iterations {
            let fb = self.forward_backward(observations)?;
            let log_likelihood = fb.log_likelihood;
            log::debug!("EM iteration {}: log-likelihood {:.6}", iteration, log_likelihood);

            if best.as_ref().map_or(true, |(ll, _)| log_likelihood > *ll) {
                best = Some((log_likelihood, self.clone()));
            }

            if let Some(&previous) = history.last() {
                let improvement: f64 = log_likelihood - previous;
                if improvement.abs() < config.tolerance {
                    history.push(log_likelihood);
                    stop_reason = StopReason::Converged;
                    final_log_likelihood = Some(log_likelihood);
                    break;
                }

                // A reinitialized state is expected to cost likelihood once
                if improvement < 0.0 && !counters.reinitialized_last {
                    stagnation_count += 1;
                    if stagnation_count >= config.max_stagnation {
                        history.push(log_likelihood);
                        stop_reason = StopReason::Stagnated;
                        break;
                    }
                } else {
                    stagnation_count = 0;
                }
            }

            history.push(log_likelihood);
            counters.reinitialized_last = false;
            self.update_parameters(observations, &fb, config, rng, &mut counters)?;
        }

        if stop_reason == StopReason::Stagnated {
            if let Some((ll, model)) = best {
                *self = model;
                final_log_likelihood = Some(ll);
            }
        }

        let log_likelihood = match final_log_likelihood {
            Some(ll) => ll,
            None => self.log_likelihood(observations)?,
        };

        if config.canonical_order {
            self.canonicalize();
        }
        self.validate_probabilities()?;

        let report = FitReport {
            iterations: history.len(),
            log_likelihood,
            stop_reason,
            log_likelihood_history: history,
            reinitialized_states: counters.reinitialized,
            rejected_emission_fits: counters.rejected,
        };

        match stop_reason {
            StopReason::Converged => log::info!(
                "Baum-Welch converged after {} iterations (log-likelihood {:.4})",
                report.iterations,
                log_likelihood
            ),
            StopReason::Stagnated => log::info!(
                "Baum-Welch stopped after {} iterations without improvement (log-likelihood {:.4})",
                report.iterations,
                log_likelihood
            ),
            StopReason::IterationCap => {
                if config.require_convergence {
                    return Err(RegimeAnalysisError::ConvergenceFailure {
                        iterations: report.iterations,
                        last_improvement: report.last_improvement(),
                    });
                }
                log::warn!(
                    "Baum-Welch did not converge within {} iterations (last improvement {:.3e})",
                    report.iterations,
                    report.last_improvement()
                );
            }
        }

        Ok(report)
    }

    /// Scaled forward-backward pass.
    pub fn forward_backward(&self, observations: &[f64]) -> RegimeResult<ForwardBackward> {
        validate_data_length(observations, 1, "forward-backward")?;
        let t_len = observations.len();
        let k = self.num_states;

        let mut log_likelihood = 0.0;
        let mut scaled_emissions = Vec::with_capacity(t_len);
        for (t, &x) in observations.iter().enumerate() {
            let logs: Vec<f64> = self.emissions.iter().map(|e| e.ln_density(x)).collect();
            let max = logs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                return Err(RegimeAnalysisError::NumericalInstability {
                    message: format!(
                        "no state gives a finite density to observation {} ({})",
                        t, x
                    ),
                });
            }
            log_likelihood += max;
            scaled_emissions.push(
                logs.iter()
                    .map(|&l| if l.is_nan() { 0.0 } else { (l - max).exp() })
                    .collect::<Vec<f64>>(),
            );
        }

        let mut alpha = vec![vec![0.0; k]; t_len];
        let mut scale = vec![0.0; t_len];
        for t in 0..t_len {
            for j in 0..k {
                let prior = if t == 0 {
                    self.initial_probs[j]
                } else {
                    (0..k)
                        .map(|i| alpha[t - 1][i] * self.transition_matrix[i][j])
                        .sum::<f64>()
                };
                alpha[t][j] = prior * scaled_emissions[t][j];
            }
            let c: f64 = alpha[t].iter().sum();
            if !(c > 0.0 && c.is_finite()) {
                return Err(RegimeAnalysisError::NumericalInstability {
                    message: format!("forward variables vanished at t = {}", t),
                });
            }
            alpha[t].iter_mut().for_each(|a| *a /= c);
            scale[t] = c;
            log_likelihood += c.ln();
        }

        let mut beta = vec![vec![1.0; k]; t_len];
        for t in (0..t_len - 1).rev() {
            for i in 0..k {
                beta[t][i] = (0..k)
                    .map(|j| {
                        self.transition_matrix[i][j] * scaled_emissions[t + 1][j] * beta[t + 1][j]
                    })
                    .sum::<f64>()
                    / scale[t + 1];
            }
        }

        validate_finite(log_likelihood, "log-likelihood")?;

        Ok(ForwardBackward {
            alpha,
            beta,
            scaled_emissions,
            scale,
            log_likelihood,
        })
    }

    /// Posterior state probabilities for every observation.
    pub fn posterior(&self, observations: &[f64]) -> RegimeResult<Vec<Vec<f64>>> {
        validate_all_finite(observations, "observations")?;
        Ok(self.forward_backward(observations)?.posteriors())
    }

    /// Log-likelihood of `observations` under the model.
    pub fn log_likelihood(&self, observations: &[f64]) -> RegimeResult<f64> {
        validate_all_finite(observations, "observations")?;
        Ok(self.forward_backward(observations)?.log_likelihood)
    }

    /// Label each observation with its most probable state.
    ///
    /// Labels maximize the marginal posterior at each timestep, so the
    /// sequence is not necessarily a feasible single path.
    pub fn decode(&self, observations: &[f64]) -> RegimeResult<Vec<usize>> {
        Ok(self
            .posterior(observations)?
            .iter()
            .map(|row| argmax(row))
            .collect())
    }

    /// Decode the single most likely state path.
    pub fn viterbi(&self, observations: &[f64]) -> RegimeResult<Vec<usize>> {
        validate_data_length(observations, 1, "Viterbi decoding")?;
        validate_all_finite(observations, "observations")?;
        let t_len = observations.len();
        let k = self.num_states;

        let ln_transition: Vec<Vec<f64>> = self
            .transition_matrix
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();
        let mut delta = vec![vec![0.0; k]; t_len];
        let mut psi = vec![vec![0; k]; t_len];

        for j in 0..k {
            delta[0][j] =
                self.initial_probs[j].ln() + self.emissions[j].ln_density(observations[0]);
        }

        for t in 1..t_len {
            for j in 0..k {
                let mut max_val = f64::NEG_INFINITY;
                let mut max_idx = 0;
                for i in 0..k {
                    let val = delta[t - 1][i] + ln_transition[i][j];
                    if val > max_val {
                        max_val = val;
                        max_idx = i;
                    }
                }
                delta[t][j] = max_val + self.emissions[j].ln_density(observations[t]);
                psi[t][j] = max_idx;
            }
        }

        let mut path = vec![0; t_len];
        path[t_len - 1] = argmax(&delta[t_len - 1]);
        for t in (0..t_len - 1).rev() {
            path[t] = psi[t + 1][path[t + 1]];
        }
        Ok(path)
    }

    /// Decode with the selected method.
    pub fn decode_with(
        &self,
        observations: &[f64],
        method: DecodeMethod,
    ) -> RegimeResult<Vec<usize>> {
        match method {
            DecodeMethod::Posterior => self.decode(observations),
            DecodeMethod::Viterbi => self.viterbi(observations),
        }
    }

    /// Relabel states by ascending dispersion, then location.
    pub fn canonicalize(&mut self) {
        let mut order: Vec<usize> = (0..self.num_states).collect();
        order.sort_by(|&a, &b| {
            let (ea, eb) = (&self.emissions[a], &self.emissions[b]);
            float_total_cmp(&ea.dispersion(), &eb.dispersion())
                .then_with(|| float_total_cmp(&ea.location(), &eb.location()))
        });
        if order.iter().enumerate().all(|(i, &o)| i == o) {
            return;
        }

        self.initial_probs = order.iter().map(|&i| self.initial_probs[i]).collect();
        self.emissions = order.iter().map(|&i| self.emissions[i].clone()).collect();
        self.transition_matrix = order
            .iter()
            .map(|&i| order.iter().map(|&j| self.transition_matrix[i][j]).collect())
            .collect();
    }

    /// Check that the initial distribution and every transition row are
    /// probability vectors.
    pub fn validate_probabilities(&self) -> RegimeResult<()> {
        validate_probability_vector(&self.initial_probs, PROBABILITY_TOLERANCE, "initial_probs")?;
        for (i, row) in self.transition_matrix.iter().enumerate() {
            let name = format!("transition_matrix[{}]", i);
            validate_probability_vector(row, PROBABILITY_TOLERANCE, &name)?;
        }
        Ok(())
    }

    /// Number of free parameters.
    pub fn num_parameters(&self) -> usize {
        calculate_hmm_parameters(self.num_states, E::NUM_PARAMETERS)
    }

    /// M-step: re-estimate initial, transition and emission parameters.
    fn update_parameters(
        &mut self,
        observations: &[f64],
        fb: &ForwardBackward,
        config: &HmmFitConfig,
        rng: &mut SeededRng,
        counters: &mut FitCounters,
    ) -> RegimeResult<()> {
        let t_len = observations.len();
        let k = self.num_states;
        let gamma = fb.posteriors();

        // Accumulate ξ on the fly instead of storing the T×N×N tensor
        let mut transition_numerators = vec![vec![0.0; k]; k];
        let mut transition_denominators = vec![0.0; k];
        let mut xi = vec![vec![0.0; k]; k];
        for t in 0..t_len.saturating_sub(1) {
            let mut xi_sum = 0.0;
            for i in 0..k {
                for j in 0..k {
                    xi[i][j] = fb.alpha[t][i]
                        * self.transition_matrix[i][j]
                        * fb.scaled_emissions[t + 1][j]
                        * fb.beta[t + 1][j];
                    xi_sum += xi[i][j];
                }
            }
            if xi_sum > 0.0 {
                for i in 0..k {
                    for j in 0..k {
                        let value = xi[i][j] / xi_sum;
                        transition_numerators[i][j] += value;
                        transition_denominators[i] += value;
                    }
                }
            }
        }

        self.initial_probs = gamma[0].clone();
        floor_and_normalize(&mut self.initial_probs);

        for i in 0..k {
            if transition_denominators[i] > constants::MIN_DENSITY {
                for j in 0..k {
                    self.transition_matrix[i][j] =
                        transition_numerators[i][j] / transition_denominators[i];
                }
                floor_and_normalize(&mut self.transition_matrix[i]);
            }
        }

        for state in 0..k {
            let weights: Vec<f64> = gamma.iter().map(|row| row[state]).collect();
            let mass: f64 = weights.iter().sum();

            if mass < config.min_state_mass {
                match config.collapse_policy {
                    CollapsePolicy::Abort => {
                        return Err(RegimeAnalysisError::StateCollapse { state, mass });
                    }
                    CollapsePolicy::Reinitialize
                        if counters.reinitialized < config.max_reinitializations =>
                    {
                        log::warn!(
                            "State {} collapsed (mass {:.3e}); reinitializing from a random block",
                            state,
                            mass
                        );
                        self.reinitialize_state(state, observations, config, rng);
                        counters.reinitialized += 1;
                        counters.reinitialized_last = true;
                    }
                    _ => {
                        log::warn!(
                            "State {} collapsed (mass {:.3e}); keeping its parameters",
                            state,
                            mass
                        );
                    }
                }
                continue;
            }

            match E::fit_weighted(observations, &weights) {
                Ok(emission) => self.emissions[state] = emission,
                Err(err) => {
                    counters.rejected += 1;
                    log::warn!("Emission update for state {} rejected: {}", state, err);
                }
            }
        }

        Ok(())
    }

    /// Refit one state on a random block and reset its transition row.
    fn reinitialize_state(
        &mut self,
        state: usize,
        observations: &[f64],
        config: &HmmFitConfig,
        rng: &mut SeededRng,
    ) {
        match fit_random_block(observations, config.reinit_block, rng) {
            Ok(emission) => self.emissions[state] = emission,
            Err(err) => log::warn!("Reinitialization of state {} failed: {}", state, err),
        }
        self.transition_matrix[state] =
            persistence_row(self.num_states, state, config.initial_persistence);
    }
}

impl RegimeHmm<AlphaStableEmission> {
    /// Snapshot of the fitted parameters.
    pub fn parameters(&self) -> HmmParameters {
        HmmParameters {
            num_states: self.num_states,
            initial_probs: self.initial_probs.clone(),
            transition_matrix: self.transition_matrix.clone(),
            emission_params: self.emissions.iter().map(|e| *e.params()).collect(),
        }
    }
}

/// Initialize and fit an Alpha-Stable HMM with `num_states` states.
pub fn fit_stable_hmm(
    observations: &[f64],
    num_states: usize,
    config: &HmmFitConfig,
    rng: &mut SeededRng,
) -> RegimeResult<(RegimeHmm<AlphaStableEmission>, FitReport)> {
    let mut model = RegimeHmm::initialize(observations, num_states, config, rng)?;
    let report = model.fit(observations, config, rng)?;
    Ok((model, report))
}

/// Per-observation posterior arg-max labels of a fitted model.
pub fn decode<E: EmissionModel>(
    model: &RegimeHmm<E>,
    observations: &[f64],
) -> RegimeResult<Vec<usize>> {
    model.decode(observations)
}

fn persistence_row(num_states: usize, state: usize, persistence: f64) -> Vec<f64> {
    if num_states == 1 {
        return vec![1.0];
    }
    let off = (1.0 - persistence) / (num_states - 1) as f64;
    (0..num_states)
        .map(|j| if j == state { persistence } else { off })
        .collect()
}

fn persistence_matrix(num_states: usize, persistence: f64) -> Vec<Vec<f64>> {
    (0..num_states)
        .map(|i| persistence_row(num_states, i, persistence))
        .collect()
}

/// Floor probabilities at the minimum transition probability and renormalize.
fn floor_and_normalize(probs: &mut [f64]) {
    for p in probs.iter_mut() {
        if !p.is_finite() || *p < constants::MIN_TRANSITION_PROB {
            *p = constants::MIN_TRANSITION_PROB;
        }
    }
    let total: f64 = probs.iter().sum();
    probs.iter_mut().for_each(|p| *p /= total);
}

fn fit_random_block<E: EmissionModel>(
    observations: &[f64],
    block: usize,
    rng: &mut SeededRng,
) -> RegimeResult<E> {
    let block = block.min(observations.len());
    let start = rng.usize(0..observations.len() - block + 1);
    E::fit_weighted(&observations[start..start + block], &vec![1.0; block])
}

/// Standardized rolling (mean, log standard deviation) around each timestep.
fn rolling_features(observations: &[f64], window: usize) -> Vec<Vector2<f64>> {
    let n = observations.len();
    let half = window / 2;
    let mut sum = vec![0.0; n + 1];
    let mut sum_sq = vec![0.0; n + 1];
    for (i, &x) in observations.iter().enumerate() {
        sum[i + 1] = sum[i] + x;
        sum_sq[i + 1] = sum_sq[i] + x * x;
    }

    let raw: Vec<Vector2<f64>> = (0..n)
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(n);
            let count = (hi - lo) as f64;
            let mean = (sum[hi] - sum[lo]) / count;
            let var = (sum_sq[hi] - sum_sq[lo]) / count - mean * mean;
            Vector2::new(mean, 0.5 * var.max(constants::MIN_VARIANCE).ln())
        })
        .collect();

    let count = n as f64;
    let centre = raw.iter().fold(Vector2::<f64>::zeros(), |acc, f| acc + f) / count;
    let spread = raw
        .iter()
        .fold(Vector2::<f64>::zeros(), |acc, f| {
            acc + (f - centre).component_mul(&(f - centre))
        })
        / count;
    let spread = spread.map(|v| if v > constants::MIN_VARIANCE { v.sqrt() } else { 1.0 });
    raw.iter()
        .map(|f| (f - centre).component_div(&spread))
        .collect()
}

/// Cluster features with k-means++ seeding and Lloyd iterations.
fn kmeans_assignments(
    features: &[Vector2<f64>],
    num_states: usize,
    rng: &mut SeededRng,
) -> Vec<usize> {
    let mut centroids = initialize_centroids_plus_plus(features, num_states, rng);
    let mut assignments = vec![0; features.len()];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        for (i, feature) in features.iter().enumerate() {
            let distances: Vec<f64> = centroids
                .iter()
                .map(|c| -(feature - c).norm_squared())
                .collect();
            assignments[i] = argmax(&distances);
        }

        let mut new_centroids = vec![Vector2::<f64>::zeros(); num_states];
        let mut counts = vec![0usize; num_states];
        for (feature, &cluster) in features.iter().zip(&assignments) {
            new_centroids[cluster] += feature;
            counts[cluster] += 1;
        }

        let mut max_change = 0.0f64;
        for j in 0..num_states {
            if counts[j] > 0 {
                new_centroids[j] /= counts[j] as f64;
                max_change = max_change.max((new_centroids[j] - centroids[j]).norm());
            } else {
                new_centroids[j] = centroids[j];
            }
        }
        centroids = new_centroids;

        if max_change < KMEANS_TOLERANCE {
            break;
        }
    }

    assignments
}

fn initialize_centroids_plus_plus(
    features: &[Vector2<f64>],
    num_states: usize,
    rng: &mut SeededRng,
) -> Vec<Vector2<f64>> {
    let mut centroids = Vec::with_capacity(num_states);
    centroids.push(features[rng.usize(0..features.len())]);

    for _ in 1..num_states {
        let distances: Vec<f64> = features
            .iter()
            .map(|f| {
                centroids
                    .iter()
                    .map(|c| (f - c).norm_squared())
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();
        if !(total > 0.0) {
            centroids.push(features[rng.usize(0..features.len())]);
            continue;
        }

        let target = rng.f64() * total;
        let mut cumulative = 0.0;
        let mut chosen = features.len() - 1;
        for (i, &d) in distances.iter().enumerate() {
            cumulative += d;
            if cumulative >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(features[chosen]);
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission_models::GaussianEmission;
    use assert_approx_eq::assert_approx_eq;

    fn gaussian(mean: f64, std_dev: f64) -> GaussianEmission {
        GaussianEmission::new(mean, std_dev).unwrap()
    }

    fn two_volatility_series(rng: &mut SeededRng) -> Vec<f64> {
        let mut data = rng.normal_vec(0.0, 0.01, 300).unwrap();
        data.extend(rng.normal_vec(0.0, 0.05, 300).unwrap());
        data.extend(rng.normal_vec(0.0, 0.01, 300).unwrap());
        data
    }

    #[test]
    fn test_hmm_creation() {
        let hmm = RegimeHmm::with_emissions(
            vec![gaussian(0.0, 1.0), gaussian(1.0, 2.0), gaussian(0.0, 3.0)],
            0.8,
        )
        .unwrap();
        assert_eq!(hmm.num_states, 3);
        assert_eq!(hmm.initial_probs.len(), 3);

        let initial_sum: f64 = hmm.initial_probs.iter().sum();
        assert!((initial_sum - 1.0).abs() < 1e-10);
        for row in &hmm.transition_matrix {
            let row_sum: f64 = row.iter().sum();
            assert!((row_sum - 1.0).abs() < 1e-10);
        }
        assert_approx_eq!(hmm.transition_matrix[1][1], 0.8);

        let single = RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0)], 0.5).unwrap();
        assert_eq!(single.transition_matrix, vec![vec![1.0]]);

        assert!(RegimeHmm::<GaussianEmission>::with_emissions(vec![], 0.9).is_err());
        assert!(RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0)], 1.5).is_err());
    }

    #[test]
    fn test_forward_backward_matches_path_enumeration() {
        let hmm =
            RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0), gaussian(2.0, 0.5)], 0.7).unwrap();
        let obs = [0.1, 1.9, 2.2];

        let mut total = 0.0;
        for path in 0..8usize {
            let states = [path & 1, (path >> 1) & 1, (path >> 2) & 1];
            let mut p = hmm.initial_probs[states[0]]
                * hmm.emissions[states[0]].ln_density(obs[0]).exp();
            for t in 1..3 {
                p *= hmm.transition_matrix[states[t - 1]][states[t]]
                    * hmm.emissions[states[t]].ln_density(obs[t]).exp();
            }
            total += p;
        }

        let fb = hmm.forward_backward(&obs).unwrap();
        assert_approx_eq!(fb.log_likelihood, total.ln(), 1e-10);
        for row in fb.posteriors() {
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-12);
        }
    }

    #[test]
    fn test_viterbi_and_posterior_on_clear_data() {
        let hmm =
            RegimeHmm::with_emissions(vec![gaussian(-5.0, 1.0), gaussian(5.0, 1.0)], 0.9).unwrap();
        let obs = [-5.2, -4.8, -5.1, 5.3, 4.9, 5.0];
        let expected = vec![0, 0, 0, 1, 1, 1];
        assert_eq!(hmm.viterbi(&obs).unwrap(), expected);
        assert_eq!(hmm.decode(&obs).unwrap(), expected);
        assert_eq!(hmm.decode_with(&obs, DecodeMethod::Viterbi).unwrap(), expected);
    }

    #[test]
    fn test_canonicalize_preserves_likelihood() {
        let mut hmm =
            RegimeHmm::with_emissions(vec![gaussian(0.0, 3.0), gaussian(1.0, 1.0)], 0.9).unwrap();
        hmm.transition_matrix = vec![vec![0.6, 0.4], vec![0.1, 0.9]];
        hmm.initial_probs = vec![0.3, 0.7];
        let obs = [0.5, -2.0, 1.1, 0.9, 4.0];
        let before = hmm.log_likelihood(&obs).unwrap();

        hmm.canonicalize();
        assert_approx_eq!(hmm.emissions[0].std_dev, 1.0);
        assert_approx_eq!(hmm.transition_matrix[0][0], 0.9);
        assert_approx_eq!(hmm.transition_matrix[1][0], 0.4);
        assert_approx_eq!(hmm.initial_probs[0], 0.7);
        assert_approx_eq!(hmm.log_likelihood(&obs).unwrap(), before, 1e-12);
    }

    #[test]
    fn test_gaussian_baum_welch_separates_volatility() {
        let mut rng = SeededRng::with_seed(17);
        let data = two_volatility_series(&mut rng);
        let config = HmmFitConfig::standard();
        let mut hmm =
            RegimeHmm::<GaussianEmission>::initialize(&data, 2, &config, &mut rng).unwrap();
        let report = hmm.fit(&data, &config, &mut rng).unwrap();

        // Exact M-steps never decrease the likelihood
        for pair in report.log_likelihood_history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6);
        }
        for row in &hmm.transition_matrix {
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-9);
        }

        let labels = hmm.decode(&data).unwrap();
        assert_eq!(labels.len(), data.len());
        let high = labels[300..600].iter().filter(|&&l| l == 1).count();
        let low = labels[..300].iter().chain(&labels[600..]).filter(|&&l| l == 0).count();
        assert!(high > 270 && low > 540, "high={} low={}", high, low);
    }

    #[test]
    fn test_collapse_policies() {
        let mut rng = SeededRng::with_seed(5);
        let data = rng.normal_vec(0.0, 1.0, 200).unwrap();
        let far_state = || {
            RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0), gaussian(1000.0, 1.0)], 0.9).unwrap()
        };

        let abort = HmmFitConfig {
            collapse_policy: CollapsePolicy::Abort,
            ..HmmFitConfig::quick()
        };
        match far_state().fit(&data, &abort, &mut rng) {
            Err(RegimeAnalysisError::StateCollapse { state, mass }) => {
                assert_eq!(state, 1);
                assert!(mass < 1.0);
            }
            other => panic!("Expected StateCollapse, got {:?}", other),
        }

        let freeze = HmmFitConfig {
            collapse_policy: CollapsePolicy::Freeze,
            canonical_order: false,
            ..HmmFitConfig::quick()
        };
        let mut hmm = far_state();
        hmm.fit(&data, &freeze, &mut rng).unwrap();
        assert_approx_eq!(hmm.emissions[1].mean, 1000.0);

        let reinit = HmmFitConfig {
            canonical_order: false,
            ..HmmFitConfig::quick()
        };
        let mut hmm = far_state();
        let report = hmm.fit(&data, &reinit, &mut rng).unwrap();
        assert!(report.reinitialized_states >= 1);
        assert!(hmm.emissions[1].mean.abs() < 1.0);
    }

    #[test]
    fn test_require_convergence() {
        let mut rng = SeededRng::with_seed(8);
        let data = two_volatility_series(&mut rng);
        let config = HmmFitConfig {
            max_iterations: 1,
            require_convergence: true,
            ..HmmFitConfig::standard()
        };
        let mut hmm =
            RegimeHmm::<GaussianEmission>::initialize(&data, 2, &config, &mut rng).unwrap();
        assert!(matches!(
            hmm.fit(&data, &config, &mut rng),
            Err(RegimeAnalysisError::ConvergenceFailure { iterations: 1, .. })
        ));

        let lenient = HmmFitConfig {
            max_iterations: 1,
            ..HmmFitConfig::standard()
        };
        let report = hmm.fit(&data, &lenient, &mut rng).unwrap();
        assert_eq!(report.stop_reason, StopReason::IterationCap);
    }

    #[test]
    fn test_validate_probabilities() {
        let mut hmm =
            RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0), gaussian(2.0, 1.0)], 0.9).unwrap();
        assert!(hmm.validate_probabilities().is_ok());

        hmm.transition_matrix[1] = vec![0.5, 0.6];
        match hmm.validate_probabilities() {
            Err(RegimeAnalysisError::InvalidParameter { parameter, .. }) => {
                assert_eq!(parameter, "sum(transition_matrix[1])");
            }
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }

        hmm.transition_matrix[1] = vec![0.5, 0.5];
        hmm.initial_probs = vec![f64::NAN, 1.0];
        assert!(hmm.validate_probabilities().is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        let mut rng = SeededRng::with_seed(1);
        let config = HmmFitConfig::quick();
        assert!(matches!(
            RegimeHmm::<GaussianEmission>::initialize(&[], 2, &config, &mut rng),
            Err(RegimeAnalysisError::InsufficientData { .. })
        ));
        assert!(
            RegimeHmm::<GaussianEmission>::initialize(&[1.0; 50], 0, &config, &mut rng).is_err()
        );

        let mut data = vec![0.1; 50];
        data[7] = f64::NAN;
        assert!(matches!(
            RegimeHmm::<GaussianEmission>::initialize(&data, 2, &config, &mut rng),
            Err(RegimeAnalysisError::InvalidParameter { .. })
        ));

        let hmm = RegimeHmm::with_emissions(vec![gaussian(0.0, 1.0)], 0.9).unwrap();
        assert!(hmm.decode(&[]).is_err());
        assert!(hmm.viterbi(&[f64::INFINITY]).is_err());
    }
}
