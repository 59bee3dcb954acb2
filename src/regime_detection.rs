//! Regime detection with Alpha-Stable Hidden Markov Models.
//!
//! This module provides the main interface: [`detect_regimes`] fits and decodes
//! a return series, and [`run_pipeline`] runs the full simulate → fit → decode
//! → report sequence described by a [`PipelineConfig`].

use crate::{
    config::PipelineConfig,
    emission_models::AlphaStableEmission,
    errors::{validate_all_finite, validate_data_length, RegimeAnalysisError, RegimeResult},
    generators::{generate_segmented_returns, segment_boundaries},
    hmm_core::{fit_stable_hmm, RegimeHmm, MIN_OBSERVATIONS_PER_STATE},
    math_utils::argmax,
    regime_config::DecodeMethod,
    regime_results::{ModelCriteria, RegimeChangePoint, RegimeDetectionResult, RegimeStatistics},
    reporting::{write_report, ReportPaths},
    seeded_rng::SeededRng,
};

// Independent streams derived from the pipeline seed
const DATA_STREAM: u64 = 1;
const FIT_STREAM: u64 = 2;

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Simulated returns
    pub returns: Vec<f64>,
    /// Segment index of every observation
    pub true_segments: Vec<usize>,
    /// Fitted model summary and labels
    pub detection: RegimeDetectionResult,
    /// Share of observations agreeing with the dominant segment of their label
    pub purity: f64,
    /// Files written
    pub report: ReportPaths,
}

/// Fit an Alpha-Stable HMM to `data` and label every observation.
pub fn detect_regimes(
    data: &[f64],
    config: &PipelineConfig,
    rng: &mut SeededRng,
) -> RegimeResult<RegimeDetectionResult> {
    config.validate()?;
    validate_data_length(
        data,
        MIN_OBSERVATIONS_PER_STATE * config.num_states,
        "Regime detection",
    )?;
    validate_all_finite(data, "returns")?;

    let (model, fit_report) = fit_stable_hmm(data, config.num_states, &config.fit, rng)?;

    let state_probabilities = model.posterior(data)?;
    let regime_sequence = match config.decode_method {
        DecodeMethod::Posterior => state_probabilities.iter().map(|row| argmax(row)).collect(),
        DecodeMethod::Viterbi => model.viterbi(data)?,
    };

    let change_points = detect_change_points(&regime_sequence, &state_probabilities, &model);
    let regime_statistics = calculate_regime_statistics(&regime_sequence, data, &model);
    let model_criteria =
        ModelCriteria::new(fit_report.log_likelihood, model.num_parameters(), data.len());

    log::info!(
        "Detected {} change points with {} states (BIC {:.2})",
        change_points.len(),
        model.num_states,
        model_criteria.bic
    );

    Ok(RegimeDetectionResult {
        regime_sequence,
        state_probabilities,
        change_points,
        hmm_params: model.parameters(),
        log_likelihood: fit_report.log_likelihood,
        model_criteria,
        regime_statistics,
        fit_report,
    })
}

/// Simulate the configured segments, detect regimes and write the report.
pub fn run_pipeline(config: &PipelineConfig) -> RegimeResult<PipelineOutput> {
    config.validate()?;
    let root = SeededRng::with_seed(config.seed);

    let returns = generate_segmented_returns(
        config.segment_length,
        &config.segments,
        &mut root.fork(DATA_STREAM),
    )?;
    let true_segments = segment_boundaries(config.segment_length, config.segments.len());
    log::info!(
        "Simulated {} returns in {} segments (seed {})",
        returns.len(),
        config.segments.len(),
        config.seed
    );

    let detection = detect_regimes(&returns, config, &mut root.fork(FIT_STREAM))?;
    let purity = cluster_purity(&true_segments, &detection.regime_sequence)?;
    log::info!("Label purity against simulated segments: {:.1}%", 100.0 * purity);

    let report = write_report(
        &config.output_dir,
        &returns,
        &detection.regime_sequence,
        config.start_date,
    )?;

    Ok(PipelineOutput {
        returns,
        true_segments,
        detection,
        purity,
        report,
    })
}

/// Fraction of observations whose true class is the most common true class
/// among observations with the same predicted label.
pub fn cluster_purity(truth: &[usize], predicted: &[usize]) -> RegimeResult<f64> {
    if truth.len() != predicted.len() {
        return Err(RegimeAnalysisError::InvalidParameter {
            parameter: "predicted.len()".to_string(),
            value: predicted.len() as f64,
            constraint: format!("equal to truth length {}", truth.len()),
        });
    }
    if truth.is_empty() {
        return Err(RegimeAnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let num_true = truth.iter().max().map_or(0, |m| m + 1);
    let num_pred = predicted.iter().max().map_or(0, |m| m + 1);
    let mut counts = vec![vec![0usize; num_true]; num_pred];
    for (&t, &p) in truth.iter().zip(predicted) {
        counts[p][t] += 1;
    }
    let agreeing: usize = counts
        .iter()
        .map(|row| row.iter().copied().max().unwrap_or(0))
        .sum();
    Ok(agreeing as f64 / truth.len() as f64)
}

fn detect_change_points(
    sequence: &[usize],
    state_probabilities: &[Vec<f64>],
    model: &RegimeHmm<AlphaStableEmission>,
) -> Vec<RegimeChangePoint> {
    let mut change_points = Vec::new();
    let mut current_regime_start = 0;

    for i in 1..sequence.len() {
        if sequence[i] == sequence[i - 1] {
            continue;
        }
        let from_state = sequence[i - 1];
        let to_state = sequence[i];
        let from = model.emissions[from_state].params();
        let to = model.emissions[to_state].params();

        change_points.push(RegimeChangePoint {
            time_index: i,
            from_state,
            to_state,
            confidence: state_probabilities[i][to_state],
            location_change: to.delta - from.delta,
            scale_change: to.gamma - from.gamma,
            previous_regime_duration: i - current_regime_start,
        });
        current_regime_start = i;
    }

    change_points
}

fn calculate_regime_statistics(
    sequence: &[usize],
    data: &[f64],
    model: &RegimeHmm<AlphaStableEmission>,
) -> Vec<RegimeStatistics> {
    (0..model.num_states)
        .map(|state| {
            let mut first_occurrence = None;
            let mut last_occurrence = None;
            let mut occurrence_count = 0;
            let mut values = Vec::new();

            for (i, (&label, &x)) in sequence.iter().zip(data).enumerate() {
                if label != state {
                    continue;
                }
                if first_occurrence.is_none() {
                    first_occurrence = Some(i);
                }
                if i == 0 || sequence[i - 1] != state {
                    occurrence_count += 1;
                }
                last_occurrence = Some(i);
                values.push(x);
            }

            let total_duration = values.len();
            let average_duration = if occurrence_count > 0 {
                total_duration as f64 / occurrence_count as f64
            } else {
                0.0
            };
            let (mean_return, return_std) = sample_mean_std(&values);

            RegimeStatistics {
                state_index: state,
                first_occurrence_time: first_occurrence,
                last_occurrence_time: last_occurrence,
                average_duration,
                total_duration,
                occurrence_count,
                mean_return,
                return_std,
                persistence_probability: model.transition_matrix[state][state],
                emission: *model.emissions[state].params(),
            }
        })
        .collect()
}

fn sample_mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha_stable::AlphaStableParams;
    use assert_approx_eq::assert_approx_eq;

    fn two_state_model() -> RegimeHmm<AlphaStableEmission> {
        let low = AlphaStableEmission::new(AlphaStableParams::gaussian(0.0, 0.01).unwrap());
        let high = AlphaStableEmission::new(AlphaStableParams::gaussian(0.0, 0.05).unwrap());
        RegimeHmm::with_emissions(vec![low, high], 0.95).unwrap()
    }

    #[test]
    fn test_cluster_purity() {
        assert_approx_eq!(cluster_purity(&[0, 0, 1, 1], &[1, 1, 0, 0]).unwrap(), 1.0);
        assert_approx_eq!(cluster_purity(&[0, 0, 1, 1], &[0, 0, 0, 0]).unwrap(), 0.5);
        assert_approx_eq!(cluster_purity(&[0, 1, 2], &[0, 1, 2]).unwrap(), 1.0);
        assert!(cluster_purity(&[0], &[0, 1]).is_err());
        assert!(cluster_purity(&[], &[]).is_err());
    }

    #[test]
    fn test_change_points_and_statistics() {
        let model = two_state_model();
        let sequence = vec![0, 0, 1, 1, 1, 0];
        let data = vec![0.01, -0.01, 0.05, -0.05, 0.02, 0.0];
        let probs = vec![vec![0.9, 0.1]; 6];

        let points = detect_change_points(&sequence, &probs, &model);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].time_index, 2);
        assert_eq!(points[0].previous_regime_duration, 2);
        assert_eq!(points[1].from_state, 1);
        assert_eq!(points[1].previous_regime_duration, 3);
        assert!(points[0].scale_change > 0.0);

        let stats = calculate_regime_statistics(&sequence, &data, &model);
        assert_eq!(stats[0].occurrence_count, 2);
        assert_eq!(stats[0].total_duration, 3);
        assert_approx_eq!(stats[0].average_duration, 1.5);
        assert_eq!(stats[1].first_occurrence_time, Some(2));
        assert_eq!(stats[1].last_occurrence_time, Some(4));
        assert_approx_eq!(stats[1].persistence_probability, 0.95);
    }

    #[test]
    fn test_detect_regimes_rejects_short_input() {
        let config = PipelineConfig::quick();
        let mut rng = SeededRng::with_seed(1);
        assert!(matches!(
            detect_regimes(&[0.01; 10], &config, &mut rng),
            Err(RegimeAnalysisError::InsufficientData { .. })
        ));
    }
}
