//! Integration tests for full workflow scenarios
//!
//! These tests exercise the generator, the Alpha-Stable HMM trainer, the
//! decoder and the reporter together, the way the pipeline binary uses them.

use assert_approx_eq::assert_approx_eq;
use std::time::{Duration, Instant};
use stable_regime::{
    bitcoin_like_segments, cluster_purity, decode, fit_stable_hmm, generate_segmented_returns,
    read_regime_csv, run_pipeline, segment_boundaries, write_regime_csv, DecodeMethod,
    HmmFitConfig, PipelineConfig, SeededRng, StopReason,
};

fn variance_switching_series(rng: &mut SeededRng) -> (Vec<f64>, Vec<usize>) {
    let mut data = rng.normal_vec(0.0, 0.01, 500).unwrap();
    data.extend(rng.normal_vec(0.0, 0.05, 500).unwrap());
    data.extend(rng.normal_vec(0.0, 0.01, 500).unwrap());
    let truth = segment_boundaries(500, 3)
        .into_iter()
        .map(|segment| segment % 2)
        .collect();
    (data, truth)
}

/// Test scenario: the generator lays out six regimes in the fixed order
#[test]
fn test_generator_produces_six_ordered_segments() {
    let segments = bitcoin_like_segments();
    for &n in &[1usize, 7, 250] {
        let mut rng = SeededRng::with_seed(42);
        let returns = generate_segmented_returns(n, &segments, &mut rng).unwrap();
        assert_eq!(returns.len(), 6 * n);
    }

    let mut rng = SeededRng::with_seed(42);
    let returns = generate_segmented_returns(3000, &segments, &mut rng).unwrap();
    let stds: Vec<f64> = returns
        .chunks(3000)
        .map(|chunk| {
            let mean = chunk.iter().sum::<f64>() / chunk.len() as f64;
            (chunk.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / chunk.len() as f64).sqrt()
        })
        .collect();
    // low/high volatility alternate through bull, bear and range
    for pair in stds.chunks(2) {
        assert!(pair[1] > 2.0 * pair[0], "stds {:?}", stds);
    }
    assert!(stds[4] < stds[0], "range/low is the calmest regime");
}

/// Test scenario: two volatility levels, three segments, two states
///
/// Labels must follow the variance boundaries for more than 80% of the
/// observations.
#[test]
fn test_two_state_fit_follows_variance_boundaries() {
    let mut rng = SeededRng::with_seed(7);
    let (data, truth) = variance_switching_series(&mut rng);

    let (model, report) = fit_stable_hmm(&data, 2, &HmmFitConfig::standard(), &mut rng).unwrap();
    assert!(report.iterations >= 1);
    assert!(report.log_likelihood.is_finite());

    for row in &model.transition_matrix {
        assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-9);
        assert!(row.iter().all(|&p| p > 0.0));
    }
    assert_approx_eq!(model.initial_probs.iter().sum::<f64>(), 1.0, 1e-9);

    let labels = decode(&model, &data).unwrap();
    assert_eq!(labels.len(), data.len());
    assert!(labels.iter().all(|&l| l < 2));

    let purity = cluster_purity(&truth, &labels).unwrap();
    assert!(purity > 0.8, "purity {}", purity);

    // Canonical order puts the calm regime first
    let params = model.parameters();
    assert!(params.emission_params[0].gamma < params.emission_params[1].gamma);
    let high_as_one = labels[500..1000].iter().filter(|&&l| l == 1).count();
    assert!(high_as_one > 400, "high-volatility segment labelled 1 only {} times", high_as_one);
}

/// Test scenario: the two-state fit over a sweep of seeds
///
/// Near-Gaussian segments push the fitted α close to 2, where the skew term
/// vanishes; every seed must still finish quickly and separate the regimes.
#[test]
fn test_two_state_fit_across_seeds() {
    let started = Instant::now();
    for seed in 0..8 {
        let mut rng = SeededRng::with_seed(seed);
        let (data, truth) = variance_switching_series(&mut rng);
        let (model, report) =
            fit_stable_hmm(&data, 2, &HmmFitConfig::standard(), &mut rng).unwrap();
        assert!(report.log_likelihood.is_finite(), "seed {}", seed);

        let labels = decode(&model, &data).unwrap();
        let purity = cluster_purity(&truth, &labels).unwrap();
        assert!(purity > 0.8, "seed {} purity {}", seed, purity);
    }
    assert!(
        started.elapsed() < Duration::from_secs(120),
        "sweep took {:?}",
        started.elapsed()
    );
}

/// Test scenario: decoding is deterministic and agrees with Viterbi on clean data
#[test]
fn test_decoding_is_idempotent() {
    let mut rng = SeededRng::with_seed(11);
    let (data, _) = variance_switching_series(&mut rng);
    let (model, _) = fit_stable_hmm(&data, 2, &HmmFitConfig::quick(), &mut rng).unwrap();

    let first = decode(&model, &data).unwrap();
    let second = decode(&model, &data).unwrap();
    assert_eq!(first, second);

    let viterbi = model.decode_with(&data, DecodeMethod::Viterbi).unwrap();
    assert_eq!(viterbi.len(), data.len());
    let agreement = first.iter().zip(&viterbi).filter(|(a, b)| a == b).count();
    assert!(agreement as f64 / data.len() as f64 > 0.9);
}

/// Test scenario: the same seed reproduces the same fit
#[test]
fn test_fit_is_reproducible() {
    let run = || {
        let mut rng = SeededRng::with_seed(99);
        let (data, _) = variance_switching_series(&mut rng);
        let (model, report) = fit_stable_hmm(&data, 2, &HmmFitConfig::quick(), &mut rng).unwrap();
        (model.parameters().emission_params, report.log_likelihood_history)
    };
    let (params_a, history_a) = run();
    let (params_b, history_b) = run();
    assert_eq!(params_a, params_b);
    assert_eq!(history_a, history_b);
}

/// Test scenario: CSV written for a labelled series reads back unchanged
#[test]
fn test_csv_round_trip() {
    let mut rng = SeededRng::with_seed(3);
    let returns = generate_segmented_returns(250, &bitcoin_like_segments(), &mut rng).unwrap();
    let labels: Vec<usize> = segment_boundaries(250, 6);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regimes.csv");
    let start = stable_regime::config::default_start_date();
    write_regime_csv(&path, &returns, &labels, start).unwrap();

    let records = read_regime_csv(&path).unwrap();
    assert_eq!(records.len(), returns.len());
    for ((record, &r), &l) in records.iter().zip(&returns).zip(&labels) {
        assert_eq!(record.returns, r);
        assert_eq!(record.regime, l);
    }
    assert_eq!(records[0].date.to_string(), "2018-01-01");
    assert_eq!(records[1499].date.to_string(), "2022-02-08");
}

/// Test scenario: the full pipeline on short segments
#[test]
fn test_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        segment_length: 100,
        ..PipelineConfig::quick()
    }
    .with_output_dir(dir.path().join("report"));

    let output = run_pipeline(&config).unwrap();
    assert_eq!(output.returns.len(), 600);
    assert_eq!(output.true_segments.len(), 600);

    let detection = &output.detection;
    assert_eq!(detection.regime_sequence.len(), 600);
    assert!(detection.regime_sequence.iter().all(|&l| l < 6));
    assert_eq!(detection.state_probabilities.len(), 600);
    for row in &detection.hmm_params.transition_matrix {
        assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-9);
    }
    assert!(matches!(
        detection.fit_report.stop_reason,
        StopReason::Converged | StopReason::Stagnated | StopReason::IterationCap
    ));
    assert_eq!(detection.regime_statistics.len(), 6);
    let labelled: usize = detection.regime_statistics.iter().map(|s| s.total_duration).sum();
    assert_eq!(labelled, 600);
    assert!(detection.model_criteria.bic > detection.model_criteria.aic);
    assert!(output.purity > 0.0 && output.purity <= 1.0);

    let records = read_regime_csv(&output.report.csv).unwrap();
    assert_eq!(records.len(), 600);
    assert_eq!(records[599].date.to_string(), "2019-08-23");
    let regimes: Vec<usize> = records.iter().map(|r| r.regime).collect();
    assert_eq!(regimes, detection.regime_sequence);
    assert!(output.report.plot.exists());

    // Same seed, same result
    let again = run_pipeline(&config).unwrap();
    assert_eq!(again.detection.regime_sequence, detection.regime_sequence);
}

/// Test scenario: the shipped default configuration (6 x 1000 days, 6 states)
#[test]
#[ignore = "fits 6000 observations; run with --ignored"]
fn test_standard_pipeline_completes() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::standard().with_output_dir(dir.path());

    let started = Instant::now();
    let output = run_pipeline(&config).unwrap();
    assert!(started.elapsed() < Duration::from_secs(600));

    assert_eq!(output.returns.len(), 6000);
    assert_eq!(output.detection.regime_sequence.len(), 6000);
    assert!(output.detection.regime_sequence.iter().all(|&l| l < 6));
    assert_eq!(read_regime_csv(&output.report.csv).unwrap().len(), 6000);
    assert!(output.report.plot.exists());
}
