//! The offline training job: load, clean, encode, fit, evaluate, save

use anyhow::Context;
use ndarray::{Array1, Array2, Axis};
use std::fs;

use crate::artifact::{save_artifacts, ArtifactPaths};
use crate::config::TrainConfig;
use crate::data::{load_and_clean, CleaningReport, HouseData};
use crate::encoder::LocationEncoder;
use crate::evaluate::{cross_validate, evaluate_holdout, train_test_split, EvaluationReport};
use crate::model::{PricePipeline, FEATURE_NAMES};

/// Result of one training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub cleaning: CleaningReport,
    pub evaluation: EvaluationReport,
    pub pipeline: PricePipeline,
    pub encoder: LocationEncoder,
}

/// Encode locations and assemble the feature matrix in [`FEATURE_NAMES`]
/// order, together with the raw prices.
pub fn prepare_features(data: &HouseData) -> crate::Result<(Array2<f64>, Array1<f64>, LocationEncoder)> {
    let (encoder, codes) = LocationEncoder::fit_transform(data.location.as_slice())?;

    let features = Array2::from_shape_fn((data.len(), FEATURE_NAMES.len()), |(i, j)| match j {
        0 => data.area[i],
        1 => data.bhk[i],
        2 => data.bathroom[i],
        _ => codes[i] as f64,
    });
    let prices = Array1::from_vec(data.price.clone());

    tracing::debug!(locations = encoder.len(), rows = data.len(), "features prepared");
    Ok((features, prices, encoder))
}

/// Run the pipeline end to end without touching the artifact directory.
///
/// The returned pipeline is fitted on the training split only; cross
/// validation runs over every cleaned row.
pub fn run_training(config: &TrainConfig) -> crate::Result<TrainingOutcome> {
    config.validate()?;

    let (data, cleaning) = load_and_clean(&config.dataset, &config.outliers)?;
    let (features, prices, encoder) = prepare_features(&data)?;

    let split = train_test_split(features.nrows(), config.test_fraction, config.split_seed)?;
    let x_train = features.select(Axis(0), &split.train);
    let y_train = prices.select(Axis(0), &split.train);
    let x_test = features.select(Axis(0), &split.test);
    let y_test = prices.select(Axis(0), &split.test);
    tracing::info!(train = split.train.len(), test = split.test.len(), "data split");

    tracing::info!(kind = ?config.model.kind, target = ?config.model.target, "fitting pipeline");
    let pipeline = PricePipeline::fit(&x_train, &y_train, &config.model).context("model fitting failed")?;

    let holdout = evaluate_holdout(&pipeline, &x_test, &y_test)?;
    let cv = cross_validate(&features, &prices, &config.model, config.cv_folds)?;
    let evaluation = EvaluationReport {
        holdout,
        cross_validation: cv,
    };
    evaluation.log();

    Ok(TrainingOutcome {
        cleaning,
        evaluation,
        pipeline,
        encoder,
    })
}

/// Train, then write both artifacts and the run configuration
pub fn train_and_save(config: &TrainConfig) -> crate::Result<TrainingOutcome> {
    let outcome = run_training(config)?;

    let paths = ArtifactPaths::new(&config.artifact_dir);
    save_artifacts(&paths, &outcome.pipeline, &outcome.encoder)?;

    let json = serde_json::to_string_pretty(config)?;
    fs::write(paths.train_config(), json)
        .with_context(|| format!("cannot write {}", paths.train_config().display()))?;

    Ok(outcome)
}
