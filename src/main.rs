//! PriceForge: house price estimation CLI
//!
//! `train` runs the offline pipeline and writes the artifacts; `predict` and
//! `locations` read them back.

use anyhow::Result;
use clap::Parser;
use priceforge::cli::{ArtifactArgs, Cli, Command, PredictArgs, TrainArgs};
use priceforge::{train_and_save, ArtifactPaths, PriceQuery, SharedPredictor, TrainConfig};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "priceforge=debug" } else { "priceforge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Train(args) => run_training(args, cli.verbose),
        Command::Predict(args) => Ok(run_prediction(args)),
        Command::Locations(args) => Ok(list_locations(&args)),
    }
}

/// Use the process-wide predictor unless another directory was requested
fn with_predictor<T>(args: &ArtifactArgs, f: impl FnOnce(&SharedPredictor) -> T) -> T {
    match &args.artifacts {
        Some(dir) => f(&SharedPredictor::new(ArtifactPaths::new(dir))),
        None => f(SharedPredictor::global()),
    }
}

fn run_training(args: TrainArgs, verbose: bool) -> Result<ExitCode> {
    println!("=== House Price Model Training ===\n");
    let config = TrainConfig::from(args);

    if verbose {
        println!("Input file:     {}", config.dataset.display());
        println!("Artifacts:      {}", config.artifact_dir.display());
        println!("Model:          {:?}", config.model.kind);
        println!("Target:         {:?}", config.model.target);
        println!("Outlier filter: {:?}\n", config.outliers);
    }

    let start_time = Instant::now();
    let outcome = train_and_save(&config)?;

    let cleaning = &outcome.cleaning;
    println!("✓ Data cleaned: {} of {} rows kept", cleaning.after_outliers, cleaning.raw_rows);
    println!(
        "  {} incomplete, {} duplicate, {} outlier rows removed",
        cleaning.raw_rows - cleaning.after_missing,
        cleaning.after_missing - cleaning.after_duplicates,
        cleaning.after_duplicates - cleaning.after_outliers
    );
    println!("  {} locations encoded\n", outcome.encoder.len());

    println!("{}\n", outcome.evaluation);

    println!("✓ Artifacts saved to: {}", config.artifact_dir.display());
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(ExitCode::SUCCESS)
}

fn run_prediction(args: PredictArgs) -> ExitCode {
    let query = PriceQuery::new(args.location, args.area, args.bhk, args.bathroom);

    match with_predictor(&args.artifacts, |predictor| predictor.estimate(&query)) {
        Ok(estimate) => {
            println!("=== Price Estimate ===");
            println!(
                "{}, {} sq ft, {} BHK, {} bathroom(s)\n",
                query.location, query.area, query.bhk, query.bathroom
            );
            println!("{}", estimate);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_locations(args: &ArtifactArgs) -> ExitCode {
    let listed = with_predictor(args, |predictor| {
        predictor.locations().map(|locations| locations.to_vec())
    });

    match listed {
        Ok(locations) => {
            for location in &locations {
                println!("{}", location);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}
