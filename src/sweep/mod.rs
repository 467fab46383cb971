//! Hyperparameter sweep over the SIR demo.
//!
//! [run] simulates the SIR model, builds the dataset for one compartment and
//! trains a fresh [Network] for every combination of the [SweepGrid], appending
//! one [SweepRecord] per combination to a [ResultsLog].

mod config;

pub use config::{SweepConfig, SweepGrid, SweepPoint};

use std::path::Path;
use std::time::Instant;

use crate::data::{Compartment, Dataset};
use crate::error::SirFitError;
use crate::network::{mse, TrainOptions};
use crate::results::{ResultsLog, SweepRecord};
use crate::simulator::{simulate_sir, time_points};

/// Simulate the SIR model and build the central-difference dataset of `target`
pub fn generate_dataset(
    config: &SweepConfig,
    target: Compartment,
) -> Result<Dataset, SirFitError> {
    let trajectory = simulate_sir(
        &config.sir,
        config.initial_state,
        &time_points(config.time_points),
    )?;
    Dataset::from_trajectory(&trajectory, target)
}

/// Run the full demo: create the results file in `results_dir`, then sweep.
///
/// Returns the log (for its path) and the records in sweep order.
pub fn run(
    config: &SweepConfig,
    target: Compartment,
    results_dir: impl AsRef<Path>,
) -> Result<(ResultsLog, Vec<SweepRecord>), SirFitError> {
    config.validate()?;
    let log = ResultsLog::create(results_dir, target)?;
    tracing::info!("Writing results to {}", log.path().display());

    let dataset = generate_dataset(config, target)?;
    let records = run_sweep(config, &dataset, &log)?;
    Ok((log, records))
}

/// Train once per sweep combination, appending each record to `log` as soon as it is done
pub fn run_sweep(
    config: &SweepConfig,
    dataset: &Dataset,
    log: &ResultsLog,
) -> Result<Vec<SweepRecord>, SirFitError> {
    let points = config.sweep.combinations();
    let mut records = Vec::with_capacity(points.len());

    for (index, point) in points.into_iter().enumerate() {
        tracing::info!(
            "Training with parameters: sDev={}, top={}, equalization={}",
            point.sdev,
            point.top,
            point.equalization
        );
        let record = train_point(config, dataset, point, index)?;
        tracing::info!(
            "Finished in {:.3} min, mse={:e}: {}",
            record.runtime,
            record.mse,
            record.expression
        );
        log.append(&record)?;
        records.push(record);
    }

    Ok(records)
}

fn train_point(
    config: &SweepConfig,
    dataset: &Dataset,
    point: SweepPoint,
    index: usize,
) -> Result<SweepRecord, SirFitError> {
    let start = Instant::now();

    let mut network = config.network(point, dataset.nfeatures())?;

    // Each combination gets its own stream so a single row can be reproduced alone
    let options = TrainOptions {
        seed: config
            .training
            .seed
            .map(|seed| seed.wrapping_add(index as u64)),
        ..config.training.clone()
    };

    let trained = network.train_function(
        config.epochs,
        config.batches_per_epoch,
        config.sample_size,
        config.decay,
        dataset,
        &options,
    )?;
    let predictions = network.forward_fit_constants(&trained.function, dataset)?;
    let error = mse(predictions.view(), dataset.targets());
    let expression = network.apply_symbolic_constant(&trained.function);

    Ok(SweepRecord {
        mse: error,
        expression,
        sdev: point.sdev,
        top: point.top,
        equalization: point.equalization,
        runtime: start.elapsed().as_secs_f64() / 60.0,
    })
}
