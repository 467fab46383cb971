use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SirFitError;
use crate::network::{Basis, CrossEntropyLoss, Network, NoSparse, TrainOptions};
use crate::simulator::{SirParams, DEFAULT_TIME_POINTS, DEFAULT_X0};

/// Inputs of the SIR dataset, the `s` and `i` columns
const INPUT_SIZE: usize = 2;

/// Values swept over; every combination is trained once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    #[serde(rename = "sDev")]
    pub sdev: Vec<f64>,
    pub top: Vec<usize>,
    pub equalization: Vec<usize>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            sdev: vec![5.0],
            top: vec![1],
            equalization: vec![5],
        }
    }
}

/// One combination of the sweep grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub sdev: f64,
    pub top: usize,
    pub equalization: usize,
}

impl SweepGrid {
    /// Cartesian product in `sDev`, `top`, `equalization` nesting order
    pub fn combinations(&self) -> Vec<SweepPoint> {
        let mut points =
            Vec::with_capacity(self.sdev.len() * self.top.len() * self.equalization.len());
        for &sdev in &self.sdev {
            for &top in &self.top {
                for &equalization in &self.equalization {
                    points.push(SweepPoint {
                        sdev,
                        top,
                        equalization,
                    });
                }
            }
        }
        points
    }
}

/// Hyperparameters of the SIR demo.
///
/// Every field has a default, so a JSON file only needs the values it changes:
///
/// ```json
/// { "epochs": 200, "sweep": { "sDev": [1.0, 5.0], "top": [1, 5] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub epochs: usize,
    pub batches_per_epoch: usize,
    pub learning_rate: f64,
    pub constant_learning_rate: f64,
    pub decay: f64,
    pub temp: f64,
    pub end_temp: f64,
    /// Number of functions sampled per batch
    pub sample_size: usize,
    pub activation_weight: f64,
    pub constant_weight: f64,
    pub skip_connections: bool,
    pub layers: Vec<Vec<Basis>>,
    pub training: TrainOptions,
    pub sweep: SweepGrid,
    pub sir: SirParams,
    pub initial_state: [f64; 3],
    pub time_points: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            batches_per_epoch: 1,
            learning_rate: 1.0,
            constant_learning_rate: 0.05,
            decay: 1.0,
            temp: 10.0,
            end_temp: 10.0,
            sample_size: 100,
            activation_weight: 0.0,
            constant_weight: 0.0,
            skip_connections: true,
            layers: vec![Basis::arithmetic(); 3],
            training: TrainOptions::default(),
            sweep: SweepGrid::default(),
            sir: SirParams::default(),
            initial_state: DEFAULT_X0,
            time_points: DEFAULT_TIME_POINTS,
        }
    }
}

impl SweepConfig {
    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SirFitError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, SirFitError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the sweep meaningless before any training starts
    pub fn validate(&self) -> Result<(), SirFitError> {
        let fail = |msg: &str| Err(SirFitError::InvalidConfig(msg.to_string()));
        if self.epochs == 0 {
            return fail("epochs must be at least 1");
        }
        if self.batches_per_epoch == 0 {
            return fail("batches_per_epoch must be at least 1");
        }
        if self.sample_size == 0 {
            return fail("sample_size must be at least 1");
        }
        if self.time_points < 3 {
            return fail("time_points must be at least 3");
        }
        if self.layers.is_empty() || self.layers.iter().any(Vec::is_empty) {
            return fail("every layer needs at least one basis");
        }
        let grid = &self.sweep;
        if grid.sdev.is_empty() || grid.top.is_empty() || grid.equalization.is_empty() {
            return fail("every sweep dimension needs at least one value");
        }
        if !(self.decay >= 0.0 && self.decay.is_finite()) {
            return fail("decay must be non-negative and finite");
        }
        let sir = [self.sir.beta, self.sir.gamma];
        if sir.iter().chain(&self.initial_state).any(|v| !v.is_finite()) {
            return fail("SIR parameters and initial state must be finite");
        }
        // Every combination must build, so no sweep stops after the results file exists
        for point in grid.combinations() {
            self.network(point, INPUT_SIZE)?;
        }
        if self.equalization_exceeds_epochs() {
            tracing::warn!(
                "equalization {:?} covers all {} epochs, fitness will never drive training",
                self.sweep.equalization,
                self.epochs
            );
        }
        Ok(())
    }

    /// The network trained for one sweep combination, with zeroed constants
    pub fn network(&self, point: SweepPoint, input_size: usize) -> Result<Network, SirFitError> {
        let loss = CrossEntropyLoss::new(point.sdev, point.top)?
            .with_activation_weight(self.activation_weight)
            .with_constant_weight(self.constant_weight);
        let mut network = Network::builder(input_size, self.layers.clone())
            .skip_connections(self.skip_connections)
            .sparsifier(NoSparse)
            .loss(loss)
            .learning_rate(self.learning_rate)
            .constant_learning_rate(self.constant_learning_rate)
            .temperature(self.temp, self.end_temp)
            .equalization(point.equalization)
            .build()?;
        network.set_constants(vec![0.0; network.total_constants()])?;
        Ok(network)
    }

    fn equalization_exceeds_epochs(&self) -> bool {
        self.sweep.equalization.iter().any(|&e| e >= self.epochs)
    }
}
