use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SirFitError {
    /// The ODE solver could not advance the state
    #[error("Integration failed at t = {time}: {reason}")]
    Integration { time: f64, reason: String },
    /// Not enough time points to build central differences
    #[error("At least {required} time points are required, got {found}")]
    InsufficientData { required: usize, found: usize },
    #[error("Inputs have {inputs} rows but targets have {targets}")]
    ShapeMismatch { inputs: usize, targets: usize },
    #[error("Expected {expected} constants, got {found}")]
    ConstantCount { expected: usize, found: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Results directory {} does not exist", .0.display())]
    ResultsDir(PathBuf),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Constant optimization failed: {0}")]
    Optimizer(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
