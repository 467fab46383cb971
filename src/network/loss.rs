use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::SirFitError;

use super::Expr;

/// Cross-entropy objective over the fittest sampled functions.
///
/// The fitness of a function is the mean Gaussian kernel
/// `exp(-(f(x) - y)^2 / (2 sdev^2))` over the batch, reduced by the
/// complexity penalties and clamped at zero. Only the `top` fittest samples
/// of a batch contribute `-fitness * log p(function)` to the loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossEntropyLoss {
    sdev: f64,
    top: usize,
    activation_weight: f64,
    constant_weight: f64,
}

impl CrossEntropyLoss {
    pub fn new(sdev: f64, top: usize) -> Result<Self, SirFitError> {
        if !(sdev > 0.0 && sdev.is_finite()) {
            return Err(SirFitError::InvalidConfig(format!(
                "sDev must be positive and finite, got {}",
                sdev
            )));
        }
        if top == 0 {
            return Err(SirFitError::InvalidConfig(
                "top must select at least one function".to_string(),
            ));
        }
        Ok(Self {
            sdev,
            top,
            activation_weight: 0.0,
            constant_weight: 0.0,
        })
    }

    /// Fitness penalty per basis application
    pub fn with_activation_weight(mut self, weight: f64) -> Self {
        self.activation_weight = weight;
        self
    }

    /// Fitness penalty per constant
    pub fn with_constant_weight(mut self, weight: f64) -> Self {
        self.constant_weight = weight;
        self
    }

    pub fn sdev(&self) -> f64 {
        self.sdev
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn fitness(
        &self,
        expr: &Expr,
        predictions: ArrayView1<f64>,
        targets: ArrayView1<f64>,
    ) -> f64 {
        if targets.is_empty() || predictions.iter().any(|p| !p.is_finite()) {
            return 0.0;
        }
        let denom = 2.0 * self.sdev * self.sdev;
        let kernel = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, y)| (-(p - y) * (p - y) / denom).exp())
            .sum::<f64>()
            / targets.len() as f64;
        let penalty = self.activation_weight * expr.activations() as f64
            + self.constant_weight * expr.constant_slots().len() as f64;
        (kernel - penalty).max(0.0)
    }

    /// Indices of the `top` fittest samples, best first
    pub fn select_top(&self, fitness: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..fitness.len()).collect();
        order.sort_by(|a, b| fitness[*b].total_cmp(&fitness[*a]));
        order.truncate(self.top);
        order
    }
}

/// Mean squared error between predictions and targets, paired element-wise.
///
/// Each prediction is compared only with the target in the same row, never
/// broadcast against the whole target vector, so a perfect fit scores 0.
pub fn mse(predictions: ArrayView1<f64>, targets: ArrayView1<f64>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, y)| (p - y) * (p - y))
        .sum::<f64>()
        / targets.len() as f64
}
