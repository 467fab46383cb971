use std::collections::HashMap;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::SirFitError;

use super::loss::mse;
use super::{Function, Network};

/// Execution settings of [Network::train_function]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    /// Evaluate sampled functions on a dedicated thread pool
    pub multiprocessing: bool,
    pub num_processes: usize,
    /// Draw an epoch progress bar on stderr
    pub progress: bool,
    pub seed: Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            multiprocessing: true,
            num_processes: 20,
            progress: false,
            seed: None,
        }
    }
}

/// The fittest function found during training
#[derive(Debug, Clone)]
pub struct TrainedFunction {
    pub function: Function,
    /// Fitness on the full dataset with the constants as they stood right after
    /// the batch it was found in. Later constant updates are not reflected.
    pub fitness: f64,
    pub epoch: usize,
}

/// Adam optimizer over the flat logit vector
struct Adam {
    m: Array1<f64>,
    v: Array1<f64>,
    t: i32,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    fn new(n: usize) -> Self {
        Self {
            m: Array1::zeros(n),
            v: Array1::zeros(n),
            t: 0,
        }
    }

    fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>, lr: f64) {
        self.t += 1;
        let c1 = 1.0 - Self::BETA1.powi(self.t);
        let c2 = 1.0 - Self::BETA2.powi(self.t);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = Self::BETA1 * *m + (1.0 - Self::BETA1) * g;
                *v = Self::BETA2 * *v + (1.0 - Self::BETA2) * g * g;
                *p -= lr * (*m / c1) / ((*v / c2).sqrt() + Self::EPS);
            });
    }
}

impl Network {
    /// Train the edge weights and constants, returning the fittest function seen.
    ///
    /// Every epoch anneals the temperature, then for each of `batches_per_epoch`
    /// row batches samples `sample_size` paths, scores them with the loss and
    /// takes one Adam step on the cross-entropy of the top functions. The
    /// constants of those functions take one gradient step on the batch MSE.
    /// Both learning rates are multiplied by `decay` after each epoch.
    pub fn train_function(
        &mut self,
        epochs: usize,
        batches_per_epoch: usize,
        sample_size: usize,
        decay: f64,
        dataset: &Dataset,
        options: &TrainOptions,
    ) -> Result<TrainedFunction, SirFitError> {
        if epochs == 0 || sample_size == 0 {
            return Err(SirFitError::InvalidConfig(
                "training needs at least one epoch and one sample".to_string(),
            ));
        }
        if dataset.nfeatures() != self.input_size {
            return Err(SirFitError::InvalidConfig(format!(
                "dataset has {} features, the network expects {}",
                dataset.nfeatures(),
                self.input_size
            )));
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let pool = if options.multiprocessing {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(options.num_processes.max(1))
                    .build()?,
            )
        } else {
            None
        };

        let batches = dataset.batches(batches_per_epoch);
        let mut adam = Adam::new(self.weights.len());
        let mut lr = self.learning_rate;
        let mut clr = self.constant_learning_rate;
        let mut best: Option<TrainedFunction> = None;

        let progress = if options.progress {
            let bar = ProgressBar::new(epochs as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} epochs {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        for epoch in 0..epochs {
            let temperature = self.temperature(epoch, epochs);
            let equalizing = epoch < self.equalization;

            for batch in &batches {
                let probs = self.probabilities(temperature);
                let functions: Vec<Function> = (0..sample_size)
                    .map(|_| {
                        let path = self.sample(&probs, &mut rng);
                        self.trace(path)
                    })
                    .collect();
                let fitness = self.evaluate(&functions, batch, pool.as_ref());
                let top = self.loss.select_top(&fitness);

                let weighted: Vec<(usize, f64)> = if equalizing {
                    equalization_weights(&functions)
                } else {
                    top.iter().map(|&i| (i, fitness[i])).collect()
                };

                let mut grad = Array1::zeros(self.weights.len());
                for &(i, weight) in &weighted {
                    self.accumulate_gradient(&mut grad, &functions[i], &probs, weight, temperature);
                }
                adam.step(&mut self.weights, &grad, lr);

                if !equalizing {
                    let selected: Vec<&Function> = top.iter().map(|&i| &functions[i]).collect();
                    self.step_constants(&selected, batch, clr);
                }

                // Rescore the leader on the full dataset with the constants just updated
                let leader = &functions[top[0]];
                let score = self.score(leader, dataset);
                if best.as_ref().map_or(true, |b| score > b.fitness) {
                    best = Some(TrainedFunction {
                        function: leader.clone(),
                        fitness: score,
                        epoch,
                    });
                }
            }

            lr *= decay;
            clr *= decay;

            if let Some(b) = &best {
                progress.set_message(format!("best fitness {:.4}", b.fitness));
                if epoch % 100 == 0 || epoch + 1 == epochs {
                    tracing::debug!(
                        "epoch {}: temperature {:.3}, best fitness {:.6} ({})",
                        epoch,
                        temperature,
                        b.fitness,
                        b.function.expr()
                    );
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        best.ok_or_else(|| SirFitError::InvalidConfig("no function was sampled".to_string()))
    }

    /// Fitness of a function on a dataset with the current constants
    pub fn score(&self, function: &Function, dataset: &Dataset) -> f64 {
        let predictions = function.expr().eval_rows(dataset.inputs(), &self.constants);
        self.loss
            .fitness(function.expr(), predictions.view(), dataset.targets())
    }

    fn evaluate(
        &self,
        functions: &[Function],
        batch: &Dataset,
        pool: Option<&ThreadPool>,
    ) -> Vec<f64> {
        let score = |f: &Function| self.score(f, batch);
        match pool {
            Some(pool) => pool.install(|| functions.par_iter().map(score).collect()),
            None => functions.iter().map(score).collect(),
        }
    }

    /// One gradient step on the batch MSE for the constants of `functions`
    fn step_constants(&mut self, functions: &[&Function], batch: &Dataset, rate: f64) {
        if rate == 0.0 || self.constants.is_empty() {
            return;
        }
        let mut grad = vec![0.0; self.constants.len()];
        let mut trial = self.constants.clone();
        for function in functions {
            let expr = function.expr();
            for slot in expr.constant_slots() {
                let original = trial[slot];
                let h = 1e-6 * original.abs().max(1.0);

                trial[slot] = original + h;
                let up = mse(expr.eval_rows(batch.inputs(), &trial).view(), batch.targets());
                trial[slot] = original - h;
                let down = mse(expr.eval_rows(batch.inputs(), &trial).view(), batch.targets());
                trial[slot] = original;

                let g = (up - down) / (2.0 * h);
                if g.is_finite() {
                    grad[slot] += g;
                }
            }
        }
        for (c, g) in self.constants.iter_mut().zip(grad) {
            *c -= rate * g;
        }
    }
}

/// Weights that give every distinct sampled expression the same total mass
fn equalization_weights(functions: &[Function]) -> Vec<(usize, f64)> {
    let mut counts: HashMap<_, usize> = HashMap::new();
    for f in functions {
        *counts.entry(f.expr()).or_default() += 1;
    }
    let distinct = counts.len() as f64;
    functions
        .iter()
        .enumerate()
        .map(|(i, f)| (i, 1.0 / (counts[f.expr()] as f64 * distinct)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Basis, CrossEntropyLoss};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn dataset(f: impl Fn(f64, f64) -> f64) -> Dataset {
        let n = 30;
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| {
            0.5 + (i as f64 * 0.37 + j as f64 * 0.61).sin().abs()
        });
        let targets = inputs.rows().into_iter().map(|r| f(r[0], r[1])).collect();
        Dataset::new(inputs, targets).unwrap()
    }

    fn product_dataset() -> Dataset {
        dataset(|a, b| a * b)
    }

    fn options(seed: u64, multiprocessing: bool) -> TrainOptions {
        TrainOptions {
            multiprocessing,
            num_processes: 4,
            progress: false,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut adam = Adam::new(2);
        let mut params = array![0.0, 0.0];
        adam.step(&mut params, &array![1.0, -2.0], 0.1);
        assert_relative_eq!(params[0], -0.1, epsilon = 1e-6);
        assert_relative_eq!(params[1], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_equalization_weights() {
        let net = Network::builder(2, vec![vec![Basis::Add]]).build().unwrap();
        let x0 = net.function(vec![0, 0, 0]).unwrap();
        let x1 = net.function(vec![0, 0, 1]).unwrap();
        let weights = equalization_weights(&[x0.clone(), x0, x1]);
        assert_relative_eq!(weights[0].1, 0.25);
        assert_relative_eq!(weights[1].1, 0.25);
        assert_relative_eq!(weights[2].1, 0.5);
    }

    #[test]
    fn test_finds_product() {
        let data = product_dataset();
        let mut net = Network::builder(2, vec![Basis::arithmetic(), Basis::arithmetic()])
            .loss(CrossEntropyLoss::new(0.5, 5).unwrap())
            .equalization(2)
            .build()
            .unwrap();
        let trained = net
            .train_function(50, 1, 100, 1.0, &data, &options(3, false))
            .unwrap();
        let predictions = net.forward_fit_constants(&trained.function, &data).unwrap();
        assert!(mse(predictions.view(), data.targets()) < 1e-10);
        assert_relative_eq!(trained.fitness, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_training_concentrates_probability() {
        let data = dataset(|a, b| a / b);
        let mut net = Network::builder(2, vec![vec![Basis::Divide, Basis::Add]])
            .loss(CrossEntropyLoss::new(0.1, 1).unwrap())
            .temperature(1.0, 1.0)
            .learning_rate(0.1)
            .build()
            .unwrap();
        net.train_function(200, 1, 50, 1.0, &data, &options(11, false))
            .unwrap();
        assert_eq!(net.most_probable(1.0).expr().to_string(), "x0/x1");
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let data = product_dataset();
        let build = || {
            Network::builder(2, vec![Basis::arithmetic()])
                .loss(CrossEntropyLoss::new(1.0, 3).unwrap())
                .build()
                .unwrap()
        };
        let mut a = build();
        let mut b = build();
        let ta = a
            .train_function(20, 2, 30, 0.99, &data, &options(5, true))
            .unwrap();
        let tb = b
            .train_function(20, 2, 30, 0.99, &data, &options(5, false))
            .unwrap();
        assert_eq!(ta.function.path(), tb.function.path());
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.constants(), b.constants());
    }

    #[test]
    fn test_constants_move_towards_target() {
        // y = x0 + 0.7 through a single add-constant basis
        let inputs = Array2::from_shape_fn((20, 1), |(i, _)| i as f64 * 0.1);
        let targets = inputs.column(0).mapv(|x| x + 0.7);
        let data = Dataset::new(inputs, targets).unwrap();
        let mut net = Network::builder(1, vec![vec![Basis::AddConstant]])
            .loss(CrossEntropyLoss::new(1.0, 2).unwrap())
            .build()
            .unwrap();
        let trained = net
            .train_function(300, 1, 20, 1.0, &data, &options(2, false))
            .unwrap();
        assert!((net.constants()[0] - 0.7).abs() < 0.05, "{:?}", net.constants());
        assert_eq!(trained.function.expr().to_string(), "x0 + c0");
    }

    #[test]
    fn test_fitness_reflects_constant_step() {
        let inputs = Array2::from_shape_fn((20, 1), |(i, _)| i as f64 * 0.1);
        let targets = inputs.column(0).mapv(|x| x + 0.7);
        let data = Dataset::new(inputs, targets).unwrap();
        let mut net = Network::builder(1, vec![vec![Basis::AddConstant]])
            .skip_connections(false)
            .loss(CrossEntropyLoss::new(1.0, 2).unwrap())
            .build()
            .unwrap();
        let before = net.constants().to_vec();
        let trained = net
            .train_function(1, 1, 10, 1.0, &data, &options(4, false))
            .unwrap();
        assert_ne!(net.constants(), before.as_slice());
        assert_eq!(
            trained.fitness.to_bits(),
            net.score(&trained.function, &data).to_bits()
        );
    }

    #[test]
    fn test_rejects_mismatched_dataset() {
        let data = product_dataset();
        let mut net = Network::builder(3, vec![vec![Basis::Add]]).build().unwrap();
        assert!(net
            .train_function(1, 1, 1, 1.0, &data, &options(0, false))
            .is_err());
        let mut net = Network::builder(2, vec![vec![Basis::Add]]).build().unwrap();
        assert!(net
            .train_function(0, 1, 1, 1.0, &data, &options(0, false))
            .is_err());
    }
}
