//! Probabilistic symbolic-regression network.
//!
//! A [Network] arranges [Basis] functions in layers. Each basis argument picks
//! one source node through a temperature-scaled softmax, so sampling the
//! network draws a whole symbolic [Expr]. Training raises the probability of
//! the fittest sampled expressions under a [CrossEntropyLoss] while the
//! constants of those expressions are fitted by gradient descent, and finally
//! by Nelder-Mead in [Network::forward_fit_constants].
//!
//! ```rust,no_run
//! use sirfit::prelude::*;
//!
//! # fn main() -> Result<(), SirFitError> {
//! let trajectory = simulate_sir(&SirParams::default(), DEFAULT_X0, &time_points(60))?;
//! let dataset = Dataset::from_trajectory(&trajectory, Compartment::I)?;
//!
//! let mut network = Network::builder(2, vec![Basis::arithmetic(); 3])
//!     .loss(CrossEntropyLoss::new(5.0, 1)?)
//!     .equalization(5)
//!     .build()?;
//! let trained = network.train_function(1000, 1, 100, 1.0, &dataset, &TrainOptions::default())?;
//! network.forward_fit_constants(&trained.function, &dataset)?;
//! println!("{}", network.apply_symbolic_constant(&trained.function));
//! # Ok(())
//! # }
//! ```

mod basis;
mod constants;
mod expression;
pub mod loss;
mod model;
mod sparse;
mod train;

pub use basis::Basis;
pub use expression::Expr;
pub use loss::{mse, CrossEntropyLoss};
pub use model::{Function, Network, NetworkBuilder, Path};
pub use sparse::{NoSparse, Sparsifier, ThresholdSparse};
pub use train::{TrainOptions, TrainedFunction};
