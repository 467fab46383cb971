pub mod data;
pub mod error;
pub mod network;
pub mod results;
pub mod simulator;
pub mod sweep;

pub use crate::data::{Compartment, Dataset};
pub use crate::network::{
    Basis, CrossEntropyLoss, Expr, Function, Network, NetworkBuilder, TrainOptions,
    TrainedFunction,
};
pub use crate::results::{ResultsLog, SweepRecord};
pub use crate::simulator::{simulate, simulate_sir, SirParams, Trajectory};
pub use crate::sweep::{SweepConfig, SweepGrid};
pub use error::SirFitError;

pub mod prelude {
    pub mod simulator {
        pub use crate::simulator::{
            simulate, simulate_sir, sir, time_points, DiffEq, SirParams, Trajectory,
            OdeProblem, DEFAULT_TIME_POINTS, DEFAULT_X0,
        };
    }
    pub mod network {
        pub use crate::network::{
            mse, Basis, CrossEntropyLoss, Expr, Function, Network, NetworkBuilder, NoSparse, Path,
            Sparsifier, ThresholdSparse, TrainOptions, TrainedFunction,
        };
    }

    pub use self::network::*;
    pub use self::simulator::*;
    pub use crate::data::{Compartment, Dataset};
    pub use crate::error::SirFitError;
    pub use crate::results::{ResultsLog, SweepRecord};
    pub use crate::sweep::{run, run_sweep, SweepConfig, SweepGrid};
}
