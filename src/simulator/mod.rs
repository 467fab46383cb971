mod ode;

use diffsol::{
    error::{DiffsolError, OdeSolverError},
    ode_solver::method::OdeSolverMethod,
    NalgebraLU, OdeBuilder, OdeSolverStopReason,
};
use nalgebra::DVector;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::data::Compartment;
use crate::error::SirFitError;

pub use ode::OdeProblem;

type T = f64;
type V = DVector<T>;
type M = nalgebra::DMatrix<T>;

const RTOL: f64 = 1e-9;
const ATOL: f64 = 1e-9;
const H0: f64 = 1e-3;

/// Initial (s, i, r) fractions of the simulated population
pub const DEFAULT_X0: [f64; 3] = [1.0, 0.001, 0.0];

/// Number of integer time points the demo samples
pub const DEFAULT_TIME_POINTS: usize = 60;

/// This closure represents the differential equation of the model:
/// Params:
/// - x: The state vector at time t
/// - p: The parameters of the model
/// - t: The time at which the differential equation is evaluated
/// - dx: A mutable reference to the derivative of the state vector at time t
pub type DiffEq = fn(&V, &V, T, &mut V);

/// Transmission and recovery rates of the SIR model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirParams {
    pub beta: f64,
    pub gamma: f64,
}

impl Default for SirParams {
    fn default() -> Self {
        Self {
            beta: 0.5,
            gamma: 0.2,
        }
    }
}

impl SirParams {
    pub fn to_vector(&self) -> V {
        DVector::from_vec(vec![self.beta, self.gamma])
    }
}

/// Right-hand side of the SIR system, parameters are `[beta, gamma]`
pub fn sir(x: &V, p: &V, _t: T, dx: &mut V) {
    let (s, i) = (x[0], x[1]);
    let (beta, gamma) = (p[0], p[1]);
    dx[0] = -beta * s * i;
    dx[1] = beta * s * i - gamma * i;
    dx[2] = gamma * i;
}

/// States of an ODE system sampled at a sequence of time points.
///
/// Row `k` of [Trajectory::states] holds the state at `times()[k]`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Array2<f64>,
}

impl Trajectory {
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn compartment(&self, compartment: Compartment) -> ArrayView1<'_, f64> {
        self.states.column(compartment.index())
    }
}

/// Integer time points `0, 1, ..., n - 1`
pub fn time_points(n: usize) -> Vec<f64> {
    (0..n).map(|t| t as f64).collect()
}

/// Integrate `diffeq` from `x0` with the BDF solver, recording the state at every entry of `times`.
///
/// The first time point is the initial time, so the first row equals `x0`.
/// Times must be non-decreasing.
pub fn simulate(
    diffeq: DiffEq,
    params: &V,
    x0: &V,
    times: &[f64],
) -> Result<Trajectory, SirFitError> {
    let nstates = x0.len();
    let mut states = Array2::zeros((times.len(), nstates));
    let Some(&t0) = times.first() else {
        return Ok(Trajectory {
            times: Vec::new(),
            states,
        });
    };
    if let Some(pair) = times.windows(2).find(|pair| pair[1] < pair[0]) {
        return Err(SirFitError::Integration {
            time: pair[1],
            reason: "time points must be non-decreasing".to_string(),
        });
    }

    let problem = OdeBuilder::<M>::new()
        .atol(vec![ATOL; nstates])
        .rtol(RTOL)
        .t0(t0)
        .h0(H0)
        .p(params.iter().copied().collect::<Vec<f64>>())
        .build_from_eqn(OdeProblem::new(diffeq, params.clone(), x0.clone()))
        .map_err(solver_error)?;
    let mut solver = problem.bdf::<NalgebraLU<f64>>().map_err(solver_error)?;

    for (row, &time) in times.iter().enumerate() {
        if time > solver.state().t {
            match solver.set_stop_time(time) {
                Ok(_) => loop {
                    match solver.step() {
                        Ok(OdeSolverStopReason::InternalTimestep) => continue,
                        Ok(OdeSolverStopReason::TstopReached) => break,
                        Ok(reason) => {
                            return Err(SirFitError::Integration {
                                time,
                                reason: format!("unexpected solver return value {:?}", reason),
                            })
                        }
                        Err(DiffsolError::OdeSolverError(
                            OdeSolverError::StepSizeTooSmall { .. },
                        )) => {
                            return Err(SirFitError::Integration {
                                time,
                                reason: "the ODE solver step size went to zero".to_string(),
                            })
                        }
                        Err(e) => return Err(solver_error(e)),
                    }
                },
                Err(DiffsolError::OdeSolverError(OdeSolverError::StopTimeAtCurrentTime)) => {}
                Err(e) => return Err(solver_error(e)),
            }
        }

        let state = solver.state().y;
        if state.iter().any(|v| !v.is_finite()) {
            return Err(SirFitError::Integration {
                time,
                reason: "state became non-finite".to_string(),
            });
        }
        for (j, value) in state.iter().enumerate() {
            states[(row, j)] = *value;
        }
    }

    tracing::debug!(
        "Simulated {} states over {} time points",
        nstates,
        times.len()
    );

    Ok(Trajectory {
        times: times.to_vec(),
        states,
    })
}

fn solver_error(error: DiffsolError) -> SirFitError {
    SirFitError::Integration {
        time: f64::NAN,
        reason: error.to_string(),
    }
}

/// Simulate the SIR model from `x0 = (s, i, r)`
pub fn simulate_sir(
    params: &SirParams,
    x0: [f64; 3],
    times: &[f64],
) -> Result<Trajectory, SirFitError> {
    simulate(
        sir,
        &params.to_vector(),
        &DVector::from_column_slice(&x0),
        times,
    )
}
