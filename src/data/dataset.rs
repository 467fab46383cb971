use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::error::SirFitError;
use crate::simulator::Trajectory;

use super::Compartment;

/// Regression data: one row of inputs per target value
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Array2<f64>,
    targets: Array1<f64>,
}

impl Dataset {
    pub fn new(inputs: Array2<f64>, targets: Array1<f64>) -> Result<Self, SirFitError> {
        if inputs.nrows() != targets.len() {
            return Err(SirFitError::ShapeMismatch {
                inputs: inputs.nrows(),
                targets: targets.len(),
            });
        }
        Ok(Self { inputs, targets })
    }

    /// Build a derivative-fitting dataset from a SIR trajectory.
    ///
    /// The target at interior point `k` is `diff(X)[k] - 0.5 * diff(diff(X))[k - 1]`,
    /// which reduces to the central difference `0.5 * (X[k + 1] - X[k - 1])`.
    /// Inputs are the `s` and `i` states at the same interior points, so a
    /// trajectory of `m` points yields `m - 2` rows.
    pub fn from_trajectory(
        trajectory: &Trajectory,
        target: Compartment,
    ) -> Result<Self, SirFitError> {
        let m = trajectory.len();
        if m < 3 {
            return Err(SirFitError::InsufficientData {
                required: 3,
                found: m,
            });
        }

        let x = trajectory.states();
        let col = target.index();
        let n = m - 2;

        let targets = Array1::from_iter((1..=n).map(|k| {
            let forward = x[(k + 1, col)] - x[(k, col)];
            let second = x[(k + 1, col)] - 2.0 * x[(k, col)] + x[(k - 1, col)];
            forward - 0.5 * second
        }));
        let inputs = x.slice(s![1..m - 1, 0..2]).to_owned();

        Self::new(inputs, targets)
    }

    pub fn inputs(&self) -> ArrayView2<'_, f64> {
        self.inputs.view()
    }

    pub fn targets(&self) -> ArrayView1<'_, f64> {
        self.targets.view()
    }

    pub fn nrows(&self) -> usize {
        self.targets.len()
    }

    pub fn nfeatures(&self) -> usize {
        self.inputs.ncols()
    }

    /// Split the rows into `n` contiguous batches of near-equal size.
    ///
    /// `n` is clamped to `1..=nrows`, so every batch holds at least one row.
    pub fn batches(&self, n: usize) -> Vec<Dataset> {
        let rows = self.nrows();
        if rows == 0 {
            return vec![self.clone()];
        }
        let n = n.clamp(1, rows);
        let base = rows / n;
        let extra = rows % n;

        let mut start = 0;
        (0..n)
            .map(|b| {
                let len = base + usize::from(b < extra);
                let end = start + len;
                let batch = Dataset {
                    inputs: self.inputs.slice(s![start..end, ..]).to_owned(),
                    targets: self.targets.slice(s![start..end]).to_owned(),
                };
                start = end;
                batch
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{simulate_sir, time_points, SirParams, DEFAULT_TIME_POINTS, DEFAULT_X0};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn sir_dataset(target: Compartment) -> (Trajectory, Dataset) {
        let traj = simulate_sir(
            &SirParams::default(),
            DEFAULT_X0,
            &time_points(DEFAULT_TIME_POINTS),
        )
        .unwrap();
        let data = Dataset::from_trajectory(&traj, target).unwrap();
        (traj, data)
    }

    #[test]
    fn test_row_count() {
        let (_, data) = sir_dataset(Compartment::S);
        assert_eq!(data.nrows(), DEFAULT_TIME_POINTS - 2);
        assert_eq!(data.nfeatures(), 2);
    }

    #[test]
    fn test_targets_are_central_differences() {
        for target in [Compartment::S, Compartment::I, Compartment::R] {
            let (traj, data) = sir_dataset(target);
            let x = traj.compartment(target);
            for (row, y) in data.targets().iter().enumerate() {
                let k = row + 1;
                assert_relative_eq!(*y, 0.5 * (x[k + 1] - x[k - 1]), epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_inputs_are_interior_s_and_i() {
        let (traj, data) = sir_dataset(Compartment::R);
        let states = traj.states();
        assert_eq!(data.inputs()[(0, 0)], states[(1, 0)]);
        assert_eq!(data.inputs()[(0, 1)], states[(1, 1)]);
        let last = data.nrows() - 1;
        assert_eq!(data.inputs()[(last, 1)], states[(traj.len() - 2, 1)]);
    }

    #[test]
    fn test_targets_follow_the_ode() {
        // Central differences approximate the derivative of the model
        let (_, data) = sir_dataset(Compartment::S);
        let (s, i) = (data.inputs().column(0).to_owned(), data.inputs().column(1).to_owned());
        let exact = -0.5 * &s * &i;
        for (approx, exact) in data.targets().iter().zip(exact.iter()) {
            assert!((approx - exact).abs() < 5e-3);
        }
    }

    #[test]
    fn test_too_short_trajectory() {
        let traj = simulate_sir(&SirParams::default(), DEFAULT_X0, &[0.0, 1.0]).unwrap();
        assert!(matches!(
            Dataset::from_trajectory(&traj, Compartment::I),
            Err(SirFitError::InsufficientData { found: 2, .. })
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let result = Dataset::new(array![[1.0, 2.0], [3.0, 4.0]], array![1.0]);
        assert!(matches!(result, Err(SirFitError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_batches_cover_all_rows() {
        let (_, data) = sir_dataset(Compartment::I);
        let batches = data.batches(4);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches.iter().map(Dataset::nrows).sum::<usize>(), data.nrows());
        assert_eq!(batches[0].nrows(), 15);
        assert_eq!(batches[3].nrows(), 14);
        assert_eq!(batches[1].targets()[0], data.targets()[15]);

        assert_eq!(data.batches(0).len(), 1);
        assert_eq!(data.batches(1000).len(), data.nrows());
    }
}
