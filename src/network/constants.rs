use argmin::{
    core::{CostFunction, Error, Executor},
    solver::neldermead::NelderMead,
};
use ndarray::Array1;

use crate::data::Dataset;
use crate::error::SirFitError;

use super::loss::mse;
use super::{Expr, Function, Network};

const MAX_ITERS: u64 = 2000;
const SD_TOLERANCE: f64 = 1e-14;

/// MSE of an expression as a function of the constants it uses
struct ConstantFit<'a> {
    expr: &'a Expr,
    slots: &'a [usize],
    constants: &'a [f64],
    dataset: &'a Dataset,
}

impl ConstantFit<'_> {
    fn with_values(&self, values: &[f64]) -> Vec<f64> {
        let mut constants = self.constants.to_vec();
        for (slot, value) in self.slots.iter().zip(values) {
            constants[*slot] = *value;
        }
        constants
    }
}

impl CostFunction for ConstantFit<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, values: &Self::Param) -> Result<Self::Output, Error> {
        let constants = self.with_values(values);
        let predictions = self.expr.eval_rows(self.dataset.inputs(), &constants);
        let cost = mse(predictions.view(), self.dataset.targets());
        // Nelder-Mead orders vertices by cost, keep that ordering total
        Ok(if cost.is_finite() { cost } else { f64::MAX })
    }
}

impl Network {
    /// Fit the constants used by `function` to `dataset` and return its predictions.
    ///
    /// The fitted values are written back into the network's constants.
    pub fn forward_fit_constants(
        &mut self,
        function: &Function,
        dataset: &Dataset,
    ) -> Result<Array1<f64>, SirFitError> {
        let expr = function.expr();
        let slots = expr.constant_slots();

        if !slots.is_empty() {
            let start: Vec<f64> = slots.iter().map(|&s| self.constants[s]).collect();
            let problem = ConstantFit {
                expr,
                slots: &slots,
                constants: &self.constants,
                dataset,
            };
            let best = optimize(problem, start)?;

            for (slot, value) in slots.iter().zip(best) {
                self.constants[*slot] = value;
            }
        }

        Ok(expr.eval_rows(dataset.inputs(), &self.constants))
    }

    /// Render `function` with the network's current constants substituted
    pub fn apply_symbolic_constant(&self, function: &Function) -> String {
        function.expr().render(Some(&self.constants))
    }
}

fn optimize(problem: ConstantFit<'_>, start: Vec<f64>) -> Result<Vec<f64>, SirFitError> {
    let simplex = create_initial_simplex(&start);
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(SD_TOLERANCE)
        .map_err(|e| SirFitError::Optimizer(e.to_string()))?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run()
        .map_err(|e| SirFitError::Optimizer(e.to_string()))?;
    res.state
        .best_param
        .ok_or_else(|| SirFitError::Optimizer("no parameters were evaluated".to_string()))
}

fn create_initial_simplex(initial_point: &[f64]) -> Vec<Vec<f64>> {
    let num_dimensions = initial_point.len();
    let perturbation_percentage = 0.05;

    let mut vertices = Vec::with_capacity(num_dimensions + 1);
    vertices.push(initial_point.to_vec());

    for i in 0..num_dimensions {
        let perturbation = if initial_point[i] == 0.0 {
            0.1 // Special case for components equal to 0
        } else {
            perturbation_percentage * initial_point[i]
        };

        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }

    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Basis;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn linear_data(slope: f64, intercept: f64) -> Dataset {
        let inputs = Array2::from_shape_fn((25, 2), |(i, j)| i as f64 * 0.2 - j as f64);
        let targets = inputs.column(0).mapv(|x| slope * x + intercept);
        Dataset::new(inputs, targets).unwrap()
    }

    #[test]
    fn test_recovers_known_constant() {
        let data = linear_data(1.0, 0.7);
        let mut net = Network::builder(2, vec![vec![Basis::AddConstant]])
            .build()
            .unwrap();
        // output -> add-constant node, argument -> x0
        let f = net.function(vec![0, 2]).unwrap();
        let predictions = net.forward_fit_constants(&f, &data).unwrap();

        assert_relative_eq!(net.constants()[0], 0.7, epsilon = 1e-4);
        assert!(mse(predictions.view(), data.targets()) < 1e-8);

        net.set_constants(vec![0.7]).unwrap();
        assert_eq!(net.apply_symbolic_constant(&f), "x0 + 0.7");
    }

    #[test]
    fn test_recovers_two_constants() {
        let data = linear_data(-2.5, 0.3);
        let mut net = Network::builder(
            2,
            vec![vec![Basis::MultiplyConstant], vec![Basis::AddConstant]],
        )
        .build()
        .unwrap();
        // slots: multiply-constant arg (x0), add-constant arg (node 2), output (node 3)
        let f = net.function(vec![0, 2, 3]).unwrap();
        net.forward_fit_constants(&f, &data).unwrap();

        assert_relative_eq!(net.constants()[0], -2.5, epsilon = 1e-3);
        assert_relative_eq!(net.constants()[1], 0.3, epsilon = 1e-3);

        net.set_constants(vec![-2.5, 0.3]).unwrap();
        assert_eq!(net.apply_symbolic_constant(&f), "-2.5*x0 + 0.3");
    }

    #[test]
    fn test_constant_free_function_is_only_evaluated() {
        let data = linear_data(1.0, 0.0);
        let mut net = Network::builder(2, vec![vec![Basis::AddConstant]])
            .build()
            .unwrap();
        net.set_constants(vec![3.0]).unwrap();
        let f = net.function(vec![0, 0]).unwrap();
        let predictions = net.forward_fit_constants(&f, &data).unwrap();
        assert_eq!(predictions, data.targets().to_owned());
        assert_eq!(net.constants(), &[3.0]);
    }
}
