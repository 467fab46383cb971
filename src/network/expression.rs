use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use super::Basis;

/// Symbolic function traced out of a sampled network path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Input column `x{index}`
    Variable(usize),
    Apply {
        basis: Basis,
        /// Global constant slot, set for constant-owning bases
        constant: Option<usize>,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Evaluate on one row of inputs
    pub fn eval(&self, row: ArrayView1<f64>, constants: &[f64]) -> f64 {
        match self {
            Expr::Variable(index) => row[*index],
            Expr::Apply {
                basis,
                constant,
                args,
            } => {
                let mut values = [0.0; 2];
                for (value, arg) in values.iter_mut().zip(args) {
                    *value = arg.eval(row, constants);
                }
                let c = constant.map_or(0.0, |slot| constants[slot]);
                basis.apply(&values[..args.len()], c)
            }
        }
    }

    /// Evaluate on every row of `inputs`
    pub fn eval_rows(&self, inputs: ArrayView2<f64>, constants: &[f64]) -> Array1<f64> {
        inputs
            .axis_iter(Axis(0))
            .map(|row| self.eval(row, constants))
            .collect()
    }

    /// Number of basis applications
    pub fn activations(&self) -> usize {
        match self {
            Expr::Variable(_) => 0,
            Expr::Apply { args, .. } => 1 + args.iter().map(Expr::activations).sum::<usize>(),
        }
    }

    /// Sorted, deduplicated constant slots used by the expression
    pub fn constant_slots(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        self.collect_constants(&mut slots);
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    fn collect_constants(&self, slots: &mut Vec<usize>) {
        if let Expr::Apply { constant, args, .. } = self {
            if let Some(slot) = constant {
                slots.push(*slot);
            }
            for arg in args {
                arg.collect_constants(slots);
            }
        }
    }

    /// Render with constant values substituted.
    ///
    /// Without `constants`, slots are written as `c{slot}`.
    pub fn render(&self, constants: Option<&[f64]>) -> String {
        let rendered = self.render_inner(constants);
        strip_outer_parens(&rendered).to_string()
    }

    fn render_inner(&self, constants: Option<&[f64]>) -> String {
        match self {
            Expr::Variable(index) => format!("x{}", index),
            Expr::Apply {
                basis,
                constant,
                args,
            } => {
                let args: Vec<String> = args.iter().map(|a| a.render_inner(constants)).collect();
                let value = constant.map(|slot| match constants {
                    Some(values) => values[slot],
                    None => f64::NAN,
                });
                let c = |slot: Option<usize>| match (slot, constants) {
                    (Some(slot), Some(values)) => format_constant(values[slot]),
                    (Some(slot), None) => format!("c{}", slot),
                    (None, _) => String::new(),
                };
                match basis {
                    Basis::Add => format!("({} + {})", args[0], args[1]),
                    Basis::Subtract => format!("({} - {})", args[0], args[1]),
                    Basis::Multiply => format!("{}*{}", args[0], args[1]),
                    Basis::Divide => format!("({}/{})", args[0], divisor(&args[1])),
                    Basis::AddConstant => match value {
                        Some(v) if v < 0.0 => format!("({} - {})", args[0], format_constant(-v)),
                        _ => format!("({} + {})", args[0], c(*constant)),
                    },
                    Basis::MultiplyConstant => format!("{}*{}", c(*constant), args[0]),
                    Basis::Square => format!("{}^2", wrap(&args[0])),
                    Basis::Sin => format!("sin({})", strip_outer_parens(&args[0])),
                    Basis::Exp => format!("exp({})", strip_outer_parens(&args[0])),
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(None))
    }
}

fn format_constant(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn wrap(s: &str) -> String {
    let enclosed = strip_outer_parens(s).len() != s.len();
    if enclosed || !s.contains(['*', '+', '-', '/', '^']) {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

/// A divisor with a top-level binary operator binds looser than `/`
fn divisor(s: &str) -> String {
    let mut depth = 0i32;
    let loose = s.char_indices().any(|(i, ch)| match ch {
        '(' => {
            depth += 1;
            false
        }
        ')' => {
            depth -= 1;
            false
        }
        // a leading minus is the sign of a constant
        '-' => depth == 0 && i > 0,
        '*' | '/' | '+' => depth == 0,
        _ => false,
    });
    if loose {
        format!("({})", s)
    } else {
        s.to_string()
    }
}

fn strip_outer_parens(mut s: &str) -> &str {
    loop {
        let bytes = s.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'(' || bytes[bytes.len() - 1] != b')' {
            return s;
        }

        let mut depth = 0i32;
        let mut encloses_all = false;
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        encloses_all = i == bytes.len() - 1;
                        break;
                    }
                }
                _ => {}
            }
        }

        if !encloses_all {
            return s;
        }
        s = &s[1..s.len() - 1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn x(i: usize) -> Expr {
        Expr::Variable(i)
    }

    fn apply(basis: Basis, constant: Option<usize>, args: Vec<Expr>) -> Expr {
        Expr::Apply {
            basis,
            constant,
            args,
        }
    }

    #[test]
    fn test_eval_rows() {
        // (x0 * x1) + c0
        let expr = apply(
            Basis::AddConstant,
            Some(0),
            vec![apply(Basis::Multiply, None, vec![x(0), x(1)])],
        );
        let inputs = array![[1.0, 2.0], [3.0, 4.0]];
        let out = expr.eval_rows(inputs.view(), &[0.5]);
        assert_eq!(out, array![2.5, 12.5]);
        assert_eq!(expr.activations(), 2);
        assert_eq!(expr.constant_slots(), vec![0]);
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        let expr = apply(Basis::Divide, None, vec![x(0), x(1)]);
        let inputs = array![[1.0, 0.0]];
        assert!(!expr.eval_rows(inputs.view(), &[])[0].is_finite());
    }

    #[test]
    fn test_render() {
        let expr = apply(
            Basis::AddConstant,
            Some(1),
            vec![apply(
                Basis::MultiplyConstant,
                Some(0),
                vec![apply(Basis::Multiply, None, vec![x(0), x(1)])],
            )],
        );
        assert_eq!(expr.to_string(), "c0*x0*x1 + c1");
        assert_eq!(expr.render(Some(&[-0.5, 0.25])), "-0.5*x0*x1 + 0.25");
        assert_eq!(expr.render(Some(&[2.0, -0.2])), "2*x0*x1 - 0.2");
    }

    #[test]
    fn test_render_nested() {
        let expr = apply(
            Basis::Divide,
            None,
            vec![
                apply(Basis::Subtract, None, vec![x(0), x(1)]),
                apply(Basis::Square, None, vec![apply(Basis::Add, None, vec![x(1), x(0)])]),
            ],
        );
        assert_eq!(expr.to_string(), "(x0 - x1)/(x1 + x0)^2");

        let over_product = apply(
            Basis::Divide,
            None,
            vec![x(0), apply(Basis::Multiply, None, vec![x(0), x(1)])],
        );
        assert_eq!(over_product.to_string(), "x0/(x0*x1)");
        let row = array![2.0, 4.0];
        assert_eq!(over_product.eval(row.view(), &[]), 0.25);

        let over_scaled = apply(
            Basis::Divide,
            None,
            vec![x(0), apply(Basis::MultiplyConstant, Some(0), vec![x(1)])],
        );
        assert_eq!(over_scaled.render(Some(&[0.5])), "x0/(0.5*x1)");
        assert_eq!(over_scaled.render(Some(&[-0.5])), "x0/(-0.5*x1)");

        let over_quotient = apply(
            Basis::Divide,
            None,
            vec![
                apply(Basis::Multiply, None, vec![x(0), x(1)]),
                apply(Basis::Divide, None, vec![x(0), x(1)]),
            ],
        );
        assert_eq!(over_quotient.to_string(), "x0*x1/(x0/x1)");

        let minus_sum = apply(
            Basis::Subtract,
            None,
            vec![x(0), apply(Basis::Add, None, vec![x(1), x(0)])],
        );
        assert_eq!(minus_sum.to_string(), "x0 - (x1 + x0)");

        let minus_shifted = apply(
            Basis::Subtract,
            None,
            vec![x(1), apply(Basis::AddConstant, Some(0), vec![x(0)])],
        );
        assert_eq!(minus_shifted.render(Some(&[-0.2])), "x1 - (x0 - 0.2)");
    }

    #[test]
    fn test_shared_constant_slots_are_deduplicated() {
        let inner = apply(Basis::AddConstant, Some(3), vec![x(0)]);
        let expr = apply(Basis::Multiply, None, vec![inner.clone(), inner]);
        assert_eq!(expr.constant_slots(), vec![3]);
    }
}
