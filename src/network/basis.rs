use serde::{Deserialize, Serialize};

/// Primitive functions a network layer can route its inputs through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `x + c` with a trainable constant `c`
    AddConstant,
    /// `c * x` with a trainable constant `c`
    MultiplyConstant,
    Square,
    Sin,
    Exp,
}

impl Basis {
    pub fn arity(&self) -> usize {
        match self {
            Basis::Add | Basis::Subtract | Basis::Multiply | Basis::Divide => 2,
            Basis::AddConstant
            | Basis::MultiplyConstant
            | Basis::Square
            | Basis::Sin
            | Basis::Exp => 1,
        }
    }

    /// Whether the basis owns a trainable constant
    pub fn has_constant(&self) -> bool {
        matches!(self, Basis::AddConstant | Basis::MultiplyConstant)
    }

    /// Evaluate the basis; `args` must hold [Basis::arity] values
    #[inline(always)]
    pub fn apply(&self, args: &[f64], constant: f64) -> f64 {
        match self {
            Basis::Add => args[0] + args[1],
            Basis::Subtract => args[0] - args[1],
            Basis::Multiply => args[0] * args[1],
            Basis::Divide => args[0] / args[1],
            Basis::AddConstant => args[0] + constant,
            Basis::MultiplyConstant => constant * args[0],
            Basis::Square => args[0] * args[0],
            Basis::Sin => args[0].sin(),
            Basis::Exp => args[0].exp(),
        }
    }

    /// The six arithmetic bases used by the SIR demo
    pub fn arithmetic() -> Vec<Basis> {
        vec![
            Basis::Add,
            Basis::Subtract,
            Basis::Multiply,
            Basis::Divide,
            Basis::AddConstant,
            Basis::MultiplyConstant,
        ]
    }
}
