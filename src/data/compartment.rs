use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SirFitError;

/// One of the simulated SIR compartments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compartment {
    S,
    I,
    R,
}

impl Compartment {
    /// Column of the compartment in the state matrix
    pub fn index(&self) -> usize {
        match self {
            Compartment::S => 0,
            Compartment::I => 1,
            Compartment::R => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compartment::S => "s",
            Compartment::I => "i",
            Compartment::R => "r",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Compartment {
    type Err = SirFitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Compartment::S),
            "i" => Ok(Compartment::I),
            "r" => Ok(Compartment::R),
            other => Err(SirFitError::InvalidConfig(format!(
                "unknown compartment '{}', expected one of s, i, r",
                other
            ))),
        }
    }
}
