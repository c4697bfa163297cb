//! Element parameters that may be marked for optimization.

use std::fmt;

/// A scalar element parameter.
///
/// `variable` flags a parameter that an optimizer is currently varying.
/// Some formulas are singular at special values of a variable parameter
/// (for example a vanishing quadrupole gradient), so element builders
/// check the flag.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Parameter {
    /// Current value.
    pub value: f64,
    /// Whether the parameter is being optimized.
    pub variable: bool,
}

impl Parameter {
    /// A fixed parameter.
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            variable: false,
        }
    }

    /// A parameter that is being optimized.
    pub fn variable(value: f64) -> Self {
        Self {
            value,
            variable: true,
        }
    }

    /// Same flag, value multiplied by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            value: self.value * factor,
            ..self
        }
    }

    /// Sum of two parameters; variable if either is.
    pub fn plus(self, other: Parameter) -> Self {
        Self {
            value: self.value + other.value,
            variable: self.variable || other.variable,
        }
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Self::fixed(value)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variable {
            write!(f, "{} (variable)", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}
