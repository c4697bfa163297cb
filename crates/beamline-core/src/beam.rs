//! Reference particle parameters.

use crate::error::ElementError;

/// Relativistic parameters of the reference particle.
///
/// Every map formula depends on `beta` and on `(beta * gamma)^2`.
/// Supplied at element construction and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeamReference {
    beta: f64,
    gamma: f64,
}

impl BeamReference {
    /// Create a beam reference, validating `0 < beta <= 1` and `gamma >= 1`.
    pub fn new(beta: f64, gamma: f64) -> Result<Self, ElementError> {
        let valid_beta = beta.is_finite() && beta > 0.0 && beta <= 1.0;
        let valid_gamma = gamma.is_finite() && gamma >= 1.0;
        if !(valid_beta && valid_gamma) {
            return Err(ElementError::InvalidBeam { beta, gamma });
        }
        Ok(Self { beta, gamma })
    }

    /// Build the reference from gamma alone, deriving `beta = sqrt(1 - 1/gamma^2)`.
    pub fn from_gamma(gamma: f64) -> Result<Self, ElementError> {
        let beta = (1.0 - 1.0 / (gamma * gamma)).sqrt();
        Self::new(beta, gamma)
    }

    /// Relativistic beta.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Relativistic gamma.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// `(beta * gamma)^2`.
    pub fn beta_gamma_sq(&self) -> f64 {
        let bg = self.beta * self.gamma;
        bg * bg
    }
}
