//! Transverse aperture boundaries and particle loss.
//!
//! A loss value is zero on and inside the boundary and strictly positive
//! outside it. Padding shrinks the boundary; the offset shifts it.

use beamline_core::{ElementError, Transverse};
use smallvec::SmallVec;

/// Inline storage for aperture parameters (at most four values).
pub type ApertureParams = SmallVec<[f64; 4]>;

/// Shape of an aperture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApertureKind {
    /// Circle of radius `r`.
    Circle,
    /// Ellipse with half axes `(a, b)`.
    Ellipse,
    /// Rectangle with half width and half height.
    Rectangle,
    /// Intersection of a rectangle `(hw, hh)` and an ellipse `(a, b)`.
    RectEllipse,
}

impl ApertureKind {
    /// Number of parameters the shape takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Circle => 1,
            Self::Ellipse | Self::Rectangle => 2,
            Self::RectEllipse => 4,
        }
    }
}

/// A transverse boundary with optional padding and offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Aperture {
    kind: ApertureKind,
    values: ApertureParams,
    padding: ApertureParams,
    offset: [f64; 2],
}

impl Aperture {
    /// Create an aperture, checking that `values` has the shape's arity.
    pub fn new(kind: ApertureKind, values: &[f64]) -> Result<Self, ElementError> {
        check_arity(kind, values.len())?;
        Ok(Self {
            kind,
            values: values.iter().copied().collect(),
            padding: std::iter::repeat(0.0).take(kind.arity()).collect(),
            offset: [0.0, 0.0],
        })
    }

    /// Circle of radius `r`.
    pub fn circle(r: f64) -> Self {
        Self::from_array(ApertureKind::Circle, &[r])
    }

    /// Ellipse with half axes `a` (horizontal) and `b` (vertical).
    pub fn ellipse(a: f64, b: f64) -> Self {
        Self::from_array(ApertureKind::Ellipse, &[a, b])
    }

    /// Rectangle with half width `hw` and half height `hh`.
    pub fn rectangle(hw: f64, hh: f64) -> Self {
        Self::from_array(ApertureKind::Rectangle, &[hw, hh])
    }

    /// Intersection of rectangle `(hw, hh)` and ellipse `(a, b)`.
    pub fn rect_ellipse(hw: f64, hh: f64, a: f64, b: f64) -> Self {
        Self::from_array(ApertureKind::RectEllipse, &[hw, hh, a, b])
    }

    fn from_array(kind: ApertureKind, values: &[f64]) -> Self {
        Self {
            kind,
            values: values.iter().copied().collect(),
            padding: values.iter().map(|_| 0.0).collect(),
            offset: [0.0, 0.0],
        }
    }

    /// Replace the padding; it must have the same arity as the parameters.
    pub fn with_padding(mut self, padding: &[f64]) -> Result<Self, ElementError> {
        check_arity(self.kind, padding.len())?;
        self.padding = padding.iter().copied().collect();
        Ok(self)
    }

    /// Shift the aperture centre to `(x, y)`.
    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = [x, y];
        self
    }

    /// The aperture shape.
    pub fn kind(&self) -> ApertureKind {
        self.kind
    }

    /// Boundary parameters before padding.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Padding subtracted from each parameter.
    pub fn padding(&self) -> &[f64] {
        &self.padding
    }

    /// Centre offset `(x, y)`.
    pub fn offset(&self) -> [f64; 2] {
        self.offset
    }

    /// Loss value for every particle column of `xy`.
    pub fn loss(&self, xy: &Transverse) -> Vec<f64> {
        let p: ApertureParams = self
            .values
            .iter()
            .zip(self.padding.iter())
            .map(|(v, pad)| v - pad)
            .collect();
        xy.column_iter()
            .map(|col| {
                let x = col[0] - self.offset[0];
                let y = col[1] - self.offset[1];
                match self.kind {
                    ApertureKind::Circle => ellipse_loss(x, y, p[0], p[0]),
                    ApertureKind::Ellipse => ellipse_loss(x, y, p[0], p[1]),
                    ApertureKind::Rectangle => rectangle_loss(x, y, p[0], p[1]),
                    ApertureKind::RectEllipse => {
                        rectangle_loss(x, y, p[0], p[1]) + ellipse_loss(x, y, p[2], p[3])
                    }
                }
            })
            .collect()
    }
}

fn check_arity(kind: ApertureKind, got: usize) -> Result<(), ElementError> {
    if got != kind.arity() {
        return Err(ElementError::ApertureShape {
            expected: kind.arity(),
            got,
        });
    }
    Ok(())
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

fn ellipse_loss(x: f64, y: f64, a: f64, b: f64) -> f64 {
    relu(x * x / (a * a) + y * y / (b * b) - 1.0)
}

fn rectangle_loss(x: f64, y: f64, hw: f64, hh: f64) -> f64 {
    relu(x.abs() - hw) + relu(y.abs() - hh)
}
