//! Reusable lattice fixtures.
//!
//! - [`fodo_cell`]: focusing quadrupole, drift, defocusing quadrupole,
//!   drift, labelled `qf`, `d1`, `qd`, `d2`.
//! - [`fodo_ring`]: `n` cells with unique labels applied.
//! - [`bend_cell`]: a FODO cell with a sector bend in each drift.

use beamline_core::ElementError;
use beamline_lattice::{CompoundElement, Element, LatticeElement, Segment};

use crate::standard_beam;

/// Gradient of the fixture quadrupoles.
pub const K1: f64 = 0.8;
pub const QUAD_LENGTH: f64 = 0.5;
pub const DRIFT_LENGTH: f64 = 2.0;

fn quad(k1: f64, label: &str) -> Result<LatticeElement, ElementError> {
    Ok(Element::quadrupole(k1, QUAD_LENGTH)
        .beam(standard_beam())
        .label(label)
        .build()?
        .into())
}

fn drift(length: f64, label: &str) -> Result<LatticeElement, ElementError> {
    Ok(Element::drift(length)
        .beam(standard_beam())
        .label(label)
        .build()?
        .into())
}

pub fn fodo_cell() -> Result<Segment, ElementError> {
    Ok(Segment::new(vec![
        quad(K1, "qf")?,
        drift(DRIFT_LENGTH, "d1")?,
        quad(-K1, "qd")?,
        drift(DRIFT_LENGTH, "d2")?,
    ]))
}

/// `n` FODO cells, flattened, with labels made unique.
pub fn fodo_ring(n: usize) -> Result<Segment, ElementError> {
    let mut elements = Vec::with_capacity(4 * n);
    for _ in 0..n {
        elements.extend(fodo_cell()?.elements().iter().cloned());
    }
    let mut ring = Segment::new(elements);
    if let Err(e) = ring.apply_unique_labels() {
        panic!("fixture labels collide: {e}");
    }
    Ok(ring)
}

pub fn bend_cell(angle: f64) -> Result<Segment, ElementError> {
    let bend = |label: &str| -> Result<LatticeElement, ElementError> {
        Ok(CompoundElement::sbend(angle, 1.0)
            .beam(standard_beam())
            .label(label)
            .build()?
            .into())
    };
    Ok(Segment::new(vec![
        quad(K1, "qf")?,
        drift(0.5, "d1")?,
        bend("mb1")?,
        drift(0.5, "d2")?,
        quad(-K1, "qd")?,
        drift(0.5, "d3")?,
        bend("mb2")?,
        drift(0.5, "d4")?,
    ]))
}
