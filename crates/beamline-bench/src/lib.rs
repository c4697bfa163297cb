//! Benchmark lattices for the beamline library.
//!
//! - [`reference_ring`]: FODO cells with sector bends, labelled `name.cell`
//! - [`thin_ring`]: [`reference_ring`] with every quadrupole sliced
//! - [`reference_bunch`]: deterministic particle coordinates

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use beamline_core::{BeamReference, ElementError, PhaseSpace};
use beamline_lattice::kind::ElementType;
use beamline_lattice::{CompoundElement, Criteria, Element, LatticeElement, Segment};

/// Number of cells in [`reference_ring`].
pub const REFERENCE_CELLS: usize = 32;

fn beam() -> Result<BeamReference, ElementError> {
    BeamReference::new(0.6, 1.25)
}

/// `cells` FODO cells, each with two sector bends sharing a full turn.
pub fn reference_ring(cells: usize) -> Result<Segment, ElementError> {
    let beam = beam()?;
    let angle = std::f64::consts::PI / cells.max(1) as f64;
    let mut elements: Vec<LatticeElement> = Vec::with_capacity(8 * cells);
    for c in 0..cells {
        let quad = |k1: f64, name: &str| {
            Element::quadrupole(k1, 0.5)
                .beam(beam)
                .label(format!("{name}.{c}"))
                .build()
        };
        let drift = |name: &str| {
            Element::drift(0.5)
                .beam(beam)
                .label(format!("{name}.{c}"))
                .build()
        };
        let bend = |name: &str| {
            CompoundElement::sbend(angle, 2.0)
                .e1(angle / 2.0)
                .e2(angle / 2.0)
                .beam(beam)
                .label(format!("{name}.{c}"))
                .build()
        };
        elements.push(quad(0.6, "qf")?.into());
        elements.push(drift("d1")?.into());
        elements.push(bend("mb1")?.into());
        elements.push(drift("d2")?.into());
        elements.push(quad(-0.6, "qd")?.into());
        elements.push(drift("d3")?.into());
        elements.push(bend("mb2")?.into());
        elements.push(drift("d4")?.into());
    }
    Ok(Segment::new(elements))
}

/// [`reference_ring`] with each quadrupole cut into `slices` thin kicks.
pub fn thin_ring(cells: usize, slices: usize) -> Result<Segment, ElementError> {
    reference_ring(cells)?.makethin(
        &Criteria::new().rule(ElementType::Quadrupole, slices),
        &Criteria::new(),
    )
}

/// `n` particles on a deterministic grid of small amplitudes.
pub fn reference_bunch(n: usize) -> PhaseSpace {
    PhaseSpace::from_fn(n, |i, j| {
        let phase = (j as f64 + 1.0) * 0.618_033_988_7 + i as f64 * 0.37;
        1e-4 * (phase.fract() - 0.5)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_ring_labels_carry_cell_index() {
        let ring = reference_ring(4).unwrap();
        assert_eq!(ring.len(), 32);
        assert_eq!(ring.elements()[8].label(), Some("qf.1"));
    }

    #[test]
    fn thin_ring_keeps_length() {
        let thick = reference_ring(2).unwrap();
        let thin = thin_ring(2, 4).unwrap();
        assert!((thin.length() - thick.length()).abs() < 1e-12);
    }

    #[test]
    fn reference_bunch_is_small() {
        let x = reference_bunch(16);
        assert_eq!(x.ncols(), 16);
        assert!(x.amax() <= 5e-5);
    }
}
