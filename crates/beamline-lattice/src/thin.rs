//! Thin-lens slicing of thick elements.
//!
//! A thick element of length `l` is replaced by `n` thin kicks separated
//! by `n - 1` drifts of length `l * Delta` and bounded by two drifts of
//! length `l * delta`, giving `2n + 1` elements in total. The fractions
//! come from [`SlicingStyle::drift_fractions`].

use beamline_core::{ElementError, ElementId, PhaseSpace, SlicingStyle};

use crate::aperture::Aperture;
use crate::element::Element;
use crate::lattice::LatticeElement;
use crate::segment::Segment;

/// A thick element replaced by a sequence of thin kicks and drifts.
///
/// Label, length, aperture and loss are those of the base element.
#[derive(Clone, Debug)]
pub struct ThinElement {
    id: ElementId,
    slices: Segment,
    base: Box<Element>,
}

impl ThinElement {
    /// Slice `base` into `n` copies of the thin kick `thin`.
    ///
    /// Kicks are labelled `{base}__{i}` and drifts `{base}__d{i}`; an
    /// unlabelled base gives unlabelled slices.
    pub fn slice(
        base: &Element,
        thin: &Element,
        n: usize,
        style: SlicingStyle,
    ) -> Result<Self, ElementError> {
        if n < 1 {
            return Err(ElementError::InvalidSliceCount { n });
        }
        let (delta, interior) = style.drift_fractions(n);
        let l = base.length();
        let name = |suffix: String| base.label().map(|b| format!("{b}__{suffix}"));
        let drift = |fraction: f64, i: usize| -> Result<LatticeElement, ElementError> {
            Ok(Element::drift(l * fraction)
                .maybe_beam(base.beam().copied())
                .config(*base.config())
                .maybe_label(name(format!("d{i}")))
                .build()?
                .into())
        };
        let kick = |i: usize| -> LatticeElement {
            let mut k = thin.clone();
            k.set_label(name(i.to_string()));
            k.into()
        };

        let mut elements = Vec::with_capacity(2 * n + 1);
        elements.push(drift(delta, 0)?);
        for i in 0..n - 1 {
            elements.push(kick(i));
            elements.push(drift(interior, i + 1)?);
        }
        elements.push(kick(n - 1));
        elements.push(drift(delta, n)?);

        Ok(Self {
            id: ElementId::next(),
            slices: Segment::new(elements),
            base: Box::new(base.clone()),
        })
    }

    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The thin kicks and drifts.
    pub fn slices(&self) -> &Segment {
        &self.slices
    }

    /// Mutable thin kicks and drifts.
    pub fn slices_mut(&mut self) -> &mut Segment {
        &mut self.slices
    }

    /// The thick element this replaces.
    pub fn base(&self) -> &Element {
        &self.base
    }

    /// Label of the base element.
    pub fn label(&self) -> Option<&str> {
        self.base.label()
    }

    /// Relabel the base element.
    pub fn set_label(&mut self, label: Option<String>) {
        self.base.set_label(label);
    }

    /// Length of the base element.
    pub fn length(&self) -> f64 {
        self.base.length()
    }

    /// Aperture of the base element.
    pub fn aperture(&self) -> Option<&Aperture> {
        self.base.aperture()
    }

    /// Loss at the base element's aperture.
    pub fn loss(&self, x: &PhaseSpace) -> Vec<f64> {
        self.base.loss(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamline_core::BeamReference;

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn lengths(thin: &ThinElement) -> Vec<f64> {
        thin.slices().iter().map(LatticeElement::length).collect()
    }

    #[test]
    fn zero_slices_rejected() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let k = Element::thin_quadrupole(0.1).build().unwrap();
        assert_eq!(
            ThinElement::slice(&q, &k, 0, SlicingStyle::Teapot).unwrap_err(),
            ElementError::InvalidSliceCount { n: 0 }
        );
    }

    #[test]
    fn quadrupole_slices_have_teapot_spacing() {
        let q = Element::quadrupole(120.0, 24.0)
            .beam(beam())
            .label("q")
            .build()
            .unwrap();
        let LatticeElement::Thin(thin) = q.makethin(3, Some(SlicingStyle::Teapot)).unwrap() else {
            panic!("expected thin element");
        };
        let l = lengths(&thin);
        assert_eq!(l.len(), 7);
        let drifts: Vec<f64> = l.iter().step_by(2).copied().collect();
        assert_eq!(drifts, vec![3.0, 9.0, 9.0, 3.0]);
        for e in thin.slices().iter().skip(1).step_by(2) {
            let LatticeElement::Element(k) = e else {
                panic!("expected element");
            };
            assert_eq!(k.cached_map().r[(1, 0)], -120.0 * 24.0 / 3.0);
        }
    }

    #[test]
    fn slice_labels() {
        let q = Element::quadrupole(0.1, 1.0)
            .beam(beam())
            .label("qf")
            .build()
            .unwrap();
        let LatticeElement::Thin(thin) = q.makethin(2, None).unwrap() else {
            panic!("expected thin element");
        };
        let labels: Vec<_> = thin.slices().iter().map(|e| e.label().map(str::to_owned)).collect();
        let expected = ["qf__d0", "qf__0", "qf__d1", "qf__1", "qf__d2"];
        assert_eq!(
            labels,
            expected.iter().map(|s| Some(s.to_string())).collect::<Vec<_>>()
        );
        assert_eq!(thin.label(), Some("qf"));
    }

    #[test]
    fn unlabelled_base_gives_unlabelled_slices() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let LatticeElement::Thin(thin) = q.makethin(2, None).unwrap() else {
            panic!("expected thin element");
        };
        assert!(thin.slices().iter().all(|e| e.label().is_none()));
    }

    #[test]
    fn edge_style_places_kicks_at_ends() {
        let k = Element::kicker(1e-3, 0.0)
            .length(12.0)
            .beam(beam())
            .build()
            .unwrap();
        let LatticeElement::Thin(thin) = k.makethin(4, Some(SlicingStyle::Edge)).unwrap() else {
            panic!("expected thin element");
        };
        let expected = [0.0, 0.0, 4.0, 0.0, 4.0, 0.0, 4.0, 0.0, 0.0];
        let l = lengths(&thin);
        assert_eq!(l.len(), expected.len());
        for (got, want) in l.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn slices_preserve_length() {
        for style in [SlicingStyle::Edge, SlicingStyle::Simple, SlicingStyle::Teapot] {
            for n in [1, 2, 5, 20] {
                let s = Element::sextupole(1.0, 2.5).beam(beam()).build().unwrap();
                let LatticeElement::Thin(thin) = s.makethin(n, Some(style)).unwrap() else {
                    panic!("expected thin element");
                };
                assert_eq!(thin.slices().len(), 2 * n + 1);
                assert!((thin.slices().length() - 2.5).abs() < 1e-12);
                assert_eq!(thin.length(), 2.5);
            }
        }
    }
}
