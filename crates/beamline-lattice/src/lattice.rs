//! The closed set of things a [`Segment`] can hold.
//!
//! Tracking, slicing and map composition match on [`LatticeElement`]
//! explicitly rather than dispatching through a trait object.

use beamline_core::{
    BeamReference, ElementConfig, ElementError, ElementId, PhaseSpace, SlicingStyle, TrackingError,
    TrackingMethod,
};

use crate::alignment::AlignmentError;
use crate::aperture::Aperture;
use crate::compound::CompoundElement;
use crate::element::Element;
use crate::kind::ElementType;
use crate::segment::Segment;
use crate::selector::Criteria;
use crate::thin::ThinElement;

/// One entry of a beamline.
#[derive(Clone, Debug)]
pub enum LatticeElement {
    /// A single physical element.
    Element(Element),
    /// An element composed of interdependent parts.
    Compound(CompoundElement),
    /// An alignment error wrapping another entry.
    Alignment(AlignmentError),
    /// A nested sequence.
    Segment(Segment),
    /// A thick element replaced by thin slices.
    Thin(ThinElement),
}

impl LatticeElement {
    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        match self {
            Self::Element(e) => e.id(),
            Self::Compound(c) => c.id(),
            Self::Alignment(a) => a.id(),
            Self::Segment(s) => s.id(),
            Self::Thin(t) => t.id(),
        }
    }

    /// Label. Alignment errors and thin elements report their base's.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Element(e) => e.label(),
            Self::Compound(c) => c.label(),
            Self::Alignment(a) => a.label(),
            Self::Segment(s) => s.label(),
            Self::Thin(t) => t.label(),
        }
    }

    /// Replace the label.
    pub fn set_label(&mut self, label: Option<String>) {
        match self {
            Self::Element(e) => e.set_label(label),
            Self::Compound(c) => c.set_label(label),
            Self::Alignment(a) => a.set_label(label),
            Self::Segment(s) => s.set_label(label),
            Self::Thin(t) => t.set_label(label),
        }
    }

    /// Length along the reference orbit.
    pub fn length(&self) -> f64 {
        match self {
            Self::Element(e) => e.length(),
            Self::Compound(c) => c.length(),
            Self::Alignment(a) => a.length(),
            Self::Segment(s) => s.length(),
            Self::Thin(t) => t.length(),
        }
    }

    /// Aperture, if any. Segments have none.
    pub fn aperture(&self) -> Option<&Aperture> {
        match self {
            Self::Element(e) => e.aperture(),
            Self::Compound(c) => c.aperture(),
            Self::Alignment(a) => a.aperture(),
            Self::Segment(_) => None,
            Self::Thin(t) => t.aperture(),
        }
    }

    /// Reference beam, if any.
    pub fn beam(&self) -> Option<&BeamReference> {
        match self {
            Self::Element(e) => e.beam(),
            Self::Compound(c) => c.beam(),
            Self::Alignment(a) => a.target().beam(),
            Self::Segment(_) => None,
            Self::Thin(t) => t.base().beam(),
        }
    }

    /// Configuration of the entry, if it has one.
    pub fn config(&self) -> Option<&ElementConfig> {
        match self {
            Self::Element(e) => Some(e.config()),
            Self::Compound(c) => Some(c.config()),
            Self::Alignment(a) => a.target().config(),
            Self::Segment(_) => None,
            Self::Thin(t) => Some(t.base().config()),
        }
    }

    /// Per-particle loss at this entry's aperture; zeros without one.
    pub fn loss(&self, x: &PhaseSpace) -> Vec<f64> {
        match self {
            Self::Element(e) => e.loss(x),
            Self::Compound(c) => c.loss(x),
            Self::Alignment(a) => a.loss(x),
            Self::Segment(_) => vec![0.0; x.ncols()],
            Self::Thin(t) => t.loss(x),
        }
    }

    /// Type tag of the outermost layer.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Element(e) => e.element_type(),
            Self::Compound(c) => c.element_type(),
            Self::Alignment(a) => a.element_type(),
            Self::Segment(_) => ElementType::Segment,
            Self::Thin(_) => ElementType::ThinElement,
        }
    }

    /// Whether this entry is of type `ty`.
    ///
    /// An alignment error matches if any wrapper layer or the innermost
    /// element does.
    pub fn is_instance(&self, ty: ElementType) -> bool {
        match self {
            Self::Alignment(a) => {
                a.layers().iter().any(|l| l.element_type().is_a(ty))
                    || a.element().is_instance(ty)
            }
            other => other.element_type().is_a(ty),
        }
    }

    /// Whether this is a plain drift-family element.
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::Element(e) if e.is_drift())
    }

    /// The single element, if this is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Mutable single element, if this is one.
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Recompute every cached map below this entry.
    pub fn update_transfer_map(&mut self) -> Result<(), ElementError> {
        match self {
            Self::Element(e) => e.update_transfer_map(),
            Self::Compound(c) => c.update_transfer_map(),
            Self::Alignment(a) => a.update_transfer_map(),
            Self::Segment(s) => s.update_transfer_maps(),
            Self::Thin(t) => t.slices_mut().update_transfer_maps(),
        }
    }

    /// Thin representation with `n` kicks per sliceable element.
    pub fn makethin(
        &self,
        n: usize,
        style: Option<SlicingStyle>,
    ) -> Result<LatticeElement, ElementError> {
        match self {
            Self::Element(e) => e.makethin(n, style),
            Self::Compound(c) => c.makethin(n, style),
            Self::Alignment(a) => Ok(a.makethin(n, style)?.into()),
            Self::Segment(s) => {
                let styles = style.map(Criteria::uniform).unwrap_or_default();
                Ok(s.makethin(&Criteria::uniform(n), &styles)?.into())
            }
            Self::Thin(_) => Ok(self.clone()),
        }
    }

    /// Track with a built-in method, recursing into nested entries.
    pub fn track(&self, method: TrackingMethod, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        match self {
            Self::Element(e) => e.track(method, x),
            Self::Compound(c) => c.track(method, x),
            Self::Alignment(a) => a.track(method, x),
            Self::Segment(s) => s.track_each(method, x),
            Self::Thin(t) => t.slices().track_each(method, x),
        }
    }
}

impl From<Element> for LatticeElement {
    fn from(e: Element) -> Self {
        Self::Element(e)
    }
}

impl From<CompoundElement> for LatticeElement {
    fn from(c: CompoundElement) -> Self {
        Self::Compound(c)
    }
}

impl From<AlignmentError> for LatticeElement {
    fn from(a: AlignmentError) -> Self {
        Self::Alignment(a)
    }
}

impl From<Segment> for LatticeElement {
    fn from(s: Segment) -> Self {
        Self::Segment(s)
    }
}

impl From<ThinElement> for LatticeElement {
    fn from(t: ThinElement) -> Self {
        Self::Thin(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamline_core::BeamReference;

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    #[test]
    fn kind_matches_alignment_layers_and_target() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let e: LatticeElement = AlignmentError::tilt(0.01, q).into();
        assert!(e.is_instance(ElementType::Tilt));
        assert!(e.is_instance(ElementType::LongitudinalRoll));
        assert!(e.is_instance(ElementType::AlignmentError));
        assert!(e.is_instance(ElementType::Quadrupole));
        assert!(e.is_instance(ElementType::Element));
        assert!(!e.is_instance(ElementType::Offset));
        assert!(!e.is_instance(ElementType::Drift));
    }

    #[test]
    fn monitor_is_a_drift() {
        let m: LatticeElement = Element::hmonitor(0.5).beam(beam()).build().unwrap().into();
        assert!(m.is_instance(ElementType::Monitor));
        assert!(m.is_instance(ElementType::Drift));
        assert!(m.is_drift());
    }

    #[test]
    fn segment_loss_is_zero() {
        let s: LatticeElement = Segment::new(vec![Element::drift(1.0)
            .beam(beam())
            .aperture(Aperture::circle(1e-9))
            .build()
            .unwrap()
            .into()])
        .into();
        let x = PhaseSpace::from_element(3, 1.0);
        assert_eq!(s.loss(&x), vec![0.0; 3]);
        assert!(s.aperture().is_none());
    }

    #[test]
    fn segment_makethin_slices_children() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let s: LatticeElement = Segment::new(vec![q.into()]).into();
        let LatticeElement::Segment(thin) = s.makethin(2, None).unwrap() else {
            panic!("expected segment");
        };
        assert!(matches!(thin.elements()[0], LatticeElement::Thin(_)));
    }

    #[test]
    fn nested_tracking_matches_flat() {
        let q = Element::quadrupole(0.3, 0.5).beam(beam()).build().unwrap();
        let d = Element::drift(1.0).beam(beam()).build().unwrap();
        let x = PhaseSpace::from_fn(3, |i, j| 1e-3 * (i as f64 - j as f64));
        let flat = d.linear(&q.linear(&x).unwrap()).unwrap();
        let nested: LatticeElement = Segment::new(vec![q.into(), d.into()]).into();
        let out = nested.track(TrackingMethod::Linear, &x).unwrap();
        assert!((out - flat).amax() < 1e-15);
    }
}
