//! Elements composed of interdependent parts.
//!
//! A [`CompoundElement`] owns a [`Segment`] of parts and derives its map
//! by composing them. The sector bend is the main instance:
//! `[Dipedge(entrance), SBendBody, Dipedge(exit)]`, with its attributes
//! routed to the part that carries them.

use beamline_core::{
    BeamReference, ElementConfig, ElementError, ElementId, MapError, Parameter, PhaseSpace,
    SlicingStyle, TrackingError, TrackingMethod, TransferMap,
};

use crate::aperture::Aperture;
use crate::element::{transverse, Element};
use crate::kind::{Dipedge, ElementKind, ElementType, SBendBody};
use crate::lattice::LatticeElement;
use crate::segment::Segment;
use crate::transfer::MapOptions;

const ENTRANCE: usize = 0;
const BODY: usize = 1;
const EXIT: usize = 2;

/// Which compound an element is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompoundKind {
    /// Arbitrary parts.
    Generic,
    /// Sector bend.
    SBend,
    /// Rectangular bend: a sector bend with pole faces rotated by
    /// half the bending angle.
    RBend,
}

impl CompoundKind {
    /// Type tag for selectors.
    pub fn element_type(self) -> ElementType {
        match self {
            Self::Generic => ElementType::CompoundElement,
            Self::SBend => ElementType::SBend,
            Self::RBend => ElementType::RBend,
        }
    }

    fn is_bend(self) -> bool {
        matches!(self, Self::SBend | Self::RBend)
    }
}

/// An element whose map is the composition of its parts.
#[derive(Clone, Debug)]
pub struct CompoundElement {
    id: ElementId,
    label: Option<String>,
    parts: Segment,
    aperture: Option<Aperture>,
    beam: Option<BeamReference>,
    config: ElementConfig,
    kind: CompoundKind,
}

impl CompoundElement {
    /// A generic compound of the given parts.
    pub fn new(parts: Vec<LatticeElement>) -> Self {
        Self {
            id: ElementId::next(),
            label: None,
            parts: Segment::new(parts),
            aperture: None,
            beam: None,
            config: ElementConfig::default(),
            kind: CompoundKind::Generic,
        }
    }

    /// Start building a sector bend.
    pub fn sbend(angle: impl Into<Parameter>, length: f64) -> BendBuilder {
        BendBuilder::new(CompoundKind::SBend, angle.into(), length)
    }

    /// Start building a rectangular bend.
    pub fn rbend(angle: impl Into<Parameter>, length: f64) -> BendBuilder {
        BendBuilder::new(CompoundKind::RBend, angle.into(), length)
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the aperture.
    pub fn with_aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    /// Set the reference beam.
    pub fn with_beam(mut self, beam: BeamReference) -> Self {
        self.beam = Some(beam);
        self
    }

    /// Set the configuration; its map order drives composition.
    pub fn with_config(mut self, config: ElementConfig) -> Self {
        self.config = config;
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Compound kind.
    pub fn kind(&self) -> CompoundKind {
        self.kind
    }

    /// Type tag for selectors.
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Replace the label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// The parts, in beam order.
    pub fn parts(&self) -> &Segment {
        &self.parts
    }

    /// Total length of the parts.
    pub fn length(&self) -> f64 {
        self.parts.length()
    }

    /// Aperture, if any.
    pub fn aperture(&self) -> Option<&Aperture> {
        self.aperture.as_ref()
    }

    /// Replace the aperture.
    pub fn set_aperture(&mut self, aperture: Option<Aperture>) {
        self.aperture = aperture;
    }

    /// Reference beam, if any.
    pub fn beam(&self) -> Option<&BeamReference> {
        self.beam.as_ref()
    }

    /// Configuration.
    pub fn config(&self) -> &ElementConfig {
        &self.config
    }

    // ── Maps and tracking ──────────────────────────────────────────

    /// Map of all parts composed at the configured order, without
    /// symplectification.
    pub fn transfer_map(&self) -> Result<TransferMap, MapError> {
        let opts = MapOptions {
            order: self.config.transfer_map_order,
            symplectify: false,
            ..MapOptions::default()
        };
        Ok(self.parts.reduce_transfer_map(&opts)?.into_transfer_map())
    }

    /// Refresh the maps of every part.
    pub fn update_transfer_map(&mut self) -> Result<(), ElementError> {
        self.parts.update_transfer_maps()
    }

    /// Loss at the compound's own aperture; zeros without one.
    pub fn loss(&self, x: &PhaseSpace) -> Vec<f64> {
        match &self.aperture {
            Some(ap) => ap.loss(&transverse(x)),
            None => vec![0.0; x.ncols()],
        }
    }

    /// Track through the parts in sequence.
    pub fn track(&self, method: TrackingMethod, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        self.parts.track_each(method, x)
    }

    /// Segment of thinned parts, or a clone for `n == 0`.
    ///
    /// Bends fail because their body cannot be sliced.
    pub fn makethin(
        &self,
        n: usize,
        style: Option<SlicingStyle>,
    ) -> Result<LatticeElement, ElementError> {
        if n == 0 {
            return Ok(self.clone().into());
        }
        let parts = self
            .parts
            .iter()
            .map(|p| p.makethin(n, style))
            .collect::<Result<Vec<_>, _>>()?;
        let mut segment = Segment::new(parts);
        segment.set_label(self.label.clone());
        Ok(segment.into())
    }

    /// `(attribute, error attribute)` pairs for field errors.
    pub fn field_errors(&self) -> &'static [(&'static str, &'static str)] {
        if self.kind.is_bend() {
            &[("k0", "dk0")]
        } else {
            &[]
        }
    }

    /// Add a field error; bends route it to their body.
    pub fn add_field_error(&mut self, attribute: &str, value: f64) -> Result<(), ElementError> {
        if !self.kind.is_bend() {
            return Err(ElementError::UnknownFieldError {
                kind: self.element_type().name(),
                attribute: attribute.to_string(),
            });
        }
        self.part_mut(BODY)?.add_field_error(attribute, value)
    }

    // ── Bend attributes ────────────────────────────────────────────

    fn part(&self, index: usize) -> Option<&Element> {
        if !self.kind.is_bend() {
            return None;
        }
        self.parts.elements().get(index)?.as_element()
    }

    fn part_mut(&mut self, index: usize) -> Result<&mut Element, ElementError> {
        let kind = self.element_type().name();
        if !self.kind.is_bend() {
            return Err(ElementError::NotABend { kind });
        }
        self.parts
            .elements_mut()
            .get_mut(index)
            .and_then(LatticeElement::as_element_mut)
            .ok_or(ElementError::NotABend { kind })
    }

    fn edge(&self, index: usize) -> Option<&Dipedge> {
        match self.part(index)?.kind() {
            ElementKind::Dipedge(edge) => Some(edge),
            _ => None,
        }
    }

    fn edge_mut(&mut self, index: usize) -> Result<&mut Dipedge, ElementError> {
        let kind = self.element_type().name();
        match self.part_mut(index)?.kind_mut() {
            ElementKind::Dipedge(edge) => Ok(edge),
            _ => Err(ElementError::NotABend { kind }),
        }
    }

    fn body(&self) -> Option<(&Element, Parameter, Parameter)> {
        let part = self.part(BODY)?;
        match part.kind() {
            ElementKind::SBendBody(b) => Some((part, b.angle, b.dk0)),
            _ => None,
        }
    }

    fn set_body(&mut self, f: impl FnOnce(&mut Parameter, &mut Parameter, f64)) -> Result<(), ElementError> {
        let kind = self.element_type().name();
        let part = self.part_mut(BODY)?;
        let length = part.length();
        match part.kind_mut() {
            ElementKind::SBendBody(b) => {
                f(&mut b.angle, &mut b.dk0, length);
                Ok(())
            }
            _ => Err(ElementError::NotABend { kind }),
        }
    }

    /// Bending angle.
    pub fn angle(&self) -> Option<f64> {
        self.body().map(|(_, angle, _)| angle.value)
    }

    /// Curvature `angle / length` of the body.
    pub fn k0(&self) -> Option<f64> {
        self.body().map(|(part, angle, _)| {
            if part.length() > 0.0 {
                angle.value / part.length()
            } else {
                0.0
            }
        })
    }

    /// Dipole field error.
    pub fn dk0(&self) -> Option<f64> {
        self.body().map(|(_, _, dk0)| dk0.value)
    }

    /// Entrance pole face angle.
    pub fn e1(&self) -> Option<f64> {
        self.edge(ENTRANCE).map(|e| e.e1)
    }

    /// Exit pole face angle.
    pub fn e2(&self) -> Option<f64> {
        self.edge(EXIT).map(|e| e.e1)
    }

    /// Entrance fringe field integral.
    pub fn fint(&self) -> Option<f64> {
        self.edge(ENTRANCE).map(|e| e.fint)
    }

    /// Exit fringe field integral.
    pub fn fintx(&self) -> Option<f64> {
        self.edge(EXIT).map(|e| e.fint)
    }

    /// Half gap.
    pub fn hgap(&self) -> Option<f64> {
        self.edge(ENTRANCE).map(|e| e.hgap)
    }

    /// Entrance pole face curvature.
    pub fn h1(&self) -> Option<f64> {
        self.edge(ENTRANCE).map(|e| e.he)
    }

    /// Exit pole face curvature.
    pub fn h2(&self) -> Option<f64> {
        self.edge(EXIT).map(|e| e.he)
    }

    /// Set the bending angle; the edge curvatures follow.
    pub fn set_angle(&mut self, value: impl Into<Parameter>) -> Result<(), ElementError> {
        let value = value.into();
        let mut h = 0.0;
        self.set_body(|angle, _, l| {
            *angle = value;
            if l > 0.0 {
                h = value.value / l;
            }
        })?;
        self.edge_mut(ENTRANCE)?.h = h;
        self.edge_mut(EXIT)?.h = h;
        Ok(())
    }

    /// Set the body curvature, changing the angle to `k0 * length`.
    pub fn set_k0(&mut self, value: f64) -> Result<(), ElementError> {
        let length = self.part_mut(BODY)?.length();
        let angle = self.body().map(|(_, a, _)| a).unwrap_or_default();
        self.set_angle(Parameter {
            value: value * length,
            ..angle
        })
    }

    /// Set the dipole field error.
    pub fn set_dk0(&mut self, value: impl Into<Parameter>) -> Result<(), ElementError> {
        let value = value.into();
        self.set_body(|_, dk0, _| *dk0 = value)
    }

    /// Set the entrance pole face angle.
    pub fn set_e1(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(ENTRANCE)?.e1 = value;
        Ok(())
    }

    /// Set the exit pole face angle.
    pub fn set_e2(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(EXIT)?.e1 = value;
        Ok(())
    }

    /// Set the entrance fringe field integral.
    pub fn set_fint(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(ENTRANCE)?.fint = value;
        Ok(())
    }

    /// Set the exit fringe field integral.
    pub fn set_fintx(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(EXIT)?.fint = value;
        Ok(())
    }

    /// Set the half gap on both edges.
    pub fn set_hgap(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(ENTRANCE)?.hgap = value;
        self.edge_mut(EXIT)?.hgap = value;
        Ok(())
    }

    /// Set the entrance pole face curvature.
    pub fn set_h1(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(ENTRANCE)?.he = value;
        Ok(())
    }

    /// Set the exit pole face curvature.
    pub fn set_h2(&mut self, value: f64) -> Result<(), ElementError> {
        self.edge_mut(EXIT)?.he = value;
        Ok(())
    }
}

// ── BendBuilder ────────────────────────────────────────────────────

/// Builder for sector and rectangular bends.
#[derive(Clone, Debug)]
pub struct BendBuilder {
    kind: CompoundKind,
    angle: Parameter,
    length: f64,
    e1: f64,
    e2: f64,
    fint: f64,
    fintx: Option<f64>,
    hgap: f64,
    h1: f64,
    h2: f64,
    dk0: Parameter,
    label: Option<String>,
    beam: Option<BeamReference>,
    aperture: Option<Aperture>,
    config: ElementConfig,
}

impl BendBuilder {
    fn new(kind: CompoundKind, angle: Parameter, length: f64) -> Self {
        Self {
            kind,
            angle,
            length,
            e1: 0.0,
            e2: 0.0,
            fint: 0.0,
            fintx: None,
            hgap: 0.0,
            h1: 0.0,
            h2: 0.0,
            dk0: Parameter::default(),
            label: None,
            beam: None,
            aperture: None,
            config: ElementConfig::default(),
        }
    }

    /// Entrance pole face angle.
    pub fn e1(mut self, e1: f64) -> Self {
        self.e1 = e1;
        self
    }

    /// Exit pole face angle.
    pub fn e2(mut self, e2: f64) -> Self {
        self.e2 = e2;
        self
    }

    /// Entrance fringe field integral; also the exit one unless
    /// [`fintx`](Self::fintx) is given.
    pub fn fint(mut self, fint: f64) -> Self {
        self.fint = fint;
        self
    }

    /// Exit fringe field integral.
    pub fn fintx(mut self, fintx: f64) -> Self {
        self.fintx = Some(fintx);
        self
    }

    /// Half gap.
    pub fn hgap(mut self, hgap: f64) -> Self {
        self.hgap = hgap;
        self
    }

    /// Entrance pole face curvature.
    pub fn h1(mut self, h1: f64) -> Self {
        self.h1 = h1;
        self
    }

    /// Exit pole face curvature.
    pub fn h2(mut self, h2: f64) -> Self {
        self.h2 = h2;
        self
    }

    /// Dipole field error.
    pub fn dk0(mut self, dk0: impl Into<Parameter>) -> Self {
        self.dk0 = dk0.into();
        self
    }

    /// Label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set or clear the label.
    pub fn maybe_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Reference beam; required to build the body.
    pub fn beam(mut self, beam: BeamReference) -> Self {
        self.beam = Some(beam);
        self
    }

    /// Set or clear the reference beam.
    pub fn maybe_beam(mut self, beam: Option<BeamReference>) -> Self {
        self.beam = beam;
        self
    }

    /// Aperture of the whole bend.
    pub fn aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    /// Set or clear the aperture.
    pub fn maybe_aperture(mut self, aperture: Option<Aperture>) -> Self {
        self.aperture = aperture;
        self
    }

    /// Configuration, shared by every part.
    pub fn config(mut self, config: ElementConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the three parts and the compound.
    pub fn build(self) -> Result<CompoundElement, ElementError> {
        let (mut e1, mut e2) = (self.e1, self.e2);
        if self.kind == CompoundKind::RBend {
            e1 += self.angle.value / 2.0;
            e2 += self.angle.value / 2.0;
        }
        let h = if self.length > 0.0 {
            self.angle.value / self.length
        } else {
            0.0
        };
        let edge = |e1: f64, fint: f64, he: f64, entrance: bool| {
            Element::dipedge(Dipedge {
                h,
                e1,
                fint,
                hgap: self.hgap,
                he,
                entrance,
            })
            .maybe_beam(self.beam)
            .config(self.config)
            .build()
        };
        let entrance = edge(e1, self.fint, self.h1, true)?;
        let body = Element::builder(ElementKind::SBendBody(SBendBody {
            angle: self.angle,
            dk0: self.dk0,
        }))
        .length(self.length)
        .maybe_beam(self.beam)
        .config(self.config)
        .build()?;
        let exit = edge(e2, self.fintx.unwrap_or(self.fint), self.h2, false)?;

        Ok(CompoundElement {
            id: ElementId::next(),
            label: self.label,
            parts: Segment::new(vec![entrance.into(), body.into(), exit.into()]),
            aperture: self.aperture,
            beam: self.beam,
            config: self.config,
            kind: self.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamline_core::{symplectic_defect, MapOrder};

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn part_map(c: &CompoundElement, i: usize) -> TransferMap {
        c.parts().elements()[i].as_element().unwrap().cached_map().clone()
    }

    #[test]
    fn sbend_map_is_product_of_parts() {
        let b = CompoundElement::sbend(0.1, 2.0)
            .e1(0.02)
            .e2(0.03)
            .fint(0.5)
            .hgap(0.02)
            .beam(beam())
            .build()
            .unwrap();
        let map = b.transfer_map().unwrap();
        let expected = part_map(&b, EXIT).r * part_map(&b, BODY).r * part_map(&b, ENTRANCE).r;
        assert!((map.r - expected).amax() < 1e-14);
        assert!(map.t.is_some());
        assert_eq!(b.length(), 2.0);
        assert!(symplectic_defect(&part_map(&b, BODY).r) < 1e-12);
    }

    #[test]
    fn first_order_bend_has_no_tensor() {
        let b = CompoundElement::sbend(0.1, 2.0)
            .beam(beam())
            .config(ElementConfig::default().with_order(MapOrder::First))
            .build()
            .unwrap();
        assert!(b.transfer_map().unwrap().t.is_none());
    }

    #[test]
    fn rbend_rotates_pole_faces() {
        let b = CompoundElement::rbend(0.2, 1.0)
            .e1(0.01)
            .beam(beam())
            .build()
            .unwrap();
        assert!((b.e1().unwrap() - 0.11).abs() < 1e-15);
        assert!((b.e2().unwrap() - 0.1).abs() < 1e-15);
        assert_eq!(b.element_type(), ElementType::RBend);
    }

    #[test]
    fn fintx_defaults_to_fint() {
        let b = CompoundElement::sbend(0.1, 1.0)
            .fint(0.4)
            .beam(beam())
            .build()
            .unwrap();
        assert_eq!(b.fintx(), Some(0.4));
        let b = CompoundElement::sbend(0.1, 1.0)
            .fint(0.4)
            .fintx(0.3)
            .beam(beam())
            .build()
            .unwrap();
        assert_eq!(b.fintx(), Some(0.3));
    }

    #[test]
    fn bend_needs_beam() {
        assert!(matches!(
            CompoundElement::sbend(0.1, 1.0).build(),
            Err(ElementError::MissingBeam { .. })
        ));
    }

    #[test]
    fn setters_route_to_parts() {
        let mut b = CompoundElement::sbend(0.1, 2.0).beam(beam()).build().unwrap();
        b.set_hgap(0.05).unwrap();
        b.set_h2(0.2).unwrap();
        b.set_k0(0.1).unwrap();
        assert_eq!(b.hgap(), Some(0.05));
        assert_eq!(b.h2(), Some(0.2));
        assert!((b.angle().unwrap() - 0.2).abs() < 1e-15);
        assert!((b.k0().unwrap() - 0.1).abs() < 1e-15);
        assert!((b.edge(ENTRANCE).unwrap().h - 0.1).abs() < 1e-15);
    }

    #[test]
    fn refresh_after_setter() {
        let mut b = CompoundElement::sbend(0.1, 2.0).beam(beam()).build().unwrap();
        let before = b.transfer_map().unwrap().r;
        b.add_field_error("k0", 1e-3).unwrap();
        assert_eq!(b.transfer_map().unwrap().r, before);
        b.update_transfer_map().unwrap();
        let after = b.transfer_map().unwrap();
        assert_ne!(after.r, before);
        assert!(after.d[0].abs() > 0.0);
        assert_eq!(b.dk0(), Some(1e-3));
    }

    #[test]
    fn generic_compound_has_no_bend_attributes() {
        let d = Element::drift(1.0).beam(beam()).build().unwrap();
        let mut c = CompoundElement::new(vec![d.into()]);
        assert_eq!(c.angle(), None);
        assert!(matches!(
            c.set_e1(0.1),
            Err(ElementError::NotABend { kind: "CompoundElement" })
        ));
        assert!(c.add_field_error("k0", 0.1).is_err());
    }

    #[test]
    fn loss_without_aperture_is_zero() {
        let b = CompoundElement::sbend(0.1, 2.0).beam(beam()).build().unwrap();
        assert_eq!(b.loss(&PhaseSpace::from_element(2, 1.0)), vec![0.0, 0.0]);
    }

    #[test]
    fn bend_cannot_be_sliced() {
        let b = CompoundElement::sbend(0.1, 2.0).beam(beam()).build().unwrap();
        assert!(matches!(
            b.makethin(2, None),
            Err(ElementError::SlicingUnsupported { kind: "SBendBody" })
        ));
        assert!(matches!(b.makethin(0, None), Ok(LatticeElement::Compound(_))));
    }

    #[test]
    fn generic_makethin_gives_segment() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let c = CompoundElement::new(vec![q.into()]).with_label("c");
        let LatticeElement::Segment(s) = c.makethin(3, None).unwrap() else {
            panic!("expected segment");
        };
        assert_eq!(s.label(), Some("c"));
        assert!(matches!(s.elements()[0], LatticeElement::Thin(_)));
    }
}
