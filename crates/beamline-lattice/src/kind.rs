//! Element kinds, their parameters, and the element type hierarchy.
//!
//! [`ElementKind`] carries the physical parameters of a single element.
//! [`ElementType`] is the tag used by type selectors; each type has at
//! most one parent so that, for example, selecting `Drift` also selects
//! monitors and selecting `Kicker` also selects `HKicker`.

use std::fmt;

use beamline_core::Parameter;

// ── ElementType ────────────────────────────────────────────────────

/// Type tags of every lattice element variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum ElementType {
    Element,
    Marker,
    Drift,
    Instrument,
    Placeholder,
    Monitor,
    HMonitor,
    VMonitor,
    Kicker,
    HKicker,
    VKicker,
    TKicker,
    Quadrupole,
    ThinQuadrupole,
    Sextupole,
    ThinSextupole,
    SBendBody,
    Dipedge,
    Segment,
    ThinElement,
    CompoundElement,
    SBend,
    RBend,
    AlignmentError,
    Offset,
    LongitudinalRoll,
    Tilt,
    BPMError,
}

impl ElementType {
    /// The direct supertype, if any.
    pub fn parent(self) -> Option<ElementType> {
        use ElementType::*;
        match self {
            Element | Segment | AlignmentError => None,
            Marker | Drift | Kicker | Quadrupole | ThinQuadrupole | Sextupole | ThinSextupole
            | SBendBody | Dipedge => Some(Element),
            Instrument | Placeholder | Monitor => Some(Drift),
            HMonitor | VMonitor => Some(Monitor),
            HKicker | VKicker | TKicker => Some(Kicker),
            ThinElement | CompoundElement => Some(Segment),
            SBend => Some(CompoundElement),
            RBend => Some(SBend),
            Offset | LongitudinalRoll | BPMError => Some(AlignmentError),
            Tilt => Some(LongitudinalRoll),
        }
    }

    /// Whether `self` is `other` or one of its subtypes.
    pub fn is_a(self, other: ElementType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.parent();
        }
        false
    }

    /// The type name.
    pub fn name(self) -> &'static str {
        use ElementType::*;
        match self {
            Element => "Element",
            Marker => "Marker",
            Drift => "Drift",
            Instrument => "Instrument",
            Placeholder => "Placeholder",
            Monitor => "Monitor",
            HMonitor => "HMonitor",
            VMonitor => "VMonitor",
            Kicker => "Kicker",
            HKicker => "HKicker",
            VKicker => "VKicker",
            TKicker => "TKicker",
            Quadrupole => "Quadrupole",
            ThinQuadrupole => "ThinQuadrupole",
            Sextupole => "Sextupole",
            ThinSextupole => "ThinSextupole",
            SBendBody => "SBendBody",
            Dipedge => "Dipedge",
            Segment => "Segment",
            ThinElement => "ThinElement",
            CompoundElement => "CompoundElement",
            SBend => "SBend",
            RBend => "RBend",
            AlignmentError => "AlignmentError",
            Offset => "Offset",
            LongitudinalRoll => "LongitudinalRoll",
            Tilt => "Tilt",
            BPMError => "BPMError",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Parameter sets ─────────────────────────────────────────────────

/// Field-free elements that propagate like a drift.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DriftFlavor {
    /// Plain drift space.
    #[default]
    Plain,
    /// Generic instrument.
    Instrument,
    /// Placeholder for an element not modelled here.
    Placeholder,
    /// Beam position monitor measuring both planes.
    Monitor,
    /// Horizontal beam position monitor.
    HMonitor,
    /// Vertical beam position monitor.
    VMonitor,
}

impl DriftFlavor {
    /// Whether the flavour has a position readout.
    pub fn is_monitor(self) -> bool {
        matches!(self, Self::Monitor | Self::HMonitor | Self::VMonitor)
    }

    fn element_type(self) -> ElementType {
        match self {
            Self::Plain => ElementType::Drift,
            Self::Instrument => ElementType::Instrument,
            Self::Placeholder => ElementType::Placeholder,
            Self::Monitor => ElementType::Monitor,
            Self::HMonitor => ElementType::HMonitor,
            Self::VMonitor => ElementType::VMonitor,
        }
    }
}

/// Which kicker command an element was built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KickerFlavor {
    /// Combined horizontal and vertical kicker.
    #[default]
    Combined,
    /// Horizontal kicker.
    Horizontal,
    /// Vertical kicker.
    Vertical,
    /// Transverse kicker.
    Transverse,
}

/// Orbit corrector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Kicker {
    /// Which kicker command built the element.
    pub flavor: KickerFlavor,
    /// Horizontal kick.
    pub hkick: Parameter,
    /// Vertical kick.
    pub vkick: Parameter,
    /// Horizontal kick error.
    pub dkh: Parameter,
    /// Vertical kick error.
    pub dkv: Parameter,
}

/// Normal quadrupole with gradient `k1` and gradient error `dk1`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Quadrupole {
    /// Normalized gradient.
    pub k1: Parameter,
    /// Gradient error.
    pub dk1: Parameter,
}

/// Thin quadrupole kick with integrated strength `k1l`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThinQuadrupole {
    /// Integrated gradient.
    pub k1l: Parameter,
    /// Integrated gradient error.
    pub dk1l: Parameter,
}

/// Normal sextupole.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sextupole {
    /// Normalized sextupole strength.
    pub k2: Parameter,
    /// Strength error.
    pub dk2: Parameter,
}

/// Thin sextupole kick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThinSextupole {
    /// Integrated sextupole strength.
    pub k2l: Parameter,
    /// Integrated strength error.
    pub dk2l: Parameter,
}

/// Body of a sector bend without edge effects.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SBendBody {
    /// Bending angle.
    pub angle: Parameter,
    /// Dipole field error.
    pub dk0: Parameter,
}

/// Fringe field at the entrance or exit of a dipole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dipedge {
    /// Curvature `angle / length` of the associated bend.
    pub h: f64,
    /// Pole face rotation angle.
    pub e1: f64,
    /// Fringe field integral.
    pub fint: f64,
    /// Half gap of the magnet.
    pub hgap: f64,
    /// Pole face curvature.
    pub he: f64,
    /// Entrance (`true`) or exit (`false`) face.
    pub entrance: bool,
}

impl Default for Dipedge {
    fn default() -> Self {
        Self {
            h: 0.0,
            e1: 0.0,
            fint: 0.0,
            hgap: 0.0,
            he: 0.0,
            entrance: true,
        }
    }
}

// ── ElementKind ────────────────────────────────────────────────────

/// Physical kind of an element and its parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElementKind {
    /// Zero-length location marker.
    Marker,
    /// Field-free element.
    Drift(DriftFlavor),
    /// Orbit corrector.
    Kicker(Kicker),
    /// Thick quadrupole.
    Quadrupole(Quadrupole),
    /// Thin quadrupole.
    ThinQuadrupole(ThinQuadrupole),
    /// Thick sextupole.
    Sextupole(Sextupole),
    /// Thin sextupole.
    ThinSextupole(ThinSextupole),
    /// Sector bend body.
    SBendBody(SBendBody),
    /// Dipole fringe field.
    Dipedge(Dipedge),
}

impl ElementKind {
    /// Type tag for selectors.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Marker => ElementType::Marker,
            Self::Drift(flavor) => flavor.element_type(),
            Self::Kicker(k) => match k.flavor {
                KickerFlavor::Combined => ElementType::Kicker,
                KickerFlavor::Horizontal => ElementType::HKicker,
                KickerFlavor::Vertical => ElementType::VKicker,
                KickerFlavor::Transverse => ElementType::TKicker,
            },
            Self::Quadrupole(_) => ElementType::Quadrupole,
            Self::ThinQuadrupole(_) => ElementType::ThinQuadrupole,
            Self::Sextupole(_) => ElementType::Sextupole,
            Self::ThinSextupole(_) => ElementType::ThinSextupole,
            Self::SBendBody(_) => ElementType::SBendBody,
            Self::Dipedge(_) => ElementType::Dipedge,
        }
    }

    /// Type name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.element_type().name()
    }

    /// `(attribute, error attribute)` pairs for field errors.
    pub fn field_errors(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Kicker(_) => &[("hkick", "dkh"), ("vkick", "dkv")],
            Self::Quadrupole(_) => &[("k1", "dk1")],
            Self::ThinQuadrupole(_) => &[("k1l", "dk1l")],
            Self::Sextupole(_) => &[("k2", "dk2")],
            Self::ThinSextupole(_) => &[("k2l", "dk2l")],
            Self::SBendBody(_) => &[("k0", "dk0")],
            Self::Marker | Self::Drift(_) | Self::Dipedge(_) => &[],
        }
    }

    /// Mutable access to the named field-error parameter.
    pub(crate) fn field_error_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        match (self, name) {
            (Self::Kicker(k), "dkh") => Some(&mut k.dkh),
            (Self::Kicker(k), "dkv") => Some(&mut k.dkv),
            (Self::Quadrupole(q), "dk1") => Some(&mut q.dk1),
            (Self::ThinQuadrupole(q), "dk1l") => Some(&mut q.dk1l),
            (Self::Sextupole(s), "dk2") => Some(&mut s.dk2),
            (Self::ThinSextupole(s), "dk2l") => Some(&mut s.dk2l),
            (Self::SBendBody(b), "dk0") => Some(&mut b.dk0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitors_are_drifts() {
        assert!(ElementType::HMonitor.is_a(ElementType::Monitor));
        assert!(ElementType::HMonitor.is_a(ElementType::Drift));
        assert!(ElementType::HMonitor.is_a(ElementType::Element));
        assert!(!ElementType::Drift.is_a(ElementType::Monitor));
    }

    #[test]
    fn compound_elements_are_segments() {
        assert!(ElementType::RBend.is_a(ElementType::SBend));
        assert!(ElementType::RBend.is_a(ElementType::Segment));
        assert!(!ElementType::RBend.is_a(ElementType::Element));
        assert!(ElementType::ThinElement.is_a(ElementType::Segment));
    }

    #[test]
    fn tilt_is_a_roll() {
        assert!(ElementType::Tilt.is_a(ElementType::LongitudinalRoll));
        assert!(ElementType::Tilt.is_a(ElementType::AlignmentError));
        assert!(!ElementType::Offset.is_a(ElementType::LongitudinalRoll));
    }

    #[test]
    fn kicker_flavours_map_to_types() {
        let k = ElementKind::Kicker(Kicker {
            flavor: KickerFlavor::Vertical,
            ..Default::default()
        });
        assert_eq!(k.element_type(), ElementType::VKicker);
        assert!(k.element_type().is_a(ElementType::Kicker));
        assert_eq!(k.field_errors().len(), 2);
    }

    #[test]
    fn field_error_lookup_by_name() {
        let mut q = ElementKind::Quadrupole(Quadrupole::default());
        assert!(q.field_error_mut("dk1").is_some());
        assert!(q.field_error_mut("dkh").is_none());
    }
}
