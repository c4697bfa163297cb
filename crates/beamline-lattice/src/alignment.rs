//! Alignment errors wrapping a lattice element.
//!
//! An [`AlignmentError`] transforms coordinates into the misaligned
//! element frame at the entrance and back at the exit:
//! `forward(x) = exit(target(enter(x)))`. Length, label, aperture and
//! loss are those of the target. Wrappers can nest.

use beamline_core::{
    affine, ElementError, ElementId, Matrix6, PhaseSpace, SlicingStyle, TrackingError,
    TrackingMethod, TransferMap, Transverse, Vector6,
};
use rand::Rng;

use crate::aperture::Aperture;
use crate::element::transverse;
use crate::kind::ElementType;
use crate::lattice::LatticeElement;

/// Read-out noise scale used when none is given.
pub const DEFAULT_NOISE_SCALE: (f64, f64) = (1e-100, 1e-100);

/// Kind and parameters of an alignment error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AlignmentKind {
    /// Transverse displacement of the element.
    Offset {
        /// Horizontal offset.
        dx: f64,
        /// Vertical offset.
        dy: f64,
    },
    /// Rotation about the longitudinal axis.
    LongitudinalRoll {
        /// Roll angle.
        psi: f64,
    },
    /// Rotation about the longitudinal axis, from the `tilt` attribute.
    Tilt {
        /// Roll angle.
        psi: f64,
    },
    /// Beam position monitor calibration error.
    BpmError {
        /// Horizontal read-out offset.
        ax: f64,
        /// Vertical read-out offset.
        ay: f64,
        /// Relative horizontal scale error.
        rx: f64,
        /// Relative vertical scale error.
        ry: f64,
        /// Standard deviation of Gaussian read-out noise per plane.
        noise_scale: (f64, f64),
    },
}

impl AlignmentKind {
    /// Type tag for selectors.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Offset { .. } => ElementType::Offset,
            Self::LongitudinalRoll { .. } => ElementType::LongitudinalRoll,
            Self::Tilt { .. } => ElementType::Tilt,
            Self::BpmError { .. } => ElementType::BPMError,
        }
    }

    /// Lattice attributes whose non-zero value calls for this error,
    /// in the order of the kind's parameters.
    pub fn triggers(ty: ElementType) -> &'static [&'static str] {
        match ty {
            ElementType::Offset => &["dx", "dy"],
            ElementType::LongitudinalRoll => &["dpsi"],
            ElementType::Tilt => &["tilt"],
            ElementType::BPMError => &["mrex", "mrey", "mscalx", "mscaly"],
            _ => &[],
        }
    }

    /// Build the kind of type `ty` from trigger values in trigger order.
    /// Missing values are zero.
    pub fn from_triggers(ty: ElementType, values: &[f64]) -> Option<Self> {
        let v = |i: usize| values.get(i).copied().unwrap_or(0.0);
        match ty {
            ElementType::Offset => Some(Self::Offset { dx: v(0), dy: v(1) }),
            ElementType::LongitudinalRoll => Some(Self::LongitudinalRoll { psi: v(0) }),
            ElementType::Tilt => Some(Self::Tilt { psi: v(0) }),
            ElementType::BPMError => Some(Self::BpmError {
                ax: v(0),
                ay: v(1),
                rx: v(2),
                ry: v(3),
                noise_scale: DEFAULT_NOISE_SCALE,
            }),
            _ => None,
        }
    }

    fn entrance_exit(&self) -> (TransferMap, TransferMap) {
        let mut enter = TransferMap::identity(false);
        let mut exit = TransferMap::identity(false);
        match *self {
            Self::Offset { dx, dy } => {
                enter.d = Vector6::new(-dx, 0.0, -dy, 0.0, 0.0, 0.0);
                exit.d = Vector6::new(dx, 0.0, dy, 0.0, 0.0, 0.0);
            }
            Self::LongitudinalRoll { psi } | Self::Tilt { psi } => {
                enter.r = roll(psi);
                exit.r = roll(-psi);
            }
            Self::BpmError { .. } => {}
        }
        (enter, exit)
    }
}

/// Rotation of `(x, px)` into `(y, py)` by `psi`.
fn roll(psi: f64) -> Matrix6 {
    let (s, c) = psi.sin_cos();
    let mut r = Matrix6::identity();
    for i in 0..4 {
        r[(i, i)] = c;
    }
    r[(0, 2)] = s;
    r[(1, 3)] = s;
    r[(2, 0)] = -s;
    r[(3, 1)] = -s;
    r
}

/// An alignment error wrapping a target element.
#[derive(Clone, Debug)]
pub struct AlignmentError {
    id: ElementId,
    kind: AlignmentKind,
    target: Box<LatticeElement>,
    entrance: TransferMap,
    exit: TransferMap,
}

impl AlignmentError {
    /// Wrap `target` with an error of the given kind.
    pub fn new(kind: AlignmentKind, target: impl Into<LatticeElement>) -> Self {
        let (entrance, exit) = kind.entrance_exit();
        Self {
            id: ElementId::next(),
            kind,
            target: Box::new(target.into()),
            entrance,
            exit,
        }
    }

    /// Transverse offset `(dx, dy)`.
    pub fn offset(dx: f64, dy: f64, target: impl Into<LatticeElement>) -> Self {
        Self::new(AlignmentKind::Offset { dx, dy }, target)
    }

    /// Longitudinal roll by `psi`.
    pub fn longitudinal_roll(psi: f64, target: impl Into<LatticeElement>) -> Self {
        Self::new(AlignmentKind::LongitudinalRoll { psi }, target)
    }

    /// Tilt by `psi`.
    pub fn tilt(psi: f64, target: impl Into<LatticeElement>) -> Self {
        Self::new(AlignmentKind::Tilt { psi }, target)
    }

    /// Monitor read-out error with the default noise scale.
    pub fn bpm_error(
        ax: f64,
        ay: f64,
        rx: f64,
        ry: f64,
        target: impl Into<LatticeElement>,
    ) -> Self {
        Self::new(
            AlignmentKind::BpmError {
                ax,
                ay,
                rx,
                ry,
                noise_scale: DEFAULT_NOISE_SCALE,
            },
            target,
        )
    }

    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Kind and parameters.
    pub fn kind(&self) -> &AlignmentKind {
        &self.kind
    }

    /// Replace the kind; entrance and exit maps follow immediately.
    pub fn set_kind(&mut self, kind: AlignmentKind) {
        let (entrance, exit) = kind.entrance_exit();
        self.kind = kind;
        self.entrance = entrance;
        self.exit = exit;
    }

    /// Type tag for selectors.
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// The wrapped element.
    pub fn target(&self) -> &LatticeElement {
        &self.target
    }

    /// Mutable wrapped element.
    pub fn target_mut(&mut self) -> &mut LatticeElement {
        &mut self.target
    }

    /// Unwrap one layer.
    pub fn into_target(self) -> LatticeElement {
        *self.target
    }

    /// This wrapper followed by every nested wrapper, outermost first.
    pub fn layers(&self) -> Vec<&AlignmentError> {
        let mut out = vec![self];
        let mut current = self.target.as_ref();
        while let LatticeElement::Alignment(inner) = current {
            out.push(inner);
            current = inner.target.as_ref();
        }
        out
    }

    /// The innermost wrapped element.
    pub fn element(&self) -> &LatticeElement {
        let mut current = self.target.as_ref();
        while let LatticeElement::Alignment(inner) = current {
            current = inner.target.as_ref();
        }
        current
    }

    /// Map into the misaligned frame.
    pub fn transfer_map_enter(&self) -> &TransferMap {
        &self.entrance
    }

    /// Map back out of the misaligned frame.
    pub fn transfer_map_exit(&self) -> &TransferMap {
        &self.exit
    }

    /// `R_enter x + d_enter`.
    pub fn enter(&self, x: &PhaseSpace) -> PhaseSpace {
        affine(&self.entrance.d, &self.entrance.r, x)
    }

    /// `R_exit x + d_exit`.
    pub fn exit(&self, x: &PhaseSpace) -> PhaseSpace {
        affine(&self.exit.d, &self.exit.r, x)
    }

    /// Track through the misaligned target.
    pub fn track(
        &self,
        method: TrackingMethod,
        x: &PhaseSpace,
    ) -> Result<PhaseSpace, TrackingError> {
        let inside = self.target.track(method, &self.enter(x))?;
        Ok(self.exit(&inside))
    }

    /// Measured position `(1 + r)(xy + a) + noise`; monitor errors only.
    pub fn readout<R: Rng>(
        &self,
        x: &PhaseSpace,
        rng: &mut R,
    ) -> Result<Transverse, TrackingError> {
        let AlignmentKind::BpmError {
            ax,
            ay,
            rx,
            ry,
            noise_scale,
        } = self.kind
        else {
            return Err(TrackingError::MethodUnavailable {
                kind: self.element_type().name(),
                method: "readout",
            });
        };
        let mut xy = transverse(x);
        let planes = [(ax, rx, noise_scale.0), (ay, ry, noise_scale.1)];
        for mut col in xy.column_iter_mut() {
            for (p, (a, r, scale)) in planes.iter().enumerate() {
                col[p] = (1.0 + r) * (col[p] + a) + scale * box_muller(rng);
            }
        }
        Ok(xy)
    }

    /// Target label.
    pub fn label(&self) -> Option<&str> {
        self.target.label()
    }

    /// Relabel the target.
    pub fn set_label(&mut self, label: Option<String>) {
        self.target.set_label(label);
    }

    /// Target length.
    pub fn length(&self) -> f64 {
        self.target.length()
    }

    /// Target aperture.
    pub fn aperture(&self) -> Option<&Aperture> {
        self.target.aperture()
    }

    /// Loss at the target aperture.
    pub fn loss(&self, x: &PhaseSpace) -> Vec<f64> {
        self.target.loss(x)
    }

    /// Refresh the target's maps.
    pub fn update_transfer_map(&mut self) -> Result<(), ElementError> {
        self.target.update_transfer_map()
    }

    /// Copy with a fresh identity wrapping the thin target.
    pub fn makethin(
        &self,
        n: usize,
        style: Option<SlicingStyle>,
    ) -> Result<AlignmentError, ElementError> {
        Ok(Self {
            id: ElementId::next(),
            kind: self.kind,
            target: Box::new(self.target.makethin(n, style)?),
            entrance: self.entrance.clone(),
            exit: self.exit.clone(),
        })
    }
}

/// Standard normal sample.
fn box_muller<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-300); // avoid ln(0)
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use beamline_core::BeamReference;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn bunch() -> PhaseSpace {
        PhaseSpace::from_fn(5, |i, j| 1e-3 * ((i + 1) as f64) * ((j as f64) - 2.0))
    }

    #[test]
    fn offset_of_drift_is_transparent() {
        let d = Element::drift(1.0).beam(beam()).build().unwrap();
        let expected = d.linear(&bunch()).unwrap();
        let err = AlignmentError::offset(1e-3, -2e-3, d);
        let out = err.track(TrackingMethod::Linear, &bunch()).unwrap();
        assert!((out - expected).amax() < 1e-15);
    }

    #[test]
    fn offset_quadrupole_kicks_centred_beam() {
        let q = Element::quadrupole(1.0, 0.5).beam(beam()).build().unwrap();
        let err = AlignmentError::offset(1e-3, 0.0, q);
        let x = PhaseSpace::zeros(1);
        let out = err.track(TrackingMethod::Linear, &x).unwrap();
        assert!(out[(1, 0)] > 0.0);
    }

    #[test]
    fn roll_maps_are_inverse() {
        let err = AlignmentError::tilt(0.3, Element::marker().build().unwrap());
        let product = err.transfer_map_exit().r * err.transfer_map_enter().r;
        assert!((product - Matrix6::identity()).amax() < 1e-15);
        assert_eq!(err.transfer_map_enter().r[(0, 2)], 0.3f64.sin());
        assert_eq!(err.transfer_map_enter().r[(2, 0)], -(0.3f64.sin()));
    }

    #[test]
    fn delegates_to_target() {
        let d = Element::drift(2.5)
            .beam(beam())
            .label("d1")
            .aperture(Aperture::circle(1e-3))
            .build()
            .unwrap();
        let mut err = AlignmentError::offset(0.0, 0.0, AlignmentError::tilt(0.1, d));
        assert_eq!(err.length(), 2.5);
        assert_eq!(err.label(), Some("d1"));
        assert!(err.aperture().is_some());
        err.set_label(Some("renamed".into()));
        assert_eq!(err.element().label(), Some("renamed"));
    }

    #[test]
    fn layers_walk_the_chain() {
        let d = Element::drift(1.0).beam(beam()).build().unwrap();
        let err = AlignmentError::offset(0.0, 0.0, AlignmentError::tilt(0.1, d));
        let layers = err.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].element_type(), ElementType::Offset);
        assert_eq!(layers[1].element_type(), ElementType::Tilt);
        assert_eq!(err.element().element_type(), ElementType::Drift);
    }

    #[test]
    fn bpm_readout_applies_calibration() {
        let m = Element::monitor(0.0).build().unwrap();
        let err = AlignmentError::bpm_error(1e-4, -1e-4, 0.1, 0.0, m);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let x = bunch();
        let xy = err.readout(&x, &mut rng).unwrap();
        for c in 0..x.ncols() {
            assert!((xy[(0, c)] - 1.1 * (x[(0, c)] + 1e-4)).abs() < 1e-15);
            assert!((xy[(1, c)] - (x[(2, c)] - 1e-4)).abs() < 1e-15);
        }
    }

    #[test]
    fn offset_has_no_readout() {
        let m = Element::monitor(0.0).build().unwrap();
        let err = AlignmentError::offset(0.0, 0.0, m);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(err.readout(&bunch(), &mut rng).is_err());
    }

    #[test]
    fn triggers_build_kinds() {
        assert_eq!(AlignmentKind::triggers(ElementType::Offset), &["dx", "dy"]);
        assert_eq!(
            AlignmentKind::from_triggers(ElementType::Offset, &[1.0, 2.0]),
            Some(AlignmentKind::Offset { dx: 1.0, dy: 2.0 })
        );
        assert_eq!(AlignmentKind::from_triggers(ElementType::Drift, &[]), None);
    }

    #[test]
    fn makethin_refreshes_identity() {
        let q = Element::quadrupole(0.1, 1.0).beam(beam()).build().unwrap();
        let err = AlignmentError::offset(1e-3, 0.0, q);
        let thin = err.makethin(2, None).unwrap();
        assert_ne!(thin.id(), err.id());
        assert!(matches!(thin.target(), LatticeElement::Thin(_)));
    }
}
