//! Physical lattice elements.
//!
//! An [`Element`] owns its parameters and a cached [`TransferMap`].
//! The cache is computed at construction and refreshed only by
//! [`Element::update_transfer_map`]: after mutating any parameter
//! through [`Element::kind_mut`], [`Element::set_length`] or
//! [`Element::add_field_error`], callers must refresh before tracking
//! or composing maps.

use beamline_core::{
    BeamReference, ElementConfig, ElementError, ElementId, MapOrder, Parameter, PhaseSpace,
    SlicingStyle, TrackingError, TrackingMethod, TransferMap, Transverse,
};

use crate::aperture::Aperture;
use crate::formulas::compute_map;
use crate::kind::{
    Dipedge, DriftFlavor, ElementKind, ElementType, Kicker, KickerFlavor, Quadrupole, SBendBody,
    Sextupole, ThinQuadrupole, ThinSextupole,
};
use crate::lattice::LatticeElement;
use crate::thin::ThinElement;

/// A single physical element with a cached second-order map.
#[derive(Clone, Debug)]
pub struct Element {
    id: ElementId,
    label: Option<String>,
    length: f64,
    beam: Option<BeamReference>,
    aperture: Option<Aperture>,
    config: ElementConfig,
    kind: ElementKind,
    map: TransferMap,
}

impl Element {
    /// Start building an element of the given kind.
    pub fn builder(kind: ElementKind) -> ElementBuilder {
        ElementBuilder {
            kind,
            length: 0.0,
            label: None,
            beam: None,
            aperture: None,
            config: ElementConfig::default(),
        }
    }

    /// Zero-length marker.
    pub fn marker() -> ElementBuilder {
        Self::builder(ElementKind::Marker)
    }

    /// Drift space.
    pub fn drift(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::Plain)).length(length)
    }

    /// Generic instrument; propagates like a drift.
    pub fn instrument(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::Instrument)).length(length)
    }

    /// Placeholder; propagates like a drift.
    pub fn placeholder(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::Placeholder)).length(length)
    }

    /// Beam position monitor.
    pub fn monitor(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::Monitor)).length(length)
    }

    /// Horizontal beam position monitor.
    pub fn hmonitor(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::HMonitor)).length(length)
    }

    /// Vertical beam position monitor.
    pub fn vmonitor(length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Drift(DriftFlavor::VMonitor)).length(length)
    }

    /// Combined orbit corrector.
    pub fn kicker(hkick: impl Into<Parameter>, vkick: impl Into<Parameter>) -> ElementBuilder {
        Self::kicker_of(KickerFlavor::Combined, hkick.into(), vkick.into())
    }

    /// Horizontal orbit corrector.
    pub fn hkicker(kick: impl Into<Parameter>) -> ElementBuilder {
        Self::kicker_of(KickerFlavor::Horizontal, kick.into(), Parameter::default())
    }

    /// Vertical orbit corrector.
    pub fn vkicker(kick: impl Into<Parameter>) -> ElementBuilder {
        Self::kicker_of(KickerFlavor::Vertical, Parameter::default(), kick.into())
    }

    /// Transverse orbit corrector.
    pub fn tkicker(hkick: impl Into<Parameter>, vkick: impl Into<Parameter>) -> ElementBuilder {
        Self::kicker_of(KickerFlavor::Transverse, hkick.into(), vkick.into())
    }

    fn kicker_of(flavor: KickerFlavor, hkick: Parameter, vkick: Parameter) -> ElementBuilder {
        Self::builder(ElementKind::Kicker(Kicker {
            flavor,
            hkick,
            vkick,
            ..Default::default()
        }))
    }

    /// Thick quadrupole.
    pub fn quadrupole(k1: impl Into<Parameter>, length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Quadrupole(Quadrupole {
            k1: k1.into(),
            dk1: Parameter::default(),
        }))
        .length(length)
    }

    /// Thin quadrupole with integrated gradient `k1l`.
    pub fn thin_quadrupole(k1l: impl Into<Parameter>) -> ElementBuilder {
        Self::builder(ElementKind::ThinQuadrupole(ThinQuadrupole {
            k1l: k1l.into(),
            dk1l: Parameter::default(),
        }))
    }

    /// Thick sextupole.
    pub fn sextupole(k2: impl Into<Parameter>, length: f64) -> ElementBuilder {
        Self::builder(ElementKind::Sextupole(Sextupole {
            k2: k2.into(),
            dk2: Parameter::default(),
        }))
        .length(length)
    }

    /// Thin sextupole with integrated strength `k2l`.
    pub fn thin_sextupole(k2l: impl Into<Parameter>) -> ElementBuilder {
        Self::builder(ElementKind::ThinSextupole(ThinSextupole {
            k2l: k2l.into(),
            dk2l: Parameter::default(),
        }))
    }

    /// Sector bend body without edges.
    pub fn sbend_body(angle: impl Into<Parameter>, length: f64) -> ElementBuilder {
        Self::builder(ElementKind::SBendBody(SBendBody {
            angle: angle.into(),
            dk0: Parameter::default(),
        }))
        .length(length)
    }

    /// Dipole fringe field.
    pub fn dipedge(edge: Dipedge) -> ElementBuilder {
        Self::builder(ElementKind::Dipedge(edge))
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Element label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Replace the label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// Element length.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Change the length. Call [`update_transfer_map`](Self::update_transfer_map) afterwards.
    pub fn set_length(&mut self, length: f64) -> Result<(), ElementError> {
        check_length(&self.kind, length)?;
        self.length = length;
        Ok(())
    }

    /// Reference beam, if any.
    pub fn beam(&self) -> Option<&BeamReference> {
        self.beam.as_ref()
    }

    /// Aperture, if any.
    pub fn aperture(&self) -> Option<&Aperture> {
        self.aperture.as_ref()
    }

    /// Replace the aperture.
    pub fn set_aperture(&mut self, aperture: Option<Aperture>) {
        self.aperture = aperture;
    }

    /// Element configuration.
    pub fn config(&self) -> &ElementConfig {
        &self.config
    }

    /// Kind and parameters.
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Mutable kind and parameters. Call
    /// [`update_transfer_map`](Self::update_transfer_map) afterwards.
    pub fn kind_mut(&mut self) -> &mut ElementKind {
        &mut self.kind
    }

    /// Type tag for selectors.
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Whether the element propagates like a drift.
    pub fn is_drift(&self) -> bool {
        self.element_type().is_a(ElementType::Drift)
    }

    /// Whether the element is shorter than the slicing threshold.
    pub fn is_thin(&self) -> bool {
        self.length < self.config.makethin_min_length
    }

    /// Cached map, without the thick-kicker check.
    pub fn cached_map(&self) -> &TransferMap {
        &self.map
    }

    /// The element map.
    ///
    /// Thick kickers have no analytic map and fail with
    /// [`TrackingError::ThickElement`].
    pub fn transfer_map(&self) -> Result<&TransferMap, TrackingError> {
        self.check_thin()?;
        Ok(&self.map)
    }

    /// Recompute the cached map from the current parameters.
    pub fn update_transfer_map(&mut self) -> Result<(), ElementError> {
        self.map = compute_map(
            &self.kind,
            self.length,
            self.beam.as_ref(),
            self.config.transfer_map_order,
        )?;
        Ok(())
    }

    /// `(attribute, error attribute)` pairs for field errors.
    pub fn field_errors(&self) -> &'static [(&'static str, &'static str)] {
        self.kind.field_errors()
    }

    /// Add `value` to the error of `attribute`.
    ///
    /// Accepts either the attribute name (`k1`) or its error name
    /// (`dk1`). Call [`update_transfer_map`](Self::update_transfer_map)
    /// afterwards.
    pub fn add_field_error(&mut self, attribute: &str, value: f64) -> Result<(), ElementError> {
        let error_name = self
            .field_errors()
            .iter()
            .find(|(attr, err)| *attr == attribute || *err == attribute)
            .map(|(_, err)| *err);
        let kind_name = self.kind.name();
        let param = error_name
            .and_then(|name| self.kind.field_error_mut(name))
            .ok_or_else(|| ElementError::UnknownFieldError {
                kind: kind_name,
                attribute: attribute.to_string(),
            })?;
        param.value += value;
        Ok(())
    }

    // ── Tracking ───────────────────────────────────────────────────

    /// Loss of every particle at the element's aperture; zeros without one.
    pub fn loss(&self, x: &PhaseSpace) -> Vec<f64> {
        match &self.aperture {
            Some(ap) => ap.loss(&transverse(x)),
            None => vec![0.0; x.ncols()],
        }
    }

    /// Track with the given built-in method.
    pub fn track(&self, method: TrackingMethod, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        match method {
            TrackingMethod::Exact => self.exact(x),
            TrackingMethod::Linear => self.linear(x),
            TrackingMethod::SecondOrder => self.second_order(x),
        }
    }

    /// Exact tracking; defined for markers and drift-like elements.
    pub fn exact(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        match self.kind {
            ElementKind::Marker => Ok(x.clone()),
            ElementKind::Drift(_) => match &self.beam {
                Some(beam) => Ok(exact_drift(self.length, beam.beta(), x)),
                None => Ok(x.clone()),
            },
            _ => Err(TrackingError::MethodUnavailable {
                kind: self.kind.name(),
                method: TrackingMethod::Exact.as_str(),
            }),
        }
    }

    /// `d + R x`.
    pub fn linear(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        if matches!(self.kind, ElementKind::Marker) {
            return Ok(x.clone());
        }
        Ok(self.transfer_map()?.linear(x))
    }

    /// `d + R x + T(x, x)`.
    pub fn second_order(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        self.transfer_map()?
            .second_order(x)
            .ok_or(TrackingError::MissingSecondOrder {
                kind: self.kind.name(),
            })
    }

    /// Measured transverse position `(x, y)`; monitors only.
    pub fn readout(&self, x: &PhaseSpace) -> Result<Transverse, TrackingError> {
        match self.kind {
            ElementKind::Drift(flavor) if flavor.is_monitor() => Ok(transverse(x)),
            _ => Err(TrackingError::MethodUnavailable {
                kind: self.kind.name(),
                method: "readout",
            }),
        }
    }

    fn check_thin(&self) -> Result<(), TrackingError> {
        if matches!(self.kind, ElementKind::Kicker(_)) && !self.is_thin() {
            return Err(TrackingError::ThickElement {
                kind: self.kind.name(),
                length: self.length,
            });
        }
        Ok(())
    }

    // ── Slicing ────────────────────────────────────────────────────

    /// Thin representation with `n` kicks.
    ///
    /// Returns a clone when `n == 0` or the element is already thin.
    /// Drift-like elements are returned unchanged. `style` falls back to
    /// the configured slicing style. Kicker slices divide the `dkh`/`dkv`
    /// field errors by `n` along with the kicks.
    pub fn makethin(
        &self,
        n: usize,
        style: Option<SlicingStyle>,
    ) -> Result<LatticeElement, ElementError> {
        if n == 0 || self.is_thin() {
            return Ok(self.clone().into());
        }
        let Some(kind) = self.thin_kind(n)? else {
            return Ok(self.clone().into());
        };
        let thin = Element::builder(kind)
            .maybe_beam(self.beam)
            .config(self.config)
            .build()?;
        let style = style.unwrap_or(self.config.slicing_style);
        Ok(ThinElement::slice(self, &thin, n, style)?.into())
    }

    /// Thin kick replacing one of `n` slices, or `None` if the element is
    /// kept as is.
    fn thin_kind(&self, n: usize) -> Result<Option<ElementKind>, ElementError> {
        let per_slice = self.length / n as f64;
        let kind = match self.kind {
            ElementKind::Marker
            | ElementKind::Drift(_)
            | ElementKind::ThinQuadrupole(_)
            | ElementKind::ThinSextupole(_)
            | ElementKind::Dipedge(_) => return Ok(None),
            ElementKind::Kicker(k) => {
                let f = 1.0 / n as f64;
                ElementKind::Kicker(Kicker {
                    flavor: k.flavor,
                    hkick: k.hkick.scaled(f),
                    vkick: k.vkick.scaled(f),
                    dkh: k.dkh.scaled(f),
                    dkv: k.dkv.scaled(f),
                })
            }
            ElementKind::Quadrupole(q) => ElementKind::ThinQuadrupole(ThinQuadrupole {
                k1l: q.k1.scaled(per_slice),
                dk1l: q.dk1.scaled(per_slice),
            }),
            ElementKind::Sextupole(s) => ElementKind::ThinSextupole(ThinSextupole {
                k2l: s.k2.scaled(per_slice),
                dk2l: s.dk2.scaled(per_slice),
            }),
            ElementKind::SBendBody(_) => {
                return Err(ElementError::SlicingUnsupported {
                    kind: self.kind.name(),
                })
            }
        };
        Ok(Some(kind))
    }
}

fn check_length(kind: &ElementKind, length: f64) -> Result<(), ElementError> {
    if !length.is_finite() || length < 0.0 {
        return Err(ElementError::InvalidLength { length });
    }
    if matches!(kind, ElementKind::Marker) && length != 0.0 {
        return Err(ElementError::MarkerLength { length });
    }
    Ok(())
}

/// Rows `x` and `y` of a bunch.
pub(crate) fn transverse(x: &PhaseSpace) -> Transverse {
    Transverse::from_fn(x.ncols(), |r, c| x[(2 * r, c)])
}

/// Exact solution of a field-free drift of length `l`.
fn exact_drift(l: f64, beta: f64, x: &PhaseSpace) -> PhaseSpace {
    let mut out = x.clone();
    for mut col in out.column_iter_mut() {
        let (px, py, pt) = (col[1], col[3], col[5]);
        let pz = (1.0 + 2.0 * pt / beta + pt * pt - px * px - py * py).sqrt();
        col[0] += px * l / pz;
        col[2] += py * l / pz;
        col[4] += (1.0 / beta - (1.0 / beta + pt) / pz) * l;
    }
    out
}

// ── ElementBuilder ─────────────────────────────────────────────────

/// Builder for [`Element`].
#[derive(Clone, Debug)]
pub struct ElementBuilder {
    kind: ElementKind,
    length: f64,
    label: Option<String>,
    beam: Option<BeamReference>,
    aperture: Option<Aperture>,
    config: ElementConfig,
}

impl ElementBuilder {
    /// Set the length (default 0).
    pub fn length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Set the label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set or clear the label.
    pub fn maybe_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Set the reference beam.
    pub fn beam(mut self, beam: BeamReference) -> Self {
        self.beam = Some(beam);
        self
    }

    /// Set or clear the reference beam.
    pub fn maybe_beam(mut self, beam: Option<BeamReference>) -> Self {
        self.beam = beam;
        self
    }

    /// Set the aperture.
    pub fn aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    /// Set or clear the aperture.
    pub fn maybe_aperture(mut self, aperture: Option<Aperture>) -> Self {
        self.aperture = aperture;
        self
    }

    /// Replace the configuration.
    pub fn config(mut self, config: ElementConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the map order.
    pub fn order(mut self, order: MapOrder) -> Self {
        self.config.transfer_map_order = order;
        self
    }

    /// Validate parameters and compute the initial map.
    pub fn build(self) -> Result<Element, ElementError> {
        self.config.validate()?;
        check_length(&self.kind, self.length)?;
        let map = compute_map(
            &self.kind,
            self.length,
            self.beam.as_ref(),
            self.config.transfer_map_order,
        )?;
        Ok(Element {
            id: ElementId::next(),
            label: self.label,
            length: self.length,
            beam: self.beam,
            aperture: self.aperture,
            config: self.config,
            kind: self.kind,
            map,
        })
    }
}
