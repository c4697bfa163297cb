//! Particle tracking through a segment.
//!
//! [`Segment::forward`] moves a bunch through every element in turn.
//! The tracking method is chosen per element from a [`Criteria`] list;
//! with aperture checks enabled, particles outside an element's
//! aperture at its entrance are dropped before the element acts.

use std::fmt;
use std::sync::Arc;

use beamline_core::{PhaseSpace, TrackingError, TrackingMethod};
use indexmap::IndexMap;

use crate::lattice::LatticeElement;
use crate::segment::Segment;
use crate::selector::{Criteria, Selector};

/// User-supplied tracking function. Receives the whole entry.
pub type CustomMethod =
    Arc<dyn Fn(&LatticeElement, &PhaseSpace) -> Result<PhaseSpace, TrackingError> + Send + Sync>;

/// Transform applied to per-particle losses before they are recorded.
pub type LossFunc = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// How to move particles through one element.
#[derive(Clone)]
pub enum Method {
    /// A built-in method.
    Named(TrackingMethod),
    /// A user function.
    Custom(CustomMethod),
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(m) => f.debug_tuple("Named").field(m).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<TrackingMethod> for Method {
    fn from(m: TrackingMethod) -> Self {
        Self::Named(m)
    }
}

/// Which elements record post-element coordinates.
#[derive(Clone, Debug, Default)]
pub enum Observe {
    /// None.
    #[default]
    None,
    /// Every element.
    All,
    /// Elements matching any of the selectors.
    Selected(Vec<Selector>),
}

/// Which elements record particle loss.
#[derive(Clone, Debug, Default)]
pub enum RecLoss {
    /// None.
    #[default]
    None,
    /// Every element, summed into one value.
    Sum,
    /// Every element, recorded per element.
    All,
    /// Elements matching any of the selectors, recorded per element.
    Selected(Vec<Selector>),
}

/// Recorded particle loss.
#[derive(Clone, Debug, PartialEq)]
pub enum LossRecord {
    /// Total over all elements and particles.
    Sum(f64),
    /// Losses keyed by element label, in beam order.
    PerElement(IndexMap<String, Vec<f64>>),
}

/// Options for [`Segment::forward`].
#[derive(Clone)]
pub struct TrackOptions {
    /// Tracking method per element.
    pub method: Criteria<Method>,
    /// Drop particles outside element apertures.
    pub aperture: bool,
    /// Always track drift-family elements exactly.
    pub exact_drift: bool,
    /// Observation points.
    pub observe: Observe,
    /// Loss recording; anything but [`RecLoss::None`] enables aperture
    /// checks.
    pub recloss: RecLoss,
    /// Applied to each element's losses before recording; identity if
    /// unset.
    pub loss_func: Option<LossFunc>,
}

impl TrackOptions {
    /// Track everything with one method, no apertures, no records.
    pub fn new(method: impl Into<Method>) -> Self {
        Self {
            method: Criteria::uniform(method.into()),
            aperture: false,
            exact_drift: true,
            observe: Observe::None,
            recloss: RecLoss::None,
            loss_func: None,
        }
    }

    /// Track with per-element methods.
    pub fn with_criteria(method: Criteria<Method>) -> Self {
        Self {
            method,
            ..Self::new(TrackingMethod::Linear)
        }
    }
}

impl fmt::Debug for TrackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackOptions")
            .field("method", &self.method)
            .field("aperture", &self.aperture)
            .field("exact_drift", &self.exact_drift)
            .field("observe", &self.observe)
            .field("recloss", &self.recloss)
            .field("loss_func", &self.loss_func.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Result of [`Segment::forward`].
#[derive(Clone, Debug)]
pub struct TrackOutput {
    /// Surviving particles at the segment exit.
    pub x: PhaseSpace,
    /// Coordinates after each observed element, keyed by label.
    pub history: Option<IndexMap<String, PhaseSpace>>,
    /// Recorded losses.
    pub loss: Option<LossRecord>,
}

/// Choice for one element.
enum Step<'a> {
    Named(TrackingMethod),
    Custom(&'a CustomMethod),
    Nested(Criteria<Method>),
}

fn any_match(selectors: &[Selector], element: &LatticeElement) -> Result<bool, TrackingError> {
    for s in selectors {
        if s.matches(element)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn nested(element: &LatticeElement) -> Option<&Segment> {
    match element {
        LatticeElement::Segment(s) => Some(s),
        LatticeElement::Thin(t) => Some(t.slices()),
        LatticeElement::Compound(c) => Some(c.parts()),
        LatticeElement::Element(_) | LatticeElement::Alignment(_) => None,
    }
}

impl Segment {
    /// Track `x` through the segment.
    pub fn forward(&self, x: &PhaseSpace, opts: &TrackOptions) -> Result<TrackOutput, TrackingError> {
        let aperture = opts.aperture || !matches!(opts.recloss, RecLoss::None);
        let mut x = x.clone();
        let mut history = (!matches!(opts.observe, Observe::None)).then(IndexMap::new);
        let mut per_element = IndexMap::new();
        let mut total = 0.0;

        for element in self.iter() {
            if aperture {
                let loss = element.loss(&x);
                let record = match &opts.recloss {
                    RecLoss::None => false,
                    RecLoss::Sum | RecLoss::All => true,
                    RecLoss::Selected(selectors) => any_match(selectors, element)?,
                };
                if record {
                    let value = match &opts.loss_func {
                        Some(f) => f(&loss),
                        None => loss.clone(),
                    };
                    if matches!(opts.recloss, RecLoss::Sum) {
                        total += value.iter().sum::<f64>();
                    } else {
                        per_element.insert(label_key(element), value);
                    }
                }
                let keep: Vec<usize> = (0..loss.len()).filter(|&i| loss[i] == 0.0).collect();
                if keep.len() < x.ncols() {
                    x = x.select_columns(keep.iter());
                }
            }
            if x.ncols() > 0 {
                x = step(element, &x, opts, aperture)?;
            }
            let observed = match &opts.observe {
                Observe::None => false,
                Observe::All => true,
                Observe::Selected(selectors) => any_match(selectors, element)?,
            };
            if let (true, Some(h)) = (observed, history.as_mut()) {
                h.insert(label_key(element), x.clone());
            }
        }

        let loss = match opts.recloss {
            RecLoss::None => None,
            RecLoss::Sum => Some(LossRecord::Sum(total)),
            RecLoss::All | RecLoss::Selected(_) => Some(LossRecord::PerElement(per_element)),
        };
        Ok(TrackOutput { x, history, loss })
    }

    /// Linear tracking through every element.
    pub fn linear(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        Ok(self.forward(x, &TrackOptions::new(TrackingMethod::Linear))?.x)
    }

    /// Second-order tracking through every element.
    pub fn second_order(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        Ok(self
            .forward(x, &TrackOptions::new(TrackingMethod::SecondOrder))?
            .x)
    }

    /// Exact tracking through every element.
    pub fn exact(&self, x: &PhaseSpace) -> Result<PhaseSpace, TrackingError> {
        Ok(self.forward(x, &TrackOptions::new(TrackingMethod::Exact))?.x)
    }
}

fn step(
    element: &LatticeElement,
    x: &PhaseSpace,
    opts: &TrackOptions,
    aperture: bool,
) -> Result<PhaseSpace, TrackingError> {
    match choose(element, opts)? {
        Step::Named(m) => element.track(m, x),
        Step::Custom(f) => f(element, x),
        Step::Nested(rules) => match nested(element) {
            Some(inner) => forward_nested(inner, x, opts, aperture, rules),
            None => Err(TrackingError::NoMethod {
                label: element.label().map(str::to_owned),
            }),
        },
    }
}

fn choose<'a>(element: &LatticeElement, opts: &'a TrackOptions) -> Result<Step<'a>, TrackingError> {
    if opts.exact_drift && element.is_drift() {
        return Ok(Step::Named(TrackingMethod::Exact));
    }
    match opts.method.find(element)? {
        Some(Method::Named(m)) if nested(element).is_some() => {
            Ok(Step::Nested(Criteria::uniform(Method::Named(*m))))
        }
        Some(Method::Named(m)) => Ok(Step::Named(*m)),
        Some(Method::Custom(f)) => Ok(Step::Custom(f)),
        None if nested(element).is_some() => Ok(Step::Nested(opts.method.clone())),
        None => Err(TrackingError::NoMethod {
            label: element.label().map(str::to_owned),
        }),
    }
}

fn forward_nested(
    inner: &Segment,
    x: &PhaseSpace,
    opts: &TrackOptions,
    aperture: bool,
    method: Criteria<Method>,
) -> Result<PhaseSpace, TrackingError> {
    let inner_opts = TrackOptions {
        method,
        aperture,
        exact_drift: opts.exact_drift,
        observe: Observe::None,
        recloss: RecLoss::None,
        loss_func: None,
    };
    Ok(inner.forward(x, &inner_opts)?.x)
}

fn label_key(element: &LatticeElement) -> String {
    element.label().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::Aperture;
    use crate::element::Element;
    use crate::kind::ElementType;
    use beamline_core::BeamReference;

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn bunch() -> PhaseSpace {
        PhaseSpace::from_fn(4, |i, j| {
            if i == 0 {
                1e-3 * j as f64
            } else {
                0.0
            }
        })
    }

    fn lattice() -> Segment {
        Segment::new(vec![
            Element::quadrupole(0.5, 0.4)
                .beam(beam())
                .label("q")
                .aperture(Aperture::circle(2.5e-3))
                .build()
                .unwrap()
                .into(),
            Element::drift(1.0).beam(beam()).label("d").build().unwrap().into(),
        ])
    }

    #[test]
    fn quadrupole_needs_a_method() {
        let opts = TrackOptions::with_criteria(Criteria::new());
        let err = lattice().forward(&bunch(), &opts).unwrap_err();
        assert_eq!(err, TrackingError::NoMethod { label: Some("q".into()) });
    }

    #[test]
    fn drifts_default_to_exact() {
        let opts = TrackOptions::with_criteria(
            Criteria::new().rule(ElementType::Quadrupole, Method::Named(TrackingMethod::Linear)),
        );
        assert!(lattice().forward(&bunch(), &opts).is_ok());
    }

    #[test]
    fn aperture_drops_particles() {
        let mut opts = TrackOptions::new(TrackingMethod::Linear);
        opts.aperture = true;
        let out = lattice().forward(&bunch(), &opts).unwrap();
        assert_eq!(out.x.ncols(), 3);
        let out = lattice().linear(&bunch()).unwrap();
        assert_eq!(out.ncols(), 4);
    }

    #[test]
    fn recloss_enables_aperture() {
        let mut opts = TrackOptions::new(TrackingMethod::Linear);
        opts.recloss = RecLoss::All;
        let out = lattice().forward(&bunch(), &opts).unwrap();
        assert_eq!(out.x.ncols(), 3);
        let Some(LossRecord::PerElement(losses)) = out.loss else {
            panic!("expected per-element losses");
        };
        assert_eq!(losses.keys().collect::<Vec<_>>(), vec!["q", "d"]);
        let q = &losses["q"];
        assert_eq!(q.len(), 4);
        assert!(q[3] > 0.0);
        assert_eq!(losses["d"].len(), 3);
    }

    #[test]
    fn summed_loss_with_custom_func() {
        let mut opts = TrackOptions::new(TrackingMethod::Linear);
        opts.recloss = RecLoss::Sum;
        opts.loss_func = Some(Arc::new(|l: &[f64]| -> Vec<f64> {
            l.iter().map(|v| if *v > 0.0 { 1.0 } else { 0.0 }).collect()
        }));
        let out = lattice().forward(&bunch(), &opts).unwrap();
        assert_eq!(out.loss, Some(LossRecord::Sum(1.0)));
    }

    #[test]
    fn observe_selected() {
        let mut opts = TrackOptions::new(TrackingMethod::Linear);
        opts.observe = Observe::Selected(vec!["d".into()]);
        let out = lattice().forward(&bunch(), &opts).unwrap();
        let history = out.history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history["d"], out.x);
    }

    #[test]
    fn custom_method_receives_element() {
        let custom: CustomMethod = Arc::new(
            |e: &LatticeElement, x: &PhaseSpace| -> Result<PhaseSpace, TrackingError> {
                assert_eq!(e.label(), Some("q"));
                Ok(x * 2.0)
            },
        );
        let opts = TrackOptions::with_criteria(Criteria::new().rule("q", Method::Custom(custom)));
        let out = lattice().forward(&bunch(), &opts).unwrap();
        assert!((out.x[(0, 1)] - 2e-3).abs() < 1e-15);
    }

    #[test]
    fn nested_segments_inherit_rules() {
        let inner = lattice();
        let outer = Segment::new(vec![inner.into()]);
        let opts = TrackOptions::with_criteria(
            Criteria::new().rule("q", Method::Named(TrackingMethod::SecondOrder)),
        );
        let out = outer.forward(&bunch(), &opts).unwrap();
        let expected = lattice().second_order(&bunch()).unwrap();
        assert!((out.x - expected).amax() < 1e-15);
    }

    #[test]
    fn matched_container_method_applies_to_every_inner_element() {
        let sext: LatticeElement = Element::sextupole(5.0, 0.3)
            .beam(beam())
            .label("s")
            .build()
            .unwrap()
            .into();
        let inner = Segment::new(vec![sext]);
        let outer = Segment::new(vec![inner.clone().into()]);
        let opts = TrackOptions::with_criteria(
            Criteria::new()
                .rule("s", Method::Named(TrackingMethod::SecondOrder))
                .default_value(Method::Named(TrackingMethod::Linear)),
        );
        let mut x = PhaseSpace::zeros(1);
        x[(0, 0)] = 1e-2;
        x[(2, 0)] = 5e-3;

        let out = outer.forward(&x, &opts).unwrap();
        let linear = inner.linear(&x).unwrap();
        let second = inner.second_order(&x).unwrap();
        assert!((&out.x - &linear).amax() < 1e-18);
        assert!((&out.x - &second).amax() > 1e-6);
    }
}
