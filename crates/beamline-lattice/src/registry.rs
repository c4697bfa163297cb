//! Construction of elements from MAD-X style commands.
//!
//! Lattice readers hand over a lower-case command keyword with its
//! numeric attributes; [`build`] maps them onto the element builders.
//! Attributes the element does not know are reported with `warn!` and
//! otherwise ignored. Alignment-error attributes in the same record are
//! applied afterwards with [`wrap_alignment_errors`].

use beamline_core::{BeamReference, ElementConfig, ElementError, Parameter};
use indexmap::IndexMap;
use tracing::warn;

use crate::alignment::{AlignmentError, AlignmentKind};
use crate::aperture::Aperture;
use crate::compound::{BendBuilder, CompoundElement};
use crate::element::{Element, ElementBuilder};
use crate::kind::{
    Dipedge, ElementKind, ElementType, Kicker, KickerFlavor, Quadrupole, SBendBody, Sextupole,
};
use crate::lattice::LatticeElement;

/// Every command [`build`] understands.
pub const COMMANDS: &[&str] = &[
    "dipedge",
    "drift",
    "hkicker",
    "hmonitor",
    "instrument",
    "kicker",
    "marker",
    "monitor",
    "placeholder",
    "quadrupole",
    "rbend",
    "sbend",
    "sbendbody",
    "sextupole",
    "tkicker",
    "vkicker",
    "vmonitor",
];

// PTC integration steps; meaningless here.
const IGNORED: &[&str] = &["nst"];

/// Attributes shared by every element of a lattice record.
#[derive(Clone, Debug, Default)]
pub struct BuildContext {
    /// Reference beam.
    pub beam: Option<BeamReference>,
    /// Element label.
    pub label: Option<String>,
    /// Element aperture.
    pub aperture: Option<Aperture>,
    /// Element configuration.
    pub config: ElementConfig,
}

struct Params<'a> {
    command: &'a str,
    values: &'a IndexMap<String, f64>,
    used: Vec<&'static str>,
}

impl<'a> Params<'a> {
    fn new(command: &'a str, values: &'a IndexMap<String, f64>) -> Self {
        Self {
            command,
            values,
            used: Vec::new(),
        }
    }

    fn get(&mut self, name: &'static str) -> Option<f64> {
        self.used.push(name);
        self.values.get(name).copied()
    }

    fn or(&mut self, name: &'static str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    fn param(&mut self, name: &'static str) -> Parameter {
        Parameter::from(self.or(name, 0.0))
    }

    fn required(&mut self, name: &'static str) -> Result<f64, ElementError> {
        self.get(name).ok_or_else(|| ElementError::MissingParameter {
            command: self.command.to_string(),
            parameter: name,
        })
    }

    fn warn_unused(&self) {
        for (name, value) in self.values {
            if !self.used.contains(&name.as_str()) && !IGNORED.contains(&name.as_str()) {
                warn!(
                    command = self.command,
                    parameter = %name,
                    value,
                    "unknown parameter ignored"
                );
            }
        }
    }
}

/// Build the element for `command` from its attributes.
pub fn build(
    command: &str,
    params: &IndexMap<String, f64>,
    ctx: BuildContext,
) -> Result<LatticeElement, ElementError> {
    let mut p = Params::new(command, params);
    let element: LatticeElement = match command {
        "sbend" | "rbend" => {
            let angle = p.required("angle")?;
            let l = p.required("l")?;
            let builder = if command == "sbend" {
                CompoundElement::sbend(angle, l)
            } else {
                CompoundElement::rbend(angle, l)
            };
            bend(builder, &mut p, ctx)?.into()
        }
        _ => {
            let builder = simple(command, &mut p)?;
            builder
                .maybe_label(ctx.label)
                .maybe_beam(ctx.beam)
                .maybe_aperture(ctx.aperture)
                .config(ctx.config)
                .build()?
                .into()
        }
    };
    p.warn_unused();
    Ok(element)
}

fn simple(command: &str, p: &mut Params<'_>) -> Result<ElementBuilder, ElementError> {
    let builder = match command {
        "marker" => Element::marker(),
        "drift" => Element::drift(p.required("l")?),
        "instrument" => Element::instrument(p.required("l")?),
        "placeholder" => Element::placeholder(p.required("l")?),
        "monitor" => Element::monitor(p.required("l")?),
        "hmonitor" => Element::hmonitor(p.required("l")?),
        "vmonitor" => Element::vmonitor(p.required("l")?),
        "kicker" | "tkicker" => {
            let flavor = if command == "kicker" {
                KickerFlavor::Combined
            } else {
                KickerFlavor::Transverse
            };
            kicker(flavor, p.param("hkick"), p.param("vkick"), p)
        }
        "hkicker" => kicker(KickerFlavor::Horizontal, p.param("kick"), Parameter::default(), p),
        "vkicker" => kicker(KickerFlavor::Vertical, Parameter::default(), p.param("kick"), p),
        "quadrupole" => Element::builder(ElementKind::Quadrupole(Quadrupole {
            k1: p.required("k1")?.into(),
            dk1: p.param("dk1"),
        }))
        .length(p.required("l")?),
        "sextupole" => Element::builder(ElementKind::Sextupole(Sextupole {
            k2: p.required("k2")?.into(),
            dk2: p.param("dk2"),
        }))
        .length(p.required("l")?),
        "sbendbody" => Element::builder(ElementKind::SBendBody(SBendBody {
            angle: p.required("angle")?.into(),
            dk0: p.param("dk0"),
        }))
        .length(p.required("l")?),
        "dipedge" => Element::dipedge(Dipedge {
            h: p.required("h")?,
            e1: p.required("e1")?,
            fint: p.required("fint")?,
            hgap: p.required("hgap")?,
            he: p.or("he", 0.0),
            entrance: true,
        }),
        other => {
            return Err(ElementError::UnknownCommand {
                command: other.to_string(),
            })
        }
    };
    Ok(builder)
}

fn kicker(flavor: KickerFlavor, hkick: Parameter, vkick: Parameter, p: &mut Params<'_>) -> ElementBuilder {
    Element::builder(ElementKind::Kicker(Kicker {
        flavor,
        hkick,
        vkick,
        dkh: p.param("dkh"),
        dkv: p.param("dkv"),
    }))
    .length(p.or("l", 0.0))
}

fn bend(
    builder: BendBuilder,
    p: &mut Params<'_>,
    ctx: BuildContext,
) -> Result<CompoundElement, ElementError> {
    let mut builder = builder
        .e1(p.or("e1", 0.0))
        .e2(p.or("e2", 0.0))
        .fint(p.or("fint", 0.0))
        .hgap(p.or("hgap", 0.0))
        .h1(p.or("h1", 0.0))
        .h2(p.or("h2", 0.0))
        .dk0(p.param("dk0"));
    if let Some(fintx) = p.get("fintx") {
        builder = builder.fintx(fintx);
    }
    builder
        .maybe_label(ctx.label)
        .maybe_beam(ctx.beam)
        .maybe_aperture(ctx.aperture)
        .config(ctx.config)
        .build()
}

// ── Alignment errors ───────────────────────────────────────────────

/// Alignment wrapper types with their trigger attributes, sorted by
/// type name.
pub fn alignment_kinds() -> Vec<(ElementType, &'static [&'static str])> {
    let mut kinds: Vec<_> = [
        ElementType::Offset,
        ElementType::LongitudinalRoll,
        ElementType::Tilt,
        ElementType::BPMError,
    ]
    .into_iter()
    .map(|ty| (ty, AlignmentKind::triggers(ty)))
    .collect();
    kinds.sort_by_key(|(ty, _)| ty.to_string());
    kinds
}

/// Wrap `element` in every alignment error whose triggers carry a
/// non-zero value, in [`alignment_kinds`] order. The first wrapper
/// applied ends up innermost.
pub fn wrap_alignment_errors(
    element: impl Into<LatticeElement>,
    errors: &IndexMap<String, f64>,
) -> LatticeElement {
    let mut current = element.into();
    for (ty, triggers) in alignment_kinds() {
        let values: Vec<f64> = triggers
            .iter()
            .map(|t| errors.get(*t).copied().unwrap_or(0.0))
            .collect();
        if values.iter().all(|v| *v == 0.0) {
            continue;
        }
        if let Some(kind) = AlignmentKind::from_triggers(ty, &values) {
            current = AlignmentError::new(kind, current).into();
        }
    }
    current
}
