//! Element configuration, validation, and option enums.
//!
//! [`ElementConfig`] replaces a process-wide settings switch: every
//! element owns a copy, and elements derived from it (thin variants,
//! slice drifts, replacement drifts) inherit it.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ── MapOrder ───────────────────────────────────────────────────────

/// Expansion order of a transfer map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapOrder {
    /// `d` and `R` only.
    First,
    /// `d`, `R` and `T`.
    #[default]
    Second,
}

impl MapOrder {
    /// The order as an integer (1 or 2).
    pub fn as_usize(self) -> usize {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl fmt::Display for MapOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_usize())
    }
}

impl FromStr for MapOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::First),
            "2" => Ok(Self::Second),
            other => Err(ConfigError::UnknownMapOrder {
                order: other.to_string(),
            }),
        }
    }
}

// ── SlicingStyle ───────────────────────────────────────────────────

/// Placement of thin kicks when slicing a thick element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SlicingStyle {
    /// TEAPOT spacing.
    #[default]
    Teapot,
    /// Equal slices with kicks at the slice centres.
    Simple,
    /// Kicks at both element edges.
    Edge,
}

impl SlicingStyle {
    /// Fractional lengths `(delta, Delta)` of the boundary and interior
    /// drifts for `n` slices, satisfying `2 delta + (n - 1) Delta == 1`.
    ///
    /// `n == 1` places a single kick at the centre. `n` must be at least 1.
    pub fn drift_fractions(self, n: usize) -> (f64, f64) {
        if n <= 1 {
            return (0.5, 0.0);
        }
        let nf = n as f64;
        match self {
            Self::Edge => (0.0, 1.0 / (nf - 1.0)),
            Self::Simple => (0.5 / nf, 1.0 / nf),
            Self::Teapot => (0.5 / (nf + 1.0), nf / (nf * nf - 1.0)),
        }
    }

    /// Lower-case name of the style.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teapot => "teapot",
            Self::Simple => "simple",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for SlicingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlicingStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "teapot" => Ok(Self::Teapot),
            "simple" => Ok(Self::Simple),
            "edge" => Ok(Self::Edge),
            _ => Err(ConfigError::UnknownSlicingStyle {
                style: s.to_string(),
            }),
        }
    }
}

// ── TrackingMethod ─────────────────────────────────────────────────

/// Built-in ways of pushing particles through an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackingMethod {
    /// Closed-form exact solution (drifts and markers only).
    Exact,
    /// `d + R x`.
    Linear,
    /// `d + R x + T(x, x)`.
    SecondOrder,
}

impl TrackingMethod {
    /// Method name as used in method strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Linear => "linear",
            Self::SecondOrder => "second_order",
        }
    }
}

impl fmt::Display for TrackingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "linear" => Ok(Self::Linear),
            "second_order" => Ok(Self::SecondOrder),
            other => Err(ConfigError::UnknownTrackingMethod {
                method: other.to_string(),
            }),
        }
    }
}

// ── ElementConfig ──────────────────────────────────────────────────

/// Per-element settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementConfig {
    /// Order up to which the element computes its map. Default: second.
    pub transfer_map_order: MapOrder,
    /// Elements shorter than this are already thin and are never
    /// sliced. Default: 1e-6.
    pub makethin_min_length: f64,
    /// Style used when slicing without an explicit style. Default: teapot.
    pub slicing_style: SlicingStyle,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            transfer_map_order: MapOrder::Second,
            makethin_min_length: 1e-6,
            slicing_style: SlicingStyle::Teapot,
        }
    }
}

impl ElementConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = self.makethin_min_length;
        if !v.is_finite() || v < 0.0 {
            return Err(ConfigError::InvalidMinLength { value: v });
        }
        Ok(())
    }

    /// Copy with a different map order.
    pub fn with_order(mut self, order: MapOrder) -> Self {
        self.transfer_map_order = order;
        self
    }
}
