//! Error types for the beamline lattice library.
//!
//! Organized by subsystem: element construction, tracking, element
//! selection, labelling, map composition, and configuration.

use std::error::Error;
use std::fmt;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors from parsing or validating an
/// [`ElementConfig`](crate::ElementConfig) and its option strings.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A slicing style string is not one of `teapot`, `simple`, `edge`.
    UnknownSlicingStyle {
        /// The string that failed to parse.
        style: String,
    },
    /// A map order string is not `1` or `2`.
    UnknownMapOrder {
        /// The string that failed to parse.
        order: String,
    },
    /// A tracking method string is not `exact`, `linear` or `second_order`.
    UnknownTrackingMethod {
        /// The string that failed to parse.
        method: String,
    },
    /// `makethin_min_length` is negative, NaN or infinite.
    InvalidMinLength {
        /// The invalid value.
        value: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSlicingStyle { style } => {
                write!(f, "unknown slicing style '{style}'")
            }
            Self::UnknownMapOrder { order } => {
                write!(f, "unknown transfer map order '{order}' (expected 1 or 2)")
            }
            Self::UnknownTrackingMethod { method } => {
                write!(f, "unknown tracking method '{method}'")
            }
            Self::InvalidMinLength { value } => {
                write!(f, "makethin_min_length must be finite and >= 0, got {value}")
            }
        }
    }
}

impl Error for ConfigError {}

// ── ElementError ───────────────────────────────────────────────────

/// Errors from constructing or reconfiguring an element.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementError {
    /// Length is negative, NaN or infinite.
    InvalidLength {
        /// The rejected length.
        length: f64,
    },
    /// A marker was given a non-zero length.
    MarkerLength {
        /// The rejected length.
        length: f64,
    },
    /// The element kind needs a beam reference but none was supplied.
    MissingBeam {
        /// Element kind name.
        kind: &'static str,
    },
    /// Beam parameters are outside `0 < beta <= 1`, `gamma >= 1`.
    InvalidBeam {
        /// Relativistic beta.
        beta: f64,
        /// Relativistic gamma.
        gamma: f64,
    },
    /// Aperture parameters or padding have the wrong number of entries.
    ApertureShape {
        /// Number of entries the aperture kind requires.
        expected: usize,
        /// Number of entries supplied.
        got: usize,
    },
    /// A quadrupole gradient evaluates to zero while being optimized.
    ZeroGradient,
    /// A bend with non-zero angle has zero length.
    ZeroLengthBend {
        /// The bending angle.
        angle: f64,
    },
    /// The element kind cannot be sliced into thin elements.
    SlicingUnsupported {
        /// Element kind name.
        kind: &'static str,
    },
    /// Slicing requested with fewer than one slice.
    InvalidSliceCount {
        /// The rejected count.
        n: usize,
    },
    /// The registry has no element for this command name.
    UnknownCommand {
        /// The command name.
        command: String,
    },
    /// A required construction parameter is missing.
    MissingParameter {
        /// The command or element kind being built.
        command: String,
        /// The missing parameter.
        parameter: &'static str,
    },
    /// The element kind has no field error for this attribute.
    UnknownFieldError {
        /// Element kind name.
        kind: &'static str,
        /// The attribute name.
        attribute: String,
    },
    /// A bend attribute was set on a compound that is not a bend.
    NotABend {
        /// Compound kind name.
        kind: &'static str,
    },
    /// The element configuration is invalid.
    Config(ConfigError),
    /// A selector used to pick elements failed.
    Selection(SelectionError),
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { length } => {
                write!(f, "element length must be finite and >= 0, got {length}")
            }
            Self::MarkerLength { length } => {
                write!(f, "marker must have zero length, got {length}")
            }
            Self::MissingBeam { kind } => write!(f, "{kind} requires a beam reference"),
            Self::InvalidBeam { beta, gamma } => {
                write!(f, "invalid beam reference (beta={beta}, gamma={gamma})")
            }
            Self::ApertureShape { expected, got } => {
                write!(f, "aperture expects {expected} parameters, got {got}")
            }
            Self::ZeroGradient => {
                write!(f, "quadrupole gradient is zero while being optimized")
            }
            Self::ZeroLengthBend { angle } => {
                write!(f, "bend with angle {angle} must have non-zero length")
            }
            Self::SlicingUnsupported { kind } => write!(f, "{kind} cannot be sliced"),
            Self::InvalidSliceCount { n } => {
                write!(f, "number of slices must be at least 1, got {n}")
            }
            Self::UnknownCommand { command } => write!(f, "unknown element '{command}'"),
            Self::MissingParameter { command, parameter } => {
                write!(f, "{command}: missing parameter '{parameter}'")
            }
            Self::UnknownFieldError { kind, attribute } => {
                write!(f, "{kind} has no field error for '{attribute}'")
            }
            Self::NotABend { kind } => write!(f, "{kind} has no bend attributes"),
            Self::Config(e) => write!(f, "invalid element config: {e}"),
            Self::Selection(e) => write!(f, "element selection failed: {e}"),
        }
    }
}

impl Error for ElementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Selection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ElementError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SelectionError> for ElementError {
    fn from(e: SelectionError) -> Self {
        Self::Selection(e)
    }
}

// ── SelectionError ─────────────────────────────────────────────────

/// Errors from selecting elements within a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionError {
    /// No element matched the selector.
    NoMatch {
        /// Rendering of the selector.
        selector: String,
    },
    /// More than one element matched and no occurrence was given.
    Ambiguous {
        /// Rendering of the selector.
        selector: String,
        /// Number of matching elements.
        count: usize,
    },
    /// A position or occurrence index is outside the matches.
    OutOfRange {
        /// Rendering of the selector.
        selector: String,
        /// The requested index.
        index: isize,
        /// Number of candidates.
        len: usize,
    },
    /// The selector variant cannot be matched against a single element.
    IllegalMatcher {
        /// Rendering of the selector.
        selector: String,
    },
    /// A label pattern failed to compile.
    InvalidPattern {
        /// The pattern source.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { selector } => write!(f, "no element matches {selector}"),
            Self::Ambiguous { selector, count } => write!(
                f,
                "{count} elements match {selector}; specify which occurrence to use"
            ),
            Self::OutOfRange {
                selector,
                index,
                len,
            } => write!(f, "index {index} out of range for {selector} ({len} candidates)"),
            Self::IllegalMatcher { selector } => {
                write!(f, "{selector} cannot be used to match a single element")
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid label pattern '{pattern}': {reason}")
            }
        }
    }
}

impl Error for SelectionError {}

// ── LabelError ─────────────────────────────────────────────────────

/// Errors from assigning unique labels to the elements of a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelError {
    /// The disambiguated label is already in use.
    Collision {
        /// The label that could not be assigned.
        label: String,
    },
}

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collision { label } => write!(
                f,
                "cannot assign unique label '{label}': already used by another element"
            ),
        }
    }
}

impl Error for LabelError {}

// ── TrackingError ──────────────────────────────────────────────────

/// Errors from tracking particles through elements and segments.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackingError {
    /// The element has no thick analytic formula; slice it first.
    ThickElement {
        /// Element kind name.
        kind: &'static str,
        /// The element length.
        length: f64,
    },
    /// The tracking method is not implemented for this element kind.
    MethodUnavailable {
        /// Element kind name.
        kind: &'static str,
        /// The requested method.
        method: &'static str,
    },
    /// No tracking method rule matched the element.
    NoMethod {
        /// Label of the element, if any.
        label: Option<String>,
    },
    /// Second-order tracking requested but the element map is first order.
    MissingSecondOrder {
        /// Element kind name.
        kind: &'static str,
    },
    /// Evaluating a selector failed.
    Selection(SelectionError),
    /// Building a derived element failed.
    Element(ElementError),
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThickElement { kind, length } => write!(
                f,
                "thick {kind} (l={length}) has no analytic map; call makethin first"
            ),
            Self::MethodUnavailable { kind, method } => {
                write!(f, "{kind} does not support '{method}' tracking")
            }
            Self::NoMethod { label } => match label {
                Some(label) => write!(f, "no tracking method specified for '{label}'"),
                None => write!(f, "no tracking method specified for unlabelled element"),
            },
            Self::MissingSecondOrder { kind } => {
                write!(f, "{kind} has no second-order coefficients")
            }
            Self::Selection(e) => write!(f, "selection failed: {e}"),
            Self::Element(e) => write!(f, "element error: {e}"),
        }
    }
}

impl Error for TrackingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Selection(e) => Some(e),
            Self::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SelectionError> for TrackingError {
    fn from(e: SelectionError) -> Self {
        Self::Selection(e)
    }
}

impl From<ElementError> for TrackingError {
    fn from(e: ElementError) -> Self {
        Self::Element(e)
    }
}

// ── MapError ───────────────────────────────────────────────────────

/// Errors from transfer-map composition.
#[derive(Clone, Debug, PartialEq)]
pub enum MapError {
    /// The composition mode string is malformed.
    UnknownMethod {
        /// The rejected mode.
        method: String,
    },
    /// A requested coefficient index exceeds the expansion order.
    IndexAboveOrder {
        /// Largest requested index.
        index: usize,
        /// The expansion order.
        order: usize,
    },
    /// `I + R` was singular during symplectification.
    Singular,
    /// An element could not provide its transfer map.
    Tracking(TrackingError),
    /// An element could not be built or refreshed.
    Element(ElementError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod { method } => write!(
                f,
                "unknown map method '{method}' (expected accumulate, reduce or local)"
            ),
            Self::IndexAboveOrder { index, order } => {
                write!(f, "index {index} is above the map order {order}")
            }
            Self::Singular => write!(f, "matrix is singular; cannot symplectify"),
            Self::Tracking(e) => write!(f, "{e}"),
            Self::Element(e) => write!(f, "{e}"),
        }
    }
}

impl Error for MapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tracking(e) => Some(e),
            Self::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TrackingError> for MapError {
    fn from(e: TrackingError) -> Self {
        Self::Tracking(e)
    }
}

impl From<ElementError> for MapError {
    fn from(e: ElementError) -> Self {
        Self::Element(e)
    }
}
