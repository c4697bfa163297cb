//! Element selection.
//!
//! A [`Selector`] picks elements out of a [`Segment`](crate::Segment)
//! by position, label, label pattern, type, or instance identity.
//! [`Criteria`] attaches a value to an ordered list of selectors and
//! returns the value of the first rule matching an element; it drives
//! per-element slice counts, slicing styles and tracking methods.

use std::fmt;

use beamline_core::{ElementId, SelectionError};
use regex::Regex;

use crate::kind::ElementType;
use crate::lattice::LatticeElement;

/// How to pick elements.
#[derive(Clone, Debug)]
pub enum Selector {
    /// Position; negative values count from the end.
    Index(isize),
    /// Exact label, or a glob when it contains `*`.
    Label(String),
    /// Regular expression matched at the start of the label.
    Pattern(Regex),
    /// Element type, including subtypes.
    Kind(ElementType),
    /// A specific element instance.
    Instance(ElementId),
    /// The n-th (zero-based) match of the inner selector.
    Occurrence(Box<Selector>, usize),
    /// Sub-segment between two bounds.
    ///
    /// Positional bounds are half open; other bounds resolve to a
    /// single element and include the stop element.
    Range(Option<Box<Selector>>, Option<Box<Selector>>),
}

impl Selector {
    /// Glob or exact label.
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    /// Compile a label pattern.
    pub fn pattern(pattern: &str) -> Result<Self, SelectionError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| SelectionError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// The `n`-th match of `self`.
    pub fn nth(self, n: usize) -> Self {
        Self::Occurrence(Box::new(self), n)
    }

    /// Sub-segment from `start` to `stop`.
    pub fn range(start: Option<Selector>, stop: Option<Selector>) -> Self {
        Self::Range(start.map(Box::new), stop.map(Box::new))
    }

    /// Whether the label selector is a glob.
    pub fn is_glob(&self) -> bool {
        matches!(self, Self::Label(l) if l.contains('*'))
    }

    /// Whether `element` matches.
    ///
    /// Positional, occurrence and range selectors describe positions
    /// rather than properties and fail with
    /// [`SelectionError::IllegalMatcher`].
    pub fn matches(&self, element: &LatticeElement) -> Result<bool, SelectionError> {
        match self {
            Self::Label(label) if label.contains('*') => {
                let re = glob(label)?;
                Ok(element.label().is_some_and(|l| re.is_match(l)))
            }
            Self::Label(label) => Ok(element.label() == Some(label.as_str())),
            Self::Pattern(re) => Ok(element
                .label()
                .and_then(|l| re.find(l))
                .is_some_and(|m| m.start() == 0)),
            Self::Kind(ty) => Ok(element.is_instance(*ty)),
            Self::Instance(id) => Ok(element.id() == *id),
            Self::Index(_) | Self::Occurrence(..) | Self::Range(..) => {
                Err(SelectionError::IllegalMatcher {
                    selector: self.to_string(),
                })
            }
        }
    }
}

/// `*` matches any run of characters, everything else is literal.
fn glob(label: &str) -> Result<Regex, SelectionError> {
    let body = regex::escape(label).replace(r"\*", ".*?");
    let pattern = format!("^{body}$");
    Regex::new(&pattern).map_err(|e| SelectionError::InvalidPattern {
        pattern,
        reason: e.to_string(),
    })
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Label(l) => write!(f, "'{l}'"),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
            Self::Kind(ty) => write!(f, "{ty}"),
            Self::Instance(id) => write!(f, "{id}"),
            Self::Occurrence(s, n) => write!(f, "{s}#{n}"),
            Self::Range(start, stop) => {
                if let Some(s) = start {
                    write!(f, "{s}")?;
                }
                f.write_str("..")?;
                if let Some(s) = stop {
                    write!(f, "{s}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Selector {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for Selector {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

impl From<isize> for Selector {
    fn from(index: isize) -> Self {
        Self::Index(index)
    }
}

impl From<ElementType> for Selector {
    fn from(ty: ElementType) -> Self {
        Self::Kind(ty)
    }
}

impl From<ElementId> for Selector {
    fn from(id: ElementId) -> Self {
        Self::Instance(id)
    }
}

impl From<Regex> for Selector {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

// ── Criteria ───────────────────────────────────────────────────────

/// Ordered `(selector, value)` rules; the first match wins and a
/// `None` selector matches everything.
#[derive(Clone, Debug)]
pub struct Criteria<T> {
    rules: Vec<(Option<Selector>, T)>,
}

impl<T> Default for Criteria<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> Criteria<T> {
    /// No rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single catch-all rule.
    pub fn uniform(value: T) -> Self {
        Self {
            rules: vec![(None, value)],
        }
    }

    /// Append a rule for elements matching `selector`.
    pub fn rule(mut self, selector: impl Into<Selector>, value: T) -> Self {
        self.rules.push((Some(selector.into()), value));
        self
    }

    /// Append a catch-all rule.
    pub fn default_value(mut self, value: T) -> Self {
        self.rules.push((None, value));
        self
    }

    /// The rules in order.
    pub fn rules(&self) -> &[(Option<Selector>, T)] {
        &self.rules
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Value of the first rule matching `element`.
    pub fn find(&self, element: &LatticeElement) -> Result<Option<&T>, SelectionError> {
        for (selector, value) in &self.rules {
            match selector {
                None => return Ok(Some(value)),
                Some(s) if s.matches(element)? => return Ok(Some(value)),
                Some(_) => {}
            }
        }
        Ok(None)
    }
}

impl<T> From<T> for Criteria<T> {
    fn from(value: T) -> Self {
        Self::uniform(value)
    }
}
