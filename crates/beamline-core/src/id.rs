//! Strongly-typed element identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`ElementId`] allocation.
static ELEMENT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a lattice element.
///
/// Allocated from a monotonic atomic counter via [`ElementId::next`].
/// Two separately constructed elements always have different IDs, even
/// if all their parameters are equal. Instance selectors match on this
/// ID rather than on structural equality.
///
/// Cloning an element preserves its ID, so a clone taken out of a
/// segment still selects the original slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Allocate a fresh, unique element ID. Thread-safe.
    pub fn next() -> Self {
        Self(ELEMENT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
