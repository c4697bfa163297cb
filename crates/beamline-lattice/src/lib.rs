//! Lattice elements and beamline segments.
//!
//! Elements carry a cached transfer map computed from their parameters
//! and are tracked through exactly, linearly, or to second order. A
//! [`Segment`] is an ordered beamline of [`LatticeElement`]s with a
//! selection language ([`Selector`], [`Criteria`]), a tracking loop
//! ([`Segment::forward`]) with aperture checks and observation, and
//! transfer-map composition ([`Segment::compute_transfer_maps`]).
//!
//! Thick elements can be replaced by thin kicks with
//! [`Segment::makethin`]; misalignments are modelled by wrapping an
//! element in an [`AlignmentError`]. The [`registry`] builds elements
//! from MAD-X style commands.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod alignment;
pub mod aperture;
pub mod compound;
pub mod element;
mod formulas;
pub mod kind;
pub mod lattice;
pub mod registry;
pub mod segment;
pub mod selector;
pub mod thin;
pub mod tracking;
pub mod transfer;

pub use alignment::{AlignmentError, AlignmentKind};
pub use aperture::{Aperture, ApertureKind};
pub use compound::{BendBuilder, CompoundElement, CompoundKind};
pub use element::{Element, ElementBuilder};
pub use kind::{ElementKind, ElementType};
pub use lattice::LatticeElement;
pub use registry::BuildContext;
pub use segment::{Segment, Selection};
pub use selector::{Criteria, Selector};
pub use thin::ThinElement;
pub use tracking::{LossRecord, Method, Observe, RecLoss, TrackOptions, TrackOutput};
pub use transfer::{LabelledMap, MapMethod, MapOptions, TransferMapsOptions};
