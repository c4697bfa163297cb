//! Core types for the beamline lattice library.
//!
//! This is the leaf crate with zero internal beamline dependencies.
//! It defines phase-space and transfer-map types, the map contraction
//! algebra used to chain element maps, reference-beam and per-element
//! configuration values, element identifiers, and the error types
//! shared by every subsystem.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod beam;
pub mod compose;
pub mod config;
pub mod error;
pub mod id;
pub mod map;
pub mod parameter;

pub use beam::BeamReference;
pub use compose::{
    contract, localize, symplectic_defect, symplectic_form, symplectify, update_reference,
    ContractOptions,
};
pub use config::{ElementConfig, MapOrder, SlicingStyle, TrackingMethod};
pub use error::{ConfigError, ElementError, LabelError, MapError, SelectionError, TrackingError};
pub use id::ElementId;
pub use map::{affine, Matrix6, PhaseSpace, Tensor3, TransferMap, Transverse, TruncatedMap, Vector6};
pub use parameter::Parameter;
