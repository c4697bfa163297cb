//! Beamline: accelerator lattice modelling with particle tracking and
//! transfer-map composition.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the beamline sub-crates. For most users, adding `beamline` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use beamline::prelude::*;
//!
//! let beam = BeamReference::new(0.6, 1.25).unwrap();
//! let qf = Element::quadrupole(0.8, 0.5).beam(beam).label("qf").build().unwrap();
//! let d = Element::drift(2.0).beam(beam).label("d").build().unwrap();
//! let qd = Element::quadrupole(-0.8, 0.5).beam(beam).label("qd").build().unwrap();
//! let cell = Segment::new(vec![qf.into(), d.clone().into(), qd.into(), d.into()]);
//!
//! // Track 10 particles linearly and keep the coordinates after each quadrupole.
//! let x = PhaseSpace::from_element(10, 1e-4);
//! let out = cell
//!     .forward(
//!         &x,
//!         &TrackOptions {
//!             observe: Observe::Selected(vec![ElementType::Quadrupole.into()]),
//!             ..TrackOptions::new(TrackingMethod::Linear)
//!         },
//!     )
//!     .unwrap();
//! assert_eq!(out.history.unwrap().len(), 2);
//!
//! // One-cell transfer map.
//! let map = cell.reduce_transfer_map(&MapOptions::default()).unwrap();
//! assert!(symplectic_defect(&map.r.unwrap()) < 1e-12);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `beamline-core` | Map types, contraction, configuration, errors |
//! | [`lattice`] | `beamline-lattice` | Elements, segments, tracking, map composition, registry |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Map types, contraction algebra, configuration and errors
/// (`beamline-core`).
pub use beamline_core as types;

/// Lattice elements and segments (`beamline-lattice`).
///
/// [`lattice::Segment`] is the main entry point; elements are built
/// with [`lattice::Element`] builders or from MAD-X commands via
/// [`lattice::registry`].
pub use beamline_lattice as lattice;

/// Common imports for typical beamline usage.
///
/// ```rust
/// use beamline::prelude::*;
/// ```
pub mod prelude {
    // Core values
    pub use beamline_core::{
        symplectic_defect, BeamReference, ElementConfig, MapOrder, Matrix6, Parameter, PhaseSpace,
        SlicingStyle, Tensor3, TrackingMethod, TransferMap, TruncatedMap, Vector6,
    };

    // Errors
    pub use beamline_core::{
        ConfigError, ElementError, LabelError, MapError, SelectionError, TrackingError,
    };

    // Lattice
    pub use beamline_lattice::{
        AlignmentError, Aperture, CompoundElement, Criteria, Element, ElementType,
        LatticeElement, Segment, Selection, Selector,
    };

    // Tracking and maps
    pub use beamline_lattice::{
        LossRecord, MapMethod, MapOptions, Method, Observe, RecLoss, TrackOptions, TrackOutput,
        TransferMapsOptions,
    };
}
