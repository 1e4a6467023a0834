//! # flow-gates
//!
//! In-memory model of a flow cytometry gating strategy, as reconstructed from
//! an analysis workspace.
//!
//! ## Overview
//!
//! - **Gates**: range, rectangle, polygon, ellipsoid and quadrant geometries in
//!   raw data coordinates, plus boolean and reference gates that combine or
//!   reuse other populations
//! - **Population Trees**: an arena-backed tree of named populations per sample,
//!   with path lookup and second-pass resolution of gate references
//! - **Links**: which populations are named by boolean/reference gates
//! - **Transformations**: channel scale definitions (linear, log, logicle,
//!   biexponential, arcsinh, hyperlog), interned by key
//! - **Compensation**: spillover matrices over named detectors
//!
//! Nothing here evaluates gates against event data; the crate only describes
//! gating strategies and checks that they are well formed.
//!
//! ## Quick Start
//!
//! ```rust
//! use flow_gates::*;
//!
//! # fn example() -> Result<(), GateError> {
//! let mut tree = PopulationTree::new();
//!
//! let lymph_gate = Gate::geometric(create_polygon_geometry(
//!     vec![(100.0, 200.0), (300.0, 200.0), (300.0, 400.0), (100.0, 400.0)],
//!     "FSC-A",
//!     "SSC-A",
//! )?);
//! let lymph = tree.add_child(NodeId::ROOT, "Lymphocytes", Some(12000), lymph_gate)?;
//!
//! let cd4 = tree.add_child(
//!     lymph,
//!     "CD4+",
//!     Some(5100),
//!     Gate::geometric(create_range_geometry(vec![("CD4", Some(1000.0), None)])?),
//! )?;
//! let not_cd4 = tree.add_child(
//!     lymph,
//!     "CD4-",
//!     None,
//!     Gate::boolean(BooleanOperation::Not, vec![GateReference::new("CD4+")]),
//! )?;
//!
//! tree.resolve_references()?;
//! assert_eq!(tree.get_linkers(cd4), vec![not_cd4]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Error Handling
//!
//! The library uses [`GateError`] for all error conditions. Most operations return
//! [`Result<T, GateError>`](GateResult).

pub mod compensation;
pub mod ellipse;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod linking;
pub mod polygon;
pub mod quadrant;
pub mod rectangle;
pub mod traits;
pub mod transforms;
pub mod types;


/// Error types for gate operations
pub use error::{GateError, Result as GateResult};

/// Compensation matrices
pub use compensation::Compensation;

/// Geometry construction helpers
pub use geometry::{create_ellipse_from_axis_points, create_polygon_geometry, create_range_geometry};

/// Population trees
pub use hierarchy::{NodeId, PopulationNode, PopulationTree};

/// Gate linking system
pub use linking::GateLinks;

/// Concrete geometries
pub use ellipse::EllipsoidGateGeometry;
pub use polygon::PolygonGateGeometry;
pub use quadrant::{QuadrantDivider, QuadrantGateGeometry, QuadrantPosition, QuadrantRegion};
pub use rectangle::{RangeDimension, RangeGateGeometry};

/// Channel transformations
pub use transforms::{Transformation, TransformationKind, TransformationSet};

/// Core gate types and structures
pub use types::{BooleanOperation, Dimension, Gate, GateGeometry, GateKind, GateReference, Vertex};

/// Gate geometry traits
pub use traits::{GateGeometryOps, GateValidation};
