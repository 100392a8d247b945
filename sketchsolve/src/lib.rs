//! Solves 2D geometric constraint systems.
//!
//! A [`Sketch`] holds points, lines, circles and arcs, plus constraints
//! between them (distances, angles, tangency...). Solving moves the free
//! parameters until every constraint holds, then reports what's left:
//! degrees of freedom, redundant constraints and conflicting ones.
//!
//! ```
//! use sketchsolve::{Config, ConstraintKind, Sketch, SolveStatus};
//!
//! let mut sketch = Sketch::new();
//! let p = sketch.add_point(0.0, 0.0, true);
//! let q = sketch.add_point(10.0, 10.0, false);
//! sketch
//!     .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(5.0))
//!     .unwrap();
//! let report = sketch.solve(&Config::default()).unwrap();
//! assert_eq!(report.status(), SolveStatus::Converged);
//! assert_eq!(report.degrees_of_freedom(), 1);
//! ```

pub use crate::constraints::ConstraintKind;
pub use crate::error::{Error, TargetProblem};
pub use crate::id::{EntityId, Id};
pub use crate::params::ParameterStore;
pub use crate::records::{PrimitiveRecord, load};
pub use crate::registry::{
    ArcRef, CircleRef, ConstraintRecord, ConstraintRef, EntityType, Entry, LineRef, PointRef,
    Primitive, Registry,
};
pub use crate::report::{Diagnostics, SolveReport, SolveStatus};
pub use crate::sketch::Sketch;
pub use crate::solver::{Algorithm, Config, Control, IterationStats};
pub use crate::warnings::{Warning, WarningContent};

/// Rank analysis, redundancy and conflict isolation.
mod analysis;
/// Each kind of constraint we support.
mod constraints;
/// Geometric data (lines, points, etc).
pub mod datatypes;
mod error;
/// IDs of entities and parameters.
mod id;
mod params;
/// Loading sketches from records, and reading them back.
mod records;
/// Primitives and constraints, keyed by entity ID.
mod registry;
mod report;
mod sketch;
/// Numeric solver using sparse matrices.
mod solver;
/// Unit tests
#[cfg(test)]
mod tests;
mod vector;
mod warnings;

const EPSILON: f64 = 1e-5;
