//! Geometric data (points, lines, circles, arcs).

/// Geometry whose components are parameters the solver can find values for.
pub mod inputs;
/// Geometry with solved values.
pub mod outputs;

pub use inputs::*;
pub use outputs::*;
