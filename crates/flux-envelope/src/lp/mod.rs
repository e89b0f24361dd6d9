//! The external LP-solver interface and a first-party reference backend.
//!
//! `LpModel` is the narrow seam the face-lattice engine uses to drive an
//! underlying linear program. Callers may plug in any solver that can
//! implement it; [`dense_simplex::DenseSimplex`] is a from-scratch,
//! bounded-variable two-phase simplex shipped so the engine is runnable and
//! testable without vendoring an external solver crate.

pub mod dense_simplex;
mod model;

pub use dense_simplex::DenseSimplex;
pub use model::{ConstraintId, LpModel, Sense, Status, VarId};
