//! Flux envelope analysis: the face lattice of a linear program's feasible
//! region, projected onto a chosen subset of variables.
//!
//! The engine is generic over the LP backend through the [`lp::LpModel`]
//! trait; [`lp::DenseSimplex`] is the first-party reference implementation.

pub mod cfg;
pub mod errors;
pub mod export;
pub mod face;
pub mod halfspace;
pub mod lattice;
pub mod linalg;
pub mod lp;
pub mod searcher;
pub mod varproxy;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use cfg::Config;
pub use errors::{FluxError, Result};
pub use lattice::LatticeGraph;
pub use lp::{ConstraintId, LpModel, Sense, Status, VarId};

/// Compute the face lattice of `model`'s feasible region projected onto
/// `variables`.
///
/// Any target variable that is unbounded, or wider than
/// `[-max_value, max_value]`, is clamped to that range before the search
/// begins. `max_iter` bounds the number of refinement steps; `eps` is the
/// feasibility/equality tolerance used throughout the search.
pub fn flux_envelope_analysis<M: LpModel>(
    model: M,
    variables: &[VarId],
    max_value: f64,
    max_iter: usize,
    eps: f64,
) -> LatticeGraph<M> {
    let cfg = Config {
        eps,
        max_value,
        max_iter,
        exhaust: false,
    };
    let mut graph = LatticeGraph::new(model, variables, cfg, 0);
    graph.solve();
    graph
}

/// Common imports for quick use at call sites.
pub mod prelude {
    pub use crate::cfg::Config;
    pub use crate::errors::{FluxError, Result};
    pub use crate::face::Face;
    pub use crate::halfspace::{Halfspace, HalfspaceId, HalfspaceTable};
    pub use crate::lattice::LatticeGraph;
    pub use crate::lp::{ConstraintId, DenseSimplex, LpModel, Sense, Status, VarId};
    pub use crate::varproxy::VarProxy;
    pub use crate::{flux_envelope_analysis, VERSION};
}
