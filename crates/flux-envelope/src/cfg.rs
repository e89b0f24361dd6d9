//! Tolerances and limits for the face-lattice engine.
//!
//! Policy
//! - Most callers should only ever touch `Config::eps` and `Config::max_value`;
//!   the rest are fixed constants to avoid tolerance juggling during normal
//!   development, mirroring `geom4::cfg`'s policy of rarely-adjusted defaults.

/// Default feasibility/equality tolerance, also the default `Config::eps`.
pub const DEFAULT_EPS: f64 = 1e-4;
/// Default clamp applied to otherwise-unbounded target variables.
pub const DEFAULT_MAX_VALUE: f64 = 1000.0;
/// Default cap on `LatticeGraph::solve` iterations.
pub const DEFAULT_MAX_ITER: usize = 1000;
/// Retry budget for `Searcher::get_solution` when the LP reports infeasible.
pub const PERTURB_RETRIES: u32 = 10;
/// Perturbation multiplier used by `Searcher::bounding_halfspace`.
pub const SENSITIVITY_MULTIPLIER: f64 = 10.0;

/// Tunable parameters for one `flux_envelope_analysis` run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Tolerance for numeric equality of points, normals, and RHSes.
    pub eps: f64,
    /// Symmetric clamp applied to unbounded target variables.
    pub max_value: f64,
    /// Iteration cap passed to `LatticeGraph::solve`.
    pub max_iter: usize,
    /// Keep iterating past the first completeness signal.
    pub exhaust: bool,
}

impl Config {
    /// Decimal rounding precision derived from `eps`, used for the halfspace
    /// rounded key (`dec = floor(-log10(eps))`).
    pub fn dec(&self) -> i32 {
        (-self.eps.log10()).floor() as i32
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            max_value: DEFAULT_MAX_VALUE,
            max_iter: DEFAULT_MAX_ITER,
            exhaust: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn dec_matches_eps_order_of_magnitude() {
        let cfg = Config {
            eps: 1e-4,
            ..Config::default()
        };
        assert_eq!(cfg.dec(), 4);
    }

    #[test]
    fn default_config_is_sane() {
        let cfg = Config::default();
        assert!(cfg.eps > 0.0);
        assert!(cfg.max_value > 0.0);
        assert!(cfg.max_iter > 0);
    }
}
