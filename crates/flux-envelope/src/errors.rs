//! Error types for the face-lattice engine.
//!
//! Kept as a single flat enum with hand-written `Display`/`Error` impls,
//! matching `geom4::volume::VolumeError` and `rand4::GeneratorError` rather
//! than reaching for a derive-macro crate.

use std::fmt;

/// Errors surfaced by the face-lattice engine.
#[derive(Debug)]
pub enum FluxError {
    /// Contradictory caller-supplied variable bounds (`lb > ub`).
    InvalidBounds { lb: f64, ub: f64 },
    /// A halfspace's normal and anchor point differ in dimension.
    DimensionMismatch { expected: usize, got: usize },
    /// `Face::orthogonal_vector` found no direction pointing away from all
    /// children that needed avoiding.
    NoOrthogonalDirection,
    /// A least-squares solve's residual exceeded the allowed tolerance.
    LeastSquaresFailure,
    /// The LP solver did not reach an optimal status within the retry budget.
    SolverUnoptimal,
    /// Attempt to insert a face that already exists or fails `valid_domain`.
    InvalidFace,
}

impl fmt::Display for FluxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxError::InvalidBounds { lb, ub } => {
                write!(f, "invalid variable bounds: lb={lb} > ub={ub}")
            }
            FluxError::DimensionMismatch { expected, got } => write!(
                f,
                "dimension mismatch: expected {expected} components, got {got}"
            ),
            FluxError::NoOrthogonalDirection => {
                write!(f, "no direction orthogonal to the face and away from its known children")
            }
            FluxError::LeastSquaresFailure => {
                write!(f, "least-squares solve residual exceeded tolerance")
            }
            FluxError::SolverUnoptimal => {
                write!(f, "LP solver did not reach optimal status within the retry budget")
            }
            FluxError::InvalidFace => write!(f, "face already present or outside its valid domain"),
        }
    }
}

impl std::error::Error for FluxError {}

pub type Result<T> = std::result::Result<T, FluxError>;

#[cfg(test)]
mod tests {
    use super::FluxError;

    #[test]
    fn display_mentions_the_offending_values() {
        let err = FluxError::InvalidBounds { lb: 2.0, ub: 1.0 };
        let msg = err.to_string();
        assert!(msg.contains("2"));
        assert!(msg.contains('1'));
    }
}
