//! Shared least-squares solve, grounded in `fea/util.py`'s `lstsq` and in
//! this crate's existing SVD-based solves (`geom2::solvers::rotation_angle`).

use nalgebra::{DMatrix, DVector};

use crate::errors::{FluxError, Result};

/// Solve `a . x = b` for `x`.
///
/// Square systems use a direct LU solve; overdetermined systems use an SVD
/// least-squares solve, rejected with `FluxError::LeastSquaresFailure` if the
/// residual sum-of-squares exceeds `rows * eps^2` (mirroring the reference
/// implementation's exact check).
pub fn lstsq(a: &DMatrix<f64>, b: &DVector<f64>, eps: f64) -> Result<DVector<f64>> {
    let rows = a.nrows();
    let cols = a.ncols();
    if rows == cols {
        let decomp = a.clone().lu();
        return decomp.solve(b).ok_or(FluxError::LeastSquaresFailure);
    }
    let svd = a.clone().svd(true, true);
    let x = svd
        .solve(b, eps.max(1e-12))
        .map_err(|_| FluxError::LeastSquaresFailure)?;
    let residual = a * &x - b;
    if residual.dot(&residual) > (rows as f64) * eps * eps {
        return Err(FluxError::LeastSquaresFailure);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn square_system_solves_exactly() {
        let a = dmatrix![1.0, 0.0; 0.0, 1.0];
        let b = dvector![3.0, 4.0];
        let x = lstsq(&a, &b, 1e-9).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-9);
        assert!((x[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn overdetermined_consistent_system_solves() {
        let a = dmatrix![1.0; 1.0; 1.0];
        let b = dvector![2.0, 2.0, 2.0];
        let x = lstsq(&a, &b, 1e-6).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn inconsistent_overdetermined_system_fails() {
        let a = dmatrix![1.0, 0.0; 0.0, 1.0; 1.0, 1.0];
        let b = dvector![0.0, 0.0, 100.0];
        assert!(lstsq(&a, &b, 1e-6).is_err());
    }
}
