//! A single oriented hyperplane bounding the lattice.
//!
//! Grounded in `fea/Halfspace.py` and generalized from this crate's fixed
//! `Hs4 { n: Vector4<f64>, c: f64 }` to arbitrary dimension via
//! `nalgebra::DVector`.

use std::collections::BTreeSet;

use nalgebra::DVector;

use crate::errors::{FluxError, Result};

/// Identifier for a `Halfspace` inside a `HalfspaceTable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HalfspaceId(pub usize);

/// An oriented hyperplane `n . x = d`, `n` unit-length, with tolerance `eps`.
///
/// `real = false` marks a *pseudo*-halfspace: a placeholder inserted when LP
/// degeneracy prevented recovering a genuine bound. Its `required` set names
/// the other halfspaces that must be present for it to remain meaningful.
#[derive(Clone, Debug)]
pub struct Halfspace {
    n: DVector<f64>,
    p: DVector<f64>,
    d: f64,
    eps: f64,
    real: bool,
    required: BTreeSet<HalfspaceId>,
}

impl Halfspace {
    /// Construct a real halfspace through anchor point `p` with normal `n`
    /// (auto-normalized). Fails if `n` and `p` differ in dimension or `n` is
    /// (numerically) the zero vector.
    pub fn real(n: DVector<f64>, p: DVector<f64>, eps: f64) -> Result<Self> {
        Self::new(n, p, eps, true, BTreeSet::new())
    }

    /// Construct a pseudo-halfspace: topological only, not a genuine bound.
    pub fn pseudo(
        n: DVector<f64>,
        p: DVector<f64>,
        eps: f64,
        required: BTreeSet<HalfspaceId>,
    ) -> Result<Self> {
        Self::new(n, p, eps, false, required)
    }

    fn new(
        n: DVector<f64>,
        p: DVector<f64>,
        eps: f64,
        real: bool,
        required: BTreeSet<HalfspaceId>,
    ) -> Result<Self> {
        if n.len() != p.len() {
            return Err(FluxError::DimensionMismatch {
                expected: n.len(),
                got: p.len(),
            });
        }
        let norm = n.norm();
        if norm <= eps {
            return Err(FluxError::DimensionMismatch {
                expected: n.len(),
                got: 0,
            });
        }
        let n = n / norm;
        let d = n.dot(&p);
        Ok(Self {
            n,
            p,
            d,
            eps,
            real,
            required,
        })
    }

    pub fn normal(&self) -> &DVector<f64> {
        &self.n
    }

    pub fn point(&self) -> &DVector<f64> {
        &self.p
    }

    pub fn rhs(&self) -> f64 {
        self.d
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn is_real(&self) -> bool {
        self.real
    }

    pub fn required(&self) -> &BTreeSet<HalfspaceId> {
        &self.required
    }

    /// Signed distance of `x` from the hyperplane along the normal.
    pub fn distance(&self, x: &DVector<f64>) -> f64 {
        self.n.dot(x) - self.d
    }

    /// True iff `x` lies on the hyperplane within `self.eps`.
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        self.distance(x).abs() <= self.eps
    }

    fn dec(&self) -> i32 {
        (-self.eps.log10()).floor() as i32
    }

    /// Rounded key used for numerical dedup: two halfspaces with equal keys
    /// are treated as identical.
    pub fn rounded_key(&self) -> RoundedKey {
        let dec = self.dec();
        let scale = 10f64.powi(dec);
        let rounded_n: Vec<i64> = self.n.iter().map(|v| (v * scale).round() as i64).collect();
        RoundedKey {
            real: self.real,
            n: rounded_n,
            d: (self.d * scale).round() as i64,
        }
    }
}

/// The rounded `(real, normal, rhs)` key used for Halfspace equality/hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoundedKey {
    real: bool,
    n: Vec<i64>,
    d: i64,
}

/// Canonical arena of halfspaces, deduped by rounded key, owned by a
/// `LatticeGraph`.
#[derive(Clone, Debug, Default)]
pub struct HalfspaceTable {
    halfspaces: Vec<Halfspace>,
    by_key: std::collections::HashMap<RoundedKey, HalfspaceId>,
}

impl HalfspaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: HalfspaceId) -> &Halfspace {
        &self.halfspaces[id.0]
    }

    /// Insert `h`, or return the id of an existing halfspace with the same
    /// rounded key.
    pub fn insert(&mut self, h: Halfspace) -> HalfspaceId {
        let key = h.rounded_key();
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let id = HalfspaceId(self.halfspaces.len());
        self.by_key.insert(key, id);
        self.halfspaces.push(h);
        id
    }

    pub fn len(&self) -> usize {
        self.halfspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.halfspaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn normal_is_unit_length() {
        let h = Halfspace::real(dvector![3.0, 4.0], dvector![0.0, 0.0], 1e-6).unwrap();
        assert!((h.normal().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rhs_matches_normal_dot_point() {
        let h = Halfspace::real(dvector![1.0, 0.0], dvector![2.0, 7.0], 1e-6).unwrap();
        assert!((h.rhs() - h.normal().dot(h.point())).abs() < 1e-12);
    }

    #[test]
    fn contains_respects_eps() {
        let h = Halfspace::real(dvector![1.0, 0.0], dvector![0.0, 0.0], 1e-3).unwrap();
        assert!(h.contains(&dvector![0.0005, 9.0]));
        assert!(!h.contains(&dvector![0.01, 9.0]));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        assert!(Halfspace::real(dvector![1.0, 0.0], dvector![0.0, 0.0, 0.0], 1e-6).is_err());
    }

    #[test]
    fn table_dedups_numerically_equal_halfspaces() {
        let mut table = HalfspaceTable::new();
        let a = Halfspace::real(dvector![1.0, 0.0], dvector![5.0, 0.0], 1e-4).unwrap();
        let b = Halfspace::real(dvector![1.0000001, 0.0], dvector![5.0000001, 0.0], 1e-4).unwrap();
        let id_a = table.insert(a);
        let id_b = table.insert(b);
        assert_eq!(id_a, id_b);
        assert_eq!(table.len(), 1);
    }
}
