//! Faces of the lattice: immutable value objects over sets of halfspaces.
//!
//! Grounded in `fea/Node.py` and in this crate's existing `Face1`/`Face2`/
//! `Face3` types (`geom4::faces`), generalized from fixed 2/3/4-tuples of
//! facet indices to an arbitrary `BTreeSet<HalfspaceId>`.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::errors::{FluxError, Result};
use crate::halfspace::{HalfspaceId, HalfspaceTable};
use crate::linalg::lstsq;

/// One face of the lattice: a set of halfspaces whose common intersection
/// defines it, plus the ambient dimension and tolerance it was built with.
///
/// Identity (`Eq`/`Hash`/`Ord`) is the halfspace set alone; `n`/`eps` are
/// cached context, matching the reference implementation's `Node(frozenset)`
/// with `n`/`eps` kwargs.
#[derive(Clone, Debug)]
pub struct Face {
    halfspaces: BTreeSet<HalfspaceId>,
    n: usize,
    eps: f64,
}

impl Face {
    pub fn new(halfspaces: BTreeSet<HalfspaceId>, n: usize, eps: f64) -> Self {
        Self { halfspaces, n, eps }
    }

    pub fn root(n: usize, eps: f64) -> Self {
        Self::new(BTreeSet::new(), n, eps)
    }

    pub fn halfspaces(&self) -> &BTreeSet<HalfspaceId> {
        &self.halfspaces
    }

    pub fn len(&self) -> usize {
        self.halfspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.halfspaces.is_empty()
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Dimension of this face: `N` minus the number of bounding halfspaces,
    /// floored at zero.
    pub fn level(&self) -> usize {
        self.n.saturating_sub(self.halfspaces.len())
    }

    pub fn is_vertex(&self) -> bool {
        self.level() == 0
    }

    pub fn is_facet(&self) -> bool {
        self.n > 0 && self.level() + 1 == self.n
    }

    /// True iff every bounding halfspace is a genuine LP-derived bound.
    pub fn is_real(&self, table: &HalfspaceTable) -> bool {
        self.halfspaces.iter().all(|id| table.get(*id).is_real())
    }

    pub fn real_count(&self, table: &HalfspaceTable) -> usize {
        self.halfspaces
            .iter()
            .filter(|id| table.get(**id).is_real())
            .count()
    }

    /// `real_count - (n - level)`: how far this face is from needing only
    /// real halfspaces to pin it down.
    pub fn score(&self, table: &HalfspaceTable) -> i64 {
        self.real_count(table) as i64 - (self.n.min(self.halfspaces.len())) as i64
    }

    /// `(level, -score)`; smaller sorts first (highest level, highest score).
    pub fn sort_key(&self, table: &HalfspaceTable) -> (usize, i64) {
        (self.level(), -self.score(table))
    }

    /// Union of every halfspace's `required` set, over halfspaces in `self`.
    pub fn required_halfspaces(&self, table: &HalfspaceTable) -> BTreeSet<HalfspaceId> {
        let mut acc = BTreeSet::new();
        for id in &self.halfspaces {
            acc.extend(table.get(*id).required().iter().copied());
        }
        acc
    }

    /// True iff every pseudo-halfspace's prerequisites are already present.
    pub fn valid_domain(&self, table: &HalfspaceTable) -> bool {
        self.required_halfspaces(table).is_subset(&self.halfspaces)
    }

    /// Least-squares point for a vertex face, solved over its real
    /// halfspaces only.
    pub fn point(&self, table: &HalfspaceTable) -> Result<DVector<f64>> {
        let real_ids: Vec<HalfspaceId> = self
            .halfspaces
            .iter()
            .copied()
            .filter(|id| table.get(*id).is_real())
            .collect();
        if real_ids.is_empty() {
            return Err(FluxError::LeastSquaresFailure);
        }
        let mut a = DMatrix::<f64>::zeros(real_ids.len(), self.n);
        let mut b = DVector::<f64>::zeros(real_ids.len());
        for (row, id) in real_ids.iter().enumerate() {
            let hs = table.get(*id);
            a.set_row(row, &hs.normal().transpose());
            b[row] = hs.rhs();
        }
        lstsq(&a, &b, self.eps)
    }

    /// True iff `vertex`'s point lies on every halfspace of `self` that
    /// `vertex` does not already include.
    pub fn face_has_vertex(&self, table: &HalfspaceTable, vertex: &Face, vertex_point: &DVector<f64>) -> bool {
        self.halfspaces
            .iter()
            .filter(|id| !vertex.halfspaces.contains(id))
            .all(|id| table.get(*id).contains(vertex_point))
    }

    /// Dual of `face_has_vertex`: true iff `self`'s point lies on every
    /// halfspace of `facet` it does not already include.
    pub fn vertex_has_facet(&self, table: &HalfspaceTable, facet: &Face, self_point: &DVector<f64>) -> bool {
        facet.face_has_vertex(table, self, self_point)
    }

    /// A direction orthogonal to every halfspace normal in `self`, chosen (as
    /// far as the available degrees of freedom allow) to point away from
    /// `children`. Fails with `NoOrthogonalDirection` if some child beyond
    /// the solvable system's capacity still points the wrong way, or if
    /// there are no constraining rows at all (callers should use
    /// `random_vector` for the empty root face instead).
    pub fn orthogonal_vector(&self, table: &HalfspaceTable, children: &[HalfspaceId]) -> Result<DVector<f64>> {
        let self_normals: Vec<DVector<f64>> = self
            .halfspaces
            .iter()
            .map(|id| table.get(*id).normal().clone())
            .collect();
        let capacity = self.n.saturating_sub(self.halfspaces.len());
        let nchild = children.len().min(capacity);
        let used = &children[..nchild];
        let remaining = &children[nchild..];

        let total_rows = self_normals.len() + nchild;
        if total_rows == 0 {
            return Err(FluxError::NoOrthogonalDirection);
        }
        let mut a = DMatrix::<f64>::zeros(total_rows, self.n);
        let mut b = DVector::<f64>::zeros(total_rows);
        for (i, normal) in self_normals.iter().enumerate() {
            a.set_row(i, &normal.transpose());
        }
        for (i, id) in used.iter().enumerate() {
            let row = self_normals.len() + i;
            a.set_row(row, &table.get(*id).normal().transpose());
            b[row] = 1.0;
        }
        let x = lstsq(&a, &b, self.eps)?;
        for id in remaining {
            if table.get(*id).normal().dot(&x) < -self.eps {
                return Err(FluxError::NoOrthogonalDirection);
            }
        }
        Ok(x)
    }

    /// A uniformly random unit vector in `R^n`, used to seed the search from
    /// a face with no known children (the lattice root).
    pub fn random_vector<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        loop {
            let v = DVector::from_fn(self.n, |_, _| rng.gen_range(-1.0..1.0));
            let norm = v.norm();
            if norm > 1e-9 {
                return v / norm;
            }
        }
    }

    fn combine(&self, other: &Face, halfspaces: BTreeSet<HalfspaceId>) -> Face {
        Face::new(halfspaces, self.n.max(other.n), self.eps)
    }

    pub fn intersection(&self, other: &Face) -> Face {
        self.combine(
            other,
            self.halfspaces.intersection(&other.halfspaces).copied().collect(),
        )
    }

    pub fn union(&self, other: &Face) -> Face {
        self.combine(other, self.halfspaces.union(&other.halfspaces).copied().collect())
    }

    pub fn difference(&self, other: &Face) -> Face {
        self.combine(
            other,
            self.halfspaces.difference(&other.halfspaces).copied().collect(),
        )
    }

    pub fn symmetric_difference(&self, other: &Face) -> Face {
        self.combine(
            other,
            self.halfspaces
                .symmetric_difference(&other.halfspaces)
                .copied()
                .collect(),
        )
    }

    pub fn with_halfspace(&self, id: HalfspaceId) -> Face {
        let mut halfspaces = self.halfspaces.clone();
        halfspaces.insert(id);
        Face::new(halfspaces, self.n, self.eps)
    }

    /// The immediate parent faces one level up: every subset obtained by
    /// dropping exactly one halfspace.
    pub fn immediate_parents(&self) -> Vec<Face> {
        self.halfspaces
            .iter()
            .map(|drop| {
                let halfspaces: BTreeSet<HalfspaceId> =
                    self.halfspaces.iter().copied().filter(|id| id != drop).collect();
                Face::new(halfspaces, self.n, self.eps)
            })
            .collect()
    }
}

impl PartialEq for Face {
    fn eq(&self, other: &Self) -> bool {
        self.halfspaces == other.halfspaces
    }
}

impl Eq for Face {}

impl Hash for Face {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.halfspaces.hash(state);
    }
}

impl PartialOrd for Face {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Face {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.halfspaces.cmp(&other.halfspaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;
    use rand::SeedableRng;

    fn table_with_box(eps: f64) -> (HalfspaceTable, Vec<HalfspaceId>) {
        let mut table = HalfspaceTable::new();
        let mut ids = Vec::new();
        for axis in 0..2usize {
            let mut pos = DVector::zeros(2);
            pos[axis] = 1.0;
            ids.push(table.insert(crate::halfspace::Halfspace::real(pos.clone(), pos * 10.0, eps).unwrap()));
            let mut neg = DVector::zeros(2);
            neg[axis] = -1.0;
            ids.push(table.insert(crate::halfspace::Halfspace::real(neg.clone(), neg * 10.0, eps).unwrap()));
        }
        (table, ids)
    }

    #[test]
    fn level_and_score_for_vertex_of_real_halfspaces() {
        let (table, ids) = table_with_box(1e-6);
        let face = Face::new(ids[0..2].iter().copied().collect(), 2, 1e-6);
        assert_eq!(face.level(), 0);
        assert!(face.is_real(&table));
        assert_eq!(face.score(&table), 0);
    }

    #[test]
    fn point_solves_least_squares_system() {
        let (table, ids) = table_with_box(1e-6);
        let face = Face::new(BTreeSet::from([ids[0], ids[2]]), 2, 1e-6);
        let p = face.point(&table).unwrap();
        assert!((p[0] - 10.0).abs() < 1e-6);
        assert!((p[1] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn face_has_vertex_detects_incidence() {
        let (table, ids) = table_with_box(1e-6);
        let facet = Face::new(BTreeSet::from([ids[0]]), 2, 1e-6);
        let vertex = Face::new(BTreeSet::from([ids[0], ids[2]]), 2, 1e-6);
        let p = vertex.point(&table).unwrap();
        assert!(facet.face_has_vertex(&table, &vertex, &p));
    }

    #[test]
    fn orthogonal_vector_avoids_child_direction() {
        let (table, ids) = table_with_box(1e-6);
        let root = Face::root(2, 1e-6);
        let v = root.orthogonal_vector(&table, &[ids[0]]).unwrap();
        assert!(table.get(ids[0]).normal().dot(&v) >= -1e-6);
    }

    #[test]
    fn random_vector_is_unit_length() {
        let face = Face::root(3, 1e-6);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let v = face.random_vector(&mut rng);
        assert!((v.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn set_operations_combine_halfspace_sets() {
        let a = Face::new(BTreeSet::from([HalfspaceId(0), HalfspaceId(1)]), 3, 1e-6);
        let b = Face::new(BTreeSet::from([HalfspaceId(1), HalfspaceId(2)]), 3, 1e-6);
        assert_eq!(a.intersection(&b).halfspaces(), &BTreeSet::from([HalfspaceId(1)]));
        assert_eq!(
            a.union(&b).halfspaces(),
            &BTreeSet::from([HalfspaceId(0), HalfspaceId(1), HalfspaceId(2)])
        );
    }
}
