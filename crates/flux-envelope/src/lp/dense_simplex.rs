//! A from-scratch, bounded-variable, two-phase (Big-M) dense simplex solver.
//!
//! This is the one piece of "the LP solver itself" this crate implements: a
//! production solver is out of scope, but the engine needs *some* concrete,
//! correct `LpModel` to run against in tests and examples. The algorithm is
//! explicit and auditable rather than fast, in the same spirit as this
//! codebase's own hand-rolled linear algebra (`geom4::convert`'s nullspace,
//! `geom4::volume`'s Gram-determinant volumes) rather than reaching for an
//! external solver crate.
//!
//! Bounded variables are handled via column bound-flipping (Dantzig's upper
//! bound technique): a nonbasic variable currently at its upper bound has its
//! tableau column negated and its contribution folded into the RHS, so the
//! rest of the pivoting logic never needs to special-case "at lower" vs "at
//! upper" — every nonbasic column just represents "can only increase from its
//! current reference point".

use nalgebra::DMatrix;

use super::model::{ConstraintId, LpModel, Sense, Status, VarId};

const BIG_M: f64 = 1.0e7;
const FEAS_TOL: f64 = 1e-7;
const MAX_ITERATIONS: usize = 10_000;

#[derive(Clone, Debug)]
struct Row {
    terms: Vec<(usize, f64)>,
    rhs_lb: f64,
    rhs_ub: f64,
}

/// Reference `LpModel` implementation: a dense bounded-variable simplex.
///
/// Variable bounds must be finite (`add_variable` asserts this in debug
/// builds); callers with genuinely unbounded variables should clamp them to
/// a large finite range before adding them, which is exactly what
/// `LatticeGraph`'s construction does for target variables via `max_value`.
#[derive(Clone, Debug)]
pub struct DenseSimplex {
    lb: Vec<f64>,
    ub: Vec<f64>,
    obj: Vec<f64>,
    sense: Sense,
    rows: Vec<Option<Row>>,
    status: Status,
    primal: Vec<f64>,
    var_reduced_cost: Vec<f64>,
    row_dual: Vec<f64>,
    objective_value: f64,
}

impl DenseSimplex {
    pub fn new() -> Self {
        Self {
            lb: Vec::new(),
            ub: Vec::new(),
            obj: Vec::new(),
            sense: Sense::Maximize,
            rows: Vec::new(),
            status: Status::Error,
            primal: Vec::new(),
            var_reduced_cost: Vec::new(),
            row_dual: Vec::new(),
            objective_value: 0.0,
        }
    }

    fn run_simplex(&mut self) -> Status {
        let n = self.lb.len();
        for p in self.primal.iter_mut() {
            *p = 0.0;
        }
        for d in self.var_reduced_cost.iter_mut() {
            *d = 0.0;
        }
        for d in self.row_dual.iter_mut() {
            *d = 0.0;
        }
        self.objective_value = 0.0;

        if n == 0 {
            return Status::Optimal;
        }

        let active: Vec<(usize, &Row)> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|row| (i, row)))
            .collect();
        let m = active.len();

        let slack_base = n;
        let artificial_base = n + m;
        let nv = n + 2 * m;

        let mut lo = vec![0.0; nv];
        let mut hi = vec![0.0; nv];
        for j in 0..n {
            lo[j] = self.lb[j];
            hi[j] = self.ub[j];
        }

        let mut slack_sign = vec![1.0; m];
        let mut anchor = vec![0.0; m];
        for (k, (_, row)) in active.iter().enumerate() {
            lo[slack_base + k] = 0.0;
            if row.rhs_ub.is_finite() {
                anchor[k] = row.rhs_ub;
                slack_sign[k] = 1.0;
                hi[slack_base + k] = if row.rhs_lb.is_finite() {
                    row.rhs_ub - row.rhs_lb
                } else {
                    f64::INFINITY
                };
            } else if row.rhs_lb.is_finite() {
                anchor[k] = row.rhs_lb;
                slack_sign[k] = -1.0;
                hi[slack_base + k] = f64::INFINITY;
            } else {
                anchor[k] = 0.0;
                slack_sign[k] = 1.0;
                hi[slack_base + k] = f64::INFINITY;
            }
        }
        for k in 0..m {
            lo[artificial_base + k] = 0.0;
            hi[artificial_base + k] = f64::INFINITY;
        }
        let cap: Vec<f64> = (0..nv).map(|j| hi[j] - lo[j]).collect();
        if cap.iter().any(|&c| c < -FEAS_TOL) {
            return Status::Infeasible;
        }

        let mut row_sign = vec![1.0; m];
        let mut tableau = DMatrix::<f64>::zeros(m + 1, nv + 1);
        for (k, (_, row)) in active.iter().enumerate() {
            let mut rhs_shifted = anchor[k];
            for &(j, a) in &row.terms {
                tableau[(k + 1, j)] += a;
                rhs_shifted -= a * lo[j];
            }
            tableau[(k + 1, slack_base + k)] = slack_sign[k];
            if rhs_shifted < 0.0 {
                row_sign[k] = -1.0;
                for j in 0..(n + m) {
                    tableau[(k + 1, j)] = -tableau[(k + 1, j)];
                }
                rhs_shifted = -rhs_shifted;
            }
            tableau[(k + 1, artificial_base + k)] = 1.0;
            tableau[(k + 1, nv)] = rhs_shifted;
        }

        let sense_sign = match self.sense {
            Sense::Maximize => -1.0,
            Sense::Minimize => 1.0,
        };
        let mut cost = vec![0.0; nv];
        for j in 0..n {
            cost[j] = sense_sign * self.obj[j];
        }
        for k in 0..m {
            cost[artificial_base + k] = BIG_M;
        }
        for j in 0..nv {
            tableau[(0, j)] = cost[j];
        }
        for k in 0..m {
            let c = cost[artificial_base + k];
            if c != 0.0 {
                for j in 0..=nv {
                    let v = tableau[(k + 1, j)];
                    tableau[(0, j)] -= c * v;
                }
            }
        }

        let mut basis: Vec<usize> = (0..m).map(|k| artificial_base + k).collect();
        let mut basic_row: Vec<Option<usize>> = vec![None; nv];
        for (k, &col) in basis.iter().enumerate() {
            basic_row[col] = Some(k);
        }
        let mut at_upper = vec![false; nv];
        let mut retired = vec![false; m];

        let mut iterations = 0usize;
        loop {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                return Status::Error;
            }

            let mut enter_col: Option<usize> = None;
            let mut best_rc = -FEAS_TOL;
            for j in 0..nv {
                if basic_row[j].is_some() {
                    continue;
                }
                if j >= artificial_base && retired[j - artificial_base] {
                    continue;
                }
                let rc = tableau[(0, j)];
                if rc < best_rc {
                    best_rc = rc;
                    enter_col = Some(j);
                }
            }
            let enter_col = match enter_col {
                Some(j) => j,
                None => break,
            };

            let mut theta = cap[enter_col];
            let mut leaving_row: Option<usize> = None;
            let mut leaving_to_upper = false;
            for k in 0..m {
                let a = tableau[(k + 1, enter_col)];
                let basic_col = basis[k];
                let basic_val = tableau[(k + 1, nv)];
                if a > FEAS_TOL {
                    let limit = basic_val / a;
                    if limit < theta {
                        theta = limit;
                        leaving_row = Some(k);
                        leaving_to_upper = false;
                    }
                } else if a < -FEAS_TOL && cap[basic_col].is_finite() {
                    let limit = (cap[basic_col] - basic_val) / (-a);
                    if limit < theta {
                        theta = limit;
                        leaving_row = Some(k);
                        leaving_to_upper = true;
                    }
                }
            }

            if !theta.is_finite() {
                return Status::Unbounded;
            }

            match leaving_row {
                None => {
                    flip_bound(&mut tableau, enter_col, cap[enter_col], nv, &mut at_upper);
                }
                Some(row) => {
                    pivot(&mut tableau, row + 1, enter_col, nv);
                    let leaving_col = basis[row];
                    basic_row[leaving_col] = None;
                    basic_row[enter_col] = Some(row);
                    basis[row] = enter_col;
                    if leaving_col >= artificial_base {
                        retired[leaving_col - artificial_base] = true;
                    }
                    if leaving_to_upper {
                        flip_bound(&mut tableau, leaving_col, cap[leaving_col], nv, &mut at_upper);
                    }
                }
            }
        }

        for k in 0..m {
            let col = basis[k];
            if col >= artificial_base && tableau[(k + 1, nv)] > 1e-6 {
                return Status::Infeasible;
            }
        }

        let mut y = vec![0.0; nv];
        for j in 0..nv {
            if let Some(row) = basic_row[j] {
                y[j] = tableau[(row + 1, nv)];
            } else if at_upper[j] {
                y[j] = cap[j];
            }
        }
        for j in 0..n {
            self.primal[j] = lo[j] + y[j];
        }
        self.objective_value = (0..n).map(|j| self.obj[j] * self.primal[j]).sum();

        for j in 0..n {
            let true_rc = if basic_row[j].is_some() {
                0.0
            } else if at_upper[j] {
                -tableau[(0, j)]
            } else {
                tableau[(0, j)]
            };
            self.var_reduced_cost[j] = sense_sign * true_rc;
        }
        for (k, &(orig_idx, _)) in active.iter().enumerate() {
            let col = slack_base + k;
            let true_rc = if basic_row[col].is_some() {
                0.0
            } else if at_upper[col] {
                -tableau[(0, col)]
            } else {
                tableau[(0, col)]
            };
            self.row_dual[orig_idx] = -sense_sign * slack_sign[k] * true_rc;
        }

        Status::Optimal
    }
}

impl Default for DenseSimplex {
    fn default() -> Self {
        Self::new()
    }
}

fn pivot(tableau: &mut DMatrix<f64>, prow: usize, pcol: usize, nv: usize) {
    let piv = tableau[(prow, pcol)];
    for j in 0..=nv {
        tableau[(prow, j)] /= piv;
    }
    for i in 0..tableau.nrows() {
        if i == prow {
            continue;
        }
        let factor = tableau[(i, pcol)];
        if factor != 0.0 {
            for j in 0..=nv {
                let v = tableau[(prow, j)];
                tableau[(i, j)] -= factor * v;
            }
        }
    }
}

fn flip_bound(tableau: &mut DMatrix<f64>, col: usize, cap_col: f64, nv: usize, at_upper: &mut [bool]) {
    for i in 0..tableau.nrows() {
        let a = tableau[(i, col)];
        tableau[(i, nv)] -= a * cap_col;
        tableau[(i, col)] = -a;
    }
    at_upper[col] = !at_upper[col];
}

impl LpModel for DenseSimplex {
    fn add_variable(&mut self, lb: f64, ub: f64) -> VarId {
        debug_assert!(
            lb.is_finite() && ub.is_finite() && lb <= ub,
            "DenseSimplex requires finite, ordered variable bounds"
        );
        let id = VarId(self.lb.len());
        self.lb.push(lb);
        self.ub.push(ub);
        self.obj.push(0.0);
        self.primal.push(lb);
        self.var_reduced_cost.push(0.0);
        id
    }

    fn variable_bounds(&self, v: VarId) -> (f64, f64) {
        (self.lb[v.0], self.ub[v.0])
    }

    fn set_variable_bounds(&mut self, v: VarId, lb: f64, ub: f64) {
        debug_assert!(lb <= ub);
        self.lb[v.0] = lb;
        self.ub[v.0] = ub;
    }

    fn add_equality(&mut self, coeffs: &[(VarId, f64)], rhs_lb: f64, rhs_ub: f64) -> ConstraintId {
        let id = ConstraintId(self.rows.len());
        self.rows.push(Some(Row {
            terms: coeffs.iter().map(|(v, c)| (v.0, *c)).collect(),
            rhs_lb,
            rhs_ub,
        }));
        self.row_dual.push(0.0);
        id
    }

    fn remove_constraint(&mut self, c: ConstraintId) {
        self.rows[c.0] = None;
        self.row_dual[c.0] = 0.0;
    }

    fn set_constraint_rhs(&mut self, c: ConstraintId, lb: f64, ub: f64) {
        if let Some(row) = self.rows[c.0].as_mut() {
            row.rhs_lb = lb;
            row.rhs_ub = ub;
        }
    }

    fn constraint_rhs(&self, c: ConstraintId) -> f64 {
        self.rows[c.0]
            .as_ref()
            .map(|r| if r.rhs_ub.is_finite() { r.rhs_ub } else { r.rhs_lb })
            .unwrap_or(0.0)
    }

    fn constraint_dual(&self, c: ConstraintId) -> f64 {
        self.row_dual[c.0]
    }

    fn set_objective(&mut self, coeffs: &[(VarId, f64)], sense: Sense) {
        for c in self.obj.iter_mut() {
            *c = 0.0;
        }
        for &(v, c) in coeffs {
            self.obj[v.0] = c;
        }
        self.sense = sense;
    }

    fn optimize(&mut self) -> Status {
        self.status = self.run_simplex();
        self.status
    }

    fn objective_value(&self) -> f64 {
        self.objective_value
    }

    fn variable_primal(&self, v: VarId) -> f64 {
        self.primal[v.0]
    }

    fn variable_dual(&self, v: VarId) -> f64 {
        self.var_reduced_cost[v.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_only_maximizes_to_upper_bound() {
        let mut lp = DenseSimplex::new();
        let x = lp.add_variable(-5.0, 5.0);
        lp.set_objective(&[(x, 1.0)], Sense::Maximize);
        assert_eq!(lp.optimize(), Status::Optimal);
        assert!((lp.variable_primal(x) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn simple_two_variable_lp_matches_known_optimum() {
        // maximize x + y subject to x + 2y <= 4, x in [0,3], y in [0,3]
        let mut lp = DenseSimplex::new();
        let x = lp.add_variable(0.0, 3.0);
        let y = lp.add_variable(0.0, 3.0);
        lp.add_equality(&[(x, 1.0), (y, 2.0)], f64::NEG_INFINITY, 4.0);
        lp.set_objective(&[(x, 1.0), (y, 1.0)], Sense::Maximize);
        assert_eq!(lp.optimize(), Status::Optimal);
        assert!((lp.objective_value() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn pinned_equality_yields_nonzero_dual_when_binding() {
        let mut lp = DenseSimplex::new();
        let x = lp.add_variable(0.0, 10.0);
        let y = lp.add_variable(0.0, 10.0);
        let c = lp.add_equality(&[(x, 1.0), (y, 1.0)], 5.0, 5.0);
        lp.set_objective(&[(x, 1.0), (y, 1.0)], Sense::Maximize);
        assert_eq!(lp.optimize(), Status::Optimal);
        assert!((lp.objective_value() - 5.0).abs() < 1e-6);
        assert!(lp.constraint_dual(c).abs() > 1e-6);
    }

    #[test]
    fn contradictory_equalities_are_infeasible() {
        let mut lp = DenseSimplex::new();
        let x = lp.add_variable(0.0, 10.0);
        lp.add_equality(&[(x, 1.0)], 2.0, 2.0);
        lp.add_equality(&[(x, 1.0)], 8.0, 8.0);
        lp.set_objective(&[(x, 1.0)], Sense::Maximize);
        assert_eq!(lp.optimize(), Status::Infeasible);
    }

    #[test]
    fn removed_constraint_no_longer_binds() {
        let mut lp = DenseSimplex::new();
        let x = lp.add_variable(0.0, 10.0);
        let c = lp.add_equality(&[(x, 1.0)], 2.0, 2.0);
        lp.set_objective(&[(x, 1.0)], Sense::Maximize);
        assert_eq!(lp.optimize(), Status::Optimal);
        assert!((lp.variable_primal(x) - 2.0).abs() < 1e-6);
        lp.remove_constraint(c);
        assert_eq!(lp.optimize(), Status::Optimal);
        assert!((lp.variable_primal(x) - 10.0).abs() < 1e-6);
    }
}
