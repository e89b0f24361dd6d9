//! One LP clone, one search at a time.
//!
//! Grounded in `fea/Search.py`: the Searcher pins a set of halfspaces as
//! equality constraints on its own clone of the caller's LP, solves, and
//! derives a new bounding halfspace from the optimum's primal/dual data.

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::cfg::{PERTURB_RETRIES, SENSITIVITY_MULTIPLIER};
use crate::errors::{FluxError, Result};
use crate::halfspace::{Halfspace, HalfspaceId, HalfspaceTable};
use crate::linalg::lstsq;
use crate::lp::{ConstraintId, LpModel, Sense, Status};
use crate::varproxy::VarProxy;

struct ActiveConstraint {
    halfspace: HalfspaceId,
    constraint: ConstraintId,
    base_rhs: f64,
    offset: f64,
}

/// Drives one cloned LP model through the pin/solve/derive cycle.
pub struct Searcher<M: LpModel> {
    model: M,
    proxies: Vec<VarProxy>,
    eps: f64,
    active: Vec<ActiveConstraint>,
    objective: DVector<f64>,
}

impl<M: LpModel> Searcher<M> {
    pub fn new(model: M, proxies: Vec<VarProxy>, eps: f64) -> Self {
        let n = proxies.len();
        Self {
            model,
            proxies,
            eps,
            active: Vec::new(),
            objective: DVector::zeros(n),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn proxies(&self) -> &[VarProxy] {
        &self.proxies
    }

    /// Linear-expression terms for `direction` over the proxies, public
    /// wrapper used by the export adapters to re-express a halfspace normal
    /// as an LP-ready constraint.
    pub fn terms_for(&self, direction: &DVector<f64>) -> Vec<(crate::lp::VarId, f64)> {
        self.combined_terms(direction)
    }

    fn n(&self) -> usize {
        self.proxies.len()
    }

    fn combined_terms(&self, direction: &DVector<f64>) -> Vec<(crate::lp::VarId, f64)> {
        let mut terms = Vec::new();
        for (proxy, &coeff) in self.proxies.iter().zip(direction.iter()) {
            if coeff == 0.0 {
                continue;
            }
            for (var, c) in proxy.expr_terms() {
                terms.push((var, c * coeff));
            }
        }
        terms
    }

    /// Pin `halfspace_ids` as equality constraints (each at `rhs + eps`) and
    /// set the search objective to maximize `obj . x`.
    pub fn set(&mut self, table: &HalfspaceTable, obj: &DVector<f64>, halfspace_ids: &[HalfspaceId]) {
        for active in self.active.drain(..) {
            self.model.remove_constraint(active.constraint);
        }
        for &id in halfspace_ids {
            let hs = table.get(id);
            let terms = self.combined_terms(hs.normal());
            let rhs = hs.rhs() + hs.eps();
            let constraint = self.model.add_equality(&terms, rhs, rhs);
            self.active.push(ActiveConstraint {
                halfspace: id,
                constraint,
                base_rhs: rhs,
                offset: hs.eps(),
            });
        }
        self.objective = obj.clone();
        let obj_terms = self.combined_terms(obj);
        self.model.set_objective(&obj_terms, Sense::Maximize);
    }

    fn perturb_cons<R: Rng>(&mut self, rng: &mut R) {
        if self.active.is_empty() {
            return;
        }
        let idx = rng.gen_range(0..self.active.len());
        let shift = rng.gen_range(0.0..self.active[idx].offset.max(self.eps));
        let rhs = self.active[idx].base_rhs + shift;
        self.model.set_constraint_rhs(self.active[idx].constraint, rhs, rhs);
        self.active[idx].offset = shift.max(self.eps * 1e-3);
    }

    /// Solve the LP, retrying with a random constraint perturbation on
    /// infeasibility up to `PERTURB_RETRIES` times.
    pub fn get_solution<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        for attempt in 0..=PERTURB_RETRIES {
            let status = self.model.optimize();
            if status == Status::Optimal {
                return Ok(());
            }
            tracing::trace!(attempt, active = self.active.len(), ?status, "lp not optimal, perturbing");
            self.perturb_cons(rng);
        }
        tracing::warn!(retries = PERTURB_RETRIES, "solver did not reach optimal status");
        Err(FluxError::SolverUnoptimal)
    }

    /// Current primal point of the target variables.
    pub fn primal_point(&self) -> DVector<f64> {
        DVector::from_iterator(self.n(), self.proxies.iter().map(|p| p.primal(&self.model)))
    }

    fn active_duals(&self) -> Vec<f64> {
        self.active
            .iter()
            .map(|a| self.model.constraint_dual(a.constraint))
            .collect()
    }

    /// Derive a new bounding halfspace by sensitivity analysis on the
    /// current optimum, falling back to a pseudo-halfspace when the LP
    /// degenerated (insufficient equations, insufficient usable duals, or
    /// an ill-conditioned least-squares solve).
    pub fn bounding_halfspace(&self, table: &HalfspaceTable) -> Result<Halfspace> {
        let n = self.n();
        let vp = self.primal_point();
        let obj_star = self.model.objective_value();
        let duals = self.active_duals();

        let rows0 = self.active.len() + 1;
        if rows0 < n.saturating_sub(1) {
            tracing::debug!(rows0, n, "insufficient equations, falling back to pseudo-halfspace");
            return self.pseudo_halfspace();
        }
        let mut a1 = DMatrix::<f64>::zeros(rows0, n);
        let mut b1 = DVector::<f64>::zeros(rows0);
        for (i, active) in self.active.iter().enumerate() {
            let hs = table.get(active.halfspace);
            a1.set_row(i, &hs.normal().transpose());
            b1[i] = hs.rhs();
        }
        a1.set_row(self.active.len(), &self.objective.transpose());
        b1[self.active.len()] = obj_star;

        let mut directions = Vec::new();
        for (i, &hd) in duals.iter().enumerate() {
            let mut b_perturbed = b1.clone();
            b_perturbed[i] += SENSITIVITY_MULTIPLIER;
            let last = b_perturbed.len() - 1;
            b_perturbed[last] += SENSITIVITY_MULTIPLIER * hd;
            if let Ok(new_point) = lstsq(&a1, &b_perturbed, self.eps) {
                directions.push(new_point - &vp);
            }
        }

        if directions.len() + 1 < n {
            tracing::debug!(usable = directions.len(), n, "insufficient usable duals, falling back to pseudo-halfspace");
            return self.pseudo_halfspace();
        }

        let mut a = DMatrix::<f64>::zeros(directions.len() + 1, n);
        let mut b = DVector::<f64>::zeros(directions.len() + 1);
        for (i, dir) in directions.iter().enumerate() {
            a.set_row(i, &dir.transpose());
        }
        a.set_row(directions.len(), &self.objective.transpose());
        b[directions.len()] = -1.0;

        let normal = match lstsq(&a, &b, self.eps) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("facet normal least-squares ill-conditioned, falling back to pseudo-halfspace");
                return self.pseudo_halfspace();
            }
        };
        match Halfspace::real(normal, vp, self.eps) {
            Ok(h) => {
                tracing::trace!(rhs = h.rhs(), "derived real bounding halfspace");
                Ok(h)
            }
            Err(_) => self.pseudo_halfspace(),
        }
    }

    /// A topological placeholder: normal `-O` through the current point,
    /// requiring every currently active halfspace.
    pub fn pseudo_halfspace(&self) -> Result<Halfspace> {
        let vp = self.primal_point();
        let required = self.active.iter().map(|a| a.halfspace).collect();
        let h = Halfspace::pseudo(-self.objective.clone(), vp, self.eps, required)?;
        tracing::warn!(required = self.active.len(), "inserted pseudo-halfspace");
        Ok(h)
    }
}
