//! Signed-expression adapter over one logical target variable.
//!
//! Grounded in `fea/VWrapper.py`: some LP formulations represent a free
//! variable as the difference of two non-negative ones (`v = v+ - v-`).
//! `VarProxy` hides that split behind one logical variable so the rest of
//! the engine (halfspace construction, objective assembly) never has to
//! know which representation the underlying model chose.

use crate::errors::{FluxError, Result};
use crate::lp::{LpModel, VarId};

/// One logical target variable, possibly backed by a split (forward/reverse)
/// pair of non-negative LP variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarProxy {
    Simple(VarId),
    Split { pos: VarId, neg: VarId },
}

impl VarProxy {
    /// Add a fresh logical variable with the given bounds to `model`.
    ///
    /// Uses the single-variable (`Simple`) representation whenever the
    /// model can express `[lb, ub]` directly; callers wrapping a solver
    /// that only supports non-negative variables should instead construct
    /// `VarProxy::Split` from two variables they add themselves.
    pub fn simple<M: LpModel>(model: &mut M, lb: f64, ub: f64) -> Result<Self> {
        if lb > ub {
            return Err(FluxError::InvalidBounds { lb, ub });
        }
        Ok(VarProxy::Simple(model.add_variable(lb, ub)))
    }

    /// Construct a split proxy over two already-existing non-negative
    /// variables (`pos - neg` is the logical value).
    pub fn split(pos: VarId, neg: VarId) -> Self {
        VarProxy::Split { pos, neg }
    }

    /// Linear-expression terms for `self` as `(var, coefficient)` pairs,
    /// suitable for `LpModel::add_equality` / `set_objective`.
    pub fn expr_terms(&self) -> Vec<(VarId, f64)> {
        match self {
            VarProxy::Simple(v) => vec![(*v, 1.0)],
            VarProxy::Split { pos, neg } => vec![(*pos, 1.0), (*neg, -1.0)],
        }
    }

    pub fn primal<M: LpModel>(&self, model: &M) -> f64 {
        match self {
            VarProxy::Simple(v) => model.variable_primal(*v),
            VarProxy::Split { pos, neg } => {
                model.variable_primal(*pos) - model.variable_primal(*neg)
            }
        }
    }

    pub fn dual<M: LpModel>(&self, model: &M) -> f64 {
        match self {
            VarProxy::Simple(v) => model.variable_dual(*v),
            VarProxy::Split { pos, neg } => model.variable_dual(*pos) - model.variable_dual(*neg),
        }
    }

    /// Map a logical `[lb, ub]` onto the underlying representation.
    ///
    /// For a split proxy: if `ub < 0` the positive part is pinned to zero;
    /// if `lb > 0` the negative part is pinned to zero; otherwise both parts
    /// keep enough headroom (`[0, max(|lb|, |ub|)]`) to realize any value
    /// in the requested range as `pos - neg`.
    pub fn set_bounds<M: LpModel>(&self, model: &mut M, lb: f64, ub: f64) -> Result<()> {
        if lb > ub {
            return Err(FluxError::InvalidBounds { lb, ub });
        }
        match self {
            VarProxy::Simple(v) => model.set_variable_bounds(*v, lb, ub),
            VarProxy::Split { pos, neg } => {
                if ub <= 0.0 {
                    model.set_variable_bounds(*pos, 0.0, 0.0);
                    model.set_variable_bounds(*neg, -ub, -lb);
                } else if lb >= 0.0 {
                    model.set_variable_bounds(*pos, lb, ub);
                    model.set_variable_bounds(*neg, 0.0, 0.0);
                } else {
                    model.set_variable_bounds(*pos, 0.0, ub);
                    model.set_variable_bounds(*neg, 0.0, -lb);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{DenseSimplex, Sense};

    #[test]
    fn simple_proxy_reports_primal_directly() {
        let mut model = DenseSimplex::new();
        let p = VarProxy::simple(&mut model, -5.0, 5.0).unwrap();
        model.set_objective(&p.expr_terms(), Sense::Maximize);
        model.optimize();
        assert!((p.primal(&model) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn split_proxy_combines_forward_and_reverse_parts() {
        let mut model = DenseSimplex::new();
        let pos = model.add_variable(0.0, 10.0);
        let neg = model.add_variable(0.0, 10.0);
        let p = VarProxy::split(pos, neg);
        p.set_bounds(&mut model, -3.0, 7.0).unwrap();
        model.set_objective(&p.expr_terms(), Sense::Minimize);
        model.optimize();
        assert!((p.primal(&model) - (-3.0)).abs() < 1e-6);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut model = DenseSimplex::new();
        assert!(VarProxy::simple(&mut model, 5.0, 2.0).is_err());
    }
}
