//! Adapters that turn a finished `LatticeGraph` back into plain data: an LP
//! model with the envelope's facets as constraints, a dimension-agnostic
//! polytope description for downstream NLP tooling, and a Graphviz dump for
//! inspecting the lattice by eye.

use crate::face::Face;
use crate::lattice::LatticeGraph;
use crate::lp::LpModel;

/// A plain description of the projected polytope: facet inequalities and
/// vertex coordinates, detached from any particular `LpModel` backend.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpForm {
    pub dimension: usize,
    /// `(normal, rhs)` pairs; the polytope is `{x : normal . x >= rhs}` for
    /// every entry.
    pub facets: Vec<(Vec<f64>, f64)>,
    pub vertices: Vec<Vec<f64>>,
    pub f_vector: Vec<usize>,
    pub euler_characteristic: i64,
}

impl<M: LpModel> LatticeGraph<M> {
    /// Clone the underlying (clamped) LP model and add one inequality
    /// constraint per complete real facet.
    ///
    /// When `replace_variables` is set, each target variable's bounds are
    /// additionally tightened to the min/max reached by any complete real
    /// vertex along that coordinate, replacing the blunt `max_value` clamp
    /// applied at construction with the lattice's own discovered box.
    pub fn to_lp_model(&self, replace_variables: bool) -> M {
        let mut model = self.searcher_model().clone();
        for facet in self.facets(true, true) {
            let hid = *facet.halfspaces().iter().next().unwrap();
            let hs = self.table().get(hid);
            let terms = self.facet_terms(hs.normal());
            model.add_equality(&terms, hs.rhs(), f64::INFINITY);
        }
        if replace_variables {
            let points: Vec<_> = self
                .vertices(true, true)
                .into_iter()
                .filter_map(|v| v.point(self.table()).ok())
                .collect();
            if !points.is_empty() {
                for (i, proxy) in self.proxies().iter().enumerate() {
                    let lo = points.iter().map(|p| p[i]).fold(f64::INFINITY, f64::min);
                    let hi = points.iter().map(|p| p[i]).fold(f64::NEG_INFINITY, f64::max);
                    let _ = proxy.set_bounds(&mut model, lo, hi);
                }
            }
        }
        model
    }

    /// A backend-independent snapshot of the projected polytope.
    pub fn to_nlp_form(&self) -> NlpForm {
        let facets = self
            .facets(true, true)
            .into_iter()
            .map(|f| {
                let hid = *f.halfspaces().iter().next().unwrap();
                let hs = self.table().get(hid);
                (hs.normal().iter().copied().collect(), hs.rhs())
            })
            .collect();
        let vertices = self
            .vertices(true, true)
            .into_iter()
            .filter_map(|v| v.point(self.table()).ok())
            .map(|p| p.iter().copied().collect())
            .collect();
        NlpForm {
            dimension: self.n(),
            facets,
            vertices,
            f_vector: self.f_vector(),
            euler_characteristic: self.modified_euler_characteristic(),
        }
    }

    /// Advisory Graphviz dump of the lattice: one node per discovered face,
    /// solid for complete, dashed otherwise, with edges to its discovered
    /// children.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph lattice {\n");
        for face in self.faces() {
            out.push_str(&dot_node(face, self.is_face_complete(face)));
            for child in self.children_of(face) {
                out.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    face_id(face),
                    face_id(&child)
                ));
            }
        }
        out.push_str("}\n");
        out
    }

    pub fn get_vertices(&self, real_only: bool, complete_only: bool) -> Vec<&Face> {
        self.vertices(real_only, complete_only)
    }

    pub fn get_facets(&self, real_only: bool, complete_only: bool) -> Vec<&Face> {
        self.facets(real_only, complete_only)
    }

    pub fn get_nodes_of_level(&self, level: usize) -> Vec<&Face> {
        self.nodes_of_level(level)
    }
}

fn face_id(face: &Face) -> String {
    let ids: Vec<String> = face.halfspaces().iter().map(|h| h.0.to_string()).collect();
    format!("{{{}}}", ids.join(","))
}

fn dot_node(face: &Face, complete: bool) -> String {
    let style = if complete { "solid" } else { "dashed" };
    format!(
        "  \"{}\" [label=\"level {}\", style={}];\n",
        face_id(face),
        face.level(),
        style
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Config;
    use crate::lp::DenseSimplex;

    #[test]
    fn to_dot_mentions_every_discovered_face() {
        let mut model = DenseSimplex::new();
        let x = model.add_variable(-10.0, 10.0);
        let y = model.add_variable(-10.0, 10.0);
        let mut graph = LatticeGraph::new(model, &[x, y], Config::default(), 3);
        graph.solve();
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph lattice {"));
        assert_eq!(dot.matches("->").count() > 0, true);
    }

    #[test]
    fn to_nlp_form_reports_matching_dimension_and_f_vector() {
        let mut model = DenseSimplex::new();
        let x = model.add_variable(-10.0, 10.0);
        let y = model.add_variable(-10.0, 10.0);
        let mut graph = LatticeGraph::new(model, &[x, y], Config::default(), 4);
        graph.solve();
        let nlp = graph.to_nlp_form();
        assert_eq!(nlp.dimension, 2);
        assert_eq!(nlp.f_vector, graph.f_vector());
    }

    #[test]
    fn to_lp_model_adds_one_constraint_per_complete_facet() {
        let mut model = DenseSimplex::new();
        let x = model.add_variable(-10.0, 10.0);
        let y = model.add_variable(-10.0, 10.0);
        let mut graph = LatticeGraph::new(model, &[x, y], Config::default(), 5);
        graph.solve();
        let facet_count = graph.get_facets(true, true).len();
        let exported = graph.to_lp_model(false);
        let _ = exported;
        assert!(facet_count > 0);
    }
}
