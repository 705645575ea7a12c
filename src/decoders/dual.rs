//Arborea
//Copyright (C) 2025 The Arborea developers
//
//This program is free software: you can redistribute it and/or modify
//it under the terms of the GNU Affero General Public License as published by
//the Free Software Foundation, either version 3 of the License, or
//(at your option) any later version.
//
//This program is distributed in the hope that it will be useful,
//but WITHOUT ANY WARRANTY; without even the implied warranty of
//MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//GNU Affero General Public License for more details.
//
//You should have received a copy of the GNU Affero General Public License
//along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! This module provides the dual evaluation of one iteration. The relaxation
//! decomposes into the cluster tree subproblem and one label selection
//! subproblem per cluster; their values sum to an upper bound on the optimum
//! (each subproblem sees only its own working copy of the arc weights, and the
//! three copies sum to the original scores). The arcs each subproblem selects
//! are folded into the subgradient counters as a side effect.

use crate::common::DecodeError;
use crate::core::problem::Problem;
use crate::decoders::cluster_tree::ClusterTreeDecoder;
use crate::decoders::node_choice::ClusterDecoder;
use crate::subgradient::Subgradient;

/// The outcome of one dual evaluation
#[derive(Debug, Clone, Copy)]
pub struct DualOutcome {
    /// Upper bound on the optimum under the current working weights
    pub value: f64,
    /// True iff some cluster changed its selected label
    pub selection_changed: bool,
}

/// Evaluates the relaxed objective by coordinating the per-cluster label
/// subproblems with the cluster tree subproblem
pub struct DualDecoder {
    tree_decoder: ClusterTreeDecoder,
    pub(crate) cluster_decoders: Vec<ClusterDecoder>,
}

impl DualDecoder {

    pub fn new(problem: &Problem) -> Self {
        let tree_decoder = ClusterTreeDecoder::new(problem);
        let cluster_decoders = problem
            .clusters_iter()
            .map(|cluster| ClusterDecoder::new(cluster, problem))
            .collect();
        Self { tree_decoder, cluster_decoders }
    }

    /// Solves every subproblem under the current working weights, accumulates
    /// their selections into the subgradient and updates the label guess of
    /// each cluster. Fails when the cluster graph no longer spans every
    /// cluster, which only the reduction can cause.
    pub fn maximize(
        &mut self,
        problem: &mut Problem,
        subgradient: &mut Subgradient,
    ) -> Result<DualOutcome, DecodeError> {
        let mut value = self.tree_decoder.maximize(problem)?;
        for &arc in self.tree_decoder.selected() {
            subgradient.select_tree(arc);
        }

        let mut selection_changed = false;
        for decoder in self.cluster_decoders.iter_mut() {
            let cluster = decoder.cluster();
            let choice = decoder.maximize(problem);
            value += choice.weight;
            if let Some(arc) = choice.incoming {
                subgradient.select_incoming(arc);
            }
            for arc in choice.outgoing.iter().flatten() {
                subgradient.select_outgoing(*arc);
            }
            if problem.selected_labels[cluster.0] != choice.label {
                problem.selected_labels[cluster.0] = choice.label;
                selection_changed = true;
            }
        }

        Ok(DualOutcome { value, selection_changed })
    }
}

#[cfg(test)]
mod test_dual {
    use super::*;
    use crate::core::problem::{ArcIndex, ClusterIndex, LabelIndex, Problem};
    use crate::subgradient::{StepsizeOptions, Subgradient};
    use assert_float_eq::assert_float_absolute_eq;

    fn chain() -> Problem {
        let mut problem = Problem::new(3);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(2), 0, 0.0);
        problem.add_arc(LabelIndex(0), a, 6.0); // arc 0
        problem.add_arc(a, b, 3.0); // arc 1
        problem.initialize();
        problem
    }

    #[test]
    fn value_sums_tree_and_cluster_subproblems() {
        let mut problem = chain();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        // Tree: (6 + 3)/3 = 3; root: 6/3; cluster 1: 6/3 + 3/3; cluster 2: 3/3
        assert_float_absolute_eq!(9.0, outcome.value);
    }

    #[test]
    fn agreement_on_a_chain_nullifies_the_gradient() {
        let mut problem = chain();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        decoder.maximize(&mut problem, &mut subgradient).unwrap();
        // Every subproblem picks both arcs: all counters reach 1
        assert!(subgradient.is_null());
    }

    #[test]
    fn selection_change_is_reported_once() {
        let mut problem = Problem::new(2);
        problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(1), 1, 5.0);
        problem.add_arc(LabelIndex(0), b, 3.0);
        problem.initialize();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 1);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        assert!(outcome.selection_changed);
        assert_eq!(b, problem.selected_labels[1]);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        assert!(!outcome.selection_changed);
    }

    #[test]
    fn eliminated_arcs_surface_as_infeasibility() {
        let mut problem = chain();
        problem.disallow_arc(ArcIndex(1));
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        let result = decoder.maximize(&mut problem, &mut subgradient);
        assert_eq!(Err(DecodeError::InfeasibleArborescence { node: 2 }), result.map(|_| ()));
    }
}
