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

//! This module provides the cluster-level tree subproblem. The arc set is
//! collapsed to one entry per (source cluster, destination cluster) pair by
//! keeping the arc with maximum tree weight, and a maximum-weight spanning
//! arborescence rooted at cluster 0 is computed over this collapsed graph.
//! The result selects one parent cluster per non-root cluster, and the
//! representative arc for each, without regard to label consistency: labels
//! are reconciled only through the subgradient coupling with the per-cluster
//! subproblems.

use crate::common::DecodeError;
use crate::core::problem::{ArcIndex, Problem};
use crate::decoders::arborescence::{ArborescenceSolver, Edge};
use rustc_hash::FxHashMap;

/// Solves the cluster-level tree subproblem over the collapsed cluster graph
#[derive(Debug)]
pub struct ClusterTreeDecoder {
    n_cluster: usize,
    /// Arcs sharing a (source, destination) cluster pair, grouped once at
    /// construction
    groups: Vec<Vec<ArcIndex>>,
    /// Cluster pair of each group
    endpoints: Vec<(usize, usize)>,
    /// Representative arc of each group at the last evaluation
    representatives: Vec<ArcIndex>,
    /// Group of each scratch edge handed to the arborescence solver
    edge_groups: Vec<usize>,
    edges: Vec<Edge>,
    solver: ArborescenceSolver,
    /// Selected representative arc per non-root cluster
    selected: Vec<ArcIndex>,
}

impl ClusterTreeDecoder {

    /// Groups the arcs of the problem by cluster pair. Built once per problem
    /// instance and reused unchanged across iterations.
    pub fn new(problem: &Problem) -> Self {
        let mut groups: Vec<Vec<ArcIndex>> = vec![];
        let mut endpoints: Vec<(usize, usize)> = vec![];
        let mut positions: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        for arc_index in problem.arcs_iter() {
            let arc = &problem[arc_index];
            let pair = (arc.source_cluster().0, arc.destination_cluster().0);
            match positions.get(&pair) {
                Some(&group) => groups[group].push(arc_index),
                None => {
                    positions.insert(pair, groups.len());
                    groups.push(vec![arc_index]);
                    endpoints.push(pair);
                }
            }
        }
        let representatives = vec![ArcIndex(0); groups.len()];
        Self {
            n_cluster: problem.number_clusters(),
            groups,
            endpoints,
            representatives,
            edge_groups: vec![],
            edges: vec![],
            solver: ArborescenceSolver::new(),
            selected: vec![],
        }
    }

    /// Computes the maximum-weight spanning arborescence of the collapsed
    /// cluster graph under the current tree weights. On success the selected
    /// representative arcs are available through [`Self::selected`] and the
    /// total weight is returned. Fails when some cluster is unreachable from
    /// the root, which can happen once the reduction has eliminated arcs.
    pub fn maximize(&mut self, problem: &Problem) -> Result<f64, DecodeError> {
        self.edges.clear();
        self.edge_groups.clear();
        for (group, candidates) in self.groups.iter().enumerate() {
            let mut best = candidates[0];
            let mut best_weight = problem.tree_weights[best.0];
            for &arc in candidates[1..].iter() {
                let weight = problem.tree_weights[arc.0];
                if weight > best_weight {
                    best = arc;
                    best_weight = weight;
                }
            }
            self.representatives[group] = best;
            if !best_weight.is_finite() {
                // Every arc of the pair has been eliminated
                continue;
            }
            let (source, target) = self.endpoints[group];
            // The solver minimizes: negate to maximize
            self.edges.push(Edge { source, target, weight: -best_weight });
            self.edge_groups.push(group);
        }
        let arborescence = self.solver.solve(self.n_cluster, &self.edges)?;
        self.selected.clear();
        for cluster in 1..self.n_cluster {
            let edge = arborescence.predecessor_edges[cluster - 1];
            self.selected.push(self.representatives[self.edge_groups[edge]]);
        }
        Ok(-arborescence.weight)
    }

    /// The representative arc selected for each non-root cluster at the last
    /// successful evaluation
    pub fn selected(&self) -> &[ArcIndex] {
        &self.selected
    }
}

#[cfg(test)]
mod test_cluster_tree {
    use super::*;
    use crate::core::problem::{ClusterIndex, LabelIndex, Problem};
    use assert_float_eq::assert_float_absolute_eq;

    #[test]
    fn maximum_arborescence_over_collapsed_graph() {
        let mut problem = Problem::new(3);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(2), 0, 0.0);
        problem.add_arc(LabelIndex(0), a, 15.0); // arc 0
        problem.add_arc(LabelIndex(0), b, 9.0); // arc 1
        problem.add_arc(a, b, 30.0); // arc 2
        problem.add_arc(b, a, 3.0); // arc 3
        problem.initialize();
        let mut decoder = ClusterTreeDecoder::new(&problem);
        let value = decoder.maximize(&problem).unwrap();
        // Working weights are the original thirds: 5 + 10
        assert_float_absolute_eq!(15.0, value);
        assert_eq!(vec![ArcIndex(0), ArcIndex(2)], decoder.selected());
    }

    #[test]
    fn representative_is_the_best_arc_of_the_pair() {
        let mut problem = Problem::new(2);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(1), 1, 0.0);
        problem.add_arc(LabelIndex(0), a, 3.0); // arc 0
        problem.add_arc(LabelIndex(0), b, 12.0); // arc 1
        problem.initialize();
        let mut decoder = ClusterTreeDecoder::new(&problem);
        let value = decoder.maximize(&problem).unwrap();
        assert_float_absolute_eq!(4.0, value);
        assert_eq!(vec![ArcIndex(1)], decoder.selected());
    }

    #[test]
    fn ties_keep_the_first_seen_arc() {
        let mut problem = Problem::new(2);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(1), 1, 0.0);
        problem.add_arc(LabelIndex(0), a, 6.0); // arc 0
        problem.add_arc(LabelIndex(0), b, 6.0); // arc 1
        problem.initialize();
        let mut decoder = ClusterTreeDecoder::new(&problem);
        decoder.maximize(&problem).unwrap();
        assert_eq!(vec![ArcIndex(0)], decoder.selected());
    }

    #[test]
    fn eliminated_arcs_make_clusters_unreachable() {
        let mut problem = Problem::new(2);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let arc = problem.add_arc(LabelIndex(0), a, 6.0);
        problem.initialize();
        problem.disallow_arc(arc);
        let mut decoder = ClusterTreeDecoder::new(&problem);
        let result = decoder.maximize(&problem);
        assert_eq!(Err(DecodeError::InfeasibleArborescence { node: 1 }), result);
    }
}
