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

//! This module provides the primal heuristic. Given the current label guess of
//! each cluster, it restricts the arc set to the arcs consistent with that
//! guess on both endpoints, computes the maximum spanning arborescence over
//! them under the original scores and commits the result when it beats the
//! best feasible solution found so far. Any outcome is a certified lower
//! bound: the labels are fixed, so the tree is feasible by construction.

use crate::common::strictly_greater;
use crate::core::problem::{ArcIndex, Problem};
use crate::decoders::arborescence::{ArborescenceSolver, Edge};

/// Recovers feasible solutions from the label guesses of the dual iterations
pub struct PrimalDecoder {
    solver: ArborescenceSolver,
    edges: Vec<Edge>,
    /// Arc behind each scratch edge, to translate the arborescence back
    arc_of_edge: Vec<ArcIndex>,
}

impl PrimalDecoder {

    pub fn new() -> Self {
        Self {
            solver: ArborescenceSolver::new(),
            edges: vec![],
            arc_of_edge: vec![],
        }
    }

    /// Attempts to improve the committed solution from the current label
    /// selection. Returns true iff a strictly better solution was committed.
    /// An unreachable cluster under the restricted arcs is not an error here:
    /// the guess simply yields no feasible tree and nothing is committed.
    pub fn update(&mut self, problem: &mut Problem) -> bool {
        let mut value = 0.0;
        for cluster in 1..problem.number_clusters() {
            value += problem[problem.selected_labels[cluster]].weight();
        }

        self.edges.clear();
        self.arc_of_edge.clear();
        for arc_index in problem.arcs_iter() {
            if !problem.allowed_arcs[arc_index.0] {
                continue;
            }
            let arc = &problem[arc_index];
            if arc.source() != problem.selected_labels[arc.source_cluster().0]
                || arc.destination() != problem.selected_labels[arc.destination_cluster().0]
            {
                continue;
            }
            self.edges.push(Edge {
                source: arc.source_cluster().0,
                target: arc.destination_cluster().0,
                weight: -problem.original_weights[arc_index.0],
            });
            self.arc_of_edge.push(arc_index);
        }

        let arborescence = match self.solver.solve(problem.number_clusters(), &self.edges) {
            Ok(arborescence) => arborescence,
            Err(_) => return false,
        };
        value -= arborescence.weight;

        if !strictly_greater(value, problem.primal_weight) {
            return false;
        }
        problem.primal_weight = value;
        problem.erase_primal_solution();
        for cluster in 1..problem.number_clusters() {
            let edge = arborescence.predecessor_edges[cluster - 1];
            problem.primal_arcs[self.arc_of_edge[edge].0] = true;
        }
        true
    }
}

impl Default for PrimalDecoder {
    fn default() -> Self {
        Self::new()
    }
}
