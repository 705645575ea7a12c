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

//! This module provides the minimum-weight spanning arborescence primitive
//! used by the cluster tree decoder and by the primal recovery. It implements
//! the Chu-Liu-Edmonds contraction algorithm: select the cheapest incoming
//! edge of every non-root node, contract the cycles this creates into
//! super-nodes with reduced edge weights, and recurse until the selection is
//! acyclic; the contractions are then unwound to recover the chosen edges.
//!
//! This is the single hottest subroutine of the decoder: it runs at least once
//! per subgradient iteration. The solver therefore keeps its per-contraction
//! scratch buffers alive between calls instead of reallocating them.

use crate::common::DecodeError;

const NONE: usize = usize::MAX;

/// A directed weighted edge of the graph given to the solver. Edges with a
/// non-finite weight are treated as pruned.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// A spanning arborescence rooted at node 0
#[derive(Debug, Clone, PartialEq)]
pub struct Arborescence {
    /// Sum of the weights of the selected edges
    pub weight: f64,
    /// Entry `i` is the index, in the input edge slice, of the incoming edge
    /// selected for node `i + 1`
    pub predecessor_edges: Vec<usize>,
}

/// An edge at one contraction level. `parent` is the index of the edge it was
/// derived from at the previous level (the input slice for level 0).
#[derive(Debug, Clone, Copy)]
struct LevelEdge {
    source: usize,
    target: usize,
    weight: f64,
    parent: usize,
}

/// The state of one contraction level
#[derive(Debug, Default)]
struct Level {
    n_node: usize,
    n_comp: usize,
    edges: Vec<LevelEdge>,
    /// Cheapest incoming edge per node, `NONE` for the root
    in_edge: Vec<usize>,
    /// Component of each node after cycle detection
    comp: Vec<usize>,
    /// Nodes that belong to a contracted cycle
    node_in_cycle: Vec<bool>,
    /// A level-0 node standing for each node, used for error reporting
    repr: Vec<usize>,
    /// Visit marks of the cycle detection
    state: Vec<u8>,
}

/// Minimum-weight spanning arborescence solver with reusable internal buffers
#[derive(Debug, Default)]
pub struct ArborescenceSolver {
    levels: Vec<Level>,
    path: Vec<usize>,
    entered: Vec<bool>,
    selected: Vec<usize>,
    scratch: Vec<usize>,
}

impl ArborescenceSolver {

    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the minimum-weight arborescence rooted at node 0 of the graph
    /// on nodes `0..n_node` described by `edges`. Fails with
    /// [`DecodeError::InfeasibleArborescence`] when some node cannot be
    /// reached from the root under the (finite-weight) edge set.
    pub fn solve(&mut self, n_node: usize, edges: &[Edge]) -> Result<Arborescence, DecodeError> {
        if n_node <= 1 {
            return Ok(Arborescence { weight: 0.0, predecessor_edges: vec![] });
        }
        self.ensure_level(0);
        {
            let level = &mut self.levels[0];
            level.n_node = n_node;
            level.edges.clear();
            for (i, edge) in edges.iter().enumerate() {
                debug_assert!(edge.source < n_node && edge.target < n_node);
                if !edge.weight.is_finite() || edge.target == 0 || edge.source == edge.target {
                    continue;
                }
                level.edges.push(LevelEdge {
                    source: edge.source,
                    target: edge.target,
                    weight: edge.weight,
                    parent: i,
                });
            }
            level.repr.clear();
            level.repr.extend(0..n_node);
        }

        // Contraction phase: every pass strictly decreases the node count
        let mut deepest = 0;
        loop {
            let has_cycle = Self::select_and_detect(&mut self.levels[deepest], &mut self.path)
                .map_err(|node| DecodeError::InfeasibleArborescence { node })?;
            if !has_cycle {
                break;
            }
            self.ensure_level(deepest + 1);
            let (head, tail) = self.levels.split_at_mut(deepest + 1);
            Self::contract(&head[deepest], &mut tail[0]);
            deepest += 1;
        }

        // Expansion phase: unwind the contractions, replacing the edge
        // entering each super-node by the corresponding cycle edges
        self.selected.clear();
        {
            let level = &self.levels[deepest];
            for node in 1..level.n_node {
                self.selected.push(level.in_edge[node]);
            }
        }
        for l in (0..deepest).rev() {
            self.expand(l);
        }

        let level = &self.levels[0];
        let mut predecessor_edges = vec![NONE; n_node - 1];
        let mut weight = 0.0;
        for &ei in self.selected.iter() {
            let input_index = level.edges[ei].parent;
            let target = level.edges[ei].target;
            predecessor_edges[target - 1] = input_index;
            weight += edges[input_index].weight;
        }
        debug_assert!(predecessor_edges.iter().all(|&e| e != NONE));
        Ok(Arborescence { weight, predecessor_edges })
    }

    fn ensure_level(&mut self, l: usize) {
        while self.levels.len() <= l {
            self.levels.push(Level::default());
        }
    }

    /// Selects the cheapest incoming edge of every non-root node and assigns
    /// component ids: one per cycle of the selection, singletons otherwise
    /// (the root keeps component 0). Returns whether a cycle was found, or the
    /// representative of a node with no incoming edge.
    fn select_and_detect(level: &mut Level, path: &mut Vec<usize>) -> Result<bool, usize> {
        let n = level.n_node;
        level.in_edge.clear();
        level.in_edge.resize(n, NONE);
        for i in 0..level.edges.len() {
            let target = level.edges[i].target;
            let current = level.in_edge[target];
            if current == NONE || level.edges[i].weight < level.edges[current].weight {
                level.in_edge[target] = i;
            }
        }
        for node in 1..n {
            if level.in_edge[node] == NONE {
                return Err(level.repr[node]);
            }
        }

        level.comp.clear();
        level.comp.resize(n, NONE);
        level.node_in_cycle.clear();
        level.node_in_cycle.resize(n, false);
        level.state.clear();
        level.state.resize(n, 0);
        level.comp[0] = 0;
        level.state[0] = 2;
        let mut n_comp = 1;
        let mut has_cycle = false;
        for start in 1..n {
            if level.state[start] != 0 {
                continue;
            }
            // Walk the predecessor chain until a visited node or the root
            path.clear();
            let mut node = start;
            while level.state[node] == 0 {
                level.state[node] = 1;
                path.push(node);
                node = level.edges[level.in_edge[node]].source;
            }
            if level.state[node] == 1 {
                // The chain closed on itself: the suffix of the path is a cycle
                has_cycle = true;
                let entry = path.iter().position(|&u| u == node).unwrap();
                for &u in path[entry..].iter() {
                    level.comp[u] = n_comp;
                    level.node_in_cycle[u] = true;
                }
                n_comp += 1;
            }
            for &u in path.iter() {
                level.state[u] = 2;
            }
        }
        for node in 1..n {
            if level.comp[node] == NONE {
                level.comp[node] = n_comp;
                n_comp += 1;
            }
        }
        level.n_comp = n_comp;
        Ok(has_cycle)
    }

    /// Builds the contracted graph: one node per component, edges between
    /// distinct components with the cycle-reduced weights
    fn contract(current: &Level, next: &mut Level) {
        next.n_node = current.n_comp;
        next.edges.clear();
        next.repr.clear();
        next.repr.resize(current.n_comp, NONE);
        for node in 0..current.n_node {
            let comp = current.comp[node];
            if next.repr[comp] == NONE {
                next.repr[comp] = current.repr[node];
            }
        }
        for i in 0..current.edges.len() {
            let edge = current.edges[i];
            let source = current.comp[edge.source];
            let target = current.comp[edge.target];
            if source == target || target == 0 {
                continue;
            }
            let weight = if current.node_in_cycle[edge.target] {
                edge.weight - current.edges[current.in_edge[edge.target]].weight
            } else {
                edge.weight
            };
            next.edges.push(LevelEdge { source, target, weight, parent: i });
        }
    }

    /// Maps the selection of level `l + 1` down to level `l`: each selected
    /// edge is replaced by its parent, and each contracted cycle contributes
    /// its internal edges except the one entering at the chosen entry node
    fn expand(&mut self, l: usize) {
        self.scratch.clear();
        self.entered.clear();
        let (head, tail) = self.levels.split_at_mut(l + 1);
        let current = &head[l];
        let next = &tail[0];
        self.entered.resize(current.n_node, false);
        for &ei in self.selected.iter() {
            let parent = next.edges[ei].parent;
            let target = current.edges[parent].target;
            self.entered[target] = true;
            self.scratch.push(parent);
        }
        for node in 1..current.n_node {
            if current.node_in_cycle[node] && !self.entered[node] {
                self.scratch.push(current.in_edge[node]);
            }
        }
        std::mem::swap(&mut self.selected, &mut self.scratch);
    }
}

#[cfg(test)]
mod test_arborescence {
    use super::*;
    use assert_float_eq::assert_float_absolute_eq;

    fn edge(source: usize, target: usize, weight: f64) -> Edge {
        Edge { source, target, weight }
    }

    #[test]
    fn empty_graph_has_null_arborescence() {
        let mut solver = ArborescenceSolver::new();
        let arborescence = solver.solve(1, &[]).unwrap();
        assert_float_absolute_eq!(0.0, arborescence.weight);
        assert!(arborescence.predecessor_edges.is_empty());
    }

    #[test]
    fn chain_is_selected_entirely() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![edge(0, 1, 2.0), edge(1, 2, 3.0), edge(2, 3, 1.0)];
        let arborescence = solver.solve(4, &edges).unwrap();
        assert_float_absolute_eq!(6.0, arborescence.weight);
        assert_eq!(vec![0, 1, 2], arborescence.predecessor_edges);
    }

    #[test]
    fn cheapest_incoming_edge_wins_without_cycle() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![edge(0, 1, 5.0), edge(0, 2, 3.0), edge(1, 2, 1.0)];
        let arborescence = solver.solve(3, &edges).unwrap();
        assert_float_absolute_eq!(6.0, arborescence.weight);
        assert_eq!(vec![0, 2], arborescence.predecessor_edges);
    }

    #[test]
    fn cycle_is_contracted_and_reexpanded() {
        let mut solver = ArborescenceSolver::new();
        // The cheap 1<->2 cycle must be broken by one of the root edges
        let edges = vec![
            edge(0, 1, 5.0),
            edge(0, 2, 5.0),
            edge(1, 2, 1.0),
            edge(2, 1, 1.0),
        ];
        let arborescence = solver.solve(3, &edges).unwrap();
        assert_float_absolute_eq!(6.0, arborescence.weight);
        assert_eq!(vec![0, 2], arborescence.predecessor_edges);
    }

    #[test]
    fn nested_cycles_are_handled() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![
            edge(1, 2, 1.0),
            edge(2, 3, 1.0),
            edge(3, 1, 1.0),
            edge(0, 1, 10.0),
            edge(0, 3, 12.0),
            edge(2, 1, 0.5),
        ];
        let arborescence = solver.solve(4, &edges).unwrap();
        // Enter the cycle at node 1 and keep 1->2->3
        assert_float_absolute_eq!(12.0, arborescence.weight);
        assert_eq!(vec![3, 0, 1], arborescence.predecessor_edges);
    }

    #[test]
    fn node_without_incoming_edge_is_infeasible() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![edge(0, 1, 1.0)];
        let result = solver.solve(3, &edges);
        assert_eq!(Err(DecodeError::InfeasibleArborescence { node: 2 }), result);
    }

    #[test]
    fn unreachable_cycle_is_infeasible() {
        let mut solver = ArborescenceSolver::new();
        // 1 and 2 feed each other but nothing connects them to the root
        let edges = vec![edge(1, 2, 1.0), edge(2, 1, 1.0)];
        let result = solver.solve(3, &edges);
        assert!(matches!(result, Err(DecodeError::InfeasibleArborescence { .. })));
    }

    #[test]
    fn pruned_edges_are_ignored() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![edge(0, 1, f64::NEG_INFINITY), edge(0, 1, 4.0)];
        let arborescence = solver.solve(2, &edges).unwrap();
        assert_float_absolute_eq!(4.0, arborescence.weight);
        assert_eq!(vec![1], arborescence.predecessor_edges);
    }

    #[test]
    fn solver_can_be_reused_across_calls() {
        let mut solver = ArborescenceSolver::new();
        let edges = vec![edge(0, 1, 5.0), edge(0, 2, 5.0), edge(1, 2, 1.0), edge(2, 1, 1.0)];
        let first = solver.solve(3, &edges).unwrap();
        let second = solver.solve(3, &edges).unwrap();
        assert_float_absolute_eq!(first.weight, second.weight);
        assert_eq!(first.predecessor_edges, second.predecessor_edges);
    }
}
