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

//! This module provides the per-cluster label selection subproblem. For one
//! cluster, the value of a candidate label is its own weight, plus the best
//! incoming arc reaching it (on the incoming working copy), plus, for every
//! other cluster, the best outgoing arc towards that cluster clipped at zero
//! (an unhelpful outgoing option simply contributes nothing). The cluster
//! selects the candidate maximizing this total.
//!
//! The subproblem is independent per cluster and linear in the number of arcs
//! touching the cluster. The per-candidate values are cached between calls:
//! the reduction reads them to bound the cost of forcing another candidate.

use crate::core::problem::{ArcIndex, ClusterIndex, LabelIndex, Problem};
use rustc_hash::FxHashMap;

/// The outcome of one cluster subproblem: the winning label, its value and
/// the arcs that realized it
#[derive(Debug)]
pub struct NodeChoice<'a> {
    pub label: LabelIndex,
    pub weight: f64,
    /// Best incoming arc of the winning label, if it has any
    pub incoming: Option<ArcIndex>,
    /// Best outgoing arc of the winning label per destination cluster; `None`
    /// when the cluster has no candidate or none with a positive weight
    pub outgoing: &'a [Option<ArcIndex>],
}

/// The arcs touching one candidate label, grouped once at construction, and
/// the selection of the last evaluation
#[derive(Debug)]
pub(crate) struct LabelDecoder {
    label: LabelIndex,
    incoming: Vec<ArcIndex>,
    /// Outgoing candidates grouped by destination cluster
    outgoing: Vec<Vec<ArcIndex>>,
    selected_incoming: Option<ArcIndex>,
    selected_outgoing: Vec<Option<ArcIndex>>,
}

impl LabelDecoder {

    fn new(label: LabelIndex, n_cluster: usize) -> Self {
        Self {
            label,
            incoming: vec![],
            outgoing: vec![vec![]; n_cluster],
            selected_incoming: None,
            selected_outgoing: vec![None; n_cluster],
        }
    }

    /// Value of assigning this label to its cluster under the current working
    /// weights. Caches the arcs realizing the value.
    fn evaluate(&mut self, problem: &Problem) -> f64 {
        let mut total = problem[self.label].weight();

        self.selected_incoming = None;
        if !self.incoming.is_empty() {
            let mut best = self.incoming[0];
            let mut best_weight = problem.incoming_weights[best.0];
            for &arc in self.incoming[1..].iter() {
                let weight = problem.incoming_weights[arc.0];
                if weight > best_weight {
                    best = arc;
                    best_weight = weight;
                }
            }
            total += best_weight;
            self.selected_incoming = Some(best);
        }

        for (cluster, candidates) in self.outgoing.iter().enumerate() {
            self.selected_outgoing[cluster] = None;
            if candidates.is_empty() {
                continue;
            }
            let mut best = candidates[0];
            let mut best_weight = problem.outgoing_weights[best.0];
            for &arc in candidates[1..].iter() {
                let weight = problem.outgoing_weights[arc.0];
                if weight > best_weight {
                    best = arc;
                    best_weight = weight;
                }
            }
            // An outgoing arc need not exist: only count it when it helps
            if best_weight > 0.0 {
                total += best_weight;
                self.selected_outgoing[cluster] = Some(best);
            }
        }

        total
    }

    pub(crate) fn label(&self) -> LabelIndex {
        self.label
    }

    pub(crate) fn incoming_arcs(&self) -> &[ArcIndex] {
        &self.incoming
    }

    pub(crate) fn outgoing_arcs(&self) -> impl Iterator<Item = ArcIndex> + '_ {
        self.outgoing.iter().flatten().copied()
    }
}

/// Solves the label selection subproblem of one cluster
#[derive(Debug)]
pub struct ClusterDecoder {
    cluster: ClusterIndex,
    pub(crate) decoders: Vec<LabelDecoder>,
    /// Value of each candidate at the last evaluation, read by the reduction
    pub(crate) values: Vec<f64>,
    /// Index (into `decoders`) of the last winner
    pub(crate) best: usize,
}

impl ClusterDecoder {

    /// Builds the decoder of `cluster`, grouping the arcs touching it by
    /// candidate label and by destination cluster. Built once per problem
    /// instance and reused unchanged across iterations.
    pub fn new(cluster: ClusterIndex, problem: &Problem) -> Self {
        let n_cluster = problem.number_clusters();
        let mut decoders: Vec<LabelDecoder> = vec![];
        let mut positions: FxHashMap<LabelIndex, usize> = FxHashMap::default();
        for label in problem.labels_iter() {
            if problem[label].cluster() == cluster {
                positions.insert(label, decoders.len());
                decoders.push(LabelDecoder::new(label, n_cluster));
            }
        }
        for arc_index in problem.arcs_iter() {
            let arc = &problem[arc_index];
            if arc.destination_cluster() == cluster {
                decoders[positions[&arc.destination()]].incoming.push(arc_index);
            }
            if arc.source_cluster() == cluster {
                decoders[positions[&arc.source()]].outgoing[arc.destination_cluster().0]
                    .push(arc_index);
            }
        }
        let values = vec![f64::NEG_INFINITY; decoders.len()];
        Self { cluster, decoders, values, best: 0 }
    }

    /// Evaluates every candidate label and returns the maximizing choice
    pub fn maximize(&mut self, problem: &Problem) -> NodeChoice<'_> {
        let mut best = 0;
        let mut best_weight = self.decoders[0].evaluate(problem);
        self.values[0] = best_weight;
        for i in 1..self.decoders.len() {
            let weight = self.decoders[i].evaluate(problem);
            self.values[i] = weight;
            if weight > best_weight {
                best = i;
                best_weight = weight;
            }
        }
        self.best = best;
        let winner = &self.decoders[best];
        NodeChoice {
            label: winner.label,
            weight: best_weight,
            incoming: winner.selected_incoming,
            outgoing: &winner.selected_outgoing,
        }
    }

    pub fn cluster(&self) -> ClusterIndex {
        self.cluster
    }
}

#[cfg(test)]
mod test_node_choice {
    use super::*;
    use crate::core::problem::{ClusterIndex, LabelIndex, Problem};
    use assert_float_eq::assert_float_absolute_eq;

    /// Three clusters, two labels on cluster 1, arcs from the root and from
    /// cluster 2
    fn problem() -> Problem {
        let mut problem = Problem::new(3);
        let a = problem.add_label(ClusterIndex(1), 0, 2.0);
        let b = problem.add_label(ClusterIndex(1), 1, 1.0);
        let c = problem.add_label(ClusterIndex(2), 0, 0.0);
        problem.add_arc(LabelIndex(0), a, 3.0); // arc 0
        problem.add_arc(LabelIndex(0), b, 9.0); // arc 1
        problem.add_arc(a, c, 6.0); // arc 2
        problem.add_arc(b, c, -3.0); // arc 3
        problem.add_arc(c, a, 3.0); // arc 4
        problem.initialize();
        problem
    }

    #[test]
    fn winner_maximizes_node_incoming_and_clipped_outgoing() {
        let problem = problem();
        let mut decoder = ClusterDecoder::new(ClusterIndex(1), &problem);
        let choice = decoder.maximize(&problem);
        // Label a: 2 + 3/3 + max(0, 6/3) = 5; label b: 1 + 9/3 + max(0, -1) = 4
        assert_eq!(LabelIndex(1), choice.label);
        assert_float_absolute_eq!(5.0, choice.weight);
        assert_eq!(Some(ArcIndex(0)), choice.incoming);
        assert_eq!(Some(ArcIndex(2)), choice.outgoing[2]);
        assert_eq!(None, choice.outgoing[0]);
    }

    #[test]
    fn negative_outgoing_options_contribute_nothing() {
        let mut problem = problem();
        problem.initialize();
        let mut decoder = ClusterDecoder::new(ClusterIndex(2), &problem);
        let choice = decoder.maximize(&problem);
        // Label c: 0 + max(6/3, -1) + max(0, 3/3) = 2 + 1
        assert_float_absolute_eq!(3.0, choice.weight);
        assert_eq!(Some(ArcIndex(2)), choice.incoming);
        assert_eq!(Some(ArcIndex(4)), choice.outgoing[1]);
    }

    #[test]
    fn candidate_values_are_cached_for_the_reduction() {
        let problem = problem();
        let mut decoder = ClusterDecoder::new(ClusterIndex(1), &problem);
        decoder.maximize(&problem);
        assert_eq!(0, decoder.best);
        assert_float_absolute_eq!(5.0, decoder.values[0]);
        assert_float_absolute_eq!(4.0, decoder.values[1]);
    }

    #[test]
    fn root_cluster_only_scores_outgoing_arcs() {
        let problem = problem();
        let mut decoder = ClusterDecoder::new(ClusterIndex(0), &problem);
        let choice = decoder.maximize(&problem);
        // Root label: 0 + max(0, 3/3, 9/3) towards cluster 1
        assert_float_absolute_eq!(3.0, choice.weight);
        assert_eq!(None, choice.incoming);
        assert_eq!(Some(ArcIndex(1)), choice.outgoing[1]);
    }
}
