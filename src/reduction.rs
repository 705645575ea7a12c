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

//! This module provides the bound-based problem reduction. For each cluster,
//! swapping the winning candidate of the last dual evaluation for another one
//! changes the dual value by the difference of their cached values; when even
//! that optimistic bound falls strictly below the committed primal weight, the
//! candidate can never be part of an optimal solution and is permanently
//! eliminated along with every arc touching it. Eliminations cascade: a label
//! left without any allowed incoming arc is unreachable and goes too.

use crate::common::strictly_less;
use crate::core::problem::Problem;
use crate::decoders::dual::DualDecoder;

/// Eliminates every candidate label that the current bounds certify as
/// non-optimal. Returns true iff at least one label was eliminated.
pub(crate) fn reduce(problem: &mut Problem, decoder: &DualDecoder, dual_value: f64) -> bool {
    if !problem.primal_weight.is_finite() {
        return false;
    }
    let mut eliminated = false;
    for cluster_decoder in decoder.cluster_decoders.iter() {
        let winner_value = cluster_decoder.values[cluster_decoder.best];
        for (i, label_decoder) in cluster_decoder.decoders.iter().enumerate() {
            let label = label_decoder.label();
            if !problem.allowed_labels[label.0] {
                continue;
            }
            let bound = dual_value - winner_value + cluster_decoder.values[i];
            if strictly_less(bound, problem.primal_weight) {
                problem.disallow_label(label);
                for &arc in label_decoder.incoming_arcs() {
                    problem.disallow_arc(arc);
                }
                for arc in label_decoder.outgoing_arcs() {
                    problem.disallow_arc(arc);
                }
                eliminated = true;
            }
        }
    }
    if eliminated {
        propagate_unreachable(problem, decoder);
    }
    eliminated
}

/// Cascades the eliminations: any non-root label whose incoming arcs are all
/// eliminated can never be reached by a spanning tree, so the label and its
/// outgoing arcs are eliminated as well, until a fixpoint is reached
pub(crate) fn propagate_unreachable(problem: &mut Problem, decoder: &DualDecoder) {
    loop {
        let mut changed = false;
        for cluster_decoder in decoder.cluster_decoders.iter() {
            if cluster_decoder.cluster().0 == 0 {
                continue;
            }
            for label_decoder in cluster_decoder.decoders.iter() {
                let label = label_decoder.label();
                if !problem.allowed_labels[label.0] {
                    continue;
                }
                let reachable = label_decoder
                    .incoming_arcs()
                    .iter()
                    .any(|arc| problem.allowed_arcs[arc.0]);
                if !reachable {
                    problem.disallow_label(label);
                    for arc in label_decoder.outgoing_arcs() {
                        problem.disallow_arc(arc);
                    }
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod test_reduction {
    use super::*;
    use crate::core::problem::{ClusterIndex, LabelIndex, Problem};
    use crate::decoders::primal::PrimalDecoder;
    use crate::subgradient::{StepsizeOptions, Subgradient};

    /// One cluster with a dominant label and a dominated one
    fn dominated() -> Problem {
        let mut problem = Problem::new(2);
        problem.add_label(ClusterIndex(1), 0, 10.0);
        problem.add_label(ClusterIndex(1), 1, 0.0);
        problem.add_arc(LabelIndex(0), LabelIndex(1), 6.0); // arc 0
        problem.add_arc(LabelIndex(0), LabelIndex(2), 9.0); // arc 1
        problem.initialize();
        problem
    }

    #[test]
    fn dominated_label_is_eliminated_with_its_arcs() {
        let mut problem = dominated();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        let mut primal = PrimalDecoder::new();
        assert!(primal.update(&mut problem));
        // Swapping the winner for the weak label caps the dual at 9, strictly
        // below the committed primal of 16
        assert!(reduce(&mut problem, &decoder, outcome.value));
        assert!(!problem.allowed_labels[2]);
        assert!(!problem.allowed_arcs[1]);
        assert!(problem.allowed_labels[1]);
        assert!(problem.allowed_arcs[0]);
    }

    #[test]
    fn nothing_happens_without_a_committed_primal() {
        let mut problem = dominated();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        assert!(!reduce(&mut problem, &decoder, outcome.value));
        assert_eq!(3, problem.count_allowed_labels());
    }

    #[test]
    fn winner_survives_its_own_bound() {
        let mut problem = dominated();
        let mut decoder = DualDecoder::new(&problem);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        let outcome = decoder.maximize(&mut problem, &mut subgradient).unwrap();
        let mut primal = PrimalDecoder::new();
        primal.update(&mut problem);
        reduce(&mut problem, &decoder, outcome.value);
        // The winner bound equals the dual value, never below the primal
        assert!(problem.allowed_labels[1]);
    }

    #[test]
    fn unreachable_labels_cascade() {
        let mut problem = Problem::new(3);
        let a = problem.add_label(ClusterIndex(1), 0, 0.0);
        let b = problem.add_label(ClusterIndex(2), 0, 0.0);
        let root_arc = problem.add_arc(LabelIndex(0), a, 3.0);
        problem.add_arc(a, b, 3.0); // arc 1
        problem.initialize();
        let decoder = DualDecoder::new(&problem);
        problem.disallow_arc(root_arc);
        propagate_unreachable(&mut problem, &decoder);
        // a loses its only incoming arc, then b loses its own through a
        assert!(!problem.allowed_labels[a.0]);
        assert!(!problem.allowed_arcs[1]);
        assert!(!problem.allowed_labels[b.0]);
    }
}
