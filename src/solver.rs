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

//! This module provides the decode loop tying everything together. Each
//! iteration evaluates the dual bound, recovers a feasible solution from the
//! current label guess when it changed, tightens the bounds, reduces the
//! problem and takes one projected subgradient step. The loop stops on
//! convergence (matching bounds or an agreeing subgradient), on an exhausted
//! iteration or time budget, or when the reduction leaves a forced outcome.

use crate::common::{Solution, nearly_equal, nearly_zero, strictly_greater};
use crate::core::problem::{ArcIndex, LabelIndex, Problem};
use crate::decoders::dual::DualDecoder;
use crate::decoders::primal::PrimalDecoder;
use crate::reduction::{propagate_unreachable, reduce};
use crate::statistics::Statistics;
use crate::subgradient::{StepsizeOptions, Subgradient};
use std::time::Instant;

/// Parameters of one decode run
#[derive(Debug, Clone, Copy)]
pub struct DecoderParameters {
    /// Maximum number of dual iterations
    pub max_iteration: usize,
    /// Wall clock budget, in seconds
    pub timeout: u64,
    /// Eliminate labels and arcs certified non-optimal by the bounds
    pub use_reduction: bool,
    /// Stepsize policy of the subgradient ascent
    pub stepsize: StepsizeOptions,
}

impl Default for DecoderParameters {
    fn default() -> Self {
        Self {
            max_iteration: 500,
            timeout: u64::MAX,
            use_reduction: true,
            stepsize: StepsizeOptions::default(),
        }
    }
}

/// The main decoder of the crate, parametrized on whether to collect
/// statistics during the decoding
pub struct Decoder<const S: bool> {
    problem: Problem,
    parameters: DecoderParameters,
    statistics: Statistics<S>,
}

impl<const S: bool> Decoder<S> {

    pub fn new(mut problem: Problem, parameters: DecoderParameters) -> Self {
        problem.initialize();
        Self {
            problem,
            parameters,
            statistics: Statistics::default(),
        }
    }

    /// Runs the decode loop until convergence or budget exhaustion. Always
    /// returns a solution: when no certified optimum was reached within the
    /// budget the best committed solution is reported, or a best-effort
    /// selection when none was ever committed.
    pub fn decode(mut self) -> Solution {
        let start = Instant::now();
        let mut dual_decoder = DualDecoder::new(&self.problem);
        let mut primal_decoder = PrimalDecoder::new();
        let mut subgradient =
            Subgradient::new(self.parameters.stepsize, self.problem.number_arcs());
        // Labels that no arc can reach are never part of a spanning tree,
        // whether or not the bound-based reduction runs afterwards
        propagate_unreachable(&mut self.problem, &dual_decoder);

        let mut converged = false;
        let mut previous_value = f64::INFINITY;
        let mut iterations = 0;
        for iteration in 0..self.parameters.max_iteration {
            if start.elapsed().as_secs() >= self.parameters.timeout {
                break;
            }
            iterations = iteration + 1;
            subgradient.new_iteration();

            let outcome = match dual_decoder.maximize(&mut self.problem, &mut subgradient) {
                Ok(outcome) => outcome,
                // The cluster graph no longer spans every cluster; the best
                // committed solution stands but cannot be certified
                Err(_) => break,
            };

            if subgradient.is_null() {
                // The three subproblems agree: the relaxation is tight and
                // the agreed selection is an optimal feasible solution
                self.problem.primal_weight = outcome.value;
                self.problem.dual_weight = outcome.value;
                self.problem.primal_from_gradient(subgradient.tree_gradient());
                converged = true;
                self.record_iteration(0);
                break;
            }

            if iteration > 0 && strictly_greater(outcome.value, previous_value) {
                subgradient.dual_has_increased();
            }
            previous_value = outcome.value;

            if iteration == 0 || outcome.selection_changed {
                let improved = primal_decoder.update(&mut self.problem);
                self.statistics.primal_update(improved);
            }
            if outcome.value < self.problem.dual_weight {
                self.problem.dual_weight = outcome.value;
            }
            if self.problem.primal_weight.is_finite()
                && nearly_equal(self.problem.primal_weight, self.problem.dual_weight)
            {
                converged = true;
                self.record_iteration(0);
                break;
            }

            if self.parameters.use_reduction {
                let before = self.problem.count_allowed_labels();
                if reduce(&mut self.problem, &dual_decoder, outcome.value) {
                    self.statistics
                        .eliminated_labels(before - self.problem.count_allowed_labels());
                    if self.problem.count_allowed_labels() == self.problem.number_clusters() {
                        // One label left per cluster: the assignment is forced
                        // and only the tree remains to be computed
                        self.force_remaining_assignment();
                        primal_decoder.update(&mut self.problem);
                        converged = self.problem.primal_weight.is_finite();
                        self.record_iteration(0);
                        break;
                    }
                    if self.problem.count_allowed_arcs()
                        == self.problem.number_clusters() - 1
                    {
                        // The remaining arcs are the only possible tree: score
                        // the selection they induce and stop
                        self.select_remaining_arcs();
                        primal_decoder.update(&mut self.problem);
                        converged = self.problem.primal_weight.is_finite();
                        self.record_iteration(0);
                        break;
                    }
                }
            }

            // The last allowed iteration takes no step
            let nb_wrong = if iteration + 1 < self.parameters.max_iteration {
                subgradient.update(&mut self.problem)
            } else {
                0
            };
            self.record_iteration(nb_wrong);
        }

        self.statistics.print();
        self.solution(converged, iterations, &subgradient)
    }

    fn record_iteration(&mut self, nb_wrong: usize) {
        self.statistics.iteration(
            self.problem.primal_weight,
            self.problem.dual_weight,
            nb_wrong,
            self.problem.count_allowed_labels(),
            self.problem.count_allowed_arcs(),
        );
    }

    /// Points the selection of each cluster to its single remaining label
    fn force_remaining_assignment(&mut self) {
        for label in self.problem.labels_iter() {
            let cluster = self.problem[label].cluster();
            if cluster.0 != 0 && self.problem.allowed_labels[label.0] {
                self.problem.selected_labels[cluster.0] = label;
            }
        }
    }

    /// Points the selection of each cluster to the destination label of the
    /// remaining arc reaching it
    fn select_remaining_arcs(&mut self) {
        for arc_index in self.problem.arcs_iter() {
            if self.problem.allowed_arcs[arc_index.0] {
                let destination = self.problem[arc_index].destination();
                let cluster = self.problem[arc_index].destination_cluster();
                self.problem.selected_labels[cluster.0] = destination;
            }
        }
    }

    fn solution(&self, converged: bool, iterations: usize, subgradient: &Subgradient) -> Solution {
        if self.problem.primal_weight.is_finite() {
            let arcs: Vec<ArcIndex> = self
                .problem
                .arcs_iter()
                .filter(|arc| self.problem.primal_arcs[arc.0])
                .collect();
            let mut labels = vec![LabelIndex(0); self.problem.number_clusters()];
            for &arc in arcs.iter() {
                labels[self.problem[arc].destination_cluster().0] =
                    self.problem[arc].destination();
            }
            Solution::new(converged, self.problem.primal_weight, labels, arcs, iterations)
        } else {
            // Nothing feasible was found: report the last tree subproblem
            // selection and label guess as a best effort
            let arcs: Vec<ArcIndex> = self
                .problem
                .arcs_iter()
                .filter(|arc| !nearly_zero(subgradient.tree_gradient()[arc.0]))
                .collect();
            Solution::new(
                false,
                self.problem.primal_weight,
                self.problem.selected_labels.clone(),
                arcs,
                iterations,
            )
        }
    }
}
