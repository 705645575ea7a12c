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

//! This module provides the projected subgradient step driving the three
//! relaxed subproblems to agreement. Each arc carries three gradient counters,
//! one per subproblem; after every dual evaluation the working weight copies
//! are nudged towards the per-arc mean, which preserves their sum (the
//! correction terms are mean-centered) and therefore the split of the
//! original arc scores.
//!
//! Several stepsize policies can be composed: a base scale, a decreasing
//! divisor (per iteration, or per dual increase), the Polyak stepsize driven
//! by the primal/dual gap, and the Camerini-Fratta-Maffioli deflection that
//! mixes the previous gradient into the current one.

use crate::common::{NORM_FLOOR, dot, nearly_binary, nearly_equal, nearly_zero};
use crate::core::problem::{ArcIndex, Problem};

/// Configuration of the subgradient stepsize. The policies compose: scale,
/// then Polyak, then the decreasing divisor.
#[derive(Debug, Clone, Copy)]
pub struct StepsizeOptions {
    /// Base stepsize
    pub stepsize_scale: f64,
    /// Deflect the gradient with the previous-iteration gradient
    pub camerini: bool,
    /// Deflection strength
    pub gamma: f64,
    /// Scale the step by the primal/dual gap over the squared gradient norm
    pub polyak: bool,
    /// Relaxation of the assumed optimum in the Polyak step, at least 1
    pub polyak_wub: f64,
    /// Divide the step by a growing counter
    pub decreasing: bool,
    /// Divide by the iteration count instead of the number of dual increases
    pub constant_decreasing: bool,
}

impl Default for StepsizeOptions {
    fn default() -> Self {
        Self {
            stepsize_scale: 1.0,
            camerini: false,
            gamma: 1.5,
            polyak: false,
            polyak_wub: 1.0,
            decreasing: true,
            constant_decreasing: false,
        }
    }
}

/// The consensus gradient of the three subproblems and the state of the
/// stepsize policies
pub struct Subgradient {
    options: StepsizeOptions,
    pub(crate) gradient_tree: Vec<f64>,
    pub(crate) gradient_incoming: Vec<f64>,
    pub(crate) gradient_outgoing: Vec<f64>,
    gradient_norm: f64,
    /// Previous-iteration snapshot, allocated only under Camerini deflection
    previous_tree: Vec<f64>,
    previous_incoming: Vec<f64>,
    previous_outgoing: Vec<f64>,
    previous_norm: f64,
    iteration: isize,
    n_increasing: f64,
}

impl Subgradient {

    pub fn new(options: StepsizeOptions, n_arc: usize) -> Self {
        let snapshot = if options.camerini { n_arc } else { 0 };
        Self {
            options,
            gradient_tree: vec![0.0; n_arc],
            gradient_incoming: vec![0.0; n_arc],
            gradient_outgoing: vec![0.0; n_arc],
            gradient_norm: 0.0,
            previous_tree: vec![0.0; snapshot],
            previous_incoming: vec![0.0; snapshot],
            previous_outgoing: vec![0.0; snapshot],
            previous_norm: 0.0,
            iteration: -1,
            n_increasing: 0.0,
        }
    }

    /// Snapshots (under deflection) and clears the gradient counters
    pub fn new_iteration(&mut self) {
        self.iteration += 1;
        if self.iteration > 0 {
            if self.options.camerini {
                self.previous_norm = self.gradient_norm;
                std::mem::swap(&mut self.gradient_tree, &mut self.previous_tree);
                std::mem::swap(&mut self.gradient_incoming, &mut self.previous_incoming);
                std::mem::swap(&mut self.gradient_outgoing, &mut self.previous_outgoing);
            }
            self.gradient_tree.iter_mut().for_each(|g| *g = 0.0);
            self.gradient_incoming.iter_mut().for_each(|g| *g = 0.0);
            self.gradient_outgoing.iter_mut().for_each(|g| *g = 0.0);
        }
    }

    pub fn select_tree(&mut self, arc: ArcIndex) {
        self.gradient_tree[arc.0] += 1.0;
    }

    pub fn select_incoming(&mut self, arc: ArcIndex) {
        self.gradient_incoming[arc.0] += 1.0;
    }

    pub fn select_outgoing(&mut self, arc: ArcIndex) {
        self.gradient_outgoing[arc.0] += 1.0;
    }

    /// True iff the three subproblems agree on every arc: the consensus
    /// gradient is null and the relaxation is solved exactly
    pub fn is_null(&self) -> bool {
        self.gradient_tree
            .iter()
            .zip(self.gradient_incoming.iter())
            .zip(self.gradient_outgoing.iter())
            .all(|((&t, &i), &o)| nearly_equal(t, i) && nearly_equal(t, o))
    }

    /// Counts one dual increase, shrinking the adaptive decreasing stepsize
    pub fn dual_has_increased(&mut self) {
        self.n_increasing += 1.0;
    }

    /// The tree-subproblem gradient, used to derive a primal solution on
    /// convergence and the best-effort fallback on budget exhaustion
    pub fn tree_gradient(&self) -> &[f64] {
        &self.gradient_tree
    }

    /// Deflects the current gradient with the previous one. Skipped on the
    /// first iteration and when the previous norm is degenerate.
    fn deflect(&mut self) {
        if self.iteration == 0 || self.previous_norm <= NORM_FLOOR {
            return;
        }
        let correlation = dot(&self.gradient_tree, &self.previous_tree)
            + dot(&self.gradient_incoming, &self.previous_incoming)
            + dot(&self.gradient_outgoing, &self.previous_outgoing);
        let beta = (-self.options.gamma * correlation / self.previous_norm).max(0.0);
        if nearly_zero(beta) {
            return;
        }
        for i in 0..self.gradient_tree.len() {
            self.gradient_tree[i] += beta * self.previous_tree[i];
            self.gradient_incoming[i] += beta * self.previous_incoming[i];
            self.gradient_outgoing[i] += beta * self.previous_outgoing[i];
        }
    }

    /// Applies the consensus update to the three working weight copies and
    /// returns the number of arcs whose consensus value is not binary yet
    pub fn update(&mut self, problem: &mut Problem) -> usize {
        if self.options.camerini {
            self.deflect();
        }

        if self.options.polyak || self.options.camerini {
            self.gradient_norm = 0.0;
            for i in 0..self.gradient_tree.len() {
                self.gradient_norm += self.gradient_tree[i] * self.gradient_tree[i];
                self.gradient_norm += self.gradient_incoming[i] * self.gradient_incoming[i];
                self.gradient_norm += self.gradient_outgoing[i] * self.gradient_outgoing[i];
            }
        }

        let mut stepsize = self.options.stepsize_scale;
        if self.options.polyak {
            // Degenerate norms and infinite bounds fall back to the plain step
            if self.gradient_norm > NORM_FLOOR
                && problem.primal_weight.is_finite()
                && problem.dual_weight.is_finite()
            {
                stepsize *= (self.options.polyak_wub * problem.dual_weight - problem.primal_weight)
                    / self.gradient_norm;
            }
        }
        if self.options.decreasing {
            if self.options.constant_decreasing {
                stepsize /= 1.0 + self.iteration as f64;
            } else {
                stepsize /= 1.0 + self.n_increasing;
            }
        }

        let mut nb_wrong = 0;
        for i in 0..self.gradient_tree.len() {
            let mean =
                (self.gradient_tree[i] + self.gradient_incoming[i] + self.gradient_outgoing[i])
                    / 3.0;
            if !nearly_binary(mean) {
                nb_wrong += 1;
                problem.tree_weights[i] -= stepsize * (self.gradient_tree[i] - mean);
                problem.incoming_weights[i] -= stepsize * (self.gradient_incoming[i] - mean);
                problem.outgoing_weights[i] -= stepsize * (self.gradient_outgoing[i] - mean);
            }
        }
        nb_wrong
    }
}

#[cfg(test)]
mod test_subgradient {
    use super::*;
    use crate::core::problem::{ClusterIndex, LabelIndex, Problem};
    use assert_float_eq::assert_float_absolute_eq;

    fn problem(weights: &[f64]) -> Problem {
        let mut problem = Problem::new(weights.len() + 1);
        for (i, &w) in weights.iter().enumerate() {
            let label = problem.add_label(ClusterIndex(i + 1), 0, 0.0);
            problem.add_arc(LabelIndex(0), label, w);
        }
        problem.initialize();
        problem
    }

    #[test]
    fn update_preserves_the_weight_split() {
        let mut problem = problem(&[3.0, -6.0]);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 2);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.select_incoming(ArcIndex(0));
        subgradient.select_outgoing(ArcIndex(1));
        subgradient.update(&mut problem);
        for i in 0..2 {
            let sum = problem.tree_weights[i]
                + problem.incoming_weights[i]
                + problem.outgoing_weights[i];
            assert_float_absolute_eq!(problem.original_weights[i], sum, 1e-9);
        }
    }

    #[test]
    fn agreeing_arcs_are_left_untouched() {
        let mut problem = problem(&[3.0]);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.select_incoming(ArcIndex(0));
        subgradient.select_outgoing(ArcIndex(0));
        assert!(subgradient.is_null());
        let nb_wrong = subgradient.update(&mut problem);
        assert_eq!(0, nb_wrong);
        assert_float_absolute_eq!(1.0, problem.tree_weights[0]);
    }

    #[test]
    fn disagreeing_arcs_move_towards_the_mean() {
        let mut problem = problem(&[3.0]);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        assert!(!subgradient.is_null());
        let nb_wrong = subgradient.update(&mut problem);
        assert_eq!(1, nb_wrong);
        // mean 1/3, step 1: tree 1 - 2/3, incoming/outgoing 1 + 1/3
        assert_float_absolute_eq!(1.0 / 3.0, problem.tree_weights[0], 1e-9);
        assert_float_absolute_eq!(4.0 / 3.0, problem.incoming_weights[0], 1e-9);
        assert_float_absolute_eq!(4.0 / 3.0, problem.outgoing_weights[0], 1e-9);
    }

    #[test]
    fn adaptive_decreasing_shrinks_with_dual_increases() {
        let mut problem = problem(&[3.0]);
        let mut subgradient = Subgradient::new(StepsizeOptions::default(), 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.dual_has_increased();
        subgradient.update(&mut problem);
        // step 1/2: tree 1 - 1/3
        assert_float_absolute_eq!(2.0 / 3.0, problem.tree_weights[0], 1e-9);
    }

    #[test]
    fn polyak_with_infinite_primal_falls_back_to_plain_step() {
        let mut problem = problem(&[3.0]);
        let options = StepsizeOptions { polyak: true, decreasing: false, ..Default::default() };
        let mut subgradient = Subgradient::new(options, 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.update(&mut problem);
        assert_float_absolute_eq!(1.0 / 3.0, problem.tree_weights[0], 1e-9);
    }

    #[test]
    fn polyak_scales_with_the_gap() {
        let mut problem = problem(&[3.0]);
        problem.primal_weight = 1.0;
        problem.dual_weight = 3.0;
        let options = StepsizeOptions { polyak: true, decreasing: false, ..Default::default() };
        let mut subgradient = Subgradient::new(options, 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.update(&mut problem);
        // norm 1, gap 2: tree 1 - 2 * 2/3
        assert_float_absolute_eq!(-1.0 / 3.0, problem.tree_weights[0], 1e-9);
    }

    #[test]
    fn deflection_reuses_the_previous_direction() {
        let mut problem = problem(&[3.0]);
        let options = StepsizeOptions {
            camerini: true,
            gamma: 1.5,
            decreasing: false,
            ..Default::default()
        };
        let mut subgradient = Subgradient::new(options, 1);
        subgradient.new_iteration();
        subgradient.select_tree(ArcIndex(0));
        subgradient.update(&mut problem);
        subgradient.new_iteration();
        subgradient.select_incoming(ArcIndex(0));
        // correlation with the previous gradient is zero: beta stays 0 and
        // the update is the plain consensus step
        subgradient.update(&mut problem);
        let sum = problem.tree_weights[0]
            + problem.incoming_weights[0]
            + problem.outgoing_weights[0];
        assert_float_absolute_eq!(3.0, sum, 1e-9);
    }
}
