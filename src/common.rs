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

//! Tolerance constants, float comparisons and the caller-facing solution/error
//! types shared by every module of the decoder.

use crate::core::problem::{ArcIndex, LabelIndex};
use thiserror::Error;

/// Tolerance used by all floating point comparisons in the decoder
pub const TOL: f64 = 1e-9;

/// Floor under which a squared gradient norm is considered degenerate. Below
/// this value the Polyak and Camerini corrections are skipped.
pub const NORM_FLOOR: f64 = 1e-12;

pub fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b) * (a - b) <= TOL
}

pub fn nearly_zero(a: f64) -> bool {
    -TOL <= a && a <= TOL
}

/// True iff the value is, within tolerance, either 0 or 1
pub fn nearly_binary(a: f64) -> bool {
    nearly_equal(a, 0.0) || nearly_equal(a, 1.0)
}

pub fn strictly_less(a: f64, b: f64) -> bool {
    a < b && !nearly_equal(a, b)
}

pub fn strictly_greater(a: f64, b: f64) -> bool {
    a > b && !nearly_equal(a, b)
}

pub fn dot(v1: &[f64], v2: &[f64]) -> f64 {
    v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum()
}

/// The errors that can interrupt a subproblem of the decoder. They are all
/// recoverable: the decode loop always terminates with a [`Solution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A node of the cluster graph has no path from the root under the current
    /// edge set
    #[error("no arborescence spans node {node} from the root")]
    InfeasibleArborescence { node: usize },
}

/// The outcome of one decode call. It is the only caller-visible result: even
/// when the iteration budget is exhausted, a best-effort selection is
/// reported.
#[derive(Debug, Clone)]
pub struct Solution {
    converged: bool,
    primal_weight: f64,
    selected_labels: Vec<LabelIndex>,
    selected_arcs: Vec<ArcIndex>,
    iterations: usize,
}

impl Solution {
    pub fn new(
        converged: bool,
        primal_weight: f64,
        selected_labels: Vec<LabelIndex>,
        selected_arcs: Vec<ArcIndex>,
        iterations: usize,
    ) -> Self {
        Self {
            converged,
            primal_weight,
            selected_labels,
            selected_arcs,
            iterations,
        }
    }

    /// True iff the decoder certified the selection as optimal
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Weight of the committed feasible solution, `-inf` when none was found
    pub fn primal_weight(&self) -> f64 {
        self.primal_weight
    }

    /// The label assigned to each cluster, indexed by cluster id
    pub fn selected_labels(&self) -> &[LabelIndex] {
        &self.selected_labels
    }

    /// The arcs of the committed tree, or the best-effort fallback selection
    /// when no feasible solution was found within the budget
    pub fn selected_arcs(&self) -> &[ArcIndex] {
        &self.selected_arcs
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn print(&self) {
        println!("{}", self);
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Primal weight {:.8} ({}) after {} iterations, {} arcs selected",
            self.primal_weight,
            if self.converged { "certified" } else { "not certified" },
            self.iterations,
            self.selected_arcs.len()
        )
    }
}

#[cfg(test)]
mod test_comparisons {
    use super::*;

    #[test]
    fn tolerance_is_symmetric() {
        assert!(nearly_equal(1.0, 1.0 + 1e-6));
        assert!(nearly_equal(1.0 + 1e-6, 1.0));
        assert!(!nearly_equal(1.0, 1.001));
    }

    #[test]
    fn strict_comparisons_exclude_near_ties() {
        assert!(!strictly_less(1.0, 1.0 + 1e-6));
        assert!(strictly_less(1.0, 1.1));
        assert!(!strictly_greater(1.0 + 1e-6, 1.0));
        assert!(strictly_greater(1.1, 1.0));
    }

    #[test]
    fn binary_test_accepts_both_poles() {
        assert!(nearly_binary(0.0));
        assert!(nearly_binary(1.0));
        assert!(nearly_binary(1.0 - 1e-6));
        assert!(!nearly_binary(1.0 / 3.0));
        assert!(!nearly_binary(0.5));
    }
}
