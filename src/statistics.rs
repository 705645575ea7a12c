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

//! This module provides the statistics collected during the decoding. The
//! structure is parametrized by a constant generic; when it is false, every
//! method has an empty body and the compiler removes the bookkeeping entirely.

/// Iteration counters of one decode run, compiled out when `B` is false
#[derive(Default)]
pub struct Statistics<const B: bool> {
    /// Number of dual iterations run
    iterations: usize,
    /// Number of times the primal heuristic improved the committed solution
    primal_updates: usize,
    /// Number of label guesses that yielded no feasible tree
    infeasible_primals: usize,
    /// Number of labels eliminated by the reduction
    eliminated_labels: usize,
}

impl<const B: bool> Statistics<B> {

    pub fn iteration(
        &mut self,
        primal_weight: f64,
        dual_weight: f64,
        nb_wrong: usize,
        allowed_labels: usize,
        allowed_arcs: usize,
    ) {
        if B {
            self.iterations += 1;
            eprintln!(
                "Iteration {} primal {:.6} dual {:.6} disagreeing arcs {} labels {} arcs {}",
                self.iterations, primal_weight, dual_weight, nb_wrong, allowed_labels, allowed_arcs
            );
        }
    }

    pub fn primal_update(&mut self, improved: bool) {
        if B {
            if improved {
                self.primal_updates += 1;
            } else {
                self.infeasible_primals += 1;
            }
        }
    }

    pub fn eliminated_labels(&mut self, count: usize) {
        if B {
            self.eliminated_labels += count;
        }
    }

    pub fn print(&self) {
        if B {
            eprintln!("{}", self);
        }
    }
}

impl<const B: bool> std::fmt::Display for Statistics<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if B {
            writeln!(f, "Iterations {}", self.iterations)?;
            writeln!(f, "Primal updates {}", self.primal_updates)?;
            writeln!(f, "Selections without feasible tree {}", self.infeasible_primals)?;
            writeln!(f, "Labels eliminated by reduction {}", self.eliminated_labels)?;
        }
        Ok(())
    }
}
