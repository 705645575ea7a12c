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

//! Arborea is a joint structured decoder. Given a set of token clusters, a set
//! of candidate labels per cluster and scored candidate arcs between (cluster,
//! label) pairs, it jointly selects one label per cluster and a spanning
//! arborescence over the clusters, maximizing the total score of the selected
//! labels and arcs.
//!
//! The joint problem is NP-hard; the decoder relaxes it by Lagrangian
//! decomposition. Each arc score is split into three coordinated working
//! copies, one per relaxed subproblem (the cluster-level spanning tree and the
//! incoming/outgoing terms of the per-cluster label selections), and a
//! projected subgradient ascent drives the copies towards agreement. Feasible
//! solutions are recovered along the way from the label guesses, and a
//! bound-based reduction shrinks the problem as the primal/dual gap closes.
//! The decoder always terminates with a [`Solution`]; the `converged` flag
//! tells whether the selection was certified optimal.
//!
//! ```
//! use arborea::core::problem::{ClusterIndex, LabelIndex, Problem};
//!
//! let mut problem = Problem::new(3);
//! let a = problem.add_label(ClusterIndex(1), 0, 1.0);
//! let b = problem.add_label(ClusterIndex(2), 0, 1.0);
//! problem.add_arc(LabelIndex(0), a, 5.0);
//! problem.add_arc(a, b, 10.0);
//! let solution = arborea::decode(problem, arborea::DecoderParameters::default());
//! assert!(solution.converged());
//! ```

pub mod core;
mod common;
mod decoders;
mod reduction;
mod solver;
mod statistics;
mod subgradient;

use rayon::prelude::*;

pub use common::{DecodeError, Solution, TOL};
pub use solver::{Decoder, DecoderParameters};
pub use subgradient::StepsizeOptions;

use crate::core::problem::Problem;

/// Decodes one problem instance
pub fn decode(problem: Problem, parameters: DecoderParameters) -> Solution {
    let decoder: Decoder<false> = Decoder::new(problem, parameters);
    decoder.decode()
}

/// Decodes one problem instance, reporting per-iteration statistics on the
/// standard error
pub fn decode_with_statistics(problem: Problem, parameters: DecoderParameters) -> Solution {
    let decoder: Decoder<true> = Decoder::new(problem, parameters);
    decoder.decode()
}

/// Decodes a batch of independent problem instances in parallel
pub fn decode_all(problems: Vec<Problem>, parameters: DecoderParameters) -> Vec<Solution> {
    problems
        .into_par_iter()
        .map(|problem| decode(problem, parameters))
        .collect()
}
