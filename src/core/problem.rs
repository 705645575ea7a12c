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

//! This module provides the representation of a decoding problem. A problem is
//! a set of clusters (token positions, cluster 0 being the virtual root), a
//! set of candidate labels per cluster and a set of candidate labeled arcs
//! between (cluster, label) pairs.
//!
//! The `Problem` structure is the single owner of the label/arc arrays and of
//! all the state mutated during the decoding: the three working copies of the
//! arc weights, the allowed masks driven by the reduction, the current label
//! selection and the committed primal solution. The decoder helpers borrow it
//! and only build derived index structures of their own.

use crate::common::nearly_equal;

/// Abstraction used as a typesafe way of identifying a cluster of the `Problem` structure
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ClusterIndex(pub usize);

/// Abstraction used as a typesafe way of retrieving a `Label` in the `Problem` structure
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LabelIndex(pub usize);

/// Abstraction used as a typesafe way of retrieving an `Arc` in the `Problem` structure
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ArcIndex(pub usize);

/// A candidate label (tag) for one cluster
#[derive(Debug, Clone)]
pub struct Label {
    /// The cluster this label is a candidate for
    cluster: ClusterIndex,
    /// Caller-side identifier of the tag/category
    code: usize,
    /// Score of assigning this label to its cluster. Set to `-inf` when the
    /// label is eliminated by the reduction, never otherwise mutated.
    weight: f64,
}

impl Label {
    pub fn cluster(&self) -> ClusterIndex {
        self.cluster
    }

    pub fn code(&self) -> usize {
        self.code
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// A candidate directed labeled dependency edge between two (cluster, label) pairs
#[derive(Debug, Clone)]
pub struct Arc {
    source: LabelIndex,
    destination: LabelIndex,
    source_cluster: ClusterIndex,
    destination_cluster: ClusterIndex,
}

impl Arc {
    pub fn source(&self) -> LabelIndex {
        self.source
    }

    pub fn destination(&self) -> LabelIndex {
        self.destination
    }

    pub fn source_cluster(&self) -> ClusterIndex {
        self.source_cluster
    }

    pub fn destination_cluster(&self) -> ClusterIndex {
        self.destination_cluster
    }
}

/// Data structure representing one decoding instance and its full mutable
/// state. Constructed once per input instance, mutated by the decode loop, and
/// read by the caller after termination.
#[derive(Debug)]
pub struct Problem {
    /// Number of clusters, including the virtual root (cluster 0)
    n_cluster: usize,
    /// Vector containing the candidate labels of the problem
    labels: Vec<Label>,
    /// Vector containing the candidate arcs of the problem
    arcs: Vec<Arc>,
    /// Immutable arc scores, as given by the scorer
    pub(crate) original_weights: Vec<f64>,
    /// Working copy of the arc scores seen by the cluster tree subproblem
    pub(crate) tree_weights: Vec<f64>,
    /// Working copy of the arc scores seen by the incoming-arc terms
    pub(crate) incoming_weights: Vec<f64>,
    /// Working copy of the arc scores seen by the outgoing-arc terms
    pub(crate) outgoing_weights: Vec<f64>,
    /// Arcs not yet eliminated by the reduction
    pub(crate) allowed_arcs: Vec<bool>,
    /// Labels not yet eliminated by the reduction
    pub(crate) allowed_labels: Vec<bool>,
    /// Arcs of the committed feasible solution
    pub(crate) primal_arcs: Vec<bool>,
    /// Current label guess, one entry per cluster
    pub(crate) selected_labels: Vec<LabelIndex>,
    /// Weight of the best certified feasible solution found so far
    pub(crate) primal_weight: f64,
    /// Tightest known upper bound on the optimum
    pub(crate) dual_weight: f64,
}

impl Problem {

    // --- PROBLEM CREATION --- //

    /// Creates a new problem over `n_cluster` clusters. The reserved label of
    /// the virtual root (cluster 0) is created here, with a null weight.
    pub fn new(n_cluster: usize) -> Self {
        assert!(n_cluster >= 1, "a problem must at least contain the root cluster");
        let mut problem = Self {
            n_cluster,
            labels: vec![],
            arcs: vec![],
            original_weights: vec![],
            tree_weights: vec![],
            incoming_weights: vec![],
            outgoing_weights: vec![],
            allowed_arcs: vec![],
            allowed_labels: vec![],
            primal_arcs: vec![],
            selected_labels: vec![],
            primal_weight: f64::NEG_INFINITY,
            dual_weight: f64::INFINITY,
        };
        problem.labels.push(Label {
            cluster: ClusterIndex(0),
            code: 0,
            weight: 0.0,
        });
        problem
    }

    /// Adds a candidate label for a non-root cluster
    pub fn add_label(&mut self, cluster: ClusterIndex, code: usize, weight: f64) -> LabelIndex {
        assert!(
            0 < cluster.0 && cluster.0 < self.n_cluster,
            "labels can only be added to non-root clusters of the problem"
        );
        let index = LabelIndex(self.labels.len());
        self.labels.push(Label { cluster, code, weight });
        index
    }

    /// Adds a candidate arc between two previously added labels
    pub fn add_arc(&mut self, source: LabelIndex, destination: LabelIndex, weight: f64) -> ArcIndex {
        let source_cluster = self[source].cluster;
        let destination_cluster = self[destination].cluster;
        debug_assert!(destination_cluster.0 != 0, "the root cluster cannot receive an arc");
        debug_assert!(source_cluster != destination_cluster, "self arcs are not allowed");
        let index = ArcIndex(self.arcs.len());
        self.arcs.push(Arc {
            source,
            destination,
            source_cluster,
            destination_cluster,
        });
        self.original_weights.push(weight);
        index
    }

    /// Resets the decoding state: splits every arc score into three equal
    /// working copies, re-allows every label and arc and clears the bounds.
    /// Called once before the decode loop starts.
    pub(crate) fn initialize(&mut self) {
        let n_arc = self.arcs.len();
        self.tree_weights.clear();
        self.incoming_weights.clear();
        self.outgoing_weights.clear();
        self.tree_weights.reserve(n_arc);
        self.incoming_weights.reserve(n_arc);
        self.outgoing_weights.reserve(n_arc);
        for &weight in self.original_weights.iter() {
            let w = weight / 3.0;
            self.tree_weights.push(w);
            self.incoming_weights.push(w);
            self.outgoing_weights.push(w);
        }
        self.allowed_arcs = vec![true; n_arc];
        self.allowed_labels = vec![true; self.labels.len()];
        self.primal_arcs = vec![false; n_arc];
        self.selected_labels = vec![LabelIndex(0); self.n_cluster];
        for label in self.labels_iter() {
            let cluster = self[label].cluster;
            if self.selected_labels[cluster.0].0 == 0 && cluster.0 != 0 {
                self.selected_labels[cluster.0] = label;
            }
        }
        for cluster in 1..self.n_cluster {
            assert!(
                self.selected_labels[cluster].0 != 0,
                "cluster {cluster} has no candidate label"
            );
        }
        self.primal_weight = f64::NEG_INFINITY;
        self.dual_weight = f64::INFINITY;
    }

    // --- REDUCTION SUPPORT --- //

    /// Permanently eliminates a label from the problem
    pub(crate) fn disallow_label(&mut self, label: LabelIndex) {
        self.allowed_labels[label.0] = false;
        self.labels[label.0].weight = f64::NEG_INFINITY;
    }

    /// Permanently eliminates an arc from the problem. The three working
    /// copies are pushed to `-inf` so that no subproblem can select it; the
    /// original weight is left untouched.
    pub(crate) fn disallow_arc(&mut self, arc: ArcIndex) {
        self.allowed_arcs[arc.0] = false;
        self.tree_weights[arc.0] = f64::NEG_INFINITY;
        self.incoming_weights[arc.0] = f64::NEG_INFINITY;
        self.outgoing_weights[arc.0] = f64::NEG_INFINITY;
    }

    pub fn count_allowed_labels(&self) -> usize {
        self.allowed_labels.iter().filter(|&&b| b).count()
    }

    pub fn count_allowed_arcs(&self) -> usize {
        self.allowed_arcs.iter().filter(|&&b| b).count()
    }

    // --- PRIMAL SOLUTION --- //

    pub(crate) fn erase_primal_solution(&mut self) {
        self.primal_arcs.iter_mut().for_each(|b| *b = false);
    }

    /// Derives the committed arc set from an agreed subgradient: any arc whose
    /// tree gradient is ≈1 is part of the solution
    pub(crate) fn primal_from_gradient(&mut self, gradient: &[f64]) {
        self.erase_primal_solution();
        for (i, &g) in gradient.iter().enumerate() {
            if nearly_equal(g, 1.0) {
                self.primal_arcs[i] = true;
            }
        }
    }

    /// Weight of the best committed feasible solution, `-inf` while none exists
    pub fn primal_weight(&self) -> f64 {
        self.primal_weight
    }

    /// Tightest known upper bound on the optimum, `+inf` before the first iteration
    pub fn dual_weight(&self) -> f64 {
        self.dual_weight
    }

    // --- GETTERS / ITERATORS --- //

    pub fn number_clusters(&self) -> usize {
        self.n_cluster
    }

    pub fn number_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn number_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn labels_iter(&self) -> impl Iterator<Item = LabelIndex> + use<> {
        (0..self.labels.len()).map(LabelIndex)
    }

    pub fn arcs_iter(&self) -> impl Iterator<Item = ArcIndex> + use<> {
        (0..self.arcs.len()).map(ArcIndex)
    }

    pub fn clusters_iter(&self) -> impl Iterator<Item = ClusterIndex> + use<> {
        (0..self.n_cluster).map(ClusterIndex)
    }
}

impl std::ops::Index<LabelIndex> for Problem {
    type Output = Label;

    fn index(&self, index: LabelIndex) -> &Self::Output {
        &self.labels[index.0]
    }
}

impl std::ops::Index<ArcIndex> for Problem {
    type Output = Arc;

    fn index(&self, index: ArcIndex) -> &Self::Output {
        &self.arcs[index.0]
    }
}
