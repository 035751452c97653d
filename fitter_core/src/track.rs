//! Track and per-hit fit records.
//!
//! A `Track` owns its hits (insertion order = detector traversal order
//! after sorting), the seed/fitted boundary states, and one `FitNode` per
//! hit. Nodes are created by a fit pass, populated hit by hit, consumed by
//! the smoother, and read back by callers for diagnostics.

use crate::hit::Hit;
use crate::track_param::TrackParam;
use crate::types::FitStatus;
use serde::{Deserialize, Serialize};

/// Per-hit record of a fit: predicted, filtered and (after smoothing)
/// smoothed states, plus the hit's incremental chi-square.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitNode {
    /// State extrapolated to the hit before the measurement update.
    pub predicted: TrackParam,
    /// State after the measurement update.
    pub filtered: TrackParam,
    /// Two-filter smoothed state; set by the smoother.
    pub smoothed: Option<TrackParam>,
    /// Incremental chi-square of the measurement update.
    pub chi2: f64,
}

/// One track candidate: hits, boundary states, fit records and quality.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Track {
    hits: Vec<Hit>,
    /// State at the most-upstream hit (seed before fitting; fitted by an
    /// upstream pass).
    pub param_first: TrackParam,
    /// State at the most-downstream hit (seed before fitting; fitted by a
    /// downstream pass).
    pub param_last: TrackParam,
    /// Per-hit fit records of the last successful pass.
    pub nodes: Vec<FitNode>,
    /// Total chi-square of the last successful pass.
    pub chi2: f64,
    /// Degrees of freedom: Σ measurement dimensions − 5, floored at 1.
    pub ndf: usize,
    /// Outcome of the last fit attempt.
    pub status: FitStatus,
}

impl Track {
    /// Track from hits and a seed state used for both boundary slots.
    pub fn new(hits: Vec<Hit>, seed: TrackParam) -> Self {
        Self {
            hits,
            param_first: seed,
            param_last: seed,
            ..Default::default()
        }
    }

    pub fn add_hit(&mut self, hit: Hit) {
        self.hits.push(hit);
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn n_hits(&self) -> usize {
        self.hits.len()
    }

    /// Sort hits along z in the given traversal direction.
    pub fn sort_hits(&mut self, ascending: bool) {
        if ascending {
            self.hits.sort_by(|a, b| a.z().total_cmp(&b.z()));
        } else {
            self.hits.sort_by(|a, b| b.z().total_cmp(&a.z()));
        }
    }

    /// Drop the hits at the given (sorted, unique) indices; used by the
    /// iterative fitter's outlier rejection.
    pub fn remove_hits(&mut self, indices: &[usize]) {
        let mut keep = vec![true; self.hits.len()];
        for &i in indices {
            if i < keep.len() {
                keep[i] = false;
            }
        }
        let mut it = keep.iter();
        self.hits.retain(|_| *it.next().unwrap());
    }

    /// Degrees of freedom for the current hit set.
    pub fn ndf_from_hits(&self) -> usize {
        let dims: usize = self.hits.iter().map(Hit::dimension).sum();
        dims.saturating_sub(5).max(1)
    }

    /// Sum of the node chi-squares; equal to `chi2` after a successful
    /// pass (chi-square additivity).
    pub fn node_chi2_sum(&self) -> f64 {
        self.nodes.iter().map(|n| n.chi2).sum()
    }
}
