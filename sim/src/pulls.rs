//! Fit-quality accumulation over repeated fits: residual and pull
//! statistics per state component.

use fitter_core::TrackParam;
use serde::{Deserialize, Serialize};

/// Running mean/RMS accumulator.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PullStats {
    pub n: u64,
    sum: f64,
    sum_sq: f64,
}

impl PullStats {
    pub fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.sum / self.n as f64
    }

    pub fn rms(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let m = self.mean();
        (self.sum_sq / self.n as f64 - m * m).max(0.0).sqrt()
    }
}

/// Residuals and pulls of the five state components, accumulated over
/// many fitted tracks against their truth states.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FitPulls {
    pub residuals: [PullStats; 5],
    pub pulls: [PullStats; 5],
    pub chi2_over_ndf: PullStats,
}

impl FitPulls {
    /// Component labels in state-vector order.
    pub const LABELS: [&'static str; 5] = ["x", "y", "tx", "ty", "qp"];

    /// Accumulate one fitted state against the truth at the same z.
    pub fn add(&mut self, fitted: &TrackParam, truth: &TrackParam) {
        let f = fitted.state_vector();
        let t = truth.state_vector();
        for i in 0..5 {
            let residual = f[i] - t[i];
            self.residuals[i].add(residual);
            let variance = fitted.cov.get(i, i);
            if variance > 0.0 {
                self.pulls[i].add(residual / variance.sqrt());
            }
        }
    }

    /// Accumulate a fit's chi2/NDF.
    pub fn add_chi2(&mut self, chi2: f64, ndf: usize) {
        if ndf > 0 {
            self.chi2_over_ndf.add(chi2 / ndf as f64);
        }
    }
}
