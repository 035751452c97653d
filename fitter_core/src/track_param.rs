//! Track state: position, slopes, signed inverse momentum, covariance.
//!
//! `TrackParam` is an immutable value: extrapolation, filtering and
//! smoothing each take a state by reference and return a new one, with the
//! fitter threading the values through `FitNode` records. The fifth
//! component `qp = charge / |p|` carries both charge sign and momentum.

use crate::cov::CovMatrix;
use crate::types::StateVec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Track state vector (x, y, tx, ty, qp) with covariance at longitudinal
/// position z. Lengths in mm, momentum in GeV.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackParam {
    /// Horizontal position (mm)
    pub x: f64,
    /// Vertical position (mm)
    pub y: f64,
    /// Horizontal slope dx/dz
    pub tx: f64,
    /// Vertical slope dy/dz
    pub ty: f64,
    /// Signed inverse momentum charge/|p| (1/GeV)
    pub qp: f64,
    /// Longitudinal position the state refers to (mm)
    pub z: f64,
    /// Symmetric covariance of (x, y, tx, ty, qp)
    pub cov: CovMatrix,
}

impl TrackParam {
    /// State at `z` with the given vector components and zero covariance.
    pub fn new(x: f64, y: f64, tx: f64, ty: f64, qp: f64, z: f64) -> Self {
        Self {
            x,
            y,
            tx,
            ty,
            qp,
            z,
            cov: CovMatrix::zeros(),
        }
    }

    /// Seed state for a first fit pass: the rough estimate plus an inflated
    /// diagonal covariance so the first measurements dominate.
    pub fn seed(x: f64, y: f64, tx: f64, ty: f64, qp: f64, z: f64, variance: f64) -> Self {
        Self {
            x,
            y,
            tx,
            ty,
            qp,
            z,
            cov: CovMatrix::seed(variance),
        }
    }

    /// The five state components as a vector.
    pub fn state_vector(&self) -> StateVec {
        StateVec::new(self.x, self.y, self.tx, self.ty, self.qp)
    }

    /// Replace the five state components from a vector, keeping z and cov.
    pub fn with_state_vector(mut self, state: &StateVec) -> Self {
        self.x = state[0];
        self.y = state[1];
        self.tx = state[2];
        self.ty = state[3];
        self.qp = state[4];
        self
    }

    /// |p| in GeV. Infinite for a (nonphysical) zero qp.
    pub fn momentum(&self) -> f64 {
        1.0 / self.qp.abs()
    }

    /// Charge sign inferred from qp (+1, -1, or 0).
    pub fn charge(&self) -> f64 {
        self.qp.signum()
    }

    /// Slope normalization factor sqrt(1 + tx² + ty²): path length per unit z.
    pub fn slope_norm(&self) -> f64 {
        (1.0 + self.tx * self.tx + self.ty * self.ty).sqrt()
    }

    /// Transverse momentum |p|·sqrt(tx²+ty²)/sqrt(1+tx²+ty²)... projected
    /// onto the bending (x–z) plane: p / sqrt(1 + ty²) accounts for the
    /// out-of-plane slope.
    pub fn pt_bend(&self) -> f64 {
        self.momentum() / (1.0 + self.ty * self.ty).sqrt()
    }
}

impl fmt::Display for TrackParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackParam(x={:.4}, y={:.4}, tx={:.6}, ty={:.6}, qp={:.6}, z={:.3})",
            self.x, self.y, self.tx, self.ty, self.qp, self.z
        )
    }
}
