//! Packed symmetric 5×5 covariance of a track state.
//!
//! The 15 independent elements are stored row-major over the upper
//! triangle, the layout shared with external consumers of the packed form:
//!
//! ```text
//! index  0  1  2  3  4      (x,x) (x,y) (x,tx) (x,ty) (x,qp)
//!        -  5  6  7  8            (y,y) (y,tx) (y,ty) (y,qp)
//!        -  -  9 10 11                  (tx,tx)(tx,ty)(tx,qp)
//!        -  -  - 12 13                          (ty,ty)(ty,qp)
//!        -  -  -  - 14                                 (qp,qp)
//! ```
//!
//! All packing arithmetic lives here; the rest of the crate goes through
//! `get`/`set` or the named variance accessors.

use crate::types::TransportMatrix;
use nalgebra::Matrix5;
use serde::{Deserialize, Serialize};

/// Row-major upper-triangle offset of row `i`: 0, 5, 9, 12, 14.
const ROW_OFFSET: [usize; 5] = [0, 5, 9, 12, 14];

/// Packed indices of the diagonal elements.
pub const DIAG: [usize; 5] = [0, 5, 9, 12, 14];

/// Symmetric positive-semi-definite 5×5 covariance in packed form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CovMatrix {
    elems: [f64; 15],
}

impl CovMatrix {
    /// All-zero covariance.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Covariance from a raw packed 15-array (layout as documented above).
    pub fn from_packed(elems: [f64; 15]) -> Self {
        Self { elems }
    }

    /// Diagonal covariance from the five variances.
    pub fn from_variances(vx: f64, vy: f64, vtx: f64, vty: f64, vqp: f64) -> Self {
        let mut c = Self::default();
        c.elems[0] = vx;
        c.elems[5] = vy;
        c.elems[9] = vtx;
        c.elems[12] = vty;
        c.elems[14] = vqp;
        c
    }

    /// The inflated "know nothing" covariance used to seed a first fit
    /// pass: large equal variances on every component, no correlations.
    pub fn seed(variance: f64) -> Self {
        Self::from_variances(variance, variance, variance, variance, variance)
    }

    /// Raw packed elements.
    pub fn packed(&self) -> &[f64; 15] {
        &self.elems
    }

    fn idx(i: usize, j: usize) -> usize {
        let (r, c) = if i <= j { (i, j) } else { (j, i) };
        ROW_OFFSET[r] + (c - r)
    }

    /// Element (i, j); symmetric, so argument order is irrelevant.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.elems[Self::idx(i, j)]
    }

    /// Set element (i, j) (and its mirror).
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.elems[Self::idx(i, j)] = value;
    }

    /// Add `value` to element (i, j).
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        self.elems[Self::idx(i, j)] += value;
    }

    pub fn var_x(&self) -> f64 {
        self.elems[0]
    }

    pub fn var_y(&self) -> f64 {
        self.elems[5]
    }

    pub fn var_tx(&self) -> f64 {
        self.elems[9]
    }

    pub fn var_ty(&self) -> f64 {
        self.elems[12]
    }

    pub fn var_qp(&self) -> f64 {
        self.elems[14]
    }

    /// Expand to a full symmetric `Matrix5`.
    pub fn to_matrix(&self) -> Matrix5<f64> {
        Matrix5::from_fn(|i, j| self.get(i, j))
    }

    /// Pack the symmetric part of a full `Matrix5` (upper triangle read).
    pub fn from_matrix(m: &Matrix5<f64>) -> Self {
        let mut c = Self::default();
        for i in 0..5 {
            for j in i..5 {
                c.set(i, j, m[(i, j)]);
            }
        }
        c
    }

    /// Transport through a step Jacobian: `F C Fᵗ`.
    pub fn transport(&self, f: &TransportMatrix) -> Self {
        let full = f * self.to_matrix() * f.transpose();
        Self::from_matrix(&full)
    }
}
