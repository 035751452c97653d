//! Magnetic field lookup.
//!
//! A field is a pure function from a 3D position to a field vector. Regions
//! where the field is undefined return the zero vector, never an error, so
//! the integrator can step through them as straight lines.

use crate::types::FieldVec;
use serde::{Deserialize, Serialize};

/// Capability interface for a magnetic-field lookup.
pub trait MagneticField {
    /// Field vector (Bx, By, Bz) in Tesla at position (x, y, z) in mm.
    fn value(&self, x: f64, y: f64, z: f64) -> FieldVec;
}

/// Uniform field, optionally limited to `z < z_max` (zero beyond), as used
/// by analysis-magnet setups where the fringe field is ignored.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConstantField {
    pub bx: f64,
    pub by: f64,
    pub bz: f64,
    /// Field is zero at z >= z_max when set.
    pub z_max: Option<f64>,
}

impl ConstantField {
    pub fn new(bx: f64, by: f64, bz: f64) -> Self {
        Self {
            bx,
            by,
            bz,
            z_max: None,
        }
    }

    /// Restrict the field to z below `z_max`.
    pub fn with_z_max(mut self, z_max: f64) -> Self {
        self.z_max = Some(z_max);
        self
    }
}

impl MagneticField for ConstantField {
    fn value(&self, _x: f64, _y: f64, z: f64) -> FieldVec {
        match self.z_max {
            Some(z_max) if z >= z_max => FieldVec::zeros(),
            _ => FieldVec::new(self.bx, self.by, self.bz),
        }
    }
}

/// Field-free region.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ZeroField;

impl MagneticField for ZeroField {
    fn value(&self, _x: f64, _y: f64, _z: f64) -> FieldVec {
        FieldVec::zeros()
    }
}

impl<F: MagneticField + ?Sized> MagneticField for &F {
    fn value(&self, x: f64, y: f64, z: f64) -> FieldVec {
        (**self).value(x, y, z)
    }
}
