//! Measurement models: pixel and strip hits.
//!
//! A hit exposes a residual against a track state, the projector from
//! state space to measurement space, and its measurement covariance. The
//! three concrete kinds are a sum type dispatched by pattern matching:
//! - [`PixelHit`] — 2-D (x, y) measurement with a possibly correlated
//!   covariance,
//! - [`StripHit`] — 1-D coordinate u along an axis rotated by the stereo
//!   angle phi, located by a raw z,
//! - [`DetPlaneStripHit`] — strip measurement owned by a [`DetectorPlane`],
//!   predicting u through the plane's own transform.

use crate::plane::DetectorPlane;
use crate::track_param::TrackParam;
use crate::types::{Point3, StateVec};
use serde::{Deserialize, Serialize};

/// 2-D pixel measurement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PixelHit {
    /// Measured x (mm).
    pub x: f64,
    /// Measured y (mm).
    pub y: f64,
    /// x resolution (standard deviation, mm).
    pub dx: f64,
    /// y resolution (standard deviation, mm).
    pub dy: f64,
    /// Covariance term cov(x, y) (mm²).
    pub dxy: f64,
    /// Longitudinal position of the measurement (mm).
    pub z: f64,
}

impl PixelHit {
    /// Residual (measured − predicted) in x and y.
    pub fn residual(&self, par: &TrackParam) -> (f64, f64) {
        (self.x - par.x, self.y - par.y)
    }
}

/// 1-D strip measurement at a raw z position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripHit {
    /// Measured coordinate along the stereo axis (mm).
    pub u: f64,
    /// Measurement resolution (standard deviation, mm).
    pub du: f64,
    /// Stereo angle of the measured axis (radians).
    pub phi: f64,
    cos_phi: f64,
    sin_phi: f64,
    /// Longitudinal position of the measurement (mm).
    pub z: f64,
}

impl StripHit {
    pub fn new(u: f64, du: f64, phi: f64, z: f64) -> Self {
        Self {
            u,
            du,
            phi,
            cos_phi: phi.cos(),
            sin_phi: phi.sin(),
            z,
        }
    }

    pub fn cos_phi(&self) -> f64 {
        self.cos_phi
    }

    pub fn sin_phi(&self) -> f64 {
        self.sin_phi
    }

    /// Predicted measurement h(x) = x·cosφ + y·sinφ.
    pub fn predicted(&self, par: &TrackParam) -> f64 {
        par.x * self.cos_phi + par.y * self.sin_phi
    }

    /// Residual measured − h(x).
    pub fn residual(&self, par: &TrackParam) -> f64 {
        self.u - self.predicted(par)
    }
}

/// Strip measurement owned by a detector plane; the prediction goes through
/// the plane's u transform so plane offsets are honored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetPlaneStripHit {
    /// Measured coordinate along the plane's stereo axis (mm).
    pub u: f64,
    /// Measurement resolution (standard deviation, mm).
    pub du: f64,
    /// The owning plane.
    pub plane: DetectorPlane,
}

impl DetPlaneStripHit {
    pub fn new(u: f64, du: f64, plane: DetectorPlane) -> Self {
        Self { u, du, plane }
    }

    pub fn cos_phi(&self) -> f64 {
        self.plane.phi.cos()
    }

    pub fn sin_phi(&self) -> f64 {
        self.plane.phi.sin()
    }

    /// Predicted measurement through the plane transform.
    pub fn predicted(&self, par: &TrackParam) -> f64 {
        self.plane.u(&Point3::new(par.x, par.y, self.plane.z()))
    }

    /// Residual measured − h(x).
    pub fn residual(&self, par: &TrackParam) -> f64 {
        self.u - self.predicted(par)
    }
}

/// Any measurement the filter can consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Hit {
    Pixel(PixelHit),
    Strip(StripHit),
    DetPlaneStrip(DetPlaneStripHit),
}

impl Hit {
    /// Longitudinal position; hits are ordered by this along the track.
    pub fn z(&self) -> f64 {
        match self {
            Hit::Pixel(h) => h.z,
            Hit::Strip(h) => h.z,
            Hit::DetPlaneStrip(h) => h.plane.z(),
        }
    }

    /// Measurement dimension: 2 for pixel, 1 for strips. Drives the NDF
    /// count of a fit.
    pub fn dimension(&self) -> usize {
        match self {
            Hit::Pixel(_) => 2,
            Hit::Strip(_) | Hit::DetPlaneStrip(_) => 1,
        }
    }

    /// The plane this hit belongs to, when it carries one.
    pub fn plane(&self) -> Option<&DetectorPlane> {
        match self {
            Hit::DetPlaneStrip(h) => Some(&h.plane),
            _ => None,
        }
    }

    /// Projector H as a state-space row (strips) or pair of rows (pixels),
    /// i.e. ∂h/∂(x, y, tx, ty, qp).
    pub fn projector(&self) -> Vec<StateVec> {
        match self {
            Hit::Pixel(_) => vec![
                StateVec::new(1.0, 0.0, 0.0, 0.0, 0.0),
                StateVec::new(0.0, 1.0, 0.0, 0.0, 0.0),
            ],
            Hit::Strip(h) => vec![StateVec::new(h.cos_phi(), h.sin_phi(), 0.0, 0.0, 0.0)],
            Hit::DetPlaneStrip(h) => {
                vec![StateVec::new(h.cos_phi(), h.sin_phi(), 0.0, 0.0, 0.0)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn strip_residual_projects_position() {
        let hit = StripHit::new(5.0, 0.1, 0.0, 100.0);
        let par = TrackParam::new(4.0, 100.0, 0.0, 0.0, 1.0, 100.0);
        // phi = 0: u measures x only.
        assert_abs_diff_eq!(hit.residual(&par), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn det_plane_strip_honors_plane_offset() {
        let mut plane = DetectorPlane::at_z("p", 50.0, 0.0, 0.0);
        plane.point.x = 2.0;
        let hit = DetPlaneStripHit::new(0.0, 0.1, plane);
        let par = TrackParam::new(2.0, 0.0, 0.0, 0.0, 1.0, 50.0);
        // The track sits exactly at the plane reference point: u = 0.
        assert_abs_diff_eq!(hit.residual(&par), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dimensions_and_projectors() {
        let pixel = Hit::Pixel(PixelHit {
            x: 0.0,
            y: 0.0,
            dx: 0.1,
            dy: 0.1,
            dxy: 0.0,
            z: 1.0,
        });
        let strip = Hit::Strip(StripHit::new(0.0, 0.1, 0.3, 2.0));
        assert_eq!(pixel.dimension(), 2);
        assert_eq!(strip.dimension(), 1);
        assert_eq!(pixel.projector().len(), 2);
        let h = &strip.projector()[0];
        assert_abs_diff_eq!(h[0], 0.3_f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(h[1], 0.3_f64.sin(), epsilon = 1e-12);
    }
}
