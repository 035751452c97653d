//! Detector planes and the immutable plane collection.
//!
//! A plane is described by a reference point, a normal vector, its
//! thickness in radiation lengths, and the stereo angle of its measured
//! axis. Extents may be bounded separately along the measured (u) and
//! unmeasured (v) directions; an unbounded plane accepts any crossing.

use crate::material::MaterialInfo;
use crate::types::Point3;
use serde::{Deserialize, Serialize};

/// Rectangular extents in the plane's (u, v) frame; `None` = unbounded.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PlaneBounds {
    /// Extent along the measured (stereo) axis, (min, max) in mm.
    pub measured: Option<(f64, f64)>,
    /// Extent along the unmeasured axis, (min, max) in mm.
    pub unmeasured: Option<(f64, f64)>,
}

impl PlaneBounds {
    /// True when (u, v) lies inside every bounded extent.
    pub fn contains(&self, u: f64, v: f64) -> bool {
        let inside = |range: Option<(f64, f64)>, value: f64| match range {
            Some((lo, hi)) => value >= lo && value <= hi,
            None => true,
        };
        inside(self.measured, u) && inside(self.unmeasured, v)
    }
}

/// One measurement plane of the detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorPlane {
    /// Plane name, e.g. "L3a".
    pub name: String,
    /// Reference point on the plane (mm).
    pub point: Point3,
    /// Plane normal (unit vector).
    pub normal: Point3,
    /// Thickness in radiation lengths (x/X0).
    pub x_over_x0: f64,
    /// Stereo angle of the measured axis (radians).
    pub phi: f64,
    /// Extents; default is unbounded.
    pub bounds: PlaneBounds,
    /// Full material description when ionization loss matters; scattering
    /// needs only `x_over_x0`.
    pub material: Option<MaterialInfo>,
}

impl DetectorPlane {
    /// Plane orthogonal to the beam axis at the reference point.
    pub fn new(name: impl Into<String>, point: Point3, normal: Point3, x_over_x0: f64, phi: f64) -> Self {
        Self {
            name: name.into(),
            point,
            normal: normal.normalize(),
            x_over_x0,
            phi,
            bounds: PlaneBounds::default(),
            material: None,
        }
    }

    /// Convenience: z-normal plane at `z` with stereo angle `phi`.
    pub fn at_z(name: impl Into<String>, z: f64, x_over_x0: f64, phi: f64) -> Self {
        Self::new(
            name,
            Point3::new(0.0, 0.0, z),
            Point3::new(0.0, 0.0, 1.0),
            x_over_x0,
            phi,
        )
    }

    /// Restrict the plane's extents.
    pub fn with_bounds(mut self, bounds: PlaneBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Attach a full material description.
    pub fn with_material(mut self, material: MaterialInfo) -> Self {
        self.material = Some(material);
        self
    }

    /// Nominal longitudinal position (mm).
    pub fn z(&self) -> f64 {
        self.point.z
    }

    /// Measured coordinate of a point: projection onto the stereo axis.
    pub fn u(&self, p: &Point3) -> f64 {
        (p.x - self.point.x) * self.phi.cos() + (p.y - self.point.y) * self.phi.sin()
    }

    /// Unmeasured coordinate of a point.
    pub fn v(&self, p: &Point3) -> f64 {
        -(p.x - self.point.x) * self.phi.sin() + (p.y - self.point.y) * self.phi.cos()
    }

    /// Signed distance of a point from the plane surface.
    pub fn distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&(p - self.point))
    }

    /// True when the in-plane point lies inside the bounded extents.
    pub fn contains(&self, p: &Point3) -> bool {
        self.bounds.contains(self.u(p), self.v(p))
    }

    /// Material seen by a track crossing this plane, synthesized from the
    /// radiation-length thickness when no full description is attached.
    pub fn traversal_material(&self) -> MaterialInfo {
        match &self.material {
            Some(m) => m.clone(),
            None => MaterialInfo::from_radiation_lengths(self.name.clone(), self.x_over_x0, self.z()),
        }
    }
}

/// A z-sorted, immutable collection of detector planes: the geometry a fit
/// navigates for one event/run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Detector {
    planes: Vec<DetectorPlane>,
}

impl Detector {
    /// Build a detector; planes are sorted by z on construction and the
    /// collection is immutable afterwards.
    pub fn new(mut planes: Vec<DetectorPlane>) -> Self {
        planes.sort_by(|a, b| a.z().total_cmp(&b.z()));
        Self { planes }
    }

    /// Planes in ascending-z order.
    pub fn planes(&self) -> &[DetectorPlane] {
        &self.planes
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Look a plane up by name.
    pub fn plane(&self, name: &str) -> Option<&DetectorPlane> {
        self.planes.iter().find(|p| p.name == name)
    }

    /// Lowest plane z, if any planes exist.
    pub fn z_min(&self) -> Option<f64> {
        self.planes.first().map(DetectorPlane::z)
    }

    /// Highest plane z, if any planes exist.
    pub fn z_max(&self) -> Option<f64> {
        self.planes.last().map(DetectorPlane::z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn u_projection_follows_stereo_angle() {
        let plane = DetectorPlane::at_z("p", 100.0, 0.0, std::f64::consts::FRAC_PI_2);
        // phi = 90°: u measures y.
        let p = Point3::new(3.0, 4.0, 100.0);
        assert_abs_diff_eq!(plane.u(&p), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plane.v(&p), -3.0, epsilon = 1e-12);
    }

    #[test]
    fn bounds_checking() {
        let bounds = PlaneBounds {
            measured: Some((-10.0, 10.0)),
            unmeasured: None,
        };
        let plane = DetectorPlane::at_z("p", 0.0, 0.0, 0.0).with_bounds(bounds);
        assert!(plane.contains(&Point3::new(9.0, 1e6, 0.0)));
        assert!(!plane.contains(&Point3::new(11.0, 0.0, 0.0)));
    }

    #[test]
    fn detector_sorts_planes() {
        let det = Detector::new(vec![
            DetectorPlane::at_z("b", 20.0, 0.0, 0.0),
            DetectorPlane::at_z("a", 10.0, 0.0, 0.0),
            DetectorPlane::at_z("c", 30.0, 0.0, 0.0),
        ]);
        let zs: Vec<f64> = det.planes().iter().map(DetectorPlane::z).collect();
        assert_eq!(zs, vec![10.0, 20.0, 30.0]);
        assert_eq!(det.plane("b").unwrap().z(), 20.0);
        assert_eq!(det.z_min(), Some(10.0));
        assert_eq!(det.z_max(), Some(30.0));
    }
}
