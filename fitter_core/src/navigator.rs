//! Plane navigation: which planes does a step from z_start to z_target
//! cross, and in what order?
//!
//! This is a pure range query over the z-sorted plane list, not a
//! geometric ray trace. The interval is start-exclusive and target-inclusive in
//! both directions: a plane exactly at the start position was already
//! handled by the previous step; a plane exactly at the target belongs to
//! this one.

use crate::plane::{Detector, DetectorPlane};

/// Finds the ordered sub-list of planes crossed between two longitudinal
/// positions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Navigator;

impl Navigator {
    /// Planes with z in `(z_start, z_target]` (forward) or `[z_target,
    /// z_start)` (backward), in traversal order: ascending when the target
    /// is downstream of the start, descending otherwise.
    pub fn planes_between<'d>(
        &self,
        detector: &'d Detector,
        z_start: f64,
        z_target: f64,
    ) -> Vec<&'d DetectorPlane> {
        let planes = detector.planes();
        if z_target > z_start {
            // First index with z > z_start, first index with z > z_target.
            let lo = planes.partition_point(|p| p.z() <= z_start);
            let hi = planes.partition_point(|p| p.z() <= z_target);
            planes[lo..hi].iter().collect()
        } else if z_target < z_start {
            // First index with z >= z_target, first index with z >= z_start;
            // reversed for descending traversal.
            let lo = planes.partition_point(|p| p.z() < z_target);
            let hi = planes.partition_point(|p| p.z() < z_start);
            planes[lo..hi].iter().rev().collect()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::DetectorPlane;

    fn detector() -> Detector {
        let zs = [1.0, 5.0, 10.0, 11.0, 20.0, 23.0, 37.0, 40.0, 44.0, 52.0];
        Detector::new(
            zs.iter()
                .enumerate()
                .map(|(i, &z)| DetectorPlane::at_z(format!("p{i}"), z, 0.0, 0.0))
                .collect(),
        )
    }

    fn zs_of(planes: &[&DetectorPlane]) -> Vec<f64> {
        planes.iter().map(|p| p.z()).collect()
    }

    #[test]
    fn forward_query_is_ascending_half_open() {
        let det = detector();
        let nav = Navigator;
        let crossed = nav.planes_between(&det, 0.0, 41.0);
        assert_eq!(
            zs_of(&crossed),
            vec![1.0, 5.0, 10.0, 11.0, 20.0, 23.0, 37.0, 40.0]
        );
    }

    #[test]
    fn backward_query_is_descending_half_open() {
        let det = detector();
        let nav = Navigator;
        let crossed = nav.planes_between(&det, 17.0, 1.0);
        assert_eq!(zs_of(&crossed), vec![11.0, 10.0, 5.0, 1.0]);
    }

    #[test]
    fn start_plane_excluded_target_plane_included() {
        let det = detector();
        let nav = Navigator;

        // Forward: start exactly on a plane excludes it, target exactly on
        // a plane includes it.
        let crossed = nav.planes_between(&det, 10.0, 20.0);
        assert_eq!(zs_of(&crossed), vec![11.0, 20.0]);

        // Backward, same rule.
        let crossed = nav.planes_between(&det, 20.0, 10.0);
        assert_eq!(zs_of(&crossed), vec![11.0, 10.0]);
    }

    #[test]
    fn degenerate_and_empty_queries() {
        let det = detector();
        let nav = Navigator;
        assert!(nav.planes_between(&det, 20.0, 20.0).is_empty());
        assert!(nav.planes_between(&det, 60.0, 100.0).is_empty());
        assert!(nav.planes_between(&det, 0.9, 0.95).is_empty());
    }
}
