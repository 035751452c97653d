//! Detector layouts and truth-track generation for test scenarios.

use fitter_core::{
    Detector, DetectorPlane, MagneticField, Rk4Extrapolator, TrackExtrapolator, TrackParam,
};

/// Equally spaced z-normal pixel planes: `n` planes starting at
/// `z_first`, separated by `spacing`, each `x_over_x0` thick.
pub fn uniform_pixel_detector(n: usize, z_first: f64, spacing: f64, x_over_x0: f64) -> Detector {
    Detector::new(
        (0..n)
            .map(|i| {
                DetectorPlane::at_z(
                    format!("P{}", i + 1),
                    z_first + i as f64 * spacing,
                    x_over_x0,
                    0.0,
                )
            })
            .collect(),
    )
}

/// Strip-doublet spectrometer layout: axial/stereo pairs at the given z
/// positions, the axial side at 90° and the stereo side tilted by
/// ±`stereo` radians in alternation, the shallow-angle doublet pattern of
/// a fixed-target silicon tracker.
pub fn stereo_strip_detector(z_pairs: &[(f64, f64)], stereo: f64, x_over_x0: f64) -> Detector {
    let axial = std::f64::consts::FRAC_PI_2;
    let mut planes = Vec::with_capacity(z_pairs.len() * 2);
    for (layer, &(z_axial, z_stereo)) in z_pairs.iter().enumerate() {
        let tilt = if layer % 2 == 0 { stereo } else { -stereo };
        planes.push(DetectorPlane::at_z(
            format!("L{}a", layer + 1),
            z_axial,
            x_over_x0,
            axial,
        ));
        planes.push(DetectorPlane::at_z(
            format!("L{}s", layer + 1),
            z_stereo,
            x_over_x0,
            axial + tilt,
        ));
    }
    Detector::new(planes)
}

/// Propagates a truth state through a field onto each detector plane
/// without material corrections: the trajectory hits are generated from.
pub struct TruthPropagator<F> {
    extrapolator: Rk4Extrapolator<F>,
}

impl<F: MagneticField> TruthPropagator<F> {
    pub fn new(field: F) -> Self {
        Self {
            extrapolator: Rk4Extrapolator::new(field),
        }
    }

    /// Truth states at every plane of the detector, in ascending-z order.
    pub fn states_at_planes(
        &self,
        truth: &TrackParam,
        detector: &Detector,
    ) -> fitter_core::Result<Vec<TrackParam>> {
        let mut current = *truth;
        let mut states = Vec::with_capacity(detector.len());
        for plane in detector.planes() {
            current = self
                .extrapolator
                .extrapolate_to_z(&current, plane.z(), None)?;
            states.push(current);
        }
        Ok(states)
    }

    /// Truth state at an arbitrary z.
    pub fn state_at(
        &self,
        truth: &TrackParam,
        z: f64,
    ) -> fitter_core::Result<TrackParam> {
        self.extrapolator.extrapolate_to_z(truth, z, None)
    }
}
