//! Track propagation: extrapolation composed with navigation and material
//! corrections.
//!
//! The propagator is the single component the fitter talks to for moving a
//! state between hits. It asks the [`Navigator`] which planes the step
//! crosses, extrapolates segment by segment, applies [`MaterialEffects`]
//! at each traversed plane, and threads the accumulated transport matrix
//! through.

use crate::extrap::TrackExtrapolator;
use crate::material::MaterialEffects;
use crate::navigator::Navigator;
use crate::plane::{Detector, DetectorPlane};
use crate::track_param::TrackParam;
use crate::types::{FitError, ParticleHypothesis, Result, TransportMatrix};

/// Configuration of the propagation loop.
#[derive(Clone, Copy, Debug)]
pub struct PropagatorConfig {
    /// Momentum floor (GeV): reached after energy loss ⇒ the fit fails.
    pub min_momentum: f64,
    /// Skip material corrections entirely (e.g. for truth propagation).
    pub apply_material: bool,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            min_momentum: 0.010,
            apply_material: true,
        }
    }
}

/// Extrapolator + navigator + material effects composed over a detector.
#[derive(Clone, Debug)]
pub struct TrackPropagator<E> {
    extrapolator: E,
    navigator: Navigator,
    material_effects: MaterialEffects,
    pub config: PropagatorConfig,
}

impl<E: TrackExtrapolator> TrackPropagator<E> {
    pub fn new(extrapolator: E, material_effects: MaterialEffects) -> Self {
        Self {
            extrapolator,
            navigator: Navigator,
            material_effects,
            config: PropagatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PropagatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Access to the underlying extrapolator, for field-only extrapolation
    /// of fitted states to arbitrary z (no material, no navigation).
    pub fn extrapolator(&self) -> &E {
        &self.extrapolator
    }

    /// Propagate to `z_target`, crossing and correcting for every detector
    /// plane on the way. The covariance is transported; when `transport` is
    /// given, the total step Jacobian is written into it.
    pub fn propagate(
        &self,
        par: &TrackParam,
        detector: &Detector,
        z_target: f64,
        hypothesis: ParticleHypothesis,
        downstream: bool,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        let planes = self
            .navigator
            .planes_between(detector, par.z, z_target);

        let mut current = *par;
        let mut f_total = TransportMatrix::identity();

        for plane in planes {
            current = self.step_to_plane(&current, plane, hypothesis, downstream, &mut f_total)?;
        }

        // Final leg past the last crossed plane (no-op when a plane sits
        // exactly at the target z).
        if current.z != z_target {
            let mut f_step = TransportMatrix::identity();
            current = self
                .extrapolator
                .extrapolate_to_z(&current, z_target, Some(&mut f_step))?;
            f_total = f_step * f_total;
        }

        if let Some(t) = transport {
            *t = f_total;
        }
        Ok(current)
    }

    /// Propagate onto a specific plane (the hit's plane), crossing and
    /// correcting for every other plane strictly before it.
    pub fn propagate_to_plane(
        &self,
        par: &TrackParam,
        detector: &Detector,
        target: &DetectorPlane,
        hypothesis: ParticleHypothesis,
        downstream: bool,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        let mut current = *par;
        let mut f_total = TransportMatrix::identity();

        for plane in self
            .navigator
            .planes_between(detector, par.z, target.z())
        {
            if std::ptr::eq(plane, target) || plane.name == target.name {
                break;
            }
            current = self.step_to_plane(&current, plane, hypothesis, downstream, &mut f_total)?;
        }

        let mut f_step = TransportMatrix::identity();
        current =
            self.extrapolator
                .extrapolate_to_plane(&current, target, Some(&mut f_step))?;
        f_total = f_step * f_total;
        current = self.cross_material(&current, target, hypothesis, downstream)?;

        if let Some(t) = transport {
            *t = f_total;
        }
        Ok(current)
    }

    fn step_to_plane(
        &self,
        par: &TrackParam,
        plane: &DetectorPlane,
        hypothesis: ParticleHypothesis,
        downstream: bool,
        f_total: &mut TransportMatrix,
    ) -> Result<TrackParam> {
        let mut f_step = TransportMatrix::identity();
        let at_plane = self
            .extrapolator
            .extrapolate_to_z(par, plane.z(), Some(&mut f_step))?;
        *f_total = f_step * *f_total;
        self.cross_material(&at_plane, plane, hypothesis, downstream)
    }

    fn cross_material(
        &self,
        par: &TrackParam,
        plane: &DetectorPlane,
        hypothesis: ParticleHypothesis,
        downstream: bool,
    ) -> Result<TrackParam> {
        if !self.config.apply_material {
            return Ok(*par);
        }
        let corrected = self.material_effects.apply(
            par,
            &plane.traversal_material(),
            hypothesis,
            downstream,
        )?;
        let momentum = corrected.momentum();
        if momentum < self.config.min_momentum {
            return Err(FitError::MomentumTooLow {
                momentum,
                floor: self.config.min_momentum,
            });
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrap::Rk4Extrapolator;
    use crate::field::ZeroField;
    use crate::material::MaterialEffects;
    use crate::plane::DetectorPlane;
    use approx::assert_abs_diff_eq;

    fn detector(x_over_x0: f64) -> Detector {
        Detector::new(
            (1..=5)
                .map(|i| DetectorPlane::at_z(format!("p{i}"), i as f64 * 100.0, x_over_x0, 0.0))
                .collect(),
        )
    }

    fn propagator() -> TrackPropagator<Rk4Extrapolator<ZeroField>> {
        TrackPropagator::new(Rk4Extrapolator::new(ZeroField), MaterialEffects::default())
    }

    #[test]
    fn massless_detector_is_pure_extrapolation() {
        let prop = propagator();
        let det = detector(0.0);
        let par = TrackParam::new(0.0, 0.0, 0.1, -0.05, 1.0, 0.0);
        let out = prop
            .propagate(&par, &det, 450.0, ParticleHypothesis::Muon, true, None)
            .unwrap();
        assert_abs_diff_eq!(out.x, 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.y, -22.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.z, 450.0);
        assert_abs_diff_eq!(out.qp, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn crossed_planes_scatter_the_covariance() {
        let prop = propagator();
        let det = detector(0.01);
        let par = TrackParam::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let out = prop
            .propagate(&par, &det, 450.0, ParticleHypothesis::Muon, true, None)
            .unwrap();
        // Four planes crossed in (0, 450]: slope variance must have grown.
        assert!(out.cov.var_tx() > 0.0);
        assert!(out.cov.var_ty() > 0.0);
    }

    #[test]
    fn transport_matrix_spans_the_whole_step() {
        let prop = propagator();
        let det = detector(0.0);
        let par = TrackParam::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let mut f = TransportMatrix::identity();
        prop.propagate(&par, &det, 450.0, ParticleHypothesis::Muon, true, Some(&mut f))
            .unwrap();
        // Zero field: the composed Jacobian is the single straight-line one.
        assert_abs_diff_eq!(f[(0, 2)], 450.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f[(1, 3)], 450.0, epsilon = 1e-9);
    }
}
