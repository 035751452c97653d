//! Two-filter Kalman smoother.
//!
//! Combines a completed downstream fit with a completed upstream fit of
//! the same hits into the minimum-variance estimate at every node. At node
//! i the downstream *filtered* state (all measurements up to and including
//! i) is combined information-form with the upstream pass's *predicted*
//! state at the same plane (all measurements after i), so the shared
//! measurement enters exactly once. At the most-downstream node the
//! downstream filtered state already carries every measurement and is the
//! smoothed estimate itself.
//!
//! The smoother performs no extrapolation; both passes must already exist.

use crate::cov::CovMatrix;
use crate::track::Track;
use crate::types::{FitError, Result};

/// Combines forward and backward fit passes node by node.
#[derive(Clone, Copy, Debug, Default)]
pub struct KalmanSmoother;

impl KalmanSmoother {
    /// Fill the smoothed states of `downstream`'s nodes from the two
    /// passes. `downstream` must have been fit with ascending hits and
    /// `upstream` with descending hits over the same hit set.
    pub fn smooth(&self, downstream: &mut Track, upstream: &Track) -> Result<()> {
        let n = downstream.nodes.len();
        if n == 0 || upstream.nodes.len() != n {
            return Err(FitError::EmptyTrack);
        }

        for i in (0..n).rev() {
            if i == n - 1 {
                // Full-information node: every measurement is already in
                // the downstream filtered state.
                let filtered = downstream.nodes[i].filtered;
                downstream.nodes[i].smoothed = Some(filtered);
                continue;
            }

            let forward = &downstream.nodes[i].filtered;
            let backward = &upstream.nodes[n - 1 - i].predicted;

            let info_f = forward
                .cov
                .to_matrix()
                .try_inverse()
                .ok_or(FitError::SingularCovariance(i))?;
            let info_b = backward
                .cov
                .to_matrix()
                .try_inverse()
                .ok_or(FitError::SingularCovariance(i))?;

            let cov_s = (info_f + info_b)
                .try_inverse()
                .ok_or(FitError::SingularCovariance(i))?;
            let state =
                cov_s * (info_f * forward.state_vector() + info_b * backward.state_vector());

            let mut smoothed = forward.with_state_vector(&state);
            smoothed.cov = CovMatrix::from_matrix(&cov_s);
            downstream.nodes[i].smoothed = Some(smoothed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::FitNode;
    use crate::track_param::TrackParam;

    fn node(par: TrackParam) -> FitNode {
        FitNode {
            predicted: par,
            filtered: par,
            smoothed: None,
            chi2: 0.0,
        }
    }

    fn diag_par(x: f64, variance: f64, z: f64) -> TrackParam {
        let mut par = TrackParam::new(x, 0.0, 0.0, 0.0, 1.0, z);
        par.cov = CovMatrix::from_variances(variance, variance, variance, variance, variance);
        par
    }

    #[test]
    fn smoothing_is_the_precision_weighted_mean() {
        // Two nodes; at node 0 the downstream filtered estimate (x=0,
        // var=1) combines with the upstream predicted estimate (x=2,
        // var=1): smoothed x = 1, var = 1/2.
        let mut down = Track::default();
        down.nodes.push(node(diag_par(0.0, 1.0, 10.0)));
        down.nodes.push(node(diag_par(0.5, 1.0, 20.0)));

        let mut up = Track::default();
        up.nodes.push(node(diag_par(9.0, 1.0, 20.0)));
        up.nodes.push(node(diag_par(2.0, 1.0, 10.0)));

        KalmanSmoother.smooth(&mut down, &up).unwrap();

        let s0 = down.nodes[0].smoothed.unwrap();
        assert!((s0.x - 1.0).abs() < 1e-12);
        assert!((s0.cov.var_x() - 0.5).abs() < 1e-12);

        // Last node: smoothed == downstream filtered.
        let s1 = down.nodes[1].smoothed.unwrap();
        assert!((s1.x - 0.5).abs() < 1e-12);
        assert!((s1.cov.var_x() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn smoothed_variance_never_exceeds_either_input() {
        let mut down = Track::default();
        down.nodes.push(node(diag_par(0.0, 2.0, 10.0)));
        down.nodes.push(node(diag_par(0.0, 2.0, 20.0)));

        let mut up = Track::default();
        up.nodes.push(node(diag_par(0.0, 8.0, 20.0)));
        up.nodes.push(node(diag_par(1.0, 8.0, 10.0)));

        KalmanSmoother.smooth(&mut down, &up).unwrap();
        let s = down.nodes[0].smoothed.unwrap();
        assert!(s.cov.var_x() <= 2.0 && s.cov.var_x() <= 8.0);
    }

    #[test]
    fn mismatched_passes_are_rejected() {
        let mut down = Track::default();
        down.nodes.push(node(diag_par(0.0, 1.0, 10.0)));
        let up = Track::default();
        assert!(KalmanSmoother.smooth(&mut down, &up).is_err());
    }
}
