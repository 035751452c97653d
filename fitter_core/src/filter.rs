//! Kalman measurement update.
//!
//! Gain-form updates operating directly on the packed covariance: the 2-D
//! pixel update inverts the 2×2 innovation covariance in closed form, the
//! 1-D strip update reduces to a division. Degenerate innovation
//! covariances (zero measurement variance against zero prior) are reported
//! as [`FitError::SingularInnovation`], never masked.
//!
//! The weighted-means (information-form) variants of both updates are kept
//! as an independent cross-check of the gain-form algebra; tests hold the
//! two implementations together.

use crate::cov::CovMatrix;
use crate::hit::{Hit, PixelHit};
use crate::track_param::TrackParam;
use crate::types::{FitError, Result, StateVec};
use nalgebra::Matrix5;

/// Result of one measurement update.
#[derive(Clone, Copy, Debug)]
pub struct FilteredUpdate {
    /// The filtered state at the hit.
    pub par: TrackParam,
    /// Incremental chi-square contributed by this hit.
    pub chi2: f64,
}

/// Capability interface for a per-hit state update.
pub trait TrackUpdater {
    fn update(&self, par: &TrackParam, hit: &Hit) -> Result<FilteredUpdate>;
}

/// Standard linear Kalman filter update.
#[derive(Clone, Copy, Debug, Default)]
pub struct KalmanFilter;

impl TrackUpdater for KalmanFilter {
    fn update(&self, par: &TrackParam, hit: &Hit) -> Result<FilteredUpdate> {
        match hit {
            Hit::Pixel(h) => self.update_pixel(par, h),
            Hit::Strip(h) => {
                self.update_strip(par, h.u, h.du, h.cos_phi(), h.sin_phi(), None)
            }
            Hit::DetPlaneStrip(h) => self.update_strip(
                par,
                h.u,
                h.du,
                h.cos_phi(),
                h.sin_phi(),
                Some(h),
            ),
        }
    }
}

impl KalmanFilter {
    /// 2-D pixel update with closed-form 2×2 innovation inverse.
    fn update_pixel(&self, par: &TrackParam, hit: &PixelHit) -> Result<FilteredUpdate> {
        let c = *par.cov.packed();

        let dxx = hit.dx * hit.dx;
        let dxy = hit.dxy;
        let dyy = hit.dy * hit.dy;

        let (rx, ry) = hit.residual(par);

        // Determinant of the innovation covariance S = H C Hᵗ + V.
        let det = dxx * dyy + dxx * c[5] + dyy * c[0] + c[0] * c[5]
            - dxy * dxy
            - 2.0 * dxy * c[1]
            - c[1] * c[1];
        if !(det.is_finite() && det > 0.0) {
            return Err(FitError::SingularInnovation(det));
        }

        // S⁻¹ elements.
        let s00 = (dyy + c[5]) / det;
        let s01 = -(dxy + c[1]) / det;
        let s11 = (dxx + c[0]) / det;

        // Gain K = C Hᵗ S⁻¹: rows over the five state components, columns
        // over (x, y).
        let col0 = [c[0], c[1], c[2], c[3], c[4]];
        let col1 = [c[1], c[5], c[6], c[7], c[8]];
        let mut k0 = [0.0; 5];
        let mut k1 = [0.0; 5];
        for i in 0..5 {
            k0[i] = col0[i] * s00 + col1[i] * s01;
            k1[i] = col0[i] * s01 + col1[i] * s11;
        }

        // Filtered state x' = x + K r.
        let mut state = par.state_vector();
        for i in 0..5 {
            state[i] += k0[i] * rx + k1[i] * ry;
        }

        // Filtered covariance C' = (I − K H) C, element recurrences over
        // the packed triangle.
        let mut o = c;
        o[0] -= k0[0] * c[0] + k1[0] * c[1];
        o[1] -= k0[0] * c[1] + k1[0] * c[5];
        o[2] -= k0[0] * c[2] + k1[0] * c[6];
        o[3] -= k0[0] * c[3] + k1[0] * c[7];
        o[4] -= k0[0] * c[4] + k1[0] * c[8];

        o[5] -= k1[1] * c[5] + k0[1] * c[1];
        o[6] -= k1[1] * c[6] + k0[1] * c[2];
        o[7] -= k1[1] * c[7] + k0[1] * c[3];
        o[8] -= k1[1] * c[8] + k0[1] * c[4];

        o[9] -= k0[2] * c[2] + k1[2] * c[6];
        o[10] -= k0[2] * c[3] + k1[2] * c[7];
        o[11] -= k0[2] * c[4] + k1[2] * c[8];

        o[12] -= k0[3] * c[3] + k1[3] * c[7];
        o[13] -= k0[3] * c[4] + k1[3] * c[8];

        o[14] -= k0[4] * c[4] + k1[4] * c[8];

        let mut out = par.with_state_vector(&state);
        out.cov = CovMatrix::from_packed(o);

        // Chi-square from the filtered residual against V − H C' Hᵗ.
        let (fx, fy) = hit.residual(&out);
        let norm = dxx * dyy - dxx * o[5] - dyy * o[0] + o[0] * o[5] - dxy * dxy
            + 2.0 * dxy * o[1]
            - o[1] * o[1];
        if !(norm.is_finite() && norm > 0.0) {
            return Err(FitError::SingularInnovation(norm));
        }
        let chi2 = ((fx * (dyy - o[5]) - fy * (dxy - o[1])) * fx
            + (-fx * (dxy - o[1]) + fy * (dxx - o[0])) * fy)
            / norm;

        Ok(FilteredUpdate { par: out, chi2 })
    }

    /// 1-D strip update; the innovation covariance is a scalar. The
    /// det-plane variant predicts u through the owning plane.
    fn update_strip(
        &self,
        par: &TrackParam,
        u: f64,
        du: f64,
        cos_phi: f64,
        sin_phi: f64,
        plane_hit: Option<&crate::hit::DetPlaneStripHit>,
    ) -> Result<FilteredUpdate> {
        let c = *par.cov.packed();

        let duu = du * du;
        let cos_sq = cos_phi * cos_phi;
        let sin_sq = sin_phi * sin_phi;
        let two_sin_cos = 2.0 * cos_phi * sin_phi;

        let s = duu + c[0] * cos_sq + two_sin_cos * c[1] + c[5] * sin_sq;
        if !(s.is_finite() && s > 0.0) {
            return Err(FitError::SingularInnovation(s));
        }
        let s_inv = 1.0 / s;

        // Gain K = C Hᵗ / S with H = (cosφ, sinφ, 0, 0, 0).
        let k = [
            c[0] * cos_phi + c[1] * sin_phi,
            c[1] * cos_phi + c[5] * sin_phi,
            c[2] * cos_phi + c[6] * sin_phi,
            c[3] * cos_phi + c[7] * sin_phi,
            c[4] * cos_phi + c[8] * sin_phi,
        ];
        let kr = k.map(|ki| ki * s_inv);

        // Residual of the prediction; a plane-owned hit predicts through
        // the plane transform so offsets are honored.
        let r = match plane_hit {
            Some(h) => h.residual(par),
            None => u - (par.x * cos_phi + par.y * sin_phi),
        };

        let mut state = par.state_vector();
        for i in 0..5 {
            state[i] += kr[i] * r;
        }

        let mut o = [0.0; 15];
        o[0] = c[0] - kr[0] * k[0];
        o[1] = c[1] - kr[0] * k[1];
        o[2] = c[2] - kr[0] * k[2];
        o[3] = c[3] - kr[0] * k[3];
        o[4] = c[4] - kr[0] * k[4];

        o[5] = c[5] - kr[1] * k[1];
        o[6] = c[6] - kr[1] * k[2];
        o[7] = c[7] - kr[1] * k[3];
        o[8] = c[8] - kr[1] * k[4];

        o[9] = c[9] - kr[2] * k[2];
        o[10] = c[10] - kr[2] * k[3];
        o[11] = c[11] - kr[2] * k[4];

        o[12] = c[12] - kr[3] * k[3];
        o[13] = c[13] - kr[3] * k[4];

        o[14] = c[14] - kr[4] * k[4];

        let mut out = par.with_state_vector(&state);
        out.cov = CovMatrix::from_packed(o);

        let ru = match plane_hit {
            Some(h) => h.residual(&out),
            None => u - (out.x * cos_phi + out.y * sin_phi),
        };
        let denom = duu - cos_sq * o[0] - two_sin_cos * o[1] - sin_sq * o[5];
        if !(denom.is_finite() && denom > 0.0) {
            return Err(FitError::SingularInnovation(denom));
        }
        let chi2 = ru * ru / denom;

        Ok(FilteredUpdate { par: out, chi2 })
    }

    /// Weighted-means (information-form) update, algebraically equivalent
    /// to the gain form; kept as an independent cross-check.
    pub fn update_weighted_means(&self, par: &TrackParam, hit: &Hit) -> Result<FilteredUpdate> {
        let c_inv = par
            .cov
            .to_matrix()
            .try_inverse()
            .ok_or(FitError::SingularCovariance(0))?;

        // Accumulate Hᵗ V⁻¹ H and Hᵗ V⁻¹ z over the measurement rows.
        let mut info = c_inv;
        let mut vector = c_inv * par.state_vector();
        match hit {
            Hit::Pixel(h) => {
                let dxx = h.dx * h.dx;
                let dyy = h.dy * h.dy;
                let det = dxx * dyy - h.dxy * h.dxy;
                if !(det.is_finite() && det > 0.0) {
                    return Err(FitError::SingularInnovation(det));
                }
                let v00 = dyy / det;
                let v01 = -h.dxy / det;
                let v11 = dxx / det;
                info[(0, 0)] += v00;
                info[(0, 1)] += v01;
                info[(1, 0)] += v01;
                info[(1, 1)] += v11;
                vector[0] += v00 * h.x + v01 * h.y;
                vector[1] += v01 * h.x + v11 * h.y;
            }
            Hit::Strip(_) | Hit::DetPlaneStrip(_) => {
                let (u, duu, h_row) = strip_measurement(hit);
                if !(duu.is_finite() && duu > 0.0) {
                    return Err(FitError::SingularInnovation(duu));
                }
                for i in 0..5 {
                    for j in 0..5 {
                        info[(i, j)] += h_row[i] * h_row[j] / duu;
                    }
                    vector[i] += h_row[i] * u / duu;
                }
            }
        }

        let cov_new: Matrix5<f64> = info
            .try_inverse()
            .ok_or(FitError::SingularCovariance(0))?;
        let state = cov_new * vector;

        let mut out = par.with_state_vector(&state);
        out.cov = CovMatrix::from_matrix(&cov_new);

        // Chi-square: measurement part plus state-shift part.
        let dx = state - par.state_vector();
        let state_term = (c_inv * dx).dot(&dx);
        let meas_term = match hit {
            Hit::Pixel(h) => {
                let dxx = h.dx * h.dx;
                let dyy = h.dy * h.dy;
                let det = dxx * dyy - h.dxy * h.dxy;
                let (rx, ry) = h.residual(&out);
                ((rx * dyy - ry * h.dxy) * rx + (-rx * h.dxy + ry * dxx) * ry) / det
            }
            Hit::Strip(_) | Hit::DetPlaneStrip(_) => {
                let (u, duu, h_row) = strip_measurement(hit);
                let predicted: f64 = (0..5).map(|i| h_row[i] * state[i]).sum();
                let zeta = u - predicted;
                zeta * zeta / duu
            }
        };

        Ok(FilteredUpdate {
            par: out,
            chi2: meas_term + state_term,
        })
    }
}

/// Effective 1-D measurement (u, du², H row) of a strip-like hit. The
/// plane-owned variant folds its reference-point offset into u so the
/// linear row stays exact.
fn strip_measurement(hit: &Hit) -> (f64, f64, StateVec) {
    match hit {
        Hit::Strip(h) => (
            h.u,
            h.du * h.du,
            StateVec::new(h.cos_phi(), h.sin_phi(), 0.0, 0.0, 0.0),
        ),
        Hit::DetPlaneStrip(h) => {
            let offset =
                h.plane.point.x * h.cos_phi() + h.plane.point.y * h.sin_phi();
            (
                h.u + offset,
                h.du * h.du,
                StateVec::new(h.cos_phi(), h.sin_phi(), 0.0, 0.0, 0.0),
            )
        }
        Hit::Pixel(_) => unreachable!("pixel hits are not 1-D measurements"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::StripHit;
    use approx::assert_abs_diff_eq;

    fn prior() -> TrackParam {
        let mut par = TrackParam::new(0.0, 0.0, 0.0, 0.0, 1.0, 10.0);
        par.cov = CovMatrix::from_variances(4.0, 4.0, 0.01, 0.01, 0.1);
        par
    }

    #[test]
    fn strip_update_reduces_variance_to_parallel_combination() {
        let filter = KalmanFilter;
        let par = prior();
        // phi = 0: u measures x. Prior Var(x)=4, measurement σ²=1.
        let hit = Hit::Strip(StripHit::new(1.0, 1.0, 0.0, 10.0));
        let res = filter.update(&par, &hit).unwrap();

        let expected = 1.0 / (1.0 / 4.0 + 1.0 / 1.0);
        assert_abs_diff_eq!(res.par.cov.var_x(), expected, epsilon = 1e-12);
        assert!(res.par.cov.var_x() < par.cov.var_x());
        // Pull toward the measurement by the gain 4/5.
        assert_abs_diff_eq!(res.par.x, 0.8, epsilon = 1e-12);
        assert!(res.chi2 > 0.0);
    }

    #[test]
    fn pixel_update_pulls_both_coordinates() {
        let filter = KalmanFilter;
        let par = prior();
        let hit = Hit::Pixel(crate::hit::PixelHit {
            x: 1.0,
            y: -1.0,
            dx: 0.5,
            dy: 0.5,
            dxy: 0.0,
            z: 10.0,
        });
        let res = filter.update(&par, &hit).unwrap();
        assert!(res.par.x > 0.0 && res.par.x < 1.0);
        assert!(res.par.y < 0.0 && res.par.y > -1.0);
        assert!(res.par.cov.var_x() < par.cov.var_x());
        assert!(res.par.cov.var_y() < par.cov.var_y());
    }

    #[test]
    fn degenerate_variance_is_reported_not_divided() {
        let filter = KalmanFilter;
        let mut par = prior();
        par.cov = CovMatrix::zeros();
        let hit = Hit::Strip(StripHit::new(1.0, 0.0, 0.0, 10.0));
        assert!(matches!(
            filter.update(&par, &hit),
            Err(FitError::SingularInnovation(_))
        ));
    }

    #[test]
    fn gain_form_matches_weighted_means() {
        let filter = KalmanFilter;
        let mut par = prior();
        // A correlated prior to exercise the off-diagonal paths.
        par.cov.set(0, 2, 0.05);
        par.cov.set(1, 3, -0.03);

        let hits = [
            Hit::Strip(StripHit::new(0.7, 0.3, 0.4, 10.0)),
            Hit::Pixel(crate::hit::PixelHit {
                x: 0.4,
                y: 0.2,
                dx: 0.3,
                dy: 0.6,
                dxy: 0.02,
                z: 10.0,
            }),
        ];
        for hit in &hits {
            let gain = filter.update(&par, hit).unwrap();
            let wm = filter.update_weighted_means(&par, hit).unwrap();
            assert_abs_diff_eq!(gain.par.x, wm.par.x, epsilon = 1e-9);
            assert_abs_diff_eq!(gain.par.y, wm.par.y, epsilon = 1e-9);
            assert_abs_diff_eq!(gain.par.tx, wm.par.tx, epsilon = 1e-9);
            assert_abs_diff_eq!(gain.par.ty, wm.par.ty, epsilon = 1e-9);
            for i in 0..5 {
                for j in 0..5 {
                    assert_abs_diff_eq!(
                        gain.par.cov.get(i, j),
                        wm.par.cov.get(i, j),
                        epsilon = 1e-9
                    );
                }
            }
            assert_abs_diff_eq!(gain.chi2, wm.chi2, epsilon = 1e-7);
        }
    }
}
