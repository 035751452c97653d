//! Seed estimation from space points: a non-iterative circle fit in the
//! bending (z–x) plane combined with a straight-line fit in z–y.
//!
//! The circle fit is the Karimäki (1991) closed-form parameterization
//! (curvature, direction, distance of closest approach at a reference
//! point), reduced to the parts a seed needs, without error-matrix
//! propagation. The curvature converts to signed inverse momentum through
//! the bend constant and the field.

use fitter_core::{TrackParam, C_LIGHT};
use fitter_core::types::Point3;

/// Result of the circle fit, in the (a, b) fit plane.
#[derive(Clone, Copy, Debug)]
pub struct CircleFitResult {
    /// Signed curvature (1/mm), positive when the track turns toward
    /// positive b with increasing arc length.
    pub curvature: f64,
    /// Direction angle at the point of closest approach (radians, [0, 2π)).
    pub phi: f64,
    /// Signed distance of closest approach to the reference point (mm).
    pub dca: f64,
    /// Point of closest approach (a, b).
    pub pca: (f64, f64),
    /// Chi-square of the fit.
    pub chi2: f64,
}

/// Weighted non-iterative circle fit of points (a, b) with reference point
/// `(a_ref, b_ref)`. Returns `None` for degenerate inputs (fewer than 3
/// points, non-positive weight sum, collapsed geometry).
pub fn fit_circle(
    a: &[f64],
    b: &[f64],
    weights: &[f64],
    a_ref: f64,
    b_ref: f64,
) -> Option<CircleFitResult> {
    let np = a.len();
    if np < 3 || b.len() != np || weights.len() != np {
        return None;
    }

    // Local origin near the middle of the arc; the direction test below
    // uses the chord from the first point to it.
    let m3 = np / 3;
    let a0 = a[m3];
    let b0 = b[m3];
    let dir_a = a0 - a[0];
    let dir_b = b0 - b[0];

    let (mut s1, mut s2, mut s3, mut s4, mut s5) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut s6, mut s7, mut s8, mut s9) = (0.0, 0.0, 0.0, 0.0);
    for i in 0..np {
        let ac = a[i] - a0;
        let bc = b[i] - b0;
        let wt = weights[i];
        let wa = wt * ac;
        let wb = wt * bc;
        let rr = ac * ac + bc * bc;
        let wr = wt * rr;
        s1 += wt;
        s2 += wa;
        s3 += wb;
        s4 += wa * ac;
        s5 += wa * bc;
        s6 += wb * bc;
        s7 += wa * rr;
        s8 += wb * rr;
        s9 += wr * rr;
    }
    if s1 <= 0.0 {
        return None;
    }

    let s1i = 1.0 / s1;
    let sr = s4 + s6;
    let a_mean = s1i * s2;
    let b_mean = s1i * s3;
    let rr_mean = s1i * sr;
    let cov1 = s1i * (s4 - s2 * a_mean);
    let cov2 = s1i * (s5 - s2 * b_mean);
    let cov3 = s1i * (s6 - s3 * b_mean);
    let cov4 = s1i * (s7 - s2 * rr_mean);
    let cov5 = s1i * (s8 - s3 * rr_mean);
    let cov6 = s1i * (s9 - sr * rr_mean);
    if cov6 <= 0.0 {
        return None;
    }

    let y2fi = 2.0 * (cov2 * cov6 - cov4 * cov5);
    let x2fi = cov6 * (cov1 - cov3) - cov4 * cov4 + cov5 * cov5;
    let mut phi = 0.5 * y2fi.atan2(x2fi);
    let mut cos_f = phi.cos();
    let mut sin_f = phi.sin();

    let hap = (sin_f * cov4 - cos_f * cov5) / cov6;
    let del = -hap * rr_mean + sin_f * a_mean - cos_f * b_mean;
    let disc = 1.0 - 4.0 * hap * del;
    if disc <= 0.0 {
        return None;
    }
    let apu = disc.sqrt();
    let mut rho = 2.0 * hap / apu;
    let mut dca = 2.0 * del / (1.0 + apu);

    let rod2 = 1.0 / (apu * apu);
    let sin2 = sin_f * sin_f;
    let cos2 = cos_f * cos_f;
    let sincos2 = 2.0 * sin_f * cos_f;
    let sa = sin_f * s2 - cos_f * s3;
    let saa = sin2 * s4 - sincos2 * s5 + cos2 * s6;
    let sxyr = sin_f * s7 - cos_f * s8;
    let chi2 = rod2 * (-del * sa - hap * sxyr + saa);

    let mut a_pca = a0 + dca * sin_f;
    let mut b_pca = b0 - dca * cos_f;

    // Propagate the parameters to the requested reference point.
    let a_move = a_pca - a_ref;
    let b_move = b_pca - b_ref;
    let d_perp = a_move * sin_f - b_move * cos_f;
    let d_para = a_move * cos_f + b_move * sin_f;
    let zee = d_perp * d_perp + d_para * d_para;
    let aa = 2.0 * d_perp + rho * zee;
    let uu = (1.0 + rho * aa).sqrt();
    let bb = rho * a_move + sin_f;
    let cc = -rho * b_move + cos_f;
    phi = bb.atan2(cc);
    dca = aa / (1.0 + uu);

    // Orient along the direction of traversal.
    cos_f = phi.cos();
    sin_f = phi.sin();
    if cos_f * dir_a + sin_f * dir_b < 0.0 {
        phi += std::f64::consts::PI;
        cos_f = -cos_f;
        sin_f = -sin_f;
        dca = -dca;
        rho = -rho;
    }
    phi = phi.rem_euclid(2.0 * std::f64::consts::PI);
    a_pca = a_ref + dca * sin_f;
    b_pca = b_ref - dca * cos_f;

    Some(CircleFitResult {
        curvature: rho,
        phi,
        dca,
        pca: (a_pca, b_pca),
        chi2,
    })
}

/// Result of the weighted least-squares line fit b = intercept + slope·a.
#[derive(Clone, Copy, Debug)]
pub struct LineFitResult {
    pub slope: f64,
    pub intercept: f64,
    pub chi2: f64,
}

/// Weighted straight-line fit. `None` below two points or for a
/// non-positive weight sum.
pub fn fit_line(a: &[f64], b: &[f64], weights: &[f64]) -> Option<LineFitResult> {
    let np = a.len();
    if np < 2 || b.len() != np || weights.len() != np {
        return None;
    }
    let (mut sw, mut swa, mut swb, mut swaa, mut swab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for i in 0..np {
        let w = weights[i];
        sw += w;
        swa += w * a[i];
        swb += w * b[i];
        swaa += w * a[i] * a[i];
        swab += w * a[i] * b[i];
    }
    if sw <= 0.0 {
        return None;
    }
    let det = sw * swaa - swa * swa;
    if det.abs() < 1e-300 {
        return None;
    }
    let slope = (sw * swab - swa * swb) / det;
    let intercept = (swaa * swb - swa * swab) / det;

    let chi2 = (0..np)
        .map(|i| {
            let r = b[i] - intercept - slope * a[i];
            weights[i] * r * r
        })
        .sum();
    Some(LineFitResult {
        slope,
        intercept,
        chi2,
    })
}

/// Seed estimation from pixel-like space points: circle in z–x, line in
/// z–y, curvature → qp through the bending field.
#[derive(Clone, Copy, Debug)]
pub struct SeedEstimator {
    /// Bending-field component By (Tesla) in the tracking region.
    pub by: f64,
}

impl SeedEstimator {
    pub fn new(by: f64) -> Self {
        Self { by }
    }

    /// Estimate the state at `z_ref` from space points (sorted or not).
    /// `sigma` is the common point resolution used for the fit weights.
    pub fn estimate(&self, points: &[Point3], sigma: f64, z_ref: f64) -> Option<TrackParam> {
        if points.len() < 3 {
            return None;
        }
        let mut sorted: Vec<Point3> = points.to_vec();
        sorted.sort_by(|p, q| p.z.total_cmp(&q.z));

        let zs: Vec<f64> = sorted.iter().map(|p| p.z).collect();
        let xs: Vec<f64> = sorted.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = sorted.iter().map(|p| p.y).collect();
        let w = 1.0 / (sigma * sigma);
        let weights = vec![w; sorted.len()];

        let circle = fit_circle(&zs, &xs, &weights, z_ref, 0.0)?;
        let line = fit_line(&zs, &ys, &weights)?;

        // First-order transport from the PCA back to z_ref: the arc between
        // them is short for forward tracks.
        let tan_phi = circle.phi.tan();
        let (z_pca, x_pca) = circle.pca;
        let dz = z_ref - z_pca;
        let tx = tan_phi + circle.curvature * dz;
        let x = x_pca + tan_phi * dz + 0.5 * circle.curvature * dz * dz;

        let ty = line.slope;
        let y = line.intercept + line.slope * z_ref;

        // d²x/dz² = -c·qp·By·√(1+ty²) at small tx.
        if self.by == 0.0 {
            return None;
        }
        let qp = -circle.curvature / (C_LIGHT * self.by * (1.0 + ty * ty).sqrt());

        Some(TrackParam::new(x, y, tx, ty, qp, z_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// Exact points on a circle of radius r through the origin, tangent to
    /// the z axis: x(z) = r − sqrt(r² − z²).
    fn circle_points(r: f64, zs: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let xs = zs
            .iter()
            .map(|&z| r - (r * r - z * z).sqrt())
            .collect();
        (zs.to_vec(), xs)
    }

    #[test]
    fn circle_fit_recovers_curvature() {
        let r = 6000.0;
        let zs: Vec<f64> = (1..=20).map(|i| i as f64 * 10.0).collect();
        let (za, xa) = circle_points(r, &zs);
        let weights = vec![1.0; za.len()];
        let fit = fit_circle(&za, &xa, &weights, 0.0, 0.0).unwrap();
        assert_relative_eq!(fit.curvature.abs(), 1.0 / r, max_relative = 1e-5);
        assert_abs_diff_eq!(fit.dca, 0.0, epsilon = 1e-5);
        assert!(fit.chi2 < 1e-6);
    }

    #[test]
    fn line_fit_recovers_slope_and_intercept() {
        let zs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ys: Vec<f64> = zs.iter().map(|z| 3.0 + 0.25 * z).collect();
        let weights = vec![2.0; zs.len()];
        let fit = fit_line(&zs, &ys, &weights).unwrap();
        assert_abs_diff_eq!(fit.slope, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.chi2, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_inputs_return_none() {
        assert!(fit_circle(&[1.0, 2.0], &[0.0, 0.0], &[1.0, 1.0], 0.0, 0.0).is_none());
        assert!(fit_line(&[1.0], &[1.0], &[1.0]).is_none());
    }
}
