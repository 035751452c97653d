//! Seed smearing: perturb a truth state into a realistic fit seed.

use fitter_core::{CovMatrix, TrackParam};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Gaussian smearing widths for each seed component.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SmearConfig {
    /// Position smearing (mm).
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Slope smearing.
    pub sigma_tx: f64,
    pub sigma_ty: f64,
    /// Relative momentum smearing: qp is scaled by (1 + N(0, rel_sigma_p)).
    pub rel_sigma_p: f64,
    /// Diagonal variance of the smeared seed covariance.
    pub seed_variance: f64,
}

impl Default for SmearConfig {
    fn default() -> Self {
        Self {
            sigma_x: 0.001,
            sigma_y: 0.001,
            sigma_tx: 0.002,
            sigma_ty: 0.002,
            rel_sigma_p: 0.1,
            seed_variance: 999.0,
        }
    }
}

/// Smears truth track parameters into fit seeds.
pub struct ParamSmearer {
    config: SmearConfig,
    rng: ChaCha8Rng,
    unit: Normal<f64>,
}

impl ParamSmearer {
    pub fn new(config: SmearConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            unit: Normal::new(0.0, 1.0).expect("unit normal"),
        }
    }

    /// Smeared copy of `par` carrying the inflated seed covariance.
    pub fn smear(&mut self, par: &TrackParam) -> TrackParam {
        let cfg = self.config;
        let mut draw = |sigma: f64| sigma * self.unit.sample(&mut self.rng);
        let mut out = *par;
        out.x += draw(cfg.sigma_x);
        out.y += draw(cfg.sigma_y);
        out.tx += draw(cfg.sigma_tx);
        out.ty += draw(cfg.sigma_ty);
        out.qp *= 1.0 + draw(cfg.rel_sigma_p);
        out.cov = CovMatrix::seed(cfg.seed_variance);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smearing_perturbs_but_stays_close() {
        let truth = TrackParam::new(0.0, 0.0, 0.0, 0.1, 1.0, 0.0);
        let mut smearer = ParamSmearer::new(SmearConfig::default(), 11);
        let seed = smearer.smear(&truth);
        assert_ne!(seed, truth);
        assert!((seed.x - truth.x).abs() < 0.01);
        assert!((seed.ty - truth.ty).abs() < 0.02);
        assert!((seed.qp - truth.qp).abs() < 1.0);
        assert_eq!(seed.cov.var_x(), 999.0);
    }
}
