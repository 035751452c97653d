//! Material description and track-state corrections.
//!
//! Two independent, composable corrections:
//! - **Multiple scattering** (Highland/PDG): adds a process variance to the
//!   slope block of the covariance. Added for both fit directions, since a
//!   scattering contribution can only grow the uncertainty.
//! - **Mean energy loss**: Bethe–Bloch for heavy particles, radiative
//!   (Bethe–Heitler) for electrons/positrons, shifting `qp` and adding the
//!   straggling variance. The shift direction follows the fit direction:
//!   a downstream pass removes the deposit, an upstream pass restores it.
//!
//! Zero thickness is an exact no-op. Momentum is never clamped here; a loss
//! that consumes the whole kinetic energy is reported as an error for the
//! caller to fail the fit with.

use crate::track_param::TrackParam;
use crate::types::{
    FitError, ParticleHypothesis, Result, ELECTRON_MASS, HIGHLAND_CONSTANT,
};
use serde::{Deserialize, Serialize};

/// Bethe–Bloch constant K = 4π N_A r_e² m_e c², GeV·cm²/mol.
const BETHE_K: f64 = 0.000307075;

/// One traversed slab of material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialInfo {
    /// Material name, for diagnostics.
    pub name: String,
    /// Thickness along z (mm).
    pub thickness: f64,
    /// Radiation length X0 (mm).
    pub rad_length: f64,
    /// Density (g/cm³). Zero suppresses ionization loss.
    pub density: f64,
    /// Effective atomic number Z.
    pub atomic_number: f64,
    /// Effective atomic mass A (g/mol).
    pub atomic_mass: f64,
    /// Mean excitation energy I (GeV).
    pub mean_excitation: f64,
    /// Longitudinal position of the slab (mm).
    pub z: f64,
}

impl MaterialInfo {
    /// A slab described only by its thickness in radiation lengths, with
    /// no ionization constants. Scattering and radiative loss still apply;
    /// Bethe–Bloch is zero (density = 0).
    pub fn from_radiation_lengths(name: impl Into<String>, x_over_x0: f64, z: f64) -> Self {
        Self {
            name: name.into(),
            thickness: x_over_x0,
            rad_length: 1.0,
            density: 0.0,
            atomic_number: 0.0,
            atomic_mass: 0.0,
            mean_excitation: 0.0,
            z,
        }
    }

    /// Silicon sensor of the given thickness (mm).
    pub fn silicon(thickness: f64, z: f64) -> Self {
        Self {
            name: "Si".into(),
            thickness,
            rad_length: 93.7,
            density: 2.329,
            atomic_number: 14.0,
            atomic_mass: 28.0855,
            mean_excitation: 173.0e-9,
            z,
        }
    }

    /// Thickness in radiation lengths.
    pub fn x_over_x0(&self) -> f64 {
        if self.rad_length > 0.0 {
            self.thickness / self.rad_length
        } else {
            0.0
        }
    }
}

/// Configuration for the material-effects model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MaterialEffectsConfig {
    /// Apply the Highland multiple-scattering variance.
    pub scattering: bool,
    /// Apply mean energy loss and its qp variance.
    pub energy_loss: bool,
    /// Slabs thicker than this fraction of X0 are integrated in sub-slabs
    /// so the momentum used for each sub-step stays current.
    pub thick_fraction: f64,
    /// Maximum number of sub-slabs for a thick absorber.
    pub max_slabs: usize,
}

impl Default for MaterialEffectsConfig {
    fn default() -> Self {
        Self {
            scattering: true,
            energy_loss: true,
            thick_fraction: 0.05,
            max_slabs: 10,
        }
    }
}

/// Applies material corrections to a track state.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialEffects {
    pub config: MaterialEffectsConfig,
}

impl MaterialEffects {
    pub fn new(config: MaterialEffectsConfig) -> Self {
        Self { config }
    }

    /// Correct a state for one traversed slab. `downstream` is the fit
    /// direction: it selects the sign of the mean energy-loss shift only.
    pub fn apply(
        &self,
        par: &TrackParam,
        material: &MaterialInfo,
        hypothesis: ParticleHypothesis,
        downstream: bool,
    ) -> Result<TrackParam> {
        let x_over_x0 = material.x_over_x0();
        if x_over_x0 <= 0.0 && material.thickness <= 0.0 {
            return Ok(*par);
        }

        // Thick absorbers are walked in sub-slabs so each sub-step sees the
        // already-degraded momentum.
        let n_slabs = if x_over_x0 > self.config.thick_fraction {
            ((x_over_x0 / self.config.thick_fraction).ceil() as usize).min(self.config.max_slabs)
        } else {
            1
        };

        let slab = MaterialInfo {
            thickness: material.thickness / n_slabs as f64,
            ..material.clone()
        };

        let mut out = *par;
        for _ in 0..n_slabs {
            out = self.apply_thin(&out, &slab, hypothesis, downstream)?;
        }
        Ok(out)
    }

    fn apply_thin(
        &self,
        par: &TrackParam,
        material: &MaterialInfo,
        hypothesis: ParticleHypothesis,
        downstream: bool,
    ) -> Result<TrackParam> {
        let mut out = *par;
        if self.config.scattering {
            out = self.add_scattering(&out, material, hypothesis);
        }
        if self.config.energy_loss {
            out = self.apply_energy_loss(&out, material, hypothesis, downstream)?;
        }
        Ok(out)
    }

    /// Highland projected-angle variance injected into the slope block.
    fn add_scattering(
        &self,
        par: &TrackParam,
        material: &MaterialInfo,
        hypothesis: ParticleHypothesis,
    ) -> TrackParam {
        // The traversed path exceeds the nominal thickness by the slope
        // normalization.
        let x_over_x0 = material.x_over_x0() * par.slope_norm();
        if x_over_x0 <= 0.0 {
            return *par;
        }

        let p = par.momentum();
        let mass = hypothesis.mass();
        let energy = (p * p + mass * mass).sqrt();
        let beta = p / energy;

        let log_term = 1.0 + 0.038 * x_over_x0.ln();
        let theta0 = HIGHLAND_CONSTANT / (beta * p) * x_over_x0.sqrt() * log_term.max(0.0);
        let theta_sq = theta0 * theta0;

        let tx = par.tx;
        let ty = par.ty;
        let t = 1.0 + tx * tx + ty * ty;

        let mut out = *par;
        out.cov.add(2, 2, (1.0 + tx * tx) * t * theta_sq);
        out.cov.add(3, 3, (1.0 + ty * ty) * t * theta_sq);
        out.cov.add(2, 3, tx * ty * t * theta_sq);
        out
    }

    fn apply_energy_loss(
        &self,
        par: &TrackParam,
        material: &MaterialInfo,
        hypothesis: ParticleHypothesis,
        downstream: bool,
    ) -> Result<TrackParam> {
        let path = material.thickness * par.slope_norm();
        if path <= 0.0 {
            return Ok(*par);
        }

        let p = par.momentum();
        let mass = hypothesis.mass();
        let energy = (p * p + mass * mass).sqrt();

        let loss = if hypothesis.is_electron() {
            // Radiative: <E'> = E exp(-x/X0).
            let x_over_x0 = material.x_over_x0() * par.slope_norm();
            energy * (1.0 - (-x_over_x0).exp())
        } else {
            self.bethe_bloch(p, energy, mass, material) * path
        };

        let new_energy = if downstream {
            energy - loss
        } else {
            energy + loss
        };
        if new_energy <= mass {
            return Err(FitError::MomentumTooLow {
                momentum: 0.0,
                floor: mass,
            });
        }
        let new_p = (new_energy * new_energy - mass * mass).sqrt();

        let mut out = *par;
        out.qp = par.charge() / new_p;
        out.cov
            .add(4, 4, self.sigma_sq_qp(par, material, hypothesis));
        Ok(out)
    }

    /// Mean ionization loss dE/dx in GeV/mm.
    fn bethe_bloch(&self, p: f64, energy: f64, mass: f64, material: &MaterialInfo) -> f64 {
        if material.density <= 0.0 || material.atomic_mass <= 0.0 || material.mean_excitation <= 0.0
        {
            return 0.0;
        }
        let beta = p / energy;
        let beta_sq = beta * beta;
        let gamma = energy / mass;
        let beta_gamma_sq = beta_sq * gamma * gamma;

        let mass_ratio = ELECTRON_MASS / mass;
        let t_max = 2.0 * ELECTRON_MASS * beta_gamma_sq
            / (1.0 + 2.0 * gamma * mass_ratio + mass_ratio * mass_ratio);

        let i = material.mean_excitation;
        let arg = 2.0 * ELECTRON_MASS * beta_gamma_sq * t_max / (i * i);

        // GeV cm²/g times g/cm³ gives GeV/cm; lengths here are mm.
        let de_dx_cm = BETHE_K * (material.atomic_number / material.atomic_mass) / beta_sq
            * (0.5 * arg.ln() - beta_sq)
            * material.density;
        de_dx_cm / 10.0
    }

    /// Variance added to qp by energy-loss fluctuations.
    fn sigma_sq_qp(
        &self,
        par: &TrackParam,
        material: &MaterialInfo,
        hypothesis: ParticleHypothesis,
    ) -> f64 {
        let p = par.momentum();
        let mass = hypothesis.mass();
        let energy = (p * p + mass * mass).sqrt();
        let beta_sq = (p / energy) * (p / energy);

        if hypothesis.is_electron() {
            // Radiative-loss variance in units of qp².
            let x_over_x0 = material.x_over_x0() * par.slope_norm();
            let spread =
                (x_over_x0 * 3.0_f64.ln() / 2.0_f64.ln()).exp() - (-2.0 * x_over_x0).exp();
            return par.qp * par.qp * spread.max(0.0);
        }

        if material.density <= 0.0 || material.atomic_mass <= 0.0 {
            return 0.0;
        }
        let path_cm = material.thickness * par.slope_norm() / 10.0;
        let xi = 0.5 * BETHE_K * (material.atomic_number / material.atomic_mass)
            * material.density
            * path_cm
            / beta_sq;

        let gamma = energy / mass;
        let mass_ratio = ELECTRON_MASS / mass;
        let t_max = 2.0 * ELECTRON_MASS * beta_sq * gamma * gamma
            / (1.0 + 2.0 * gamma * mass_ratio + mass_ratio * mass_ratio);

        // Gaussian straggling variance of the energy deposit, then the
        // (E/p³)² factor maps σ²(E) onto σ²(qp).
        let sigma_sq_e = xi * t_max * (1.0 - beta_sq / 2.0);
        let de_to_dqp = energy / (p * p * p);
        de_to_dqp * de_to_dqp * sigma_sq_e
    }
}
