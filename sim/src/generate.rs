//! Hit generation: truth points on a plane → smeared measurements.
//!
//! Each generator owns a seeded ChaCha RNG so hit sequences are
//! reproducible run to run.

use fitter_core::{DetPlaneStripHit, DetectorPlane, PixelHit, StripHit};
use fitter_core::types::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Converts a space point into a 1-D strip measurement at stereo angle
/// `phi` with Gaussian resolution `sigma_u`.
pub struct StripHitGenerator {
    phi: f64,
    sigma_u: f64,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
}

impl StripHitGenerator {
    pub fn new(phi: f64, sigma_u: f64, seed: u64) -> Self {
        Self {
            phi,
            sigma_u,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: Normal::new(0.0, sigma_u).expect("sigma_u must be non-negative"),
        }
    }

    /// Strip hit at a raw z position.
    pub fn generate(&mut self, x: f64, y: f64, z: f64) -> StripHit {
        let u = x * self.phi.cos() + y * self.phi.sin() + self.noise.sample(&mut self.rng);
        StripHit::new(u, self.sigma_u, self.phi, z)
    }

    /// Strip hit owned by a detector plane; the measured coordinate goes
    /// through the plane's own u transform.
    pub fn generate_on_plane(&mut self, x: f64, y: f64, plane: &DetectorPlane) -> DetPlaneStripHit {
        let u = plane.u(&Point3::new(x, y, plane.z())) + self.noise.sample(&mut self.rng);
        DetPlaneStripHit::new(u, self.sigma_u, plane.clone())
    }
}

/// Converts a space point into a 2-D pixel measurement with independent
/// Gaussian resolutions.
pub struct PixelHitGenerator {
    sigma_x: f64,
    sigma_y: f64,
    rng: ChaCha8Rng,
    noise_x: Normal<f64>,
    noise_y: Normal<f64>,
}

impl PixelHitGenerator {
    pub fn new(sigma_x: f64, sigma_y: f64, seed: u64) -> Self {
        Self {
            sigma_x,
            sigma_y,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise_x: Normal::new(0.0, sigma_x).expect("sigma_x must be non-negative"),
            noise_y: Normal::new(0.0, sigma_y).expect("sigma_y must be non-negative"),
        }
    }

    pub fn generate(&mut self, x: f64, y: f64, z: f64) -> PixelHit {
        PixelHit {
            x: x + self.noise_x.sample(&mut self.rng),
            y: y + self.noise_y.sample(&mut self.rng),
            dx: self.sigma_x,
            dy: self.sigma_y,
            dxy: 0.0,
            z,
        }
    }
}
