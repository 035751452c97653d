//! `sim` — Scenario support for track-fit tests: truth trajectories,
//! smeared hits, seed estimation, pull accumulation.

pub mod generate;
pub mod pulls;
pub mod scenario;
pub mod seed;
pub mod smear;

pub use generate::{PixelHitGenerator, StripHitGenerator};
pub use pulls::{FitPulls, PullStats};
pub use scenario::{stereo_strip_detector, uniform_pixel_detector, TruthPropagator};
pub use seed::{fit_circle, fit_line, CircleFitResult, LineFitResult, SeedEstimator};
pub use smear::ParamSmearer;
