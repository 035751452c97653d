//! `fitter_core` — Kalman-filter track fitting through a magnetic field.
//!
//! Reconstructs charged-particle trajectories from hits on a sequence of
//! detector measurement planes: best-estimate state (position, direction,
//! charge/momentum) with covariance at any longitudinal position, fit
//! quality (chi-square / NDF) and per-plane residuals.
//!
//! # Module layout
//! - [`types`]       — Scalar aliases, constants, errors, fit status
//! - [`cov`]         — Packed symmetric 5×5 covariance
//! - [`field`]       — Magnetic-field lookup
//! - [`track_param`] — Track state (x, y, tx, ty, qp) at z
//! - [`material`]    — Material description, scattering + energy loss
//! - [`plane`]       — Detector planes and the plane collection
//! - [`hit`]         — Pixel / strip measurement models
//! - [`extrap`]      — RK4 and straight-line extrapolation
//! - [`navigator`]   — Plane range queries between two z positions
//! - [`propagator`]  — Extrapolation + navigation + material composed
//! - [`filter`]      — Kalman measurement update
//! - [`smoother`]    — Two-filter backward smoother
//! - [`track`]       — Track, per-hit fit nodes
//! - [`fitter`]      — Single-pass and iterative fitters

pub mod cov;
pub mod extrap;
pub mod field;
pub mod filter;
pub mod fitter;
pub mod hit;
pub mod material;
pub mod navigator;
pub mod plane;
pub mod propagator;
pub mod smoother;
pub mod track;
pub mod track_param;
pub mod types;

pub use cov::CovMatrix;
pub use extrap::{LineExtrapolator, Rk4Config, Rk4Extrapolator, TrackExtrapolator};
pub use field::{ConstantField, MagneticField, ZeroField};
pub use filter::{FilteredUpdate, KalmanFilter, TrackUpdater};
pub use fitter::{
    fit_tracks_parallel, IterativeFitConfig, IterativeTrackFitter, TrackFitter,
};
pub use hit::{DetPlaneStripHit, Hit, PixelHit, StripHit};
pub use material::{MaterialEffects, MaterialEffectsConfig, MaterialInfo};
pub use navigator::Navigator;
pub use plane::{Detector, DetectorPlane, PlaneBounds};
pub use propagator::{PropagatorConfig, TrackPropagator};
pub use smoother::KalmanSmoother;
pub use track::{FitNode, Track};
pub use track_param::TrackParam;
pub use types::{
    FitError, FitStatus, ParticleHypothesis, Result, StateVec, TransportMatrix, C_LIGHT,
};
