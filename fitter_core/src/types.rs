//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix5, Vector3, Vector5};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Scalar types: all math is done in f64 for numerical stability in the
// Kalman filter and the field integration.
// ---------------------------------------------------------------------------

/// 5-component track state vector: [x, y, tx, ty, qp]
pub type StateVec = Vector5<f64>;

/// 5×5 transport (Jacobian) matrix of an extrapolation step
pub type TransportMatrix = Matrix5<f64>;

/// Magnetic field vector (Bx, By, Bz) in Tesla
pub type FieldVec = Vector3<f64>;

/// 3D point in detector coordinates (mm)
pub type Point3 = Vector3<f64>;

// ---------------------------------------------------------------------------
// Physical constants.  Units are mm / Tesla / GeV throughout: with these,
// the trajectory curvature in a uniform By field is -C_LIGHT * By / pT.
// ---------------------------------------------------------------------------

/// Bend constant c = 0.000299792458 GeV / (T·mm)
pub const C_LIGHT: f64 = 0.000299792458;

/// Highland multiple-scattering constant, GeV
pub const HIGHLAND_CONSTANT: f64 = 0.0136;

/// Electron mass, GeV
pub const ELECTRON_MASS: f64 = 0.000510998950;

/// Muon mass, GeV
pub const MUON_MASS: f64 = 0.1056583755;

/// Charged-pion mass, GeV
pub const PION_MASS: f64 = 0.13957039;

/// Charged-kaon mass, GeV
pub const KAON_MASS: f64 = 0.493677;

/// Proton mass, GeV
pub const PROTON_MASS: f64 = 0.93827208816;

// ---------------------------------------------------------------------------
// Errors: the full failure taxonomy.  Callers are expected to check the
// Result and abandon the track; nothing here is retried internally.
// ---------------------------------------------------------------------------

/// Result alias used by all fallible fitting operations.
pub type Result<T> = std::result::Result<T, FitError>;

/// Failure modes of extrapolation, filtering and fitting.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum FitError {
    /// Field integration did not reach the target within the step budget.
    #[error("extrapolation did not converge after {steps} steps toward z = {z_target}")]
    NotConverged { z_target: f64, steps: usize },

    /// Plane-target search exhausted its hop limit without satisfying the
    /// plane equation.
    #[error("target plane '{plane}' not reached within {hops} hops")]
    TargetUnreachable { plane: String, hops: usize },

    /// The trajectory crosses the plane's surface outside its bounded
    /// extents: geometrically missed, as opposed to unreachable.
    #[error("trajectory misses bounded plane '{plane}' at ({x:.3}, {y:.3})")]
    OutsidePlaneBounds { plane: String, x: f64, y: f64 },

    /// Innovation covariance of a measurement update was non-positive or
    /// non-finite (degenerate measurement variance).
    #[error("singular innovation covariance: {0}")]
    SingularInnovation(f64),

    /// A covariance matrix that must be inverted (smoother combination)
    /// was singular.
    #[error("singular covariance in smoother combination at node {0}")]
    SingularCovariance(usize),

    /// Momentum fell below the propagation floor after energy loss.
    #[error("momentum {momentum:.6} GeV below floor {floor:.6} GeV")]
    MomentumTooLow { momentum: f64, floor: f64 },

    /// Outlier rejection left fewer hits than the iterative fitter's
    /// minimum.
    #[error("only {remaining} hits remain after rejection (minimum {minimum})")]
    TooFewHits { remaining: usize, minimum: usize },

    /// A track had no hits or no usable seed state.
    #[error("track is empty or has no seed parameters")]
    EmptyTrack,
}

// ---------------------------------------------------------------------------
// Fit status recorded on a Track after an attempt.
// ---------------------------------------------------------------------------

/// Outcome of the last fit attempt on a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// No fit has been attempted yet.
    #[default]
    Unfitted,
    /// The last attempt completed every extrapolation and update.
    Success,
    /// The last attempt aborted; chi2/nodes do not describe a valid fit.
    Failed,
}

// ---------------------------------------------------------------------------
// Particle hypothesis: selects the energy-loss model and supplies the mass
// for the Highland beta factor.
// ---------------------------------------------------------------------------

/// Mass/charge hypothesis under which material corrections are evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleHypothesis {
    Electron,
    Positron,
    Muon,
    Pion,
    Kaon,
    Proton,
}

impl ParticleHypothesis {
    /// Rest mass in GeV.
    pub fn mass(&self) -> f64 {
        match self {
            Self::Electron | Self::Positron => ELECTRON_MASS,
            Self::Muon => MUON_MASS,
            Self::Pion => PION_MASS,
            Self::Kaon => KAON_MASS,
            Self::Proton => PROTON_MASS,
        }
    }

    /// True for electrons/positrons, which lose energy radiatively.
    pub fn is_electron(&self) -> bool {
        matches!(self, Self::Electron | Self::Positron)
    }
}
