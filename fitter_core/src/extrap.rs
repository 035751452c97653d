//! Trajectory extrapolation through the magnetic field.
//!
//! # Equations of motion
//! With z as the independent variable and qp constant along the step:
//!
//! ```text
//! dx/dz  = tx
//! dy/dz  = ty
//! dtx/dz = c·qp·√(1+tx²+ty²)·( tx·ty·Bx − (1+tx²)·By + ty·Bz )
//! dty/dz = c·qp·√(1+tx²+ty²)·( (1+ty²)·Bx − tx·ty·By − tx·Bz )
//! ```
//!
//! [`Rk4Extrapolator`] integrates these with classic fixed-step RK4, the
//! step bounded by `max_step` and the total step count by `max_steps`. The
//! transport matrix is accumulated alongside the state by integrating the
//! variational equations for the three nontrivial initial-condition columns
//! (∂/∂tx₀, ∂/∂ty₀, ∂/∂qp₀) through the same RK4 stages; the covariance is
//! then transported as `F C Fᵗ`. The field is evaluated on the reference
//! trajectory, so in-step field gradients do not enter the Jacobian.
//!
//! [`LineExtrapolator`] is the exact field-free limit with a closed-form
//! linear Jacobian.

use crate::field::MagneticField;
use crate::plane::DetectorPlane;
use crate::track_param::TrackParam;
use crate::types::{FitError, Result, TransportMatrix, C_LIGHT};
use tracing::trace;

/// Capability interface for extrapolating a track state.
pub trait TrackExtrapolator {
    /// Extrapolate to the longitudinal position `z_out`. The direction is
    /// inferred from the sign of `z_out - par.z`. The covariance is always
    /// transported; when `transport` is given, the accumulated 5×5 Jacobian
    /// is written into it.
    fn extrapolate_to_z(
        &self,
        par: &TrackParam,
        z_out: f64,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam>;

    /// Extrapolate onto a detector plane, searching in whichever direction
    /// the plane lies, up to a hop limit. A bounded plane whose extents
    /// exclude the crossing point reports [`FitError::OutsidePlaneBounds`];
    /// a plane the search cannot reach reports
    /// [`FitError::TargetUnreachable`].
    fn extrapolate_to_plane(
        &self,
        par: &TrackParam,
        plane: &DetectorPlane,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam>;
}

// ---------------------------------------------------------------------------
// Straight-line extrapolator
// ---------------------------------------------------------------------------

/// Exact straight-line transport for field-free regions.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineExtrapolator;

impl LineExtrapolator {
    fn step(par: &TrackParam, dz: f64) -> (TrackParam, TransportMatrix) {
        let mut out = *par;
        out.x += par.tx * dz;
        out.y += par.ty * dz;
        out.z += dz;

        let mut f = TransportMatrix::identity();
        f[(0, 2)] = dz;
        f[(1, 3)] = dz;
        out.cov = par.cov.transport(&f);
        (out, f)
    }
}

impl TrackExtrapolator for LineExtrapolator {
    fn extrapolate_to_z(
        &self,
        par: &TrackParam,
        z_out: f64,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        let (out, f) = Self::step(par, z_out - par.z);
        if let Some(t) = transport {
            *t = f;
        }
        Ok(out)
    }

    fn extrapolate_to_plane(
        &self,
        par: &TrackParam,
        plane: &DetectorPlane,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        // Solve n·(r + d·dz − p0) = 0 with direction d = (tx, ty, 1).
        let direction = crate::types::Point3::new(par.tx, par.ty, 1.0);
        let denom = plane.normal.dot(&direction);
        if denom.abs() < 1e-12 {
            return Err(FitError::TargetUnreachable {
                plane: plane.name.clone(),
                hops: 0,
            });
        }
        let position = crate::types::Point3::new(par.x, par.y, par.z);
        let dz = -plane.distance(&position) / denom;
        let (out, f) = Self::step(par, dz);

        let crossing = crate::types::Point3::new(out.x, out.y, out.z);
        if !plane.contains(&crossing) {
            return Err(FitError::OutsidePlaneBounds {
                plane: plane.name.clone(),
                x: out.x,
                y: out.y,
            });
        }
        if let Some(t) = transport {
            *t = f;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// RK4 extrapolator
// ---------------------------------------------------------------------------

/// Step policy of the RK4 integrator.
#[derive(Clone, Copy, Debug)]
pub struct Rk4Config {
    /// Maximum longitudinal step (mm).
    pub max_step: f64,
    /// Step budget for a single extrapolation; exceeded ⇒ `NotConverged`.
    pub max_steps: usize,
    /// Convergence tolerance of the plane-equation search (mm).
    pub plane_tolerance: f64,
    /// Hop limit of the plane-equation search.
    pub max_plane_hops: usize,
}

impl Default for Rk4Config {
    fn default() -> Self {
        Self {
            max_step: 10.0,
            max_steps: 100_000,
            plane_tolerance: 1e-6,
            max_plane_hops: 16,
        }
    }
}

/// 4th-order Runge–Kutta extrapolator through a magnetic field.
#[derive(Clone, Debug)]
pub struct Rk4Extrapolator<F> {
    field: F,
    pub config: Rk4Config,
}

/// Integration state: (x, y, tx, ty) plus the three variational columns
/// (∂/∂tx₀, ∂/∂ty₀, ∂/∂qp₀), each over the same four components.
#[derive(Clone, Copy, Default)]
struct RkState {
    s: [f64; 4],
    var: [[f64; 4]; 3],
}

/// Derivative of `RkState` at a given z.
#[derive(Clone, Copy, Default)]
struct RkDeriv {
    ds: [f64; 4],
    dvar: [[f64; 4]; 3],
}

impl RkState {
    fn advanced(&self, d: &RkDeriv, h: f64) -> Self {
        let mut out = *self;
        for i in 0..4 {
            out.s[i] += h * d.ds[i];
            for c in 0..3 {
                out.var[c][i] += h * d.dvar[c][i];
            }
        }
        out
    }
}

impl<F: MagneticField> Rk4Extrapolator<F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            config: Rk4Config::default(),
        }
    }

    pub fn with_config(field: F, config: Rk4Config) -> Self {
        Self { field, config }
    }

    /// Right-hand side of the equations of motion and their variational
    /// equations, with the field looked up on the reference trajectory.
    fn derivatives(&self, z: f64, state: &RkState, qp: f64) -> RkDeriv {
        let [x, y, tx, ty] = state.s;
        let b = self.field.value(x, y, z);
        let (bx, by, bz) = (b.x, b.y, b.z);

        let t = (1.0 + tx * tx + ty * ty).sqrt();
        let psi_x = tx * ty * bx - (1.0 + tx * tx) * by + ty * bz;
        let psi_y = (1.0 + ty * ty) * bx - tx * ty * by - tx * bz;

        let ax = C_LIGHT * qp * t * psi_x;
        let ay = C_LIGHT * qp * t * psi_y;

        // Partials of the slope accelerations w.r.t. (tx, ty, qp).
        let dax_dtx = C_LIGHT * qp * ((tx / t) * psi_x + t * (ty * bx - 2.0 * tx * by));
        let dax_dty = C_LIGHT * qp * ((ty / t) * psi_x + t * (tx * bx + bz));
        let dax_dqp = C_LIGHT * t * psi_x;
        let day_dtx = C_LIGHT * qp * ((tx / t) * psi_y + t * (-ty * by - bz));
        let day_dty = C_LIGHT * qp * ((ty / t) * psi_y + t * (2.0 * ty * bx - tx * by));
        let day_dqp = C_LIGHT * t * psi_y;

        let mut out = RkDeriv {
            ds: [tx, ty, ax, ay],
            ..Default::default()
        };
        for (c, dqp) in [(0usize, 0.0), (1, 0.0), (2, 1.0)] {
            let [_, _, dtx, dty] = state.var[c];
            out.dvar[c] = [
                dtx,
                dty,
                dax_dtx * dtx + dax_dty * dty + dax_dqp * dqp,
                day_dtx * dtx + day_dty * dty + day_dqp * dqp,
            ];
        }
        out
    }

    /// One classic RK4 step of length `h` from `z`.
    fn rk4_step(&self, z: f64, state: &RkState, qp: f64, h: f64) -> RkState {
        let k1 = self.derivatives(z, state, qp);
        let k2 = self.derivatives(z + 0.5 * h, &state.advanced(&k1, 0.5 * h), qp);
        let k3 = self.derivatives(z + 0.5 * h, &state.advanced(&k2, 0.5 * h), qp);
        let k4 = self.derivatives(z + h, &state.advanced(&k3, h), qp);

        let mut out = *state;
        for i in 0..4 {
            out.s[i] +=
                h / 6.0 * (k1.ds[i] + 2.0 * k2.ds[i] + 2.0 * k3.ds[i] + k4.ds[i]);
            for c in 0..3 {
                out.var[c][i] += h / 6.0
                    * (k1.dvar[c][i]
                        + 2.0 * k2.dvar[c][i]
                        + 2.0 * k3.dvar[c][i]
                        + k4.dvar[c][i]);
            }
        }
        out
    }

    /// Integrate from `par` to `z_out`, returning the new state and the
    /// accumulated transport matrix.
    fn integrate(&self, par: &TrackParam, z_out: f64) -> Result<(TrackParam, TransportMatrix)> {
        let dz_total = z_out - par.z;
        if dz_total == 0.0 {
            return Ok((*par, TransportMatrix::identity()));
        }

        let n_steps = (dz_total.abs() / self.config.max_step).ceil().max(1.0) as usize;
        if n_steps > self.config.max_steps {
            return Err(FitError::NotConverged {
                z_target: z_out,
                steps: self.config.max_steps,
            });
        }
        let h = dz_total / n_steps as f64;

        let mut state = RkState {
            s: [par.x, par.y, par.tx, par.ty],
            var: [
                [0.0, 0.0, 1.0, 0.0], // ∂/∂tx₀
                [0.0, 0.0, 0.0, 1.0], // ∂/∂ty₀
                [0.0, 0.0, 0.0, 0.0], // ∂/∂qp₀ (sourced through dqp = 1)
            ],
        };
        let mut z = par.z;
        for _ in 0..n_steps {
            state = self.rk4_step(z, &state, par.qp, h);
            z += h;
        }

        if !state.s.iter().all(|v| v.is_finite()) {
            return Err(FitError::NotConverged {
                z_target: z_out,
                steps: n_steps,
            });
        }

        let mut f = TransportMatrix::identity();
        for (c, col) in [(2usize, 0usize), (3, 1), (4, 2)] {
            f[(0, c)] = state.var[col][0];
            f[(1, c)] = state.var[col][1];
            f[(2, c)] = state.var[col][2];
            f[(3, c)] = state.var[col][3];
        }

        let mut out = *par;
        out.x = state.s[0];
        out.y = state.s[1];
        out.tx = state.s[2];
        out.ty = state.s[3];
        out.z = z_out;
        out.cov = par.cov.transport(&f);
        Ok((out, f))
    }
}

impl<F: MagneticField> TrackExtrapolator for Rk4Extrapolator<F> {
    fn extrapolate_to_z(
        &self,
        par: &TrackParam,
        z_out: f64,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        let (out, f) = self.integrate(par, z_out)?;
        if let Some(t) = transport {
            *t = f;
        }
        Ok(out)
    }

    fn extrapolate_to_plane(
        &self,
        par: &TrackParam,
        plane: &DetectorPlane,
        transport: Option<&mut TransportMatrix>,
    ) -> Result<TrackParam> {
        // Newton search on the plane equation: each hop linearizes
        // n·(r − p0) = 0 along the local direction (tx, ty, 1) and
        // re-extrapolates in z, in whichever direction the root lies.
        let mut current = *par;
        let mut f_total = TransportMatrix::identity();

        for hop in 0..self.config.max_plane_hops {
            let position = crate::types::Point3::new(current.x, current.y, current.z);
            let distance = plane.distance(&position);
            if distance.abs() < self.config.plane_tolerance {
                if !plane.contains(&position) {
                    return Err(FitError::OutsidePlaneBounds {
                        plane: plane.name.clone(),
                        x: current.x,
                        y: current.y,
                    });
                }
                if let Some(t) = transport {
                    *t = f_total;
                }
                return Ok(current);
            }

            let direction = crate::types::Point3::new(current.tx, current.ty, 1.0);
            let denom = plane.normal.dot(&direction);
            if denom.abs() < 1e-12 {
                return Err(FitError::TargetUnreachable {
                    plane: plane.name.clone(),
                    hops: hop,
                });
            }
            let dz = -distance / denom;
            trace!(plane = %plane.name, hop, dz, "plane search hop");
            let (next, f_step) = self.integrate(&current, current.z + dz)?;
            f_total = f_step * f_total;
            current = next;
        }

        Err(FitError::TargetUnreachable {
            plane: plane.name.clone(),
            hops: self.config.max_plane_hops,
        })
    }
}
