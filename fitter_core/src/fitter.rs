//! Track fitters: single-pass Kalman fit and the iterative
//! outlier-rejecting refit loop.
//!
//! # Single pass
//! `TrackFitter::fit(track, downstream)` walks the hits in traversal
//! order, at each hit propagating the running state to the hit's plane
//! (navigator + extrapolator + material effects) and filtering in the
//! measurement, recording a `FitNode` per hit. Per attempt the state
//! machine is initialize → (extrapolate → update)* → done; any failure
//! abandons the attempt: the track is marked failed, no partial nodes are
//! kept, and the error is returned.
//!
//! # Iterative
//! `IterativeTrackFitter` repeats {downstream fit, upstream fit, smooth},
//! rejects hits whose incremental chi-square exceeds the cut, and stops on
//! chi-square convergence or iteration exhaustion; it fails closed when
//! too few hits survive.

use crate::extrap::TrackExtrapolator;
use crate::filter::{KalmanFilter, TrackUpdater};
use crate::plane::Detector;
use crate::propagator::TrackPropagator;
use crate::smoother::KalmanSmoother;
use crate::track::{FitNode, Track};
use crate::track_param::TrackParam;
use crate::types::{FitError, FitStatus, ParticleHypothesis, Result};
use rayon::prelude::*;
use tracing::debug;

/// Single-pass Kalman track fitter.
#[derive(Clone, Debug)]
pub struct TrackFitter<E, U = KalmanFilter> {
    propagator: TrackPropagator<E>,
    updater: U,
    /// Mass hypothesis used for material corrections.
    pub hypothesis: ParticleHypothesis,
}

impl<E: TrackExtrapolator, U: TrackUpdater> TrackFitter<E, U> {
    pub fn new(propagator: TrackPropagator<E>, updater: U) -> Self {
        Self {
            propagator,
            updater,
            hypothesis: ParticleHypothesis::Muon,
        }
    }

    pub fn with_hypothesis(mut self, hypothesis: ParticleHypothesis) -> Self {
        self.hypothesis = hypothesis;
        self
    }

    pub fn propagator(&self) -> &TrackPropagator<E> {
        &self.propagator
    }

    /// Run one full filter pass over the track's hits. `downstream` walks
    /// ascending z starting from `param_first`; upstream walks descending z
    /// starting from `param_last`. The fitted boundary state is written
    /// back into the slot the pass ends at.
    pub fn fit(&self, track: &mut Track, detector: &Detector, downstream: bool) -> Result<()> {
        match self.fit_pass(track, detector, downstream) {
            Ok(()) => {
                track.status = FitStatus::Success;
                Ok(())
            }
            Err(e) => {
                // A failed attempt leaves no partial fit output behind.
                track.nodes.clear();
                track.chi2 = 0.0;
                track.status = FitStatus::Failed;
                Err(e)
            }
        }
    }

    fn fit_pass(&self, track: &mut Track, detector: &Detector, downstream: bool) -> Result<()> {
        if track.n_hits() == 0 {
            return Err(FitError::EmptyTrack);
        }
        track.sort_hits(downstream);

        let mut par = if downstream {
            track.param_first
        } else {
            track.param_last
        };

        let mut nodes = Vec::with_capacity(track.n_hits());
        let mut chi2 = 0.0;

        for hit in track.hits() {
            let predicted = match hit.plane() {
                Some(plane) => self.propagator.propagate_to_plane(
                    &par,
                    detector,
                    plane,
                    self.hypothesis,
                    downstream,
                    None,
                )?,
                None => self.propagator.propagate(
                    &par,
                    detector,
                    hit.z(),
                    self.hypothesis,
                    downstream,
                    None,
                )?,
            };

            let update = self.updater.update(&predicted, hit)?;
            chi2 += update.chi2;
            nodes.push(FitNode {
                predicted,
                filtered: update.par,
                smoothed: None,
                chi2: update.chi2,
            });
            par = update.par;
        }

        track.nodes = nodes;
        track.chi2 = chi2;
        track.ndf = track.ndf_from_hits();
        if downstream {
            track.param_last = par;
        } else {
            track.param_first = par;
        }
        Ok(())
    }
}

/// Configuration of the iterative refit loop.
#[derive(Clone, Copy, Debug)]
pub struct IterativeFitConfig {
    /// Maximum number of {fit, fit, smooth} rounds.
    pub max_iterations: usize,
    /// Node chi-square above which a hit is rejected as an outlier.
    pub chi2_cut: f64,
    /// Fewer surviving hits than this fails the fit.
    pub min_hits: usize,
    /// Total chi-square change below which the loop stops early.
    pub convergence_tolerance: f64,
    /// Diagonal variance used to re-inflate the seed covariance between
    /// rounds, so a refit is not biased by the previous round's precision.
    pub seed_variance: f64,
}

impl Default for IterativeFitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            chi2_cut: 15.0,
            min_hits: 4,
            convergence_tolerance: 1e-3,
            seed_variance: 999.0,
        }
    }
}

/// Iterative fitter: refit, smooth, reject outliers, repeat.
#[derive(Clone, Debug)]
pub struct IterativeTrackFitter<E, U = KalmanFilter> {
    fitter: TrackFitter<E, U>,
    smoother: KalmanSmoother,
    pub config: IterativeFitConfig,
}

impl<E: TrackExtrapolator, U: TrackUpdater> IterativeTrackFitter<E, U> {
    pub fn new(fitter: TrackFitter<E, U>, config: IterativeFitConfig) -> Self {
        Self {
            fitter,
            smoother: KalmanSmoother,
            config,
        }
    }

    /// Run the full iterative fit. On success the track carries smoothed
    /// nodes, fitted boundary states on both ends, and the converged
    /// chi-square; on failure the track status is `Failed` and the error
    /// tells why.
    pub fn fit(&self, track: &mut Track, detector: &Detector) -> Result<()> {
        let mut work = track.clone();
        let mut prev_chi2 = f64::INFINITY;
        let mut pending_refit = true;

        for iteration in 0..self.config.max_iterations {
            reseed(&mut work, self.config.seed_variance);

            let round = match self.fit_round(&mut work, detector) {
                Ok(r) => r,
                Err(e) => {
                    track.status = FitStatus::Failed;
                    return Err(e);
                }
            };
            pending_refit = false;
            debug!(
                iteration,
                chi2 = round.chi2,
                outlier = ?round.worst_outlier,
                "iterative fit round"
            );

            // Reject the worst offender only: one bad hit drags the
            // predictions at its neighbors over the cut too, and those
            // recover once it is gone.
            if let Some(index) = round.worst_outlier {
                let remaining = work.n_hits() - 1;
                if remaining < self.config.min_hits {
                    track.status = FitStatus::Failed;
                    return Err(FitError::TooFewHits {
                        remaining,
                        minimum: self.config.min_hits,
                    });
                }
                work.remove_hits(&[index]);
                prev_chi2 = f64::INFINITY;
                pending_refit = true;
                continue;
            }

            if (prev_chi2 - round.chi2).abs() < self.config.convergence_tolerance {
                break;
            }
            prev_chi2 = round.chi2;
        }

        // A rejection on the final iteration leaves the nodes stale; one
        // last pass restores consistency.
        if pending_refit {
            reseed(&mut work, self.config.seed_variance);
            if let Err(e) = self.fit_round(&mut work, detector) {
                track.status = FitStatus::Failed;
                return Err(e);
            }
        }

        *track = work;
        Ok(())
    }

    /// One {downstream, upstream, smooth} round over clones, leaving
    /// `track` holding the ascending-order result with smoothed nodes.
    fn fit_round(&self, track: &mut Track, detector: &Detector) -> Result<RoundOutcome> {
        self.fitter.fit(track, detector, true)?;
        let mut backward = track.clone();
        self.fitter.fit(&mut backward, detector, false)?;

        // The upstream pass fitted param_first; carry it over.
        track.param_first = backward.param_first;
        self.smoother.smooth(track, &backward)?;

        let worst_outlier = track
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.chi2 > self.config.chi2_cut)
            .max_by(|(_, a), (_, b)| a.chi2.total_cmp(&b.chi2))
            .map(|(i, _)| i);

        Ok(RoundOutcome {
            chi2: track.chi2,
            worst_outlier,
        })
    }
}

struct RoundOutcome {
    chi2: f64,
    worst_outlier: Option<usize>,
}

/// Re-inflate the boundary covariances so a refit starts from the state
/// estimates but not their (already measurement-laden) precision.
fn reseed(track: &mut Track, variance: f64) {
    track.param_first.cov = crate::cov::CovMatrix::seed(variance);
    track.param_last.cov = crate::cov::CovMatrix::seed(variance);
}

/// Fit a batch of independent tracks in parallel. Each track is owned by
/// exactly one worker; the fitter, detector and field are shared read-only.
pub fn fit_tracks_parallel<E, U>(
    fitter: &TrackFitter<E, U>,
    tracks: &mut [Track],
    detector: &Detector,
    downstream: bool,
) -> Vec<Result<()>>
where
    E: TrackExtrapolator + Sync,
    U: TrackUpdater + Sync,
{
    tracks
        .par_iter_mut()
        .map(|track| fitter.fit(track, detector, downstream))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrap::Rk4Extrapolator;
    use crate::field::ZeroField;
    use crate::hit::{Hit, PixelHit};
    use crate::material::MaterialEffects;
    use approx::assert_abs_diff_eq;

    fn detector() -> Detector {
        Detector::new(
            (1..=5)
                .map(|i| crate::plane::DetectorPlane::at_z(format!("p{i}"), i as f64, 0.0, 0.0))
                .collect(),
        )
    }

    fn pixel(x: f64, y: f64, z: f64) -> Hit {
        Hit::Pixel(PixelHit {
            x,
            y,
            dx: 0.01,
            dy: 0.01,
            dxy: 0.0,
            z,
        })
    }

    /// Hits on an exact straight line through planes z = 1..=5.
    fn straight_track(tx: f64, ty: f64) -> Track {
        let hits = (1..=5)
            .map(|i| {
                let z = i as f64;
                pixel(tx * z, ty * z, z)
            })
            .collect();
        Track::new(hits, TrackParam::seed(0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 999.0))
    }

    fn fitter() -> TrackFitter<Rk4Extrapolator<ZeroField>> {
        let propagator =
            TrackPropagator::new(Rk4Extrapolator::new(ZeroField), MaterialEffects::default());
        TrackFitter::new(propagator, KalmanFilter)
    }

    #[test]
    fn downstream_fit_recovers_straight_line() {
        let mut track = straight_track(0.0, 0.1);
        fitter().fit(&mut track, &detector(), true).unwrap();

        assert_eq!(track.status, FitStatus::Success);
        assert_eq!(track.nodes.len(), 5);
        assert_eq!(track.ndf, 5);
        // Zero-noise hits: essentially perfect recovery.
        assert!(track.chi2 < 1e-6, "chi2 = {}", track.chi2);
        assert_abs_diff_eq!(track.param_last.ty, 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(track.param_last.tx, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(track.param_last.y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn chi2_is_additive_over_nodes() {
        let mut track = straight_track(0.02, -0.05);
        fitter().fit(&mut track, &detector(), true).unwrap();
        assert_abs_diff_eq!(track.chi2, track.node_chi2_sum(), epsilon = 1e-12);
    }

    #[test]
    fn failed_pass_keeps_no_partial_nodes() {
        let mut track = straight_track(0.0, 0.0);
        // Poison one hit with a zero measurement variance against a zero
        // prior on that axis: the update must fail.
        track = {
            let mut hits: Vec<Hit> = track.hits().to_vec();
            hits[2] = Hit::Pixel(PixelHit {
                x: 0.0,
                y: 0.0,
                dx: 0.0,
                dy: 0.0,
                dxy: 0.0,
                z: 3.0,
            });
            let mut t = Track::new(hits, TrackParam::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0));
            // Zero seed covariance so S is exactly singular at the poisoned hit.
            t.param_first.cov = crate::cov::CovMatrix::zeros();
            t
        };
        let err = fitter().fit(&mut track, &detector(), true);
        assert!(err.is_err());
        assert_eq!(track.status, FitStatus::Failed);
        assert!(track.nodes.is_empty());
    }

    #[test]
    fn iterative_fit_rejects_injected_outlier() {
        let mut track = straight_track(0.0, 0.1);
        // Replace the middle hit with one far off the trajectory.
        let mut hits: Vec<Hit> = track.hits().to_vec();
        hits[2] = pixel(3.0, 0.0, 3.0);
        track = Track::new(hits, TrackParam::seed(0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 999.0));

        let config = IterativeFitConfig {
            chi2_cut: 10.0,
            min_hits: 4,
            ..Default::default()
        };
        let iterative = IterativeTrackFitter::new(fitter(), config);
        iterative.fit(&mut track, &detector()).unwrap();

        assert_eq!(track.n_hits(), 4, "the outlier should be gone");
        assert!(track.chi2 < 1e-6, "refit chi2 = {}", track.chi2);
        assert!(track.nodes.iter().all(|n| n.smoothed.is_some()));
    }

    #[test]
    fn iterative_fit_fails_closed_below_min_hits() {
        let mut track = straight_track(0.0, 0.1);
        let mut hits: Vec<Hit> = track.hits().to_vec();
        hits[2] = pixel(3.0, 0.0, 3.0);
        track = Track::new(hits, TrackParam::seed(0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 999.0));

        let config = IterativeFitConfig {
            chi2_cut: 10.0,
            min_hits: 5,
            ..Default::default()
        };
        let iterative = IterativeTrackFitter::new(fitter(), config);
        let res = iterative.fit(&mut track, &detector());
        assert!(matches!(res, Err(FitError::TooFewHits { .. })));
        assert_eq!(track.status, FitStatus::Failed);
    }

    #[test]
    fn parallel_batch_fit_matches_serial() {
        let f = fitter();
        let det = detector();
        let mut batch: Vec<Track> = (0..8)
            .map(|i| straight_track(0.01 * i as f64, 0.1))
            .collect();
        let mut serial = batch.clone();

        let results = fit_tracks_parallel(&f, &mut batch, &det, true);
        assert!(results.iter().all(Result::is_ok));
        for track in &mut serial {
            f.fit(track, &det, true).unwrap();
        }
        for (a, b) in batch.iter().zip(&serial) {
            assert_abs_diff_eq!(a.chi2, b.chi2, epsilon = 1e-12);
            assert_abs_diff_eq!(a.param_last.x, b.param_last.x, epsilon = 1e-12);
        }
    }
}
