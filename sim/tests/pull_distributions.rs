//! Statistical validation: over many independently smeared tracks the fit
//! pulls must be centered near zero with width near one, and chi2/NDF must
//! average near one — the covariance the fit reports has to mean what it
//! says.

use fitter_core::{
    ConstantField, Hit, KalmanFilter, MaterialEffects, Rk4Extrapolator, Track, TrackFitter,
    TrackParam, TrackPropagator,
};
use sim::smear::SmearConfig;
use sim::{stereo_strip_detector, FitPulls, ParamSmearer, StripHitGenerator, TruthPropagator};

#[test]
fn strip_fit_pulls_are_standard_normal() {
    let z_pairs = [
        (88.0, 96.0),
        (188.0, 196.0),
        (288.0, 296.0),
        (488.0, 496.0),
        (688.0, 696.0),
        (888.0, 896.0),
    ];
    let detector = stereo_strip_detector(&z_pairs, 0.1, 0.0);
    let field = ConstantField::new(0.0, -0.24, 0.0);
    let sigma_u = 1e-3;

    let truth = TrackParam::new(0.0, 0.0, 0.0, 0.1, 1.0, 0.0);
    let truth_prop = TruthPropagator::new(field);
    let states = truth_prop.states_at_planes(&truth, &detector).unwrap();

    let propagator =
        TrackPropagator::new(Rk4Extrapolator::new(field), MaterialEffects::default());
    let fitter = TrackFitter::new(propagator, KalmanFilter);

    let n_trials: u64 = 40;
    let mut pulls = FitPulls::default();
    let mut smearer = ParamSmearer::new(SmearConfig::default(), 77);

    for trial in 0..n_trials {
        let mut track = Track::default();
        for (i, (plane, state)) in detector.planes().iter().zip(&states).enumerate() {
            let mut gen =
                StripHitGenerator::new(plane.phi, sigma_u, trial * 1000 + i as u64);
            track.add_hit(Hit::DetPlaneStrip(gen.generate_on_plane(
                state.x,
                state.y,
                plane,
            )));
        }
        // Seed the upstream pass from a smeared copy of the truth at the
        // last plane, with the inflated seed covariance.
        track.param_first = TrackParam::seed(0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 999.0);
        track.param_last = smearer.smear(states.last().unwrap());

        fitter.fit(&mut track, &detector, false).unwrap();
        pulls.add_chi2(track.chi2, track.ndf);

        // Compare at the first plane, where the upstream pass ends.
        let truth_at_first = &states[0];
        pulls.add(&track.param_first, truth_at_first);
    }

    // Mean chi2/NDF near one: the per-hit variances are consistent.
    let mean_chi2 = pulls.chi2_over_ndf.mean();
    assert!(
        (0.4..2.5).contains(&mean_chi2),
        "mean chi2/ndf = {mean_chi2}"
    );

    // Pulls centered with unit-ish width for every component.
    for (i, label) in FitPulls::LABELS.iter().enumerate() {
        let mean = pulls.pulls[i].mean();
        let rms = pulls.pulls[i].rms();
        assert!(
            mean.abs() < 1.0,
            "{label} pull mean = {mean} over {n_trials} trials"
        );
        assert!(
            (0.3..3.0).contains(&rms),
            "{label} pull rms = {rms} over {n_trials} trials"
        );
    }
}
