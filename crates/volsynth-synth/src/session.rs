//! Transfer-function synthesis session.
//!
//! A [`Synthesizer`] is created for one loaded volume from its cluster
//! features. It generates [`CANDIDATE_COUNT`] stochastic transfer functions
//! and, on each user selection, pulls every candidate toward the selected
//! one with jitter that shrinks every round.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use volsynth_core::constants::{
    CANDIDATE_COUNT, INITIAL_ADAPT_H, INITIAL_ADAPT_S, INITIAL_ADAPT_V, MAX_VALUE,
};
use volsynth_core::math::{jitter, linear_interp, power_interp, wrap_unit};
use volsynth_core::{hsv_to_rgba, ClusterFeature, ControlPoint, TransferFunction};

use crate::config::SynthesisConfig;
use crate::error::SynthError;

/// Jitter magnitudes for saturation seed, value seed and hue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRates {
    pub saturation: f64,
    pub value: f64,
    pub hue: f64,
}

impl Default for AdaptationRates {
    fn default() -> Self {
        Self {
            saturation: INITIAL_ADAPT_S,
            value: INITIAL_ADAPT_V,
            hue: INITIAL_ADAPT_H,
        }
    }
}

impl AdaptationRates {
    pub fn decay(&mut self, factor: f64) {
        self.saturation *= factor;
        self.value *= factor;
        self.hue *= factor;
    }
}

/// Per-cluster color state of one candidate. Seeds are the adapted
/// quantities; hue/saturation/value/alpha are derived from them and the
/// cluster's features.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterColorSettings {
    /// In [0, saturation_range].
    pub saturation_seed: f64,
    /// In [0, value_range].
    pub value_seed: f64,
    /// In [0, 1).
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
    pub alpha: f64,
}

/// Min/max reductions over the feature array, computed once per session.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeatureRanges {
    min_variance: f64,
    max_variance: f64,
    min_distance: f64,
    max_distance: f64,
}

impl FeatureRanges {
    fn of(features: &[ClusterFeature]) -> Self {
        let mut ranges = Self {
            min_variance: f64::INFINITY,
            max_variance: f64::NEG_INFINITY,
            min_distance: f64::INFINITY,
            max_distance: f64::NEG_INFINITY,
        };
        for f in features {
            ranges.min_variance = ranges.min_variance.min(f.variance);
            ranges.max_variance = ranges.max_variance.max(f.variance);
            ranges.min_distance = ranges.min_distance.min(f.distance_to_volume_center);
            ranges.max_distance = ranges.max_distance.max(f.distance_to_volume_center);
        }
        ranges
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    settings: Vec<ClusterColorSettings>,
    transfer_function: TransferFunction,
}

/// One synthesis session, scoped to one loaded volume.
pub struct Synthesizer<R = StdRng> {
    features: Vec<ClusterFeature>,
    /// Cluster indices sorted by centroid value; control points follow this order.
    order: Vec<usize>,
    ranges: FeatureRanges,
    rates: AdaptationRates,
    config: SynthesisConfig,
    candidates: Vec<Candidate>,
    rng: R,
    round: u32,
}

impl Synthesizer<StdRng> {
    /// Start a session, seeding the RNG from `config.seed` or OS entropy.
    pub fn new(features: Vec<ClusterFeature>, config: SynthesisConfig) -> Result<Self, SynthError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(features, config, rng)
    }
}

impl<R: Rng> Synthesizer<R> {
    /// Start a session with an injected RNG and generate the initial candidates.
    pub fn with_rng(
        features: Vec<ClusterFeature>,
        config: SynthesisConfig,
        rng: R,
    ) -> Result<Self, SynthError> {
        if features.is_empty() {
            return Err(SynthError::EmptyVolume);
        }

        let mut order: Vec<usize> = (0..features.len()).collect();
        order.sort_by(|&a, &b| features[a].centroid.v.total_cmp(&features[b].centroid.v));

        let mut session = Self {
            ranges: FeatureRanges::of(&features),
            rates: config.initial_rates,
            features,
            order,
            config,
            candidates: Vec::with_capacity(CANDIDATE_COUNT),
            rng,
            round: 0,
        };
        session.generate_initial();

        log::info!(
            "Synthesis session started: {} clusters, {} candidates",
            session.features.len(),
            session.candidates.len()
        );
        Ok(session)
    }

    fn generate_initial(&mut self) {
        for _ in 0..CANDIDATE_COUNT {
            let mut settings = Vec::with_capacity(self.features.len());
            for i in 0..self.features.len() {
                let saturation_seed = jitter(
                    self.config.start_saturation,
                    self.rates.saturation,
                    self.rng.gen(),
                )
                .clamp(0.0, self.config.saturation_range);
                let value_seed = jitter(self.config.start_value, self.rates.value, self.rng.gen())
                    .clamp(0.0, self.config.value_range);
                let hue = self.rng.gen::<f64>();
                settings.push(self.derive(i, saturation_seed, value_seed, hue));
            }
            let transfer_function = self.build_transfer_function(&settings);
            self.candidates.push(Candidate {
                settings,
                transfer_function,
            });
        }
        // A fresh session starts its first adaptation round at the initial
        // magnitudes; the rates are not decayed by initial generation.
        self.rates = self.config.initial_rates;
    }

    /// Adapt every candidate toward candidate `selected`. The others are
    /// derived first and the selected candidate last, all from the selected
    /// candidate's settings as they were before the round.
    pub fn adapt(&mut self, selected: usize) -> Result<Vec<TransferFunction>, SynthError> {
        if selected >= self.candidates.len() {
            return Err(SynthError::InvalidCandidateIndex {
                index: selected,
                count: self.candidates.len(),
            });
        }

        let basis = self.candidates[selected].settings.clone();
        let targets = (0..self.candidates.len())
            .filter(|&j| j != selected)
            .chain(std::iter::once(selected));

        for j in targets {
            let mut settings = Vec::with_capacity(basis.len());
            for (i, base) in basis.iter().enumerate() {
                let saturation_seed =
                    jitter(base.saturation_seed, self.rates.saturation, self.rng.gen())
                        .clamp(0.0, self.config.saturation_range);
                let value_seed = jitter(base.value_seed, self.rates.value, self.rng.gen())
                    .clamp(0.0, self.config.value_range);
                let hue = wrap_unit(jitter(base.hue, self.rates.hue, self.rng.gen()));
                settings.push(self.derive(i, saturation_seed, value_seed, hue));
            }
            let transfer_function = self.build_transfer_function(&settings);
            self.candidates[j] = Candidate {
                settings,
                transfer_function,
            };
        }

        self.rates.decay(self.config.decay);
        self.round += 1;

        log::debug!(
            "Adaptation round {} toward candidate {}: rates S={:.3} V={:.3} H={:.3}",
            self.round,
            selected,
            self.rates.saturation,
            self.rates.value,
            self.rates.hue
        );
        Ok(self.transfer_functions())
    }

    /// Color settings of cluster `cluster` from its seeds and hue, using the
    /// session-wide variance/distance ranges.
    fn derive(
        &self,
        cluster: usize,
        saturation_seed: f64,
        value_seed: f64,
        hue: f64,
    ) -> ClusterColorSettings {
        let c = &self.features[cluster];
        let r = &self.ranges;

        let saturation = 1.0
            / (1.0 + linear_interp(c.variance, r.min_variance, r.max_variance, 0.0, saturation_seed));
        let value = 1.0
            / (1.0
                + power_interp(
                    c.distance_to_volume_center,
                    r.min_distance,
                    r.max_distance,
                    0.0,
                    value_seed,
                    self.config.value_exponent,
                ));
        let alpha = 1.0 - linear_interp(c.variance, r.min_variance, r.max_variance, 0.0, 1.0);

        ClusterColorSettings {
            saturation_seed,
            value_seed,
            hue,
            saturation: saturation.clamp(0.0, 1.0),
            value: value.clamp(0.0, 1.0),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    fn build_transfer_function(&self, settings: &[ClusterColorSettings]) -> TransferFunction {
        let points = self
            .order
            .iter()
            .map(|&i| {
                let s = &settings[i];
                let position = self.features[i].centroid.v.round().clamp(0.0, MAX_VALUE) as u8;
                ControlPoint::new(position, hsv_to_rgba(s.hue, s.saturation, s.value, s.alpha))
            })
            .collect();
        TransferFunction::new(points)
    }

    /// The current candidate set.
    pub fn transfer_functions(&self) -> Vec<TransferFunction> {
        self.candidates
            .iter()
            .map(|c| c.transfer_function.clone())
            .collect()
    }

    pub fn candidate_settings(&self, index: usize) -> Option<&[ClusterColorSettings]> {
        self.candidates.get(index).map(|c| c.settings.as_slice())
    }

    pub fn rates(&self) -> AdaptationRates {
        self.rates
    }

    pub fn cluster_count(&self) -> usize {
        self.features.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Number of completed adaptation rounds.
    pub fn round(&self) -> u32 {
        self.round
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volsynth_core::Centroid;

    fn feature(v: f64, variance: f64, distance: f64) -> ClusterFeature {
        ClusterFeature {
            min_value: v,
            max_value: v,
            point_count: 1,
            centroid: Centroid {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                v,
            },
            variance,
            distance_to_volume_center: distance,
        }
    }

    fn two_clusters() -> Vec<ClusterFeature> {
        vec![feature(50.0, 0.0, 3.0), feature(200.0, 10.0, 8.0)]
    }

    fn seeded(features: Vec<ClusterFeature>, seed: u64) -> Synthesizer {
        Synthesizer::new(features, SynthesisConfig::default().with_seed(seed)).expect("session")
    }

    #[test]
    fn test_empty_features_rejected() {
        let result = Synthesizer::new(Vec::new(), SynthesisConfig::default());
        assert!(matches!(result, Err(SynthError::EmptyVolume)));
    }

    #[test]
    fn test_initial_generation_shape() {
        let session = seeded(two_clusters(), 1);
        let tfs = session.transfer_functions();
        assert_eq!(tfs.len(), CANDIDATE_COUNT);
        for tf in &tfs {
            assert_eq!(tf.len(), 2);
            assert_eq!(tf.points[0].position, 50);
            assert_eq!(tf.points[1].position, 200);
        }
    }

    #[test]
    fn test_alpha_follows_variance_for_any_seed() {
        for seed in 0..20 {
            let session = seeded(two_clusters(), seed);
            for k in 0..CANDIDATE_COUNT {
                let settings = session.candidate_settings(k).expect("candidate");
                assert!(settings[0].alpha > settings[1].alpha, "seed {seed} candidate {k}");
                assert_eq!(settings[0].alpha, 1.0);
                assert_eq!(settings[1].alpha, 0.0);
            }
        }
    }

    #[test]
    fn test_seeds_and_hue_in_range() {
        let mut session = seeded(two_clusters(), 9);
        for round in 0..6 {
            for k in 0..CANDIDATE_COUNT {
                for s in session.candidate_settings(k).expect("candidate") {
                    assert!((0.0..=100.0).contains(&s.saturation_seed));
                    assert!((0.0..=10.0).contains(&s.value_seed));
                    assert!((0.0..1.0).contains(&s.hue), "hue {} in round {round}", s.hue);
                    assert!((0.0..=1.0).contains(&s.saturation));
                    assert!((0.0..=1.0).contains(&s.value));
                    assert!((0.0..=1.0).contains(&s.alpha));
                }
            }
            session.adapt(round % CANDIDATE_COUNT).expect("adapt");
        }
    }

    #[test]
    fn test_fresh_session_rates_are_initial() {
        let session = seeded(two_clusters(), 3);
        assert_eq!(session.rates(), AdaptationRates::default());
        assert_eq!(session.round(), 0);
    }

    #[test]
    fn test_rates_decay_each_round() {
        let mut session = seeded(two_clusters(), 3);
        let mut previous = session.rates();
        for _ in 0..5 {
            session.adapt(2).expect("adapt");
            let current = session.rates();
            assert!((current.saturation - previous.saturation * 0.8).abs() < 1e-9);
            assert!((current.value - previous.value * 0.8).abs() < 1e-9);
            assert!((current.hue - previous.hue * 0.8).abs() < 1e-9);
            assert!(current.saturation < previous.saturation);
            previous = current;
        }
        assert_eq!(session.round(), 5);
    }

    #[test]
    fn test_new_session_resets_rates() {
        let mut session = seeded(two_clusters(), 3);
        session.adapt(0).expect("adapt");
        session.adapt(0).expect("adapt");
        let fresh = seeded(two_clusters(), 4);
        assert_eq!(fresh.rates(), AdaptationRates::default());
    }

    #[test]
    fn test_invalid_candidate_index() {
        let mut session = seeded(two_clusters(), 5);
        let result = session.adapt(CANDIDATE_COUNT);
        assert_eq!(
            result,
            Err(SynthError::InvalidCandidateIndex {
                index: CANDIDATE_COUNT,
                count: CANDIDATE_COUNT
            })
        );
        // failed call does not decay
        assert_eq!(session.rates(), AdaptationRates::default());
    }

    #[test]
    fn test_zero_rates_copy_selected_candidate() {
        let config = SynthesisConfig {
            seed: Some(11),
            ..SynthesisConfig::default()
        };
        let mut session = Synthesizer::new(two_clusters(), config).expect("session");
        let selected = 5;
        let before = session.candidate_settings(selected).expect("candidate").to_vec();

        // Shrink the jitter to zero so every candidate becomes the basis.
        session.rates = AdaptationRates {
            saturation: 0.0,
            value: 0.0,
            hue: 0.0,
        };
        let tfs = session.adapt(selected).expect("adapt");

        for k in 0..CANDIDATE_COUNT {
            let settings = session.candidate_settings(k).expect("candidate");
            for (after, basis) in settings.iter().zip(before.iter()) {
                assert_eq!(after.saturation_seed, basis.saturation_seed);
                assert_eq!(after.value_seed, basis.value_seed);
                assert!((after.hue - basis.hue).abs() < 1e-12);
            }
            assert_eq!(tfs[k], tfs[selected]);
        }
    }

    #[test]
    fn test_positions_stable_across_rounds() {
        let features = vec![
            feature(200.4, 1.0, 2.0),
            feature(12.6, 5.0, 1.0),
            feature(99.5, 0.5, 4.0),
        ];
        let mut session = seeded(features, 21);
        let initial: Vec<u8> = session.transfer_functions()[0]
            .points
            .iter()
            .map(|p| p.position)
            .collect();
        // sorted by centroid value, not by cluster index
        assert_eq!(initial, vec![13, 100, 200]);

        for round in 0..4 {
            let tfs = session.adapt(round).expect("adapt");
            assert_eq!(tfs.len(), CANDIDATE_COUNT);
            for tf in &tfs {
                let positions: Vec<u8> = tf.points.iter().map(|p| p.position).collect();
                assert_eq!(positions, initial);
            }
        }
        assert_eq!(session.cluster_count(), 3);
    }

    #[test]
    fn test_same_seed_reproducible() {
        let mut a = seeded(two_clusters(), 42);
        let mut b = seeded(two_clusters(), 42);
        assert_eq!(a.transfer_functions(), b.transfer_functions());
        assert_eq!(a.adapt(3).expect("adapt"), b.adapt(3).expect("adapt"));
    }

    #[test]
    fn test_single_cluster_is_opaque() {
        let session = seeded(vec![feature(128.0, 4.0, 2.0)], 8);
        for k in 0..CANDIDATE_COUNT {
            let s = session.candidate_settings(k).expect("candidate")[0];
            assert_eq!(s.alpha, 1.0);
            assert_eq!(s.saturation, 1.0);
            assert_eq!(s.value, 1.0);
        }
    }
}
