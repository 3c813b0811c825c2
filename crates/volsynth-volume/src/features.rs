//! Histogram clustering of voxel values into [`ClusterFeature`]s.
//!
//! Each cluster gets a centroid (mean x, y, z and value), a spatial variance
//! (sum of squared distances of its members from the centroid) and the
//! distance from its centroid to the volume's geometric center.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use volsynth_core::math::sturges;
use volsynth_core::{Centroid, ClusterFeature, Dimensions, Sample};

use crate::error::VolumeError;

/// How samples are partitioned into `sturges(n)` value bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Binning {
    /// Contiguous runs of the value-sorted samples with sizes differing by at
    /// most one. Always yields exactly `sturges(n)` non-empty clusters.
    #[default]
    EqualCount,
    /// Equal-width value intervals over [min, max], the last one closed.
    /// Empty intervals are dropped, so fewer clusters may result.
    EqualWidth,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    pub binning: Binning,
}

impl FeatureExtractor {
    pub fn new(binning: Binning) -> Self {
        Self { binning }
    }

    /// Bin `samples` and summarize each bin. Clusters are ordered by
    /// increasing value range.
    pub fn extract(
        &self,
        samples: &[Sample],
        dimensions: Dimensions,
    ) -> Result<Vec<ClusterFeature>, VolumeError> {
        if samples.is_empty() {
            return Err(VolumeError::EmptyVolume);
        }

        let mut sorted: Vec<Sample> = samples.to_vec();
        sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

        let bins = sturges(sorted.len());
        let center = dimensions.center();
        let features: Vec<ClusterFeature> = match self.binning {
            Binning::EqualCount => equal_count_bins(&sorted, bins)
                .map(|bin| summarize(bin, center))
                .collect(),
            Binning::EqualWidth => equal_width_bins(&sorted, bins)
                .into_iter()
                .filter(|bin| !bin.is_empty())
                .map(|bin| summarize(bin, center))
                .collect(),
        };

        log::debug!(
            "Extracted {} clusters from {} samples ({:?})",
            features.len(),
            samples.len(),
            self.binning
        );
        Ok(features)
    }
}

/// Extract features with the default equal-count binning.
pub fn extract_features(
    samples: &[Sample],
    dimensions: Dimensions,
) -> Result<Vec<ClusterFeature>, VolumeError> {
    FeatureExtractor::default().extract(samples, dimensions)
}

fn equal_count_bins(sorted: &[Sample], bins: usize) -> impl Iterator<Item = &[Sample]> {
    let n = sorted.len();
    (0..bins).map(move |i| &sorted[i * n / bins..(i + 1) * n / bins])
}

fn equal_width_bins(sorted: &[Sample], bins: usize) -> Vec<&[Sample]> {
    let min = sorted[0].value;
    let max = sorted[sorted.len() - 1].value;
    let width = (max - min) / bins as f64;

    let mut out = Vec::with_capacity(bins);
    let mut start = 0;
    for i in 0..bins {
        let end = if i + 1 == bins || width == 0.0 {
            sorted.len()
        } else {
            let upper = min + width * (i + 1) as f64;
            start + sorted[start..].partition_point(|s| s.value < upper)
        };
        out.push(&sorted[start..end]);
        start = end;
    }
    out
}

fn summarize(bin: &[Sample], center: DVec3) -> ClusterFeature {
    let count = bin.len() as f64;
    let (position_sum, value_sum) = bin
        .iter()
        .fold((DVec3::ZERO, 0.0), |(p, v), s| (p + s.position(), v + s.value));
    let mean = position_sum / count;

    let variance = bin
        .iter()
        .map(|s| s.position().distance_squared(mean))
        .sum();

    ClusterFeature {
        min_value: bin[0].value,
        max_value: bin[bin.len() - 1].value,
        point_count: bin.len(),
        centroid: Centroid {
            x: mean.x,
            y: mean.y,
            z: mean.z,
            v: value_sum / count,
        },
        variance,
        distance_to_volume_center: mean.distance(center),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume(n: u32) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(i % 7, (i / 7) % 5, i / 35, ((i * 37) % 256) as f64))
            .collect()
    }

    #[test]
    fn test_empty_volume_fails() {
        let result = extract_features(&[], Dimensions::new(1, 1, 1));
        assert!(matches!(result, Err(VolumeError::EmptyVolume)));
    }

    #[test]
    fn test_exact_sturges_count_and_valid_clusters() {
        for n in [1u32, 2, 3, 10, 100, 257, 1000] {
            let samples = ramp_volume(n);
            let features = extract_features(&samples, Dimensions::new(7, 5, 30)).expect("features");
            assert_eq!(features.len(), sturges(n as usize), "n = {n}");
            let total: usize = features.iter().map(|f| f.point_count).sum();
            assert_eq!(total, n as usize);
            for f in &features {
                assert!(f.point_count >= 1);
                assert!(f.variance >= 0.0);
                assert!(f.min_value <= f.max_value);
            }
        }
    }

    #[test]
    fn test_constant_volume_still_yields_sturges_bins() {
        let samples: Vec<Sample> = (0..16).map(|i| Sample::new(i, 0, 0, 42.0)).collect();
        let features = extract_features(&samples, Dimensions::new(16, 1, 1)).expect("features");
        assert_eq!(features.len(), 5);
        assert!(features.iter().all(|f| f.centroid.v == 42.0));
    }

    #[test]
    fn test_clusters_ordered_by_value() {
        let samples = ramp_volume(500);
        let features = extract_features(&samples, Dimensions::new(7, 5, 15)).expect("features");
        for pair in features.windows(2) {
            assert!(pair[0].max_value <= pair[1].min_value);
            assert!(pair[0].centroid.v <= pair[1].centroid.v);
        }
    }

    #[test]
    fn test_single_member_has_zero_variance() {
        let samples = vec![Sample::new(3, 4, 0, 10.0)];
        let features = extract_features(&samples, Dimensions::new(6, 8, 2)).expect("features");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].variance, 0.0);
        // centroid (3,4,0) vs center (3,4,1)
        assert!((features[0].distance_to_volume_center - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_and_variance() {
        // Two samples per bin; n = 4 -> 3 bins of sizes 1, 1, 2.
        let samples = vec![
            Sample::new(0, 0, 0, 10.0),
            Sample::new(0, 0, 0, 20.0),
            Sample::new(0, 0, 0, 30.0),
            Sample::new(2, 0, 0, 30.0),
        ];
        let features = extract_features(&samples, Dimensions::new(2, 2, 2)).expect("features");
        assert_eq!(features.len(), 3);
        let last = &features[2];
        assert_eq!(last.point_count, 2);
        assert_eq!(last.centroid.x, 1.0);
        assert_eq!(last.centroid.v, 30.0);
        // each member is 1 voxel from the centroid
        assert!((last.variance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_width_drops_empty_bins() {
        let mut samples: Vec<Sample> = (0..50).map(|i| Sample::new(i, 0, 0, 0.0)).collect();
        samples.extend((0..50).map(|i| Sample::new(i, 1, 0, 255.0)));
        let extractor = FeatureExtractor::new(Binning::EqualWidth);
        let features = extractor
            .extract(&samples, Dimensions::new(50, 2, 1))
            .expect("features");
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].point_count, 50);
        assert_eq!(features[1].centroid.v, 255.0);
    }

    #[test]
    fn test_equal_width_single_value() {
        let samples: Vec<Sample> = (0..8).map(|i| Sample::new(i, 0, 0, 5.0)).collect();
        let features = FeatureExtractor::new(Binning::EqualWidth)
            .extract(&samples, Dimensions::new(8, 1, 1))
            .expect("features");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].point_count, 8);
    }
}
