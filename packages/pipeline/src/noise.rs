//! Noise aggregation.
//!
//! Strategic noise maps are polygons classed by decibel band. Each
//! postcode takes the loudest covering band per metric across the road and
//! rail layers, or the quiet fallback level when nothing covers it. The
//! district score follows from the mean Lden.

use std::collections::BTreeMap;

use envhealth_postcode::PostcodePoint;
use envhealth_score_models::thresholds::{NoiseThresholds, score_from_risk};
use envhealth_score_models::{BandLadder, ComponentResult, NoiseMetric, NoiseSource, metrics};
use envhealth_spatial::geometry::{property_str, to_multipolygon};
use envhealth_spatial::{GeoFeature, PolygonValueIndex};
use geo::MultiPolygon;

use crate::stats;

/// Lower bound of a noise class label: `"55.0-59.9"` and `">=75.0"` give
/// 55 and 75.
#[must_use]
pub fn class_lower_bound(label: &str) -> Option<f64> {
    let start = label.find(|c: char| c.is_ascii_digit())?;
    let rest = &label[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Polygons of one layer with their representative levels.
#[derive(Debug, Clone, Default)]
pub struct NoiseLayerLoad {
    /// Polygons and representative dB values.
    pub polygons: Vec<(MultiPolygon<f64>, f64)>,
    /// Features whose class was missing, unparsable, or below the table.
    pub unknown_class: u64,
    /// Features with non-polygonal geometry.
    pub bad_geometry: u64,
}

/// Maps noise features to representative levels via the step table.
#[must_use]
pub fn classify_features(
    features: &[GeoFeature],
    class_field: &str,
    thresholds: &NoiseThresholds,
) -> NoiseLayerLoad {
    let mut load = NoiseLayerLoad::default();

    for feature in features {
        let level = property_str(&feature.properties, class_field)
            .as_deref()
            .and_then(class_lower_bound)
            .and_then(|lower| thresholds.representative_db(lower));

        let Some(level) = level else {
            log::debug!(
                "Skipping noise polygon with class {:?}",
                feature.properties.get(class_field)
            );
            load.unknown_class += 1;
            continue;
        };

        match to_multipolygon(&feature.geometry) {
            Ok(polygon) => load.polygons.push((polygon, level)),
            Err(e) => {
                log::debug!("Skipping noise feature: {e}");
                load.bad_geometry += 1;
            }
        }
    }

    load
}

/// Containment indexes for each loaded noise layer.
#[derive(Default)]
pub struct NoiseLayers {
    layers: BTreeMap<(NoiseSource, NoiseMetric), PolygonValueIndex>,
}

impl NoiseLayers {
    /// Creates an empty layer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes one layer, replacing any previous one.
    pub fn insert(
        &mut self,
        source: NoiseSource,
        metric: NoiseMetric,
        polygons: Vec<(MultiPolygon<f64>, f64)>,
    ) {
        log::info!("Indexed {} {source} {metric} noise polygons", polygons.len());
        self.layers
            .insert((source, metric), PolygonValueIndex::new(polygons));
    }

    /// Loudest level covering `point` for `metric` across all sources.
    #[must_use]
    pub fn level(&self, point: &PostcodePoint, metric: NoiseMetric) -> Option<f64> {
        self.layers
            .iter()
            .filter(|((_, m), _)| *m == metric)
            .filter_map(|(_, index)| index.max_containing(point.x, point.y))
            .reduce(f64::max)
    }
}

/// Scores one district's noise exposure. The band labels the risk, not the
/// score.
#[must_use]
pub fn aggregate(
    points: &[&PostcodePoint],
    layers: &NoiseLayers,
    thresholds: &NoiseThresholds,
    ladder: &BandLadder,
) -> ComponentResult {
    let district_mean = |metric: NoiseMetric| {
        let levels: Vec<f64> = points
            .iter()
            .map(|p| layers.level(p, metric).unwrap_or(thresholds.fallback_db))
            .collect();
        stats::mean(&levels)
    };

    let lden = district_mean(NoiseMetric::Lden);
    let lnight = district_mean(NoiseMetric::Lnight);
    let risk = lden.map(|db| thresholds.risk(db));

    let raw_metrics = BTreeMap::from([
        (metrics::MEAN_LDEN_DB.to_string(), lden),
        (metrics::MEAN_LNIGHT_DB.to_string(), lnight),
        (metrics::NOISE_RISK.to_string(), risk),
    ]);

    match risk {
        Some(risk) => {
            ComponentResult::scored(score_from_risk(risk), ladder.classify(risk), raw_metrics)
        }
        None => ComponentResult::uncomputed(raw_metrics),
    }
}
