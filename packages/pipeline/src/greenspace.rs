//! Greenspace aggregation.
//!
//! Two sub-metrics per district:
//!
//! * **Access**: postcode distance to the nearest public site (or
//!   designated access point), summarised by mean and 75th percentile.
//!   Purely local to the district.
//! * **Capacity**: public site area attributed to the district per
//!   postcode, turned into a risk by its percentile rank across the whole
//!   city. This needs every district's value first, so it runs as a
//!   separate citywide pass after the local one.

use std::collections::BTreeMap;

use envhealth_postcode::{DistrictCode, PostcodePoint};
use envhealth_score_models::thresholds::{GreenspaceThresholds, score_from_risk};
use envhealth_score_models::{BandLadder, ComponentResult, metrics};
use envhealth_spatial::geometry::{property_str, to_multipolygon, to_point};
use envhealth_spatial::{GeoFeature, NearestFeatureIndex, PointSampleIndex};
use geo::{Area as _, MultiPolygon};

use crate::config::GreenspaceConfig;
use crate::stats;

/// Public sites kept from a greenspace layer.
#[derive(Debug, Clone, Default)]
pub struct SiteLoad {
    /// Public site polygons.
    pub sites: Vec<MultiPolygon<f64>>,
    /// Sites dropped as private or restricted.
    pub not_public: u64,
    /// Features with non-polygonal geometry.
    pub bad_geometry: u64,
}

/// Keeps the public polygons of a greenspace layer.
#[must_use]
pub fn public_sites(features: &[GeoFeature], config: &GreenspaceConfig) -> SiteLoad {
    let mut load = SiteLoad::default();

    for feature in features {
        let access = property_str(&feature.properties, &config.access_field);
        if !config.is_public(access.as_deref()) {
            load.not_public += 1;
            continue;
        }

        match to_multipolygon(&feature.geometry) {
            Ok(polygon) => load.sites.push(polygon),
            Err(e) => {
                log::debug!("Skipping greenspace feature: {e}");
                load.bad_geometry += 1;
            }
        }
    }

    load
}

/// Extracts access point coordinates, returning them with the number of
/// non-point features skipped.
#[must_use]
pub fn access_points(features: &[GeoFeature]) -> (Vec<(f64, f64)>, u64) {
    let mut points = Vec::with_capacity(features.len());
    let mut skipped = 0;

    for feature in features {
        match to_point(&feature.geometry) {
            Ok(p) => points.push((p.x(), p.y())),
            Err(e) => {
                log::debug!("Skipping access point: {e}");
                skipped += 1;
            }
        }
    }

    (points, skipped)
}

struct Site {
    area_m2: f64,
    polygon: MultiPolygon<f64>,
}

/// Indexed public greenspace of a city.
pub struct Greenspace {
    access: NearestFeatureIndex,
    sites: Vec<Site>,
}

impl Greenspace {
    /// Builds the access index from designated access points when any are
    /// given, otherwise from the site boundaries.
    #[must_use]
    pub fn new(sites: Vec<MultiPolygon<f64>>, access_points: Vec<(f64, f64)>) -> Self {
        let access = if access_points.is_empty() {
            log::info!("Measuring access to {} site boundaries", sites.len());
            NearestFeatureIndex::from_polygons(sites.iter().cloned())
        } else {
            log::info!("Measuring access to {} access points", access_points.len());
            NearestFeatureIndex::from_points(access_points)
        };

        let sites = sites
            .into_iter()
            .map(|polygon| Site {
                area_m2: polygon.unsigned_area(),
                polygon,
            })
            .collect();

        Self { access, sites }
    }

    /// Whether any public site was loaded.
    #[must_use]
    pub fn has_sites(&self) -> bool {
        !self.sites.is_empty()
    }

    /// Distance from a postcode to the nearest site or access point.
    #[must_use]
    pub fn nearest_distance(&self, point: &PostcodePoint) -> Option<f64> {
        self.access.nearest_distance(point.x, point.y)
    }

    /// Attributes each site's area to the district of the postcode nearest
    /// to the site itself, measured to its boundary. A postcode inside the
    /// site is at distance zero.
    #[must_use]
    pub fn attribute_areas(&self, points: &[PostcodePoint]) -> BTreeMap<DistrictCode, f64> {
        let nearest = PointSampleIndex::new(points.iter().map(|p| (p.x, p.y, &p.district)));
        let mut areas = BTreeMap::new();

        for site in &self.sites {
            if let Some((district, _)) = nearest.nearest_to_polygon(&site.polygon) {
                *areas.entry((*district).clone()).or_insert(0.0) += site.area_m2;
            }
        }

        areas
    }
}

/// Access distances of one district (local phase).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistrictAccess {
    /// Mean nearest-site distance (m).
    pub mean_m: Option<f64>,
    /// 75th-percentile nearest-site distance (m).
    pub p75_m: Option<f64>,
}

/// Measures postcode access distances for one district.
#[must_use]
pub fn measure_access(points: &[&PostcodePoint], greenspace: &Greenspace) -> DistrictAccess {
    let distances: Vec<f64> = points
        .iter()
        .filter_map(|p| greenspace.nearest_distance(p))
        .collect();

    DistrictAccess {
        mean_m: stats::mean(&distances),
        p75_m: stats::quantile(&distances, 0.75),
    }
}

/// Capacity inputs of one district.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistrictCapacity {
    /// Attributed public area (m²).
    pub total_m2: f64,
    /// Area per located postcode (m²), `None` without postcodes.
    pub per_postcode_m2: Option<f64>,
}

impl DistrictCapacity {
    /// Capacity from attributed area and postcode count.
    #[must_use]
    pub fn new(total_m2: f64, postcode_count: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let per_postcode_m2 = (postcode_count > 0).then(|| total_m2 / postcode_count as f64);
        Self {
            total_m2,
            per_postcode_m2,
        }
    }
}

/// Citywide phase: capacity risk of every district with a computable
/// area-per-postcode, from its percentile rank (lower rank, higher risk).
#[must_use]
pub fn capacity_risks(
    capacities: &BTreeMap<DistrictCode, DistrictCapacity>,
) -> BTreeMap<DistrictCode, f64> {
    let (districts, values): (Vec<&DistrictCode>, Vec<f64>) = capacities
        .iter()
        .filter_map(|(district, c)| c.per_postcode_m2.map(|v| (district, v)))
        .unzip();

    districts
        .into_iter()
        .cloned()
        .zip(stats::percentile_ranks(&values))
        .map(|(district, pct)| (district, 1.0 - pct))
        .collect()
}

/// Scores one district from its access distances and capacity risk.
#[must_use]
pub fn score(
    access: DistrictAccess,
    capacity: Option<DistrictCapacity>,
    capacity_risk: Option<f64>,
    thresholds: &GreenspaceThresholds,
    ladder: &BandLadder,
) -> ComponentResult {
    let access_risk = match (access.mean_m, access.p75_m) {
        (Some(mean), Some(p75)) => {
            Some(thresholds.access_risk(thresholds.access_distance(mean, p75)))
        }
        _ => None,
    };

    let raw_metrics = BTreeMap::from([
        (
            metrics::TOTAL_GREENSPACE_M2.to_string(),
            capacity.map(|c| c.total_m2),
        ),
        (metrics::MEAN_DISTANCE_M.to_string(), access.mean_m),
        (metrics::P75_DISTANCE_M.to_string(), access.p75_m),
        (
            metrics::PER_POSTCODE_M2.to_string(),
            capacity.and_then(|c| c.per_postcode_m2),
        ),
    ]);

    match thresholds.blend_risk(access_risk, capacity_risk) {
        Some(risk) => {
            let score = score_from_risk(risk);
            ComponentResult::scored(score, ladder.classify(score), raw_metrics)
        }
        None => ComponentResult::uncomputed(raw_metrics),
    }
}
