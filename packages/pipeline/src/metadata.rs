//! Run metadata written next to the baseline.
//!
//! Everything that varies between runs on identical inputs (the
//! timestamp) lives here rather than in the baseline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use envhealth_postcode::ResolveStats;
use envhealth_score_models::{DistrictRecord, Pollutant};
use serde::{Deserialize, Serialize};

/// Counts from one pollutant grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCounts {
    /// Cells indexed.
    pub cells: u64,
    /// Rows skipped.
    pub skipped: u64,
}

/// Counts from one noise layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCounts {
    /// Polygons indexed.
    pub polygons: u64,
    /// Features with an unknown or sub-threshold class.
    pub unknown_class: u64,
    /// Features with missing, empty, or non-polygonal geometry.
    pub bad_geometry: u64,
}

/// Counts from the greenspace layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenspaceCounts {
    /// Public sites indexed.
    pub public_sites: u64,
    /// Sites excluded as private or restricted.
    pub not_public: u64,
    /// Site features with missing, empty, or non-polygonal geometry.
    pub bad_geometry: u64,
    /// Access points indexed.
    pub access_points: u64,
    /// Access point features skipped.
    pub access_points_skipped: u64,
}

/// Record counts and skip counts per input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCounts {
    /// Postcode directory.
    pub postcodes: ResolveStats,
    /// Pollutant grids, by pollutant.
    pub air: BTreeMap<Pollutant, GridCounts>,
    /// Noise layers, keyed `source_metric`.
    pub noise: BTreeMap<String, LayerCounts>,
    /// Greenspace layers.
    pub greenspace: GreenspaceCounts,
    /// District names loaded.
    pub district_names: u64,
}

/// Districts with no coverage per domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageCounts {
    /// Districts without an air score.
    pub air_uncovered: u64,
    /// Districts without a noise score.
    pub noise_uncovered: u64,
    /// Districts without a greenspace score.
    pub greenspace_uncovered: u64,
    /// Districts without an overall score.
    pub overall_null: u64,
    /// Districts with no located postcode.
    pub without_postcodes: u64,
}

impl CoverageCounts {
    /// Tallies coverage gaps across records.
    #[must_use]
    pub fn from_records(records: &[DistrictRecord]) -> Self {
        let count = |gap: fn(&DistrictRecord) -> bool| {
            records.iter().filter(|r| gap(r)).count() as u64
        };

        Self {
            air_uncovered: count(|r| !r.components.air.is_computed()),
            noise_uncovered: count(|r| !r.components.noise.is_computed()),
            greenspace_uncovered: count(|r| !r.components.greenspace.is_computed()),
            overall_null: count(|r| r.score_overall.is_none()),
            without_postcodes: count(|r| r.confidence.postcode_count == 0),
        }
    }
}

/// Metadata of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Version of the pipeline that produced the baseline.
    pub pipeline_version: String,
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// City name.
    pub city: String,
    /// EPSG code of the working CRS.
    pub target_epsg: u32,
    /// Number of district records emitted.
    pub district_count: u64,
    /// Input record and skip counts.
    pub inputs: InputCounts,
    /// Coverage gaps.
    pub coverage: CoverageCounts,
}

impl RunMetadata {
    /// Builds metadata for a finished run, stamped with the current time.
    #[must_use]
    pub fn new(
        city: &str,
        target_epsg: u32,
        inputs: InputCounts,
        records: &[DistrictRecord],
    ) -> Self {
        Self {
            pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            city: city.to_string(),
            target_epsg,
            district_count: records.len() as u64,
            inputs,
            coverage: CoverageCounts::from_records(records),
        }
    }
}
