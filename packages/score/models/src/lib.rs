#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! District environmental-health record types and scoring configuration.
//!
//! This crate defines the output contract consumed by the dashboard
//! ([`DistrictRecord`] and friends), the shared qualitative band ladders,
//! and the immutable threshold/weight tables every aggregator is
//! parameterised by. It performs no I/O.

pub mod bands;
pub mod thresholds;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use bands::{BandLadder, BandLadders, BandStep, LadderOrder};

/// Raw metric keys emitted alongside each component score.
pub mod metrics {
    /// District mean NO₂ concentration (µg/m³).
    pub const NO2_UG_M3: &str = "no2_ug_m3";
    /// District mean PM₁₀ concentration (µg/m³).
    pub const PM10_UG_M3: &str = "pm10_ug_m3";
    /// District mean PM₂.₅ concentration (µg/m³).
    pub const PM25_UG_M3: &str = "pm25_ug_m3";
    /// District mean day-evening-night level (dB).
    pub const MEAN_LDEN_DB: &str = "mean_lden_db";
    /// District mean night level (dB).
    pub const MEAN_LNIGHT_DB: &str = "mean_lnight_db";
    /// Normalised noise risk in `[0, 1]`.
    pub const NOISE_RISK: &str = "risk";
    /// Public greenspace area attributed to the district (m²).
    pub const TOTAL_GREENSPACE_M2: &str = "total_greenspace_m2";
    /// Mean postcode distance to the nearest greenspace (m).
    pub const MEAN_DISTANCE_M: &str = "mean_distance_m";
    /// 75th-percentile postcode distance to the nearest greenspace (m).
    pub const P75_DISTANCE_M: &str = "p75_distance_m";
    /// Attributed greenspace area divided by postcode count (m²).
    pub const PER_POSTCODE_M2: &str = "per_postcode_m2";
}

/// Errors raised when scoring configuration is unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Missing, inverted, or degenerate threshold/weight configuration.
    #[error("Threshold configuration error: {message}")]
    Threshold {
        /// Description of what went wrong.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn threshold(message: impl Into<String>) -> Self {
        Self::Threshold {
            message: message.into(),
        }
    }
}

/// Air pollutants sampled from the background concentration grids.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pollutant {
    /// Nitrogen dioxide
    No2,
    /// Particulate matter ≤ 10 µm
    Pm10,
    /// Particulate matter ≤ 2.5 µm
    Pm25,
}

impl Pollutant {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::No2, Self::Pm10, Self::Pm25]
    }

    /// Returns the raw metric key this pollutant's district mean is emitted
    /// under.
    #[must_use]
    pub const fn metric_key(self) -> &'static str {
        match self {
            Self::No2 => metrics::NO2_UG_M3,
            Self::Pm10 => metrics::PM10_UG_M3,
            Self::Pm25 => metrics::PM25_UG_M3,
        }
    }
}

/// Transport source a strategic noise layer was modelled for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoiseSource {
    /// Road traffic noise
    Road,
    /// Railway noise
    Rail,
}

/// Averaging period of a strategic noise layer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoiseMetric {
    /// Day-evening-night level
    Lden,
    /// Night-only level
    Lnight,
}

impl NoiseMetric {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Lden, Self::Lnight]
    }
}

/// Qualitative sample-density tier of a district.
///
/// Variants are declared lowest-first so the derived ordering matches the
/// tier ranking (`VeryLow < Low < Medium < High`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Too few postcodes for a stable mean
    VeryLow,
    /// Small sample
    Low,
    /// Moderate sample
    Medium,
    /// Large sample
    High,
}

/// Result of one scoring domain (air, noise, greenspace) for one district.
///
/// `score` is always within `[0, 100]` when present. `None` means the
/// district had no input coverage for the domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    /// Normalised 0–100 score, higher is healthier.
    pub score: Option<f64>,
    /// Qualitative label for the score (or for the risk, for noise).
    pub band: Option<String>,
    /// Underlying physical values kept for display and audit.
    #[serde(flatten)]
    pub raw_metrics: BTreeMap<String, Option<f64>>,
}

impl ComponentResult {
    /// Builds a computed component, clamping `score` into `[0, 100]`.
    ///
    /// A non-finite score is treated as uncomputed.
    #[must_use]
    pub fn scored(score: f64, band: &str, raw_metrics: BTreeMap<String, Option<f64>>) -> Self {
        if !score.is_finite() {
            return Self::uncomputed(raw_metrics);
        }

        Self {
            score: Some(score.clamp(0.0, 100.0)),
            band: Some(band.to_string()),
            raw_metrics,
        }
    }

    /// Builds a component with no score (a coverage gap).
    #[must_use]
    pub const fn uncomputed(raw_metrics: BTreeMap<String, Option<f64>>) -> Self {
        Self {
            score: None,
            band: None,
            raw_metrics,
        }
    }

    /// Returns whether this component has a score.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.score.is_some()
    }

    /// Returns a raw metric value by key.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.raw_metrics.get(key).copied().flatten()
    }
}

/// The three scoring components of a district.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    /// Air quality component.
    pub air: ComponentResult,
    /// Environmental noise component.
    pub noise: ComponentResult,
    /// Greenspace access and capacity component.
    pub greenspace: ComponentResult,
}

/// Sample-density confidence of a district.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// Qualitative tier.
    pub level: ConfidenceLevel,
    /// Display weight the dashboard uses to fade unreliable districts.
    pub weight: f64,
    /// Number of resolved postcodes in the district.
    pub postcode_count: u64,
}

/// One postal district's complete environmental-health record.
///
/// This is the unit of the baseline file; exactly one record exists per
/// district code in the postcode directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRecord {
    /// District code (e.g. `"B14"`).
    pub district: String,
    /// Display name for the district, if known.
    pub name: Option<String>,
    /// Weighted composite score, `None` when any component is missing.
    pub score_overall: Option<f64>,
    /// Qualitative label for `score_overall`.
    pub score_band: Option<String>,
    /// Per-domain results.
    pub components: Components,
    /// Sample-density confidence.
    pub confidence: ConfidenceResult,
}
