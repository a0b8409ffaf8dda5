//! Immutable threshold and weight tables the aggregators are parameterised
//! by.
//!
//! Every table has a `validate()` that rejects configurations which would
//! make a risk computation degenerate (equal or inverted bounds, zero weight
//! sums, non-finite values). Validation runs once at startup; the risk
//! helpers assume a validated table and never divide by zero.

use serde::{Deserialize, Serialize};

use crate::{ConfidenceLevel, ConfigError, Pollutant};

/// Tolerance used when checking that composite weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Clamps `value` into `[0, 1]`.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Maps a `[0, 1]` risk onto a 0–100 score (`100 × (1 − risk)`).
#[must_use]
pub fn score_from_risk(risk: f64) -> f64 {
    100.0 * (1.0 - clamp_unit(risk))
}

/// Linear risk between `lower` (risk 0) and `upper` (risk 1), clamped
/// outside that range.
#[must_use]
pub fn linear_risk(value: f64, lower: f64, upper: f64) -> f64 {
    clamp_unit((value - lower) / (upper - lower))
}

fn check_finite(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::threshold(format!("{name} must be finite")))
    }
}

fn check_bounds(name: &str, lower: f64, upper: f64) -> Result<(), ConfigError> {
    check_finite(&format!("{name} lower bound"), lower)?;
    check_finite(&format!("{name} upper bound"), upper)?;
    if upper <= lower {
        return Err(ConfigError::threshold(format!(
            "{name} upper bound ({upper}) must be greater than lower bound ({lower})"
        )));
    }
    Ok(())
}

fn check_weights(name: &str, weights: &[(&str, f64)]) -> Result<f64, ConfigError> {
    for (label, weight) in weights {
        check_finite(&format!("{name} weight '{label}'"), *weight)?;
        if *weight < 0.0 {
            return Err(ConfigError::threshold(format!(
                "{name} weight '{label}' must not be negative ({weight})"
            )));
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if sum <= 0.0 {
        return Err(ConfigError::threshold(format!(
            "{name} weights must not all be zero"
        )));
    }
    Ok(sum)
}

// ── Air ─────────────────────────────────────────────────────────────

/// Guideline concentration bounds for one pollutant (µg/m³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantBounds {
    /// Concentration at or below which risk is zero.
    pub safe: f64,
    /// Concentration at or above which risk is one.
    pub danger: f64,
}

impl PollutantBounds {
    /// Normalised risk for an observed concentration.
    #[must_use]
    pub fn risk(&self, observed: f64) -> f64 {
        linear_risk(observed, self.safe, self.danger)
    }

    /// 0–100 score for an observed concentration.
    #[must_use]
    pub fn score(&self, observed: f64) -> f64 {
        score_from_risk(self.risk(observed))
    }
}

/// Relative weight of each pollutant in the air score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantWeights {
    /// NO₂ weight.
    pub no2: f64,
    /// PM₁₀ weight.
    pub pm10: f64,
    /// PM₂.₅ weight.
    pub pm25: f64,
}

impl Default for PollutantWeights {
    fn default() -> Self {
        Self {
            no2: 1.0 / 3.0,
            pm10: 1.0 / 3.0,
            pm25: 1.0 / 3.0,
        }
    }
}

/// Air quality scoring table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirThresholds {
    /// NO₂ bounds.
    pub no2: PollutantBounds,
    /// PM₁₀ bounds.
    pub pm10: PollutantBounds,
    /// PM₂.₅ bounds.
    pub pm25: PollutantBounds,
    /// Per-pollutant sub-weights.
    pub weights: PollutantWeights,
    /// Nearest grid samples further than this from a postcode are ignored.
    pub max_sample_distance_m: Option<f64>,
}

impl Default for AirThresholds {
    /// WHO annual guideline as zero risk, UK/EU annual limit as full risk.
    fn default() -> Self {
        Self {
            no2: PollutantBounds {
                safe: 10.0,
                danger: 40.0,
            },
            pm10: PollutantBounds {
                safe: 15.0,
                danger: 40.0,
            },
            pm25: PollutantBounds {
                safe: 5.0,
                danger: 25.0,
            },
            weights: PollutantWeights::default(),
            max_sample_distance_m: Some(1500.0),
        }
    }
}

impl AirThresholds {
    /// Bounds for `pollutant`.
    #[must_use]
    pub const fn bounds(&self, pollutant: Pollutant) -> PollutantBounds {
        match pollutant {
            Pollutant::No2 => self.no2,
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm25 => self.pm25,
        }
    }

    /// Sub-weight for `pollutant`.
    #[must_use]
    pub const fn weight(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::No2 => self.weights.no2,
            Pollutant::Pm10 => self.weights.pm10,
            Pollutant::Pm25 => self.weights.pm25,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] if any bound pair is inverted or
    /// equal, or a weight is not positive. A pollutant is left out by not
    /// configuring its grid, never by a zero weight, so a district that
    /// sampled any pollutant always has a nonzero weight total.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for &pollutant in Pollutant::all() {
            let bounds = self.bounds(pollutant);
            check_bounds(&format!("air {pollutant}"), bounds.safe, bounds.danger)?;

            let weight = self.weight(pollutant);
            if weight <= 0.0 {
                return Err(ConfigError::threshold(format!(
                    "air weight '{pollutant}' must be positive ({weight})"
                )));
            }
        }
        check_weights(
            "air",
            &[
                ("no2", self.weights.no2),
                ("pm10", self.weights.pm10),
                ("pm25", self.weights.pm25),
            ],
        )?;
        if let Some(max) = self.max_sample_distance_m
            && !(max.is_finite() && max > 0.0)
        {
            return Err(ConfigError::threshold(format!(
                "air max_sample_distance_m must be positive ({max})"
            )));
        }
        Ok(())
    }
}

// ── Noise ───────────────────────────────────────────────────────────

/// One rung of the noise-class step table: classes whose lower bound is at
/// least `lower_db` (and below the next rung) map to `representative_db`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseStep {
    /// Inclusive lower bound of the class band (dB).
    pub lower_db: f64,
    /// Representative level assigned to the band (dB).
    pub representative_db: f64,
}

/// Noise scoring table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseThresholds {
    /// Step table, ascending by `lower_db`. The last step is open-ended.
    pub steps: Vec<NoiseStep>,
    /// Level recorded for a postcode no polygon covers (below mapping
    /// threshold, not missing data).
    pub fallback_db: f64,
    /// Lden with zero risk.
    pub quiet_db: f64,
    /// Lden with full risk.
    pub loud_db: f64,
}

impl Default for NoiseThresholds {
    fn default() -> Self {
        Self {
            steps: vec![
                NoiseStep {
                    lower_db: 50.0,
                    representative_db: 52.5,
                },
                NoiseStep {
                    lower_db: 55.0,
                    representative_db: 57.5,
                },
                NoiseStep {
                    lower_db: 60.0,
                    representative_db: 62.5,
                },
                NoiseStep {
                    lower_db: 65.0,
                    representative_db: 67.5,
                },
                NoiseStep {
                    lower_db: 70.0,
                    representative_db: 72.5,
                },
                NoiseStep {
                    lower_db: 75.0,
                    representative_db: 77.5,
                },
            ],
            fallback_db: 45.0,
            quiet_db: 45.0,
            loud_db: 80.0,
        }
    }
}

impl NoiseThresholds {
    /// Representative decibel value for a class lower bound, or `None` if
    /// the level is below the first step.
    #[must_use]
    pub fn representative_db(&self, class_lower_db: f64) -> Option<f64> {
        self.steps
            .iter()
            .rev()
            .find(|step| class_lower_db >= step.lower_db)
            .map(|step| step.representative_db)
    }

    /// Normalised risk for a district mean Lden.
    #[must_use]
    pub fn risk(&self, lden: f64) -> f64 {
        linear_risk(lden, self.quiet_db, self.loud_db)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] if the step table is empty or not
    /// ascending, or `loud_db <= quiet_db`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::threshold("noise step table is empty"));
        }
        for step in &self.steps {
            check_finite("noise step lower_db", step.lower_db)?;
            check_finite("noise step representative_db", step.representative_db)?;
        }
        if self
            .steps
            .windows(2)
            .any(|pair| pair[1].lower_db <= pair[0].lower_db)
        {
            return Err(ConfigError::threshold(
                "noise step table must be strictly ascending by lower_db",
            ));
        }
        check_finite("noise fallback_db", self.fallback_db)?;
        check_bounds("noise", self.quiet_db, self.loud_db)
    }
}

// ── Greenspace ──────────────────────────────────────────────────────

/// Greenspace scoring table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenspaceThresholds {
    /// Access distance with zero risk (m).
    pub access_min_m: f64,
    /// Access distance with full risk (m).
    pub access_max_m: f64,
    /// Weight of the district mean distance in the access distance.
    pub mean_distance_weight: f64,
    /// Weight of the district 75th-percentile distance in the access
    /// distance.
    pub p75_distance_weight: f64,
    /// Weight of the access sub-score in the blended score.
    pub access_weight: f64,
    /// Weight of the capacity sub-score in the blended score.
    pub capacity_weight: f64,
}

impl Default for GreenspaceThresholds {
    fn default() -> Self {
        Self {
            access_min_m: 100.0,
            access_max_m: 1000.0,
            mean_distance_weight: 1.0,
            p75_distance_weight: 0.0,
            access_weight: 0.6,
            capacity_weight: 0.4,
        }
    }
}

impl GreenspaceThresholds {
    /// Distance the access risk is computed from.
    #[must_use]
    pub fn access_distance(&self, mean_m: f64, p75_m: f64) -> f64 {
        let total = self.mean_distance_weight + self.p75_distance_weight;
        self.mean_distance_weight.mul_add(mean_m, self.p75_distance_weight * p75_m) / total
    }

    /// Normalised access risk for an access distance.
    #[must_use]
    pub fn access_risk(&self, distance_m: f64) -> f64 {
        linear_risk(distance_m, self.access_min_m, self.access_max_m)
    }

    /// Blends access and capacity risks. When only one is known it is used
    /// alone.
    #[must_use]
    pub fn blend_risk(&self, access: Option<f64>, capacity: Option<f64>) -> Option<f64> {
        match (access, capacity) {
            (Some(a), Some(c)) => {
                let total = self.access_weight + self.capacity_weight;
                Some(self.access_weight.mul_add(a, self.capacity_weight * c) / total)
            }
            (Some(r), None) | (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] if the access bounds are inverted
    /// or either weight pair is degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bounds("greenspace access", self.access_min_m, self.access_max_m)?;
        check_weights(
            "greenspace distance",
            &[
                ("mean", self.mean_distance_weight),
                ("p75", self.p75_distance_weight),
            ],
        )?;
        check_weights(
            "greenspace",
            &[
                ("access", self.access_weight),
                ("capacity", self.capacity_weight),
            ],
        )?;
        Ok(())
    }
}

// ── Confidence ──────────────────────────────────────────────────────

/// Postcode-count thresholds for confidence tiers, with the display weight
/// of each tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    /// Minimum count for [`ConfidenceLevel::High`].
    pub high: u64,
    /// Minimum count for [`ConfidenceLevel::Medium`].
    pub medium: u64,
    /// Minimum count for [`ConfidenceLevel::Low`].
    pub low: u64,
    /// Display weight of a high-confidence district.
    pub high_weight: f64,
    /// Display weight of a medium-confidence district.
    pub medium_weight: f64,
    /// Display weight of a low-confidence district.
    pub low_weight: f64,
    /// Display weight of a very-low-confidence district.
    pub very_low_weight: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 500,
            medium: 100,
            low: 20,
            high_weight: 1.0,
            medium_weight: 0.7,
            low_weight: 0.4,
            very_low_weight: 0.2,
        }
    }
}

impl ConfidenceThresholds {
    /// Tier for a postcode count.
    #[must_use]
    pub const fn level(&self, postcode_count: u64) -> ConfidenceLevel {
        if postcode_count >= self.high {
            ConfidenceLevel::High
        } else if postcode_count >= self.medium {
            ConfidenceLevel::Medium
        } else if postcode_count >= self.low {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    /// Display weight of a tier.
    #[must_use]
    pub const fn weight(&self, level: ConfidenceLevel) -> f64 {
        match level {
            ConfidenceLevel::High => self.high_weight,
            ConfidenceLevel::Medium => self.medium_weight,
            ConfidenceLevel::Low => self.low_weight,
            ConfidenceLevel::VeryLow => self.very_low_weight,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] unless `high > medium > low > 0`
    /// and every weight lies in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.high > self.medium && self.medium > self.low && self.low > 0) {
            return Err(ConfigError::threshold(format!(
                "confidence thresholds must satisfy high > medium > low > 0 \
                 (got {}/{}/{})",
                self.high, self.medium, self.low
            )));
        }
        for (label, weight) in [
            ("high", self.high_weight),
            ("medium", self.medium_weight),
            ("low", self.low_weight),
            ("very_low", self.very_low_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::threshold(format!(
                    "confidence weight '{label}' must be within [0, 1] ({weight})"
                )));
            }
        }
        Ok(())
    }
}

// ── Composite ───────────────────────────────────────────────────────

/// Fixed weights of the three components in the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    /// Air weight.
    pub air: f64,
    /// Noise weight.
    pub noise: f64,
    /// Greenspace weight.
    pub greenspace: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            air: 0.4,
            noise: 0.3,
            greenspace: 0.3,
        }
    }
}

impl CompositeWeights {
    /// Weighted overall score, or `None` unless all three components are
    /// present. The result is clamped into `[0, 100]`.
    #[must_use]
    pub fn combine(
        &self,
        air: Option<f64>,
        noise: Option<f64>,
        greenspace: Option<f64>,
    ) -> Option<f64> {
        let (air, noise, greenspace) = (air?, noise?, greenspace?);
        let overall = self
            .air
            .mul_add(air, self.noise.mul_add(noise, self.greenspace * greenspace));
        Some(overall.clamp(0.0, 100.0))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] if a weight is negative or the
    /// weights do not sum to one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = check_weights(
            "composite",
            &[
                ("air", self.air),
                ("noise", self.noise),
                ("greenspace", self.greenspace),
            ],
        )?;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::threshold(format!(
                "composite weights must sum to 1 (got {sum})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_safe_bound_is_zero_risk() {
        let bounds = PollutantBounds {
            safe: 40.0,
            danger: 200.0,
        };
        assert!(bounds.risk(22.0).abs() < f64::EPSILON);
        assert!((bounds.score(22.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pollutant_risk_is_linear_between_bounds() {
        let bounds = PollutantBounds {
            safe: 10.0,
            danger: 40.0,
        };
        assert!((bounds.risk(25.0) - 0.5).abs() < 1e-12);
        assert!((bounds.risk(55.0) - 1.0).abs() < f64::EPSILON);
        assert!(bounds.score(55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_pollutant_bounds_are_rejected() {
        let mut air = AirThresholds::default();
        air.no2 = PollutantBounds {
            safe: 40.0,
            danger: 40.0,
        };
        assert!(air.validate().is_err());
    }

    #[test]
    fn inverted_pollutant_bounds_are_rejected() {
        let mut air = AirThresholds::default();
        air.pm25 = PollutantBounds {
            safe: 25.0,
            danger: 5.0,
        };
        assert!(air.validate().is_err());
    }

    #[test]
    fn zero_air_weights_are_rejected() {
        let mut air = AirThresholds::default();
        air.weights = PollutantWeights {
            no2: 0.0,
            pm10: 0.0,
            pm25: 0.0,
        };
        assert!(air.validate().is_err());
    }

    #[test]
    fn single_zero_air_weight_is_rejected() {
        let mut air = AirThresholds::default();
        air.weights.pm25 = 0.0;
        let err = air.validate().unwrap_err();
        assert!(err.to_string().contains("pm25"));
    }

    #[test]
    fn noise_step_table_maps_class_bounds() {
        let noise = NoiseThresholds::default();
        assert_eq!(noise.representative_db(50.0), Some(52.5));
        assert_eq!(noise.representative_db(57.0), Some(57.5));
        assert_eq!(noise.representative_db(70.0), Some(72.5));
        assert_eq!(noise.representative_db(75.0), Some(77.5));
        assert_eq!(noise.representative_db(90.0), Some(77.5));
        assert_eq!(noise.representative_db(49.9), None);
    }

    #[test]
    fn noise_risk_matches_documented_example() {
        let noise = NoiseThresholds::default();
        let risk = noise.risk(57.5);
        assert!((risk - 12.5 / 35.0).abs() < 1e-12);
        assert!((score_from_risk(risk) - 64.285_714_285_714_29).abs() < 1e-9);
        assert!(noise.risk(45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unordered_noise_steps_are_rejected() {
        let mut noise = NoiseThresholds::default();
        noise.steps.swap(0, 1);
        assert!(noise.validate().is_err());
    }

    #[test]
    fn access_risk_bounds() {
        let green = GreenspaceThresholds::default();
        assert!(green.access_risk(100.0).abs() < f64::EPSILON);
        assert!(green.access_risk(40.0).abs() < f64::EPSILON);
        assert!((green.access_risk(1000.0) - 1.0).abs() < f64::EPSILON);
        assert!((green.access_risk(2500.0) - 1.0).abs() < f64::EPSILON);
        assert!((green.access_risk(550.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn access_distance_blends_mean_and_p75() {
        let green = GreenspaceThresholds {
            mean_distance_weight: 0.4,
            p75_distance_weight: 0.6,
            ..GreenspaceThresholds::default()
        };
        assert!((green.access_distance(100.0, 200.0) - 160.0).abs() < 1e-9);
        assert!(
            (GreenspaceThresholds::default().access_distance(100.0, 200.0) - 100.0).abs() < 1e-9
        );
    }

    #[test]
    fn blend_risk_falls_back_to_single_component() {
        let green = GreenspaceThresholds::default();
        assert_eq!(green.blend_risk(Some(0.5), None), Some(0.5));
        assert_eq!(green.blend_risk(None, Some(0.25)), Some(0.25));
        assert_eq!(green.blend_risk(None, None), None);
        let both = green.blend_risk(Some(1.0), Some(0.0)).unwrap();
        assert!((both - 0.6).abs() < 1e-12);
    }

    #[test]
    fn confidence_tiers() {
        let conf = ConfidenceThresholds::default();
        assert_eq!(conf.level(0), ConfidenceLevel::VeryLow);
        assert_eq!(conf.level(19), ConfidenceLevel::VeryLow);
        assert_eq!(conf.level(20), ConfidenceLevel::Low);
        assert_eq!(conf.level(100), ConfidenceLevel::Medium);
        assert_eq!(conf.level(499), ConfidenceLevel::Medium);
        assert_eq!(conf.level(842), ConfidenceLevel::High);
    }

    #[test]
    fn confidence_is_monotone_in_count() {
        let conf = ConfidenceThresholds::default();
        let mut previous = conf.level(0);
        for count in 1..=1_000 {
            let level = conf.level(count);
            assert!(level >= previous, "tier dropped at count {count}");
            previous = level;
        }
    }

    #[test]
    fn composite_requires_all_components() {
        let weights = CompositeWeights::default();
        assert_eq!(weights.combine(Some(50.0), None, Some(50.0)), None);
        let overall = weights.combine(Some(58.0), Some(64.5), Some(70.0)).unwrap();
        assert!((overall - 0.3f64.mul_add(70.0, 0.4f64.mul_add(58.0, 0.3 * 64.5))).abs() < 1e-6);
    }

    #[test]
    fn composite_weights_must_sum_to_one() {
        let weights = CompositeWeights {
            air: 0.5,
            noise: 0.3,
            greenspace: 0.3,
        };
        assert!(weights.validate().is_err());
        assert!(CompositeWeights::default().validate().is_ok());
    }

    #[test]
    fn default_tables_validate() {
        assert!(AirThresholds::default().validate().is_ok());
        assert!(NoiseThresholds::default().validate().is_ok());
        assert!(GreenspaceThresholds::default().validate().is_ok());
        assert!(ConfidenceThresholds::default().validate().is_ok());
    }
}
