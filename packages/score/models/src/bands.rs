//! Qualitative band ladders.
//!
//! A ladder is an ordered list of `(threshold, label)` steps evaluated
//! top-down; the first matching step wins and `otherwise` labels anything
//! that matches no step. The composite ladder is the single table both the
//! pipeline and what-if previews label scores with.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How a ladder step's threshold is compared against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderOrder {
    /// Step matches when `value >= threshold`. Thresholds must descend.
    AtLeast,
    /// Step matches when `value < threshold`. Thresholds must ascend.
    Below,
}

/// One rung of a [`BandLadder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStep {
    /// Comparison threshold.
    pub threshold: f64,
    /// Label assigned when the step matches.
    pub label: String,
}

impl BandStep {
    fn new(threshold: f64, label: &str) -> Self {
        Self {
            threshold,
            label: label.to_string(),
        }
    }
}

/// An ordered threshold ladder mapping a value to a qualitative label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandLadder {
    /// Comparison direction for every step.
    pub order: LadderOrder,
    /// Steps, evaluated first to last.
    pub steps: Vec<BandStep>,
    /// Label for values no step matches.
    pub otherwise: String,
}

impl BandLadder {
    /// Overall environmental-health ladder on the 0–100 composite score.
    #[must_use]
    pub fn overall() -> Self {
        Self {
            order: LadderOrder::AtLeast,
            steps: vec![
                BandStep::new(85.0, "Excellent"),
                BandStep::new(75.0, "Very Good"),
                BandStep::new(65.0, "Good"),
                BandStep::new(55.0, "Moderate"),
                BandStep::new(45.0, "Elevated Risk"),
            ],
            otherwise: "High Risk".to_string(),
        }
    }

    /// Air quality ladder on the 0–100 air score.
    #[must_use]
    pub fn air() -> Self {
        Self {
            order: LadderOrder::AtLeast,
            steps: vec![
                BandStep::new(85.0, "Excellent air quality"),
                BandStep::new(75.0, "Very good air quality"),
                BandStep::new(65.0, "Good air quality"),
                BandStep::new(50.0, "Moderate air quality"),
                BandStep::new(35.0, "Poor air quality"),
                BandStep::new(20.0, "Very poor air quality"),
            ],
            otherwise: "Hazardous air quality".to_string(),
        }
    }

    /// Noise exposure ladder on the `[0, 1]` noise risk (not on decibels).
    #[must_use]
    pub fn noise() -> Self {
        Self {
            order: LadderOrder::Below,
            steps: vec![
                BandStep::new(0.2, "Very low noise exposure"),
                BandStep::new(0.4, "Low noise exposure"),
                BandStep::new(0.6, "Moderate noise exposure"),
                BandStep::new(0.8, "High noise exposure"),
            ],
            otherwise: "Very high noise exposure".to_string(),
        }
    }

    /// Greenspace ladder on the 0–100 greenspace score.
    #[must_use]
    pub fn greenspace() -> Self {
        Self {
            order: LadderOrder::AtLeast,
            steps: vec![
                BandStep::new(85.0, "Excellent access to greenspace"),
                BandStep::new(70.0, "Good access to greenspace"),
                BandStep::new(55.0, "Moderate access to greenspace"),
                BandStep::new(40.0, "Poor access to greenspace"),
            ],
            otherwise: "Very poor access to greenspace".to_string(),
        }
    }

    /// Labels `value`. First matching step wins.
    #[must_use]
    pub fn classify(&self, value: f64) -> &str {
        self.steps
            .iter()
            .find(|step| match self.order {
                LadderOrder::AtLeast => value >= step.threshold,
                LadderOrder::Below => value < step.threshold,
            })
            .map_or(self.otherwise.as_str(), |step| step.label.as_str())
    }

    /// Checks that thresholds are finite and strictly monotone in the
    /// direction `order` requires, and that every label is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Threshold`] naming the offending ladder.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::threshold(format!(
                "band ladder '{name}' has no steps"
            )));
        }

        if self.otherwise.trim().is_empty() || self.steps.iter().any(|s| s.label.trim().is_empty())
        {
            return Err(ConfigError::threshold(format!(
                "band ladder '{name}' has an empty label"
            )));
        }

        if let Some(step) = self.steps.iter().find(|s| !s.threshold.is_finite()) {
            return Err(ConfigError::threshold(format!(
                "band ladder '{name}' step '{}' has a non-finite threshold",
                step.label
            )));
        }

        for pair in self.steps.windows(2) {
            let ordered = match self.order {
                LadderOrder::AtLeast => pair[0].threshold > pair[1].threshold,
                LadderOrder::Below => pair[0].threshold < pair[1].threshold,
            };
            if !ordered {
                return Err(ConfigError::threshold(format!(
                    "band ladder '{name}' thresholds {} and {} are out of order",
                    pair[0].threshold, pair[1].threshold
                )));
            }
        }

        Ok(())
    }
}

/// The four ladders a pipeline run labels its results with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandLadders {
    /// Composite score ladder.
    pub overall: BandLadder,
    /// Air score ladder.
    pub air: BandLadder,
    /// Noise risk ladder.
    pub noise: BandLadder,
    /// Greenspace score ladder.
    pub greenspace: BandLadder,
}

impl Default for BandLadders {
    fn default() -> Self {
        Self {
            overall: BandLadder::overall(),
            air: BandLadder::air(),
            noise: BandLadder::noise(),
            greenspace: BandLadder::greenspace(),
        }
    }
}

impl BandLadders {
    /// Validates every ladder.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.overall.validate("overall")?;
        self.air.validate("air")?;
        self.noise.validate("noise")?;
        self.greenspace.validate("greenspace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_ladder_boundaries_are_inclusive_at_threshold() {
        let ladder = BandLadder::overall();
        assert_eq!(ladder.classify(85.0), "Excellent");
        assert_eq!(ladder.classify(84.999), "Very Good");
        assert_eq!(ladder.classify(75.0), "Very Good");
        assert_eq!(ladder.classify(55.0), "Moderate");
        assert_eq!(ladder.classify(45.0), "Elevated Risk");
        assert_eq!(ladder.classify(44.999), "High Risk");
        assert_eq!(ladder.classify(0.0), "High Risk");
        assert_eq!(ladder.classify(100.0), "Excellent");
    }

    #[test]
    fn noise_ladder_uses_risk() {
        let ladder = BandLadder::noise();
        assert_eq!(ladder.classify(0.0), "Very low noise exposure");
        assert_eq!(ladder.classify(0.2), "Low noise exposure");
        assert_eq!(ladder.classify(0.357), "Low noise exposure");
        assert_eq!(ladder.classify(0.6), "High noise exposure");
        assert_eq!(ladder.classify(0.8), "Very high noise exposure");
        assert_eq!(ladder.classify(1.0), "Very high noise exposure");
    }

    #[test]
    fn default_ladders_validate() {
        assert!(BandLadders::default().validate().is_ok());
    }

    #[test]
    fn out_of_order_ladder_is_rejected() {
        let mut ladder = BandLadder::overall();
        ladder.steps.swap(0, 1);
        assert!(ladder.validate("overall").is_err());

        let mut noise = BandLadder::noise();
        noise.steps.reverse();
        assert!(noise.validate("noise").is_err());
    }

    #[test]
    fn empty_ladder_is_rejected() {
        let ladder = BandLadder {
            order: LadderOrder::AtLeast,
            steps: Vec::new(),
            otherwise: "Unknown".to_string(),
        };
        assert!(ladder.validate("empty").is_err());
    }
}
