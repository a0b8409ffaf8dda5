//! Composite scoring and what-if previews.
//!
//! Both the pipeline and [`preview`] label overall scores with the same
//! ladder and weights, so a projected band never disagrees with the one
//! the baseline would have emitted.

use envhealth_postcode::DistrictCode;
use envhealth_score_models::thresholds::CompositeWeights;
use envhealth_score_models::{BandLadder, Components, ConfidenceResult, DistrictRecord};
use serde::{Deserialize, Serialize};

/// Builds a district record, computing the overall score when all three
/// components are present.
#[must_use]
pub fn assemble(
    district: &DistrictCode,
    name: Option<String>,
    components: Components,
    confidence: ConfidenceResult,
    weights: &CompositeWeights,
    ladder: &BandLadder,
) -> DistrictRecord {
    let score_overall = weights.combine(
        components.air.score,
        components.noise.score,
        components.greenspace.score,
    );

    DistrictRecord {
        district: district.to_string(),
        name,
        score_overall,
        score_band: score_overall.map(|s| ladder.classify(s).to_string()),
        components,
        confidence,
    }
}

/// Per-component score adjustments for a what-if projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDeltas {
    /// Added to the air score.
    pub air: f64,
    /// Added to the noise score.
    pub noise: f64,
    /// Added to the greenspace score.
    pub greenspace: f64,
}

/// A projected district score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    /// District code.
    pub district: String,
    /// Adjusted air score.
    pub air: Option<f64>,
    /// Adjusted noise score.
    pub noise: Option<f64>,
    /// Adjusted greenspace score.
    pub greenspace: Option<f64>,
    /// Recomputed overall score.
    pub score_overall: Option<f64>,
    /// Band of the recomputed overall score.
    pub score_band: Option<String>,
}

/// Applies `deltas` to a record's component scores, clamping each into
/// `[0, 100]`, and recomputes the overall score and band. Missing
/// components stay missing.
#[must_use]
pub fn preview(
    record: &DistrictRecord,
    deltas: ComponentDeltas,
    weights: &CompositeWeights,
    ladder: &BandLadder,
) -> Preview {
    let adjust = |score: Option<f64>, delta: f64| score.map(|s| (s + delta).clamp(0.0, 100.0));

    let air = adjust(record.components.air.score, deltas.air);
    let noise = adjust(record.components.noise.score, deltas.noise);
    let greenspace = adjust(record.components.greenspace.score, deltas.greenspace);
    let score_overall = weights.combine(air, noise, greenspace);

    Preview {
        district: record.district.clone(),
        air,
        noise,
        greenspace,
        score_overall,
        score_band: score_overall.map(|s| ladder.classify(s).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envhealth_score_models::{ComponentResult, ConfidenceLevel};
    use std::collections::BTreeMap;

    fn component(score: Option<f64>) -> ComponentResult {
        score.map_or_else(
            || ComponentResult::uncomputed(BTreeMap::new()),
            |s| ComponentResult::scored(s, "test", BTreeMap::new()),
        )
    }

    fn record(air: Option<f64>, noise: Option<f64>, greenspace: Option<f64>) -> DistrictRecord {
        assemble(
            &"B14".parse().unwrap(),
            Some("Kings Heath".to_string()),
            Components {
                air: component(air),
                noise: component(noise),
                greenspace: component(greenspace),
            },
            ConfidenceResult {
                level: ConfidenceLevel::High,
                weight: 1.0,
                postcode_count: 842,
            },
            &CompositeWeights::default(),
            &BandLadder::overall(),
        )
    }

    #[test]
    fn overall_is_weighted_sum() {
        let r = record(Some(58.0), Some(64.5), Some(70.0));
        let expected = 0.4f64.mul_add(58.0, 0.3f64.mul_add(64.5, 0.3 * 70.0));
        assert!((r.score_overall.unwrap() - expected).abs() < 1e-6);
        assert_eq!(r.score_band.as_deref(), Some("Moderate"));
        assert_eq!(r.district, "B14");
    }

    #[test]
    fn any_missing_component_nulls_overall() {
        for r in [
            record(None, Some(50.0), Some(50.0)),
            record(Some(50.0), None, Some(50.0)),
            record(Some(50.0), Some(50.0), None),
        ] {
            assert_eq!(r.score_overall, None);
            assert_eq!(r.score_band, None);
        }
    }

    #[test]
    fn preview_clamps_and_relabels() {
        let r = record(Some(80.0), Some(80.0), Some(80.0));
        assert_eq!(r.score_band.as_deref(), Some("Very Good"));

        let up = preview(
            &r,
            ComponentDeltas {
                air: 50.0,
                noise: 5.0,
                greenspace: 5.0,
            },
            &CompositeWeights::default(),
            &BandLadder::overall(),
        );
        assert_eq!(up.air, Some(100.0));
        assert!((up.score_overall.unwrap() - 91.0).abs() < 1e-9);
        assert_eq!(up.score_band.as_deref(), Some("Excellent"));

        let down = preview(
            &r,
            ComponentDeltas {
                air: -200.0,
                ..ComponentDeltas::default()
            },
            &CompositeWeights::default(),
            &BandLadder::overall(),
        );
        assert_eq!(down.air, Some(0.0));
        assert!((down.score_overall.unwrap() - 48.0).abs() < 1e-9);
        assert_eq!(down.score_band.as_deref(), Some("Elevated Risk"));
    }

    #[test]
    fn preview_keeps_missing_components_missing() {
        let r = record(None, Some(80.0), Some(80.0));
        let p = preview(
            &r,
            ComponentDeltas {
                air: 10.0,
                ..ComponentDeltas::default()
            },
            &CompositeWeights::default(),
            &BandLadder::overall(),
        );
        assert_eq!(p.air, None);
        assert_eq!(p.score_overall, None);
    }
}
