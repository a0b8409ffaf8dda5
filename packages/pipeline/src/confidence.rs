//! Confidence tiers from postcode sample counts.

use envhealth_score_models::ConfidenceResult;
use envhealth_score_models::thresholds::ConfidenceThresholds;

/// Confidence of a district with `postcode_count` located postcodes.
/// Reads no score values.
#[must_use]
pub const fn estimate(postcode_count: u64, thresholds: &ConfidenceThresholds) -> ConfidenceResult {
    let level = thresholds.level(postcode_count);
    ConfidenceResult {
        level,
        weight: thresholds.weight(level),
        postcode_count,
    }
}
