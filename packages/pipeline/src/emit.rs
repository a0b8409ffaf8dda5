//! Baseline serialisation.
//!
//! The baseline is a pretty-printed JSON array of district records in
//! natural district order. The baseline and its run metadata are both
//! staged in sibling temp files and only renamed into place once both are
//! on disk, so a failed write never pairs a new baseline with stale
//! metadata.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use envhealth_postcode::DistrictCode;
use envhealth_score_models::DistrictRecord;
use serde::Serialize;

use crate::PipelineError;
use crate::metadata::RunMetadata;

/// Sorts records by natural district order (`B2` before `B10`). Codes
/// that do not parse sort after all valid ones, by text.
pub fn sort_records(records: &mut [DistrictRecord]) {
    records.sort_by(|a, b| {
        match (
            a.district.parse::<DistrictCode>(),
            b.district.parse::<DistrictCode>(),
        ) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => a.district.cmp(&b.district),
        }
    });
}

/// Serialises records as the baseline document. Non-finite numbers
/// become `null`.
///
/// # Errors
///
/// Returns [`PipelineError::Json`] if serialisation fails.
pub fn to_json(records: &[DistrictRecord]) -> Result<String, PipelineError> {
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);
    pretty(&sorted)
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, PipelineError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn stage(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(temp_path(path), contents)
}

/// Writes the baseline and the run metadata.
///
/// Both documents are serialised and written to temp files before either
/// is renamed into place. On failure the temp files are removed and the
/// previous outputs are left as they were.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialisation fails, or
/// [`PipelineError::Io`] if a directory, temp file, or rename fails.
pub fn write_outputs(
    baseline_path: &Path,
    records: &[DistrictRecord],
    metadata_path: &Path,
    metadata: &RunMetadata,
) -> Result<(), PipelineError> {
    let baseline = to_json(records)?;
    let meta = pretty(metadata)?;

    let result = stage(baseline_path, &baseline)
        .and_then(|()| stage(metadata_path, &meta))
        .and_then(|()| std::fs::rename(temp_path(baseline_path), baseline_path))
        .and_then(|()| std::fs::rename(temp_path(metadata_path), metadata_path));

    if let Err(e) = result {
        std::fs::remove_file(temp_path(baseline_path)).ok();
        std::fs::remove_file(temp_path(metadata_path)).ok();
        return Err(e.into());
    }

    log::info!(
        "Wrote {} district records to {}",
        records.len(),
        baseline_path.display()
    );
    log::info!("Wrote run metadata to {}", metadata_path.display());
    Ok(())
}

/// Reads a baseline file.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read or parsed.
pub fn read_baseline(path: &Path) -> Result<Vec<DistrictRecord>, PipelineError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envhealth_score_models::{
        ComponentResult, Components, ConfidenceLevel, ConfidenceResult, metrics,
    };
    use std::collections::BTreeMap;

    use crate::metadata::InputCounts;

    fn record(district: &str, no2: Option<f64>) -> DistrictRecord {
        DistrictRecord {
            district: district.to_string(),
            name: None,
            score_overall: None,
            score_band: None,
            components: Components {
                air: ComponentResult::uncomputed(BTreeMap::from([(
                    metrics::NO2_UG_M3.to_string(),
                    no2,
                )])),
                ..Components::default()
            },
            confidence: ConfidenceResult {
                level: ConfidenceLevel::VeryLow,
                weight: 0.2,
                postcode_count: 0,
            },
        }
    }

    #[test]
    fn records_sort_naturally() {
        let records = [record("B10", None), record("B2", None), record("B1", None)];
        let json = to_json(&records).unwrap();
        let b1 = json.find("\"B1\"").unwrap();
        let b2 = json.find("\"B2\"").unwrap();
        let b10 = json.find("\"B10\"").unwrap();
        assert!(b1 < b2 && b2 < b10);
        assert!(json.ends_with("]\n"));
    }

    #[test]
    fn non_finite_values_become_null() {
        let json = to_json(&[record("B1", Some(f64::NAN))]).unwrap();
        assert!(json.contains("\"no2_ug_m3\": null"));
        assert!(json.contains("\"score_overall\": null"));
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("envhealth-emit-{name}-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn metadata(records: &[DistrictRecord]) -> RunMetadata {
        RunMetadata::new("Birmingham", 27700, InputCounts::default(), records)
    }

    #[test]
    fn write_then_read_back() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("baseline.json");
        let meta_path = dir.join("meta").join("run.json");
        let records = vec![record("B14", Some(22.1))];

        write_outputs(&path, &records, &meta_path, &metadata(&records)).unwrap();
        assert!(!temp_path(&path).exists());
        assert!(!temp_path(&meta_path).exists());
        assert!(meta_path.exists());

        let back = read_baseline(&path).unwrap();
        assert_eq!(back, records);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_metadata_write_keeps_previous_baseline() {
        let dir = scratch_dir("staged");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("baseline.json");
        std::fs::write(&path, "previous\n").unwrap();

        // A regular file where the metadata directory should be.
        let blocker = dir.join("meta");
        std::fs::write(&blocker, "").unwrap();
        let meta_path = blocker.join("run.json");

        let records = vec![record("B1", None)];
        let result = write_outputs(&path, &records, &meta_path, &metadata(&records));

        assert!(matches!(result, Err(PipelineError::Io(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous\n");
        assert!(!temp_path(&path).exists());
        assert!(!meta_path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
