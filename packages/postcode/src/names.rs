//! District display names.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{DistrictCode, PostcodeError};

/// Reads a `{"B14": "Kings Heath", ...}` name lookup.
///
/// # Errors
///
/// Returns [`PostcodeError`] if the file cannot be read or is not a JSON
/// object.
pub fn load_district_names(path: &Path) -> Result<BTreeMap<DistrictCode, String>, PostcodeError> {
    let text = std::fs::read_to_string(path)?;
    let names = parse_district_names(&text)?;
    log::info!("Loaded {} district names from {}", names.len(), path.display());
    Ok(names)
}

/// Parses a district name lookup. Keys that are not district codes and
/// blank names are skipped.
///
/// # Errors
///
/// Returns [`PostcodeError::Json`] if the text is not a JSON object of
/// strings.
pub fn parse_district_names(text: &str) -> Result<BTreeMap<DistrictCode, String>, PostcodeError> {
    let raw: BTreeMap<String, Option<String>> = serde_json::from_str(text)?;
    let mut names = BTreeMap::new();

    for (key, name) in raw {
        let Ok(code) = key.parse::<DistrictCode>() else {
            log::warn!("Ignoring district name for unrecognised code '{key}'");
            continue;
        };
        let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
            continue;
        };
        names.entry(code).or_insert(name);
    }

    Ok(names)
}
