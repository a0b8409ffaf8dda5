//! Postcode directory loading.
//!
//! Reads an ONS-style postcode directory CSV, keeps the postcodes of one
//! postcode area (optionally one local authority), and projects their
//! coordinates into the pipeline's planar CRS.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use envhealth_spatial::{Crs, Projector};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{DistrictCode, Postcode, PostcodeError};

/// How coordinates are stored in the directory.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoordinateMode {
    /// WGS84 latitude/longitude columns.
    #[default]
    LatLong,
    /// British National Grid easting/northing columns.
    EastingNorthing,
}

impl CoordinateMode {
    /// CRS the coordinate columns are expressed in.
    #[must_use]
    pub const fn source_crs(self) -> Crs {
        match self {
            Self::LatLong => Crs::Wgs84,
            Self::EastingNorthing => Crs::BritishNationalGrid,
        }
    }
}

/// Column names and coordinate mode of a postcode directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryLayout {
    /// Postcode column.
    pub postcode: String,
    /// Latitude column (lat/long mode).
    pub latitude: String,
    /// Longitude column (lat/long mode).
    pub longitude: String,
    /// Easting column (easting/northing mode).
    pub easting: String,
    /// Northing column (easting/northing mode).
    pub northing: String,
    /// Local authority district code column.
    pub local_authority: String,
    /// Which coordinate columns to read.
    pub coordinates: CoordinateMode,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            postcode: "pcds".to_string(),
            latitude: "lat".to_string(),
            longitude: "long".to_string(),
            easting: "east1m".to_string(),
            northing: "north1m".to_string(),
            local_authority: "lad25cd".to_string(),
            coordinates: CoordinateMode::default(),
        }
    }
}

/// Which postcodes belong to the city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryFilter {
    /// Postcode area letters; matched exactly, so `"B"` excludes `BA1`.
    pub area: String,
    /// Local authority code to keep, if any.
    pub local_authority_code: Option<String>,
}

/// A resolved postcode location in the planar CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodePoint {
    /// Normalised postcode, e.g. `"B14 5AB"`.
    pub postcode: String,
    /// Planar x (easting).
    pub x: f64,
    /// Planar y (northing).
    pub y: f64,
    /// District the postcode belongs to.
    pub district: DistrictCode,
}

impl PostcodePoint {
    /// Builds a point from a raw postcode string and planar coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError::Parse`] if the postcode is malformed.
    pub fn new(postcode: &str, x: f64, y: f64) -> Result<Self, PostcodeError> {
        let (postcode, district) = postcode.parse::<Postcode>()?.into_parts();
        Ok(Self {
            postcode,
            x,
            y,
            district,
        })
    }
}

/// Row counts from one directory load. Every skipped row is counted under
/// exactly one cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    /// Data rows read.
    pub rows: u64,
    /// Rows the CSV reader could not decode.
    pub malformed_rows: u64,
    /// Rows whose postcode failed to parse.
    pub unparsable: u64,
    /// Rows outside the postcode area.
    pub out_of_area: u64,
    /// Rows in the area but outside the local authority filter.
    pub outside_authority: u64,
    /// Repeat occurrences of an already-seen postcode.
    pub duplicates: u64,
    /// Rows with empty or non-numeric coordinates.
    pub missing_coordinates: u64,
    /// Rows whose coordinates failed to project.
    pub bad_coordinates: u64,
    /// Rows that became a [`PostcodePoint`].
    pub resolved: u64,
}

/// The resolved postcode set of a city.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDirectory {
    /// Located postcodes.
    pub points: Vec<PostcodePoint>,
    /// Every district with at least one in-area postcode, located or not.
    pub districts: BTreeSet<DistrictCode>,
    /// Load counts.
    pub stats: ResolveStats,
}

impl ResolvedDirectory {
    /// Builds a directory from already-resolved points.
    #[must_use]
    pub fn from_points(points: Vec<PostcodePoint>) -> Self {
        let districts = points.iter().map(|p| p.district.clone()).collect();
        let stats = ResolveStats {
            rows: points.len() as u64,
            resolved: points.len() as u64,
            ..ResolveStats::default()
        };
        Self {
            points,
            districts,
            stats,
        }
    }

    /// Groups points by district. Districts without any located postcode
    /// map to an empty list.
    #[must_use]
    pub fn by_district(&self) -> BTreeMap<DistrictCode, Vec<&PostcodePoint>> {
        let mut grouped: BTreeMap<DistrictCode, Vec<&PostcodePoint>> = self
            .districts
            .iter()
            .map(|d| (d.clone(), Vec::new()))
            .collect();

        for point in &self.points {
            grouped
                .entry(point.district.clone())
                .or_default()
                .push(point);
        }

        grouped
    }
}

/// Loads and resolves a postcode directory file.
///
/// # Errors
///
/// Returns [`PostcodeError`] if the file cannot be read or a required
/// column is missing.
pub fn resolve_path(
    path: &Path,
    layout: &DirectoryLayout,
    filter: &DirectoryFilter,
    target: Crs,
) -> Result<ResolvedDirectory, PostcodeError> {
    log::info!("Loading postcode directory from {}", path.display());
    let file = std::fs::File::open(path)?;
    resolve_reader(file, layout, filter, target)
}

/// Resolves a postcode directory from any CSV source.
///
/// # Errors
///
/// Returns [`PostcodeError::MissingColumn`] if a column the layout needs
/// is absent, or [`PostcodeError::Csv`] if the header cannot be read.
pub fn resolve_reader(
    reader: impl Read,
    layout: &DirectoryLayout,
    filter: &DirectoryFilter,
    target: Crs,
) -> Result<ResolvedDirectory, PostcodeError> {
    let projector = Projector::new(layout.coordinates.source_crs(), target)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PostcodeError::MissingColumn {
                column: name.to_string(),
            })
    };

    let postcode_col = column(&layout.postcode)?;
    let (x_col, y_col) = match layout.coordinates {
        CoordinateMode::LatLong => (column(&layout.longitude)?, column(&layout.latitude)?),
        CoordinateMode::EastingNorthing => (column(&layout.easting)?, column(&layout.northing)?),
    };
    let authority_col = match filter.local_authority_code {
        Some(_) => Some(column(&layout.local_authority)?),
        None => None,
    };

    let mut out = ResolvedDirectory::default();
    let mut seen = BTreeSet::new();

    for result in csv_reader.records() {
        out.stats.rows += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Skipping malformed postcode row: {e}");
                out.stats.malformed_rows += 1;
                continue;
            }
        };

        let raw = record.get(postcode_col).unwrap_or_default();
        let postcode: Postcode = match raw.parse() {
            Ok(p) => p,
            Err(e) => {
                log::debug!("{e}");
                out.stats.unparsable += 1;
                continue;
            }
        };

        if postcode.district().area() != filter.area {
            out.stats.out_of_area += 1;
            continue;
        }

        if let (Some(col), Some(code)) = (authority_col, &filter.local_authority_code)
            && record.get(col).map(str::trim) != Some(code.as_str())
        {
            out.stats.outside_authority += 1;
            continue;
        }

        if !seen.insert(postcode.as_str().to_string()) {
            out.stats.duplicates += 1;
            continue;
        }

        out.districts.insert(postcode.district().clone());

        let (Some(x), Some(y)) = (
            parse_coordinate(record.get(x_col)),
            parse_coordinate(record.get(y_col)),
        ) else {
            log::debug!("Postcode {postcode} has no coordinates");
            out.stats.missing_coordinates += 1;
            continue;
        };

        match projector.transform(geo::Coord { x, y }) {
            Ok(coord) => {
                let (postcode, district) = postcode.into_parts();
                out.points.push(PostcodePoint {
                    postcode,
                    x: coord.x,
                    y: coord.y,
                    district,
                });
                out.stats.resolved += 1;
            }
            Err(e) if e.is_recoverable() => {
                log::debug!("Postcode {postcode}: {e}");
                out.stats.bad_coordinates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    log::info!(
        "Resolved {} postcodes in {} districts ({} rows, {} unparsable, {} out of area, \
         {} outside authority, {} duplicate, {} without coordinates, {} bad coordinates)",
        out.stats.resolved,
        out.districts.len(),
        out.stats.rows,
        out.stats.unparsable,
        out.stats.out_of_area,
        out.stats.outside_authority,
        out.stats.duplicates,
        out.stats.missing_coordinates,
        out.stats.bad_coordinates,
    );

    Ok(out)
}

fn parse_coordinate(field: Option<&str>) -> Option<f64> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
