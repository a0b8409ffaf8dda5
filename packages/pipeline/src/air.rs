//! Air quality aggregation.
//!
//! Each postcode samples the nearest background-map grid cell per
//! pollutant. District concentrations are per-pollutant means over the
//! postcodes that sampled a cell, and the district score is the weighted
//! mean of the per-pollutant scores.

use std::collections::BTreeMap;

use envhealth_postcode::PostcodePoint;
use envhealth_score_models::thresholds::AirThresholds;
use envhealth_score_models::{BandLadder, ComponentResult, Pollutant};
use envhealth_spatial::{PointSampleIndex, Projector};

use crate::{PipelineError, stats};

/// A concentration sample at a grid cell centre, in the working CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    /// Cell centre x.
    pub x: f64,
    /// Cell centre y.
    pub y: f64,
    /// Concentration (µg/m³).
    pub value: f64,
}

/// Column names of a background-map CSV.
#[derive(Debug, Clone, Copy)]
pub struct GridColumns<'a> {
    /// A column only the real header row contains.
    pub header_key: &'a str,
    /// Cell-centre x column.
    pub x: &'a str,
    /// Cell-centre y column.
    pub y: &'a str,
    /// Concentration column.
    pub value: &'a str,
}

/// Samples read from one grid file.
#[derive(Debug, Clone, Default)]
pub struct GridLoad {
    /// Usable samples.
    pub samples: Vec<GridSample>,
    /// Rows with missing or non-numeric values, or unprojectable
    /// coordinates.
    pub skipped: u64,
}

/// Parses a background-map CSV.
///
/// The files start with a free-text preamble; the header is the first line
/// with a field equal to `columns.header_key`.
///
/// # Errors
///
/// Returns [`PipelineError::Input`] if no header row or a required column
/// is found, or [`PipelineError::Csv`] if the header cannot be decoded.
pub fn parse_grid(
    text: &str,
    columns: GridColumns<'_>,
    projector: &Projector,
) -> Result<GridLoad, PipelineError> {
    let header_line = text
        .lines()
        .position(|line| {
            line.split(',')
                .any(|field| field.trim().trim_matches('"') == columns.header_key)
        })
        .ok_or_else(|| PipelineError::Input {
            message: format!("no header row containing '{}'", columns.header_key),
        })?;

    let body = text.lines().skip(header_line).collect::<Vec<_>>().join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::Input {
                message: format!("grid is missing column '{name}'"),
            })
    };
    let (x_col, y_col, value_col) = (column(columns.x)?, column(columns.y)?, column(columns.value)?);

    let mut load = GridLoad::default();

    for result in reader.records() {
        let Ok(record) = result else {
            load.skipped += 1;
            continue;
        };

        let field = |idx: usize| {
            record
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        let (Some(x), Some(y), Some(value)) = (field(x_col), field(y_col), field(value_col))
        else {
            load.skipped += 1;
            continue;
        };

        match projector.transform(geo::Coord { x, y }) {
            Ok(c) => load.samples.push(GridSample {
                x: c.x,
                y: c.y,
                value,
            }),
            Err(e) => {
                log::debug!("Skipping grid cell ({x}, {y}): {e}");
                load.skipped += 1;
            }
        }
    }

    Ok(load)
}

/// Nearest-cell indexes for each loaded pollutant.
#[derive(Default)]
pub struct AirGrids {
    grids: BTreeMap<Pollutant, PointSampleIndex<f64>>,
}

impl AirGrids {
    /// Creates an empty set of grids.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the samples of one pollutant, replacing any previous grid.
    pub fn insert(&mut self, pollutant: Pollutant, samples: &[GridSample]) {
        log::info!("Indexed {} {pollutant} grid cells", samples.len());
        self.grids.insert(
            pollutant,
            PointSampleIndex::new(samples.iter().map(|s| (s.x, s.y, s.value))),
        );
    }

    /// Concentration at the cell nearest to `point`, if a grid exists for
    /// the pollutant and a cell lies within `max_distance`.
    #[must_use]
    pub fn sample(
        &self,
        pollutant: Pollutant,
        point: &PostcodePoint,
        max_distance: Option<f64>,
    ) -> Option<f64> {
        self.grids
            .get(&pollutant)?
            .nearest(point.x, point.y, max_distance)
            .map(|(value, _)| *value)
    }
}

/// Scores one district's air quality.
///
/// Pollutants with no sampled postcode are left out and the remaining
/// sub-weights renormalised; with none sampled the result is uncomputed.
#[must_use]
pub fn aggregate(
    points: &[&PostcodePoint],
    grids: &AirGrids,
    thresholds: &AirThresholds,
    ladder: &BandLadder,
) -> ComponentResult {
    let mut raw_metrics = BTreeMap::new();
    let mut weighted = 0.0;
    let mut weight_total = 0.0;

    for &pollutant in Pollutant::all() {
        let values: Vec<f64> = points
            .iter()
            .filter_map(|p| grids.sample(pollutant, p, thresholds.max_sample_distance_m))
            .collect();
        let district_mean = stats::mean(&values);

        raw_metrics.insert(pollutant.metric_key().to_string(), district_mean);

        if let Some(concentration) = district_mean {
            let weight = thresholds.weight(pollutant);
            weighted += weight * thresholds.bounds(pollutant).score(concentration);
            weight_total += weight;
        }
    }

    if weight_total <= 0.0 {
        return ComponentResult::uncomputed(raw_metrics);
    }

    let score = weighted / weight_total;
    ComponentResult::scored(score, ladder.classify(score), raw_metrics)
}
