#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! District environmental-health scoring pipeline.
//!
//! A run loads every input once ([`inputs::load`]), scores each postal
//! district in two phases ([`score`]), and writes the baseline and run
//! metadata ([`run`]).
//!
//! The local phase (air, noise, greenspace access) depends only on a
//! district's own postcodes and runs in parallel on rayon workers. The
//! citywide phase (greenspace capacity percentiles) needs every district's
//! local result first and runs after it, followed by confidence and the
//! composite.

pub mod air;
pub mod composite;
pub mod confidence;
pub mod config;
pub mod emit;
pub mod greenspace;
pub mod inputs;
pub mod metadata;
pub mod noise;
pub mod progress;
pub mod stats;

use std::collections::BTreeMap;
use std::path::PathBuf;

use envhealth_postcode::{DistrictCode, PostcodeError, PostcodePoint};
use envhealth_score_models::{ComponentResult, Components, ConfigError, DistrictRecord};
use envhealth_spatial::SpatialError;
use rayon::prelude::*;

pub use composite::{ComponentDeltas, Preview, preview};
pub use config::PipelineConfig;
pub use inputs::PipelineInputs;
pub use metadata::RunMetadata;
pub use progress::{NullProgress, ProgressCallback};

use crate::greenspace::{DistrictAccess, DistrictCapacity};

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration is unusable.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// A threshold table or band ladder failed validation.
    #[error(transparent)]
    Threshold(#[from] ConfigError),

    /// A CRS or geometry operation failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The postcode directory could not be loaded.
    #[error(transparent)]
    Postcode(#[from] PostcodeError),

    /// An input file has an unexpected structure.
    #[error("Input error: {message}")]
    Input {
        /// Description of what went wrong.
        message: String,
    },

    /// The postcode directory yielded no district in the configured area.
    #[error("No postcodes found in area '{area}'")]
    NoPostcodes {
        /// The configured postcode area.
        area: String,
    },

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialisation failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML configuration could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A CSV input could not be decoded.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result of the local, per-district phase.
struct LocalScores<'a> {
    district: DistrictCode,
    points: Vec<&'a PostcodePoint>,
    air: ComponentResult,
    noise: ComponentResult,
    access: DistrictAccess,
}

/// Scores every district of the loaded inputs, in natural district order.
///
/// Districts with no located postcode still get a record, with all
/// components uncomputed and very low confidence.
#[must_use]
pub fn score(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Vec<DistrictRecord> {
    let districts: Vec<(DistrictCode, Vec<&PostcodePoint>)> =
        inputs.postcodes.by_district().into_iter().collect();

    progress.set_total(districts.len() as u64);
    progress.set_message("Scoring districts".to_string());

    let locals: Vec<LocalScores<'_>> = districts
        .into_par_iter()
        .map(|(district, points)| {
            let local = LocalScores {
                air: air::aggregate(&points, &inputs.air, &config.air, &config.bands.air),
                noise: noise::aggregate(
                    &points,
                    &inputs.noise,
                    &config.noise,
                    &config.bands.noise,
                ),
                access: greenspace::measure_access(&points, &inputs.greenspace),
                district,
                points,
            };
            progress.inc(1);
            local
        })
        .collect();

    let capacities = district_capacities(inputs, &locals);
    let capacity_risks = greenspace::capacity_risks(&capacities);

    let records: Vec<DistrictRecord> = locals
        .into_iter()
        .map(|local| {
            let greenspace = greenspace::score(
                local.access,
                capacities.get(&local.district).copied(),
                capacity_risks.get(&local.district).copied(),
                &config.greenspace.thresholds,
                &config.bands.greenspace,
            );

            composite::assemble(
                &local.district,
                inputs.names.get(&local.district).cloned(),
                Components {
                    air: local.air,
                    noise: local.noise,
                    greenspace,
                },
                confidence::estimate(local.points.len() as u64, &config.confidence),
                &config.composite,
                &config.bands.overall,
            )
        })
        .collect();

    progress.finish(format!("Scored {} districts", records.len()));

    records
}

/// Citywide phase input: attributed greenspace area of every district
/// with located postcodes. Empty when no public site was loaded, so
/// capacity stays uncomputed rather than ranking every district at zero.
fn district_capacities(
    inputs: &PipelineInputs,
    locals: &[LocalScores<'_>],
) -> BTreeMap<DistrictCode, DistrictCapacity> {
    if !inputs.greenspace.has_sites() {
        return BTreeMap::new();
    }

    let areas = inputs.greenspace.attribute_areas(&inputs.postcodes.points);

    locals
        .iter()
        .filter(|local| !local.points.is_empty())
        .map(|local| {
            let total = areas.get(&local.district).copied().unwrap_or(0.0);
            (
                local.district.clone(),
                DistrictCapacity::new(total, local.points.len() as u64),
            )
        })
        .collect()
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Emitted records, in natural district order.
    pub records: Vec<DistrictRecord>,
    /// Emitted run metadata.
    pub metadata: RunMetadata,
    /// Where the baseline was written.
    pub baseline_path: PathBuf,
    /// Where the metadata was written.
    pub metadata_path: PathBuf,
}

/// Runs the whole pipeline: validate, load, score, emit.
///
/// Nothing is written unless every earlier stage succeeds, and both
/// outputs are replaced atomically.
///
/// # Errors
///
/// Returns [`PipelineError`] if the configuration is invalid, a required
/// input is missing or malformed, the area has no postcodes, or an output
/// cannot be written.
pub fn run(
    config: &PipelineConfig,
    loading: &dyn ProgressCallback,
    scoring: &dyn ProgressCallback,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    log::info!(
        "Scoring {} (postcode area {})",
        config.city.name,
        config.city.postcode_area
    );

    let inputs = inputs::load(config, loading)?;
    if inputs.postcodes.districts.is_empty() {
        return Err(PipelineError::NoPostcodes {
            area: config.city.postcode_area.clone(),
        });
    }

    let records = score(&inputs, config, scoring);
    let metadata = RunMetadata::new(
        &config.city.name,
        config.crs.target_epsg,
        inputs.counts,
        &records,
    );

    log::info!(
        "Coverage gaps: {} air, {} noise, {} greenspace, {} without overall score",
        metadata.coverage.air_uncovered,
        metadata.coverage.noise_uncovered,
        metadata.coverage.greenspace_uncovered,
        metadata.coverage.overall_null
    );

    let baseline_path = config.baseline_path();
    let metadata_path = config.metadata_path();
    emit::write_outputs(&baseline_path, &records, &metadata_path, &metadata)?;

    Ok(RunSummary {
        records,
        metadata,
        baseline_path,
        metadata_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use envhealth_postcode::ResolvedDirectory;
    use envhealth_score_models::{ConfidenceLevel, NoiseMetric, NoiseSource, Pollutant, metrics};
    use geo::{LineString, MultiPolygon, Polygon};
    use std::path::Path;

    use crate::air::{AirGrids, GridSample};
    use crate::greenspace::Greenspace;
    use crate::metadata::InputCounts;
    use crate::noise::NoiseLayers;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )])
    }

    fn point(postcode: &str, x: f64, y: f64) -> PostcodePoint {
        PostcodePoint::new(postcode, x, y).unwrap()
    }

    fn district(code: &str) -> DistrictCode {
        code.parse().unwrap()
    }

    /// Two located districts and one (`B10`) with postcodes but no
    /// coordinates.
    fn fixture() -> PipelineInputs {
        let mut postcodes = ResolvedDirectory::from_points(vec![
            point("B1 1AA", 100.0, 100.0),
            point("B1 1AB", 200.0, 100.0),
            point("B2 4QA", 5000.0, 5000.0),
        ]);
        postcodes.districts.insert(district("B10"));

        let mut air = AirGrids::new();
        air.insert(
            Pollutant::No2,
            &[
                GridSample {
                    x: 150.0,
                    y: 100.0,
                    value: 20.0,
                },
                GridSample {
                    x: 5000.0,
                    y: 5000.0,
                    value: 8.0,
                },
            ],
        );

        let mut noise = NoiseLayers::new();
        noise.insert(
            NoiseSource::Road,
            NoiseMetric::Lden,
            vec![(square(0.0, 0.0, 1000.0), 57.5)],
        );

        PipelineInputs {
            postcodes,
            names: BTreeMap::from([(district("B1"), "Birmingham City Centre".to_string())]),
            air,
            noise,
            greenspace: Greenspace::new(vec![square(0.0, 0.0, 50.0)], vec![]),
            counts: InputCounts::default(),
        }
    }

    fn record<'a>(records: &'a [DistrictRecord], code: &str) -> &'a DistrictRecord {
        records.iter().find(|r| r.district == code).unwrap()
    }

    #[test]
    fn every_district_gets_one_record_in_natural_order() {
        let records = score(&fixture(), &PipelineConfig::default(), &NullProgress);
        let codes: Vec<&str> = records.iter().map(|r| r.district.as_str()).collect();
        assert_eq!(codes, vec!["B1", "B2", "B10"]);
        assert_eq!(
            record(&records, "B1").name.as_deref(),
            Some("Birmingham City Centre")
        );
        assert_eq!(record(&records, "B2").name, None);
    }

    #[test]
    fn scores_stay_in_range_and_overall_matches_weights() {
        let config = PipelineConfig::default();
        let records = score(&fixture(), &config, &NullProgress);

        for r in &records {
            let c = &r.components;
            for s in [c.air.score, c.noise.score, c.greenspace.score, r.score_overall]
                .into_iter()
                .flatten()
            {
                assert!((0.0..=100.0).contains(&s), "{} out of range: {s}", r.district);
            }

            if let (Some(air), Some(noise), Some(greenspace)) =
                (c.air.score, c.noise.score, c.greenspace.score)
            {
                let expected = config.composite.air * air
                    + config.composite.noise * noise
                    + config.composite.greenspace * greenspace;
                assert!((r.score_overall.unwrap() - expected).abs() < 1e-6);
                assert!(r.score_band.is_some());
            } else {
                assert_eq!(r.score_overall, None);
                assert_eq!(r.score_band, None);
            }
        }
    }

    #[test]
    fn district_without_located_postcodes_is_null() {
        let records = score(&fixture(), &PipelineConfig::default(), &NullProgress);
        let empty = record(&records, "B10");

        assert_eq!(empty.confidence.postcode_count, 0);
        assert_eq!(empty.confidence.level, ConfidenceLevel::VeryLow);
        assert!(!empty.components.air.is_computed());
        assert!(!empty.components.noise.is_computed());
        assert!(!empty.components.greenspace.is_computed());
        assert_eq!(empty.score_overall, None);
    }

    #[test]
    fn components_follow_their_inputs() {
        let records = score(&fixture(), &PipelineConfig::default(), &NullProgress);

        let centre = record(&records, "B1");
        assert_eq!(centre.components.air.metric(metrics::NO2_UG_M3), Some(20.0));
        assert_eq!(
            centre.components.noise.metric(metrics::MEAN_LDEN_DB),
            Some(57.5)
        );
        assert_eq!(
            centre.components.greenspace.metric(metrics::TOTAL_GREENSPACE_M2),
            Some(2500.0)
        );

        // B2 lies outside every noise polygon and takes the quiet fallback.
        let outer = record(&records, "B2");
        assert_eq!(outer.components.noise.metric(metrics::MEAN_LDEN_DB), Some(45.0));
        assert_eq!(outer.components.noise.score, Some(100.0));
        assert_eq!(outer.components.air.score, Some(100.0));
        assert_eq!(
            outer.components.greenspace.metric(metrics::TOTAL_GREENSPACE_M2),
            Some(0.0)
        );

        // Closer to the park and with more area per postcode.
        assert!(centre.components.greenspace.score > outer.components.greenspace.score);
    }

    #[test]
    fn no_sites_leaves_capacity_uncomputed() {
        let mut inputs = fixture();
        inputs.greenspace = Greenspace::new(vec![], vec![]);
        let records = score(&inputs, &PipelineConfig::default(), &NullProgress);

        for r in &records {
            assert!(!r.components.greenspace.is_computed());
            assert_eq!(r.components.greenspace.metric(metrics::PER_POSTCODE_M2), None);
            assert_eq!(r.score_overall, None);
        }
    }

    #[test]
    fn emitted_json_is_stable() {
        let records = score(&fixture(), &PipelineConfig::default(), &NullProgress);
        let first = emit::to_json(&records).unwrap();

        let reparsed: Vec<DistrictRecord> = serde_json::from_str(&first).unwrap();
        assert_eq!(emit::to_json(&reparsed).unwrap(), first);
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "envhealth-pipeline-{name}-{}",
            std::process::id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const POSTCODES: &str = "\
pcds,east1m,north1m,lad25cd
B1 1AA,406500,286500,E08000025
B1 1AB,406600,286500,E08000025
B14 7QH,408000,280000,E08000025
B14 7QJ,,,E08000025
BA1 1AA,375000,164000,E06000022
";

    const NO2_GRID: &str = "\
Background concentrations of NO2,,,
Local_Auth_Code,x,y,Total_NO2_25
E08000025,406500,286500,25.0
E08000025,408000,280000,9.0
";

    const ROAD_LDEN: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::27700" } },
  "features": [
    {
      "type": "Feature",
      "properties": { "noiseclass": "60.0-64.9" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[406000, 286000], [407000, 286000], [407000, 287000], [406000, 287000], [406000, 286000]]]
      }
    }
  ]
}"#;

    const SITES: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "EPSG:27700" } },
  "features": [
    {
      "type": "Feature",
      "properties": { "access": "public" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[407900, 279900], [408100, 279900], [408100, 280100], [407900, 280100], [407900, 279900]]]
      }
    },
    {
      "type": "Feature",
      "properties": { "access": "private" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[406400, 286400], [406700, 286400], [406700, 286700], [406400, 286700], [406400, 286400]]]
      }
    }
  ]
}"#;

    /// Writes the sample inputs and a config into `dir` and loads it.
    fn sample_config(dir: &Path) -> PipelineConfig {
        std::fs::write(dir.join("postcodes.csv"), POSTCODES).unwrap();
        std::fs::write(dir.join("no2.csv"), NO2_GRID).unwrap();
        std::fs::write(dir.join("road_lden.geojson"), ROAD_LDEN).unwrap();
        std::fs::write(dir.join("sites.geojson"), SITES).unwrap();
        std::fs::write(dir.join("names.json"), r#"{"B14": "Kings Heath"}"#).unwrap();

        let config_path = dir.join("pipeline.toml");
        std::fs::write(
            &config_path,
            r#"
            [inputs]
            postcodes = "postcodes.csv"
            district_names = "names.json"

            [inputs.air]
            pm10 = { path = "missing-pm10.csv", value_column = "Total_PM10_25" }
            pm25 = { path = "missing-pm25.csv", value_column = "Total_PM2.5_25" }
            no2 = { path = "no2.csv", value_column = "Total_NO2_25" }

            [inputs.noise]
            road_lden = "road_lden.geojson"

            [inputs.greenspace]
            sites = "sites.geojson"

            [postcodes]
            coordinates = "easting_northing"

            [output]
            baseline = "out/baseline.json"
            "#,
        )
        .unwrap();

        PipelineConfig::load(&config_path).unwrap()
    }

    #[test]
    fn run_writes_baseline_and_metadata() {
        let dir = scratch_dir("run");
        let config = sample_config(&dir);
        let summary = run(&config, &NullProgress, &NullProgress).unwrap();

        assert_eq!(summary.baseline_path, dir.join("out/baseline.json"));
        assert_eq!(summary.metadata_path, dir.join("out/run_metadata.json"));

        let written = emit::read_baseline(&summary.baseline_path).unwrap();
        assert_eq!(written, summary.records);
        let codes: Vec<&str> = written.iter().map(|r| r.district.as_str()).collect();
        assert_eq!(codes, vec!["B1", "B14"]);

        let b1 = record(&written, "B1");
        assert_eq!(b1.components.noise.metric(metrics::MEAN_LDEN_DB), Some(62.5));
        assert_eq!(b1.components.air.metric(metrics::NO2_UG_M3), Some(25.0));

        let b14 = record(&written, "B14");
        assert_eq!(b14.name.as_deref(), Some("Kings Heath"));
        assert_eq!(b14.confidence.postcode_count, 1);
        assert_eq!(b14.components.air.score, Some(100.0));
        assert_eq!(
            b14.components.greenspace.metric(metrics::MEAN_DISTANCE_M),
            Some(0.0)
        );

        let written_metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary.metadata_path).unwrap(),
        )
        .unwrap();
        assert_eq!(written_metadata["district_count"], 2);
        assert_eq!(written_metadata["target_epsg"], 27700);

        let counts = &summary.metadata.inputs;
        assert_eq!(counts.postcodes.out_of_area, 1);
        assert_eq!(counts.postcodes.missing_coordinates, 1);
        assert_eq!(counts.greenspace.public_sites, 1);
        assert_eq!(counts.greenspace.not_public, 1);
        assert!(counts.air.contains_key(&Pollutant::No2));
        assert!(!counts.air.contains_key(&Pollutant::Pm10));

        assert!(!dir.join("out/baseline.json.tmp").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn repeated_runs_write_identical_baselines() {
        let dir = scratch_dir("repeat");
        let config = sample_config(&dir);

        let first = run(&config, &NullProgress, &NullProgress).unwrap();
        let first_bytes = std::fs::read(&first.baseline_path).unwrap();
        let second = run(&config, &NullProgress, &NullProgress).unwrap();
        let second_bytes = std::fs::read(&second.baseline_path).unwrap();

        assert_eq!(first.baseline_path, second.baseline_path);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first.records, second.records);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn parallel_scoring_keeps_natural_order() {
        let points = (1..=40)
            .map(|i| {
                let offset = f64::from(i) * 250.0;
                point(&format!("B{i} 1AA"), offset, 5000.0 - offset)
            })
            .collect();
        let inputs = PipelineInputs {
            postcodes: ResolvedDirectory::from_points(points),
            names: BTreeMap::new(),
            air: AirGrids::new(),
            noise: NoiseLayers::new(),
            greenspace: Greenspace::new(vec![square(0.0, 0.0, 500.0)], vec![]),
            counts: InputCounts::default(),
        };
        let config = PipelineConfig::default();
        let expected: Vec<String> = (1..=40).map(|i| format!("B{i}")).collect();

        let first = score(&inputs, &config, &NullProgress);
        for _ in 0..5 {
            let again = score(&inputs, &config, &NullProgress);
            let codes: Vec<&String> = again.iter().map(|r| &r.district).collect();
            assert_eq!(codes, expected.iter().collect::<Vec<_>>());
            assert_eq!(again, first);
        }
    }

    #[test]
    fn run_without_area_postcodes_fails_before_writing() {
        let dir = scratch_dir("empty");
        std::fs::write(
            dir.join("postcodes.csv"),
            "pcds,east1m,north1m,lad25cd\nBA1 1AA,375000,164000,E08000025\n",
        )
        .unwrap();

        let mut config = PipelineConfig {
            base_dir: dir.clone(),
            ..PipelineConfig::default()
        };
        config.inputs.postcodes = PathBuf::from("postcodes.csv");
        config.postcodes.coordinates = envhealth_postcode::CoordinateMode::EastingNorthing;

        let result = run(&config, &NullProgress, &NullProgress);
        assert!(matches!(result, Err(PipelineError::NoPostcodes { .. })));
        assert!(!config.baseline_path().exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_thresholds_abort_before_loading() {
        let mut config = PipelineConfig::default();
        config.composite.air = 0.9;

        let result = run(&config, &NullProgress, &NullProgress);
        assert!(matches!(result, Err(PipelineError::Threshold(_))));
    }
}
