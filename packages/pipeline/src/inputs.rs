//! Loading raw inputs from disk into indexed, projected form.
//!
//! Only the postcode directory is mandatory. Any other configured input
//! that does not exist is logged and skipped, which leaves the affected
//! domain uncovered rather than failing the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use envhealth_postcode::{DistrictCode, ResolvedDirectory, load_district_names, resolve_path};
use envhealth_score_models::{NoiseMetric, NoiseSource, Pollutant};
use envhealth_spatial::geometry::{declared_epsg, project_features, read_feature_collection};
use envhealth_spatial::{Crs, ProjectedFeatures, Projector};

use crate::PipelineError;
use crate::air::{self, AirGrids, GridColumns};
use crate::config::{GridInput, PipelineConfig};
use crate::greenspace::{self, Greenspace};
use crate::metadata::{GreenspaceCounts, GridCounts, InputCounts, LayerCounts};
use crate::noise::{self, NoiseLayers};
use crate::progress::ProgressCallback;

/// Everything a scoring pass reads. Built once, then shared read-only
/// across district workers.
pub struct PipelineInputs {
    /// Resolved postcodes and their districts.
    pub postcodes: ResolvedDirectory,
    /// District display names.
    pub names: BTreeMap<DistrictCode, String>,
    /// Pollutant grids.
    pub air: AirGrids,
    /// Noise layers.
    pub noise: NoiseLayers,
    /// Public greenspace.
    pub greenspace: Greenspace,
    /// Load counts for run metadata.
    pub counts: InputCounts,
}

/// Loads every configured input.
///
/// # Errors
///
/// Returns [`PipelineError`] if the postcode directory is unreadable, an
/// input file is malformed, or a declared CRS is unsupported.
pub fn load(
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<PipelineInputs, PipelineError> {
    let target = config.crs.target()?;
    let mut counts = InputCounts::default();

    progress.set_total(4);

    progress.set_message("Resolving postcodes".to_string());
    let postcodes = resolve_path(
        &config.resolve(&config.inputs.postcodes),
        &config.postcodes,
        &config.city.directory_filter(),
        target,
    )?;
    counts.postcodes = postcodes.stats;

    let names_path = optional(
        config,
        config.inputs.district_names.as_deref(),
        "district names",
    );
    let names = match names_path {
        Some(path) => load_district_names(&path)?,
        None => BTreeMap::new(),
    };
    counts.district_names = names.len() as u64;
    progress.inc(1);

    progress.set_message("Loading pollutant grids".to_string());
    let air = load_air(config, target, &mut counts)?;
    progress.inc(1);

    progress.set_message("Loading noise layers".to_string());
    let noise = load_noise(config, target, &mut counts)?;
    progress.inc(1);

    progress.set_message("Loading greenspace".to_string());
    let greenspace = load_greenspace(config, target, &mut counts.greenspace)?;
    progress.inc(1);

    progress.finish(format!(
        "Loaded {} postcodes in {} districts",
        postcodes.points.len(),
        postcodes.districts.len()
    ));

    Ok(PipelineInputs {
        postcodes,
        names,
        air,
        noise,
        greenspace,
        counts,
    })
}

/// Resolves an optional input, returning `None` (with a warning) when it is
/// unset or absent on disk.
fn optional(config: &PipelineConfig, path: Option<&Path>, what: &str) -> Option<PathBuf> {
    let path = config.resolve(path?);
    if path.exists() {
        Some(path)
    } else {
        log::warn!("No {what} at {}; skipping", path.display());
        None
    }
}

/// Reads a `GeoJSON` layer and projects it into `target`. The layer's own
/// `crs` member wins over the configured default.
fn geojson_layer(
    path: &Path,
    default_epsg: u32,
    target: Crs,
) -> Result<ProjectedFeatures, PipelineError> {
    let fc = read_feature_collection(path)?;
    let source = declared_epsg(&fc).unwrap_or(default_epsg);
    let projector = Projector::from_epsg(source, target.epsg())?;

    let total = fc.features.len();
    let projected = project_features(fc, &projector);
    log::info!(
        "Read {total} features from {} (EPSG:{source}), {} skipped",
        path.display(),
        projected.skipped
    );

    Ok(projected)
}

fn load_air(
    config: &PipelineConfig,
    target: Crs,
    counts: &mut InputCounts,
) -> Result<AirGrids, PipelineError> {
    let inputs = &config.inputs.air;
    let projector = Projector::from_epsg(config.crs.air_grid_epsg, target.epsg())?;
    let mut grids = AirGrids::new();

    let configured: [(Pollutant, Option<&GridInput>); 3] = [
        (Pollutant::No2, inputs.no2.as_ref()),
        (Pollutant::Pm10, inputs.pm10.as_ref()),
        (Pollutant::Pm25, inputs.pm25.as_ref()),
    ];

    for (pollutant, input) in configured {
        let Some(input) = input else {
            continue;
        };
        let what = format!("{pollutant} grid");
        let Some(path) = optional(config, Some(input.path.as_path()), &what) else {
            continue;
        };

        let text = std::fs::read_to_string(&path)?;
        let load = air::parse_grid(
            &text,
            GridColumns {
                header_key: &inputs.header_key,
                x: &inputs.x_column,
                y: &inputs.y_column,
                value: &input.value_column,
            },
            &projector,
        )
        .map_err(|e| PipelineError::Input {
            message: format!("{}: {e}", path.display()),
        })?;

        if load.skipped > 0 {
            log::warn!("Skipped {} unusable {pollutant} grid rows", load.skipped);
        }

        counts.air.insert(
            pollutant,
            GridCounts {
                cells: load.samples.len() as u64,
                skipped: load.skipped,
            },
        );
        grids.insert(pollutant, &load.samples);
    }

    Ok(grids)
}

fn load_noise(
    config: &PipelineConfig,
    target: Crs,
    counts: &mut InputCounts,
) -> Result<NoiseLayers, PipelineError> {
    let inputs = &config.inputs.noise;
    let mut layers = NoiseLayers::new();

    let configured = [
        (NoiseSource::Road, NoiseMetric::Lden, inputs.road_lden.as_deref()),
        (NoiseSource::Road, NoiseMetric::Lnight, inputs.road_lnight.as_deref()),
        (NoiseSource::Rail, NoiseMetric::Lden, inputs.rail_lden.as_deref()),
        (NoiseSource::Rail, NoiseMetric::Lnight, inputs.rail_lnight.as_deref()),
    ];

    for (source, metric, path) in configured {
        let label = format!("{source}_{metric}");
        let what = format!("{source} {metric} noise layer");
        let Some(path) = optional(config, path, &what) else {
            continue;
        };

        let projected = geojson_layer(&path, config.crs.geojson_default_epsg, target)?;
        let load =
            noise::classify_features(&projected.features, &inputs.class_field, &config.noise);

        if load.unknown_class > 0 {
            log::warn!(
                "Skipped {} {label} polygons with unknown noise class",
                load.unknown_class
            );
        }

        counts.noise.insert(
            label,
            LayerCounts {
                polygons: load.polygons.len() as u64,
                unknown_class: load.unknown_class,
                bad_geometry: load.bad_geometry + projected.skipped,
            },
        );
        layers.insert(source, metric, load.polygons);
    }

    Ok(layers)
}

fn load_greenspace(
    config: &PipelineConfig,
    target: Crs,
    counts: &mut GreenspaceCounts,
) -> Result<Greenspace, PipelineError> {
    let inputs = &config.inputs.greenspace;
    let default_epsg = config.crs.geojson_default_epsg;

    let sites = match optional(config, Some(inputs.sites.as_path()), "greenspace sites") {
        Some(path) => {
            let projected = geojson_layer(&path, default_epsg, target)?;
            let load = greenspace::public_sites(&projected.features, &config.greenspace);
            log::info!(
                "Kept {} public greenspace sites, excluded {} not public",
                load.sites.len(),
                load.not_public
            );
            counts.public_sites = load.sites.len() as u64;
            counts.not_public = load.not_public;
            counts.bad_geometry = load.bad_geometry + projected.skipped;
            load.sites
        }
        None => Vec::new(),
    };

    let access_points = match optional(
        config,
        inputs.access_points.as_deref(),
        "greenspace access points",
    ) {
        Some(path) => {
            let projected = geojson_layer(&path, default_epsg, target)?;
            let (points, skipped) = greenspace::access_points(&projected.features);
            counts.access_points = points.len() as u64;
            counts.access_points_skipped = skipped + projected.skipped;
            points
        }
        None => Vec::new(),
    };

    Ok(Greenspace::new(sites, access_points))
}
