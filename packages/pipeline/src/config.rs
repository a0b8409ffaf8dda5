//! Pipeline configuration.
//!
//! Loaded from a single TOML file. Every section has defaults, so an empty
//! file configures a Birmingham run with inputs under `data/`. Relative
//! paths resolve against the directory containing the config file.

use std::path::{Path, PathBuf};

use envhealth_postcode::{DirectoryFilter, DirectoryLayout};
use envhealth_score_models::BandLadders;
use envhealth_score_models::thresholds::{
    AirThresholds, CompositeWeights, ConfidenceThresholds, GreenspaceThresholds, NoiseThresholds,
};
use envhealth_spatial::Crs;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Complete configuration of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// City and postcode-area selection.
    pub city: CityConfig,
    /// Coordinate reference systems.
    pub crs: CrsConfig,
    /// Input file locations.
    pub inputs: InputPaths,
    /// Output file locations.
    pub output: OutputPaths,
    /// Postcode directory layout.
    pub postcodes: DirectoryLayout,
    /// Air quality thresholds.
    pub air: AirThresholds,
    /// Noise thresholds.
    pub noise: NoiseThresholds,
    /// Greenspace thresholds and public-access filter.
    pub greenspace: GreenspaceConfig,
    /// Confidence tiers.
    pub confidence: ConfidenceThresholds,
    /// Composite weights.
    pub composite: CompositeWeights,
    /// Band ladders.
    pub bands: BandLadders,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which postcodes make up the city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityConfig {
    /// Display name.
    pub name: String,
    /// Postcode area letters.
    pub postcode_area: String,
    /// Local authority code filter; an empty string disables it.
    pub local_authority_code: Option<String>,
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            name: "Birmingham".to_string(),
            postcode_area: "B".to_string(),
            local_authority_code: Some("E08000025".to_string()),
        }
    }
}

impl CityConfig {
    /// Postcode directory filter for this city.
    #[must_use]
    pub fn directory_filter(&self) -> DirectoryFilter {
        DirectoryFilter {
            area: self.postcode_area.trim().to_ascii_uppercase(),
            local_authority_code: self
                .local_authority_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string),
        }
    }
}

/// EPSG codes of the working CRS and of inputs that do not declare one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrsConfig {
    /// Planar CRS every geometry is normalised into.
    pub target_epsg: u32,
    /// CRS of the pollutant grid `x`/`y` columns.
    pub air_grid_epsg: u32,
    /// CRS assumed for `GeoJSON` files without a `crs` member.
    pub geojson_default_epsg: u32,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self {
            target_epsg: 27700,
            air_grid_epsg: 27700,
            geojson_default_epsg: 4326,
        }
    }
}

impl CrsConfig {
    /// The working CRS.
    ///
    /// # Errors
    ///
    /// Returns a projection error if the code is unsupported.
    pub fn target(&self) -> Result<Crs, PipelineError> {
        Ok(Crs::from_epsg(self.target_epsg)?)
    }
}

/// One pollutant grid file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInput {
    /// CSV path.
    pub path: PathBuf,
    /// Concentration column.
    pub value_column: String,
}

/// Pollutant grid inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirInputs {
    /// NO₂ grid.
    pub no2: Option<GridInput>,
    /// PM₁₀ grid.
    pub pm10: Option<GridInput>,
    /// PM₂.₅ grid.
    pub pm25: Option<GridInput>,
    /// Column name that identifies the real header row below any preamble.
    pub header_key: String,
    /// Cell-centre x column.
    pub x_column: String,
    /// Cell-centre y column.
    pub y_column: String,
}

impl Default for AirInputs {
    fn default() -> Self {
        let grid = |file: &str, column: &str| {
            Some(GridInput {
                path: PathBuf::from(format!("data/_air/{file}")),
                value_column: column.to_string(),
            })
        };
        Self {
            no2: grid("birmingham-no2-2025.csv", "Total_NO2_25"),
            pm10: grid("birmingham-pm10-2025.csv", "Total_PM10_25"),
            pm25: grid("birmingham-pm25-2025.csv", "Total_PM2.5_25"),
            header_key: "Local_Auth_Code".to_string(),
            x_column: "x".to_string(),
            y_column: "y".to_string(),
        }
    }
}

/// Strategic noise map layers. A missing layer contributes no polygons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseInputs {
    /// Road traffic Lden polygons.
    pub road_lden: Option<PathBuf>,
    /// Road traffic Lnight polygons.
    pub road_lnight: Option<PathBuf>,
    /// Railway Lden polygons.
    pub rail_lden: Option<PathBuf>,
    /// Railway Lnight polygons.
    pub rail_lnight: Option<PathBuf>,
    /// Property holding the noise class label.
    pub class_field: String,
}

impl Default for NoiseInputs {
    fn default() -> Self {
        let layer = |name: &str| Some(PathBuf::from(format!("data/_noise/{name}.geojson")));
        Self {
            road_lden: layer("road_lden"),
            road_lnight: layer("road_lnight"),
            rail_lden: layer("rail_lden"),
            rail_lnight: layer("rail_lnight"),
            class_field: "noiseclass".to_string(),
        }
    }
}

/// Greenspace inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenspaceInputs {
    /// Greenspace site polygons.
    pub sites: PathBuf,
    /// Optional designated access points.
    pub access_points: Option<PathBuf>,
}

impl Default for GreenspaceInputs {
    fn default() -> Self {
        Self {
            sites: PathBuf::from("data/_greenspace/greenspace_sites.geojson"),
            access_points: Some(PathBuf::from(
                "data/_greenspace/greenspace_access_points.geojson",
            )),
        }
    }
}

/// All input locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    /// Postcode directory CSV.
    pub postcodes: PathBuf,
    /// District code to display name JSON.
    pub district_names: Option<PathBuf>,
    /// Pollutant grids.
    pub air: AirInputs,
    /// Noise layers.
    pub noise: NoiseInputs,
    /// Greenspace layers.
    pub greenspace: GreenspaceInputs,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            postcodes: PathBuf::from("data/_postcodes/postcodes.csv"),
            district_names: Some(PathBuf::from("data/postcode_district_names.json")),
            air: AirInputs::default(),
            noise: NoiseInputs::default(),
            greenspace: GreenspaceInputs::default(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    /// Baseline JSON consumed by the dashboard.
    pub baseline: PathBuf,
    /// Run metadata JSON. Defaults to `run_metadata.json` next to the
    /// baseline.
    pub metadata: Option<PathBuf>,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            baseline: PathBuf::from("data/birmingham_baseline.json"),
            metadata: None,
        }
    }
}

/// Greenspace thresholds plus the public-access filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenspaceConfig {
    /// Scoring thresholds.
    #[serde(flatten)]
    pub thresholds: GreenspaceThresholds,
    /// Property describing who may use a site.
    pub access_field: String,
    /// Values of `access_field` (case-insensitive) that mark a site as not
    /// public.
    pub excluded_access: Vec<String>,
}

impl Default for GreenspaceConfig {
    fn default() -> Self {
        Self {
            thresholds: GreenspaceThresholds::default(),
            access_field: "access".to_string(),
            excluded_access: vec!["private".to_string(), "restricted".to_string()],
        }
    }
}

impl GreenspaceConfig {
    /// Whether a site with the given access value is public.
    #[must_use]
    pub fn is_public(&self, access: Option<&str>) -> bool {
        access.is_none_or(|value| {
            !self
                .excluded_access
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(value.trim()))
        })
    }
}

impl PipelineConfig {
    /// Reads a TOML config file. Relative paths in it resolve against the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses TOML text. Relative paths resolve against the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Toml`] if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves a configured path against [`Self::base_dir`].
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolved baseline output path.
    #[must_use]
    pub fn baseline_path(&self) -> PathBuf {
        self.resolve(&self.output.baseline)
    }

    /// Resolved metadata output path.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.output.metadata.as_deref().map_or_else(
            || {
                self.baseline_path()
                    .with_file_name("run_metadata.json")
            },
            |path| self.resolve(path),
        )
    }

    /// Checks every threshold table, ladder, and CRS. Runs before any
    /// input is read; any failure aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Threshold`] for bad scoring tables,
    /// [`PipelineError::Spatial`] for unusable CRS codes, and
    /// [`PipelineError::Config`] for anything else.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let area = self.city.postcode_area.trim();
        if area.is_empty() || area.len() > 2 || !area.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PipelineError::Config {
                message: format!("postcode_area must be one or two letters (got '{area}')"),
            });
        }

        let target = self.crs.target()?;
        if !target.is_planar() {
            return Err(PipelineError::Config {
                message: format!("target CRS {target} is not planar"),
            });
        }
        Crs::from_epsg(self.crs.air_grid_epsg)?;
        Crs::from_epsg(self.crs.geojson_default_epsg)?;

        if self.inputs.noise.class_field.trim().is_empty() {
            return Err(PipelineError::Config {
                message: "noise class_field must not be empty".to_string(),
            });
        }

        self.air.validate()?;
        self.noise.validate()?;
        self.greenspace.thresholds.validate()?;
        self.confidence.validate()?;
        self.composite.validate()?;
        self.bands.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_birmingham_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config.city.postcode_area, "B");
        assert_eq!(config.crs.target_epsg, 27700);
        assert!((config.composite.air - 0.4).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [city]
            name = "Bath"
            postcode_area = "BA"
            local_authority_code = ""

            [air.no2]
            safe = 40.0
            danger = 200.0

            [greenspace]
            p75_distance_weight = 0.6
            mean_distance_weight = 0.4
            "#,
        )
        .unwrap();

        assert_eq!(config.city.postcode_area, "BA");
        assert_eq!(config.city.directory_filter().local_authority_code, None);
        assert!((config.air.no2.danger - 200.0).abs() < f64::EPSILON);
        assert!((config.air.pm10.safe - 15.0).abs() < f64::EPSILON);
        assert!((config.greenspace.thresholds.p75_distance_weight - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.greenspace.access_field, "access");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_bounds_are_fatal() {
        let config = PipelineConfig::from_toml(
            r"
            [air.pm25]
            safe = 25.0
            danger = 25.0
            ",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Threshold(_))
        ));
    }

    #[test]
    fn composite_weights_must_sum_to_one() {
        let config = PipelineConfig::from_toml(
            r"
            [composite]
            air = 0.5
            noise = 0.3
            greenspace = 0.3
            ",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsupported_crs_is_a_projection_error() {
        let config = PipelineConfig::from_toml("[crs]\ntarget_epsg = 3857\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Spatial(envhealth_spatial::SpatialError::Projection { .. }))
        ));

        let geographic = PipelineConfig::from_toml("[crs]\ntarget_epsg = 4326\n").unwrap();
        assert!(geographic.validate().is_err());
    }

    #[test]
    fn paths_resolve_against_config_directory() {
        let mut config = PipelineConfig::default();
        config.base_dir = PathBuf::from("/srv/envhealth");
        assert_eq!(
            config.baseline_path(),
            PathBuf::from("/srv/envhealth/data/birmingham_baseline.json")
        );
        assert_eq!(
            config.metadata_path(),
            PathBuf::from("/srv/envhealth/data/run_metadata.json")
        );
        assert_eq!(
            config.resolve(Path::new("/abs/file.csv")),
            PathBuf::from("/abs/file.csv")
        );
    }

    #[test]
    fn private_sites_are_not_public() {
        let config = GreenspaceConfig::default();
        assert!(config.is_public(None));
        assert!(config.is_public(Some("Public")));
        assert!(!config.is_public(Some("Private")));
        assert!(!config.is_public(Some(" RESTRICTED ")));
    }
}
