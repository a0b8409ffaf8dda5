#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Postcode resolution.
//!
//! Turns a postcode directory into the located [`PostcodePoint`]s of one
//! city, each assigned to exactly one postal district.

pub mod directory;
pub mod district;
pub mod names;

pub use directory::{
    CoordinateMode, DirectoryFilter, DirectoryLayout, PostcodePoint, ResolveStats,
    ResolvedDirectory, resolve_path, resolve_reader,
};
pub use district::{DistrictCode, Postcode};
pub use names::{load_district_names, parse_district_names};

/// Errors that can occur while resolving postcodes.
#[derive(Debug, thiserror::Error)]
pub enum PostcodeError {
    /// A postcode or district code failed to parse.
    #[error("Invalid postcode '{postcode}': {reason}")]
    Parse {
        /// The raw input.
        postcode: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required directory column is absent.
    #[error("Postcode directory is missing column '{column}'")]
    MissingColumn {
        /// The configured column name.
        column: String,
    },

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Coordinate projection could not be set up.
    #[error(transparent)]
    Spatial(#[from] envhealth_spatial::SpatialError),
}
