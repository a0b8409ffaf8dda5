#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial reference normalisation and in-memory spatial indexes.
//!
//! Every input geometry is reprojected into one planar CRS (British
//! National Grid by default) before it reaches an aggregator, so distances
//! and areas are metric. The indexes here are built once per pipeline run
//! and are read-only afterwards, which makes them safe to share by
//! reference across parallel per-district workers.

pub mod geometry;
pub mod index;
pub mod projection;

pub use geometry::{GeoFeature, ProjectedFeatures};
pub use index::{NearestFeatureIndex, PointSampleIndex, PolygonValueIndex};
pub use projection::{Crs, Projector};

/// Errors that can occur during spatial operations.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// A geometry or coordinate is malformed, empty, or out of range.
    /// Records failing this way are skipped and counted, not fatal.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of what went wrong.
        message: String,
    },

    /// A CRS is unsupported or unusable. Fatal for the run.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpatialError {
    /// Returns whether this error only invalidates a single record.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Geometry { .. })
    }
}
