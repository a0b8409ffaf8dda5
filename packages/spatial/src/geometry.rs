//! `GeoJSON` feature loading and reprojection.
//!
//! Reads a `FeatureCollection`, converts each feature's geometry to
//! [`geo`] types, and reprojects it into the target CRS. Features whose
//! geometry is missing, empty, or unprojectable are skipped and counted
//! rather than failing the load.

use std::path::Path;

use geo::{HasDimensions as _, MultiPolygon, Point};
use geojson::{FeatureCollection, GeoJson, JsonObject};

use crate::{Projector, SpatialError};

/// A feature with its properties and a geometry in the target CRS.
#[derive(Debug, Clone)]
pub struct GeoFeature {
    /// Feature properties (empty if the source had none).
    pub properties: JsonObject,
    /// Reprojected geometry.
    pub geometry: geo::Geometry<f64>,
}

/// Result of loading one feature collection.
#[derive(Debug, Clone, Default)]
pub struct ProjectedFeatures {
    /// Features that loaded and reprojected successfully.
    pub features: Vec<GeoFeature>,
    /// Features dropped for a missing, empty, or unprojectable geometry.
    pub skipped: u64,
}

/// Reads and parses a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`SpatialError`] if the file cannot be read or is not `GeoJSON`.
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection, SpatialError> {
    let text = std::fs::read_to_string(path)?;
    log::debug!("Read {} bytes from {}", text.len(), path.display());
    parse_feature_collection(&text)
}

/// Parses `GeoJSON` text into a feature collection. A bare feature or
/// geometry is wrapped into a single-feature collection.
///
/// # Errors
///
/// Returns [`SpatialError::GeoJson`] if the text is not valid `GeoJSON`.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection, SpatialError> {
    let geojson: GeoJson = text.parse()?;
    Ok(match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    })
}

/// Reads the legacy `crs` member some exporters still write, e.g.
/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::27700"}}`.
#[must_use]
pub fn declared_epsg(fc: &FeatureCollection) -> Option<u32> {
    let name = fc
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    if name.ends_with("CRS84") {
        return Some(4326);
    }

    name.rsplit(':')
        .find(|part| !part.is_empty())
        .and_then(|code| code.parse().ok())
}

/// Converts and reprojects every feature of a collection.
#[must_use]
pub fn project_features(fc: FeatureCollection, projector: &Projector) -> ProjectedFeatures {
    let mut out = ProjectedFeatures::default();

    for feature in fc.features {
        match project_feature(feature, projector) {
            Ok(projected) => out.features.push(projected),
            Err(e) => {
                log::debug!("Skipping feature: {e}");
                out.skipped += 1;
            }
        }
    }

    out
}

fn project_feature(
    feature: geojson::Feature,
    projector: &Projector,
) -> Result<GeoFeature, SpatialError> {
    let geometry = feature.geometry.ok_or_else(|| SpatialError::Geometry {
        message: "feature has no geometry".to_string(),
    })?;

    let geometry: geo::Geometry<f64> =
        geometry
            .try_into()
            .map_err(|e: geojson::Error| SpatialError::Geometry {
                message: e.to_string(),
            })?;

    if geometry.is_empty() {
        return Err(SpatialError::Geometry {
            message: "empty geometry".to_string(),
        });
    }

    Ok(GeoFeature {
        properties: feature.properties.unwrap_or_default(),
        geometry: projector.transform_geometry(&geometry)?,
    })
}

/// Extracts polygonal geometry as a [`MultiPolygon`].
///
/// # Errors
///
/// Returns [`SpatialError::Geometry`] for non-polygonal or empty geometry.
pub fn to_multipolygon(geometry: &geo::Geometry<f64>) -> Result<MultiPolygon<f64>, SpatialError> {
    let multi = match geometry {
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p.clone()]),
        geo::Geometry::MultiPolygon(mp) => mp.clone(),
        geo::Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for member in gc {
                polygons.extend(to_multipolygon(member)?.0);
            }
            MultiPolygon(polygons)
        }
        other => {
            return Err(SpatialError::Geometry {
                message: format!("expected polygonal geometry, found {}", geometry_kind(other)),
            });
        }
    };

    if multi.is_empty() {
        return Err(SpatialError::Geometry {
            message: "empty polygonal geometry".to_string(),
        });
    }

    Ok(multi)
}

/// Extracts a point geometry. A single-member multipoint is accepted.
///
/// # Errors
///
/// Returns [`SpatialError::Geometry`] for any other geometry.
pub fn to_point(geometry: &geo::Geometry<f64>) -> Result<Point<f64>, SpatialError> {
    match geometry {
        geo::Geometry::Point(p) => Ok(*p),
        geo::Geometry::MultiPoint(mp) if mp.0.len() == 1 => Ok(mp.0[0]),
        other => Err(SpatialError::Geometry {
            message: format!("expected point geometry, found {}", geometry_kind(other)),
        }),
    }
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Reads a property as trimmed text. Numbers and booleans are rendered;
/// null and empty strings are `None`.
#[must_use]
pub fn property_str(properties: &JsonObject, key: &str) -> Option<String> {
    match properties.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
