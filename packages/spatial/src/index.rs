//! R-tree indexes used by the aggregators.
//!
//! All indexes are bulk-loaded once from planar coordinates and never
//! mutated afterwards.

use geo::{BoundingRect as _, Distance as _, Euclidean, Intersects as _, MultiPolygon, Point};
use rstar::primitives::GeomWithData;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// Computes the axis-aligned bounding box of a multipolygon for R-tree
/// insertion.
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Nearest-neighbour lookup over point samples carrying a payload.
///
/// Used for pollutant grid sampling (payload: concentrations) and for
/// attributing greenspace polygons to the closest postcode (payload:
/// district).
pub struct PointSampleIndex<T> {
    tree: RTree<GeomWithData<[f64; 2], T>>,
}

impl<T> PointSampleIndex<T> {
    /// Bulk-loads `(x, y, payload)` samples. Non-finite coordinates are
    /// dropped.
    #[must_use]
    pub fn new(samples: impl IntoIterator<Item = (f64, f64, T)>) -> Self {
        let entries = samples
            .into_iter()
            .filter(|(x, y, _)| x.is_finite() && y.is_finite())
            .map(|(x, y, data)| GeomWithData::new([x, y], data))
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the payload of the sample nearest to `(x, y)` and its
    /// distance. Samples further than `max_distance` are ignored.
    #[must_use]
    pub fn nearest(&self, x: f64, y: f64, max_distance: Option<f64>) -> Option<(&T, f64)> {
        let entry = self.tree.nearest_neighbor(&[x, y])?;
        let distance = entry.geom().distance_2(&[x, y]).sqrt();

        if let Some(limit) = max_distance
            && distance > limit
        {
            return None;
        }

        Some((&entry.data, distance))
    }

    /// Returns the payload of the sample nearest to any part of `polygon`
    /// and that distance. Samples inside the polygon are at distance zero.
    ///
    /// The nearest sample to one vertex bounds the answer, so only samples
    /// inside the polygon's envelope grown by that distance are measured.
    #[must_use]
    pub fn nearest_to_polygon(&self, polygon: &MultiPolygon<f64>) -> Option<(&T, f64)> {
        let anchor = polygon.iter().flat_map(|p| p.exterior().coords()).next()?;
        let (anchor_data, radius) = self.nearest(anchor.x, anchor.y, None)?;
        let rect = polygon.bounding_rect()?;

        let search = AABB::from_corners(
            [rect.min().x - radius, rect.min().y - radius],
            [rect.max().x + radius, rect.max().y + radius],
        );

        self.tree
            .locate_in_envelope(&search)
            .map(|entry| {
                let [x, y] = *entry.geom();
                (&entry.data, Euclidean.distance(&Point::new(x, y), polygon))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .or(Some((anchor_data, radius)))
    }

    /// Number of indexed samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// A valued polygon stored in the R-tree.
struct ValuedPolygon {
    value: f64,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for ValuedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Containment lookup over polygons that each carry one numeric value,
/// such as a noise band's representative level.
pub struct PolygonValueIndex {
    tree: RTree<ValuedPolygon>,
}

impl PolygonValueIndex {
    /// Bulk-loads `(polygon, value)` pairs.
    #[must_use]
    pub fn new(polygons: impl IntoIterator<Item = (MultiPolygon<f64>, f64)>) -> Self {
        let entries = polygons
            .into_iter()
            .map(|(polygon, value)| ValuedPolygon {
                value,
                envelope: compute_envelope(&polygon),
                polygon,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the largest value among polygons covering `(x, y)`.
    /// Points on a polygon boundary count as covered.
    #[must_use]
    pub fn max_containing(&self, x: f64, y: f64) -> Option<f64> {
        let point = Point::new(x, y);
        let query_env = AABB::from_point([x, y]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.value)
            .reduce(f64::max)
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

enum FeatureShape {
    Point([f64; 2]),
    Area(MultiPolygon<f64>),
}

struct FeatureEntry {
    envelope: AABB<[f64; 2]>,
    shape: FeatureShape,
}

impl RTreeObject for FeatureEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for FeatureEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        match &self.shape {
            FeatureShape::Point(p) => p.distance_2(point),
            FeatureShape::Area(polygon) => Euclidean
                .distance(&Point::new(point[0], point[1]), polygon)
                .powi(2),
        }
    }
}

/// Distance-to-nearest lookup over a mix of access points and polygons.
pub struct NearestFeatureIndex {
    tree: RTree<FeatureEntry>,
}

impl NearestFeatureIndex {
    /// Indexes access points only.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let entries = points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| FeatureEntry {
                envelope: AABB::from_point([x, y]),
                shape: FeatureShape::Point([x, y]),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indexes polygon boundaries.
    #[must_use]
    pub fn from_polygons(polygons: impl IntoIterator<Item = MultiPolygon<f64>>) -> Self {
        let entries = polygons
            .into_iter()
            .map(|polygon| FeatureEntry {
                envelope: compute_envelope(&polygon),
                shape: FeatureShape::Area(polygon),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Planar distance from `(x, y)` to the nearest indexed feature, or
    /// `None` when the index is empty.
    #[must_use]
    pub fn nearest_distance(&self, x: f64, y: f64) -> Option<f64> {
        self.tree
            .nearest_neighbor(&[x, y])
            .map(|entry| entry.distance_2(&[x, y]).sqrt())
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

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

    #[test]
    fn nearest_sample_respects_max_distance() {
        let index = PointSampleIndex::new(vec![(0.0, 0.0, "a"), (1000.0, 0.0, "b")]);

        let (data, distance) = index.nearest(900.0, 0.0, None).unwrap();
        assert_eq!(*data, "b");
        assert!((distance - 100.0).abs() < 1e-9);

        assert!(index.nearest(5000.0, 0.0, Some(1500.0)).is_none());
        assert!(index.nearest(2400.0, 0.0, Some(1500.0)).is_some());
    }

    #[test]
    fn empty_sample_index_finds_nothing() {
        let index: PointSampleIndex<u8> = PointSampleIndex::new(Vec::new());
        assert!(index.is_empty());
        assert!(index.nearest(0.0, 0.0, None).is_none());
        assert!(index.nearest_to_polygon(&square(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn nearest_to_polygon_measures_from_the_edge() {
        // Wide strip: "edge" sits just above its far end, "vertex" is
        // nearer the first vertex but further from the strip itself.
        let strip = MultiPolygon(vec![Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (1000.0, 0.0),
                (1000.0, 10.0),
                (0.0, 10.0),
                (0.0, 0.0),
            ]),
            vec![],
        )]);
        let index = PointSampleIndex::new(vec![(-30.0, 0.0, "vertex"), (900.0, 15.0, "edge")]);

        let (data, distance) = index.nearest_to_polygon(&strip).unwrap();
        assert_eq!(*data, "edge");
        assert!((distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn sample_inside_polygon_is_at_zero() {
        let index = PointSampleIndex::new(vec![(50.0, 50.0, 1_u8), (-5.0, 0.0, 2)]);
        let (data, distance) = index.nearest_to_polygon(&square(0.0, 0.0, 100.0)).unwrap();
        assert_eq!(*data, 1);
        assert!(distance.abs() < 1e-9);
    }

    #[test]
    fn overlapping_polygons_take_the_maximum() {
        let index = PolygonValueIndex::new(vec![
            (square(0.0, 0.0, 100.0), 57.5),
            (square(50.0, 50.0, 100.0), 67.5),
        ]);

        assert_eq!(index.max_containing(25.0, 25.0), Some(57.5));
        assert_eq!(index.max_containing(75.0, 75.0), Some(67.5));
        assert_eq!(index.max_containing(500.0, 500.0), None);
    }

    #[test]
    fn boundary_point_is_contained() {
        let index = PolygonValueIndex::new(vec![(square(0.0, 0.0, 100.0), 52.5)]);
        assert_eq!(index.max_containing(100.0, 50.0), Some(52.5));
    }

    #[test]
    fn polygon_distance_is_zero_inside_and_to_edge_outside() {
        let index = NearestFeatureIndex::from_polygons(vec![
            square(0.0, 0.0, 100.0),
            square(1000.0, 0.0, 100.0),
        ]);

        assert!(index.nearest_distance(50.0, 50.0).unwrap().abs() < 1e-9);
        assert!((index.nearest_distance(300.0, 50.0).unwrap() - 200.0).abs() < 1e-9);
        // Corner case: diagonal to (100, 100).
        let d = index.nearest_distance(103.0, 104.0).unwrap();
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn access_point_distance() {
        let index = NearestFeatureIndex::from_points(vec![(0.0, 0.0), (600.0, 800.0)]);
        let d = index.nearest_distance(600.0, 0.0).unwrap();
        assert!((d - 600.0).abs() < 1e-9);
        assert!(NearestFeatureIndex::from_points(Vec::new())
            .nearest_distance(0.0, 0.0)
            .is_none());
    }

    #[test]
    fn envelope_covers_polygon() {
        let env = compute_envelope(&square(10.0, 20.0, 5.0));
        assert_eq!(env.lower(), [10.0, 20.0]);
        assert_eq!(env.upper(), [15.0, 25.0]);
    }
}
