//! Coordinate reference normalisation.
//!
//! Converts between WGS84 longitude/latitude (EPSG:4326) and the British
//! National Grid (EPSG:27700) so that distance, area, and containment
//! operations run in metres. The conversion chain is the Ordnance Survey
//! one: geodetic → ECEF on GRS80, seven-parameter Helmert to OSGB36,
//! geodetic on Airy 1830, then the National Grid Transverse Mercator. The
//! inverse runs the same chain backwards with an exactly inverted Helmert,
//! so a round trip is stable to well under a millimetre.

use std::f64::consts::PI;

use geo::{Coord, MapCoords};

use crate::SpatialError;

/// Convergence limit for the iterative latitude solutions (radians).
const LATITUDE_EPSILON: f64 = 1e-13;

/// Convergence limit for the inverse meridional arc iteration (metres).
const ARC_EPSILON_M: f64 = 1e-6;

/// Iteration cap for both iterative solutions.
const MAX_ITERATIONS: usize = 32;

const ARC_SECOND: f64 = PI / (180.0 * 3600.0);

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS84 longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// OSGB36 British National Grid easting/northing in metres
    /// (EPSG:27700).
    BritishNationalGrid,
}

impl Crs {
    /// Resolves an EPSG code.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] for unsupported codes.
    pub fn from_epsg(code: u32) -> Result<Self, SpatialError> {
        match code {
            4326 => Ok(Self::Wgs84),
            27700 => Ok(Self::BritishNationalGrid),
            other => Err(SpatialError::Projection {
                message: format!("unsupported CRS EPSG:{other}"),
            }),
        }
    }

    /// Returns the EPSG code.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::BritishNationalGrid => 27700,
        }
    }

    /// Returns whether coordinates are planar metres.
    #[must_use]
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::BritishNationalGrid)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Transforms coordinates from a source CRS into a target CRS.
///
/// Cheap to copy and free of shared state, so one projector can be used
/// from any number of threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projector {
    source: Crs,
    target: Crs,
}

impl Projector {
    /// Creates a projector into a planar target CRS.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if `target` is not planar.
    pub fn new(source: Crs, target: Crs) -> Result<Self, SpatialError> {
        if !target.is_planar() {
            return Err(SpatialError::Projection {
                message: format!("target {target} is not a planar CRS"),
            });
        }
        Ok(Self { source, target })
    }

    /// Creates a projector from EPSG codes.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if either code is unsupported
    /// or the target is not planar.
    pub fn from_epsg(source: u32, target: u32) -> Result<Self, SpatialError> {
        Self::new(Crs::from_epsg(source)?, Crs::from_epsg(target)?)
    }

    /// Source CRS.
    #[must_use]
    pub const fn source(&self) -> Crs {
        self.source
    }

    /// Target CRS.
    #[must_use]
    pub const fn target(&self) -> Crs {
        self.target
    }

    /// Returns the projector that undoes this one.
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self {
            source: self.target,
            target: self.source,
        }
    }

    /// Transforms a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Geometry`] if the input is non-finite or
    /// outside the valid range of the source CRS.
    pub fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
        check_coord(self.source, coord)?;

        let out = match (self.source, self.target) {
            (Crs::Wgs84, Crs::Wgs84) | (Crs::BritishNationalGrid, Crs::BritishNationalGrid) => {
                coord
            }
            (Crs::Wgs84, Crs::BritishNationalGrid) => wgs84_to_national_grid(coord),
            (Crs::BritishNationalGrid, Crs::Wgs84) => national_grid_to_wgs84(coord),
        };

        if out.x.is_finite() && out.y.is_finite() {
            Ok(out)
        } else {
            Err(SpatialError::Geometry {
                message: format!(
                    "({}, {}) has no representation in {}",
                    coord.x, coord.y, self.target
                ),
            })
        }
    }

    /// Transforms every vertex of a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Geometry`] if any vertex fails to transform.
    pub fn transform_geometry<G>(&self, geometry: &G) -> Result<G::Output, SpatialError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|coord| self.transform(coord))
    }
}

fn check_coord(crs: Crs, coord: Coord<f64>) -> Result<(), SpatialError> {
    if !(coord.x.is_finite() && coord.y.is_finite()) {
        return Err(SpatialError::Geometry {
            message: format!("non-finite coordinate ({}, {})", coord.x, coord.y),
        });
    }
    if crs == Crs::Wgs84 && (coord.y.abs() > 90.0 || coord.x.abs() > 180.0) {
        return Err(SpatialError::Geometry {
            message: format!(
                "longitude/latitude ({}, {}) out of range",
                coord.x, coord.y
            ),
        });
    }
    Ok(())
}

// ── Ellipsoids ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Ellipsoid {
    a: f64,
    b: f64,
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_140,
};

impl Ellipsoid {
    fn e2(self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }

    /// Prime vertical radius of curvature at `lat`.
    fn nu(self, lat: f64) -> f64 {
        self.a / (1.0 - self.e2() * lat.sin().powi(2)).sqrt()
    }

    /// Geodetic (radians, zero height) to earth-centred cartesian.
    fn to_cartesian(self, lat: f64, lon: f64) -> [f64; 3] {
        let nu = self.nu(lat);
        [
            nu * lat.cos() * lon.cos(),
            nu * lat.cos() * lon.sin(),
            (1.0 - self.e2()) * nu * lat.sin(),
        ]
    }

    /// Earth-centred cartesian to geodetic latitude/longitude (radians).
    fn to_geodetic(self, [x, y, z]: [f64; 3]) -> (f64, f64) {
        let e2 = self.e2();
        let p = x.hypot(y);
        let mut lat = z.atan2(p * (1.0 - e2));

        for _ in 0..MAX_ITERATIONS {
            let next = (z + e2 * self.nu(lat) * lat.sin()).atan2(p);
            let done = (next - lat).abs() < LATITUDE_EPSILON;
            lat = next;
            if done {
                break;
            }
        }

        (lat, y.atan2(x))
    }
}

// ── Helmert ─────────────────────────────────────────────────────────

/// Seven-parameter similarity transform between cartesian datums.
#[derive(Debug, Clone, Copy)]
struct Helmert {
    translation: [f64; 3],
    scale_ppm: f64,
    rotation: [f64; 3],
}

/// WGS84 → OSGB36, as published by Ordnance Survey.
const WGS84_TO_OSGB36: Helmert = Helmert {
    translation: [-446.448, 125.157, -542.060],
    scale_ppm: 20.4894,
    rotation: [
        -0.1502 * ARC_SECOND,
        -0.2470 * ARC_SECOND,
        -0.8421 * ARC_SECOND,
    ],
};

impl Helmert {
    fn matrix(self) -> [[f64; 3]; 3] {
        let [rx, ry, rz] = self.rotation;
        [[1.0, -rz, ry], [rz, 1.0, -rx], [-ry, rx, 1.0]]
    }

    fn scale(self) -> f64 {
        1.0 + self.scale_ppm * 1e-6
    }

    fn apply(self, v: [f64; 3]) -> [f64; 3] {
        let m = self.matrix();
        let s = self.scale();
        let mut out = [0.0; 3];
        for (i, row) in m.iter().enumerate() {
            let dot = row[0].mul_add(v[0], row[1].mul_add(v[1], row[2] * v[2]));
            out[i] = s.mul_add(dot, self.translation[i]);
        }
        out
    }

    /// Exact inverse of [`Self::apply`].
    fn invert(self, v: [f64; 3]) -> [f64; 3] {
        let s = self.scale();
        let rhs = [
            (v[0] - self.translation[0]) / s,
            (v[1] - self.translation[1]) / s,
            (v[2] - self.translation[2]) / s,
        ];
        solve_3x3(self.matrix(), rhs)
    }
}

/// Solves `m · x = rhs` by Cramer's rule. `m` is always near-identity here.
fn solve_3x3(m: [[f64; 3]; 3], rhs: [f64; 3]) -> [f64; 3] {
    let det3 = |c: [[f64; 3]; 3]| {
        c[0][0] * c[1][1].mul_add(c[2][2], -(c[1][2] * c[2][1]))
            - c[0][1] * c[1][0].mul_add(c[2][2], -(c[1][2] * c[2][0]))
            + c[0][2] * c[1][0].mul_add(c[2][1], -(c[1][1] * c[2][0]))
    };

    let det = det3(m);
    let mut out = [0.0; 3];
    for (col, value) in out.iter_mut().enumerate() {
        let mut replaced = m;
        for (row, r) in replaced.iter_mut().enumerate() {
            r[col] = rhs[row];
        }
        *value = det3(replaced) / det;
    }
    out
}

// ── Transverse Mercator ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct TransverseMercator {
    ellipsoid: Ellipsoid,
    scale: f64,
    lat0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

const NATIONAL_GRID: TransverseMercator = TransverseMercator {
    ellipsoid: AIRY_1830,
    scale: 0.999_601_271_7,
    lat0: 49.0 * PI / 180.0,
    lon0: -2.0 * PI / 180.0,
    false_easting: 400_000.0,
    false_northing: -100_000.0,
};

impl TransverseMercator {
    fn n(self) -> f64 {
        let Ellipsoid { a, b } = self.ellipsoid;
        (a - b) / (a + b)
    }

    /// Meridional arc from `lat0` to `lat`, scaled.
    fn meridional_arc(self, lat: f64) -> f64 {
        let n = self.n();
        let (n2, n3) = (n * n, n * n * n);
        let d = lat - self.lat0;
        let s = lat + self.lat0;

        let ma = (1.0 + n + 1.25 * n2 + 1.25 * n3) * d;
        let mb = (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * d.sin() * s.cos();
        let mc = (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3) * (2.0 * d).sin() * (2.0 * s).cos();
        let md = 35.0 / 24.0 * n3 * (3.0 * d).sin() * (3.0 * s).cos();

        self.ellipsoid.b * self.scale * (ma - mb + mc - md)
    }

    /// Radii of curvature (scaled) and `eta²` at `lat`.
    fn radii(self, lat: f64) -> (f64, f64, f64) {
        let e2 = self.ellipsoid.e2();
        let a_f0 = self.ellipsoid.a * self.scale;
        let w = 1.0 - e2 * lat.sin().powi(2);
        let nu = a_f0 / w.sqrt();
        let rho = a_f0 * (1.0 - e2) / w.powf(1.5);
        (nu, rho, nu / rho - 1.0)
    }

    /// Geodetic (radians) to easting/northing.
    fn project(self, lat: f64, lon: f64) -> (f64, f64) {
        let (nu, rho, eta2) = self.radii(lat);
        let (sin, cos, tan) = (lat.sin(), lat.cos(), lat.tan());
        let tan2 = tan * tan;
        let tan4 = tan2 * tan2;

        let i = self.meridional_arc(lat) + self.false_northing;
        let ii = nu / 2.0 * sin * cos;
        let iii = nu / 24.0 * sin * cos.powi(3) * (5.0 - tan2 + 9.0 * eta2);
        let iiia = nu / 720.0 * sin * cos.powi(5) * (61.0 - 58.0 * tan2 + tan4);
        let iv = nu * cos;
        let v = nu / 6.0 * cos.powi(3) * (nu / rho - tan2);
        let vi = nu / 120.0
            * cos.powi(5)
            * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

        let dl = lon - self.lon0;
        let northing = i + ii * dl.powi(2) + iii * dl.powi(4) + iiia * dl.powi(6);
        let easting = self.false_easting + iv * dl + v * dl.powi(3) + vi * dl.powi(5);
        (easting, northing)
    }

    /// Easting/northing to geodetic (radians).
    fn unproject(self, easting: f64, northing: f64) -> (f64, f64) {
        let a_f0 = self.ellipsoid.a * self.scale;
        let dn = northing - self.false_northing;

        let mut lat = dn / a_f0 + self.lat0;
        for _ in 0..MAX_ITERATIONS {
            let residual = dn - self.meridional_arc(lat);
            if residual.abs() < ARC_EPSILON_M {
                break;
            }
            lat += residual / a_f0;
        }

        let (nu, rho, eta2) = self.radii(lat);
        let tan = lat.tan();
        let (tan2, tan4, tan6) = (tan.powi(2), tan.powi(4), tan.powi(6));
        let sec = 1.0 / lat.cos();

        let vii = tan / (2.0 * rho * nu);
        let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
        let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
        let x = sec / nu;
        let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
        let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
        let xiia = sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

        let de = easting - self.false_easting;
        let lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
        let lon = self.lon0 + x * de - xi * de.powi(3) + xii * de.powi(5) - xiia * de.powi(7);
        (lat, lon)
    }
}

fn wgs84_to_national_grid(coord: Coord<f64>) -> Coord<f64> {
    let ecef = GRS80.to_cartesian(coord.y.to_radians(), coord.x.to_radians());
    let (lat, lon) = AIRY_1830.to_geodetic(WGS84_TO_OSGB36.apply(ecef));
    let (x, y) = NATIONAL_GRID.project(lat, lon);
    Coord { x, y }
}

fn national_grid_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let (lat, lon) = NATIONAL_GRID.unproject(coord.x, coord.y);
    let ecef = WGS84_TO_OSGB36.invert(AIRY_1830.to_cartesian(lat, lon));
    let (lat, lon) = GRS80.to_geodetic(ecef);
    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}
