//! Projected coordinates and tile arithmetic.
//!
//! Latitudes are stored Mercator-stretched ("latp") so that a degree of
//! latp equals a degree of longitude locally on the sphere. Both axes
//! are kept as fixed-point integers scaled by 10^7, which makes squared
//! Euclidean distance a cheap 64-bit computation.

/// Fixed-point scale applied to both coordinate axes.
pub const COORD_SCALE: f64 = 10_000_000.0;

/// Metres covered by one degree of longitude at the equator.
const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// A projected node position: Mercator-stretched latitude and plain
/// longitude, both in degrees scaled by 10^7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LatpLon {
    pub latp: i32,
    pub lon: i32,
}

impl LatpLon {
    /// Project a WGS84 position into fixed-point latp/lon.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            latp: (lat2latp(lat) * COORD_SCALE) as i32,
            lon: (lon * COORD_SCALE) as i32,
        }
    }

    pub fn lon_degrees(self) -> f64 {
        f64::from(self.lon) / COORD_SCALE
    }

    pub fn latp_degrees(self) -> f64 {
        f64::from(self.latp) / COORD_SCALE
    }

    /// Squared Euclidean distance in fixed-point space.
    pub fn sq_dist(self, other: Self) -> i64 {
        let dx = i64::from(self.lon) - i64::from(other.lon);
        let dy = i64::from(self.latp) - i64::from(other.latp);
        dx * dx + dy * dy
    }
}

/// Mercator-stretch a latitude, in degrees.
pub fn lat2latp(lat: f64) -> f64 {
    lat.to_radians().tan().asinh().to_degrees()
}

/// Invert [`lat2latp`].
pub fn latp2lat(latp: f64) -> f64 {
    latp.to_radians().sinh().atan().to_degrees()
}

/// Column of the tile containing `lon` at `zoom`.
pub fn lon2tilex(lon: f64, zoom: u32) -> u32 {
    ((lon + 180.0) / 360.0 * zoom_scale(zoom)) as u32
}

/// Row of the tile containing `latp` at `zoom`. Row 0 is the top of the
/// projection (latp = 180).
pub fn latp2tiley(latp: f64, zoom: u32) -> u32 {
    ((180.0 - latp) / 360.0 * zoom_scale(zoom)) as u32
}

/// Longitude of the western edge of tile column `x` at `zoom`.
pub fn tilex2lon(x: u32, zoom: u32) -> f64 {
    f64::from(x) / zoom_scale(zoom) * 360.0 - 180.0
}

/// Latp of the northern edge of tile row `y` at `zoom`.
pub fn tiley2latp(y: u32, zoom: u32) -> f64 {
    180.0 - f64::from(y) / zoom_scale(zoom) * 360.0
}

/// Convert a ground length in metres to degrees of projected space at
/// the given latp.
pub fn meter2degp(meters: f64, latp: f64) -> f64 {
    meters / (METERS_PER_DEGREE * latp2lat(latp).to_radians().cos())
}

fn zoom_scale(zoom: u32) -> f64 {
    f64::powi(2.0, zoom as i32)
}

/// Pack a tile column and row into one cell index (x in the high 16
/// bits, y in the low 16).
pub fn pack_cell(x: u32, y: u32) -> u32 {
    (x << 16) | (y & 0xFFFF)
}

/// Column half of a packed cell index.
pub fn cell_x(cell: u32) -> u32 {
    cell >> 16
}

/// Row half of a packed cell index.
pub fn cell_y(cell: u32) -> u32 {
    cell & 0xFFFF
}

/// Cell index of the tile containing a projected position.
pub fn latplon2cell(pos: LatpLon, zoom: u32) -> u32 {
    pack_cell(
        lon2tilex(pos.lon_degrees(), zoom),
        latp2tiley(pos.latp_degrees(), zoom),
    )
}

/// Geographic extent of one tile, in projected degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBbox {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_latp: f64,
    pub max_latp: f64,
}

impl TileBbox {
    pub fn new(cell: u32, zoom: u32) -> Self {
        let x = cell_x(cell);
        let y = cell_y(cell);
        Self {
            zoom,
            x,
            y,
            min_lon: tilex2lon(x, zoom),
            max_lon: tilex2lon(x + 1, zoom),
            min_latp: tiley2latp(y + 1, zoom),
            max_latp: tiley2latp(y, zoom),
        }
    }

    /// Latp of the tile centre, used to express metre tolerances in
    /// projected degrees.
    pub fn center_latp(&self) -> f64 {
        (self.min_latp + self.max_latp) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1.0e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn latp_projection_round_trips() {
        for lat in [-85.0, -45.5, 0.0, 23.4, 60.0, 85.0] {
            assert_close(latp2lat(lat2latp(lat)), lat);
        }
    }

    #[test]
    fn latp_is_identity_at_the_equator() {
        assert_close(lat2latp(0.0), 0.0);
        assert!(lat2latp(60.0) > 60.0);
    }

    #[test]
    fn tile_math_matches_the_slippy_scheme() {
        assert_eq!(lon2tilex(0.0, 1), 1);
        assert_eq!(lon2tilex(-180.0, 1), 0);
        assert_eq!(latp2tiley(0.0, 1), 1);
        assert_eq!(latp2tiley(179.9, 1), 0);
        assert_close(tilex2lon(1, 1), 0.0);
        assert_close(tiley2latp(1, 1), 0.0);
    }

    #[test]
    fn cell_packing_round_trips() {
        let cell = pack_cell(8_210, 5_462);
        assert_eq!(cell_x(cell), 8_210);
        assert_eq!(cell_y(cell), 5_462);
    }

    #[test]
    fn tile_bbox_covers_its_cell() {
        let cell = pack_cell(1, 0);
        let bbox = TileBbox::new(cell, 1);
        assert_close(bbox.min_lon, 0.0);
        assert_close(bbox.max_lon, 180.0);
        assert_close(bbox.min_latp, 0.0);
        assert_close(bbox.max_latp, 180.0);
        assert_close(bbox.center_latp(), 90.0);
    }

    #[test]
    fn meter_tolerances_grow_away_from_the_equator() {
        let at_equator = meter2degp(100.0, 0.0);
        let at_sixty = meter2degp(100.0, lat2latp(60.0));
        assert_close(at_equator, 100.0 / METERS_PER_DEGREE);
        assert!(at_sixty > at_equator * 1.9 && at_sixty < at_equator * 2.1);
    }

    #[test]
    fn sq_dist_is_symmetric_and_exact() {
        let a = LatpLon { latp: 30, lon: 40 };
        let b = LatpLon { latp: 0, lon: 0 };
        assert_eq!(a.sq_dist(b), 2_500);
        assert_eq!(b.sq_dist(a), 2_500);
        assert_eq!(a.sq_dist(a), 0);
    }
}
