//! Feature geometry encoding into tile-local vector-tile space.

use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point};
use mvt::{Feature, GeomData, GeomEncoder, GeomType};
use tilewright_core::{AttrValue, Attributes, TileBbox};

/// Maps projected degrees into tile-local pixels with the y axis
/// growing southwards.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileTransform {
    min_lon: f64,
    min_latp: f64,
    lon_span: f64,
    latp_span: f64,
    extent: f64,
}

impl TileTransform {
    pub(crate) fn new(bbox: &TileBbox, extent: u32) -> Self {
        Self {
            min_lon: bbox.min_lon,
            min_latp: bbox.min_latp,
            lon_span: bbox.max_lon - bbox.min_lon,
            latp_span: bbox.max_latp - bbox.min_latp,
            extent: f64::from(extent),
        }
    }

    fn apply(&self, point: Coord<f64>) -> (f64, f64) {
        let x = (point.x - self.min_lon) / self.lon_span * self.extent;
        let y = (1.0 - (point.y - self.min_latp) / self.latp_span) * self.extent;
        (x, y)
    }

    /// Transformed points with consecutive same-pixel points collapsed.
    fn pixel_path(&self, line: &LineString<f64>) -> Vec<(f64, f64)> {
        let mut path: Vec<(f64, f64)> = Vec::with_capacity(line.0.len());
        for &point in &line.0 {
            let (x, y) = self.apply(point);
            let pixel = (x.round(), y.round());
            if path.last().map(|&(px, py)| (px.round(), py.round())) != Some(pixel) {
                path.push((x, y));
            }
        }
        path
    }
}

pub(crate) fn encode_point(
    transform: &TileTransform,
    point: Point<f64>,
) -> Result<GeomData, mvt::Error> {
    let (x, y) = transform.apply(point.0);
    GeomEncoder::new(GeomType::Point).point(x, y)?.encode()
}

/// Encode a multilinestring, or `None` when every part degenerates to
/// fewer than two pixels.
pub(crate) fn encode_multilinestring(
    transform: &TileTransform,
    lines: &MultiLineString<f64>,
) -> Result<Option<GeomData>, mvt::Error> {
    let mut encoder = GeomEncoder::new(GeomType::Linestring);
    let mut parts = 0;
    for line in &lines.0 {
        let path = transform.pixel_path(line);
        if path.len() < 2 {
            continue;
        }
        for (x, y) in path {
            encoder = encoder.point(x, y)?;
        }
        encoder = encoder.complete()?;
        parts += 1;
    }
    if parts == 0 {
        return Ok(None);
    }
    encoder.encode().map(Some)
}

/// Encode a multipolygon, or `None` when every ring degenerates.
///
/// Ring winding is normalized in pixel space: exteriors positive area,
/// holes negative, as the tile format requires.
pub(crate) fn encode_multipolygon(
    transform: &TileTransform,
    polygons: &MultiPolygon<f64>,
) -> Result<Option<GeomData>, mvt::Error> {
    let mut encoder = GeomEncoder::new(GeomType::Polygon);
    let mut rings = 0;
    for polygon in &polygons.0 {
        let exterior = ring_path(transform, polygon.exterior(), true);
        let Some(exterior) = exterior else {
            continue;
        };
        encoder = encode_ring(encoder, exterior)?;
        rings += 1;
        for interior in polygon.interiors() {
            if let Some(path) = ring_path(transform, interior, false) {
                encoder = encode_ring(encoder, path)?;
                rings += 1;
            }
        }
    }
    if rings == 0 {
        return Ok(None);
    }
    encoder.encode().map(Some)
}

fn encode_ring(
    mut encoder: GeomEncoder<f64>,
    path: Vec<(f64, f64)>,
) -> Result<GeomEncoder<f64>, mvt::Error> {
    for (x, y) in path {
        encoder = encoder.point(x, y)?;
    }
    encoder.complete()
}

/// A ring as pixel points without the closing duplicate, oriented for
/// its role, or `None` when it collapses below three points.
fn ring_path(
    transform: &TileTransform,
    ring: &LineString<f64>,
    exterior: bool,
) -> Option<Vec<(f64, f64)>> {
    let mut path = transform.pixel_path(ring);
    if path.len() > 1 && path.first() == path.last() {
        path.pop();
    }
    if path.len() < 3 {
        return None;
    }
    let positive = signed_area(&path) > 0.0;
    if positive != exterior {
        path.reverse();
    }
    Some(path)
}

/// Surveyor's formula over pixel coordinates (y grows downwards).
fn signed_area(path: &[(f64, f64)]) -> f64 {
    let mut doubled = 0.0;
    for (i, &(x1, y1)) in path.iter().enumerate() {
        let (x2, y2) = path[(i + 1) % path.len()];
        doubled += x1 * y2 - x2 * y1;
    }
    doubled / 2.0
}

/// Copy an attribute bag onto an encoded feature.
pub(crate) fn write_attributes(feature: &mut Feature, attributes: &Attributes) {
    for (key, value) in attributes {
        match value {
            AttrValue::String(value) => feature.add_tag_string(key, value),
            AttrValue::Number(value) => feature.add_tag_double(key, *value),
            AttrValue::Bool(value) => feature.add_tag_bool(key, *value),
        }
    }
}
