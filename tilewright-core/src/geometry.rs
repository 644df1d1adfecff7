//! Geometry realization: turn stored node and way lists into concrete
//! linestrings, polygons, and multipolygons.
//!
//! Realization streams node IDs through the node store, projects each
//! position to floating-point degrees, and drops consecutive duplicate
//! points. Encoded relation sequences are decoded by a small state
//! machine driven by the sentinel marks.

use geo::orient::{Direction, Orient};
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};

use crate::coords::COORD_SCALE;
use crate::osm_store::{NodeId, OsmStore, WayId, INNER_MARK, OUTER_MARK, REVERSE_MARK};
use crate::store::StoreError;

/// A realized output geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    MultiLinestring(MultiLineString<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl OsmStore {
    /// Realize a stored way as a linestring.
    pub fn way_linestring(&self, id: WayId) -> Result<LineString<f64>, StoreError> {
        let nodes = self.ways.lookup(id)?;
        self.node_list_linestring(nodes)
    }

    /// Realize a raw node list as a linestring.
    pub fn node_list_linestring(&self, nodes: &[NodeId]) -> Result<LineString<f64>, StoreError> {
        let mut points = Vec::with_capacity(nodes.len());
        self.fill_points(&mut points, nodes, false)?;
        Ok(LineString::new(points))
    }

    /// Realize a stored way as a polygon with corrected winding.
    pub fn way_polygon(&self, id: WayId) -> Result<Polygon<f64>, StoreError> {
        let nodes = self.ways.lookup(id)?;
        self.node_list_polygon(nodes)
    }

    /// Realize a raw node list as a polygon with corrected winding.
    pub fn node_list_polygon(&self, nodes: &[NodeId]) -> Result<Polygon<f64>, StoreError> {
        let exterior = self.node_list_linestring(nodes)?;
        Ok(correct_polygon(Polygon::new(exterior, Vec::new())))
    }

    /// Realize a stored relation as a multipolygon.
    pub fn relation_multipolygon(&self, id: WayId) -> Result<MultiPolygon<f64>, StoreError> {
        let way_list = self.relations.lookup(id)?;
        self.way_list_multipolygon(way_list)
    }

    /// Realize an encoded way sequence as a multipolygon.
    ///
    /// The sequence starts in outer mode. [`OUTER_MARK`] closes the
    /// current polygon and starts the next, [`INNER_MARK`] closes the
    /// current ring as a hole of the current polygon, and
    /// [`REVERSE_MARK`] flips the traversal of the single way that
    /// follows it.
    pub fn way_list_multipolygon(&self, way_list: &[WayId]) -> Result<MultiPolygon<f64>, StoreError> {
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        if way_list.is_empty() {
            return Ok(MultiPolygon(polygons));
        }

        let mut i = 0;
        let mut is_outer = true;
        loop {
            let mut ring: Vec<Coord<f64>> = Vec::new();
            let mut reverse = false;
            while i < way_list.len() {
                let token = way_list[i];
                if token == OUTER_MARK || token == INNER_MARK {
                    break;
                }
                i += 1;
                if token == REVERSE_MARK {
                    reverse = true;
                    continue;
                }
                let nodes = self.ways.lookup(token)?;
                self.fill_points(&mut ring, nodes, reverse)?;
                reverse = false;
            }

            let ring = LineString::new(ring);
            if is_outer {
                polygons.push(Polygon::new(ring, Vec::new()));
            } else if let Some(current) = polygons.last_mut() {
                current.interiors_push(ring);
            }

            if i >= way_list.len() {
                break;
            }
            is_outer = way_list[i] == OUTER_MARK;
            i += 1;
        }

        Ok(correct_multipolygon(MultiPolygon(polygons)))
    }

    /// Append the projected positions of `nodes` to `points`, skipping
    /// points equal to the previous one. When `reverse` is set the
    /// node list is traversed backwards, so deduplication also catches
    /// a junction vertex shared with the already-filled run.
    pub(crate) fn fill_points(
        &self,
        points: &mut Vec<Coord<f64>>,
        nodes: &[NodeId],
        reverse: bool,
    ) -> Result<(), StoreError> {
        let mut last = points.last().copied();
        let mut push = |points: &mut Vec<Coord<f64>>, id: NodeId| -> Result<(), StoreError> {
            let pos = self.nodes.lookup(id)?;
            let point = Coord {
                x: f64::from(pos.lon) / COORD_SCALE,
                y: f64::from(pos.latp) / COORD_SCALE,
            };
            if last != Some(point) {
                points.push(point);
            }
            last = Some(point);
            Ok(())
        };
        if reverse {
            for &id in nodes.iter().rev() {
                push(points, id)?;
            }
        } else {
            for &id in nodes {
                push(points, id)?;
            }
        }
        Ok(())
    }
}

/// Close every ring and orient exteriors counter-clockwise, holes
/// clockwise.
pub fn correct_polygon(polygon: Polygon<f64>) -> Polygon<f64> {
    let (mut exterior, mut interiors) = polygon.into_inner();
    exterior.close();
    for interior in &mut interiors {
        interior.close();
    }
    Polygon::new(exterior, interiors).orient(Direction::Default)
}

/// [`correct_polygon`] over every member polygon.
pub fn correct_multipolygon(multipolygon: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(multipolygon.0.into_iter().map(correct_polygon).collect())
}
