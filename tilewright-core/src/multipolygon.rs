//! Multipolygon assembly: stitch the outer and inner member ways of a
//! relation into closed rings and encode the result as a flat way
//! sequence using the sentinel marks.
//!
//! The stitcher is tolerant by design. Missing ways, unmatched
//! endpoints, invalid rings, and orphaned holes are logged and worked
//! around; whatever rings can be built are kept.

use geo::{Contains, Polygon, Validation};
use log::warn;

use crate::coords::LatpLon;
use crate::geometry::correct_polygon;
use crate::osm_store::{OsmStore, WayId, INNER_MARK, OUTER_MARK, REVERSE_MARK};

/// One stitched ring: the way sequence that traces it (with reverse
/// marks) and its realized geometry for the containment tests.
struct StitchedRing {
    way_list: Vec<WayId>,
    polygon: Polygon<f64>,
}

impl OsmStore {
    /// Assemble the outer and inner member ways of a multipolygon
    /// relation into one encoded way sequence.
    ///
    /// The output interleaves way IDs with [`OUTER_MARK`],
    /// [`INNER_MARK`], and [`REVERSE_MARK`] as described in
    /// [`way_list_multipolygon`](OsmStore::way_list_multipolygon).
    /// Anomalies never fail the call; they are logged and the affected
    /// ring is dropped.
    pub fn assemble_multipolygon(&self, outer_ways: &[WayId], inner_ways: &[WayId]) -> Vec<WayId> {
        let outers = self.stitch_rings(outer_ways, "outer");
        let inners = self.stitch_rings(inner_ways, "inner");

        // Home every inner ring inside its smallest containing outer.
        let mut inner_lists: Vec<Vec<WayId>> = vec![Vec::new(); outers.len()];
        for inner in &inners {
            let mut parent: Option<usize> = None;
            for (j, outer) in outers.iter().enumerate() {
                if !outer.polygon.contains(&inner.polygon) {
                    continue;
                }
                parent = match parent {
                    Some(p) if !outers[p].polygon.contains(&outer.polygon) => Some(p),
                    _ => Some(j),
                };
            }
            match parent {
                Some(p) => {
                    inner_lists[p].push(INNER_MARK);
                    inner_lists[p].extend_from_slice(&inner.way_list);
                }
                None => {
                    warn!(
                        "multipolygon: inner ring {:?} is not contained in any outer ring, dropped",
                        inner.way_list
                    );
                }
            }
        }

        let mut result = Vec::new();
        for (j, outer) in outers.iter().enumerate() {
            if j > 0 {
                result.push(OUTER_MARK);
            }
            result.extend_from_slice(&outer.way_list);
            result.extend_from_slice(&inner_lists[j]);
        }

        match self.way_list_multipolygon(&result) {
            Ok(multipolygon) if multipolygon.is_valid() => {}
            _ => {
                warn!(
                    "multipolygon: assembled geometry is invalid (first outer way {:?})",
                    outer_ways.first()
                );
            }
        }

        result
    }

    /// Group one bag of ways into closed rings with the
    /// nearest-endpoint heuristic.
    fn stitch_rings(&self, way_vec: &[WayId], role: &str) -> Vec<StitchedRing> {
        let mut consumed = vec![false; way_vec.len()];
        let mut endpoints: Vec<(LatpLon, LatpLon)> = vec![Default::default(); way_vec.len()];

        for (i, &way) in way_vec.iter().enumerate() {
            match self.way_endpoints(way) {
                Some(pair) => endpoints[i] = pair,
                None => consumed[i] = true,
            }
        }

        let mut rings = Vec::new();
        for start_idx in 0..way_vec.len() {
            if consumed[start_idx] {
                continue;
            }

            // Grow a ring from this seed until the nearest endpoint is
            // the seed's own start again.
            let mut way_list: Vec<WayId> = Vec::new();
            let start_coord = endpoints[start_idx].0;
            let mut next_idx = start_idx;
            let mut reverse = false;
            loop {
                consumed[next_idx] = true;
                if reverse {
                    way_list.push(REVERSE_MARK);
                }
                way_list.push(way_vec[next_idx]);
                let current_coord = if reverse {
                    endpoints[next_idx].0
                } else {
                    endpoints[next_idx].1
                };

                // Closing the loop is the benchmark; only a strictly
                // nearer endpoint beats it. Earlier candidates win ties.
                let mut min_sqd = current_coord.sq_dist(start_coord);
                next_idx = start_idx;
                for (i, &candidate) in way_vec.iter().enumerate() {
                    if consumed[i] {
                        continue;
                    }
                    for (is_first, target) in [(true, endpoints[i].0), (false, endpoints[i].1)] {
                        let sqd = current_coord.sq_dist(target);
                        if sqd < min_sqd {
                            min_sqd = sqd;
                            next_idx = i;
                            reverse = !is_first;
                        } else if sqd == 0 {
                            warn!(
                                "multipolygon: more than two ways share an endpoint at \
                                 latp={} lon={} (way {}, {} endpoint)",
                                current_coord.latp,
                                current_coord.lon,
                                candidate,
                                if is_first { "first" } else { "second" }
                            );
                        }
                    }
                }

                if min_sqd > 0 {
                    warn!(
                        "multipolygon: no connected way at latp={} lon={}, \
                         nearest way {} used (squared distance {})",
                        current_coord.latp, current_coord.lon, way_vec[next_idx], min_sqd
                    );
                }
                if next_idx == start_idx {
                    break;
                }
            }

            match self.ring_polygon(&way_list) {
                Some(polygon) if polygon.is_valid() => {
                    rings.push(StitchedRing { way_list, polygon });
                }
                _ => {
                    warn!(
                        "multipolygon: invalid {role} ring, ways {:?} dropped",
                        way_list
                    );
                }
            }
        }
        rings
    }

    /// First and last node positions of a way, or `None` (with a
    /// warning) when the way or its endpoint nodes are unavailable.
    fn way_endpoints(&self, way: WayId) -> Option<(LatpLon, LatpLon)> {
        let nodes = match self.ways.lookup(way) {
            Ok(nodes) => nodes,
            Err(_) => {
                warn!("multipolygon: node list for way {way} is unavailable");
                return None;
            }
        };
        let (&first, &last) = match (nodes.first(), nodes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return None,
        };
        match (self.nodes.lookup(first), self.nodes.lookup(last)) {
            (Ok(first), Ok(last)) => Some((first, last)),
            _ => {
                warn!("multipolygon: endpoint node of way {way} is unavailable");
                None
            }
        }
    }

    /// Realize one stitched way sequence as a closed, oriented ring.
    fn ring_polygon(&self, way_list: &[WayId]) -> Option<Polygon<f64>> {
        let mut points = Vec::new();
        let mut reverse = false;
        for &token in way_list {
            if token == REVERSE_MARK {
                reverse = true;
                continue;
            }
            let nodes = self.ways.lookup(token).ok()?;
            self.fill_points(&mut points, nodes, reverse).ok()?;
            reverse = false;
        }
        Some(correct_polygon(Polygon::new(
            geo::LineString::new(points),
            Vec::new(),
        )))
    }
}
