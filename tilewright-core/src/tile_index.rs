//! The tile index: output objects bucketed by base-zoom tile cell, plus
//! the footprint computation that decides which cells a way touches.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use crate::coords::{lat2latp, latp2tiley, lon2tilex, pack_cell, LatpLon};
use crate::osm_store::{NodeId, NodeStore};
use crate::output::OutputObject;

/// Output objects grouped per tile cell at a fixed base zoom.
#[derive(Debug)]
pub struct TileIndex {
    base_zoom: u32,
    cells: BTreeMap<u32, Vec<OutputObject>>,
}

impl TileIndex {
    pub fn new(base_zoom: u32) -> Self {
        Self {
            base_zoom,
            cells: BTreeMap::new(),
        }
    }

    pub fn base_zoom(&self) -> u32 {
        self.base_zoom
    }

    /// Register one object under one cell.
    pub fn insert(&mut self, cell: u32, object: OutputObject) {
        self.cells.entry(cell).or_default().push(object);
    }

    /// Register every object under every cell.
    pub fn insert_all(&mut self, cells: &BTreeSet<u32>, objects: &[OutputObject]) {
        for &cell in cells {
            for object in objects {
                self.insert(cell, object.clone());
            }
        }
    }

    /// Sort each cell and drop equal neighbours, so no cell holds two
    /// equal objects.
    pub fn canonicalize(&mut self) {
        for objects in self.cells.values_mut() {
            objects.sort();
            objects.dedup();
        }
    }

    /// Build the index for a coarser zoom by integer-halving each cell
    /// coordinate. The result still needs [`canonicalize`](Self::canonicalize).
    pub fn coarsen(&self, zoom: u32) -> TileIndex {
        debug_assert!(zoom < self.base_zoom);
        let shift = self.base_zoom - zoom;
        let mut coarse = TileIndex::new(zoom);
        for (&cell, objects) in &self.cells {
            let new_cell = pack_cell((cell >> 16) >> shift, (cell & 0xFFFF) >> shift);
            coarse
                .cells
                .entry(new_cell)
                .or_default()
                .extend(objects.iter().cloned());
        }
        coarse
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, &[OutputObject])> {
        self.cells.iter().map(|(&cell, objects)| (cell, objects.as_slice()))
    }

    pub fn cell(&self, cell: u32) -> Option<&[OutputObject]> {
        self.cells.get(&cell).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// The set of base-zoom cells a way passes through.
///
/// Consecutive node pairs that skip a tile (Chebyshev distance two or
/// more, or a diagonal step) have the intermediate cells filled in by
/// sampling the segment at tile granularity. Nodes missing from the
/// store are skipped with a warning so a clipped extract cannot abort
/// the build.
pub fn way_footprint(nodes: &NodeStore, node_ids: &[NodeId], base_zoom: u32) -> BTreeSet<u32> {
    let mut cells = BTreeSet::new();
    let mut last: Option<(u32, u32, LatpLon)> = None;
    for &id in node_ids {
        let pos = match nodes.lookup(id) {
            Ok(pos) => pos,
            Err(_) => {
                warn!("way footprint: node {id} is unavailable, skipped");
                continue;
            }
        };
        let x = lon2tilex(pos.lon_degrees(), base_zoom);
        let y = latp2tiley(pos.latp_degrees(), base_zoom);
        if let Some((last_x, last_y, last_pos)) = last {
            let dx = x.abs_diff(last_x);
            let dy = y.abs_diff(last_y);
            if dx > 1 || dy > 1 || (dx == 1 && dy == 1) {
                fill_intermediate_cells(&mut cells, dx.max(dy), last_pos, pos, base_zoom);
            }
        }
        cells.insert(pack_cell(x, y));
        last = Some((x, y, pos));
    }
    cells
}

/// Sample a segment at three points per skipped tile and record every
/// visited cell.
fn fill_intermediate_cells(
    cells: &mut BTreeSet<u32>,
    skipped: u32,
    start: LatpLon,
    end: LatpLon,
    base_zoom: u32,
) {
    let steps = i64::from(skipped) * 3;
    let d_lon = i64::from(end.lon) - i64::from(start.lon);
    let d_latp = i64::from(end.latp) - i64::from(start.latp);
    for i in 1..steps {
        let sample = LatpLon {
            lon: (i64::from(start.lon) + d_lon * i / steps) as i32,
            latp: (i64::from(start.latp) + d_latp * i / steps) as i32,
        };
        cells.insert(pack_cell(
            lon2tilex(sample.lon_degrees(), base_zoom),
            latp2tiley(sample.latp_degrees(), base_zoom),
        ));
    }
}

/// Clip box in projected space from WGS84 corner latitudes.
pub fn clip_box(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> geo::Rect<f64> {
    geo::Rect::new(
        geo::Coord {
            x: min_lon,
            y: lat2latp(min_lat),
        },
        geo::Coord {
            x: max_lon,
            y: lat2latp(max_lat),
        },
    )
}
