//! Per-zoom tile emission.
//!
//! For every output zoom the tile index is re-binned (coarser zooms)
//! and canonicalized, then each cell becomes one tile: layer groups in
//! declaration order, objects realized from the stores, neighbouring
//! objects with identical kind and attributes merged geometrically,
//! simplified, and serialized.

use geo::{BooleanOps, MultiLineString, MultiPolygon, Rect, Simplify};
use log::{debug, info, warn};
use mvt::{Layer, Tile};
use thiserror::Error;

use tilewright_core::osm_store::is_mark;
use tilewright_core::{
    GeomKind, Geometry, GeometryCache, LayerDef, Layers, NodeId, OsmStore, OutputObject,
    StoreError, TileBbox, TileIndex, WayId,
};

use crate::compress::{compress_tile, Compression};
use crate::sink::{SinkError, TileSink};
use crate::writer::{
    encode_multilinestring, encode_multipolygon, encode_point, write_attributes, TileTransform,
};

/// Pixel extent of every emitted tile.
const TILE_EXTENT: u32 = 4096;

/// Fatal emission failures. Per-object geometry problems are logged
/// and dropped instead.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Tile serialization failed.
    #[error("failed to encode tile {zoom}/{x}/{y}: {source}")]
    Encode {
        zoom: u32,
        x: u32,
        y: u32,
        #[source]
        source: mvt::Error,
    },
    /// Compressing a tile blob failed.
    #[error("failed to compress tile {zoom}/{x}/{y}: {source}")]
    Compress {
        zoom: u32,
        x: u32,
        y: u32,
        #[source]
        source: std::io::Error,
    },
    /// The sink rejected a tile.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Emission settings derived from the configuration.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub min_zoom: u32,
    pub max_zoom: u32,
    /// Emit the object identifier as the feature identifier.
    pub include_ids: bool,
    pub compression: Compression,
    /// Clip box in projected space; tiles fully outside are skipped.
    /// Only honoured when the box came from the configuration.
    pub clip: Option<Rect<f64>>,
    pub clip_from_config: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 14,
            include_ids: false,
            compression: Compression::Gzip,
            clip: None,
            clip_from_config: false,
        }
    }
}

/// Writes every output zoom of a populated tile index.
pub struct Emitter<'a> {
    store: &'a OsmStore,
    cache: &'a GeometryCache,
    layers: &'a Layers,
    options: EmitOptions,
}

impl<'a> Emitter<'a> {
    pub fn new(
        store: &'a OsmStore,
        cache: &'a GeometryCache,
        layers: &'a Layers,
        options: EmitOptions,
    ) -> Self {
        Self {
            store,
            cache,
            layers,
            options,
        }
    }

    /// Emit all configured zoom levels into the sink.
    pub fn emit(
        &self,
        tile_index: &mut TileIndex,
        sink: &mut dyn TileSink,
    ) -> Result<(), EmitError> {
        for zoom in self.options.min_zoom..=self.options.max_zoom {
            if zoom == tile_index.base_zoom() {
                tile_index.canonicalize();
                self.emit_zoom(tile_index, sink)?;
            } else {
                let mut coarse = tile_index.coarsen(zoom);
                coarse.canonicalize();
                self.emit_zoom(&coarse, sink)?;
            }
        }
        Ok(())
    }

    fn emit_zoom(&self, index: &TileIndex, sink: &mut dyn TileSink) -> Result<(), EmitError> {
        let zoom = index.base_zoom();
        info!("zoom {zoom}: writing {} tiles", index.len());
        for (cell, objects) in index.cells() {
            let bbox = TileBbox::new(cell, zoom);
            if self.outside_clip(&bbox) {
                continue;
            }
            self.emit_tile(&bbox, objects, sink)?;
        }
        Ok(())
    }

    fn outside_clip(&self, bbox: &TileBbox) -> bool {
        if !self.options.clip_from_config {
            return false;
        }
        let Some(clip) = self.options.clip else {
            return false;
        };
        clip.max().x <= bbox.min_lon
            || clip.min().x >= bbox.max_lon
            || clip.max().y <= bbox.min_latp
            || clip.min().y >= bbox.max_latp
    }

    fn emit_tile(
        &self,
        bbox: &TileBbox,
        objects: &[OutputObject],
        sink: &mut dyn TileSink,
    ) -> Result<(), EmitError> {
        let encode_err = |source| EmitError::Encode {
            zoom: bbox.zoom,
            x: bbox.x,
            y: bbox.y,
            source,
        };
        let transform = TileTransform::new(bbox, TILE_EXTENT);
        let mut tile = Tile::new(TILE_EXTENT);
        let mut any_features = false;

        for group in self.layers.groups() {
            let name = &self.layers.get(group[0]).name;
            let mut layer = tile.create_layer(name);

            for &layer_index in group {
                let def = self.layers.get(layer_index);
                if bbox.zoom < def.min_zoom || bbox.zoom > def.max_zoom {
                    continue;
                }
                let tolerance = def.simplify_tolerance(bbox);

                // The cell is sorted with `layer` most significant, so
                // this layer's objects form one contiguous run.
                let start = objects.partition_point(|o| o.layer < layer_index);
                let end = objects.partition_point(|o| o.layer <= layer_index);
                let run = &objects[start..end];

                let mut i = 0;
                while i < run.len() {
                    layer = self
                        .emit_object(run, &mut i, &transform, tolerance, layer, def, bbox)
                        .map_err(encode_err)?;
                }
            }

            if layer.num_features() > 0 {
                any_features = true;
                tile.add_layer(layer).map_err(encode_err)?;
            }
        }

        if !any_features {
            return Ok(());
        }
        let data = tile.to_bytes().map_err(encode_err)?;
        let data =
            compress_tile(&data, self.options.compression).map_err(|source| EmitError::Compress {
                zoom: bbox.zoom,
                x: bbox.x,
                y: bbox.y,
                source,
            })?;
        sink.write_tile(bbox.zoom, bbox.x, bbox.y, &data)?;
        Ok(())
    }

    /// Build one feature starting at `run[*i]`, merging the contiguous
    /// same-kind same-attribute objects that follow it. Advances `i`
    /// past everything consumed. Realization failures drop the object
    /// with a warning; only serialization failures propagate.
    fn emit_object(
        &self,
        run: &[OutputObject],
        i: &mut usize,
        transform: &TileTransform,
        tolerance: f64,
        layer: Layer,
        def: &LayerDef,
        bbox: &TileBbox,
    ) -> Result<Layer, mvt::Error> {
        let object = &run[*i];
        let drop_object = |id: u64, source: &StoreError| {
            warn!(
                "tile {}/{}/{}: dropping object {id} ({source})",
                bbox.zoom, bbox.x, bbox.y
            );
        };

        if object.kind == GeomKind::Point {
            *i += 1;
            let pos = match self.store.nodes.lookup(object.id as NodeId) {
                Ok(pos) => pos,
                Err(source) => {
                    drop_object(object.id, &source);
                    return Ok(layer);
                }
            };
            let point = geo::Point::new(pos.lon_degrees(), pos.latp_degrees());
            let geom = encode_point(transform, point)?;
            let mut feature = layer.into_feature(geom);
            if self.options.include_ids {
                feature.set_id(object.id);
            }
            write_attributes(&mut feature, &object.attributes);
            return Ok(feature.into_layer());
        }

        let mut geometry = match self.object_geometry(object) {
            Ok(geometry) => geometry,
            Err(source) => {
                drop_object(object.id, &source);
                self.log_missing_members(object);
                *i += 1;
                return Ok(layer);
            }
        };
        *i += 1;
        while *i < run.len()
            && run[*i].kind == object.kind
            && run[*i].attributes == object.attributes
        {
            let next = match self.object_geometry(&run[*i]) {
                Ok(next) => next,
                Err(source) => {
                    // The accumulated merge is abandoned along with the
                    // failing object.
                    drop_object(run[*i].id, &source);
                    self.log_missing_members(&run[*i]);
                    *i += 1;
                    return Ok(layer);
                }
            };
            debug!("merging object {} into {}", run[*i].id, object.id);
            *i += 1;
            geometry = merge_geometries(geometry, next);
        }

        if tolerance > 0.0 {
            geometry = simplify_geometry(geometry, tolerance);
        }

        let encoded = match &geometry {
            Geometry::Point(point) => Some(encode_point(transform, *point)?),
            Geometry::MultiLinestring(lines) => encode_multilinestring(transform, lines)?,
            Geometry::MultiPolygon(polygons) => encode_multipolygon(transform, polygons)?,
        };
        let Some(geom) = encoded else {
            debug!(
                "layer {}: object {} vanished at this simplification",
                def.name, object.id
            );
            return Ok(layer);
        };
        let mut feature = layer.into_feature(geom);
        if self.options.include_ids {
            feature.set_id(object.id);
        }
        write_attributes(&mut feature, &object.attributes);
        Ok(feature.into_layer())
    }

    /// Realize an object's geometry from the stores or the cache.
    fn object_geometry(&self, object: &OutputObject) -> Result<Geometry, StoreError> {
        match object.kind {
            GeomKind::Point => unreachable!("points are emitted directly"),
            GeomKind::Linestring => {
                let way_id = object.id as WayId;
                Ok(Geometry::MultiLinestring(MultiLineString::new(vec![
                    self.store.way_linestring(way_id)?,
                ])))
            }
            GeomKind::Polygon => {
                let way_id = object.id as WayId;
                if self.store.relations.contains(way_id) == 1 {
                    Ok(Geometry::MultiPolygon(
                        self.store.relation_multipolygon(way_id)?,
                    ))
                } else {
                    Ok(Geometry::MultiPolygon(MultiPolygon(vec![
                        self.store.way_polygon(way_id)?,
                    ])))
                }
            }
            GeomKind::CachedLinestring | GeomKind::CachedPolygon => self
                .cache
                .get(object.id)
                .map(|cached| cached.geometry.clone())
                .ok_or(StoreError::NotFound { key: object.id }),
        }
    }

    /// When a relation object failed to realize, name the constituent
    /// ways missing from the way store.
    fn log_missing_members(&self, object: &OutputObject) {
        let way_id = object.id as WayId;
        if object.kind != GeomKind::Polygon || self.store.relations.contains(way_id) == 0 {
            return;
        }
        if let Ok(way_list) = self.store.relations.lookup(way_id) {
            for &member in way_list {
                if !is_mark(member) && self.store.ways.contains(member) == 0 {
                    debug!(
                        "relation {}: constituent way {member} is missing",
                        object.id
                    );
                }
            }
        }
    }
}

/// Union neighbouring geometries of the same kind. Polygons take the
/// geometric union; linestrings concatenate their parts.
fn merge_geometries(current: Geometry, next: Geometry) -> Geometry {
    match (current, next) {
        (Geometry::MultiPolygon(current), Geometry::MultiPolygon(next)) => {
            Geometry::MultiPolygon(current.union(&next))
        }
        (Geometry::MultiLinestring(mut current), Geometry::MultiLinestring(next)) => {
            current.0.extend(next.0);
            Geometry::MultiLinestring(current)
        }
        (current, _) => current,
    }
}

/// Douglas-Peucker simplification, dropping parts that degenerate.
fn simplify_geometry(geometry: Geometry, tolerance: f64) -> Geometry {
    match geometry {
        Geometry::Point(point) => Geometry::Point(point),
        Geometry::MultiLinestring(lines) => {
            let mut simplified = lines.simplify(&tolerance);
            simplified.0.retain(|line| line.0.len() >= 2);
            Geometry::MultiLinestring(simplified)
        }
        Geometry::MultiPolygon(polygons) => {
            let mut simplified = polygons.simplify(&tolerance);
            simplified
                .0
                .retain(|polygon| polygon.exterior().0.len() >= 4);
            Geometry::MultiPolygon(simplified)
        }
    }
}
