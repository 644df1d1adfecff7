//! Streaming ingestion of OSM PBF extracts.
//!
//! Each input file is read in three passes without buffering the block
//! stream. Pass one stores every node, runs the tag processor over
//! significant nodes, and remembers the byte offset of the first block
//! carrying ways or relations. Pass two rewinds to that offset, loads
//! the ways any relation references, and processes multipolygon
//! relations, deferring their tile registration. Pass three rewinds
//! once more, processes every way, and registers way and relation
//! outputs under the tiles each way touches. The way store is cleared
//! between passes two and three so peak memory stays bounded.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use geo::{Coord, Rect};
use log::{debug, warn};
use osmpbf::{Blob, BlobDecode, BlobReader, ByteOffset, PrimitiveBlock, RelMemberType};
use thiserror::Error;

use tilewright_core::coords::latplon2cell;
use tilewright_core::osm_store::is_mark;
use tilewright_core::{
    way_footprint, ElementKind, GeometryCache, HookError, LatpLon, Layers, NodeId, OsmElement,
    OsmStore, OutputObject, RelationIdAllocator, StoreError, TagProcessor, TileIndex, WayId,
};

/// Errors raised while ingesting an extract. All are fatal; per-object
/// geometry problems are handled downstream instead.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The extract could not be opened.
    #[error("failed to open OSM extract {path}: {source}")]
    Open {
        /// Location of the extract.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: osmpbf::Error,
    },
    /// Reading or seeking the extract failed mid-stream.
    #[error("failed to read OSM extract {path}: {source}")]
    Read {
        /// Location of the extract.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: osmpbf::Error,
    },
    /// An element arrived out of the order the stores require.
    #[error("store rejected {entity} {id}: {source}")]
    Store {
        /// Entity type being inserted.
        entity: &'static str,
        /// Identifier of the rejected element.
        id: u64,
        /// Store-side failure.
        #[source]
        source: StoreError,
    },
    /// The tag processor reported a failure.
    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Element counts for one ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    /// Nodes stored in pass one.
    pub nodes: u64,
    /// Ways decoded in pass three.
    pub ways: u64,
    /// Relations seen in pass one.
    pub relations: u64,
    /// Ways whose node lists were kept for output or relations.
    pub stored_ways: u64,
    /// Multipolygon relations admitted into the relation store.
    pub multipolygons: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Scan,
    Relations,
    Ways,
}

/// The streaming ingester. One instance is shared across input files
/// so relation backlinks and deferred outputs accumulate globally.
pub struct Ingester<'a, P: TagProcessor> {
    store: &'a mut OsmStore,
    processor: &'a mut P,
    layers: &'a Layers,
    cache: &'a GeometryCache,
    tile_index: &'a mut TileIndex,
    node_keys: HashSet<String>,
    way_relations: HashMap<WayId, Vec<WayId>>,
    relation_outputs: HashMap<WayId, Vec<OutputObject>>,
    relation_ids: RelationIdAllocator,
}

impl<'a, P: TagProcessor> Ingester<'a, P> {
    pub fn new(
        store: &'a mut OsmStore,
        processor: &'a mut P,
        layers: &'a Layers,
        cache: &'a GeometryCache,
        tile_index: &'a mut TileIndex,
    ) -> Self {
        let node_keys = processor.node_keys();
        Self {
            store,
            processor,
            layers,
            cache,
            tile_index,
            node_keys,
            way_relations: HashMap::new(),
            relation_outputs: HashMap::new(),
            relation_ids: RelationIdAllocator::new(),
        }
    }

    /// Run the three passes over one extract.
    pub fn read_file(&mut self, path: &Path) -> Result<IngestSummary, IngestError> {
        let mut reader = BlobReader::seekable_from_path(path).map_err(|source| IngestError::Open {
            path: path.to_owned(),
            source,
        })?;
        let read_err = |source| IngestError::Read {
            path: path.to_owned(),
            source,
        };

        let mut summary = IngestSummary::default();
        let mut pass = Pass::Scan;
        let mut rewind: Option<ByteOffset> = None;
        let mut ways_needed: HashSet<WayId> = HashSet::new();

        loop {
            match reader.next() {
                Some(blob) => {
                    let blob: Blob = blob.map_err(read_err)?;
                    let offset = blob.offset();
                    if let BlobDecode::OsmData(block) = blob.decode().map_err(read_err)? {
                        self.read_block(
                            &block,
                            pass,
                            offset,
                            &mut rewind,
                            &mut ways_needed,
                            &mut summary,
                        )?;
                    }
                }
                None => match pass {
                    Pass::Scan => match rewind {
                        Some(offset) => {
                            debug!("pass one done, rewinding for relation ways");
                            pass = Pass::Relations;
                            reader.seek(offset).map_err(read_err)?;
                        }
                        None => break,
                    },
                    Pass::Relations => {
                        debug!(
                            "pass two done ({} relation ways kept), rewinding for ways",
                            self.store.ways.len()
                        );
                        self.store.ways.clear();
                        ways_needed.clear();
                        pass = Pass::Ways;
                        let offset = rewind.expect("relation pass only runs with an offset");
                        reader.seek(offset).map_err(read_err)?;
                    }
                    Pass::Ways => break,
                },
            }
        }
        Ok(summary)
    }

    fn read_block(
        &mut self,
        block: &PrimitiveBlock,
        pass: Pass,
        offset: Option<ByteOffset>,
        rewind: &mut Option<ByteOffset>,
        ways_needed: &mut HashSet<WayId>,
        summary: &mut IngestSummary,
    ) -> Result<(), IngestError> {
        for group in block.groups() {
            match pass {
                Pass::Scan => {
                    for node in group.nodes() {
                        let tags: Vec<_> = node.tags().collect();
                        self.scan_node(node.id(), node.lat(), node.lon(), tags, summary)?;
                    }
                    for node in group.dense_nodes() {
                        let tags: Vec<_> = node.tags().collect();
                        self.scan_node(node.id(), node.lat(), node.lon(), tags, summary)?;
                    }

                    let has_ways = group.ways().next().is_some();
                    let has_relations = group.relations().next().is_some();
                    if (has_ways || has_relations) && rewind.is_none() {
                        *rewind = offset;
                    }
                    // Ways are skipped in this pass; relations only
                    // contribute the set of ways they reference.
                    for relation in group.relations() {
                        summary.relations += 1;
                        for member in relation.members() {
                            if member.member_type != RelMemberType::Way {
                                continue;
                            }
                            if let Some(way_id) = checked_way_id(member.member_id) {
                                ways_needed.insert(way_id);
                            }
                        }
                    }
                }
                Pass::Relations => {
                    for way in group.ways() {
                        let Some(way_id) = checked_way_id(way.id()) else {
                            continue;
                        };
                        if !ways_needed.contains(&way_id) {
                            continue;
                        }
                        let refs = node_refs(way.refs());
                        self.store.ways.append(way_id, &refs).map_err(|source| {
                            IngestError::Store {
                                entity: "way",
                                id: u64::from(way_id),
                                source,
                            }
                        })?;
                    }
                    for relation in group.relations() {
                        self.scan_relation(&relation, summary)?;
                    }
                }
                Pass::Ways => {
                    for way in group.ways() {
                        self.scan_way(&way, summary)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_node(
        &mut self,
        raw_id: i64,
        lat: f64,
        lon: f64,
        tags: Vec<(&str, &str)>,
        summary: &mut IngestSummary,
    ) -> Result<(), IngestError> {
        let Ok(node_id) = NodeId::try_from(raw_id) else {
            warn!("node {raw_id} is outside the supported ID range, skipped");
            return Ok(());
        };
        let pos = LatpLon::from_degrees(lat, lon);
        self.store
            .nodes
            .append(node_id, pos)
            .map_err(|source| IngestError::Store {
                entity: "node",
                id: node_id.into(),
                source,
            })?;
        summary.nodes += 1;

        if !tags.iter().any(|(key, _)| self.node_keys.contains(*key)) {
            return Ok(());
        }
        let bbox = Rect::new(
            Coord {
                x: pos.lon_degrees(),
                y: pos.latp_degrees(),
            },
            Coord {
                x: pos.lon_degrees(),
                y: pos.latp_degrees(),
            },
        );
        let mut element = OsmElement::new(
            ElementKind::Node,
            node_id.into(),
            tags,
            true,
            Some(bbox),
            self.layers,
            self.cache,
        );
        self.processor.node(&mut element)?;
        if element.has_outputs() {
            let cell = latplon2cell(pos, self.tile_index.base_zoom());
            for output in element.take_outputs() {
                self.tile_index.insert(cell, output);
            }
        }
        Ok(())
    }

    fn scan_relation(
        &mut self,
        relation: &osmpbf::Relation<'_>,
        summary: &mut IngestSummary,
    ) -> Result<(), IngestError> {
        let tags: Vec<_> = relation.tags().collect();
        if !tags
            .iter()
            .any(|&(key, value)| key == "type" && value == "multipolygon")
        {
            return Ok(());
        }

        let mut outer_ways: Vec<WayId> = Vec::new();
        let mut inner_ways: Vec<WayId> = Vec::new();
        for member in relation.members() {
            if member.member_type != RelMemberType::Way {
                continue;
            }
            let Some(way_id) = checked_way_id(member.member_id) else {
                continue;
            };
            // An absent or unreadable role counts as outer so relations
            // without explicit outer members still assemble.
            let role = member.role().unwrap_or_else(|_| {
                warn!("relation {}: unreadable member role", relation.id());
                ""
            });
            if role == "inner" {
                inner_ways.push(way_id);
            } else {
                outer_ways.push(way_id);
            }
        }

        let rel_id = self.relation_ids.next_id();
        let mut element = OsmElement::new(
            ElementKind::Relation,
            u64::from(rel_id),
            tags,
            true,
            None,
            self.layers,
            self.cache,
        );
        self.processor.way(&mut element)?;
        if !element.has_outputs() {
            return Ok(());
        }

        let encoded = self.store.assemble_multipolygon(&outer_ways, &inner_ways);
        self.store
            .relations
            .prepend(rel_id, &encoded)
            .map_err(|source| IngestError::Store {
                entity: "relation",
                id: u64::from(rel_id),
                source,
            })?;
        for &way_id in outer_ways.iter().chain(inner_ways.iter()) {
            self.way_relations.entry(way_id).or_default().push(rel_id);
        }
        self.relation_outputs
            .insert(rel_id, element.take_outputs());
        summary.multipolygons += 1;
        Ok(())
    }

    fn scan_way(
        &mut self,
        way: &osmpbf::Way<'_>,
        summary: &mut IngestSummary,
    ) -> Result<(), IngestError> {
        summary.ways += 1;
        let Some(way_id) = checked_way_id(way.id()) else {
            return Ok(());
        };
        let refs = node_refs(way.refs());
        let tags: Vec<_> = way.tags().collect();
        let closed = refs.len() > 1 && refs.first() == refs.last();
        let bbox = if self.cache.has_indices() {
            self.way_bbox(&refs)
        } else {
            None
        };

        let mut element = OsmElement::new(
            ElementKind::Way,
            u64::from(way_id),
            tags,
            closed,
            bbox,
            self.layers,
            self.cache,
        );
        self.processor.way(&mut element)?;

        let in_relation = self.way_relations.contains_key(&way_id);
        if !element.has_outputs() && !in_relation {
            return Ok(());
        }

        self.store
            .ways
            .append(way_id, &refs)
            .map_err(|source| IngestError::Store {
                entity: "way",
                id: u64::from(way_id),
                source,
            })?;
        summary.stored_ways += 1;

        let cells = way_footprint(&self.store.nodes, &refs, self.tile_index.base_zoom());
        let outputs = element.take_outputs();
        self.tile_index.insert_all(&cells, &outputs);
        if in_relation {
            for rel_id in &self.way_relations[&way_id] {
                if let Some(outputs) = self.relation_outputs.get(rel_id) {
                    self.tile_index.insert_all(&cells, outputs);
                }
            }
        }
        Ok(())
    }

    fn way_bbox(&self, refs: &[NodeId]) -> Option<Rect<f64>> {
        let mut bounds: Option<Rect<f64>> = None;
        for &id in refs {
            let Ok(pos) = self.store.nodes.lookup(id) else {
                continue;
            };
            let point = Coord {
                x: pos.lon_degrees(),
                y: pos.latp_degrees(),
            };
            bounds = Some(match bounds {
                None => Rect::new(point, point),
                Some(rect) => Rect::new(
                    Coord {
                        x: rect.min().x.min(point.x),
                        y: rect.min().y.min(point.y),
                    },
                    Coord {
                        x: rect.max().x.max(point.x),
                        y: rect.max().y.max(point.y),
                    },
                ),
            });
        }
        bounds
    }
}

/// A way ID that fits the 32-bit domain without clashing with the
/// sentinel marks.
fn checked_way_id(raw_id: i64) -> Option<WayId> {
    match WayId::try_from(raw_id) {
        Ok(way_id) if !is_mark(way_id) => Some(way_id),
        _ => {
            warn!("way {raw_id} is outside the supported ID range, skipped");
            None
        }
    }
}

fn node_refs(refs: impl Iterator<Item = i64>) -> Vec<NodeId> {
    refs.filter_map(|raw| match NodeId::try_from(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("node reference {raw} is outside the supported ID range, skipped");
            None
        }
    })
    .collect()
}

/// Bounding box recorded in an extract's header, as WGS84 degrees with
/// `x = longitude` and `y = latitude`.
pub fn read_header_bbox(path: &Path) -> Result<Option<Rect<f64>>, IngestError> {
    let mut reader = BlobReader::from_path(path).map_err(|source| IngestError::Open {
        path: path.to_owned(),
        source,
    })?;
    let Some(blob) = reader.next() else {
        return Ok(None);
    };
    let blob = blob.map_err(|source| IngestError::Read {
        path: path.to_owned(),
        source,
    })?;
    match blob.decode().map_err(|source| IngestError::Read {
        path: path.to_owned(),
        source,
    })? {
        BlobDecode::OsmHeader(header) => Ok(header.bbox().map(|bbox| {
            Rect::new(
                Coord {
                    x: bbox.left,
                    y: bbox.bottom,
                },
                Coord {
                    x: bbox.right,
                    y: bbox.top,
                },
            )
        })),
        _ => Ok(None),
    }
}
