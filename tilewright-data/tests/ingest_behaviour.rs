//! Behavioural tests for the three-pass ingester, driven over
//! synthetic extracts built by the support encoder.

mod support;

use std::collections::HashSet;

use support::PbfBuilder;
use tempfile::NamedTempFile;
use tilewright_core::{
    GeomKind, GeometryCache, HookError, LayerDef, Layers, OsmElement, OsmStore, TagProcessor,
    TileIndex, INNER_MARK, REVERSE_MARK,
};
use tilewright_data::{read_header_bbox, Ingester, RuleSet};

const BASE_ZOOM: u32 = 14;

fn layers() -> Layers {
    let mut layers = Layers::new();
    for name in ["poi", "roads", "buildings", "landcover"] {
        layers.add(LayerDef::new(name, 0, BASE_ZOOM), None);
    }
    layers
}

fn rules() -> RuleSet {
    serde_json::from_str(
        r#"{
            "rules": [
                {"on": "node", "key": "amenity", "layer": "poi", "attributes": ["name"]},
                {"on": "way", "key": "highway", "layer": "roads", "attributes": ["highway"]},
                {"on": "way", "key": "building", "layer": "buildings", "area": true},
                {"on": "relation", "key": "landuse", "value": "forest", "layer": "landcover"}
            ]
        }"#,
    )
    .unwrap()
}

/// A square (nodes 1..4, reused by ways 10 and 20), a smaller square
/// inside it (nodes 5..8, way 21), a tagged cafe node, a diagonal road,
/// and a forest multipolygon with one hole.
fn fixture() -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    PbfBuilder::new()
        .bbox([0.0, 0.0, 0.01, 0.01])
        .node(1, 0.001, 0.001, &[])
        .node(2, 0.001, 0.009, &[])
        .node(3, 0.009, 0.009, &[])
        .node(4, 0.009, 0.001, &[])
        .node(5, 0.003, 0.003, &[])
        .node(6, 0.003, 0.007, &[])
        .node(7, 0.007, 0.007, &[])
        .node(8, 0.007, 0.003, &[])
        .node(42, 0.005, 0.005, &[("amenity", "cafe"), ("name", "Corner")])
        .way(10, &[1, 2, 3, 4, 1], &[("building", "yes")])
        .way(20, &[1, 2, 3, 4, 1], &[])
        .way(21, &[5, 6, 7, 8, 5], &[])
        .way(30, &[1, 3], &[("highway", "primary")])
        .relation(
            100,
            &[(20, "outer"), (21, "inner")],
            &[("type", "multipolygon"), ("landuse", "forest")],
        )
        .write_to(file.path());
    file
}

#[test]
fn three_pass_ingest_populates_stores_and_tile_index() {
    let file = fixture();
    let layers = layers();
    let cache = GeometryCache::new();
    let mut store = OsmStore::new();
    let mut tile_index = TileIndex::new(BASE_ZOOM);
    let mut processor = rules();

    let summary = {
        let mut ingester =
            Ingester::new(&mut store, &mut processor, &layers, &cache, &mut tile_index);
        ingester.read_file(file.path()).unwrap()
    };

    assert_eq!(summary.nodes, 9);
    assert_eq!(summary.ways, 4);
    assert_eq!(summary.relations, 1);
    assert_eq!(summary.stored_ways, 4);
    assert_eq!(summary.multipolygons, 1);

    // Every node survives pass one.
    assert_eq!(store.nodes.len(), 9);
    let cafe = store.nodes.lookup(42).unwrap();
    assert!((cafe.lon_degrees() - 0.005).abs() < 1e-6);

    // The relation landed under a pseudo ID with the hole encoded.
    let rel_id = REVERSE_MARK - 1;
    assert_eq!(store.relations.lookup(rel_id).unwrap(), &[20, INNER_MARK, 21]);

    // Untagged member ways were kept for realization, the road and the
    // building in their own right.
    for way in [10, 20, 21, 30] {
        assert_eq!(store.ways.contains(way), 1, "way {way} missing");
    }

    // Everything sits in one base-zoom cell.
    let mut cells: Vec<u32> = tile_index.cells().map(|(cell, _)| cell).collect();
    cells.dedup();
    assert_eq!(cells.len(), 1);

    tile_index.canonicalize();
    let objects = tile_index.cell(cells[0]).unwrap();
    let kinds: Vec<(GeomKind, u64)> = objects.iter().map(|o| (o.kind, o.id)).collect();
    assert!(kinds.contains(&(GeomKind::Point, 42)));
    assert!(kinds.contains(&(GeomKind::Polygon, 10)));
    assert!(kinds.contains(&(GeomKind::Linestring, 30)));
    assert!(kinds.contains(&(GeomKind::Polygon, u64::from(rel_id))));
    assert_eq!(objects.len(), 4, "duplicates were removed: {kinds:?}");

    // The stored relation realizes into the expected shape.
    let forest = store.relation_multipolygon(rel_id).unwrap();
    assert_eq!(forest.0.len(), 1);
    assert_eq!(forest.0[0].interiors().len(), 1);
}

#[test]
fn nodes_only_extracts_skip_the_rewind_passes() {
    let file = NamedTempFile::new().unwrap();
    PbfBuilder::new()
        .node(7, 0.002, 0.002, &[("amenity", "bench")])
        .write_to(file.path());

    let layers = layers();
    let cache = GeometryCache::new();
    let mut store = OsmStore::new();
    let mut tile_index = TileIndex::new(BASE_ZOOM);
    let mut processor = rules();

    let summary = {
        let mut ingester =
            Ingester::new(&mut store, &mut processor, &layers, &cache, &mut tile_index);
        ingester.read_file(file.path()).unwrap()
    };

    assert_eq!(summary.nodes, 1);
    assert_eq!(summary.ways, 0);
    assert_eq!(tile_index.len(), 1);
}

#[test]
fn insignificant_nodes_are_stored_but_not_processed() {
    struct CountingProcessor {
        node_calls: usize,
    }

    impl TagProcessor for CountingProcessor {
        fn node_keys(&self) -> HashSet<String> {
            HashSet::from(["amenity".to_owned()])
        }

        fn node(&mut self, _element: &mut OsmElement<'_>) -> Result<(), HookError> {
            self.node_calls += 1;
            Ok(())
        }

        fn way(&mut self, _element: &mut OsmElement<'_>) -> Result<(), HookError> {
            Ok(())
        }
    }

    let file = NamedTempFile::new().unwrap();
    PbfBuilder::new()
        .node(1, 0.001, 0.001, &[("name", "untagged for the hook")])
        .node(2, 0.002, 0.002, &[("amenity", "cafe")])
        .node(3, 0.003, 0.003, &[])
        .write_to(file.path());

    let layers = layers();
    let cache = GeometryCache::new();
    let mut store = OsmStore::new();
    let mut tile_index = TileIndex::new(BASE_ZOOM);
    let mut processor = CountingProcessor { node_calls: 0 };

    {
        let mut ingester =
            Ingester::new(&mut store, &mut processor, &layers, &cache, &mut tile_index);
        ingester.read_file(file.path()).unwrap();
    }

    assert_eq!(processor.node_calls, 1);
    assert_eq!(store.nodes.len(), 3);
}

#[test]
fn hook_failures_abort_the_build() {
    struct FailingProcessor;

    impl TagProcessor for FailingProcessor {
        fn node_keys(&self) -> HashSet<String> {
            HashSet::new()
        }

        fn node(&mut self, _element: &mut OsmElement<'_>) -> Result<(), HookError> {
            Ok(())
        }

        fn way(&mut self, _element: &mut OsmElement<'_>) -> Result<(), HookError> {
            Err(HookError("boom".into()))
        }
    }

    let file = NamedTempFile::new().unwrap();
    PbfBuilder::new()
        .node(1, 0.001, 0.001, &[])
        .node(2, 0.002, 0.002, &[])
        .way(5, &[1, 2], &[("highway", "service")])
        .write_to(file.path());

    let layers = layers();
    let cache = GeometryCache::new();
    let mut store = OsmStore::new();
    let mut tile_index = TileIndex::new(BASE_ZOOM);
    let mut processor = FailingProcessor;

    let result = {
        let mut ingester =
            Ingester::new(&mut store, &mut processor, &layers, &cache, &mut tile_index);
        ingester.read_file(file.path())
    };
    assert!(result.is_err());
}

#[test]
fn header_bbox_is_exposed_for_the_clip_box() {
    let file = fixture();
    let bbox = read_header_bbox(file.path()).unwrap().unwrap();
    assert!((bbox.min().x - 0.0).abs() < 1e-9);
    assert!((bbox.max().x - 0.01).abs() < 1e-9);
    assert!((bbox.max().y - 0.01).abs() < 1e-9);
}
