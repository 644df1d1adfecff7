//! Minimal OSM PBF writer for building test fixtures.
//!
//! Encodes the protobuf wire format by hand: a header blob followed by
//! one blob each for dense nodes, ways, and relations, so the pass
//! machinery in the ingester sees the block layout of a real extract.

use std::fs;
use std::path::Path;

const GRANULARITY: i64 = 100;

fn varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn field_key(out: &mut Vec<u8>, field: u32, wire_type: u32) {
    varint(out, u64::from((field << 3) | wire_type));
}

fn write_varint_field(out: &mut Vec<u8>, field: u32, value: u64) {
    field_key(out, field, 0);
    varint(out, value);
}

fn write_bytes_field(out: &mut Vec<u8>, field: u32, data: &[u8]) {
    field_key(out, field, 2);
    varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

fn write_packed_field(out: &mut Vec<u8>, field: u32, values: &[u64]) {
    if values.is_empty() {
        return;
    }
    let mut body = Vec::new();
    for &value in values {
        varint(&mut body, value);
    }
    write_bytes_field(out, field, &body);
}

fn delta_zigzag(values: &[i64]) -> Vec<u64> {
    let mut last = 0;
    values
        .iter()
        .map(|&value| {
            let delta = value - last;
            last = value;
            zigzag(delta)
        })
        .collect()
}

/// Per-block string table. Index zero is reserved for the empty string.
struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            strings: vec![String::new()],
        }
    }

    fn intern(&mut self, value: &str) -> u64 {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return index as u64;
        }
        self.strings.push(value.to_owned());
        (self.strings.len() - 1) as u64
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for value in &self.strings {
            write_bytes_field(&mut out, 1, value.as_bytes());
        }
        out
    }
}

fn primitive_block(table: &StringTable, group: &[u8]) -> Vec<u8> {
    let mut block = Vec::new();
    write_bytes_field(&mut block, 1, &table.encode());
    write_bytes_field(&mut block, 2, group);
    write_varint_field(&mut block, 17, GRANULARITY as u64);
    block
}

fn blob(stream: &mut Vec<u8>, blob_type: &str, content: &[u8]) {
    let mut blob = Vec::new();
    write_bytes_field(&mut blob, 1, content);
    write_varint_field(&mut blob, 2, content.len() as u64);

    let mut header = Vec::new();
    write_bytes_field(&mut header, 1, blob_type.as_bytes());
    write_varint_field(&mut header, 3, blob.len() as u64);

    stream.extend_from_slice(&(header.len() as u32).to_be_bytes());
    stream.extend_from_slice(&header);
    stream.extend_from_slice(&blob);
}

type Tags = Vec<(String, String)>;

/// Builds a small extract: nodes, ways, and relations land in separate
/// blobs in that order, all IDs must already be ascending per kind.
#[derive(Default)]
pub struct PbfBuilder {
    bbox: Option<[f64; 4]>,
    nodes: Vec<(i64, f64, f64, Tags)>,
    ways: Vec<(i64, Vec<i64>, Tags)>,
    relations: Vec<(i64, Vec<(i64, String)>, Tags)>,
}

fn owned_tags(tags: &[(&str, &str)]) -> Tags {
    tags.iter()
        .map(|&(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

impl PbfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header bounding box as `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn node(mut self, id: i64, lon: f64, lat: f64, tags: &[(&str, &str)]) -> Self {
        self.nodes.push((id, lon, lat, owned_tags(tags)));
        self
    }

    pub fn way(mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Self {
        self.ways.push((id, refs.to_vec(), owned_tags(tags)));
        self
    }

    /// Members are `(way_id, role)` pairs; only way members are
    /// supported.
    pub fn relation(mut self, id: i64, members: &[(i64, &str)], tags: &[(&str, &str)]) -> Self {
        self.relations.push((
            id,
            members
                .iter()
                .map(|&(way, role)| (way, role.to_owned()))
                .collect(),
            owned_tags(tags),
        ));
        self
    }

    pub fn write_to(&self, path: &Path) {
        fs::write(path, self.build()).expect("fixture file is writable");
    }

    pub fn build(&self) -> Vec<u8> {
        let mut stream = Vec::new();
        blob(&mut stream, "OSMHeader", &self.header_block());
        if !self.nodes.is_empty() {
            blob(&mut stream, "OSMData", &self.dense_block());
        }
        if !self.ways.is_empty() {
            blob(&mut stream, "OSMData", &self.ways_block());
        }
        if !self.relations.is_empty() {
            blob(&mut stream, "OSMData", &self.relations_block());
        }
        stream
    }

    fn header_block(&self) -> Vec<u8> {
        let mut block = Vec::new();
        if let Some([min_lon, min_lat, max_lon, max_lat]) = self.bbox {
            let nano = 1.0e9;
            let mut bbox = Vec::new();
            field_key(&mut bbox, 1, 0);
            varint(&mut bbox, zigzag((min_lon * nano) as i64));
            field_key(&mut bbox, 2, 0);
            varint(&mut bbox, zigzag((max_lon * nano) as i64));
            field_key(&mut bbox, 3, 0);
            varint(&mut bbox, zigzag((max_lat * nano) as i64));
            field_key(&mut bbox, 4, 0);
            varint(&mut bbox, zigzag((min_lat * nano) as i64));
            write_bytes_field(&mut block, 1, &bbox);
        }
        write_bytes_field(&mut block, 4, b"OsmSchema-V0.6");
        write_bytes_field(&mut block, 4, b"DenseNodes");
        block
    }

    fn dense_block(&self) -> Vec<u8> {
        let mut table = StringTable::new();
        let scale = 1.0e9 / GRANULARITY as f64;
        let ids: Vec<i64> = self.nodes.iter().map(|n| n.0).collect();
        let lats: Vec<i64> = self.nodes.iter().map(|n| (n.2 * scale) as i64).collect();
        let lons: Vec<i64> = self.nodes.iter().map(|n| (n.1 * scale) as i64).collect();

        let has_tags = self.nodes.iter().any(|n| !n.3.is_empty());
        let mut keys_vals = Vec::new();
        if has_tags {
            for (_, _, _, tags) in &self.nodes {
                for (key, value) in tags {
                    keys_vals.push(table.intern(key));
                    keys_vals.push(table.intern(value));
                }
                keys_vals.push(0);
            }
        }

        let mut dense = Vec::new();
        write_packed_field(&mut dense, 1, &delta_zigzag(&ids));
        write_packed_field(&mut dense, 8, &delta_zigzag(&lats));
        write_packed_field(&mut dense, 9, &delta_zigzag(&lons));
        write_packed_field(&mut dense, 10, &keys_vals);

        let mut group = Vec::new();
        write_bytes_field(&mut group, 2, &dense);
        primitive_block(&table, &group)
    }

    fn ways_block(&self) -> Vec<u8> {
        let mut table = StringTable::new();
        let mut group = Vec::new();
        for (id, refs, tags) in &self.ways {
            let keys: Vec<u64> = tags.iter().map(|(k, _)| table.intern(k)).collect();
            let vals: Vec<u64> = tags.iter().map(|(_, v)| table.intern(v)).collect();
            let mut way = Vec::new();
            write_varint_field(&mut way, 1, *id as u64);
            write_packed_field(&mut way, 2, &keys);
            write_packed_field(&mut way, 3, &vals);
            write_packed_field(&mut way, 8, &delta_zigzag(refs));
            write_bytes_field(&mut group, 3, &way);
        }
        primitive_block(&table, &group)
    }

    fn relations_block(&self) -> Vec<u8> {
        let mut table = StringTable::new();
        let mut group = Vec::new();
        for (id, members, tags) in &self.relations {
            let keys: Vec<u64> = tags.iter().map(|(k, _)| table.intern(k)).collect();
            let vals: Vec<u64> = tags.iter().map(|(_, v)| table.intern(v)).collect();
            let roles: Vec<u64> = members
                .iter()
                .map(|(_, role)| table.intern(role))
                .collect();
            let member_ids: Vec<i64> = members.iter().map(|&(way, _)| way).collect();
            let types = vec![1; members.len()];

            let mut relation = Vec::new();
            write_varint_field(&mut relation, 1, *id as u64);
            write_packed_field(&mut relation, 2, &keys);
            write_packed_field(&mut relation, 3, &vals);
            write_packed_field(&mut relation, 8, &roles);
            write_packed_field(&mut relation, 9, &delta_zigzag(&member_ids));
            write_packed_field(&mut relation, 10, &types);
            write_bytes_field(&mut group, 4, &relation);
        }
        primitive_block(&table, &group)
    }
}
