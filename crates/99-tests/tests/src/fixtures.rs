//! Source-file fixtures and namespace scaffolding for the scenario suite.

use bytemuck::Pod;
use dataset_layout::{Coordinate, GraphEdge, GraphNode, NameBlock, Namespace, SearchTreeNode, SlotId};
use shm_barrier::ProcessBarrier;
use source_import::{EdgeAnnotation, SourcePaths, GRAPH_FINGERPRINT};
use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// A unique namespace whose shm objects are removed on drop.
pub struct ScenarioNamespace {
    namespace: Namespace,
}

impl ScenarioNamespace {
    pub fn new(tag: &str) -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            namespace: Namespace::new(format!("wmk-e2e-{tag}-{}-{n}", std::process::id())),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl Drop for ScenarioNamespace {
    fn drop(&mut self) {
        for slot in [SlotId::A, SlotId::B] {
            let _ = shm_region::remove(&self.namespace.layout_region(slot));
            let _ = shm_region::remove(&self.namespace.data_region(slot));
        }
        let _ = shm_region::remove(&self.namespace.registry());
        let _ = ProcessBarrier::unlink(&self.namespace);
    }
}

/// One complete, internally consistent set of source files.
///
/// `marker` is woven into coordinates and edge weights so scenarios can tell
/// publications apart after a swap.
pub struct SourceFixture {
    _dir: TempDir,
    pub paths: SourcePaths,
    pub marker: i32,
    pub checksum: u32,
}

fn push_array<T: Pod>(out: &mut Vec<u8>, records: &[T]) {
    out.extend_from_slice(&(records.len() as u64).to_le_bytes());
    for record in records {
        out.extend_from_slice(bytemuck::bytes_of(record));
    }
}

/// Writes a minimal dataset: three nodes, three edges, two street names.
pub fn small(marker: i32) -> SourceFixture {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();

    let graph_nodes = [
        GraphNode { first_edge: 0 },
        GraphNode { first_edge: 2 },
        GraphNode { first_edge: 3 },
    ];
    let graph_edges = [
        GraphEdge {
            target: 1,
            weight: marker * 10 + 1,
            id: 0,
            flags: GraphEdge::FORWARD,
        },
        GraphEdge {
            target: 2,
            weight: marker * 10 + 2,
            id: 1,
            flags: GraphEdge::FORWARD | GraphEdge::BACKWARD,
        },
        GraphEdge {
            target: 0,
            weight: marker * 10 + 3,
            id: 2,
            flags: GraphEdge::BACKWARD,
        },
    ];

    let mut arrays = Vec::new();
    for node in &graph_nodes {
        arrays.extend_from_slice(bytemuck::bytes_of(node));
    }
    let node_section = arrays.len();
    for edge in &graph_edges {
        arrays.extend_from_slice(bytemuck::bytes_of(edge));
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&arrays);
    let checksum = hasher.finalize();

    let mut graph = Vec::new();
    graph.extend_from_slice(&GRAPH_FINGERPRINT.to_le_bytes());
    graph.extend_from_slice(&checksum.to_le_bytes());
    graph.extend_from_slice(&(graph_nodes.len() as u64).to_le_bytes());
    graph.extend_from_slice(&arrays[..node_section]);
    graph.extend_from_slice(&(graph_edges.len() as u64).to_le_bytes());
    graph.extend_from_slice(&arrays[node_section..]);
    fs::write(root.join("map.graph"), &graph).expect("write graph");

    let coordinates: Vec<Coordinate> = (0..3)
        .map(|i| Coordinate {
            lat: marker * 1_000 + i,
            lon: 13_000_000 + i,
        })
        .collect();
    let mut nodes = Vec::new();
    push_array(&mut nodes, &coordinates);
    fs::write(root.join("map.nodes"), &nodes).expect("write nodes");

    let annotations = [
        EdgeAnnotation {
            via_node: 0,
            name_id: 0,
            turn_instruction: 1,
            travel_mode: 1,
            _pad: [0; 2],
        },
        EdgeAnnotation {
            via_node: 1,
            name_id: 1,
            turn_instruction: 3,
            travel_mode: 1,
            _pad: [0; 2],
        },
        EdgeAnnotation {
            via_node: 2,
            name_id: 1,
            turn_instruction: 0,
            travel_mode: 2,
            _pad: [0; 2],
        },
    ];
    let mut edges = Vec::new();
    push_array(&mut edges, &annotations);
    fs::write(root.join("map.edges"), &edges).expect("write edges");

    let mut names = Vec::new();
    push_array(&mut names, &[0u32, 10u32]);
    let mut deltas = [0u8; 16];
    deltas[0] = 4; // "High"
    deltas[1] = 6; // "Street"
    push_array(&mut names, &[NameBlock(deltas)]);
    push_array(&mut names, b"HighStreet");
    fs::write(root.join("map.names"), &names).expect("write names");

    let mut geometry = Vec::new();
    push_array(&mut geometry, &[0u32, 2]);
    push_array(&mut geometry, &[100u32, 101, 102]);
    geometry.extend_from_slice(&2u64.to_le_bytes());
    geometry.extend_from_slice(&0b01u32.to_le_bytes());
    fs::write(root.join("map.geometry"), &geometry).expect("write geometry");

    let tree = [SearchTreeNode {
        min_lon: 13_000_000,
        min_lat: marker * 1_000,
        max_lon: 13_000_002,
        max_lat: marker * 1_000 + 2,
        first_child: 0,
        child_count: 3,
    }];
    let mut rtree = Vec::new();
    push_array(&mut rtree, &tree);
    fs::write(root.join("map.ramIndex"), &rtree).expect("write rtree");

    let leaf_index = root.join("map.fileIndex");
    fs::write(&leaf_index, b"leaf bytes").expect("write leaf index");

    let mut core = Vec::new();
    core.extend_from_slice(&3u64.to_le_bytes());
    core.extend_from_slice(&0b101u32.to_le_bytes());
    fs::write(root.join("map.core"), &core).expect("write core");

    let timestamp = root.join("map.timestamp");
    fs::write(&timestamp, format!("load-{marker}")).expect("write timestamp");

    let paths = SourcePaths {
        graph: root.join("map.graph"),
        nodes: root.join("map.nodes"),
        edges: root.join("map.edges"),
        names: root.join("map.names"),
        geometry: root.join("map.geometry"),
        rtree: root.join("map.ramIndex"),
        leaf_index,
        core: root.join("map.core"),
        timestamp: Some(timestamp),
    };

    SourceFixture {
        _dir: dir,
        paths,
        marker,
        checksum,
    }
}
