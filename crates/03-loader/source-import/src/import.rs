//! The two import passes.

use crate::error::{SourceInputError, SourceResult};
use crate::files::{section_len, SourceFile};
use bytemuck::{Pod, Zeroable};
use dataset_layout::{
    BlockId, Coordinate, DatasetLayout, GraphEdge, GraphNode, NameBlock, SearchTreeNode,
};
use std::fs;
use std::mem;
use std::path::PathBuf;
use tracing::warn;

/// Leading magic of the graph topology file.
pub const GRAPH_FINGERPRINT: u32 = u32::from_le_bytes(*b"WMKG");

/// Fallback timestamp when no timestamp input is available.
const TIMESTAMP_FALLBACK: &str = "n/a";

/// Per-edge annotation record of the `edges` source file.
///
/// Split across four blocks on import: via node, name id, turn instruction,
/// and travel mode each become their own flat array.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct EdgeAnnotation {
    pub via_node: u32,
    pub name_id: u32,
    pub turn_instruction: u8,
    pub travel_mode: u8,
    pub _pad: [u8; 2],
}

/// Locations of every preprocessor output consumed by the loader.
#[derive(Clone, Debug)]
pub struct SourcePaths {
    pub graph: PathBuf,
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub names: PathBuf,
    pub geometry: PathBuf,
    pub rtree: PathBuf,
    pub leaf_index: PathBuf,
    pub core: PathBuf,
    pub timestamp: Option<PathBuf>,
}

fn bitset_chunks(bits: u64) -> u64 {
    bits / 32 + 1
}

struct GraphHeader {
    checksum: u32,
    node_count: u64,
    edge_count: u64,
}

/// Reads the graph file's header and count fields, validating fingerprint
/// and total length.
fn graph_header(file: &mut SourceFile) -> SourceResult<GraphHeader> {
    let fingerprint = file.read_u32()?;
    if fingerprint != GRAPH_FINGERPRINT {
        return Err(file.checksum_mismatch(GRAPH_FINGERPRINT, fingerprint));
    }
    let checksum = file.read_u32()?;
    let node_count = file.read_u64()?;
    file.skip(section_len(node_count, mem::size_of::<GraphNode>() as u64).ok_or_else(|| {
        file.size_mismatch(format!("implausible node count {node_count}"))
    })?)?;
    let edge_count = file.read_u64()?;

    let expected = section_len(node_count, mem::size_of::<GraphNode>() as u64)
        .zip(section_len(edge_count, mem::size_of::<GraphEdge>() as u64))
        .and_then(|(nodes, edges)| Some(16u64.checked_add(nodes)?.checked_add(8)?.checked_add(edges)?));
    match expected {
        Some(expected) if expected == file.len() => Ok(GraphHeader {
            checksum,
            node_count,
            edge_count,
        }),
        _ => Err(file.size_mismatch(format!(
            "{} bytes on disk do not hold {node_count} nodes and {edge_count} edges",
            file.len()
        ))),
    }
}

/// Pass 1: sizes every block of `layout` from the source files.
pub fn probe(paths: &SourcePaths, layout: &mut DatasetLayout) -> SourceResult<()> {
    let mut graph = SourceFile::open("graph", &paths.graph)?;
    let header = graph_header(&mut graph)?;
    layout.set_block_size::<GraphNode>(BlockId::GraphNodeList, header.node_count);
    layout.set_block_size::<GraphEdge>(BlockId::GraphEdgeList, header.edge_count);
    layout.set_block_size::<u32>(BlockId::HsgrChecksum, 1);

    let mut nodes = SourceFile::open("nodes", &paths.nodes)?;
    let coordinate_count = nodes.read_u64()?;
    expect_len(
        &nodes,
        &[(coordinate_count, mem::size_of::<Coordinate>() as u64)],
    )?;
    layout.set_block_size::<Coordinate>(BlockId::CoordinateList, coordinate_count);

    let mut edges = SourceFile::open("edges", &paths.edges)?;
    let annotation_count = edges.read_u64()?;
    expect_len(
        &edges,
        &[(annotation_count, mem::size_of::<EdgeAnnotation>() as u64)],
    )?;
    if annotation_count != header.edge_count {
        return Err(edges.size_mismatch(format!(
            "{annotation_count} edge annotations for a graph with {} edges",
            header.edge_count
        )));
    }
    layout.set_block_size::<u32>(BlockId::ViaNodeList, annotation_count);
    layout.set_block_size::<u32>(BlockId::NameIdList, annotation_count);
    layout.set_block_size::<u8>(BlockId::TurnInstruction, annotation_count);
    layout.set_block_size::<u8>(BlockId::TravelMode, annotation_count);

    let mut names = SourceFile::open("names", &paths.names)?;
    let offset_count = names.read_u64()?;
    names.skip(section_len(offset_count, 4).ok_or_else(|| {
        names.size_mismatch(format!("implausible offset count {offset_count}"))
    })?)?;
    let block_count = names.read_u64()?;
    names.skip(
        section_len(block_count, mem::size_of::<NameBlock>() as u64)
            .ok_or_else(|| names.size_mismatch(format!("implausible block count {block_count}")))?,
    )?;
    let char_count = names.read_u64()?;
    expect_len(
        &names,
        &[
            (offset_count, 4),
            (block_count, mem::size_of::<NameBlock>() as u64),
            (char_count, 1),
        ],
    )?;
    layout.set_block_size::<u32>(BlockId::NameOffsets, offset_count);
    layout.set_block_size::<NameBlock>(BlockId::NameBlocks, block_count);
    layout.set_block_size::<u8>(BlockId::NameCharList, char_count);

    let mut geometry = SourceFile::open("geometry", &paths.geometry)?;
    let index_count = geometry.read_u64()?;
    geometry.skip(section_len(index_count, 4).ok_or_else(|| {
        geometry.size_mismatch(format!("implausible index count {index_count}"))
    })?)?;
    let list_count = geometry.read_u64()?;
    geometry.skip(section_len(list_count, 4).ok_or_else(|| {
        geometry.size_mismatch(format!("implausible list count {list_count}"))
    })?)?;
    let indicator_bits = geometry.read_u64()?;
    expect_len(
        &geometry,
        &[
            (index_count, 4),
            (list_count, 4),
            (bitset_chunks(indicator_bits), 4),
        ],
    )?;
    layout.set_block_size::<u32>(BlockId::GeometriesIndex, index_count);
    layout.set_block_size::<u32>(BlockId::GeometriesList, list_count);
    layout.set_block_size::<u32>(BlockId::GeometriesIndicators, indicator_bits);

    let mut rtree = SourceFile::open("rtree", &paths.rtree)?;
    let tree_node_count = rtree.read_u64()?;
    expect_len(
        &rtree,
        &[(tree_node_count, mem::size_of::<SearchTreeNode>() as u64)],
    )?;
    layout.set_block_size::<SearchTreeNode>(BlockId::RSearchTree, tree_node_count);

    let leaf_path = leaf_index_text(paths)?;
    layout.set_block_size::<u8>(BlockId::FileIndexPath, leaf_path.len() as u64);

    let mut core = SourceFile::open("core", &paths.core)?;
    let core_bits = core.read_u64()?;
    expect_len(&core, &[(bitset_chunks(core_bits), 4)])?;
    layout.set_block_size::<u32>(BlockId::CoreMarker, core_bits);

    let stamp = timestamp_text(paths);
    layout.set_block_size::<u8>(BlockId::Timestamp, stamp.len() as u64);

    Ok(())
}

/// Pass 2: streams file contents into the region's blocks, stamping canaries
/// through write-mode resolution and re-verifying every count recorded by
/// pass 1.
pub fn populate(
    paths: &SourcePaths,
    layout: &DatasetLayout,
    region: &mut [u8],
) -> SourceResult<()> {
    let mut graph = SourceFile::open("graph", &paths.graph)?;
    let header = graph_header(&mut graph)?;
    check_count(&graph, layout, BlockId::GraphNodeList, header.node_count)?;
    check_count(&graph, layout, BlockId::GraphEdgeList, header.edge_count)?;

    // Re-position past the node count field; `graph_header` seeked to the
    // edge array already, so reopen for a linear pass.
    let mut graph = SourceFile::open("graph", &paths.graph)?;
    graph.skip(16)?;
    let mut hasher = crc32fast::Hasher::new();
    let node_bytes = layout.writer_block_bytes(region, BlockId::GraphNodeList)?;
    graph.read_into(node_bytes)?;
    hasher.update(node_bytes);
    graph.skip(8)?;
    let edge_bytes = layout.writer_block_bytes(region, BlockId::GraphEdgeList)?;
    graph.read_into(edge_bytes)?;
    hasher.update(edge_bytes);
    let computed = hasher.finalize();
    if computed != header.checksum {
        return Err(graph.checksum_mismatch(header.checksum, computed));
    }
    layout
        .writer_block_bytes(region, BlockId::HsgrChecksum)?
        .copy_from_slice(&header.checksum.to_le_bytes());

    let mut nodes = SourceFile::open("nodes", &paths.nodes)?;
    let coordinate_count = nodes.read_u64()?;
    check_count(&nodes, layout, BlockId::CoordinateList, coordinate_count)?;
    nodes.read_into(layout.writer_block_bytes(region, BlockId::CoordinateList)?)?;

    let mut edges = SourceFile::open("edges", &paths.edges)?;
    let annotation_count = edges.read_u64()?;
    check_count(&edges, layout, BlockId::ViaNodeList, annotation_count)?;
    let annotations: Vec<EdgeAnnotation> = edges.read_records(annotation_count)?;

    let via_bytes = layout.writer_block_bytes(region, BlockId::ViaNodeList)?;
    for (index, annotation) in annotations.iter().enumerate() {
        via_bytes[index * 4..index * 4 + 4].copy_from_slice(&annotation.via_node.to_le_bytes());
    }
    let name_id_bytes = layout.writer_block_bytes(region, BlockId::NameIdList)?;
    for (index, annotation) in annotations.iter().enumerate() {
        name_id_bytes[index * 4..index * 4 + 4].copy_from_slice(&annotation.name_id.to_le_bytes());
    }
    let turn_bytes = layout.writer_block_bytes(region, BlockId::TurnInstruction)?;
    for (index, annotation) in annotations.iter().enumerate() {
        turn_bytes[index] = annotation.turn_instruction;
    }
    let mode_bytes = layout.writer_block_bytes(region, BlockId::TravelMode)?;
    for (index, annotation) in annotations.iter().enumerate() {
        mode_bytes[index] = annotation.travel_mode;
    }

    let mut names = SourceFile::open("names", &paths.names)?;
    let offset_count = names.read_u64()?;
    check_count(&names, layout, BlockId::NameOffsets, offset_count)?;
    names.read_into(layout.writer_block_bytes(region, BlockId::NameOffsets)?)?;
    let block_count = names.read_u64()?;
    check_count(&names, layout, BlockId::NameBlocks, block_count)?;
    names.read_into(layout.writer_block_bytes(region, BlockId::NameBlocks)?)?;
    let char_count = names.read_u64()?;
    check_count(&names, layout, BlockId::NameCharList, char_count)?;
    names.read_into(layout.writer_block_bytes(region, BlockId::NameCharList)?)?;

    let mut geometry = SourceFile::open("geometry", &paths.geometry)?;
    let index_count = geometry.read_u64()?;
    check_count(&geometry, layout, BlockId::GeometriesIndex, index_count)?;
    geometry.read_into(layout.writer_block_bytes(region, BlockId::GeometriesIndex)?)?;
    let list_count = geometry.read_u64()?;
    check_count(&geometry, layout, BlockId::GeometriesList, list_count)?;
    geometry.read_into(layout.writer_block_bytes(region, BlockId::GeometriesList)?)?;
    let indicator_bits = geometry.read_u64()?;
    check_count(&geometry, layout, BlockId::GeometriesIndicators, indicator_bits)?;
    geometry.read_into(layout.writer_block_bytes(region, BlockId::GeometriesIndicators)?)?;

    let mut rtree = SourceFile::open("rtree", &paths.rtree)?;
    let tree_node_count = rtree.read_u64()?;
    check_count(&rtree, layout, BlockId::RSearchTree, tree_node_count)?;
    rtree.read_into(layout.writer_block_bytes(region, BlockId::RSearchTree)?)?;

    let leaf_path = leaf_index_text(paths)?;
    let leaf_bytes = layout.writer_block_bytes(region, BlockId::FileIndexPath)?;
    if leaf_bytes.len() != leaf_path.len() {
        return Err(SourceInputError::SizeMismatch {
            role: "leaf_index",
            path: paths.leaf_index.clone(),
            detail: "path length changed between passes".to_owned(),
        });
    }
    leaf_bytes.copy_from_slice(leaf_path.as_bytes());

    let mut core = SourceFile::open("core", &paths.core)?;
    let core_bits = core.read_u64()?;
    check_count(&core, layout, BlockId::CoreMarker, core_bits)?;
    core.read_into(layout.writer_block_bytes(region, BlockId::CoreMarker)?)?;

    let stamp = timestamp_text(paths);
    let stamp_bytes = layout.writer_block_bytes(region, BlockId::Timestamp)?;
    if stamp_bytes.len() != stamp.len() {
        return Err(SourceInputError::SizeMismatch {
            role: "timestamp",
            path: paths.timestamp.clone().unwrap_or_default(),
            detail: "timestamp text changed between passes".to_owned(),
        });
    }
    stamp_bytes.copy_from_slice(stamp.as_bytes());

    Ok(())
}

/// Validates that a file's declared total length matches its sections.
fn expect_len(file: &SourceFile, sections: &[(u64, u64)]) -> SourceResult<()> {
    // One u64 count precedes each section.
    let mut expected = Some(8 * sections.len() as u64);
    for (count, width) in sections {
        expected = expected
            .zip(section_len(*count, *width))
            .and_then(|(sum, section)| sum.checked_add(section));
    }
    match expected {
        Some(expected) if expected == file.len() => Ok(()),
        _ => Err(file.size_mismatch(format!(
            "{} bytes on disk do not match the declared section counts",
            file.len()
        ))),
    }
}

/// Rejects a count that differs from what pass 1 recorded.
fn check_count(
    file: &SourceFile,
    layout: &DatasetLayout,
    block: BlockId,
    found: u64,
) -> SourceResult<()> {
    let recorded = layout.num_entries(block);
    if recorded != found {
        return Err(file.size_mismatch(format!(
            "{} entries now, {recorded} at sizing time",
            found
        )));
    }
    Ok(())
}

/// The path string stored in the `file_index_path` block.
fn leaf_index_text(paths: &SourcePaths) -> SourceResult<String> {
    if !paths.leaf_index.exists() {
        return Err(SourceInputError::Missing {
            role: "leaf_index",
            path: paths.leaf_index.clone(),
        });
    }
    Ok(paths.leaf_index.to_string_lossy().into_owned())
}

/// The text stored in the `timestamp` block.
///
/// A missing or unreadable timestamp input degrades to a fallback marker
/// instead of failing the load.
fn timestamp_text(paths: &SourcePaths) -> String {
    let Some(path) = &paths.timestamp else {
        return TIMESTAMP_FALLBACK.to_owned();
    };
    match fs::read_to_string(path) {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                TIMESTAMP_FALLBACK.to_owned()
            } else {
                trimmed.to_owned()
            }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "timestamp input unreadable, storing fallback");
            TIMESTAMP_FALLBACK.to_owned()
        }
    }
}
