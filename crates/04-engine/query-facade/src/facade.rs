//! Typed, bounds-checked views for query code.
//!
//! Every accessor resolves its block in read mode, so a canary that dies
//! mid-flight surfaces as a typed error instead of garbage coordinates.
//! The facade is a view over borrowed bytes: it holds no allocation and
//! cannot outlive the query snapshot it came from.

use crate::error::FacadeResult;
use bytemuck::Pod;
use dataset_layout::{
    BlockId, BlockSlice, Coordinate, DatasetLayout, GraphEdge, GraphNode, NameBlock,
    SearchTreeNode, NAME_BLOCK_SPAN,
};
use std::ops::Range;
use std::path::PathBuf;

/// Capability set over one pinned dataset.
#[derive(Clone, Copy)]
pub struct DataFacade<'q> {
    layout: &'q DatasetLayout,
    data: &'q [u8],
}

impl<'q> DataFacade<'q> {
    pub(crate) fn new(layout: &'q DatasetLayout, data: &'q [u8]) -> Self {
        Self { layout, data }
    }

    fn block<T: Pod>(&self, block: BlockId) -> FacadeResult<BlockSlice<'q, T>> {
        Ok(self.layout.reader_block(self.data, block)?)
    }

    fn block_bytes(&self, block: BlockId) -> FacadeResult<&'q [u8]> {
        Ok(self.layout.reader_block_bytes(self.data, block)?)
    }

    /// Adjacency-array nodes of the search graph.
    pub fn graph_nodes(&self) -> FacadeResult<BlockSlice<'q, GraphNode>> {
        self.block(BlockId::GraphNodeList)
    }

    /// Adjacency-array edges of the search graph.
    pub fn graph_edges(&self) -> FacadeResult<BlockSlice<'q, GraphEdge>> {
        self.block(BlockId::GraphEdgeList)
    }

    /// Outgoing edge index range of `node`.
    pub fn edge_range(&self, node: u32) -> FacadeResult<Option<Range<u32>>> {
        let nodes = self.graph_nodes()?;
        let Some(first) = nodes.get(node as usize) else {
            return Ok(None);
        };
        let end = match nodes.get(node as usize + 1) {
            Some(next) => next.first_edge,
            None => self.layout.num_entries(BlockId::GraphEdgeList) as u32,
        };
        Ok(Some(first.first_edge..end))
    }

    /// Node coordinates.
    pub fn coordinates(&self) -> FacadeResult<BlockSlice<'q, Coordinate>> {
        self.block(BlockId::CoordinateList)
    }

    /// Via node per edge-based edge.
    pub fn via_nodes(&self) -> FacadeResult<BlockSlice<'q, u32>> {
        self.block(BlockId::ViaNodeList)
    }

    /// Street-name id per edge.
    pub fn name_ids(&self) -> FacadeResult<BlockSlice<'q, u32>> {
        self.block(BlockId::NameIdList)
    }

    /// Turn instruction code per edge.
    pub fn turn_instructions(&self) -> FacadeResult<BlockSlice<'q, u8>> {
        self.block(BlockId::TurnInstruction)
    }

    /// Travel mode code per edge.
    pub fn travel_modes(&self) -> FacadeResult<BlockSlice<'q, u8>> {
        self.block(BlockId::TravelMode)
    }

    /// Packed R-tree nodes.
    pub fn search_tree(&self) -> FacadeResult<BlockSlice<'q, SearchTreeNode>> {
        self.block(BlockId::RSearchTree)
    }

    /// Prefix-summed geometry index.
    pub fn geometry_index(&self) -> FacadeResult<BlockSlice<'q, u32>> {
        self.block(BlockId::GeometriesIndex)
    }

    /// Flat geometry segment list.
    pub fn geometry_list(&self) -> FacadeResult<BlockSlice<'q, u32>> {
        self.block(BlockId::GeometriesList)
    }

    /// Segment-list range of geometry `id`; the last geometry runs to the
    /// end of the list.
    pub fn geometry_range(&self, id: u32) -> FacadeResult<Option<Range<u32>>> {
        let index = self.geometry_index()?;
        let Some(start) = index.get(id as usize) else {
            return Ok(None);
        };
        let end = match index.get(id as usize + 1) {
            Some(next) => next,
            None => self.layout.num_entries(BlockId::GeometriesList) as u32,
        };
        if end < start {
            return Ok(None);
        }
        Ok(Some(start..end))
    }

    /// Whether geometry `id` is stored compressed.
    pub fn is_geometry_compressed(&self, id: u64) -> FacadeResult<Option<bool>> {
        if id >= self.layout.num_entries(BlockId::GeometriesIndicators) {
            return Ok(None);
        }
        Ok(self.block::<u32>(BlockId::GeometriesIndicators)?.bit(id))
    }

    /// Whether `node` belongs to the uncontracted core.
    pub fn is_core_node(&self, node: u64) -> FacadeResult<Option<bool>> {
        if node >= self.layout.num_entries(BlockId::CoreMarker) {
            return Ok(None);
        }
        Ok(self.block::<u32>(BlockId::CoreMarker)?.bit(node))
    }

    /// Checksum of the graph arrays as recorded by the loader.
    pub fn hsgr_checksum(&self) -> FacadeResult<u32> {
        Ok(self.block::<u32>(BlockId::HsgrChecksum)?.get(0).unwrap_or(0))
    }

    /// Human-readable dataset timestamp.
    pub fn timestamp_text(&self) -> FacadeResult<String> {
        Ok(String::from_utf8_lossy(self.block_bytes(BlockId::Timestamp)?).into_owned())
    }

    /// Path of the R-tree leaf file readers open lazily.
    pub fn leaf_index_path(&self) -> FacadeResult<PathBuf> {
        let bytes = self.block_bytes(BlockId::FileIndexPath)?;
        Ok(PathBuf::from(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// Resolves street name `name_id` from the range table.
    ///
    /// Returns `Ok(None)` for ids past the table; an id whose stored range
    /// is inconsistent also resolves to `None` rather than slicing out of
    /// bounds.
    pub fn street_name(&self, name_id: u32) -> FacadeResult<Option<String>> {
        let offsets = self.block::<u32>(BlockId::NameOffsets)?;
        let blocks = self.block::<NameBlock>(BlockId::NameBlocks)?;
        let chars = self.block_bytes(BlockId::NameCharList)?;

        let id = name_id as usize;
        let span = id / NAME_BLOCK_SPAN;
        let position = id % NAME_BLOCK_SPAN;
        let (Some(base), Some(deltas)) = (offsets.get(span), blocks.get(span)) else {
            return Ok(None);
        };

        let mut start = base as usize;
        for length in &deltas.0[..position.min(16)] {
            start += *length as usize;
        }
        let end = if position < 16 {
            start + deltas.0[position] as usize
        } else {
            // The seventeenth entry of a span ends at the next span's base.
            match offsets.get(span + 1) {
                Some(next) => next as usize,
                None => chars.len(),
            }
        };

        match chars.get(start..end) {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(bytes).into_owned())),
            None => Ok(None),
        }
    }
}
