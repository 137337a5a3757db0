//! The closed enumeration of dataset blocks.
//!
//! The order of the variants is part of the on-wire contract: block offsets
//! are running sums over all preceding blocks, so producer and consumer must
//! iterate the same sequence.

/// Number of blocks in a dataset region.
pub const NUM_BLOCKS: usize = 18;

/// Identity of one named block inside the data region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BlockId {
    NameOffsets = 0,
    NameBlocks,
    NameCharList,
    NameIdList,
    ViaNodeList,
    GraphNodeList,
    GraphEdgeList,
    CoordinateList,
    TurnInstruction,
    TravelMode,
    RSearchTree,
    GeometriesIndex,
    GeometriesList,
    GeometriesIndicators,
    HsgrChecksum,
    Timestamp,
    FileIndexPath,
    CoreMarker,
}

impl BlockId {
    /// All blocks in wire order.
    pub const ALL: [BlockId; NUM_BLOCKS] = [
        BlockId::NameOffsets,
        BlockId::NameBlocks,
        BlockId::NameCharList,
        BlockId::NameIdList,
        BlockId::ViaNodeList,
        BlockId::GraphNodeList,
        BlockId::GraphEdgeList,
        BlockId::CoordinateList,
        BlockId::TurnInstruction,
        BlockId::TravelMode,
        BlockId::RSearchTree,
        BlockId::GeometriesIndex,
        BlockId::GeometriesList,
        BlockId::GeometriesIndicators,
        BlockId::HsgrChecksum,
        BlockId::Timestamp,
        BlockId::FileIndexPath,
        BlockId::CoreMarker,
    ];

    /// Position of this block in wire order.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bitset blocks store `num_entries` bits packed into 32-bit chunks
    /// rather than `num_entries` whole elements.
    pub const fn is_bitset(self) -> bool {
        matches!(self, BlockId::GeometriesIndicators | BlockId::CoreMarker)
    }

    /// Stable lower-case name used for logging and loader CLI flags.
    pub const fn name(self) -> &'static str {
        match self {
            BlockId::NameOffsets => "name_offsets",
            BlockId::NameBlocks => "name_blocks",
            BlockId::NameCharList => "name_char_list",
            BlockId::NameIdList => "name_id_list",
            BlockId::ViaNodeList => "via_node_list",
            BlockId::GraphNodeList => "graph_node_list",
            BlockId::GraphEdgeList => "graph_edge_list",
            BlockId::CoordinateList => "coordinate_list",
            BlockId::TurnInstruction => "turn_instruction",
            BlockId::TravelMode => "travel_mode",
            BlockId::RSearchTree => "r_search_tree",
            BlockId::GeometriesIndex => "geometries_index",
            BlockId::GeometriesList => "geometries_list",
            BlockId::GeometriesIndicators => "geometries_indicators",
            BlockId::HsgrChecksum => "hsgr_checksum",
            BlockId::Timestamp => "timestamp",
            BlockId::FileIndexPath => "file_index_path",
            BlockId::CoreMarker => "core_marker",
        }
    }
}
