//! Fixed-width element types stored inside the dataset blocks.
//!
//! All types are `#[repr(C)]` plain data with no implicit padding; their
//! byte images are the wire format.

use bytemuck::{Pod, Zeroable};

/// Fixed-point scaling of coordinate values (degrees × 10^6).
pub const COORDINATE_PRECISION: f64 = 1_000_000.0;

/// One range-table offset entry covers a leading name plus one
/// [`NameBlock`] of packed length deltas.
pub const NAME_BLOCK_SPAN: usize = 17;

/// Fixed-point WGS84 coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Coordinate {
    pub lat: i32,
    pub lon: i32,
}

impl Coordinate {
    /// Converts to floating-point `(lat, lon)` degrees.
    pub fn to_degrees(self) -> (f64, f64) {
        (
            f64::from(self.lat) / COORDINATE_PRECISION,
            f64::from(self.lon) / COORDINATE_PRECISION,
        )
    }
}

/// Adjacency-array node: index of the node's first outgoing edge.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GraphNode {
    pub first_edge: u32,
}

/// Adjacency-array edge of the contracted search graph.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GraphEdge {
    pub target: u32,
    pub weight: i32,
    /// Edge id, or the id of the contracted middle node for shortcuts.
    pub id: u32,
    pub flags: u32,
}

impl GraphEdge {
    pub const FORWARD: u32 = 1;
    pub const BACKWARD: u32 = 1 << 1;
    pub const SHORTCUT: u32 = 1 << 2;

    pub fn is_forward(&self) -> bool {
        self.flags & Self::FORWARD != 0
    }

    pub fn is_backward(&self) -> bool {
        self.flags & Self::BACKWARD != 0
    }

    pub fn is_shortcut(&self) -> bool {
        self.flags & Self::SHORTCUT != 0
    }
}

/// One node of the packed R-tree over edge geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SearchTreeNode {
    pub min_lon: i32,
    pub min_lat: i32,
    pub max_lon: i32,
    pub max_lat: i32,
    pub first_child: u32,
    pub child_count: u32,
}

/// Packed length deltas for the sixteen names following a range-table
/// offset entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct NameBlock(pub [u8; 16]);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn wire_widths_are_frozen() {
        assert_eq!(mem::size_of::<Coordinate>(), 8);
        assert_eq!(mem::size_of::<GraphNode>(), 4);
        assert_eq!(mem::size_of::<GraphEdge>(), 16);
        assert_eq!(mem::size_of::<SearchTreeNode>(), 24);
        assert_eq!(mem::size_of::<NameBlock>(), 16);
    }

    #[test]
    fn coordinate_fixed_point_conversion() {
        let brandenburg_gate = Coordinate {
            lat: 52_516_275,
            lon: 13_377_704,
        };
        let (lat, lon) = brandenburg_gate.to_degrees();
        assert!((lat - 52.516_275).abs() < 1e-9);
        assert!((lon - 13.377_704).abs() < 1e-9);
    }

    #[test]
    fn edge_flags_decompose() {
        let edge = GraphEdge {
            target: 9,
            weight: 120,
            id: 4,
            flags: GraphEdge::FORWARD | GraphEdge::SHORTCUT,
        };
        assert!(edge.is_forward());
        assert!(!edge.is_backward());
        assert!(edge.is_shortcut());
    }
}
