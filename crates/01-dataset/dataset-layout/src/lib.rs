//! On-wire contract for the shared routing dataset.
//!
//! This crate defines everything producer and consumer must agree on
//! bit-for-bit:
//! * [`BlockId`] – the closed, ordered enumeration of dataset blocks.
//! * [`DatasetLayout`] – per-block sizing, offset arithmetic, and the
//!   canary-bracketed data-region geometry.
//! * [`BlockSlice`] – bounds-checked typed views over block bytes.
//! * [`RegistryRecord`] – the publication record naming the active slot.
//! * [`Namespace`] – stable shared-memory object names.
//! * POD element types stored inside the blocks.

mod block;
mod error;
mod layout;
mod names;
mod registry;
mod types;
mod view;

pub use block::{BlockId, NUM_BLOCKS};
pub use error::{LayoutError, LayoutResult};
pub use layout::{DatasetLayout, BITSET_CHUNK_BITS, CANARY, CANARY_LEN, FORMAT_VERSION};
pub use names::{InvalidNamespace, Namespace};
pub use registry::{DivergentRegistry, RegistryRecord, SlotId};
pub use types::{
    Coordinate, GraphEdge, GraphNode, NameBlock, SearchTreeNode, COORDINATE_PRECISION,
    NAME_BLOCK_SPAN,
};
pub use view::BlockSlice;
