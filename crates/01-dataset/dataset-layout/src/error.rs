//! Error surface for layout interpretation and canary verification.

use crate::block::BlockId;
use crate::layout::FORMAT_VERSION;
use thiserror::Error;

/// Convenience result alias for layout operations.
pub type LayoutResult<T, E = LayoutError> = Result<T, E>;

/// Errors raised while interpreting a layout or resolving block views.
///
/// Canary failures are fatal for the region they occur in: the caller must
/// treat the whole dataset as unusable rather than skip the affected block.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// The sentinel immediately before the block's data bytes is damaged.
    #[error("start canary of block {} corrupted", .0.name())]
    CorruptStartCanary(BlockId),

    /// The sentinel immediately after the block's data bytes is damaged.
    #[error("end canary of block {} corrupted", .0.name())]
    CorruptEndCanary(BlockId),

    /// The layout region was produced by an incompatible loader version.
    #[error("layout format version {found} not supported (reader expects {FORMAT_VERSION})")]
    IncompatibleVersion { found: u32 },

    /// A region is too small to hold what the layout describes.
    #[error("region holds {actual} bytes but the layout requires {required}")]
    RegionTooSmall { required: u64, actual: u64 },

    /// A typed view was requested with an element width that does not match
    /// the width recorded for the block.
    #[error(
        "block {} stores {stored}-byte entries, requested a {requested}-byte view",
        block.name()
    )]
    EntryWidthMismatch {
        block: BlockId,
        stored: u64,
        requested: u64,
    },
}
