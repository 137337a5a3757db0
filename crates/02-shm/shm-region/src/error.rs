//! Error surface for the shared-region facade.

use std::io;
use thiserror::Error;

/// Convenience result alias for region operations.
pub type RegionResult<T, E = RegionError> = Result<T, E>;

/// Errors surfaced by the named-region operations.
///
/// `SizeMismatch` is typically recoverable on the loader side (remove and
/// recreate the stale region); every variant is fatal for a reader.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The region name is not acceptable to the host (must be `/name`, no
    /// interior NUL, bounded length).
    #[error("invalid region name {name:?}")]
    InvalidName { name: String },

    /// The named region does not exist.
    #[error("region {name} does not exist")]
    Missing { name: String },

    /// The named region exists but has not been sized yet; its creator is
    /// still between `shm_open` and `ftruncate`.
    #[error("region {name} exists but has no size yet")]
    Unsized { name: String },

    /// The named region exists with a different size than requested.
    #[error("region {name} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// The host refused the underlying shm or mapping call.
    #[error("{op}({name}) failed: {source}")]
    Os {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
}

impl RegionError {
    pub(crate) fn os(op: &'static str, name: &str, source: io::Error) -> Self {
        RegionError::Os {
            op,
            name: name.to_owned(),
            source,
        }
    }
}
