//! Error surface for the process barrier.

use shm_region::RegionError;
use std::io;
use thiserror::Error;

/// Convenience result alias for barrier operations.
pub type BarrierResult<T, E = BarrierError> = Result<T, E>;

/// Errors surfaced while opening or operating the named primitives.
///
/// Every variant is fatal for the calling process: a barrier that cannot be
/// acquired or initialized leaves no safe way to coordinate with peers.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// The barrier region exists but never became ready (its initializer
    /// died mid-setup) or cannot be accessed.
    #[error("barrier primitives unavailable: {reason}")]
    Unavailable { reason: String },

    /// The backing region could not be created or attached.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// A pthread call on the shared primitives failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn check(op: &'static str, rc: libc::c_int) -> BarrierResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(BarrierError::Os {
            op,
            source: io::Error::from_raw_os_error(rc),
        })
    }
}
