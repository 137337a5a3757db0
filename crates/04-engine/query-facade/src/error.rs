//! Error surface of the reader facade.

use dataset_layout::{DivergentRegistry, LayoutError};
use shm_barrier::BarrierError;
use shm_region::RegionError;
use thiserror::Error;

/// Convenience result alias for facade operations.
pub type FacadeResult<T, E = FacadeError> = Result<T, E>;

/// Errors surfaced to query code.
///
/// All of them fail the single request they occur in; the server stays up.
#[derive(Debug, Error)]
pub enum FacadeError {
    /// Nothing has been published yet; surfaced as service-unavailable.
    #[error("no dataset has been published")]
    NotLoaded,

    /// The active dataset failed canary or version verification.
    #[error("published dataset unusable: {0}")]
    Corrupt(#[from] LayoutError),

    /// The registry record is internally inconsistent.
    #[error(transparent)]
    Registry(#[from] DivergentRegistry),

    /// A region named by the registry could not be attached.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// The process barrier failed.
    #[error(transparent)]
    Barrier(#[from] BarrierError),
}
