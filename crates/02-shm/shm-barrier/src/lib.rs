//! Inter-process coordination for dataset publication.
//!
//! Two pieces live here:
//! * [`ProcessBarrier`] – the named synchronization primitives shared by
//!   loaders and readers: the pending-update mutex serializing publications,
//!   the query counter with its drained condition, and the shared/exclusive
//!   region lock readers hold for the duration of a query.
//! * [`Registry`] / [`RegistryView`] – the single publication point: a tiny
//!   named region holding the active-slot record.
//!
//! All primitives are process-lifetime: they are created on first use and
//! survive until explicit teardown, not merely until their creator exits.

mod barrier;
mod error;
mod registry;

pub use barrier::{
    PendingUpdateGuard, ProcessBarrier, QueryLockGuard, QueryTicket, RegionWriteGuard,
};
pub use error::{BarrierError, BarrierResult};
pub use registry::{Registry, RegistryView};
