//! One complete dataset publication.
//!
//! [`Store::run`] binds the other crates together: it picks the inactive
//! slot, sizes and fills its regions from the source files, verifies the
//! written canaries, swaps the registry under the publication locks, and
//! finally reclaims the previously active slot once every reader has
//! drained.
//!
//! Failure before the registry swap leaves the registry untouched (the
//! dirtied inactive slot is overwritten by the next run). Failure after the
//! swap leaves the new dataset live; at worst the retired slot leaks until
//! the next run reclaims it.

use dataset_layout::{
    DatasetLayout, DivergentRegistry, LayoutError, Namespace, SlotId,
};
use shm_barrier::{BarrierError, ProcessBarrier, Registry};
use shm_region::RegionError;
use source_import::{populate, probe, SourceInputError, SourcePaths};
use thiserror::Error;
use tracing::{info, warn};

/// Convenience result alias for store operations.
pub type StoreResult<T, E = StoreError> = Result<T, E>;

/// Errors surfaced by a publication attempt.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Source(#[from] SourceInputError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Registry(#[from] DivergentRegistry),
}

impl StoreError {
    /// Operator-facing exit code: 1 for bad source inputs, 2 for shared
    /// memory or coordination failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            StoreError::Source(_) => 1,
            _ => 2,
        }
    }
}

/// Outcome of one successful publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishReport {
    /// Slot the new dataset was published into.
    pub slot: SlotId,
    /// Registry timestamp after the swap.
    pub timestamp: u32,
    /// Previously active slot that was drained and removed, if any.
    pub reclaimed: Option<SlotId>,
}

/// One-shot loader bound to a namespace and a set of source paths.
pub struct Store {
    namespace: Namespace,
    paths: SourcePaths,
}

impl Store {
    pub fn new(namespace: Namespace, paths: SourcePaths) -> Self {
        Self { namespace, paths }
    }

    /// Runs the full publication, opening the namespace's barrier itself.
    pub fn run(&self) -> StoreResult<PublishReport> {
        let barrier = ProcessBarrier::open(&self.namespace)?;
        self.run_with_barrier(&barrier)
    }

    /// Runs the full publication against an already opened barrier handle.
    pub fn run_with_barrier(&self, barrier: &ProcessBarrier) -> StoreResult<PublishReport> {
        // Serialize against other loaders for the whole write + swap.
        let pending = barrier.pending_update()?;

        let mut registry = Registry::open_or_create(&self.namespace)?;
        let active = registry.record().active_slot()?;
        let target = active.map(SlotId::other).unwrap_or(SlotId::A);
        info!(active = ?active, target = ?target, "starting publication");

        let mut layout = DatasetLayout::new();
        probe(&self.paths, &mut layout)?;
        layout.log_block_sizes();

        let layout_name = self.namespace.layout_region(target);
        let data_name = self.namespace.data_region(target);
        ensure_region(&layout_name, DatasetLayout::serialized_len())?;
        ensure_region(&data_name, layout.size_of_layout())?;

        let mut layout_view = shm_region::attach_write(&layout_name)?;
        let mut data_view = shm_region::attach_write(&data_name)?;

        layout.write_to(layout_view.as_mut_slice())?;
        populate(&self.paths, &layout, data_view.as_mut_slice())?;
        // Re-resolve every block in read mode before anything is published.
        layout.verify_all_canaries(data_view.as_slice())?;

        drop(data_view);
        drop(layout_view);

        let record = {
            // The swap itself is additionally bracketed by the query mutex.
            let query_guard = barrier.lock_query()?;
            let record = registry.publish(target);
            drop(query_guard);
            record
        };
        drop(pending);

        let reclaimed = match active {
            Some(previous) if self.reclaim(barrier, &registry, previous)? => Some(previous),
            _ => None,
        };

        Ok(PublishReport {
            slot: target,
            timestamp: record.timestamp,
            reclaimed,
        })
    }

    /// Waits for in-flight queries to drain, then removes the retired
    /// slot's regions under the exclusive region lock.
    ///
    /// Runs under a fresh pending-update acquisition and re-reads the
    /// registry before unlinking: a racing loader may have republished into
    /// the slot we are about to reclaim, in which case its regions must be
    /// left alone (that loader reclaims the other slot itself).
    fn reclaim(
        &self,
        barrier: &ProcessBarrier,
        registry: &Registry,
        slot: SlotId,
    ) -> StoreResult<bool> {
        let pending = barrier.pending_update()?;
        barrier.wait_until_drained()?;
        let guard = barrier.exclusive_region()?;
        let removed = if registry.record().active_slot()? == Some(slot) {
            info!(slot = ?slot, "retired slot was republished, leaving it in place");
            false
        } else {
            shm_region::remove(&self.namespace.layout_region(slot))?;
            shm_region::remove(&self.namespace.data_region(slot))?;
            info!(slot = ?slot, "reclaimed retired slot");
            true
        };
        drop(guard);
        drop(pending);
        Ok(removed)
    }
}

/// Creates the named region at `size`, replacing a stale region whose size
/// differs (left over from an older dataset in the same slot).
fn ensure_region(name: &str, size: u64) -> Result<(), RegionError> {
    match shm_region::open_or_create(name, size) {
        Ok(_) => Ok(()),
        Err(RegionError::SizeMismatch { actual, .. }) => {
            warn!(region = name, stale = actual, "replacing stale region");
            shm_region::remove(name)?;
            shm_region::open_or_create(name, size).map(|_| ())
        }
        Err(RegionError::Unsized { .. }) => {
            warn!(region = name, "replacing unsized region");
            shm_region::remove(name)?;
            shm_region::open_or_create(name, size).map(|_| ())
        }
        Err(err) => Err(err),
    }
}
