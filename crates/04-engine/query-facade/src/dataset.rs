//! Snapshot management: registry observation and lazy re-attachment.

use crate::error::{FacadeError, FacadeResult};
use crate::facade::DataFacade;
use dataset_layout::{DatasetLayout, LayoutError, Namespace, SlotId};
use parking_lot::Mutex;
use shm_barrier::{ProcessBarrier, QueryTicket, RegistryView};
use shm_region::ReadRegion;
use std::sync::Arc;
use tracing::{debug, warn};

/// One attached `(slot, timestamp)` dataset: parsed layout plus the data
/// region mapping. Kept alive by `Arc` until the last snapshot using it
/// finishes, so reclamation of the name never invalidates a running query.
#[derive(Debug)]
struct Attachment {
    slot: SlotId,
    timestamp: u32,
    layout: DatasetLayout,
    data: ReadRegion,
}

impl Attachment {
    /// Attaches both regions of `slot` and verifies the dataset end to end:
    /// layout version first, then every block's canary pair.
    fn attach(namespace: &Namespace, slot: SlotId, timestamp: u32) -> FacadeResult<Self> {
        let layout_region = shm_region::attach_read(&namespace.layout_region(slot))?;
        let layout = DatasetLayout::read_from(layout_region.as_slice())?;
        let data = shm_region::attach_read(&namespace.data_region(slot))?;
        layout.verify_all_canaries(data.as_slice())?;
        debug!(slot = ?slot, timestamp, "attached dataset");
        Ok(Self {
            slot,
            timestamp,
            layout,
            data,
        })
    }
}

/// Mutable per-process reader state, all behind one short-lived lock.
#[derive(Default)]
struct ReaderState {
    registry: Option<RegistryView>,
    attachment: Option<Arc<Attachment>>,
    /// A `(slot, timestamp)` that failed verification; retried only after
    /// the registry advances past it.
    poisoned: Option<((SlotId, u32), LayoutError)>,
}

/// Long-lived reader handle over one namespace.
pub struct SharedDataset {
    namespace: Namespace,
    barrier: Arc<ProcessBarrier>,
    state: Mutex<ReaderState>,
}

impl SharedDataset {
    /// Opens the namespace's barrier and prepares a reader handle.
    ///
    /// Cheap: no dataset is attached until the first query.
    pub fn open(namespace: Namespace) -> FacadeResult<Self> {
        let barrier = Arc::new(ProcessBarrier::open(&namespace)?);
        Ok(Self::with_barrier(namespace, barrier))
    }

    /// Builds a reader handle around an existing barrier handle.
    pub fn with_barrier(namespace: Namespace, barrier: Arc<ProcessBarrier>) -> Self {
        Self {
            namespace,
            barrier,
            state: Mutex::new(ReaderState::default()),
        }
    }

    /// The barrier this reader registers queries with.
    pub fn barrier(&self) -> &ProcessBarrier {
        &self.barrier
    }

    /// Enters one query's critical section.
    ///
    /// Registers the query (shared region lock + counter), observes the
    /// registry, and re-attaches if a newer dataset was published since the
    /// last request. On any error the ticket is released before returning,
    /// leaving the counter consistent.
    pub fn begin_query(&self) -> FacadeResult<QuerySnapshot<'_>> {
        let ticket = self.barrier.register_query()?;

        let record = {
            let mut state = self.state.lock();
            if state.registry.is_none() {
                state.registry = RegistryView::open(&self.namespace)?;
            }
            match &state.registry {
                Some(view) => view.record(),
                None => return Err(FacadeError::NotLoaded),
            }
        };

        let slot = record.active_slot()?.ok_or(FacadeError::NotLoaded)?;
        let key = (slot, record.timestamp);

        let attachment = {
            let mut state = self.state.lock();

            if let Some((poisoned_key, err)) = &state.poisoned {
                if *poisoned_key == key {
                    return Err(FacadeError::Corrupt(err.clone()));
                }
                state.poisoned = None;
            }

            match &state.attachment {
                Some(current) if current.slot == slot && current.timestamp == record.timestamp => {
                    Arc::clone(current)
                }
                _ => match Attachment::attach(&self.namespace, slot, record.timestamp) {
                    Ok(fresh) => {
                        let fresh = Arc::new(fresh);
                        state.attachment = Some(Arc::clone(&fresh));
                        fresh
                    }
                    Err(FacadeError::Corrupt(err)) => {
                        // Keep the last good attachment; do not retry this
                        // publication until the registry moves on.
                        warn!(slot = ?slot, timestamp = record.timestamp, error = %err, "dataset failed verification");
                        state.poisoned = Some((key, err.clone()));
                        return Err(FacadeError::Corrupt(err));
                    }
                    Err(other) => return Err(other),
                },
            }
        };

        Ok(QuerySnapshot {
            attachment,
            _ticket: ticket,
        })
    }
}

/// A pinned dataset for the duration of one query.
///
/// Holds the query ticket; dropping the snapshot is the reader's exit
/// protocol (detach-if-last, decrement, signal drained, release shared
/// lock) and runs on every exit path.
#[derive(Debug)]
pub struct QuerySnapshot<'d> {
    // Field order is drop order: views detach before the ticket releases
    // the shared lock.
    attachment: Arc<Attachment>,
    _ticket: QueryTicket<'d>,
}

impl QuerySnapshot<'_> {
    /// Slot this query is pinned to; constant for the snapshot's lifetime.
    pub fn slot(&self) -> SlotId {
        self.attachment.slot
    }

    /// Publication timestamp this query observes.
    pub fn timestamp(&self) -> u32 {
        self.attachment.timestamp
    }

    /// Typed views over the pinned dataset.
    ///
    /// The facade borrows from the snapshot, so no view can escape the
    /// query's critical section.
    pub fn facade(&self) -> DataFacade<'_> {
        DataFacade::new(&self.attachment.layout, self.attachment.data.as_slice())
    }
}
