//! The publication point: reading and swapping the active-slot record.

use dataset_layout::{Namespace, RegistryRecord, SlotId};
use shm_region::{ReadRegion, RegionError, RegionResult, WriteRegion};
use std::mem;
use tracing::info;

/// Writable registry handle, held by the loader.
///
/// Mutations happen only while the caller holds the pending-update mutex;
/// the publication write itself is additionally bracketed by the query
/// mutex, mirroring the publication step of the swap protocol.
pub struct Registry {
    view: WriteRegion,
}

impl Registry {
    /// Opens the namespace's registry, creating it (as the empty record) on
    /// the first successful load.
    pub fn open_or_create(namespace: &Namespace) -> RegionResult<Self> {
        let name = namespace.registry();
        let size = mem::size_of::<RegistryRecord>() as u64;
        // A fresh region is zero-filled, which is exactly RegistryRecord::EMPTY.
        shm_region::open_or_create(&name, size)?;
        let view = shm_region::attach_write(&name)?;
        Ok(Self { view })
    }

    /// The current record.
    pub fn record(&self) -> RegistryRecord {
        self.view.read_prefix()
    }

    /// Publishes `slot` at the next timestamp and returns the new record.
    ///
    /// The record's fields are written in declaration order (layout, data,
    /// timestamp); readers never observe the intermediate state because they
    /// only read inside their shared-lock critical section.
    pub fn publish(&mut self, slot: SlotId) -> RegistryRecord {
        let previous = self.record();
        let next = RegistryRecord::published(slot, previous.timestamp + 1);
        self.view.write_prefix(&next);
        info!(
            slot = ?slot,
            timestamp = next.timestamp,
            "published dataset"
        );
        next
    }
}

/// Read-only registry handle, held by readers.
pub struct RegistryView {
    view: ReadRegion,
}

impl RegistryView {
    /// Attaches to the namespace's registry.
    ///
    /// Returns `Ok(None)` while no loader has ever run (the region does not
    /// exist yet); readers surface that as "dataset not loaded".
    pub fn open(namespace: &Namespace) -> RegionResult<Option<Self>> {
        match shm_region::attach_read(&namespace.registry()) {
            Ok(view) => Ok(Some(Self { view })),
            Err(RegionError::Missing { .. }) | Err(RegionError::Unsized { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The current record.
    pub fn record(&self) -> RegistryRecord {
        self.view.read_prefix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScratchNamespace(Namespace);

    impl ScratchNamespace {
        fn new() -> Self {
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            Self(Namespace::new(format!(
                "wmk-reg-{}-{n}",
                std::process::id()
            )))
        }
    }

    impl Drop for ScratchNamespace {
        fn drop(&mut self) {
            let _ = shm_region::remove(&self.0.registry());
        }
    }

    #[test]
    fn fresh_registry_reads_empty() {
        let scratch = ScratchNamespace::new();
        let registry = Registry::open_or_create(&scratch.0).expect("create registry");
        assert_eq!(registry.record(), RegistryRecord::EMPTY);
    }

    #[test]
    fn view_of_missing_registry_is_none() {
        let scratch = ScratchNamespace::new();
        assert!(RegistryView::open(&scratch.0)
            .expect("probe registry")
            .is_none());
    }

    #[test]
    fn publications_alternate_and_count_up() {
        let scratch = ScratchNamespace::new();
        let mut registry = Registry::open_or_create(&scratch.0).expect("create registry");
        let view = RegistryView::open(&scratch.0)
            .expect("open view")
            .expect("registry exists");

        let mut slot = SlotId::A;
        for expected_ts in 1..=6u32 {
            let record = registry.publish(slot);
            assert_eq!(record.timestamp, expected_ts);
            assert_eq!(record.active_slot(), Ok(Some(slot)));
            // A reader attached to the same region observes the swap.
            assert_eq!(view.record(), record);
            slot = slot.other();
        }
    }

    #[test]
    fn record_persists_across_handles() {
        let scratch = ScratchNamespace::new();
        {
            let mut registry = Registry::open_or_create(&scratch.0).expect("create");
            registry.publish(SlotId::A);
        }
        let registry = Registry::open_or_create(&scratch.0).expect("reopen");
        assert_eq!(registry.record().active_slot(), Ok(Some(SlotId::A)));
        assert_eq!(registry.record().timestamp, 1);
    }
}
