//! The publication record: which slot is live, and at which timestamp.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Wire codes for the slot fields of [`RegistryRecord`].
const SLOT_NONE: u32 = 0;
const SLOT_A: u32 = 1;
const SLOT_B: u32 = 2;

/// One of the two storage slots a dataset can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// The slot a loader writes into while `self` is active.
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    /// Stable numeric suffix used in region names (`layout_1`, `data_2`, …).
    pub fn number(self) -> u32 {
        match self {
            SlotId::A => 1,
            SlotId::B => 2,
        }
    }

    fn code(self) -> u32 {
        match self {
            SlotId::A => SLOT_A,
            SlotId::B => SLOT_B,
        }
    }

    fn from_code(code: u32) -> Option<Option<SlotId>> {
        match code {
            SLOT_NONE => Some(None),
            SLOT_A => Some(Some(SlotId::A)),
            SLOT_B => Some(Some(SlotId::B)),
            _ => None,
        }
    }
}

/// The registry's `layout`/`data` fields disagree about the active slot.
///
/// A well-formed publication always points both fields at the same slot;
/// divergence means the record was mutated outside the publication protocol
/// and the dataset must not be served.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("registry names layout slot code {layout} but data slot code {data}")]
pub struct DivergentRegistry {
    pub layout: u32,
    pub data: u32,
}

/// Record stored in the `current_regions` region.
///
/// Fields are written in declaration order during publication; readers only
/// consult the record from inside their shared-lock critical section.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RegistryRecord {
    pub layout: u32,
    pub data: u32,
    pub timestamp: u32,
}

impl RegistryRecord {
    /// The record before any publication: no slot, timestamp zero.
    pub const EMPTY: RegistryRecord = RegistryRecord {
        layout: SLOT_NONE,
        data: SLOT_NONE,
        timestamp: 0,
    };

    /// Record naming `slot` as active at `timestamp`.
    pub fn published(slot: SlotId, timestamp: u32) -> Self {
        RegistryRecord {
            layout: slot.code(),
            data: slot.code(),
            timestamp,
        }
    }

    /// Decodes the active slot, enforcing the same-slot invariant.
    ///
    /// `Ok(None)` means nothing has been published yet.
    pub fn active_slot(&self) -> Result<Option<SlotId>, DivergentRegistry> {
        let divergent = DivergentRegistry {
            layout: self.layout,
            data: self.data,
        };
        let layout = SlotId::from_code(self.layout).ok_or(divergent)?;
        let data = SlotId::from_code(self.data).ok_or(divergent)?;
        if layout != data {
            return Err(divergent);
        }
        Ok(layout)
    }
}
