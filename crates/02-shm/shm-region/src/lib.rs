//! Named shared-memory regions.
//!
//! A uniform facade over the host's POSIX shm mechanism: regions are created
//! by stable name with a fixed size, attached read-only or read-write as a
//! whole-region mapping, and unlinked by name. Names outlive processes;
//! unlinking a name leaves existing mappings valid until the last detach.

mod error;
mod region;

pub use error::{RegionError, RegionResult};
pub use region::{attach_read, attach_write, exists, open_or_create, remove, ReadRegion, WriteRegion};
