//! Two-pass reader for the preprocessor's on-disk output.
//!
//! Pass 1 ([`probe`]) opens every source file, validates fingerprints and
//! cross-file counts, and records `(num_entries, entry_size)` for all blocks
//! so the data region can be sized before a single content byte is read.
//! Pass 2 ([`populate`]) re-reads the files and streams their arrays into
//! the freshly created region through write-mode block resolution.
//!
//! Any missing input, checksum mismatch, or size inconsistency between the
//! two passes aborts the load before the registry is touched.

mod error;
mod files;
mod import;

pub use error::{SourceInputError, SourceResult};
pub use import::{populate, probe, EdgeAnnotation, SourcePaths, GRAPH_FINGERPRINT};
