//! Error surface for source-file import.

use dataset_layout::LayoutError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias for import operations.
pub type SourceResult<T, E = SourceInputError> = Result<T, E>;

/// Errors raised while probing or importing source files.
///
/// Every variant aborts the load; the loader surfaces them to the operator
/// without mutating the registry.
#[derive(Debug, Error)]
pub enum SourceInputError {
    /// A required input file does not exist.
    #[error("required {role} input missing at {path}")]
    Missing { role: &'static str, path: PathBuf },

    /// A fingerprint or content checksum did not match.
    #[error("{role} input {path} checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    Checksum {
        role: &'static str,
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// Counts disagree, within a file, across files, or between passes.
    #[error("{role} input {path} size mismatch: {detail}")]
    SizeMismatch {
        role: &'static str,
        path: PathBuf,
        detail: String,
    },

    /// The host failed an I/O operation.
    #[error("reading {role} input {path} failed: {source}")]
    Io {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sized layout and the region handed to pass 2 disagree.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}
