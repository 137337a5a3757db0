//! Stable shared-memory object names.
//!
//! Every region the subsystem creates is named `/{prefix}.{role}`. The
//! default prefix is fixed; tests derive a unique prefix per scenario so
//! concurrent suites never share regions.

use crate::registry::SlotId;
use std::fmt;
use thiserror::Error;

/// Maximum name length accepted by `shm_open` on the supported platforms.
const MAX_NAME_LEN: usize = 255;

/// The prefix cannot be turned into valid shm object names.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("namespace prefix {prefix:?} {reason}")]
pub struct InvalidNamespace {
    pub prefix: String,
    reason: &'static str,
}

/// Prefix for every shared-memory object of one deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// The production prefix.
    pub const DEFAULT_PREFIX: &'static str = "waymark";

    /// Creates a namespace from `prefix`, rejecting prefixes the host's shm
    /// naming rules cannot accommodate.
    pub fn try_new(prefix: impl Into<String>) -> Result<Self, InvalidNamespace> {
        let prefix = prefix.into();
        let reason = if prefix.is_empty() {
            Some("must not be empty")
        } else if prefix.len() >= MAX_NAME_LEN - ".current_regions".len() - 1 {
            Some("is too long")
        } else if !prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        {
            Some("must be alphanumeric plus '-', '_', '.'")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(InvalidNamespace { prefix, reason }),
            None => Ok(Self { prefix }),
        }
    }

    /// Creates a namespace from a prefix known to be valid.
    ///
    /// # Panics
    ///
    /// Panics when the prefix is rejected; use [`Namespace::try_new`] for
    /// untrusted input.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::try_new(prefix).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Name of the registry region.
    pub fn registry(&self) -> String {
        format!("/{}.current_regions", self.prefix)
    }

    /// Name of the barrier region holding the named primitives.
    pub fn barrier(&self) -> String {
        format!("/{}.barrier", self.prefix)
    }

    /// Name of `slot`'s layout region.
    pub fn layout_region(&self, slot: SlotId) -> String {
        format!("/{}.layout_{}", self.prefix, slot.number())
    }

    /// Name of `slot`'s data region.
    pub fn data_region(&self, slot: SlotId) -> String {
        format!("/{}.data_{}", self.prefix, slot.number())
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}
