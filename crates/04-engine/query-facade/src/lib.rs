//! Reader-side access to the published dataset.
//!
//! A query server holds one [`SharedDataset`] for its lifetime. Every
//! request calls [`SharedDataset::begin_query`], which registers the query
//! with the process barrier (shared region lock + in-flight counter),
//! observes the registry, and lazily re-attaches when a newer dataset has
//! been published. The returned [`QuerySnapshot`] pins one dataset for the
//! request's duration; its [`DataFacade`] views cannot outlive it.

mod dataset;
mod error;
mod facade;

pub use dataset::{QuerySnapshot, SharedDataset};
pub use error::{FacadeError, FacadeResult};
pub use facade::DataFacade;
