//! Data layer for the sessions loader.
//!
//! Reads the user, session and session text CSV files, applies the
//! registration window, links the three levels into one owning tree and
//! exposes it as a [`Dataset`] with UUID lookups and JSON export.

pub mod dataset;
pub mod export;
pub mod linker;
pub mod loader;
pub mod reader;

pub use dataset::{Dataset, FileReport, LoadReport};
pub use export::ExportSelection;
pub use loader::{DataLoader, LoaderOptions};
pub use sessions_core as core;
