//! Core types for the sessions loader.
//!
//! Record models, the row coercion layer they share, timestamp handling,
//! settings and the error taxonomy. Nothing in here touches the filesystem
//! except the config file helpers in [`settings`].

pub mod coercion;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{LoaderError, Result};
pub use models::{EntityKind, LoadStats, Session, SessionText, User};
