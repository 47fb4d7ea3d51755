use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while loading a session dataset.
///
/// Only file-level defects surface here. Row-level defects (bad UUID, bad
/// number, bad boolean token) are absorbed by the coercion layer and counted.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV header lacks one or more columns the entity requires.
    #[error("{path} is missing required columns: {}", columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// The CSV structure itself could not be decoded.
    #[error("Failed to decode CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A JSON document could not be parsed or written.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the sessions crates.
pub type Result<T> = std::result::Result<T, LoaderError>;
