//! JSON projection of a [`Dataset`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};
use sessions_core::error::{LoaderError, Result};

use crate::dataset::Dataset;

/// Which top-level keys an export carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSelection {
    /// The nested user tree.
    pub users: bool,
    /// Linked sessions in file order, with their messages.
    pub sessions: bool,
    /// Linked messages in file order.
    pub session_texts: bool,
    pub stats: bool,
    pub report: bool,
}

impl ExportSelection {
    pub const NAMES: [&'static str; 5] = ["users", "sessions", "session_texts", "stats", "report"];

    pub fn all() -> Self {
        Self {
            users: true,
            sessions: true,
            session_texts: true,
            stats: true,
            report: true,
        }
    }

    /// Build a selection from section names as given on the command line.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut selection = Self::default();
        for name in names {
            match name.as_ref().trim() {
                "users" => selection.users = true,
                "sessions" => selection.sessions = true,
                "session_texts" => selection.session_texts = true,
                "stats" => selection.stats = true,
                "report" => selection.report = true,
                other => {
                    return Err(LoaderError::Config(format!(
                        "unknown export section '{}' (expected one of {})",
                        other,
                        Self::NAMES.join(", ")
                    )))
                }
            }
        }
        Ok(selection)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Build the JSON object for `selection`. Keys that are not selected are
/// absent rather than null.
pub fn to_json_value(dataset: &Dataset, selection: ExportSelection) -> Result<Value> {
    let mut root = Map::new();
    if selection.users {
        root.insert("users".into(), serde_json::to_value(dataset.users())?);
    }
    if selection.sessions {
        let sessions: Vec<_> = dataset.sessions().collect();
        root.insert("sessions".into(), serde_json::to_value(sessions)?);
    }
    if selection.session_texts {
        let texts: Vec<_> = dataset.session_texts().collect();
        root.insert("session_texts".into(), serde_json::to_value(texts)?);
    }
    if selection.stats {
        root.insert("stats".into(), serde_json::to_value(dataset.stats())?);
    }
    if selection.report {
        root.insert("report".into(), serde_json::to_value(dataset.report())?);
    }
    Ok(Value::Object(root))
}

/// Write the selected sections as pretty JSON to `writer`.
pub fn export_json<W: Write>(dataset: &Dataset, selection: ExportSelection, mut writer: W) -> Result<()> {
    let value = to_json_value(dataset, selection)?;
    serde_json::to_writer_pretty(&mut writer, &value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write the selected sections to `path`, replacing any existing file.
pub fn export_json_file(dataset: &Dataset, selection: ExportSelection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    export_json(dataset, selection, BufWriter::new(file))?;
    tracing::info!("Exported dataset to {}", path.display());
    Ok(())
}
