//! The linked, read-only result of a load.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sessions_core::models::{EntityKind, LoadStats, Session, SessionText, User};
use uuid::Uuid;

// ── Positions ─────────────────────────────────────────────────────────────────

/// Where a session lives inside the owning tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) struct SessionPos {
    pub user: usize,
    pub session: usize,
}

/// Where a message lives inside the owning tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TextPos {
    pub user: usize,
    pub session: usize,
    pub message: usize,
}

// ── LoadReport ────────────────────────────────────────────────────────────────

/// Parse outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub kind: EntityKind,
    pub path: PathBuf,
    pub parsed: usize,
    pub skipped: usize,
}

/// Diagnostics gathered while building a [`Dataset`].
///
/// None of these counters affect the dataset contents; orphans are dropped
/// whether or not anyone reads this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
    /// Reference time the registration window was measured from.
    pub reference_time: Option<DateTime<Utc>>,
    pub registration_days: u32,
    /// Parsed users dropped by the registration window.
    pub users_outside_window: usize,
    /// Parsed sessions whose `from_user_uuid` matched no retained user.
    pub orphaned_sessions: usize,
    /// Parsed texts whose `session_uuid` matched no linked session.
    pub orphaned_texts: usize,
    pub load_time_seconds: f64,
    pub link_time_seconds: f64,
}

impl LoadReport {
    /// Skipped-row count for `kind`, or 0 if that file was not loaded.
    pub fn skipped(&self, kind: EntityKind) -> usize {
        self.files
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.skipped)
            .sum()
    }

    /// Skipped rows across all files.
    pub fn total_skipped(&self) -> usize {
        self.files.iter().map(|f| f.skipped).sum()
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// Users owning their sessions owning their messages, plus UUID indexes and
/// file-order views over the two child levels.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub(crate) users: Vec<User>,
    /// Linked sessions in file order.
    pub(crate) session_order: Vec<SessionPos>,
    /// Linked messages in file order.
    pub(crate) text_order: Vec<TextPos>,
    pub(crate) user_index: HashMap<Uuid, usize>,
    pub(crate) session_index: HashMap<Uuid, SessionPos>,
    pub(crate) report: LoadReport,
}

impl Dataset {
    /// Retained users in file order, each with its sessions attached.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Linked sessions in file order, each with its messages attached.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> + '_ {
        self.session_order.iter().map(move |p| self.session_at(*p))
    }

    /// Linked messages in file order.
    pub fn session_texts(&self) -> impl Iterator<Item = &SessionText> + '_ {
        self.text_order
            .iter()
            .map(move |p| &self.users[p.user].sessions[p.session].messages[p.message])
    }

    /// O(1) user lookup. With repeated UUIDs the later row wins.
    pub fn user_by_uuid(&self, uuid: &Uuid) -> Option<&User> {
        self.user_index.get(uuid).map(|&i| &self.users[i])
    }

    /// O(1) session lookup. With repeated UUIDs the later row wins.
    pub fn session_by_uuid(&self, uuid: &Uuid) -> Option<&Session> {
        self.session_index.get(uuid).map(|&p| self.session_at(p))
    }

    /// The user a session belongs to, resolved through the user index.
    pub fn owner_of(&self, session: &Session) -> Option<&User> {
        self.user_by_uuid(&session.from_user_uuid)
    }

    /// The session a message belongs to, resolved through the session index.
    pub fn session_of(&self, text: &SessionText) -> Option<&Session> {
        self.session_by_uuid(&text.session_uuid)
    }

    pub fn stats(&self) -> LoadStats {
        LoadStats {
            users: self.users.len(),
            sessions: self.session_order.len(),
            session_texts: self.text_order.len(),
            users_with_sessions: self.users.iter().filter(|u| u.has_sessions()).count(),
            sessions_with_messages: self.sessions().filter(|s| s.has_messages()).count(),
        }
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    fn session_at(&self, p: SessionPos) -> &Session {
        &self.users[p.user].sessions[p.session]
    }
}
