use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coercion::{CoercedRow, CsvRecord, FieldKind, FieldSpec};

/// The three record kinds making up a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Session,
    SessionText,
}

impl EntityKind {
    /// Conventional file name for this kind inside a data directory.
    pub fn default_file_name(self) -> &'static str {
        match self {
            EntityKind::User => "user.csv",
            EntityKind::Session => "session.csv",
            EntityKind::SessionText => "session_text.csv",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Session => "session",
            EntityKind::SessionText => "session_text",
        };
        f.write_str(name)
    }
}

// ── SessionText ───────────────────────────────────────────────────────────────

/// A single message within a session conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionText {
    #[serde(default)]
    pub id: i64,
    pub uuid: Uuid,
    /// UUID of the parent session.
    pub session_uuid: Uuid,
    /// When the message was sent.
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    /// Original text content.
    #[serde(default)]
    pub text: String,
    /// Translated text content, empty when no translation was produced.
    #[serde(default)]
    pub text_translated: String,
    /// Speaker identifier (0 = user, 1 = AI/system).
    #[serde(default)]
    pub speaker: i64,
    #[serde(default)]
    pub is_input: i64,
    /// Message type identifier, read from the `type` column.
    #[serde(default, rename = "type")]
    pub message_type: i64,
}

impl CsvRecord for SessionText {
    const KIND: EntityKind = EntityKind::SessionText;

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", FieldKind::Int),
        FieldSpec::required("uuid", FieldKind::Uuid),
        FieldSpec::required("session_uuid", FieldKind::Uuid),
        FieldSpec::required("start_at", FieldKind::Timestamp),
        FieldSpec::required("text", FieldKind::Text),
        FieldSpec::required("text_translated", FieldKind::Text),
        FieldSpec::required("speaker", FieldKind::Int),
        FieldSpec::required("is_input", FieldKind::Int),
        FieldSpec::required("type", FieldKind::Int),
    ];

    fn from_row(row: &CoercedRow) -> Option<Self> {
        Some(Self {
            id: row.int("id"),
            uuid: row.uuid("uuid")?,
            session_uuid: row.uuid("session_uuid")?,
            start_at: row.timestamp("start_at"),
            text: row.text("text"),
            text_translated: row.text("text_translated"),
            speaker: row.int("speaker"),
            is_input: row.int("is_input"),
            message_type: row.int("type"),
        })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A phone call session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: i64,
    pub uuid: Uuid,
    /// UUID of the user who initiated the call.
    pub from_user_uuid: Uuid,
    #[serde(default)]
    pub session_type: i64,
    #[serde(default)]
    pub begin_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    /// Call length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub from_language: String,
    #[serde(default)]
    pub to_language: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub is_translation_enabled: bool,
    #[serde(default)]
    pub is_ai_call: bool,
    /// Conversation messages, ascending by `start_at`. Populated by linking.
    #[serde(default)]
    pub messages: Vec<SessionText>,
}

impl Session {
    /// Whether any message was linked to this session.
    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}

impl CsvRecord for Session {
    const KIND: EntityKind = EntityKind::Session;

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::optional("id", FieldKind::Int),
        FieldSpec::required("uuid", FieldKind::Uuid),
        FieldSpec::required("from_user_uuid", FieldKind::Uuid),
        FieldSpec::required("session_type", FieldKind::Int),
        FieldSpec::required("begin_at", FieldKind::Timestamp),
        FieldSpec::required("end_at", FieldKind::Timestamp),
        FieldSpec::required("duration", FieldKind::Float),
        FieldSpec::required("from_language", FieldKind::Text),
        FieldSpec::required("to_language", FieldKind::Text),
        FieldSpec::required("is_paid", FieldKind::Bool),
        FieldSpec::required("is_translation_enabled", FieldKind::Bool),
        FieldSpec::required("is_ai_call", FieldKind::Bool),
    ];

    fn from_row(row: &CoercedRow) -> Option<Self> {
        Some(Self {
            id: row.int("id"),
            uuid: row.uuid("uuid")?,
            from_user_uuid: row.uuid("from_user_uuid")?,
            session_type: row.int("session_type"),
            begin_at: row.timestamp("begin_at"),
            end_at: row.timestamp("end_at"),
            duration: row.float("duration"),
            from_language: row.text("from_language"),
            to_language: row.text("to_language"),
            is_paid: row.bool("is_paid"),
            is_translation_enabled: row.bool("is_translation_enabled"),
            is_ai_call: row.bool("is_ai_call"),
            messages: Vec::new(),
        })
    }
}

// ── User ──────────────────────────────────────────────────────────────────────

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub uuid: Uuid,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub email: String,
    /// Credit balance.
    #[serde(default)]
    pub credits: f64,
    /// Read from the `created_at` column.
    #[serde(default)]
    pub registration_time: Option<DateTime<Utc>>,
    /// Sessions started by this user, ascending by `begin_at`. Populated by
    /// linking.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl User {
    /// UUIDs of this user's sessions, in session order.
    pub fn session_uuids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|s| s.uuid).collect()
    }

    /// Whether any session was linked to this user.
    pub fn has_sessions(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Whether the user registered at or after `cutoff`.
    ///
    /// A user without a parseable registration time never qualifies.
    pub fn registered_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.registration_time.is_some_and(|t| t >= cutoff)
    }
}

impl CsvRecord for User {
    const KIND: EntityKind = EntityKind::User;

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::optional("id", FieldKind::Int),
        FieldSpec::required("uuid", FieldKind::Uuid),
        FieldSpec::required("nick_name", FieldKind::Text),
        FieldSpec::required("email", FieldKind::Text),
        FieldSpec::required("credits", FieldKind::Float),
        FieldSpec::required("created_at", FieldKind::Timestamp),
    ];

    fn from_row(row: &CoercedRow) -> Option<Self> {
        Some(Self {
            id: row.int("id"),
            uuid: row.uuid("uuid")?,
            nick_name: row.text("nick_name"),
            email: row.text("email"),
            credits: row.float("credits"),
            registration_time: row.timestamp("created_at"),
            sessions: Vec::new(),
        })
    }
}

// ── LoadStats ─────────────────────────────────────────────────────────────────

/// Summary counters over a linked dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub users: usize,
    pub sessions: usize,
    pub session_texts: usize,
    pub users_with_sessions: usize,
    pub sessions_with_messages: usize,
}

impl LoadStats {
    /// The counters as `(name, value)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, usize); 5] {
        [
            ("users", self.users),
            ("sessions", self.sessions),
            ("session_texts", self.session_texts),
            ("users_with_sessions", self.users_with_sessions),
            ("sessions_with_messages", self.sessions_with_messages),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
