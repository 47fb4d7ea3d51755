//! Foreign-key linking of sessions under users and messages under sessions.
//!
//! Everything here is a pure function of its inputs: no I/O, no clock.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sessions_core::models::{Session, SessionText, User};
use tracing::debug;
use uuid::Uuid;

use crate::dataset::{Dataset, SessionPos, TextPos};

/// Output of [`link`]: the dataset plus how many children were dropped.
#[derive(Debug, Clone)]
pub struct Linked {
    pub dataset: Dataset,
    pub orphaned_sessions: usize,
    pub orphaned_texts: usize,
}

/// Keep users registered at or after `cutoff`, in file order.
///
/// Returns the retained users and the number dropped. Users without a
/// registration time are dropped.
pub fn filter_registered(users: Vec<User>, cutoff: DateTime<Utc>) -> (Vec<User>, usize) {
    let total = users.len();
    let kept: Vec<User> = users
        .into_iter()
        .filter(|u| u.registered_since(cutoff))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Order optional timestamps ascending with absent values last.
pub fn cmp_absent_last(a: &Option<DateTime<Utc>>, b: &Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Attach `sessions` to `users` and `texts` to the linked sessions.
///
/// * Users are indexed by UUID; a repeated UUID resolves to the later user.
/// * A session whose `from_user_uuid` is not indexed is dropped.
/// * Linked sessions are indexed by UUID (later wins), then texts are
///   attached through that index; unmatched texts are dropped.
/// * Each user's sessions are stably sorted by `begin_at`, each session's
///   messages by `start_at`, absent timestamps last.
pub fn link(mut users: Vec<User>, sessions: Vec<Session>, texts: Vec<SessionText>) -> Linked {
    let user_index: HashMap<Uuid, usize> = users
        .iter()
        .enumerate()
        .map(|(i, u)| (u.uuid, i))
        .collect();

    // ── Sessions → users ──────────────────────────────────────────────────────
    let mut by_user: Vec<Vec<(usize, Session)>> = (0..users.len()).map(|_| Vec::new()).collect();
    let mut linked_sessions = 0usize;
    let mut orphaned_sessions = 0usize;

    for session in sessions {
        match user_index.get(&session.from_user_uuid) {
            Some(&ui) => {
                by_user[ui].push((linked_sessions, session));
                linked_sessions += 1;
            }
            None => orphaned_sessions += 1,
        }
    }

    let mut session_order = vec![SessionPos::default(); linked_sessions];
    for (ui, mut group) in by_user.into_iter().enumerate() {
        group.sort_by(|a, b| cmp_absent_last(&a.1.begin_at, &b.1.begin_at));
        let owned = &mut users[ui].sessions;
        for (si, (ordinal, session)) in group.into_iter().enumerate() {
            session_order[ordinal] = SessionPos {
                user: ui,
                session: si,
            };
            owned.push(session);
        }
    }

    let mut session_index: HashMap<Uuid, SessionPos> = HashMap::with_capacity(linked_sessions);
    for &pos in &session_order {
        session_index.insert(users[pos.user].sessions[pos.session].uuid, pos);
    }

    // ── Texts → sessions ──────────────────────────────────────────────────────
    let mut by_session: HashMap<SessionPos, Vec<(usize, SessionText)>> = HashMap::new();
    let mut linked_texts = 0usize;
    let mut orphaned_texts = 0usize;

    for text in texts {
        match session_index.get(&text.session_uuid) {
            Some(&pos) => {
                by_session.entry(pos).or_default().push((linked_texts, text));
                linked_texts += 1;
            }
            None => orphaned_texts += 1,
        }
    }

    let mut text_order = vec![TextPos::default(); linked_texts];
    for (pos, mut group) in by_session {
        group.sort_by(|a, b| cmp_absent_last(&a.1.start_at, &b.1.start_at));
        let owned = &mut users[pos.user].sessions[pos.session].messages;
        for (mi, (ordinal, text)) in group.into_iter().enumerate() {
            text_order[ordinal] = TextPos {
                user: pos.user,
                session: pos.session,
                message: mi,
            };
            owned.push(text);
        }
    }

    debug!(
        "Linked {} sessions ({} orphaned) and {} texts ({} orphaned) under {} users",
        linked_sessions,
        orphaned_sessions,
        linked_texts,
        orphaned_texts,
        users.len()
    );

    Linked {
        dataset: Dataset {
            users,
            session_order,
            text_order,
            user_index,
            session_index,
            report: Default::default(),
        },
        orphaned_sessions,
        orphaned_texts,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
