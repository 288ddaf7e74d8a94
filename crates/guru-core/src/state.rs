//! UI-agnostic conversation state types
//!
//! These structures are shared by every front end (TUI, headless CLI) and
//! are what gets persisted between runs. The serialized shape is
//! `{"teacher": [Message...], "astrologer": [Message...]}`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single entry in a mode's conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond clock ids, bumped so two messages created in the same
/// millisecond never collide.
fn next_id(now_ms: i64) -> i64 {
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let id = now_ms.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, id, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return id,
            Err(current) => last = current,
        }
    }
}

/// Keep new ids above every numeric id already in `history`, so a reply
/// id never matches a message loaded from an earlier run.
pub(crate) fn reserve_ids_after(history: &ConversationHistory) {
    let highest = Mode::all()
        .into_iter()
        .flat_map(|mode| history.sequence(mode))
        .filter_map(|m| m.id.parse::<i64>().ok())
        .max();
    if let Some(highest) = highest {
        LAST_ID.fetch_max(highest, Ordering::Relaxed);
    }
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        Self {
            id: next_id(now_ms).to_string(),
            role,
            content,
            // truncate to what the persisted format can hold
            timestamp: DateTime::from_timestamp_millis(now_ms).unwrap_or(now),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// An empty model message, filled in as fragments arrive
    pub fn placeholder() -> Self {
        Self::new(Role::Model, String::new())
    }

    /// A pending reply is a model message that has not received any text yet
    pub fn is_pending(&self) -> bool {
        self.role == Role::Model && self.content.is_empty()
    }

    /// Copy of this message with `fragment` appended.
    ///
    /// User messages are immutable after creation, so this returns `None` for them.
    pub fn appended(&self, fragment: &str) -> Option<Message> {
        if self.role != Role::Model {
            return None;
        }
        let mut next = self.clone();
        next.content.push_str(fragment);
        Some(next)
    }
}

/// Both mode conversations. Insertion order is chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    #[serde(default)]
    pub teacher: Vec<Message>,
    #[serde(default)]
    pub astrologer: Vec<Message>,
}

impl ConversationHistory {
    pub fn sequence(&self, mode: Mode) -> &[Message] {
        match mode {
            Mode::Teacher => &self.teacher,
            Mode::Astrologer => &self.astrologer,
        }
    }

    /// Replace one mode's sequence, leaving the other untouched
    pub fn replace_sequence(mut self, mode: Mode, messages: Vec<Message>) -> Self {
        match mode {
            Mode::Teacher => self.teacher = messages,
            Mode::Astrologer => self.astrologer = messages,
        }
        self
    }

    pub fn clear_sequence(self, mode: Mode) -> Self {
        self.replace_sequence(mode, Vec::new())
    }

    pub fn total_messages(&self) -> usize {
        self.teacher.len() + self.astrologer.len()
    }
}
