//! Per-mode send state machine bridging user input, the AI session and
//! the history cache.
//!
//! Each mode is either `Idle` or `Sending`. A submission appends the user
//! message and an empty model placeholder, then every fragment of the
//! reply is concatenated onto that placeholder and published as a new
//! snapshot. Completion returns the mode to `Idle`.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info};

use crate::ai::{ChatBackend, ChatSession, FragmentStream};
use crate::history::{Confirm, HistoryCache, HistoryStore};
use crate::mode::Mode;
use crate::state::{ConversationHistory, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Sending,
}

/// An accepted user turn whose reply has not been streamed yet
pub struct Submission {
    pub mode: Mode,
    pub reply_id: String,
    pub text: String,
    pub session: Arc<dyn ChatSession>,
}

impl Submission {
    /// Start the request; fragments arrive in order on the returned stream
    pub fn fragments(&self) -> FragmentStream {
        self.session.send_message_stream(&self.text)
    }
}

struct ActiveChat {
    mode: Mode,
    session: Arc<dyn ChatSession>,
}

pub struct SessionController<S> {
    cache: HistoryCache<S>,
    backend: Arc<dyn ChatBackend>,
    active: Option<ActiveChat>,
    teacher: SendState,
    astrologer: SendState,
}

impl<S: HistoryStore> SessionController<S> {
    pub fn new(store: S, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            cache: HistoryCache::open(store),
            backend,
            active: None,
            teacher: SendState::Idle,
            astrologer: SendState::Idle,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        self.cache.history()
    }

    pub fn messages(&self, mode: Mode) -> &[Message] {
        self.cache.history().sequence(mode)
    }

    pub fn store(&self) -> &S {
        self.cache.store()
    }

    pub fn active_mode(&self) -> Option<Mode> {
        self.active.as_ref().map(|chat| chat.mode)
    }

    pub fn state(&self, mode: Mode) -> SendState {
        match mode {
            Mode::Teacher => self.teacher,
            Mode::Astrologer => self.astrologer,
        }
    }

    fn set_state(&mut self, mode: Mode, state: SendState) {
        match mode {
            Mode::Teacher => self.teacher = state,
            Mode::Astrologer => self.astrologer = state,
        }
    }

    /// Open the chat for `mode` with a fresh session
    pub fn enter(&mut self, mode: Mode) {
        let session = self.backend.open_session(mode.config().system_instruction);
        info!("Entered {} chat", mode);
        self.active = Some(ActiveChat { mode, session });
    }

    /// Drop the active session. A reply still streaming keeps landing in its own mode.
    pub fn leave(&mut self) {
        if let Some(chat) = self.active.take() {
            info!("Left {} chat", chat.mode);
        }
    }

    fn publish_sequence(&mut self, mode: Mode, messages: Vec<Message>) {
        let next = self.cache.history().clone().replace_sequence(mode, messages);
        self.cache.publish(next);
    }

    /// Accept `text` for the active mode.
    ///
    /// Returns `None` (and changes nothing) when no chat is open, the text
    /// is blank, or the mode is already sending.
    pub fn begin_submit(&mut self, text: &str) -> Option<Submission> {
        let (mode, session) = match &self.active {
            Some(chat) => (chat.mode, Arc::clone(&chat.session)),
            None => return None,
        };

        if text.trim().is_empty() {
            debug!("Ignoring blank submission");
            return None;
        }
        if self.state(mode) == SendState::Sending {
            debug!("Ignoring submission while {} is sending", mode);
            return None;
        }

        let mut messages = self.messages(mode).to_vec();
        messages.push(Message::user(text));
        self.publish_sequence(mode, messages.clone());

        let reply = Message::placeholder();
        let reply_id = reply.id.clone();
        messages.push(reply);
        self.publish_sequence(mode, messages);

        self.set_state(mode, SendState::Sending);

        Some(Submission {
            mode,
            reply_id,
            text: text.to_string(),
            session,
        })
    }

    /// Concatenate `fragment` onto the pending reply `reply_id` in `mode`.
    ///
    /// Returns false if the reply is gone (history cleared mid-stream) or
    /// the mode is no longer sending.
    pub fn apply_fragment(&mut self, mode: Mode, reply_id: &str, fragment: &str) -> bool {
        if self.state(mode) != SendState::Sending {
            debug!("Dropping fragment for idle {} chat", mode);
            return false;
        }

        let sequence = self.messages(mode);
        // Newest first: the live reply is always near the end
        let Some(pos) = sequence.iter().rposition(|m| m.id == reply_id) else {
            debug!("Reply {} no longer in {} history", reply_id, mode);
            return false;
        };
        let Some(updated) = sequence[pos].appended(fragment) else {
            return false;
        };

        let mut messages = sequence.to_vec();
        messages[pos] = updated;
        self.publish_sequence(mode, messages);
        true
    }

    /// The reply stream for `mode` has ended
    pub fn complete(&mut self, mode: Mode) {
        debug!("{} reply complete", mode);
        self.set_state(mode, SendState::Idle);
    }

    /// Submit `text` and stream the whole reply into history
    pub async fn submit(&mut self, text: &str) -> bool {
        let Some(submission) = self.begin_submit(text) else {
            return false;
        };

        let mut fragments = submission.fragments();
        while let Some(fragment) = fragments.next().await {
            self.apply_fragment(submission.mode, &submission.reply_id, &fragment);
        }

        self.complete(submission.mode);
        true
    }

    /// Empty the active mode's history once `confirm` agrees
    pub fn clear(&mut self, confirm: &dyn Confirm) -> bool {
        match self.active_mode() {
            Some(mode) => self.cache.clear(mode, confirm),
            None => false,
        }
    }
}
