use futures_util::StreamExt;
use guru_core::{HistoryStore, Mode, SendState, SessionController};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Chat(Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub type Controller = SessionController<Box<dyn HistoryStore>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Home screen
    pub home_state: ListState,

    // Chat input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // Chat transcript
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub show_clear_confirm: bool,

    /// "Gemini: gemini-3-flash-preview" and the like, shown in the chat title
    pub provider_label: String,

    pub controller: Controller,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        controller: Controller,
        events: UnboundedSender<AppEvent>,
        provider_label: String,
    ) -> Self {
        let mut home_state = ListState::default();
        home_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::Home,
            input_mode: InputMode::Normal,
            home_state,
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            show_clear_confirm: false,
            provider_label,
            controller,
            events,
        }
    }

    pub fn current_mode(&self) -> Option<Mode> {
        match self.screen {
            Screen::Home => None,
            Screen::Chat(mode) => Some(mode),
        }
    }

    // Home navigation
    pub fn selected_mode(&self) -> Mode {
        let modes = Mode::all();
        let i = self.home_state.selected().unwrap_or(0).min(modes.len() - 1);
        modes[i]
    }

    pub fn home_down(&mut self) {
        let len = Mode::all().len();
        let i = self.home_state.selected().unwrap_or(0);
        self.home_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn home_up(&mut self) {
        let i = self.home_state.selected().unwrap_or(0);
        self.home_state.select(Some(i.saturating_sub(1)));
    }

    /// Switch to `mode`'s chat with a fresh AI session
    pub fn open_chat(&mut self, mode: Mode) {
        self.controller.enter(mode);
        self.screen = Screen::Chat(mode);
        self.input_mode = InputMode::Editing;
        self.show_clear_confirm = false;
        self.scroll_chat_to_bottom();
    }

    /// Back to the home screen. The draft input is discarded.
    pub fn back_home(&mut self) {
        self.controller.leave();
        self.screen = Screen::Home;
        self.input_mode = InputMode::Normal;
        self.show_clear_confirm = false;
        self.input.clear();
        self.input_cursor = 0;
        self.chat_scroll = 0;
    }

    pub fn is_waiting(&self, mode: Mode) -> bool {
        self.controller.state(mode) == SendState::Sending
    }

    /// Submit the input box. The box keeps its text if the submission is refused.
    pub fn submit_input(&mut self) {
        let Some(submission) = self.controller.begin_submit(&self.input) else {
            return;
        };

        self.input.clear();
        self.input_cursor = 0;
        self.scroll_chat_to_bottom();

        // Stream the reply in the background; fragments come back as events
        let tx = self.events.clone();
        tokio::spawn(async move {
            let mut fragments = submission.fragments();
            while let Some(text) = fragments.next().await {
                let event = AppEvent::Fragment {
                    mode: submission.mode,
                    reply_id: submission.reply_id.clone(),
                    text,
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            let _ = tx.send(AppEvent::StreamDone(submission.mode));
        });
    }

    pub fn on_fragment(&mut self, mode: Mode, reply_id: &str, text: &str) {
        let applied = self.controller.apply_fragment(mode, reply_id, text);
        if applied && self.current_mode() == Some(mode) {
            self.scroll_chat_to_bottom();
        }
    }

    pub fn on_stream_done(&mut self, mode: Mode) {
        self.controller.complete(mode);
    }

    // Clear history flow
    pub fn request_clear(&mut self) {
        if self.current_mode().is_some() {
            self.show_clear_confirm = true;
        }
    }

    pub fn confirm_clear(&mut self, yes: bool) {
        self.show_clear_confirm = false;
        if self.controller.clear(&move |_: &str| yes) {
            self.chat_scroll = 0;
        } else {
            debug!("Clear dismissed");
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if Mode::all().iter().any(|&mode| self.is_waiting(mode)) {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self) {
        if self.chat_scroll < self.max_chat_scroll() {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll chat to bottom so the latest reply (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.transcript_lines().saturating_sub(visible_height)
    }

    /// Rendered height of the current transcript, counting wrapped lines
    fn transcript_lines(&self) -> u16 {
        let Some(mode) = self.current_mode() else {
            return 0;
        };

        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;

        for msg in self.controller.messages(mode) {
            total_lines += 1; // Role line ("You:" or the persona)
            if msg.content.is_empty() {
                total_lines += 1; // "Thinking..." or the empty reply
            }
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1; // Empty line still takes one line
                } else {
                    total_lines += (char_count / wrap_width) + 1;
                }
            }
            total_lines += 1; // Blank line after message
        }

        total_lines.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use guru_core::ai::FragmentStream;
    use guru_core::{
        ChatBackend, ChatSession, ConversationHistory, MemoryHistoryStore, Message, Role,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct EchoSession;

    #[async_trait]
    impl ChatSession for EchoSession {
        async fn send_message(&self, text: &str) -> String {
            text.to_string()
        }

        fn send_message_stream(&self, text: &str) -> FragmentStream {
            let fragments = vec!["Echo: ".to_string(), text.to_string()];
            Box::pin(stream::iter(fragments))
        }
    }

    struct EchoBackend;

    impl ChatBackend for EchoBackend {
        fn open_session(&self, _system_instruction: &str) -> Arc<dyn ChatSession> {
            Arc::new(EchoSession)
        }
    }

    fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store: Box<dyn HistoryStore> = Box::new(MemoryHistoryStore::new());
        let controller = SessionController::new(store, Arc::new(EchoBackend));
        (App::new(controller, tx, "Echo: test".to_string()), rx)
    }

    #[test]
    fn test_home_selection_is_clamped() {
        let (mut app, _rx) = app();
        assert_eq!(app.selected_mode(), Mode::Teacher);

        app.home_down();
        app.home_down();
        assert_eq!(app.selected_mode(), Mode::Astrologer);

        app.home_up();
        app.home_up();
        assert_eq!(app.selected_mode(), Mode::Teacher);
    }

    #[test]
    fn test_back_home_discards_draft() {
        let (mut app, _rx) = app();
        app.open_chat(Mode::Astrologer);
        app.input = "half typed".to_string();
        app.input_cursor = 4;

        app.back_home();

        assert_eq!(app.screen, Screen::Home);
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert_eq!(app.controller.active_mode(), None);
    }

    #[tokio::test]
    async fn test_submit_streams_reply_through_events() {
        let (mut app, mut rx) = app();
        app.open_chat(Mode::Teacher);
        app.input = "Namaste".to_string();
        app.input_cursor = 7;

        app.submit_input();
        assert!(app.input.is_empty());
        assert!(app.is_waiting(Mode::Teacher));

        while let Some(event) = rx.recv().await {
            match event {
                AppEvent::Fragment { mode, reply_id, text } => {
                    app.on_fragment(mode, &reply_id, &text)
                }
                AppEvent::StreamDone(mode) => {
                    app.on_stream_done(mode);
                    break;
                }
                _ => {}
            }
        }

        let messages = app.controller.messages(Mode::Teacher);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Model);
        assert_eq!(messages[1].content, "Echo: Namaste");
        assert!(!app.is_waiting(Mode::Teacher));
    }

    #[tokio::test]
    async fn test_blank_submit_keeps_idle() {
        let (mut app, _rx) = app();
        app.open_chat(Mode::Teacher);
        app.input = "   ".to_string();

        app.submit_input();

        assert!(app.controller.messages(Mode::Teacher).is_empty());
        assert!(!app.is_waiting(Mode::Teacher));
        assert_eq!(app.input, "   ");
    }

    #[tokio::test]
    async fn test_clear_popup_cancel_and_confirm() {
        let (mut app, mut rx) = app();
        app.open_chat(Mode::Astrologer);
        app.input = "Kundli".to_string();
        app.submit_input();
        while let Some(event) = rx.recv().await {
            match event {
                AppEvent::Fragment { mode, reply_id, text } => {
                    app.on_fragment(mode, &reply_id, &text)
                }
                AppEvent::StreamDone(mode) => {
                    app.on_stream_done(mode);
                    break;
                }
                _ => {}
            }
        }

        app.request_clear();
        assert!(app.show_clear_confirm);
        app.confirm_clear(false);
        assert!(!app.show_clear_confirm);
        assert_eq!(app.controller.messages(Mode::Astrologer).len(), 2);

        app.request_clear();
        app.confirm_clear(true);
        assert!(app.controller.messages(Mode::Astrologer).is_empty());
    }

    #[test]
    fn test_clear_not_offered_on_home() {
        let (mut app, _rx) = app();
        app.request_clear();
        assert!(!app.show_clear_confirm);
    }

    #[test]
    fn test_scroll_clamps_on_very_long_transcript() {
        let messages: Vec<Message> = (0..25_000)
            .map(|i| Message::user(format!("q{}", i)))
            .collect();
        let history = ConversationHistory::default().replace_sequence(Mode::Teacher, messages);
        let mut store: Box<dyn HistoryStore> = Box::new(MemoryHistoryStore::new());
        store.save(&history).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(store, Arc::new(EchoBackend));
        let mut app = App::new(controller, tx, "Echo: test".to_string());

        // Three lines per message, far past what a u16 can count
        app.open_chat(Mode::Teacher);
        assert_eq!(app.chat_scroll, u16::MAX - 20);

        app.scroll_down();
        assert_eq!(app.chat_scroll, u16::MAX - 20);
    }
}
