pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod logging;
pub mod mode;
pub mod state;

// Re-export main types for convenience
pub use ai::{
    connect, ChatBackend, ChatProvider, ChatSession, GeminiClient, OllamaClient, Provider,
    ProviderBackend, ProviderSession, Turn,
};
pub use config::Config;
pub use controller::{SendState, SessionController, Submission};
pub use error::{Error, Result};
pub use history::{
    Confirm, FileHistoryStore, HistoryCache, HistoryStore, MemoryHistoryStore, CLEAR_PROMPT,
};
pub use mode::{Mode, ModeConfig};
pub use state::{ConversationHistory, Message, Role};
