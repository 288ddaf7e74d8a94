//! The AI collaborator boundary.
//!
//! Providers ([`ChatProvider`]) talk HTTP and may fail. Sessions
//! ([`ChatSession`]) wrap a provider with a persona and a transcript and
//! never fail: any provider error becomes a terminal text fragment.

mod frames;
pub mod gemini;
pub mod ollama;
pub mod provider;
pub mod session;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::Role;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use provider::{connect, Provider};
pub use session::{ChatBackend, ChatSession, FragmentStream, ProviderBackend, ProviderSession};

/// Text appended to a reply when the provider fails mid-turn
pub const ERROR_NOTICE: &str = "\n[An unexpected error occurred. Please refresh the connection.]";

/// Fragments as produced by a provider, before errors are folded in-band
pub type ProviderStream = BoxStream<'static, Result<String>>;

/// One turn of a provider-facing conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A text-generation backend (Gemini, Ollama, ...)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate the complete reply to the last turn
    async fn generate(&self, system_instruction: &str, turns: &[Turn]) -> Result<String>;

    /// Generate the reply as an ordered stream of fragments.
    ///
    /// Default behavior falls back to non-streaming generation and emits one fragment.
    async fn generate_stream(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ProviderStream> {
        let text = self.generate(system_instruction, turns).await?;
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }

    fn name(&self) -> &'static str;

    fn model(&self) -> &str;
}
