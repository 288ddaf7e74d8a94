use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use super::{ChatProvider, Turn, ERROR_NOTICE};

/// Reply fragments in delivery order. Finite; never carries an error.
pub type FragmentStream = BoxStream<'static, String>;

/// A live conversation with the AI collaborator.
///
/// Implementations must not fail past this boundary: a failed turn ends
/// with a human-readable notice as its last fragment.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one user turn and wait for the complete reply
    async fn send_message(&self, text: &str) -> String;

    /// Send one user turn and receive the reply as it is generated
    fn send_message_stream(&self, text: &str) -> FragmentStream;
}

/// Opens sessions, one per visit to a mode's chat
pub trait ChatBackend: Send + Sync {
    fn open_session(&self, system_instruction: &str) -> Arc<dyn ChatSession>;
}

/// [`ChatSession`] over a [`ChatProvider`], keeping the multi-turn transcript
pub struct ProviderSession {
    provider: Arc<dyn ChatProvider>,
    system_instruction: Arc<str>,
    transcript: Arc<Mutex<Vec<Turn>>>,
}

impl ProviderSession {
    pub fn new(provider: Arc<dyn ChatProvider>, system_instruction: &str) -> Self {
        Self {
            provider,
            system_instruction: Arc::from(system_instruction),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Turns completed so far in this session
    pub async fn transcript(&self) -> Vec<Turn> {
        self.transcript.lock().await.clone()
    }
}

#[async_trait]
impl ChatSession for ProviderSession {
    async fn send_message(&self, text: &str) -> String {
        // Held for the whole turn so turns never interleave
        let mut transcript = self.transcript.lock().await;
        transcript.push(Turn::user(text));

        match self.provider.generate(&self.system_instruction, &transcript).await {
            Ok(reply) => {
                transcript.push(Turn::model(reply.clone()));
                reply
            }
            Err(e) => {
                error!("{} error: {}", self.provider.name(), e);
                transcript.pop();
                ERROR_NOTICE.trim_start().to_string()
            }
        }
    }

    fn send_message_stream(&self, text: &str) -> FragmentStream {
        let provider = Arc::clone(&self.provider);
        let system_instruction = Arc::clone(&self.system_instruction);
        let transcript = Arc::clone(&self.transcript);
        let text = text.to_string();

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut transcript = transcript.lock().await;
            transcript.push(Turn::user(text));

            let outcome = match provider.generate_stream(&system_instruction, &transcript).await {
                Ok(mut fragments) => {
                    let mut reply = String::new();
                    let mut failure = None;
                    while let Some(item) = fragments.next().await {
                        match item {
                            Ok(fragment) => {
                                reply.push_str(&fragment);
                                if tx.send(fragment).is_err() {
                                    debug!("Fragment receiver dropped; finishing turn in background");
                                }
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    match failure {
                        None => Ok(reply),
                        Some(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(reply) => {
                    debug!("Turn complete ({} chars)", reply.chars().count());
                    transcript.push(Turn::model(reply));
                }
                Err(e) => {
                    error!("{} error: {}", provider.name(), e);
                    transcript.pop();
                    let _ = tx.send(ERROR_NOTICE.to_string());
                }
            }
        });

        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|fragment| (fragment, rx))
        }))
    }
}

/// Opens a [`ProviderSession`] per chat visit
#[derive(Clone)]
pub struct ProviderBackend {
    provider: Arc<dyn ChatProvider>,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

impl ChatBackend for ProviderBackend {
    fn open_session(&self, system_instruction: &str) -> Arc<dyn ChatSession> {
        info!(
            "Opening {} session with model {}",
            self.provider.name(),
            self.provider.model()
        );
        Arc::new(ProviderSession::new(
            Arc::clone(&self.provider),
            system_instruction,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ProviderStream;
    use crate::error::{Error, Result};
    use futures_util::stream;

    /// Replays canned fragments; `Err` entries become provider errors
    struct ScriptedProvider {
        script: Vec<std::result::Result<&'static str, &'static str>>,
        seen: std::sync::Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<std::result::Result<&'static str, &'static str>>) -> Self {
            Self {
                script,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn generate(&self, _system: &str, turns: &[Turn]) -> Result<String> {
            self.seen.lock().unwrap().push(turns.to_vec());
            let mut text = String::new();
            for item in &self.script {
                match item {
                    Ok(fragment) => text.push_str(fragment),
                    Err(msg) => return Err(Error::InvalidResponse(msg.to_string())),
                }
            }
            Ok(text)
        }

        async fn generate_stream(&self, _system: &str, turns: &[Turn]) -> Result<ProviderStream> {
            self.seen.lock().unwrap().push(turns.to_vec());
            let items: Vec<Result<String>> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(fragment) => Ok(fragment.to_string()),
                    Err(msg) => Err(Error::InvalidResponse(msg.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_stream_delivers_fragments_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("Na"), Ok("mas"), Ok("te")]));
        let session = ProviderSession::new(provider, "persona");

        let fragments: Vec<String> = session.send_message_stream("hello").collect().await;
        assert_eq!(fragments, vec!["Na", "mas", "te"]);
        assert_eq!(
            session.transcript().await,
            vec![Turn::user("hello"), Turn::model("Namaste")]
        );
    }

    #[tokio::test]
    async fn test_stream_failure_becomes_terminal_notice() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("Be"), Err("quota exceeded")]));
        let session = ProviderSession::new(provider, "persona");

        let fragments: Vec<String> = session.send_message_stream("hello").collect().await;
        assert_eq!(fragments, vec!["Be".to_string(), ERROR_NOTICE.to_string()]);
        assert!(session.transcript().await.is_empty());
    }

    #[tokio::test]
    async fn test_default_stream_falls_back_to_generate() {
        struct WholeReply;

        #[async_trait]
        impl ChatProvider for WholeReply {
            async fn generate(&self, _system: &str, _turns: &[Turn]) -> Result<String> {
                Ok("Subh ho".to_string())
            }

            fn name(&self) -> &'static str {
                "Whole"
            }

            fn model(&self) -> &str {
                "whole"
            }
        }

        let session = ProviderSession::new(Arc::new(WholeReply), "persona");
        let fragments: Vec<String> = session.send_message_stream("hi").collect().await;
        assert_eq!(fragments, vec!["Subh ho"]);
    }

    #[tokio::test]
    async fn test_second_turn_carries_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("ok")]));
        let session = ProviderSession::new(provider.clone(), "persona");

        assert_eq!(session.send_message("first").await, "ok");
        let _: Vec<String> = session.send_message_stream("second").collect().await;

        let seen = provider.seen.lock().unwrap().clone();
        assert_eq!(seen[0], vec![Turn::user("first")]);
        assert_eq!(
            seen[1],
            vec![Turn::user("first"), Turn::model("ok"), Turn::user("second")]
        );
    }

    #[tokio::test]
    async fn test_send_message_failure_returns_notice() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err("401")]));
        let session = ProviderSession::new(provider, "persona");

        let reply = session.send_message("hello").await;
        assert_eq!(reply, ERROR_NOTICE.trim_start());
        assert!(session.transcript().await.is_empty());
    }
}
