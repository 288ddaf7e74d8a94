use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{future, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::{ChatProvider, ProviderStream, Turn};
use crate::config::{DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::error::{Error, Result};
use crate::state::Role;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

/// Client for the Generative Language (Gemini) REST API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl GeminiClient {
    pub const DEFAULT_MODEL: &'static str = "gemini-3-flash-preview";

    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    fn build_request<'a>(
        &self,
        system_instruction: &'a str,
        turns: &'a [Turn],
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: system_instruction,
                }],
            },
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: Some(match turn.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }),
                    parts: vec![TextPart { text: &turn.text }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        }
    }

    async fn post(&self, method: &str, request: &GenerateRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{}", BASE_URL, self.model, method);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Text carried by one SSE payload; empty chunks yield an empty string
    fn parse_stream_payload(payload: &str) -> Result<String> {
        let chunk: GenerateResponse = serde_json::from_str(payload)?;
        if let Some(reason) = chunk.block_reason() {
            return Err(Error::InvalidResponse(format!("prompt blocked: {}", reason)));
        }
        Ok(chunk.text())
    }

    /// Non-empty text fragments carried by an SSE body, in order
    fn sse_fragments<S, B>(body: S) -> impl Stream<Item = Result<String>>
    where
        S: Stream<Item = std::result::Result<B, reqwest::Error>>,
        B: AsRef<[u8]>,
    {
        body.eventsource()
            .map(|event| match event {
                Ok(event) if event.data.trim().is_empty() => Ok(String::new()),
                Ok(event) => Self::parse_stream_payload(&event.data),
                Err(EventStreamError::Transport(err)) => Err(Error::Http(err)),
                Err(err) => Err(Error::InvalidResponse(format!("malformed event stream: {}", err))),
            })
            .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())))
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-3-flash-preview".to_string(),
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
        ]
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn generate(&self, system_instruction: &str, turns: &[Turn]) -> Result<String> {
        let request = self.build_request(system_instruction, turns);
        debug!("Sending generateContent to {} ({} turns)", self.model, turns.len());

        let response: GenerateResponse = self
            .post("generateContent", &request)
            .await?
            .json()
            .await?;

        if let Some(reason) = response.block_reason() {
            return Err(Error::InvalidResponse(format!("prompt blocked: {}", reason)));
        }
        if response.candidates.is_empty() {
            return Err(Error::InvalidResponse("no candidates returned".to_string()));
        }
        Ok(response.text())
    }

    async fn generate_stream(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ProviderStream> {
        let request = self.build_request(system_instruction, turns);
        debug!(
            "Sending streamGenerateContent to {} ({} turns)",
            self.model,
            turns.len()
        );

        let response = self.post("streamGenerateContent?alt=sse", &request).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut fragments = Box::pin(Self::sse_fragments(response.bytes_stream()));

            while let Some(item) = fragments.next().await {
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    return;
                }
            }
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
