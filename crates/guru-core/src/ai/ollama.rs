use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::frames::FrameBuffer;
use super::{ChatProvider, ProviderStream, Turn};
use crate::config::{DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::error::{Error, Result};
use crate::state::Role;

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaReply {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaReply>,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Client for a local Ollama server (`ollama serve`)
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OllamaClient {
    pub const DEFAULT_MODEL: &'static str = "gemma3:latest";

    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
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
        &'a self,
        system_instruction: &'a str,
        turns: &'a [Turn],
        stream: bool,
    ) -> OllamaRequest<'a> {
        let mut messages = vec![OllamaMessage {
            role: "system",
            content: system_instruction,
        }];
        messages.extend(turns.iter().map(|turn| OllamaMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Model => "assistant",
            },
            content: &turn.text,
        }));

        OllamaRequest {
            model: &self.model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        }
    }

    async fn post_chat(&self, request: &OllamaRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body: format!("{} (make sure Ollama is running with: ollama serve)", body),
            });
        }

        Ok(response)
    }

    fn parse_line(line: &str) -> Result<String> {
        let parsed: OllamaResponse = serde_json::from_str(line)?;
        if let Some(error) = parsed.error {
            return Err(Error::InvalidResponse(error));
        }
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Api {
                status: response.status().as_u16(),
                body: "Failed to list models".to_string(),
            });
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    async fn generate(&self, system_instruction: &str, turns: &[Turn]) -> Result<String> {
        let request = self.build_request(system_instruction, turns, false);
        debug!("Sending chat request to Ollama model {}", self.model);

        let body = self.post_chat(&request).await?.text().await?;
        Self::parse_line(&body)
    }

    async fn generate_stream(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ProviderStream> {
        let request = self.build_request(system_instruction, turns, true);
        debug!("Sending streaming chat request to Ollama model {}", self.model);

        let mut response = self.post_chat(&request).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = FrameBuffer::ndjson();
            let mut body_done = false;

            while !body_done {
                match response.chunk().await {
                    Ok(Some(bytes)) => lines.push(&bytes),
                    Ok(None) => body_done = true,
                    Err(err) => {
                        let _ = tx.send(Err(Error::Http(err)));
                        return;
                    }
                }

                let mut pending: Vec<String> = std::iter::from_fn(|| lines.next_frame()).collect();
                if body_done {
                    pending.extend(lines.finish());
                }

                for line in &pending {
                    match Self::parse_line(line) {
                        Ok(text) if text.is_empty() => {}
                        Ok(text) => {
                            if tx.send(Ok(text)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
