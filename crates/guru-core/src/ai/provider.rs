use std::sync::Arc;

use tracing::info;

use super::{ChatProvider, GeminiClient, OllamaClient};
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Gemini, Provider::Ollama]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini (Google)",
            Provider::Ollama => "Ollama (Local)",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => GeminiClient::DEFAULT_MODEL,
            Provider::Ollama => OllamaClient::DEFAULT_MODEL,
        }
    }
}

/// Build the provider named by `config`
pub fn connect(config: &Config) -> Result<Arc<dyn ChatProvider>> {
    let provider = config.provider();
    let model = config.model_for(provider);
    info!("Using {} with model {}", provider.display_name(), model);

    match provider {
        Provider::Gemini => {
            let api_key = config.gemini_api_key.as_deref().ok_or_else(|| {
                Error::Config(
                    "Gemini API key not configured. Set GEMINI_API_KEY or add gemini_api_key to the config file"
                        .to_string(),
                )
            })?;
            let client = GeminiClient::new(api_key, &model)
                .with_sampling(config.temperature(), config.top_p());
            Ok(Arc::new(client))
        }
        Provider::Ollama => Ok(Arc::new(
            OllamaClient::new(config.ollama_url(), &model)
                .with_sampling(config.temperature(), config.top_p()),
        )),
    }
}
