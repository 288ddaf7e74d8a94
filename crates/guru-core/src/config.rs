use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::ai::Provider;
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub history_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TOP_P: f32 = 0.95;

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            model: None,
            gemini_api_key: None,
            ollama_url: None,
            temperature: None,
            top_p: None,
            history_path: None,
            log_level: None,
        }
    }

    /// Read the config file, then apply environment overrides. An unreadable
    /// or corrupt file falls back to defaults, so env vars still take effect.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Ok(Self::load_from(&config_path, env_lookup))
    }

    /// Defaults plus environment overrides, for when no config path exists
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.apply_env();
        config
    }

    fn load_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::read_file(path).unwrap_or_else(|e| {
            warn!("Ignoring unreadable config {}: {}", path.display(), e);
            Self::new()
        });
        config.apply_overrides(lookup);
        config
    }

    /// The stored file alone, without env overrides. Missing means defaults.
    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let config_content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&config_content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Store the default provider. Only the file's own values are written
    /// back; env secrets never reach disk.
    pub fn save_provider(provider: Provider) -> Result<()> {
        Self::save_provider_to(&Self::get_config_path()?, provider)
    }

    fn save_provider_to(path: &Path, provider: Provider) -> Result<()> {
        let mut config = Self::read_file(path).unwrap_or_else(|_| Self::new());
        config.provider = Some(provider.as_str().to_string());
        config.save_to(path)
    }

    /// Env vars win over the file: `GEMINI_API_KEY`, then `API_KEY`,
    /// `GURU_PROVIDER`, `GURU_MODEL`.
    fn apply_env(&mut self) {
        self.apply_overrides(env_lookup);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(provider) = lookup("GURU_PROVIDER") {
            self.provider = Some(provider);
        }
        if let Some(model) = lookup("GURU_MODEL") {
            self.model = Some(model);
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Gemini)
    }

    pub fn model_for(&self, provider: Provider) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f32 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("guru-jyotish").join("config.json"))
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
