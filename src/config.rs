use std::env;
use std::time::Duration;

use chatgpt::config::ChatGPTEngine;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVar(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub chatgpt_api_key: String,
    pub chatgpt_model: String,
    pub request_timeout: Duration,
}

impl Config {
    /// Reads settings from the process environment. `.env` is expected to be
    /// loaded already.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chatgpt_api_key = lookup("CHATGPT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingVar("CHATGPT_API_KEY"))?;
        let chatgpt_model = lookup("CHATGPT_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());
        let request_timeout = lookup("CHATGPT_TIMEOUT_SECS")
            .and_then(|secs| secs.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            chatgpt_api_key,
            chatgpt_model,
            request_timeout,
        })
    }

    pub fn engine(&self) -> ChatGPTEngine {
        match self.chatgpt_model.as_str() {
            "gpt-4" => ChatGPTEngine::Gpt4,
            "gpt-4-32k" => ChatGPTEngine::Gpt4_32k,
            "gpt-3.5-turbo" => ChatGPTEngine::Gpt35Turbo,
            other => {
                log::warn!("Unknown model {:?}, falling back to gpt-3.5-turbo", other);
                ChatGPTEngine::Gpt35Turbo
            }
        }
    }
}
