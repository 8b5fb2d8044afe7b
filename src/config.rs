//! Configuration management for the OCR server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Parent of per-request scratch files (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model identifier passed to the engine
    pub name: String,
    /// Model cache directory, created at startup
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    pub url: String,
    pub timeout_secs: u64,
    pub load_attempts: u32,
    pub load_retry_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    Ollama,
    Worker,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn load_retry(&self) -> Duration {
        Duration::from_secs(self.load_retry_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_upload_bytes: 32 * 1024 * 1024,
                scratch_dir: None,
            },
            model: ModelConfig {
                name: "deepseek-ai/DeepSeek-OCR".to_string(),
                cache_dir: PathBuf::from("/models"),
            },
            engine: EngineConfig {
                backend: EngineBackend::Ollama,
                url: "http://localhost:11434".to_string(),
                timeout_secs: 300,
                load_attempts: 30,
                load_retry_secs: 2,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Unset variables take their defaults;
    /// set but malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
                max_upload_bytes: parse_var(
                    &lookup,
                    "MAX_UPLOAD_BYTES",
                    defaults.server.max_upload_bytes,
                )?,
                scratch_dir: lookup("SCRATCH_DIR")
                    .filter(|dir| !dir.trim().is_empty())
                    .map(PathBuf::from),
            },
            model: ModelConfig {
                name: lookup("MODEL_NAME").unwrap_or(defaults.model.name),
                cache_dir: lookup("HF_HOME")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.model.cache_dir),
            },
            engine: EngineConfig {
                backend: match lookup("ENGINE_BACKEND").as_deref() {
                    None | Some("ollama") => EngineBackend::Ollama,
                    Some("worker") => EngineBackend::Worker,
                    Some(other) => {
                        return Err(ConfigError::Invalid {
                            name: "ENGINE_BACKEND",
                            value: other.to_string(),
                        })
                    }
                },
                url: lookup("ENGINE_URL").unwrap_or(defaults.engine.url),
                timeout_secs: parse_var(
                    &lookup,
                    "ENGINE_TIMEOUT_SECS",
                    defaults.engine.timeout_secs,
                )?,
                load_attempts: parse_var(
                    &lookup,
                    "ENGINE_LOAD_ATTEMPTS",
                    defaults.engine.load_attempts,
                )?,
                load_retry_secs: parse_var(
                    &lookup,
                    "ENGINE_LOAD_RETRY_SECS",
                    defaults.engine.load_retry_secs,
                )?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
