//! Configuration (layered: defaults < config file < environment < code).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};
use crate::util::retry::RetryPolicy;

pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const ENV_MAX_ITERATIONS: &str = "TURNSTILE_MAX_ITERATIONS";
const ENV_STREAMING: &str = "TURNSTILE_STREAMING";
const ENV_TOOL_TIMEOUT_MS: &str = "TURNSTILE_TOOL_TIMEOUT_MS";
const ENV_RETRY_MAX_ATTEMPTS: &str = "TURNSTILE_RETRY_MAX_ATTEMPTS";
const ENV_CHECKPOINT_DIR: &str = "TURNSTILE_CHECKPOINT_DIR";
const ENV_MODEL: &str = "TURNSTILE_MODEL";
const ENV_CONFIG_FILE: &str = "TURNSTILE_CONFIG";

/// `~/.turnstile`, or `./.turnstile` when no home directory is known.
pub fn default_home_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".turnstile"))
        .unwrap_or_else(|| PathBuf::from(".turnstile"))
}

/// Executor limits and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Model calls allowed per turn, counted across resumes.
    pub max_iterations: usize,
    /// Consume provider streams and emit deltas.
    pub streaming: bool,
    /// Default per-tool timeout; tools may override.
    pub tool_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            streaming: false,
            tool_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorSettings {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Directory for the file checkpoint store.
    pub dir: Option<PathBuf>,
}

impl CheckpointSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| default_home_dir().join("checkpoints"))
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

/// Layered configuration for turnstile.
///
/// ```toml
/// [executor]
/// max_iterations = 10
/// streaming = true
///
/// [openai]
/// model = "gpt-4o"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    pub executor: ExecutorSettings,
    pub checkpoint: CheckpointSettings,
    pub openai: OpenAiSettings,
}

impl TurnstileConfig {
    /// Defaults, then `~/.turnstile/config.toml` (or `$TURNSTILE_CONFIG`),
    /// then `.env` and process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = std::env::var(ENV_CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_dir().join("config.toml"));
        let config = Self::load_file(&path)?.unwrap_or_default();
        config.with_env_vars(std::env::vars())
    }

    /// Parse a config file; `Ok(None)` when it does not exist.
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| TurnstileError::Configuration(format!("invalid config file: {e}")))
    }

    /// Overlay recognized environment variables.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                ENV_MAX_ITERATIONS => self.executor.max_iterations = parse_env(ENV_MAX_ITERATIONS, &value)?,
                ENV_STREAMING => self.executor.streaming = parse_bool(ENV_STREAMING, &value)?,
                ENV_TOOL_TIMEOUT_MS => {
                    self.executor.tool_timeout_ms = Some(parse_env(ENV_TOOL_TIMEOUT_MS, &value)?)
                }
                ENV_RETRY_MAX_ATTEMPTS => {
                    self.executor.retry.max_attempts = parse_env(ENV_RETRY_MAX_ATTEMPTS, &value)?
                }
                ENV_CHECKPOINT_DIR => self.checkpoint.dir = Some(PathBuf::from(value)),
                ENV_MODEL => self.openai.model = value,
                "OPENAI_API_KEY" => self.openai.api_key = Some(value),
                "OPENAI_BASE_URL" => self.openai.base_url = Some(value),
                _ => {}
            }
        }
        if self.executor.max_iterations == 0 {
            return Err(TurnstileError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.executor.max_iterations = max_iterations;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.executor.streaming = streaming;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.executor.retry = retry;
        self
    }

    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai.api_key = Some(key.into());
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TurnstileError::Configuration(format!("{name}: cannot parse '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TurnstileError::Configuration(format!(
            "{name}: expected a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = TurnstileConfig::default();
        assert_eq!(config.executor.max_iterations, 20);
        assert_eq!(config.executor.retry.max_attempts, 3);
        assert!(!config.executor.streaming);
        assert_eq!(config.openai.model, DEFAULT_MODEL);
    }

    #[test]
    fn file_overrides_defaults_and_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[executor]\nmax_iterations = 5\nstreaming = true\n\n[openai]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();

        let from_file = TurnstileConfig::load_file(&path).unwrap().unwrap();
        assert_eq!(from_file.executor.max_iterations, 5);
        assert!(from_file.executor.streaming);
        assert_eq!(from_file.executor.retry, RetryPolicy::default());

        let layered = from_file
            .with_env_vars([
                ("TURNSTILE_MAX_ITERATIONS", "3"),
                ("OPENAI_API_KEY", "sk-env"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(layered.executor.max_iterations, 3);
        assert!(layered.executor.streaming);
        assert_eq!(layered.openai.model, "gpt-4o");
        assert_eq!(layered.openai.api_key.as_deref(), Some("sk-env"));

        let coded = layered.with_max_iterations(7);
        assert_eq!(coded.executor.max_iterations, 7);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(TurnstileConfig::load_file(&dir.path().join("absent.toml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = TurnstileConfig::default()
            .with_env_vars([("TURNSTILE_STREAMING", "maybe")])
            .unwrap_err();
        assert!(matches!(err, TurnstileError::Configuration(_)));

        let err = TurnstileConfig::default()
            .with_env_vars([("TURNSTILE_MAX_ITERATIONS", "0")])
            .unwrap_err();
        assert!(err.to_string().contains("max_iterations must be at least 1"));

        assert!(TurnstileConfig::from_toml_str("executor = 3").is_err());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = TurnstileConfig::default().with_openai_api_key("sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
