use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::{ProviderConfig, default_providers};

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Provider the first session selection starts from.
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Model the first session selection starts from. Ignored unless
    /// `default_provider` is also set.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_provider_table")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            default_model: None,
            providers: default_provider_table(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

fn default_provider_table() -> Vec<ProviderConfig> {
    default_providers()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    use crate::registry::ProviderStatus;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.default_provider.is_none());
        assert!(config.default_model.is_none());
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.providers[0].id, "openai");
        assert_eq!(config.providers[3].id, "deepseek");
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(missing_path.to_str().unwrap()).await.unwrap();
        assert!(config.default_provider.is_none());
        assert_eq!(config.providers.len(), 4);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider: ollama
default_model: mistral
providers:
  - id: ollama
    base_url: "http://localhost:11434"
    models:
      - llama3.2
      - mistral
    max_retries: 4
    retry_delay_ms: 250
    supports_streaming: true
    telemetry:
      status: online
      latency_ms: 90
      success_rate: 0.99
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(config.default_provider.as_deref(), Some("ollama"));
        assert_eq!(config.default_model.as_deref(), Some("mistral"));
        assert_eq!(config.providers.len(), 1);

        let provider = &config.providers[0];
        assert_eq!(provider.id, "ollama");
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(provider.models, ["llama3.2", "mistral"]);
        assert_eq!(provider.max_retries, 4);
        assert_eq!(provider.retry_delay_ms, 250);
        assert!(provider.supports_streaming);
        assert_eq!(provider.telemetry.status, ProviderStatus::Online);
        assert_eq!(provider.telemetry.latency_ms, 90);
        assert_eq!(provider.telemetry.success_rate, 0.99);
    }

    #[tokio::test]
    async fn test_load_partial_provider_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  - id: local
    base_url: "http://localhost:9000"
    models:
      - tiny
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(config.providers.len(), 1);

        let provider = &config.providers[0];
        assert_eq!(provider.max_retries, 0); // default
        assert_eq!(provider.retry_delay_ms, 0); // default
        assert!(!provider.supports_streaming); // default
        assert_eq!(provider.telemetry.status, ProviderStatus::Online); // default
        assert_eq!(provider.telemetry.success_rate, 1.0); // default
    }

    #[tokio::test]
    async fn test_load_without_providers_keeps_builtin_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "default_provider: gemini").unwrap();

        let config = Config::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(config.default_provider.as_deref(), Some("gemini"));
        assert_eq!(config.providers.len(), 4);
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path().to_str().unwrap()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let io_error = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test",
        ));
        assert!(io_error.to_string().contains("failed to read config file"));
    }
}
