//! Provider registry: profiles, selection, and advisory telemetry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Advisory availability of a provider, as last reported by a monitor.
///
/// An `Offline` status never blocks dispatch; requests to an offline
/// provider simply fail through the normal retry path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Online,
    Offline,
}

fn default_status() -> ProviderStatus {
    ProviderStatus::Online
}

fn default_success_rate() -> f32 {
    1.0
}

/// Latest observed telemetry for a provider. Purely informational.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProviderTelemetry {
    #[serde(default = "default_status")]
    pub status: ProviderStatus,
    #[serde(default)]
    pub latency_ms: u32,
    /// Fraction of recent requests that succeeded, in `[0, 1]`.
    #[serde(default = "default_success_rate")]
    pub success_rate: f32,
}

impl Default for ProviderTelemetry {
    fn default() -> Self {
        Self {
            status: default_status(),
            latency_ms: 0,
            success_rate: default_success_rate(),
        }
    }
}

/// Static profile of a single provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Models offered by this provider, in display order.
    pub models: Vec<String>,
    /// Additional attempts allowed after the first failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Fixed pause between consecutive attempts, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub telemetry: ProviderTelemetry,
}

impl ProviderConfig {
    #[must_use]
    pub fn offers_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|model| model == model_id)
    }
}

/// A validated provider/model pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub provider: String,
    pub model: String,
}

/// Errors from selection and telemetry updates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider '{0}' is not registered")]
    NotFound(String),
    #[error("model '{model}' is not offered by provider '{provider}'")]
    InvalidSelection { provider: String, model: String },
}

/// The built-in provider table.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            models: vec![
                "gpt-4o".to_string(),
                "gpt-4-turbo".to_string(),
                "gpt-3.5-turbo".to_string(),
            ],
            max_retries: 3,
            retry_delay_ms: 1000,
            supports_streaming: true,
            telemetry: ProviderTelemetry {
                status: ProviderStatus::Online,
                latency_ms: 245,
                success_rate: 0.998,
            },
        },
        ProviderConfig {
            id: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            models: vec!["gemini-1.5-pro".to_string(), "gemini-1.5-flash".to_string()],
            max_retries: 2,
            retry_delay_ms: 500,
            supports_streaming: false,
            telemetry: ProviderTelemetry {
                status: ProviderStatus::Online,
                latency_ms: 320,
                success_rate: 0.995,
            },
        },
        ProviderConfig {
            id: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            models: vec![
                "llama3.2".to_string(),
                "mistral".to_string(),
                "codellama".to_string(),
            ],
            max_retries: 1,
            retry_delay_ms: 200,
            supports_streaming: true,
            telemetry: ProviderTelemetry {
                status: ProviderStatus::Online,
                latency_ms: 150,
                success_rate: 0.987,
            },
        },
        ProviderConfig {
            id: "deepseek".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            models: vec!["deepseek-coder".to_string(), "deepseek-chat".to_string()],
            max_retries: 2,
            retry_delay_ms: 800,
            supports_streaming: true,
            telemetry: ProviderTelemetry {
                status: ProviderStatus::Offline,
                latency_ms: 400,
                success_rate: 0.972,
            },
        },
    ]
}

/// Registry of provider profiles, in registration order.
///
/// Profiles are fixed for the lifetime of the registry; only telemetry
/// snapshots change after construction.
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
    telemetry: RwLock<HashMap<String, ProviderTelemetry>>,
}

impl ProviderRegistry {
    /// Registry populated from the given profiles.
    ///
    /// Duplicate provider ids keep the first occurrence; duplicate model
    /// ids within a provider are dropped.
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        let mut registered: Vec<ProviderConfig> = Vec::with_capacity(providers.len());
        let mut telemetry = HashMap::with_capacity(providers.len());

        for mut config in providers {
            if registered.iter().any(|existing| existing.id == config.id) {
                warn!(provider = %config.id, "Duplicate provider id, keeping first registration");
                continue;
            }

            let mut seen = Vec::with_capacity(config.models.len());
            config.models.retain(|model| {
                if seen.contains(model) {
                    return false;
                }
                seen.push(model.clone());
                true
            });

            info!(
                provider = %config.id,
                models = config.models.len(),
                "Registered provider"
            );
            telemetry.insert(config.id.clone(), config.telemetry);
            registered.push(config);
        }

        Self {
            providers: registered,
            telemetry: RwLock::new(telemetry),
        }
    }

    /// Registry populated with the built-in provider table.
    pub fn with_defaults() -> Self {
        Self::new(default_providers())
    }

    /// All profiles in registration order, with live telemetry.
    pub fn list(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .map(|config| self.with_live_telemetry(config))
            .collect()
    }

    /// The profile for `provider_id`, with live telemetry.
    pub fn get(&self, provider_id: &str) -> Option<ProviderConfig> {
        self.providers
            .iter()
            .find(|config| config.id == provider_id)
            .map(|config| self.with_live_telemetry(config))
    }

    /// Validate a provider/model pair.
    pub fn select(&self, provider_id: &str, model_id: &str) -> Result<Selection, RegistryError> {
        let config = self
            .providers
            .iter()
            .find(|config| config.id == provider_id)
            .ok_or_else(|| RegistryError::NotFound(provider_id.to_string()))?;

        if !config.offers_model(model_id) {
            return Err(RegistryError::InvalidSelection {
                provider: provider_id.to_string(),
                model: model_id.to_string(),
            });
        }

        Ok(Selection {
            provider: provider_id.to_string(),
            model: model_id.to_string(),
        })
    }

    /// The first registered provider with at least one model, paired with
    /// its first model. This is the selection a fresh session starts from.
    pub fn first_selection(&self) -> Option<Selection> {
        self.providers.iter().find_map(|config| {
            config.models.first().map(|model| Selection {
                provider: config.id.clone(),
                model: model.clone(),
            })
        })
    }

    /// Record a new telemetry snapshot for `provider_id`.
    pub fn record_telemetry(
        &self,
        provider_id: &str,
        snapshot: ProviderTelemetry,
    ) -> Result<(), RegistryError> {
        if !self.providers.iter().any(|config| config.id == provider_id) {
            return Err(RegistryError::NotFound(provider_id.to_string()));
        }

        let mut telemetry = self
            .telemetry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        telemetry.insert(provider_id.to_string(), snapshot);
        Ok(())
    }

    /// The latest telemetry snapshot for `provider_id`.
    pub fn telemetry(&self, provider_id: &str) -> Option<ProviderTelemetry> {
        self.telemetry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn with_live_telemetry(&self, config: &ProviderConfig) -> ProviderConfig {
        let mut config = config.clone();
        if let Some(snapshot) = self.telemetry(&config.id) {
            config.telemetry = snapshot;
        }
        config
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            base_url: format!("https://{id}.example.com"),
            models: models.iter().map(|model| model.to_string()).collect(),
            max_retries: 1,
            retry_delay_ms: 100,
            supports_streaming: true,
            telemetry: ProviderTelemetry::default(),
        }
    }

    #[test]
    fn test_default_table_order_and_profiles() {
        let registry = ProviderRegistry::with_defaults();
        let providers = registry.list();

        let ids: Vec<&str> = providers.iter().map(|config| config.id.as_str()).collect();
        assert_eq!(ids, ["openai", "gemini", "ollama", "deepseek"]);

        let openai = registry.get("openai").unwrap();
        assert_eq!(openai.base_url, "https://api.openai.com/v1");
        assert_eq!(openai.max_retries, 3);
        assert_eq!(openai.retry_delay_ms, 1000);
        assert!(openai.supports_streaming);
        assert_eq!(openai.telemetry.latency_ms, 245);

        let gemini = registry.get("gemini").unwrap();
        assert!(!gemini.supports_streaming);

        let deepseek = registry.get("deepseek").unwrap();
        assert_eq!(deepseek.telemetry.status, ProviderStatus::Offline);
        assert_eq!(deepseek.telemetry.success_rate, 0.972);
    }

    #[test]
    fn test_select_validates_pair() {
        let registry = ProviderRegistry::with_defaults();

        let selection = registry.select("openai", "gpt-4o").unwrap();
        assert_eq!(selection.provider, "openai");
        assert_eq!(selection.model, "gpt-4o");

        assert_eq!(
            registry.select("mistral", "mistral-large"),
            Err(RegistryError::NotFound("mistral".to_string()))
        );
        assert_eq!(
            registry.select("openai", "llama3.2"),
            Err(RegistryError::InvalidSelection {
                provider: "openai".to_string(),
                model: "llama3.2".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_provider_keeps_first_registration() {
        let mut first = provider("local", &["model-a"]);
        first.base_url = "https://first.example.com".to_string();
        let mut second = provider("local", &["model-b"]);
        second.base_url = "https://second.example.com".to_string();

        let registry = ProviderRegistry::new(vec![first, second]);
        assert_eq!(registry.len(), 1);

        let config = registry.get("local").unwrap();
        assert_eq!(config.base_url, "https://first.example.com");
        assert_eq!(config.models, ["model-a"]);
    }

    #[test]
    fn test_duplicate_models_are_dropped() {
        let registry = ProviderRegistry::new(vec![provider("local", &["a", "b", "a"])]);
        assert_eq!(registry.get("local").unwrap().models, ["a", "b"]);
    }

    #[test]
    fn test_record_telemetry_overrides_profile_snapshot() {
        let registry = ProviderRegistry::with_defaults();

        registry
            .record_telemetry(
                "openai",
                ProviderTelemetry {
                    status: ProviderStatus::Offline,
                    latency_ms: 900,
                    success_rate: 0.5,
                },
            )
            .unwrap();

        let openai = registry.get("openai").unwrap();
        assert_eq!(openai.telemetry.status, ProviderStatus::Offline);
        assert_eq!(openai.telemetry.latency_ms, 900);

        let listed = registry.list();
        assert_eq!(listed[0].telemetry.latency_ms, 900);
        // Other providers keep their own snapshots.
        assert_eq!(listed[2].telemetry.latency_ms, 150);
    }

    #[test]
    fn test_record_telemetry_unknown_provider() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.record_telemetry("nope", ProviderTelemetry::default()),
            Err(RegistryError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_first_selection_skips_empty_providers() {
        let registry = ProviderRegistry::new(vec![
            provider("empty", &[]),
            provider("stocked", &["model-x", "model-y"]),
        ]);

        let selection = registry.first_selection().unwrap();
        assert_eq!(selection.provider, "stocked");
        assert_eq!(selection.model, "model-x");

        assert!(ProviderRegistry::new(Vec::new()).first_selection().is_none());
    }
}
