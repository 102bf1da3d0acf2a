//! Generation settings and their store.
//!
//! Settings apply to every request built after a change takes effect.
//! Requests already in flight keep the snapshot they were built with.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_system_message() -> String {
    GenerationSettings::DEFAULT_SYSTEM_MESSAGE.to_string()
}

/// Sampling and prompt parameters applied to every built request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Prepended as a system message when non-empty.
    #[serde(default = "default_system_message")]
    pub system_message: String,
}

impl GenerationSettings {
    pub const TEMPERATURE_MIN: f32 = 0.0;
    pub const TEMPERATURE_MAX: f32 = 2.0;
    pub const TOP_P_MIN: f32 = 0.0;
    pub const TOP_P_MAX: f32 = 1.0;
    pub const MAX_TOKENS_MIN: u32 = 1;
    pub const MAX_TOKENS_MAX: u32 = 4096;

    pub const DEFAULT_SYSTEM_MESSAGE: &'static str = "You are a helpful AI assistant.";
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            system_message: default_system_message(),
        }
    }
}

/// A partial settings change. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

/// Thread-safe holder of the current generation settings.
///
/// Numeric fields are clamped into range on every write, so a read can
/// never observe an out-of-range value. NaN updates are dropped.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: Mutex<GenerationSettings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given settings, clamped into range.
    pub fn with_settings(settings: GenerationSettings) -> Self {
        let store = Self::new();
        store.set(SettingsUpdate {
            temperature: Some(settings.temperature),
            top_p: Some(settings.top_p),
            max_tokens: Some(settings.max_tokens),
            system_message: Some(settings.system_message),
        });
        store
    }

    /// A value snapshot of the current settings.
    pub fn get(&self) -> GenerationSettings {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a partial update and return the resulting settings.
    pub fn set(&self, update: SettingsUpdate) -> GenerationSettings {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(temperature) = update.temperature
            && !temperature.is_nan()
        {
            current.temperature = temperature.clamp(
                GenerationSettings::TEMPERATURE_MIN,
                GenerationSettings::TEMPERATURE_MAX,
            );
        }
        if let Some(top_p) = update.top_p
            && !top_p.is_nan()
        {
            current.top_p = top_p.clamp(GenerationSettings::TOP_P_MIN, GenerationSettings::TOP_P_MAX);
        }
        if let Some(max_tokens) = update.max_tokens {
            current.max_tokens = max_tokens.clamp(
                GenerationSettings::MAX_TOKENS_MIN,
                GenerationSettings::MAX_TOKENS_MAX,
            );
        }
        if let Some(system_message) = update.system_message {
            current.system_message = system_message;
        }

        debug!(
            temperature = current.temperature,
            top_p = current.top_p,
            max_tokens = current.max_tokens,
            "Settings updated"
        );
        current.clone()
    }

    /// Restore every field to its default value.
    pub fn reset(&self) -> GenerationSettings {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = GenerationSettings::default();
        current.clone()
    }
}
