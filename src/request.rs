//! Completion request assembly.

use std::sync::Arc;

use thiserror::Error;

use crate::conversation::Conversation;
use crate::registry::{ProviderRegistry, RegistryError};
use crate::settings::SettingsStore;
use crate::types::{CompletionRequest, Message, Role};

/// Errors that prevent a request from being assembled.
#[derive(Debug, Error)]
pub enum BuildError {
    /// There is no user content to send
    #[error("conversation is empty")]
    EmptyConversation,

    /// The provider/model pair did not resolve
    #[error(transparent)]
    Selection(#[from] RegistryError),
}

/// Assembles completion requests from the current transcript and settings.
///
/// `build` is read-only: it validates and snapshots, but never mutates
/// the conversation, the settings store, or the registry.
pub struct RequestBuilder {
    registry: Arc<ProviderRegistry>,
    settings: Arc<SettingsStore>,
}

impl RequestBuilder {
    pub fn new(registry: Arc<ProviderRegistry>, settings: Arc<SettingsStore>) -> Self {
        Self { registry, settings }
    }

    /// Assemble a request for the given selection.
    ///
    /// The transcript and settings are captured by value, so the request
    /// is unaffected by later store mutations.
    pub fn build(
        &self,
        conversation: &Conversation,
        provider_id: &str,
        model_id: &str,
        streaming: bool,
    ) -> Result<CompletionRequest, BuildError> {
        let history = conversation.snapshot();
        if history.is_empty() {
            return Err(BuildError::EmptyConversation);
        }

        let selection = self.registry.select(provider_id, model_id)?;
        let settings = self.settings.get();

        // Prepend the system message, then the transcript in order.
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !settings.system_message.is_empty() {
            messages.push(Message::text(Role::System, settings.system_message.clone()));
        }
        messages.extend(history);

        Ok(CompletionRequest {
            provider: selection.provider,
            model: selection.model,
            messages,
            settings,
            streaming,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsUpdate;

    fn builder() -> (RequestBuilder, Arc<SettingsStore>) {
        let registry = Arc::new(ProviderRegistry::with_defaults());
        let settings = Arc::new(SettingsStore::new());
        (
            RequestBuilder::new(registry, settings.clone()),
            settings,
        )
    }

    #[test]
    fn test_build_prepends_system_message() {
        let (builder, _settings) = builder();
        let conversation = Conversation::new();
        conversation.append_user("Hello!");

        let request = builder
            .build(&conversation, "openai", "gpt-4o", false)
            .unwrap();

        assert_eq!(request.provider, "openai");
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "You are a helpful AI assistant.");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "Hello!");
        assert!(!request.streaming);
    }

    #[test]
    fn test_build_omits_empty_system_message() {
        let (builder, settings) = builder();
        settings.set(SettingsUpdate {
            system_message: Some(String::new()),
            ..Default::default()
        });

        let conversation = Conversation::new();
        conversation.append_user("Hello!");

        let request = builder
            .build(&conversation, "openai", "gpt-4o", false)
            .unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn test_build_rejects_empty_conversation() {
        let (builder, _settings) = builder();
        let conversation = Conversation::new();

        let err = builder
            .build(&conversation, "openai", "gpt-4o", false)
            .unwrap_err();
        assert!(matches!(err, BuildError::EmptyConversation));
    }

    #[test]
    fn test_build_rejects_unresolved_selection() {
        let (builder, _settings) = builder();
        let conversation = Conversation::new();
        conversation.append_user("Hello!");

        let err = builder
            .build(&conversation, "openai", "not-a-model", false)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Selection(RegistryError::InvalidSelection { .. })
        ));

        let err = builder
            .build(&conversation, "unknown", "gpt-4o", false)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Selection(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_build_snapshots_settings_and_history() {
        let (builder, settings) = builder();
        let conversation = Conversation::new();
        conversation.append_user("Hello!");

        let request = builder
            .build(&conversation, "openai", "gpt-4o", true)
            .unwrap();

        // Later mutations must not leak into the built request.
        settings.set(SettingsUpdate {
            temperature: Some(1.9),
            ..Default::default()
        });
        conversation.append_user("Another one");

        assert_eq!(request.settings.temperature, 0.7);
        assert_eq!(request.messages.len(), 2);
        assert!(request.streaming);
    }

    #[test]
    fn test_build_does_not_mutate_inputs() {
        let (builder, settings) = builder();
        let conversation = Conversation::new();
        conversation.append_user("Hello!");

        builder
            .build(&conversation, "openai", "gpt-4o", false)
            .unwrap();

        // The system message lives only in the built request.
        assert_eq!(conversation.len(), 1);
        assert_eq!(settings.get().temperature, 0.7);
    }
}
