//! Colloquy - A provider-agnostic engine for chat completion requests.
//!
//! The crate splits one exchange into small parts: a [`ProviderRegistry`]
//! of provider profiles, a [`SettingsStore`] of generation settings, a
//! [`RequestBuilder`] that snapshots both into a [`CompletionRequest`],
//! and a [`CompletionEngine`] that drives the request through a
//! [`ChatTransport`] with retry, streaming, and cancellation. A
//! [`ChatSession`] ties them to one [`Conversation`] for a view layer.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod registry;
pub mod request;
pub mod session;
pub mod settings;
pub mod transport;
pub mod types;

pub use config::{Config, ConfigError};
pub use conversation::Conversation;
pub use engine::{CompletionEngine, EngineEvent, EventSender};
pub use registry::{
    ProviderConfig, ProviderRegistry, ProviderStatus, ProviderTelemetry, RegistryError, Selection,
};
pub use request::{BuildError, RequestBuilder};
pub use session::{ChatSession, SessionError};
pub use settings::{GenerationSettings, SettingsStore, SettingsUpdate};
pub use transport::{
    ChatTransport, FragmentStream, ProviderResponse, StreamEnd, StreamFrame, TransportError,
};
pub use types::{
    Completion, CompletionFailure, CompletionRequest, CompletionResult, ErrorKind, Message, Role,
};
