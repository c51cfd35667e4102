//! Error types for provider transports and model provisioning.

use dbchat_config::ProviderKind;
use thiserror::Error;

/// Errors produced while talking to a model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider id does not name a supported provider.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The model id is not known for the given provider.
    #[error("unknown model for provider {provider}: {model}")]
    UnknownModel {
        /// Provider the lookup ran against.
        provider: ProviderKind,
        /// Model id that failed to resolve.
        model: String,
    },

    /// The provider requires credentials that are not configured.
    #[error("missing credentials for provider: {0}")]
    MissingCredentials(ProviderKind),

    /// Transport-level HTTP failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("provider returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        message: String,
    },

    /// The streaming body was malformed or ended unexpectedly.
    #[error("stream error: {0}")]
    Stream(String),

    /// A provider payload failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
