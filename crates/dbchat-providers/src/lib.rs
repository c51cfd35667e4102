//! Model provider transports for dbchat: streaming chat connections to
//! Anthropic, Google, OpenAI, and a local Ollama server, plus model
//! provisioning for the local case.

mod anthropic;
mod error;
mod google;
mod ollama;
mod openai;
mod provision;
mod registry;
mod transport;

pub use anthropic::AnthropicTransport;
pub use error::ProviderError;
pub use google::GoogleTransport;
pub use ollama::OllamaClient;
pub use openai::OpenAiTransport;
pub use provision::{
    InstalledModel, LocalModelApi, ModelProvisioner, ProvisionEvent, ProvisionOutcome,
    PullProgress, PullStream,
};
pub use registry::{ModelChoice, ProviderRegistry};
pub use transport::{
    AbortHandle, AbortSignal, ChatTransport, CompletionRequest, StreamEvent, TokenStream,
    abort_pair,
};
