//! The transport abstraction every provider implements, plus the abort
//! signal used to tear down an in-flight stream.

use async_trait::async_trait;
use dbchat_protocol::{Message, ToolCall, ToolSpec};
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ProviderError;

/// A single completion request against a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model id to run.
    pub model: String,
    /// System instructions, when the session has any.
    pub system: Option<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Tools advertised to the model.
    pub tools: Vec<ToolSpec>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Incremental output from a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCall),
}

/// Stream of completion events; ends when the model finishes or the
/// request is aborted.
pub type TokenStream = ReceiverStream<Result<StreamEvent, ProviderError>>;

/// Create a linked abort handle/signal pair for one request.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

/// Caller-side handle that cancels the linked [`AbortSignal`].
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Signal every linked [`AbortSignal`] to stop.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cooperatively-checked cancellation signal passed into transports.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires, for callers without cancellation.
    pub fn never() -> Self {
        let (_, signal) = abort_pair();
        signal
    }

    /// Whether the request has been aborted.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal fires. Never resolves if the handle was
    /// dropped without aborting.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A streaming chat connection to one provider.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a streaming completion. Events arrive on the returned
    /// stream; an aborted request ends the stream early without error.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError>;

    /// Run a non-streaming request that must return JSON matching
    /// `schema`.
    async fn generate_structured(
        &self,
        model: &str,
        schema: Value,
        prompt: &str,
    ) -> Result<Value, ProviderError>;
}
