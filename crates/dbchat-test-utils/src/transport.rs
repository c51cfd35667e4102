//! Scripted transport for driving the orchestrator without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dbchat_protocol::ToolCall;
use dbchat_providers::{
    AbortSignal, ChatTransport, CompletionRequest, ProviderError, StreamEvent, TokenStream,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One scripted item inside a model round.
#[derive(Debug, Clone)]
pub enum ScriptItem {
    /// Emit a text delta.
    Delta(String),
    /// Emit an assembled tool call.
    ToolCall(ToolCall),
    /// Park the stream until the request is aborted, then end it.
    StallUntilAbort,
}

/// A [`ChatTransport`] that replays scripted rounds and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    rounds: Mutex<VecDeque<Vec<ScriptItem>>>,
    repeated: Mutex<Option<Vec<ScriptItem>>>,
    fail_next: Mutex<Option<ProviderError>>,
    requests: Mutex<Vec<CompletionRequest>>,
    structured: Mutex<VecDeque<Value>>,
    structured_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that answers every round with the same script, for
    /// tests that need an unbounded sequence of identical rounds.
    pub fn repeating(round: Vec<ScriptItem>) -> Self {
        let transport = Self::new();
        *transport.repeated.lock() = Some(round);
        transport
    }

    /// Queue the next round's events.
    pub fn push_round(&self, round: Vec<ScriptItem>) {
        self.rounds.lock().push_back(round);
    }

    /// Fail the next `stream_completion` with the given error.
    pub fn fail_next(&self, error: ProviderError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Queue the next structured-generation result.
    pub fn push_structured(&self, value: Value) {
        self.structured.lock().push_back(value);
    }

    /// Number of completion requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of structured-generation calls received so far.
    pub fn structured_call_count(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    fn next_round(&self) -> Vec<ScriptItem> {
        if let Some(round) = self.rounds.lock().pop_front() {
            return round;
        }
        self.repeated.lock().clone().unwrap_or_default()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError> {
        self.requests.lock().push(request);
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        let round = self.next_round();
        let (tx, rx) = mpsc::channel(16);
        let mut abort = abort;
        tokio::spawn(async move {
            for item in round {
                match item {
                    ScriptItem::Delta(delta) => {
                        if tx.send(Ok(StreamEvent::TextDelta(delta))).await.is_err() {
                            return;
                        }
                    }
                    ScriptItem::ToolCall(call) => {
                        if tx.send(Ok(StreamEvent::ToolCall(call))).await.is_err() {
                            return;
                        }
                    }
                    ScriptItem::StallUntilAbort => {
                        abort.aborted().await;
                        return;
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    async fn generate_structured(
        &self,
        _model: &str,
        _schema: Value,
        _prompt: &str,
    ) -> Result<Value, ProviderError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .structured
            .lock()
            .pop_front()
            .unwrap_or_else(|| json!({"title": "Scripted chat"})))
    }
}
