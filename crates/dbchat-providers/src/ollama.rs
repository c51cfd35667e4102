//! Ollama HTTP client. Covers the chat endpoint (NDJSON streaming)
//! plus the model-management surface used by provisioning: tags, pull,
//! and delete.

use async_trait::async_trait;
use dbchat_protocol::{Message, Role, ToolCall};
use futures_util::StreamExt;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::provision::{InstalledModel, LocalModelApi, PullProgress, PullStream};
use crate::transport::{AbortSignal, ChatTransport, CompletionRequest, StreamEvent, TokenStream};

/// Client for a local Ollama server.
pub struct OllamaClient {
    http: reqwest::Client,
    server_url: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, server_url: String) -> Self {
        Self { http, server_url }
    }

    /// Endpoint URL under the server's `/api/` prefix. Users often
    /// configure the bare server address, so the prefix is added when
    /// missing.
    fn api_url(&self, endpoint: &str) -> String {
        let base = self.server_url.trim_end_matches('/');
        if base.ends_with("/api") || base.contains("/api/") {
            format!("{base}/{endpoint}")
        } else {
            format!("{base}/api/{endpoint}")
        }
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self.http.post(self.api_url(endpoint)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Whether the server is reachable.
    pub async fn check_connection(&self) -> bool {
        self.fetch_models().await.is_ok()
    }

    async fn fetch_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        let response = self.http.get(self.api_url("tags")).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models)
    }

    /// Remove an installed model from the server.
    pub async fn delete_model(&self, name: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .delete(self.api_url("delete"))
            .json(&json!({"name": name}))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

fn wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::new();
    if let Some(system) = system {
        wire.push(json!({"role": "system", "content": system}));
    }
    for message in messages {
        match message.role {
            Role::User => wire.push(json!({"role": "user", "content": message.content})),
            Role::Assistant => {
                let mut value = json!({"role": "assistant", "content": message.content});
                if !message.tool_calls.is_empty() {
                    value["tool_calls"] = Value::Array(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments,
                                    },
                                })
                            })
                            .collect(),
                    );
                }
                wire.push(value);
            }
            Role::Tool => wire.push(json!({"role": "tool", "content": message.content})),
        }
    }
    wire
}

fn chunk_events(chunk: &Value) -> Vec<Result<StreamEvent, ProviderError>> {
    let mut out = Vec::new();
    if let Some(error) = chunk.get("error").and_then(Value::as_str) {
        out.push(Err(ProviderError::Stream(error.to_string())));
        return out;
    }
    let Some(message) = chunk.get("message") else {
        return out;
    };
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            out.push(Ok(StreamEvent::TextDelta(text.to_string())));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = &call["function"];
            out.push(Ok(StreamEvent::ToolCall(ToolCall {
                // Ollama does not issue call ids.
                id: Uuid::new_v4().to_string(),
                name: function
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: function.get("arguments").cloned().unwrap_or_else(|| json!({})),
            })));
        }
    }
    out
}

/// Incremental NDJSON line splitter over a byte stream.
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[async_trait]
impl ChatTransport for OllamaClient {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError> {
        let mut body = json!({
            "model": request.model,
            "messages": wire_messages(request.system.as_deref(), &request.messages),
            "stream": true,
            "options": {"temperature": request.temperature},
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.args_schema,
                            },
                        })
                    })
                    .collect(),
            );
        }
        debug!("starting ollama stream (model={})", request.model);
        let response = self.post("chat", &body).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut abort = abort;
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::new();
            loop {
                let next = tokio::select! {
                    _ = abort.aborted() => {
                        debug!("ollama stream aborted by caller");
                        return;
                    }
                    next = bytes.next() => next,
                };
                let chunk = match next {
                    None => return,
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => {
                        let _ = tx.send(Err(ProviderError::Stream(err.to_string()))).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    let parsed: Value = match serde_json::from_str(&line) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            warn!("skipping malformed ollama line ({err})");
                            continue;
                        }
                    };
                    let done = parsed.get("done").and_then(Value::as_bool).unwrap_or(false);
                    for item in chunk_events(&parsed) {
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() || failed {
                            return;
                        }
                    }
                    if done {
                        return;
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    async fn generate_structured(
        &self,
        model: &str,
        schema: Value,
        prompt: &str,
    ) -> Result<Value, ProviderError> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "format": schema,
        });
        let response = self.post("chat", &body).await?;
        let payload: Value = response.json().await?;
        let content = payload
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Stream("missing structured content".to_string()))?;
        Ok(serde_json::from_str(content)?)
    }
}

#[async_trait]
impl LocalModelApi for OllamaClient {
    async fn installed_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        self.fetch_models().await
    }

    async fn pull_model(&self, name: &str) -> Result<PullStream, ProviderError> {
        let response = self
            .post("pull", &json!({"name": name, "stream": true}))
            .await?;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(ProviderError::Stream(err.to_string()))).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    let item = match serde_json::from_str::<Value>(&line) {
                        Ok(parsed) => {
                            if let Some(error) = parsed.get("error").and_then(Value::as_str) {
                                Err(ProviderError::Stream(error.to_string()))
                            } else {
                                Ok(PullProgress {
                                    status: parsed
                                        .get("status")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_string(),
                                    digest: parsed
                                        .get("digest")
                                        .and_then(Value::as_str)
                                        .map(str::to_string),
                                    total: parsed.get("total").and_then(Value::as_u64),
                                    completed: parsed.get("completed").and_then(Value::as_u64),
                                })
                            }
                        }
                        Err(err) => {
                            warn!("skipping malformed pull line ({err})");
                            continue;
                        }
                    };
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() || failed {
                        return;
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }
}
