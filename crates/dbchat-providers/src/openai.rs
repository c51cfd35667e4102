//! OpenAI chat-completions transport. Streams deltas over SSE and
//! reassembles fragmented tool calls by index.

use async_trait::async_trait;
use dbchat_protocol::{Message, Role, ToolCall};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ProviderError;
use crate::transport::{AbortSignal, ChatTransport, CompletionRequest, StreamEvent, TokenStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Transport for the OpenAI chat-completions API.
pub struct OpenAiTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new(http: reqwest::Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            messages.push(wire_message(message));
        }
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
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
        body
    }
}

fn wire_message(message: &Message) -> Value {
    match message.role {
        Role::User => json!({"role": "user", "content": message.content}),
        Role::Assistant => {
            let mut value = json!({"role": "assistant", "content": message.content});
            if !message.tool_calls.is_empty() {
                value["tool_calls"] = Value::Array(
                    message
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                },
                            })
                        })
                        .collect(),
                );
            }
            value
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
    }
}

/// Partially assembled tool call, keyed by stream index.
#[derive(Default)]
struct ToolCallDraft {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallDraft {
    fn finish(self) -> Result<ToolCall, ProviderError> {
        let arguments = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments)?
        };
        Ok(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

fn apply_delta(
    drafts: &mut Vec<ToolCallDraft>,
    delta: &Value,
) -> Vec<Result<StreamEvent, ProviderError>> {
    let mut out = Vec::new();
    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            out.push(Ok(StreamEvent::TextDelta(text.to_string())));
        }
    }
    if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
        for fragment in fragments {
            let index = fragment
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(drafts.len() as u64) as usize;
            while drafts.len() <= index {
                drafts.push(ToolCallDraft::default());
            }
            let draft = &mut drafts[index];
            if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                draft.id.push_str(id);
            }
            if let Some(function) = fragment.get("function") {
                if let Some(name) = function.get("name").and_then(Value::as_str) {
                    draft.name.push_str(name);
                }
                if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                    draft.arguments.push_str(args);
                }
            }
        }
    }
    out
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError> {
        let body = self.build_body(&request, true);
        debug!("starting openai stream (model={})", request.model);
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let (tx, rx) = mpsc::channel(32);
        let mut abort = abort;
        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut drafts: Vec<ToolCallDraft> = Vec::new();
            loop {
                let next = tokio::select! {
                    _ = abort.aborted() => {
                        debug!("openai stream aborted by caller");
                        return;
                    }
                    next = events.next() => next,
                };
                let event = match next {
                    None => break,
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        let _ = tx.send(Err(ProviderError::Stream(err.to_string()))).await;
                        return;
                    }
                };
                if event.data == "[DONE]" {
                    break;
                }
                let chunk: Value = match serde_json::from_str(&event.data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!("skipping malformed openai chunk ({err})");
                        continue;
                    }
                };
                if let Some(delta) = chunk.pointer("/choices/0/delta") {
                    for item in apply_delta(&mut drafts, delta) {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                }
            }
            for draft in drafts {
                if tx.send(draft.finish().map(StreamEvent::ToolCall)).await.is_err() {
                    return;
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
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "structured_output", "schema": schema},
            },
        });
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
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
        let payload: Value = response.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Stream("missing structured content".to_string()))?;
        Ok(serde_json::from_str(content)?)
    }
}
