//! Anthropic messages transport. Text and tool-use content blocks
//! arrive as typed SSE events; tool input is accumulated from
//! `input_json_delta` fragments until the block closes.

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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Transport for the Anthropic messages API.
pub struct AnthropicTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicTransport {
    pub fn new(http: reqwest::Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": MAX_TOKENS,
            "messages": wire_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "input_schema": tool.args_schema,
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
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
        Ok(response)
    }
}

fn wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::User => json!({
                "role": "user",
                "content": [{"type": "text", "text": message.content}],
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": message.content}));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!({"role": "assistant", "content": blocks})
            }
            Role::Tool => json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.content,
                }],
            }),
        })
        .collect()
}

/// Tool-use block currently being streamed.
struct OpenToolBlock {
    id: String,
    name: String,
    input: String,
}

impl OpenToolBlock {
    fn finish(self) -> Result<ToolCall, ProviderError> {
        let arguments = if self.input.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.input)?
        };
        Ok(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

#[async_trait]
impl ChatTransport for AnthropicTransport {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError> {
        let body = self.build_body(&request, true);
        debug!("starting anthropic stream (model={})", request.model);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut abort = abort;
        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut open_block: Option<OpenToolBlock> = None;
            loop {
                let next = tokio::select! {
                    _ = abort.aborted() => {
                        debug!("anthropic stream aborted by caller");
                        return;
                    }
                    next = events.next() => next,
                };
                let event = match next {
                    None => return,
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        let _ = tx.send(Err(ProviderError::Stream(err.to_string()))).await;
                        return;
                    }
                };
                let payload: Value = match serde_json::from_str(&event.data) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("skipping malformed anthropic event ({err})");
                        continue;
                    }
                };
                let kind = payload.get("type").and_then(Value::as_str).unwrap_or("");
                let item = match kind {
                    "content_block_start" => {
                        let block = &payload["content_block"];
                        if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                            open_block = Some(OpenToolBlock {
                                id: block
                                    .get("id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                name: block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                input: String::new(),
                            });
                        }
                        None
                    }
                    "content_block_delta" => {
                        let delta = &payload["delta"];
                        match delta.get("type").and_then(Value::as_str) {
                            Some("text_delta") => delta
                                .get("text")
                                .and_then(Value::as_str)
                                .filter(|text| !text.is_empty())
                                .map(|text| Ok(StreamEvent::TextDelta(text.to_string()))),
                            Some("input_json_delta") => {
                                if let (Some(block), Some(part)) = (
                                    open_block.as_mut(),
                                    delta.get("partial_json").and_then(Value::as_str),
                                ) {
                                    block.input.push_str(part);
                                }
                                None
                            }
                            _ => None,
                        }
                    }
                    "content_block_stop" => open_block
                        .take()
                        .map(|block| block.finish().map(StreamEvent::ToolCall)),
                    "message_stop" => return,
                    "error" => {
                        let message = payload
                            .pointer("/error/message")
                            .and_then(Value::as_str)
                            .unwrap_or("provider reported an error")
                            .to_string();
                        Some(Err(ProviderError::Stream(message)))
                    }
                    _ => None,
                };
                if let Some(item) = item {
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() || failed {
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
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
            "tools": [{
                "name": "structured_output",
                "description": "Return the structured result",
                "input_schema": schema,
            }],
            "tool_choice": {"type": "tool", "name": "structured_output"},
        });
        let response = self.post(&body).await?;
        let payload: Value = response.json().await?;
        let blocks = payload
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Stream("missing response content".to_string()))?;
        blocks
            .iter()
            .find(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .and_then(|block| block.get("input"))
            .cloned()
            .ok_or_else(|| ProviderError::Stream("missing structured output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tool_result_maps_to_user_tool_result_block() {
        let messages = vec![Message::tool_result("toolu_1", &json!({"ok": true}))];
        let wire = wire_messages(&messages);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["content"][0]["type"], "tool_result");
        assert_eq!(wire[0]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn open_block_accumulates_partial_json() {
        let block = OpenToolBlock {
            id: "toolu_2".to_string(),
            name: "run_query".to_string(),
            input: "{\"query\": \"select 1\"}".to_string(),
        };
        let call = block.finish().unwrap();
        assert_eq!(call.arguments, json!({"query": "select 1"}));
    }

    #[test]
    fn assistant_message_interleaves_text_and_tool_use() {
        let call = ToolCall {
            id: "toolu_3".to_string(),
            name: "get_tables".to_string(),
            arguments: json!({}),
        };
        let wire = wire_messages(&[Message::assistant("Let me check.", vec![call])]);
        assert_eq!(wire[0]["content"][0]["type"], "text");
        assert_eq!(wire[0]["content"][1]["type"], "tool_use");
    }
}
