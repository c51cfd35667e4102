//! Gemini transport. The API has no tool-call ids, so ids are
//! synthesized on receipt and mapped back to function names when
//! sending tool results.

use std::collections::HashMap;

use async_trait::async_trait;
use dbchat_protocol::{Message, Role, ToolCall};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::transport::{AbortSignal, ChatTransport, CompletionRequest, StreamEvent, TokenStream};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Transport for the Google Gemini generateContent API.
pub struct GoogleTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleTransport {
    pub fn new(http: reqwest::Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:{method}",
            self.base_url.trim_end_matches('/')
        )
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "contents": wire_contents(&request.messages),
            "generationConfig": {"temperature": request.temperature},
        });
        if let Some(system) = &request.system {
            body["system_instruction"] = json!({"parts": [{"text": system}]});
        }
        if !request.tools.is_empty() {
            body["tools"] = json!([{
                "function_declarations": request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.args_schema,
                        })
                    })
                    .collect::<Vec<_>>(),
            }]);
        }
        body
    }
}

fn wire_contents(messages: &[Message]) -> Vec<Value> {
    // Tool results reference calls by id; Gemini wants the function name.
    let mut names: HashMap<&str, &str> = HashMap::new();
    for message in messages {
        for call in &message.tool_calls {
            names.insert(call.id.as_str(), call.name.as_str());
        }
    }
    messages
        .iter()
        .map(|message| match message.role {
            Role::User => json!({
                "role": "user",
                "parts": [{"text": message.content}],
            }),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !message.content.is_empty() {
                    parts.push(json!({"text": message.content}));
                }
                for call in &message.tool_calls {
                    parts.push(json!({
                        "functionCall": {"name": call.name, "args": call.arguments},
                    }));
                }
                json!({"role": "model", "parts": parts})
            }
            Role::Tool => {
                let name = message
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| names.get(id).copied())
                    .unwrap_or("unknown");
                let response: Value = serde_json::from_str(&message.content)
                    .unwrap_or_else(|_| json!(message.content));
                json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": {"result": response},
                        },
                    }],
                })
            }
        })
        .collect()
}

fn chunk_events(chunk: &Value) -> Vec<Result<StreamEvent, ProviderError>> {
    let mut out = Vec::new();
    let Some(parts) = chunk
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return out;
    };
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                out.push(Ok(StreamEvent::TextDelta(text.to_string())));
            }
        }
        if let Some(call) = part.get("functionCall") {
            out.push(Ok(StreamEvent::ToolCall(ToolCall {
                id: Uuid::new_v4().to_string(),
                name: call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
            })));
        }
    }
    out
}

#[async_trait]
impl ChatTransport for GoogleTransport {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        abort: AbortSignal,
    ) -> Result<TokenStream, ProviderError> {
        let body = self.build_body(&request);
        let url = format!(
            "{}?alt=sse",
            self.model_url(&request.model, "streamGenerateContent")
        );
        debug!("starting google stream (model={})", request.model);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
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
            loop {
                let next = tokio::select! {
                    _ = abort.aborted() => {
                        debug!("google stream aborted by caller");
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
                let chunk: Value = match serde_json::from_str(&event.data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!("skipping malformed google chunk ({err})");
                        continue;
                    }
                };
                for item in chunk_events(&chunk) {
                    if tx.send(item).await.is_err() {
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
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": schema,
            },
        });
        let response = self
            .http
            .post(self.model_url(model, "generateContent"))
            .header("x-goog-api-key", &self.api_key)
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
        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Stream("missing structured content".to_string()))?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn function_call_gets_synthesized_id() {
        let chunk = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "run_query", "args": {"query": "select 1"}}},
            ]}}],
        });
        let events = chunk_events(&chunk);
        assert_eq!(events.len(), 1);
        match events.into_iter().next().unwrap().unwrap() {
            StreamEvent::ToolCall(call) => {
                assert_eq!(call.name, "run_query");
                assert!(!call.id.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tool_result_resolves_function_name_from_history() {
        let call = ToolCall {
            id: "gen-1".to_string(),
            name: "get_columns".to_string(),
            arguments: json!({"table": "users"}),
        };
        let messages = vec![
            Message::assistant("", vec![call]),
            Message::tool_result("gen-1", &json!({"columns": ["id"]})),
        ];
        let wire = wire_contents(&messages);
        assert_eq!(
            wire[1]["parts"][0]["functionResponse"]["name"],
            "get_columns"
        );
    }
}
