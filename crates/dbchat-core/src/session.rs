//! The chat session orchestrator: model selection, the turn loop,
//! approval suspension, aborts, persistence, and title generation.

use std::sync::Arc;

use async_trait::async_trait;
use dbchat_config::{ChatConfig, ProviderKind};
use dbchat_protocol::{
    EventMsg, EventPayload, EventSink, Message, SessionId, ToolCall, ToolError, TurnId,
};
use dbchat_providers::{
    AbortHandle, AbortSignal, ChatTransport, CompletionRequest, LocalModelApi, ModelChoice,
    ModelProvisioner, ProviderRegistry, ProvisionEvent, StreamEvent, abort_pair,
};
use dbchat_tools::{ToolApprover, ToolGateway, ToolOutcome, ToolRegistry};
use futures_util::StreamExt;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde_json::json;
use uuid::Uuid;

use crate::error::ChatError;
use crate::gate::{PendingPermission, PermissionGate};
use crate::host::{HostEnvironment, HostError, TabStore};
use crate::prompt;

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// No turn in flight.
    #[default]
    Idle,
    /// A model stream or tool call is running.
    Streaming,
    /// A tool call is suspended on a human decision.
    AwaitingPermission,
    /// The last turn failed; the session stays usable.
    Error,
}

#[derive(Default)]
struct SessionState {
    status: SessionStatus,
    provider: Option<ProviderKind>,
    model: Option<String>,
    transport: Option<Arc<dyn ChatTransport>>,
    messages: Vec<Message>,
    title: Option<String>,
    last_error: Option<String>,
    followup: Option<String>,
    abort: Option<AbortHandle>,
    provisioning: bool,
}

enum TurnEnd {
    Completed(String),
    Rejected { call_id: String },
    Aborted,
}

/// One conversation bound to a host tab. Callers hold the session
/// behind `Arc` so the approval UI can resolve decisions while `send`
/// is suspended.
pub struct ChatSession {
    id: SessionId,
    config: ChatConfig,
    registry: ProviderRegistry,
    tools: Arc<ToolRegistry>,
    host: Arc<dyn HostEnvironment>,
    tabs: Arc<dyn TabStore>,
    sink: Option<Arc<dyn EventSink>>,
    local_api: Arc<dyn LocalModelApi>,
    gate: PermissionGate,
    state: RwLock<SessionState>,
}

impl ChatSession {
    pub fn new(
        config: ChatConfig,
        tools: Arc<ToolRegistry>,
        host: Arc<dyn HostEnvironment>,
        tabs: Arc<dyn TabStore>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let registry = ProviderRegistry::new();
        let local_api: Arc<dyn LocalModelApi> =
            Arc::new(registry.create_ollama(&config.providers));
        Self {
            id: Uuid::new_v4(),
            config,
            registry,
            tools,
            host,
            tabs,
            sink,
            local_api,
            gate: PermissionGate::new(),
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Replace the local model-management API, mainly for tests.
    pub fn with_local_api(mut self, api: Arc<dyn LocalModelApi>) -> Self {
        self.local_api = api;
        self
    }

    /// Seed the conversation with previously persisted messages.
    pub fn with_initial_messages(self, messages: Vec<Message>) -> Self {
        self.state.write().messages = messages;
        self
    }

    /// Pre-select a model with an explicit transport, bypassing the
    /// registry.
    pub fn with_transport(
        self,
        kind: ProviderKind,
        model: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        {
            let mut state = self.state.write();
            state.provider = Some(kind);
            state.model = Some(model.into());
            state.transport = Some(transport);
        }
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    /// Currently selected provider and model, if any.
    pub fn selected_model(&self) -> Option<(ProviderKind, String)> {
        let state = self.state.read();
        match (state.provider, &state.model) {
            (Some(provider), Some(model)) => Some((provider, model.clone())),
            _ => None,
        }
    }

    /// Snapshot of the conversation history.
    pub fn messages(&self) -> Vec<Message> {
        self.state.read().messages.clone()
    }

    pub fn title(&self) -> Option<String> {
        self.state.read().title.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// Whether a local model pull is currently running.
    pub fn is_provisioning(&self) -> bool {
        self.state.read().provisioning
    }

    /// The tool call currently suspended on a decision, if any.
    pub fn pending_permission(&self) -> Option<PendingPermission> {
        self.gate.pending()
    }

    /// Approve the pending tool call. No-op when nothing is pending.
    pub fn accept_permission(&self) -> bool {
        self.gate.accept()
    }

    /// Reject the pending tool call, optionally telling the model what
    /// to do instead. No-op when nothing is pending.
    pub fn reject_permission(&self, followup: Option<String>) -> bool {
        self.gate.reject(followup)
    }

    /// Every model selectable with the current configuration.
    pub async fn available_models(&self) -> Vec<ModelChoice> {
        self.registry.available_models(&self.config.providers).await
    }

    /// Select the provider and model for subsequent turns. A local
    /// model is provisioned first; selection completes even when
    /// provisioning fails.
    pub async fn set_model(&self, kind: ProviderKind, model: &str) {
        self.state.write().provider = Some(kind);
        if kind.is_local() {
            self.state.write().provisioning = true;
            self.provision_local(model).await;
            self.state.write().provisioning = false;
        }
        let mut state = self.state.write();
        state.model = Some(model.to_string());
        state.transport = None;
        info!(
            "model selected (session_id={}, provider={kind}, model={model})",
            self.id
        );
    }

    async fn provision_local(&self, model: &str) {
        let provisioner = ModelProvisioner::new(self.local_api.clone());
        let mut on_event = |event: ProvisionEvent| match event {
            ProvisionEvent::PullStarting => {
                self.host.notify(
                    "pluginError",
                    json!({
                        "message": format!(
                            "Pulling model: {model}. This may take a few minutes for the first time."
                        ),
                        "name": "Ollama",
                    }),
                );
                self.emit(EventPayload::ModelPull {
                    model: model.to_string(),
                    status: "starting".to_string(),
                    completed: None,
                    total: None,
                });
            }
            ProvisionEvent::Progress(progress) => {
                self.emit(EventPayload::ModelPull {
                    model: model.to_string(),
                    status: progress.status,
                    completed: progress.completed,
                    total: progress.total,
                });
            }
            ProvisionEvent::PullCompleted => {
                self.host.notify(
                    "pluginError",
                    json!({
                        "message": format!("Successfully pulled model: {model}"),
                        "name": "Ollama",
                    }),
                );
                self.emit(EventPayload::ModelPull {
                    model: model.to_string(),
                    status: "completed".to_string(),
                    completed: None,
                    total: None,
                });
            }
        };
        // Provisioning failure never blocks selection.
        if let Err(err) = provisioner.ensure_available(model, &mut on_event).await {
            warn!(
                "model provisioning failed (session_id={}, model={model}, error={err})",
                self.id
            );
            self.host.notify(
                "pluginError",
                json!({
                    "message": format!("Error with Ollama model: {err}"),
                    "name": "Ollama Error",
                }),
            );
        }
    }

    /// Send a user message and run the turn to completion, including
    /// any automatic follow-up after a rejection.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ChatError> {
        let text = text.into();
        {
            let mut state = self.state.write();
            if !matches!(state.status, SessionStatus::Idle | SessionStatus::Error) {
                return Err(ChatError::Busy);
            }
            state.status = SessionStatus::Streaming;
            state.last_error = None;
        }

        let result = self.drive(text).await;
        let mut status_after = SessionStatus::Idle;
        if let Err(err) = &result {
            let message = err.human_message();
            warn!("turn failed (session_id={}, error={err})", self.id);
            self.host.notify(
                "pluginError",
                json!({"message": message, "name": err.name()}),
            );
            self.emit(EventPayload::Error {
                turn_id: None,
                message: message.clone(),
            });
            self.state.write().last_error = Some(message);
            status_after = SessionStatus::Error;
        }
        {
            let mut state = self.state.write();
            state.status = status_after;
            state.abort = None;
        }
        result
    }

    /// Cancel the in-flight stream and any pending permission wait,
    /// then persist whatever partial history exists. Not an error; a
    /// no-op when nothing is in flight.
    pub fn abort(&self) {
        let handle = self.state.write().abort.take();
        if let Some(handle) = handle {
            info!("aborting in-flight turn (session_id={})", self.id);
            handle.abort();
        }
        self.gate.cancel();
    }

    async fn drive(&self, text: String) -> Result<(), ChatError> {
        let transport = self.current_transport()?;
        let model = self
            .state
            .read()
            .model
            .clone()
            .ok_or(ChatError::NoModelSelected)?;
        let (handle, signal) = abort_pair();
        self.state.write().abort = Some(handle);

        self.push_message(Message::user(text));
        let system = prompt::default_instructions(self.host.as_ref()).await;

        loop {
            let turn_id = Uuid::new_v4();
            self.emit(EventPayload::TurnStarted { turn_id });
            match self
                .run_turn(&transport, &model, &system, turn_id, signal.clone())
                .await?
            {
                TurnEnd::Completed(message) => {
                    self.persist()?;
                    self.emit(EventPayload::TurnCompleted { turn_id, message });
                    self.fill_title(&transport, &model).await;
                    return Ok(());
                }
                TurnEnd::Aborted => {
                    self.persist()?;
                    self.emit(EventPayload::TurnAborted { turn_id });
                    info!("turn aborted (session_id={}, turn_id={})", self.id, turn_id);
                    return Ok(());
                }
                TurnEnd::Rejected { call_id } => {
                    self.persist()?;
                    self.host.notify(
                        "pluginError",
                        json!({
                            "message": format!("User rejected tool call. (toolCallId: {call_id})"),
                            "name": "ToolExecutionError",
                        }),
                    );
                    let followup = self.state.write().followup.take();
                    match followup {
                        Some(followup) => {
                            self.push_message(Message::user(followup));
                            self.persist()?;
                            self.fill_title(&transport, &model).await;
                            // Replay a fresh turn over the updated history.
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn run_turn(
        &self,
        transport: &Arc<dyn ChatTransport>,
        model: &str,
        system: &str,
        turn_id: TurnId,
        abort: AbortSignal,
    ) -> Result<TurnEnd, ChatError> {
        let max_steps = self.config.limits.max_turn_steps;
        let mut last_text = String::new();
        for round in 1..=max_steps {
            if abort.is_aborted() {
                return Ok(TurnEnd::Aborted);
            }
            let request = CompletionRequest {
                model: model.to_string(),
                system: Some(system.to_string()),
                messages: self.state.read().messages.clone(),
                tools: self.tools.specs(),
                temperature: self.config.limits.temperature,
            };
            debug!(
                "opening model stream (session_id={}, turn_id={}, round={round})",
                self.id, turn_id
            );
            let mut stream = transport.stream_completion(request, abort.clone()).await?;
            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::TextDelta(delta) => {
                        self.emit(EventPayload::AssistantDelta {
                            turn_id,
                            delta: delta.clone(),
                        });
                        text.push_str(&delta);
                    }
                    StreamEvent::ToolCall(call) => calls.push(call),
                }
            }
            if abort.is_aborted() {
                if !text.is_empty() {
                    self.push_message(Message::assistant(text, Vec::new()));
                }
                return Ok(TurnEnd::Aborted);
            }

            self.push_message(Message::assistant(text.clone(), calls.clone()));
            if calls.is_empty() {
                return Ok(TurnEnd::Completed(text));
            }
            last_text = text;

            let gateway = ToolGateway::new(self.tools.as_ref());
            for call in &calls {
                // An abort while an earlier call ran must not raise a
                // fresh permission request.
                if abort.is_aborted() {
                    return Ok(TurnEnd::Aborted);
                }
                self.emit(EventPayload::ToolCallStarted {
                    turn_id,
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
                let approver = GateApprover {
                    session: self,
                    turn_id,
                    abort: abort.clone(),
                };
                match gateway.invoke(call, &approver).await {
                    Ok(ToolOutcome::Completed(result)) => {
                        self.emit(EventPayload::ToolCallFinished {
                            turn_id,
                            call_id: call.id.clone(),
                            result: result.clone(),
                            success: true,
                        });
                        self.push_message(Message::tool_result(call.id.clone(), &result));
                    }
                    Ok(ToolOutcome::Rejected(payload)) => {
                        self.emit(EventPayload::ToolCallFinished {
                            turn_id,
                            call_id: call.id.clone(),
                            result: payload.clone(),
                            success: false,
                        });
                        self.push_message(Message::tool_result(call.id.clone(), &payload));
                        return Ok(TurnEnd::Rejected {
                            call_id: call.id.clone(),
                        });
                    }
                    Err(ToolError::ApprovalCancelled(_)) => return Ok(TurnEnd::Aborted),
                    Err(err) => return Err(ChatError::Tool(err)),
                }
            }
            if round == max_steps {
                info!(
                    "step ceiling reached, ending turn (session_id={}, turn_id={}, steps={max_steps})",
                    self.id, turn_id
                );
            }
        }
        Ok(TurnEnd::Completed(last_text))
    }

    /// Generate a short conversation title once, after the first
    /// completed exchange. Failures only log; a missing title is not
    /// an error.
    async fn fill_title(&self, transport: &Arc<dyn ChatTransport>, model: &str) {
        if self
            .tabs
            .conversation_title()
            .is_some_and(|title| !title.is_empty())
        {
            debug!(
                "title already set, skipping generation (session_id={})",
                self.id
            );
            return;
        }
        let transcript = {
            let state = self.state.read();
            state
                .messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt_text = format!(
            "Name this conversation in less than 30 characters.\n```{transcript}\n```"
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The title of the conversation"},
            },
            "required": ["title"],
        });
        match transport.generate_structured(model, schema, &prompt_text).await {
            Ok(value) => {
                let Some(title) = value.get("title").and_then(|t| t.as_str()) else {
                    warn!("title generation returned no title (session_id={})", self.id);
                    return;
                };
                let title: String = title
                    .chars()
                    .take(self.config.limits.title_max_chars)
                    .collect();
                if let Err(err) = self.tabs.set_tab_title(&title) {
                    warn!(
                        "failed to persist title (session_id={}, error={err})",
                        self.id
                    );
                    return;
                }
                self.state.write().title = Some(title.clone());
                self.emit(EventPayload::TitleChanged { title });
            }
            Err(err) => {
                warn!("title generation failed (session_id={}, error={err})", self.id);
            }
        }
    }

    fn current_transport(&self) -> Result<Arc<dyn ChatTransport>, ChatError> {
        {
            let state = self.state.read();
            if let Some(transport) = &state.transport {
                return Ok(transport.clone());
            }
        }
        let kind = self
            .state
            .read()
            .provider
            .ok_or(ChatError::NoModelSelected)?;
        let transport = self
            .registry
            .create_transport(kind, &self.config.providers)?;
        self.state.write().transport = Some(transport.clone());
        Ok(transport)
    }

    fn push_message(&self, message: Message) {
        self.state.write().messages.push(message);
    }

    fn persist(&self) -> Result<(), ChatError> {
        if !self.config.persistence.enabled {
            return Ok(());
        }
        let messages = self.state.read().messages.clone();
        let value = serde_json::to_value(&messages)
            .map_err(|err| HostError::State(err.to_string()))?;
        self.tabs.set_tab_state("messages", value)?;
        Ok(())
    }

    fn emit(&self, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.emit(EventMsg::new(self.id, payload));
        }
    }
}

/// Approver that suspends each tool call on the session's gate.
struct GateApprover<'a> {
    session: &'a ChatSession,
    turn_id: TurnId,
    abort: AbortSignal,
}

#[async_trait]
impl ToolApprover for GateApprover<'_> {
    async fn approve(&self, call: &ToolCall) -> Result<bool, ToolError> {
        let session = self.session;
        if self.abort.is_aborted() {
            return Err(ToolError::ApprovalCancelled(call.id.clone()));
        }
        session.state.write().status = SessionStatus::AwaitingPermission;
        session.emit(EventPayload::PermissionRequested {
            turn_id: self.turn_id,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        let mut abort = self.abort.clone();
        let request = session.gate.request(PendingPermission {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        let decision = tokio::select! {
            decision = request => {
                decision.map_err(|_| ToolError::ApprovalCancelled(call.id.clone()))?
            }
            _ = abort.aborted() => {
                // Clear the parked request so nothing stays pending.
                session.gate.cancel();
                return Err(ToolError::ApprovalCancelled(call.id.clone()));
            }
        };
        session.state.write().status = SessionStatus::Streaming;
        session.emit(EventPayload::ApprovalResolved {
            turn_id: self.turn_id,
            call_id: call.id.clone(),
            approved: decision.approved,
        });
        if !decision.approved {
            if let Some(followup) = decision.followup {
                session.state.write().followup = Some(followup);
            }
        }
        Ok(decision.approved)
    }
}
