//! Single-slot permission gate. One tool call at a time suspends here
//! until the user accepts or rejects it.

use dbchat_protocol::ToolCallId;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors observed by the waiting side of the gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// A request is already pending; requests are strictly sequential.
    #[error("a permission request is already pending")]
    AlreadyPending,
    /// The wait was cancelled before a decision arrived.
    #[error("permission request cancelled")]
    Cancelled,
}

/// The tool call currently awaiting a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPermission {
    /// Call id of the suspended tool call.
    pub call_id: ToolCallId,
    /// Tool the model wants to run.
    pub tool_name: String,
    /// Arguments it proposed.
    pub arguments: Value,
}

/// A resolved permission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the call may run.
    pub approved: bool,
    /// Optional user follow-up recorded alongside a rejection.
    pub followup: Option<String>,
}

enum Slot {
    Idle,
    Awaiting {
        request: PendingPermission,
        sender: oneshot::Sender<Decision>,
    },
}

/// Suspends one tool call until a human decision arrives. The slot
/// returns to `Idle` the moment a decision is recorded, so a second
/// decision for the same episode is a no-op.
pub struct PermissionGate {
    slot: Mutex<Slot>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
        }
    }

    /// Park the caller until a decision arrives. Errors immediately if
    /// another request is already pending.
    pub async fn request(&self, request: PendingPermission) -> Result<Decision, GateError> {
        let receiver = {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Awaiting { .. }) {
                return Err(GateError::AlreadyPending);
            }
            let (sender, receiver) = oneshot::channel();
            *slot = Slot::Awaiting { request, sender };
            receiver
        };
        receiver.await.map_err(|_| GateError::Cancelled)
    }

    /// The request currently awaiting a decision, if any.
    pub fn pending(&self) -> Option<PendingPermission> {
        match &*self.slot.lock() {
            Slot::Idle => None,
            Slot::Awaiting { request, .. } => Some(request.clone()),
        }
    }

    /// Approve the pending request. Returns false when nothing is
    /// pending.
    pub fn accept(&self) -> bool {
        self.resolve(Decision {
            approved: true,
            followup: None,
        })
    }

    /// Reject the pending request, optionally recording a follow-up
    /// message. Returns false when nothing is pending.
    pub fn reject(&self, followup: Option<String>) -> bool {
        self.resolve(Decision {
            approved: false,
            followup,
        })
    }

    /// Drop the pending request without a decision; the waiter
    /// observes [`GateError::Cancelled`].
    pub fn cancel(&self) -> bool {
        let slot = std::mem::replace(&mut *self.slot.lock(), Slot::Idle);
        matches!(slot, Slot::Awaiting { .. })
    }

    fn resolve(&self, decision: Decision) -> bool {
        let slot = std::mem::replace(&mut *self.slot.lock(), Slot::Idle);
        match slot {
            Slot::Idle => false,
            Slot::Awaiting { sender, .. } => {
                // Receiver may have been dropped by an aborted waiter.
                let _ = sender.send(decision);
                true
            }
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}
