//! Promotion gates for human-in-the-loop release approval.
//!
//! A gate suspends forward progress as engine state, not a blocked
//! thread: the awaiting side holds a oneshot receiver, and the only
//! transitions out of Awaiting-Approval are `approve`, `reject`, or a
//! configured timeout (reported as a rejection with reason Timeout).

use crate::core::{ApprovalState, ExecutionId};
use crate::errors::{PromotionRejectedError, ReleaseflowError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// A decision delivered to a waiting gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The gate was approved.
    Approved {
        /// Who approved, if known.
        actor: Option<String>,
    },
    /// The gate was rejected.
    Rejected {
        /// Who rejected, if known.
        actor: Option<String>,
        /// The rejection note.
        note: String,
    },
}

/// A granted approval.
#[derive(Debug, Clone)]
pub struct Approval {
    /// Who approved, if known.
    pub actor: Option<String>,
    /// When the decision arrived.
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingGate {
    execution: ExecutionId,
    opened_at: DateTime<Utc>,
    response_tx: oneshot::Sender<GateDecision>,
}

/// Registry of gates currently awaiting a decision.
///
/// Keyed by stage name; at most one gate per stage can be open, which
/// matches the engine's one-active-execution-per-stage rule.
#[derive(Debug, Default)]
pub struct GateRegistry {
    pending: RwLock<HashMap<String, PendingGate>>,
    states: RwLock<HashMap<String, ApprovalState>>,
}

impl GateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a gate and waits for its decision.
    ///
    /// # Errors
    ///
    /// Returns `PromotionRejectedError` on rejection or timeout, and an
    /// internal error if the stage already has an open gate.
    pub async fn await_decision(
        &self,
        stage: &str,
        execution: ExecutionId,
        timeout: Option<Duration>,
    ) -> Result<Approval, ReleaseflowError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.write();
            if pending.contains_key(stage) {
                return Err(ReleaseflowError::Internal(format!(
                    "gate '{stage}' already has an open approval request"
                )));
            }
            pending.insert(
                stage.to_string(),
                PendingGate {
                    execution,
                    opened_at: Utc::now(),
                    response_tx: tx,
                },
            );
        }
        self.set_state(stage, ApprovalState::AwaitingApproval);

        let received = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.write().remove(stage);
                    self.set_state(stage, ApprovalState::Rejected);
                    return Err(PromotionRejectedError::timeout(stage).into());
                }
            },
            None => rx.await,
        };

        // The sender side removes the entry before resolving; clean up
        // here only for the closed-channel path.
        match received {
            Ok(GateDecision::Approved { actor }) => {
                self.set_state(stage, ApprovalState::Approved);
                Ok(Approval {
                    actor,
                    decided_at: Utc::now(),
                })
            }
            Ok(GateDecision::Rejected { actor, note }) => {
                self.set_state(stage, ApprovalState::Rejected);
                Err(PromotionRejectedError::rejected(stage, actor, note).into())
            }
            Err(_) => {
                self.pending.write().remove(stage);
                self.set_state(stage, ApprovalState::Pending);
                Err(ReleaseflowError::Internal(format!(
                    "approval channel for gate '{stage}' closed without a decision"
                )))
            }
        }
    }

    /// Returns the state of a gate; `Pending` if it has never opened.
    #[must_use]
    pub fn state(&self, stage: &str) -> ApprovalState {
        self.states
            .read()
            .get(stage)
            .copied()
            .unwrap_or(ApprovalState::Pending)
    }

    fn set_state(&self, stage: &str, state: ApprovalState) {
        self.states.write().insert(stage.to_string(), state);
    }

    /// Approves an open gate. Returns false if none is open.
    pub fn approve(&self, stage: &str, actor: Option<&str>) -> bool {
        self.resolve(
            stage,
            GateDecision::Approved {
                actor: actor.map(ToString::to_string),
            },
        )
    }

    /// Rejects an open gate. Returns false if none is open.
    pub fn reject(&self, stage: &str, actor: Option<&str>, note: &str) -> bool {
        self.resolve(
            stage,
            GateDecision::Rejected {
                actor: actor.map(ToString::to_string),
                note: note.to_string(),
            },
        )
    }

    /// Closes an open gate without a decision (execution cancelled).
    pub fn close(&self, stage: &str) -> bool {
        let closed = self.pending.write().remove(stage).is_some();
        if closed {
            self.set_state(stage, ApprovalState::Pending);
        }
        closed
    }

    /// Returns the stages with open gates.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.pending.read().keys().cloned().collect()
    }

    /// Returns the execution a gate is open for, if any.
    #[must_use]
    pub fn pending_execution(&self, stage: &str) -> Option<ExecutionId> {
        self.pending.read().get(stage).map(|gate| gate.execution)
    }

    /// Returns when a gate was opened, if open.
    #[must_use]
    pub fn opened_at(&self, stage: &str) -> Option<DateTime<Utc>> {
        self.pending.read().get(stage).map(|gate| gate.opened_at)
    }

    fn resolve(&self, stage: &str, decision: GateDecision) -> bool {
        if let Some(gate) = self.pending.write().remove(stage) {
            gate.response_tx.send(decision).is_ok()
        } else {
            false
        }
    }
}
