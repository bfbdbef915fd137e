//! Event sink trait and implementations.
//!
//! The engine emits an event at every lifecycle transition:
//! `execution.started`, `stage.started`, `stage.succeeded`,
//! `stage.failed`, `gate.awaiting`, `gate.approved`, `gate.rejected`,
//! `target.deployed`, `execution.finished`. Sinks must never fail the
//! pipeline; emission is fire-and-forget.

use crate::core::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};

/// An event describing one lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dotted event name (e.g. `stage.succeeded`).
    pub name: String,
    /// The execution the event belongs to.
    pub execution: ExecutionId,
    /// Event payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates an event with no payload.
    #[must_use]
    pub fn new(name: impl Into<String>, execution: ExecutionId) -> Self {
        Self {
            name: name.into(),
            execution,
            data: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Receives execution events.
pub trait EventSink: Send + Sync {
    /// Handles an event. Must not fail or block the engine.
    fn emit(&self, event: PipelineEvent);
}

/// Discards all events. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Logs events through the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: PipelineEvent) {
        match self.level {
            Level::DEBUG => debug!(
                event = %event.name,
                execution = %event.execution,
                data = %event.data,
                "pipeline event"
            ),
            _ => info!(
                event = %event.name,
                execution = %event.execution,
                data = %event.data,
                "pipeline event"
            ),
        }
    }
}

/// Collects events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.name.clone()).collect()
    }

    /// Returns events whose name starts with a prefix.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit(PipelineEvent::new("stage.started", ExecutionId::new(1)));
    }

    #[test]
    fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit(
            PipelineEvent::new("stage.failed", ExecutionId::new(1))
                .with_data(serde_json::json!({"stage": "Build"})),
        );
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(PipelineEvent::new("execution.started", ExecutionId::new(1)));
        sink.emit(
            PipelineEvent::new("stage.started", ExecutionId::new(1))
                .with_data(serde_json::json!({"stage": "Source"})),
        );
        sink.emit(PipelineEvent::new("stage.succeeded", ExecutionId::new(1)));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(
            sink.names(),
            vec!["execution.started", "stage.started", "stage.succeeded"]
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::new("gate.awaiting", ExecutionId::new(4))
            .with_data(serde_json::json!({"stage": "Approval"}));

        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, "gate.awaiting");
        assert_eq!(back.execution, ExecutionId::new(4));
    }
}
