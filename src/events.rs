//! Task lifecycle event bus: a single broadcast channel carrying small JSON
//! envelopes, grounded on the broadcast-based event bus pattern in
//! `EffortlessMetrics-agent-backplane`'s `abp-runtime::bus`.
//!
//! Handlers awaiting a task subscribe before enqueueing, to avoid a
//! missed-publish race, then filter by task id.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskStarted,
    TaskCompleted,
    TaskError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskEvent {
    pub fn started(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            event_type: EventType::TaskStarted,
            reason: None,
        }
    }

    pub fn completed(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            event_type: EventType::TaskCompleted,
            reason: None,
        }
    }

    pub fn error(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            event_type: EventType::TaskError,
            reason: Some(reason.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type, EventType::TaskCompleted | EventType::TaskError)
    }
}

#[derive(Debug)]
pub enum WaitError {
    /// The bus lagged and dropped events, or every sender was dropped,
    /// before the terminal event for this task id arrived.
    ConnectionLost,
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection lost waiting for task completion")
    }
}

impl std::error::Error for WaitError {}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish to all current subscribers. Silently dropped if nobody is
    /// listening — the caller already has the value it needs.
    pub fn publish(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscription {
    rx: broadcast::Receiver<TaskEvent>,
}

impl EventSubscription {
    /// Block until a terminal event (`task_completed` or `task_error`) for
    /// `task_id` arrives, ignoring events for other tasks.
    pub async fn await_terminal(mut self, task_id: &str) -> Result<TaskEvent, WaitError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.task_id == task_id && event.is_terminal() => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return Err(WaitError::ConnectionLost),
                Err(broadcast::error::RecvError::Closed) => return Err(WaitError::ConnectionLost),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_matching_terminal_event() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.publish(TaskEvent::started("t1"));
        bus.publish(TaskEvent::completed("t2"));
        bus.publish(TaskEvent::completed("t1"));

        let event = sub.await_terminal("t1").await.unwrap();
        assert_eq!(event.task_id, "t1");
        assert!(matches!(event.event_type, EventType::TaskCompleted));
    }

    #[tokio::test]
    async fn await_terminal_ignores_started_and_other_task_ids() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.publish(TaskEvent::started("t1"));
        bus.publish(TaskEvent::error("other", "boom"));
        bus.publish(TaskEvent::error("t1", "analyzer failed"));

        let event = sub.await_terminal("t1").await.unwrap();
        assert_eq!(event.reason.as_deref(), Some("analyzer failed"));
    }

    #[tokio::test]
    async fn dropped_bus_reports_connection_lost() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        drop(bus);
        let result = sub.await_terminal("t1").await;
        assert!(matches!(result, Err(WaitError::ConnectionLost)));
    }

    #[test]
    fn event_serializes_without_reason_when_absent() {
        let event = TaskEvent::completed("t1");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("reason").is_none());
    }
}
