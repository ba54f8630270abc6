//! Best-effort dispatch events
//!
//! Publisher side of the UI telemetry stream. Publishing never blocks and
//! never fails a call: a full or closed channel drops the event.

use crate::tools::types::ToolResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Topic every event is published on, regardless of session
pub const GLOBAL_TOPIC: &str = "tool_calls";

/// Channel capacity for [`EventBus`]
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Executor lifecycle events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolEvent {
    CallStarted {
        event_id: Uuid,
        tool_call_id: String,
        tool_name: String,
        session_id: Option<String>,
        /// Argument names only; values may carry credentials
        argument_keys: Vec<String>,
        at: DateTime<Utc>,
    },
    CallFinished {
        event_id: Uuid,
        session_id: Option<String>,
        result: ToolResult,
        at: DateTime<Utc>,
    },
}

impl ToolEvent {
    pub fn started(
        tool_call_id: &str,
        tool_name: &str,
        session_id: Option<&str>,
        argument_keys: Vec<String>,
    ) -> Self {
        ToolEvent::CallStarted {
            event_id: Uuid::new_v4(),
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            session_id: session_id.map(str::to_string),
            argument_keys,
            at: Utc::now(),
        }
    }

    pub fn finished(result: &ToolResult, session_id: Option<&str>) -> Self {
        ToolEvent::CallFinished {
            event_id: Uuid::new_v4(),
            session_id: session_id.map(str::to_string),
            result: result.clone(),
            at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ToolEvent::CallStarted { session_id, .. } | ToolEvent::CallFinished { session_id, .. } => {
                session_id.as_deref()
            }
        }
    }
}

/// Session topic, or the global topic when there is no session
pub fn pubsub_topic(session_id: Option<&str>) -> String {
    match session_id {
        None => GLOBAL_TOPIC.to_string(),
        Some(id) => format!("{GLOBAL_TOPIC}:{id}"),
    }
}

/// Fire-and-forget publisher. Implementations must not block.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, topic: &str, event: &ToolEvent);
}

/// Publish on the event's session topic and, for session events, again on
/// the global topic so session-agnostic observers see everything.
pub fn broadcast(broadcaster: &dyn Broadcaster, event: &ToolEvent) {
    let session_id = event.session_id();
    broadcaster.publish(&pubsub_topic(session_id), event);
    if session_id.is_some() {
        broadcaster.publish(GLOBAL_TOPIC, event);
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn publish(&self, _topic: &str, _event: &ToolEvent) {}
}

/// An event tagged with the topic it was published on
#[derive(Debug, Clone)]
pub struct TopicEvent {
    pub topic: String,
    pub event: ToolEvent,
}

/// Event bus backed by a bounded channel
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::Sender<TopicEvent>,
}

impl EventBus {
    /// Create new event bus with bounded channel
    pub fn new() -> (Self, mpsc::Receiver<TopicEvent>) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (EventBus { sender }, receiver)
    }
}

impl Broadcaster for EventBus {
    fn publish(&self, topic: &str, event: &ToolEvent) {
        // Full or closed channel: drop
        let _ = self.sender.try_send(TopicEvent {
            topic: topic.to_string(),
            event: event.clone(),
        });
    }
}
