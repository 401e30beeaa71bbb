//! # Event Bus System
//!
//! In-process broadcast of engine events over `tokio::sync::broadcast`.
//! Schedulers and the token store publish; hosts (dashboards, tests,
//! metrics exporters) subscribe. Publishing never blocks and never fails the
//! publisher: with no subscribers the event is simply dropped.
//!
//! ```rust
//! use core_runtime::events::{AnalysisEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Analysis(AnalysisEvent::MappingAnalyzed {
//!     mapping_id: "m-1".to_string(),
//!     enqueued: 2,
//! }));
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Mapping analyzed");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Analysis(AnalysisEvent),
    Execution(ExecutionEvent),
    Auth(AuthEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &'static str {
        match self {
            CoreEvent::Analysis(e) => e.description(),
            CoreEvent::Execution(e) => e.description(),
            CoreEvent::Auth(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Analysis(AnalysisEvent::MappingFailed { .. })
            | CoreEvent::Auth(AuthEvent::RefreshFailed { .. }) => EventSeverity::Error,
            CoreEvent::Execution(ExecutionEvent::ItemFinished { status, .. })
                if status != "done" =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Analysis(AnalysisEvent::TickCompleted { .. })
            | CoreEvent::Execution(ExecutionEvent::TickCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalysisEvent {
    MappingAnalyzed { mapping_id: String, enqueued: u32 },
    MappingFailed { mapping_id: String, error: String },
    TickCompleted { mappings: u32, enqueued: u32, failed: u32 },
}

impl AnalysisEvent {
    pub fn description(&self) -> &'static str {
        match self {
            AnalysisEvent::MappingAnalyzed { .. } => "Mapping analyzed",
            AnalysisEvent::MappingFailed { .. } => "Mapping analysis failed",
            AnalysisEvent::TickCompleted { .. } => "Analysis tick completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// A sync item reached a new status (`done`, `pending`, `error`, `skipped`)
    ItemFinished {
        sync_item_id: String,
        mapping_id: String,
        status: String,
    },
    TickCompleted {
        processed: u32,
        succeeded: u32,
        retried: u32,
        failed: u32,
        skipped: u32,
    },
}

impl ExecutionEvent {
    pub fn description(&self) -> &'static str {
        match self {
            ExecutionEvent::ItemFinished { .. } => "Sync item processed",
            ExecutionEvent::TickCompleted { .. } => "Executor tick completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthEvent {
    TokenRefreshed { provider: String },
    RefreshFailed { provider: String, message: String },
}

impl AuthEvent {
    pub fn description(&self) -> &'static str {
        match self {
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::RefreshFailed { .. } => "Access token refresh failed",
        }
    }
}

/// Central event bus for publishing and subscribing to engine events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; returns how many subscribers received it.
    pub fn emit(&self, event: CoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
