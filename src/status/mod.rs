//! Status reporting for long-running operations.
//!
//! One [`StatusReporter`] is created per investigation session and passed
//! explicitly to whoever needs it. Events fan out over a broadcast channel;
//! a slow subscriber loses old events instead of blocking reporters.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Opaque handle correlating events of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        OperationId(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Started {
        operation: OperationId,
        label: String,
        at: DateTime<Utc>,
    },
    Progress {
        operation: OperationId,
        text: String,
        at: DateTime<Utc>,
    },
    Finished {
        operation: OperationId,
        at: DateTime<Utc>,
    },
    Failed {
        operation: OperationId,
        message: String,
        at: DateTime<Utc>,
    },
    Cancelled {
        operation: OperationId,
        at: DateTime<Utc>,
    },
    TimedOut {
        operation: OperationId,
        at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn operation(&self) -> OperationId {
        match self {
            StatusEvent::Started { operation, .. }
            | StatusEvent::Progress { operation, .. }
            | StatusEvent::Finished { operation, .. }
            | StatusEvent::Failed { operation, .. }
            | StatusEvent::Cancelled { operation, .. }
            | StatusEvent::TimedOut { operation, .. } => *operation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusEvent::Started { .. } | StatusEvent::Progress { .. })
    }
}

#[derive(Debug, Clone)]
pub struct StatusConfig {
    pub channel_capacity: usize,
    /// Longer texts are cut and suffixed with "...".
    pub max_message_len: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_message_len: 100,
        }
    }
}

struct Inner {
    tx: broadcast::Sender<StatusEvent>,
    active: Mutex<IndexMap<OperationId, String>>,
    max_message_len: usize,
}

/// Cloneable handle; all clones share subscribers and in-flight state.
#[derive(Clone)]
pub struct StatusReporter {
    inner: Arc<Inner>,
}

impl StatusReporter {
    pub fn new(config: StatusConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                active: Mutex::new(IndexMap::new()),
                max_message_len: config.max_message_len,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.tx.subscribe()
    }

    /// Announce a new operation.
    pub fn start(&self, label: &str) -> OperationId {
        let operation = OperationId::new();
        self.inner.active.lock().insert(operation, label.to_string());
        log::debug!("[{}] started: {}", operation, label);
        self.publish(StatusEvent::Started {
            operation,
            label: label.to_string(),
            at: Utc::now(),
        });
        operation
    }

    /// Progress text for an in-flight operation. Ignored once it has ended.
    pub fn update(&self, operation: OperationId, text: &str) {
        if !self.is_active(operation) {
            return;
        }
        let text = self.truncate(text);
        log::debug!("[{}] {}", operation, text);
        self.publish(StatusEvent::Progress {
            operation,
            text,
            at: Utc::now(),
        });
    }

    /// Mark an operation finished. Safe to call twice or with an unknown id.
    pub fn stop(&self, operation: OperationId) {
        if self.end(operation) {
            log::debug!("[{}] finished", operation);
            self.publish(StatusEvent::Finished {
                operation,
                at: Utc::now(),
            });
        }
    }

    pub fn fail(&self, operation: OperationId, message: &str) {
        if self.end(operation) {
            let message = self.truncate(message);
            log::warn!("[{}] failed: {}", operation, message);
            self.publish(StatusEvent::Failed {
                operation,
                message,
                at: Utc::now(),
            });
        }
    }

    pub fn cancel(&self, operation: OperationId) {
        if self.end(operation) {
            log::info!("[{}] cancelled", operation);
            self.publish(StatusEvent::Cancelled {
                operation,
                at: Utc::now(),
            });
        }
    }

    pub fn time_out(&self, operation: OperationId) {
        if self.end(operation) {
            log::warn!("[{}] timed out", operation);
            self.publish(StatusEvent::TimedOut {
                operation,
                at: Utc::now(),
            });
        }
    }

    pub fn is_active(&self, operation: OperationId) -> bool {
        self.inner.active.lock().contains_key(&operation)
    }

    /// In-flight operations with their labels, oldest first.
    pub fn active(&self) -> Vec<(OperationId, String)> {
        self.inner
            .active
            .lock()
            .iter()
            .map(|(id, label)| (*id, label.clone()))
            .collect()
    }

    fn end(&self, operation: OperationId) -> bool {
        self.inner.active.lock().shift_remove(&operation).is_some()
    }

    fn publish(&self, event: StatusEvent) {
        // No subscribers is fine.
        let _ = self.inner.tx.send(event);
    }

    fn truncate(&self, text: &str) -> String {
        let max = self.inner.max_message_len;
        if text.chars().count() <= max {
            text.to_string()
        } else {
            let cut: String = text.chars().take(max).collect();
            format!("{cut}...")
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(StatusConfig::default())
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("active", &self.inner.active.lock().len())
            .field("subscribers", &self.inner.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_lifecycle_events() {
        let reporter = StatusReporter::default();
        let mut rx = reporter.subscribe();
        let op = reporter.start("Email to Username");
        reporter.update(op, "looking up");
        reporter.stop(op);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], StatusEvent::Started { label, .. } if label == "Email to Username"));
        assert!(matches!(&events[1], StatusEvent::Progress { text, .. } if text == "looking up"));
        assert!(events[2].is_terminal());
        assert!(events.iter().all(|e| e.operation() == op));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let reporter = StatusReporter::default();
        let mut rx = reporter.subscribe();
        let op = reporter.start("job");
        reporter.stop(op);
        reporter.stop(op);
        reporter.stop(OperationId::new());
        reporter.fail(op, "too late");
        assert_eq!(drain(&mut rx).len(), 2);
        assert!(reporter.active().is_empty());
    }

    #[test]
    fn test_long_text_is_truncated() {
        let reporter = StatusReporter::new(StatusConfig {
            channel_capacity: 8,
            max_message_len: 10,
        });
        let mut rx = reporter.subscribe();
        let op = reporter.start("job");
        reporter.update(op, "0123456789abcdef");
        let events = drain(&mut rx);
        assert!(matches!(&events[1], StatusEvent::Progress { text, .. } if text == "0123456789..."));
    }

    #[test]
    fn test_active_lists_in_flight_operations() {
        let reporter = StatusReporter::default();
        let a = reporter.start("a");
        let b = reporter.start("b");
        reporter.cancel(a);
        assert_eq!(reporter.active(), vec![(b, "b".to_string())]);
        assert!(!reporter.is_active(a));
    }

    #[test]
    fn test_reporting_without_subscribers() {
        let reporter = StatusReporter::default();
        let op = reporter.start("quiet");
        reporter.time_out(op);
        assert!(!reporter.is_active(op));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let reporter = StatusReporter::default();
        let mut rx = reporter.subscribe();
        reporter.start("job");
        let event = drain(&mut rx).remove(0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["label"], "job");
    }
}
