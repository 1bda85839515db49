//! Fire-and-forget telemetry.
//!
//! Components push counters, timings and error events into a bounded
//! channel with `try_send`; when the channel is full the event is dropped.
//! A drain task forwards events to `tracing`. Emitting never blocks and
//! never fails the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// == Events ==
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Counter {
        name: &'static str,
        value: u64,
        tags: Vec<(&'static str, String)>,
    },
    Timing {
        name: &'static str,
        elapsed: Duration,
        tags: Vec<(&'static str, String)>,
    },
    Error {
        name: &'static str,
        message: String,
    },
}

// == Telemetry Handle ==
/// Cheap-to-clone sender side.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    sender: Option<mpsc::Sender<TelemetryEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Telemetry {
    /// Creates a handle and the receiver a drain task should consume.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// A handle that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &'static str, value: u64, tags: Vec<(&'static str, String)>) {
        self.emit(TelemetryEvent::Counter { name, value, tags });
    }

    pub fn timing(&self, name: &'static str, elapsed: Duration, tags: Vec<(&'static str, String)>) {
        self.emit(TelemetryEvent::Timing {
            name,
            elapsed,
            tags,
        });
    }

    pub fn error(&self, name: &'static str, message: impl Into<String>) {
        self.emit(TelemetryEvent::Error {
            name,
            message: message.into(),
        });
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(sender) = &self.sender {
            if sender.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Spawns the task forwarding telemetry events to the log.
pub fn spawn_telemetry_drain(mut receiver: mpsc::Receiver<TelemetryEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match event {
                TelemetryEvent::Counter { name, value, tags } => {
                    debug!(target: "telemetry", metric = name, value, ?tags, "counter");
                }
                TelemetryEvent::Timing { name, elapsed, tags } => {
                    debug!(
                        target: "telemetry",
                        metric = name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        ?tags,
                        "timing"
                    );
                }
                TelemetryEvent::Error { name, message } => {
                    warn!(target: "telemetry", metric = name, %message, "error event");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_delivered() {
        let (telemetry, mut receiver) = Telemetry::channel(8);
        telemetry.counter("pipeline.submitted", 1, vec![("tenant", "springfield".into())]);
        telemetry.error("gate.fail_open", "backend down");

        assert!(matches!(
            receiver.recv().await,
            Some(TelemetryEvent::Counter { name: "pipeline.submitted", value: 1, .. })
        ));
        assert!(matches!(
            receiver.recv().await,
            Some(TelemetryEvent::Error { name: "gate.fail_open", .. })
        ));
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (telemetry, _receiver) = Telemetry::channel(1);
        telemetry.counter("a", 1, Vec::new());
        telemetry.counter("b", 1, Vec::new());
        telemetry.counter("c", 1, Vec::new());
        assert_eq!(telemetry.dropped(), 2);
    }

    #[test]
    fn test_disabled_handle_is_silent() {
        let telemetry = Telemetry::disabled();
        telemetry.timing("x", Duration::from_millis(3), Vec::new());
        assert_eq!(telemetry.dropped(), 0);
    }

    #[tokio::test]
    async fn test_drain_exits_when_senders_drop() {
        let (telemetry, receiver) = Telemetry::channel(4);
        let handle = spawn_telemetry_drain(receiver);
        telemetry.counter("x", 1, Vec::new());
        drop(telemetry);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
