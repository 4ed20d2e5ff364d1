//! Scan Event Channel
//!
//! Messages flowing from a running scan to its consumer, and the
//! request-scoped emitter every component uses to produce them.
//!
//! Status and log messages are best-effort and may be dropped when the
//! channel is full. Results, errors and the final `Finished` message wait for
//! capacity instead.

use crate::discovery::record::ApiRecord;
use crate::error::{DiscoveryError, DiscoveryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Log severity carried on `Log` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// One message on the output channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Status { message: String, in_progress: bool },
    Log { level: LogLevel, message: String },
    ApiFound { record: ApiRecord },
    Error { message: String },
    Finished { message: String, cancelled: bool },
}

impl ScanEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, ScanEvent::Finished { .. })
    }
}

/// Create the bounded event channel for one run
pub fn event_channel(capacity: usize) -> (mpsc::Sender<ScanEvent>, mpsc::Receiver<ScanEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Request-scoped event producer. Cheap to clone; every clone tags its
/// tracing output with the run id.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    run_id: Uuid,
    sender: mpsc::Sender<ScanEvent>,
}

impl EventEmitter {
    pub fn new(run_id: Uuid, sender: mpsc::Sender<ScanEvent>) -> Self {
        Self { run_id, sender }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Best-effort status update
    pub fn status(&self, message: impl Into<String>, in_progress: bool) {
        let message = message.into();
        debug!(run_id = %self.run_id, "Status: {}", message);
        self.offer(ScanEvent::Status { message, in_progress });
    }

    /// Best-effort log line, mirrored to tracing
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(run_id = %self.run_id, "{}", message),
            LogLevel::Info => info!(run_id = %self.run_id, "{}", message),
            LogLevel::Warning => warn!(run_id = %self.run_id, "{}", message),
            LogLevel::Error => error!(run_id = %self.run_id, "{}", message),
        }
        self.offer(ScanEvent::Log { level, message });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Deliver a discovered record, waiting for channel capacity
    pub async fn api_found(&self, record: ApiRecord) -> DiscoveryResult<()> {
        info!(
            run_id = %self.run_id,
            method = %record.method,
            status = record.status,
            url = %record.url,
            "API found"
        );
        self.deliver(ScanEvent::ApiFound { record }).await
    }

    /// Report a terminal failure
    pub async fn error(&self, message: impl Into<String>) -> DiscoveryResult<()> {
        let message = message.into();
        error!(run_id = %self.run_id, "{}", message);
        self.deliver(ScanEvent::Error { message }).await
    }

    /// Final end-of-stream marker
    pub async fn finished(&self, message: impl Into<String>, cancelled: bool) -> DiscoveryResult<()> {
        let message = message.into();
        info!(run_id = %self.run_id, cancelled, "{}", message);
        self.deliver(ScanEvent::Finished { message, cancelled }).await
    }

    fn offer(&self, event: ScanEvent) {
        if let Err(e) = self.sender.try_send(event) {
            debug!(run_id = %self.run_id, "Dropped best-effort event: {}", e);
        }
    }

    async fn deliver(&self, event: ScanEvent) -> DiscoveryResult<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| DiscoveryError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::model::{CapturedExchange, ResourceType};

    #[tokio::test]
    async fn test_best_effort_events_dropped_when_full() {
        let (tx, mut rx) = event_channel(1);
        let emitter = EventEmitter::new(Uuid::new_v4(), tx);

        emitter.status("Launching browser...", true);
        emitter.info("dropped");
        assert_eq!(
            rx.recv().await,
            Some(ScanEvent::Status {
                message: "Launching browser...".to_string(),
                in_progress: true
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_results_wait_for_capacity() {
        let (tx, mut rx) = event_channel(1);
        let emitter = EventEmitter::new(Uuid::new_v4(), tx);
        let record = ApiRecord::from_exchange(CapturedExchange::new(
            "GET",
            "http://example.test/api",
            ResourceType::Fetch,
            200,
        ));

        emitter.status("filler", false);
        let producer = {
            let emitter = emitter.clone();
            tokio::spawn(async move { emitter.api_found(record).await })
        };

        assert!(matches!(rx.recv().await, Some(ScanEvent::Status { .. })));
        assert!(matches!(rx.recv().await, Some(ScanEvent::ApiFound { .. })));
        assert!(producer.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_reported() {
        let (tx, rx) = event_channel(4);
        drop(rx);
        let emitter = EventEmitter::new(Uuid::new_v4(), tx);
        assert!(matches!(
            emitter.finished("done", false).await,
            Err(DiscoveryError::ChannelClosed)
        ));
    }

    #[test]
    fn test_event_wire_format() {
        let event = ScanEvent::Log {
            level: LogLevel::Warning,
            message: "Click failed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["level"], "warning");

        let finished = ScanEvent::Finished {
            message: "Scan stopped by user.".to_string(),
            cancelled: true,
        };
        assert_eq!(serde_json::to_value(&finished).unwrap()["type"], "finished");
        assert!(finished.is_finished());
    }
}
