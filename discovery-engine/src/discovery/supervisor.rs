//! Run Supervisor
//!
//! Starts a discovery session on its own task and turns whatever happens to
//! it into channel events. The consumer always gets exactly one `Finished`
//! event, and it is always the last one.

use crate::discovery::config::ScanConfiguration;
use crate::discovery::driver::BrowserDriver;
use crate::discovery::events::{event_channel, EventEmitter, ScanEvent, EVENT_CHANNEL_CAPACITY};
use crate::discovery::session::DiscoverySession;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Consumer side of a running scan
pub struct ScanHandle {
    run_id: Uuid,
    events: mpsc::Receiver<ScanEvent>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ScanHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request a cooperative stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the stream has ended
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Collect events until `Finished` (inclusive)
    pub async fn collect(mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            let done = event.is_finished();
            events.push(event);
            if done {
                break;
            }
        }
        if let Err(e) = self.join.await {
            error!(run_id = %self.run_id, "Supervisor task failed: {}", e);
        }
        events
    }

    /// Split into the event receiver and the cancellation token
    pub fn into_parts(self) -> (mpsc::Receiver<ScanEvent>, CancellationToken) {
        (self.events, self.cancel)
    }
}

/// Launches supervised discovery runs against a browser driver
#[derive(Clone)]
pub struct RunSupervisor {
    driver: Arc<dyn BrowserDriver>,
    channel_capacity: usize,
    headless: bool,
}

impl RunSupervisor {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            channel_capacity: EVENT_CHANNEL_CAPACITY,
            headless: true,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Start a run on a snapshot of `config`. Later changes to `config` do
    /// not reach the running scan.
    pub fn start(&self, config: &ScanConfiguration) -> ScanHandle {
        self.start_with_token(config, CancellationToken::new())
    }

    /// Start a run that stops when `cancel` is cancelled
    pub fn start_with_token(&self, config: &ScanConfiguration, cancel: CancellationToken) -> ScanHandle {
        let run_id = Uuid::new_v4();
        let (sender, events) = event_channel(self.channel_capacity);
        let emitter = EventEmitter::new(run_id, sender);
        let snapshot = config.snapshot();

        info!(run_id = %run_id, url = %snapshot.target_url, "Starting discovery run");

        let session = DiscoverySession::new(
            Arc::clone(&self.driver),
            snapshot,
            cancel.clone(),
            emitter.clone(),
        )
        .headless(self.headless);

        let span = info_span!("discovery", run_id = %run_id);
        let token = cancel.clone();
        let join = tokio::spawn(
            async move {
                let outcome = tokio::spawn(session.run().in_current_span()).await;
                let cancelled = token.is_cancelled();

                let message = match outcome {
                    Ok(Ok(report)) if report.cancelled() || cancelled => {
                        format!("Scan stopped by user. Found {} APIs.", report.apis_found)
                    }
                    Ok(Ok(report)) => format!("Scan finished. Found {} APIs.", report.apis_found),
                    Ok(Err(e)) => {
                        let _ = emitter.error(e.to_string()).await;
                        "Scan failed.".to_string()
                    }
                    Err(e) => {
                        let detail = if e.is_panic() {
                            "session task panicked".to_string()
                        } else {
                            e.to_string()
                        };
                        let _ = emitter.error(format!("Unexpected Scan Error: {}", detail)).await;
                        "Scan failed unexpectedly.".to_string()
                    }
                };

                if emitter.finished(message, cancelled).await.is_err() {
                    info!("Consumer went away before the run finished");
                }
            }
            .instrument(span),
        );

        ScanHandle {
            run_id,
            events,
            cancel,
            join,
        }
    }
}
