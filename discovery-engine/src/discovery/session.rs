//! Discovery Session
//!
//! Owns one browser for the length of a run: launch, isolated context and
//! page, response observation, initial navigation and the scripted
//! interactions. Whatever was acquired is released in reverse order on every
//! exit path.

use crate::discovery::classifier::classify;
use crate::discovery::config::ScanConfiguration;
use crate::discovery::dedup::Deduplicator;
use crate::discovery::driver::{
    BrowserContext, BrowserDriver, BrowserSession, ContextOptions, LaunchOptions, PageHandle,
    ResponseStream,
};
use crate::discovery::events::{EventEmitter, LogLevel};
use crate::discovery::record::RecordBuilder;
use crate::discovery::scripter::{pause, InteractionCounters, InteractionScripter};
use crate::error::{DiscoveryError, DiscoveryResult};
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long teardown waits for the response observer to finish its backlog
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    NavigatingInitial,
    Interacting,
    Draining,
    Closed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Launching => "launching",
            SessionState::NavigatingInitial => "navigating",
            SessionState::Interacting => "interacting",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Summary of a session that ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub counters: InteractionCounters,
    pub apis_found: usize,
}

impl SessionReport {
    pub fn cancelled(&self) -> bool {
        self.state == SessionState::Cancelled
    }
}

/// Browser resources held by a session, released newest first
#[derive(Default)]
struct Acquired {
    browser: Option<Box<dyn BrowserSession>>,
    context: Option<Box<dyn BrowserContext>>,
    page: Option<Box<dyn PageHandle>>,
    observer: Option<(JoinHandle<usize>, CancellationToken)>,
}

impl Acquired {
    /// Stop the observer, then close page, context and browser.
    /// Returns how many APIs the observer reported.
    async fn release(&mut self, emitter: &EventEmitter) -> usize {
        let mut found = 0;
        if let Some((handle, stop)) = self.observer.take() {
            stop.cancel();
            let abort = handle.abort_handle();
            match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
                Ok(Ok(count)) => found = count,
                Ok(Err(e)) => warn!("Response observer ended abnormally: {}", e),
                Err(_) => {
                    warn!("Response observer did not drain within {:?}", DRAIN_TIMEOUT);
                    abort.abort();
                }
            }
        }

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                emitter.debug(format!("Error closing page: {}", e));
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                emitter.debug(format!("Error closing context: {}", e));
            }
        }
        if let Some(browser) = self.browser.take() {
            match browser.close().await {
                Ok(()) => emitter.info("Browser closed."),
                Err(e) => emitter.debug(format!("Error closing browser: {}", e)),
            }
        }
        found
    }
}

pub struct DiscoverySession {
    driver: Arc<dyn BrowserDriver>,
    config: Arc<ScanConfiguration>,
    cancel: CancellationToken,
    emitter: EventEmitter,
    headless: bool,
    state: SessionState,
}

impl DiscoverySession {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        config: Arc<ScanConfiguration>,
        cancel: CancellationToken,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            driver,
            config,
            cancel,
            emitter,
            headless: true,
            state: SessionState::Idle,
        }
    }

    /// Run with a visible browser window
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(run_id = %self.emitter.run_id(), from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Run the session to completion. Fatal setup failures are returned as
    /// errors after teardown; cancellation is a normal outcome. A panic is
    /// re-raised once the browser has been released.
    pub async fn run(mut self) -> DiscoveryResult<SessionReport> {
        let mut acquired = Acquired::default();
        let result = AssertUnwindSafe(self.drive(&mut acquired)).catch_unwind().await;

        if !self.state.is_terminal() {
            self.transition(SessionState::Draining);
        }
        self.emitter.info("Closing browser context and browser.");
        let apis_found = acquired.release(&self.emitter).await;

        // Resources are released; let the panic reach the supervisor
        let result = match result {
            Ok(result) => result,
            Err(panic) => {
                self.transition(SessionState::Failed);
                std::panic::resume_unwind(panic);
            }
        };

        match result {
            Ok(counters) => {
                let state = if self.cancel.is_cancelled() {
                    self.emitter.warning("Scan process was stopped by user signal.");
                    SessionState::Cancelled
                } else {
                    SessionState::Closed
                };
                self.transition(state);
                Ok(SessionReport {
                    state,
                    counters,
                    apis_found,
                })
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, acquired: &mut Acquired) -> DiscoveryResult<InteractionCounters> {
        let config = Arc::clone(&self.config);

        self.transition(SessionState::Launching);
        self.emitter.status("Launching browser...", true);
        let launch = LaunchOptions {
            headless: self.headless,
            proxy: config.proxy.clone(),
        };
        let browser = self.driver.launch(&launch).await.map_err(|e| {
            self.emitter
                .log(LogLevel::Error, format!("Failed to launch browser: {}", e));
            DiscoveryError::Launch(e)
        })?;
        self.emitter.debug("Browser launched successfully.");
        let browser = acquired.browser.insert(browser);

        if self.cancel.is_cancelled() {
            return Ok(InteractionCounters::default());
        }

        self.emitter.debug("Creating browser context.");
        let mut context_options = ContextOptions::new(config.user_agent.clone());
        context_options.navigation_timeout = config.navigation_timeout;
        context_options.action_timeout = config.action_timeout;
        let context = browser
            .new_context(&context_options)
            .await
            .map_err(|e| self.context_failure(e))?;
        let context = acquired.context.insert(context);

        let page = context.new_page().await.map_err(|e| self.context_failure(e))?;
        let page = acquired.page.insert(page);
        self.emitter.debug("Browser context and page created.");

        let responses = page.on_response().await.map_err(|e| {
            self.emitter.log(
                LogLevel::Error,
                format!("Failed to register response observer: {}", e),
            );
            DiscoveryError::HookRegistration(e)
        })?;
        let stop = CancellationToken::new();
        let handle = tokio::spawn(observe_responses(
            responses,
            Arc::clone(&config),
            self.cancel.clone(),
            stop.clone(),
            self.emitter.clone(),
        ));
        acquired.observer = Some((handle, stop));

        self.transition(SessionState::NavigatingInitial);
        self.navigate(&**page).await;
        if self.cancel.is_cancelled() {
            return Ok(InteractionCounters::default());
        }

        self.transition(SessionState::Interacting);
        let outcome = InteractionScripter::new(&**page, &config, &self.cancel, &self.emitter)
            .run()
            .await;
        if !outcome.cancelled {
            self.emitter.info("Async discovery phase complete.");
        }
        Ok(outcome.counters)
    }

    fn context_failure(&self, error: crate::error::DriverError) -> DiscoveryError {
        self.emitter.log(
            LogLevel::Error,
            format!("Failed to create browser context or page: {}", error),
        );
        DiscoveryError::ContextSetup(error)
    }

    /// Initial navigation. Failures are logged and the run carries on with
    /// whatever the page shows.
    async fn navigate(&self, page: &dyn PageHandle) {
        let config = &self.config;
        let preview: String = config.user_agent.chars().take(50).collect();
        self.emitter.info(format!(
            "Navigating to {} [UA: {}...]",
            config.target_url, preview
        ));
        self.emitter.status(
            format!(
                "Loading page (wait: {}, timeout: {}ms)...",
                config.wait_strategy,
                config.navigation_timeout.as_millis()
            ),
            true,
        );

        match page
            .goto(&config.target_url, config.wait_strategy, config.navigation_timeout)
            .await
        {
            Ok(()) => {
                self.emitter.status(
                    format!(
                        "Page loaded. Initial wait {:.1}s...",
                        config.interaction.settle_time.as_secs_f64()
                    ),
                    true,
                );
            }
            Err(e) if e.is_timeout() => {
                self.emitter.log(
                    LogLevel::Error,
                    format!("Navigation timeout for {}: {}", config.target_url, e),
                );
            }
            Err(e) => {
                self.emitter.log(
                    LogLevel::Error,
                    format!("Navigation/load error for {}: {}", config.target_url, e),
                );
            }
        }

        pause(&self.cancel, config.interaction.settle_time).await;
    }
}

/// Consume the page's responses: dedupe, classify, build and emit.
///
/// Runs until the stream ends or `stop` fires; responses already queued when
/// `stop` fires are still handled. All work is skipped after cancellation.
async fn observe_responses(
    mut responses: ResponseStream,
    config: Arc<ScanConfiguration>,
    cancel: CancellationToken,
    stop: CancellationToken,
    emitter: EventEmitter,
) -> usize {
    let mut dedup = Deduplicator::new();
    let builder = RecordBuilder::new();
    let mut found = 0;

    loop {
        let response = tokio::select! {
            biased;
            next = responses.next() => match next {
                Some(response) => response,
                None => break,
            },
            _ = stop.cancelled() => break,
        };
        if cancel.is_cancelled() {
            continue;
        }

        let head = response.head();
        let key = head.identity_key();
        if dedup.seen(&key) {
            continue;
        }

        let verdict = classify(head, &config);
        if !verdict.include {
            debug!(
                run_id = %emitter.run_id(),
                method = %head.method,
                url = %head.url,
                reason = %verdict.reason,
                "Excluded"
            );
            continue;
        }

        let record = builder.build(&*response).await;
        dedup.mark(key);
        emitter.info(format!(
            "API Found: {} {} ({})",
            record.method, record.url, record.status
        ));
        if let Err(e) = emitter.api_found(record).await {
            warn!(run_id = %emitter.run_id(), "Stopping response observer: {}", e);
            break;
        }
        found += 1;
    }

    debug!(run_id = %emitter.run_id(), found, "Response observer finished");
    found
}
