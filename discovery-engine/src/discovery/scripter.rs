//! Interaction Scripter
//!
//! Runs the scripted phases against a page: form input, clicks, then scrolls,
//! followed by a fixed grace wait. Each phase is skipped when it has nothing
//! to do. The cancellation token is checked before every phase and before
//! every driver call; a single failed element interaction is logged and the
//! phase moves on to the next item.

use crate::discovery::config::{InteractionPlan, ScanConfiguration};
use crate::discovery::driver::{Locator, PageHandle};
use crate::discovery::events::EventEmitter;
use crate::error::{DriverError, DriverResult};
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Wait after all phases for trailing asynchronous requests
pub const FINAL_GRACE: Duration = Duration::from_secs(5);

/// How many matches of a click selector are checked for visibility
const CLICK_CANDIDATES: usize = 5;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Form,
    Click,
    Scroll,
    Grace,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Form => "form",
            Phase::Click => "click",
            Phase::Scroll => "scroll",
            Phase::Grace => "grace",
        };
        f.write_str(name)
    }
}

/// What the script managed to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionCounters {
    pub fills: u32,
    pub submits: u32,
    pub clicks: u32,
    pub scrolls: u32,
}

impl InteractionCounters {
    pub fn total(&self) -> u32 {
        self.fills + self.submits + self.clicks + self.scrolls
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub counters: InteractionCounters,
    pub cancelled: bool,
}

/// Uniform random duration in `[0, max_secs)`
fn jitter(max_secs: f64) -> Duration {
    if max_secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max_secs))
}

/// Uniform random duration in `[low_ms, high_ms)`
fn random_millis(low_ms: u64, high_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(low_ms..high_ms))
}

/// Sleep unless cancelled first. Returns false if cancellation cut it short.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct InteractionScripter<'a> {
    page: &'a dyn PageHandle,
    plan: &'a InteractionPlan,
    action_timeout: Duration,
    cancel: &'a CancellationToken,
    emitter: &'a EventEmitter,
    counters: InteractionCounters,
}

impl<'a> InteractionScripter<'a> {
    pub fn new(
        page: &'a dyn PageHandle,
        config: &'a ScanConfiguration,
        cancel: &'a CancellationToken,
        emitter: &'a EventEmitter,
    ) -> Self {
        Self {
            page,
            plan: &config.interaction,
            action_timeout: config.action_timeout,
            cancel,
            emitter,
            counters: InteractionCounters::default(),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run every phase in order
    pub async fn run(mut self) -> ScriptOutcome {
        self.emitter.status("Performing interactions...", true);

        if !self.cancelled() && self.plan.has_form_phase() {
            self.form_phase().await;
        }
        if !self.cancelled() && !self.plan.click_selectors.is_empty() {
            self.click_phase().await;
        }
        if !self.cancelled() && self.plan.scroll_count > 0 {
            self.scroll_phase().await;
        }

        if self.counters.total() > 0 {
            self.emitter.info("Interaction phase complete.");
        } else {
            self.emitter.info("No interactions were performed based on settings.");
        }

        if !self.cancelled() {
            debug!(phase = %Phase::Grace, "Final wait of {:?} for network settlement", FINAL_GRACE);
            self.emitter.debug("Allowing final 5s for network settlement before closing...");
            pause(self.cancel, FINAL_GRACE).await;
        }

        ScriptOutcome {
            counters: self.counters,
            cancelled: self.cancelled(),
        }
    }

    async fn form_phase(&mut self) {
        let plan = self.plan;
        let selector = plan.form_selector.as_deref().unwrap_or_default();
        let total = plan.form_values.len();
        debug!(phase = %Phase::Form, values = total, "Starting phase");
        self.emitter.info(format!("Attempting form input on '{}'...", selector));

        for (index, value) in plan.form_values.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let preview: String = value.chars().take(30).collect();
            self.emitter.info(format!(
                "Form Input {}/{}: Filling '{}' with '{}...'",
                index + 1,
                total,
                selector,
                preview
            ));

            if let Err(e) = self.fill_one(selector, value, index + 1).await {
                self.emitter.warning(format!(
                    "Form interaction on '{}' failed for value '{}...': {}",
                    selector, preview, e
                ));
            }
        }

        if self.counters.total() > 0 && !self.cancelled() {
            self.emitter.status("Form input phase finished. Waiting...", true);
            pause(self.cancel, self.plan.settle_time).await;
        }
    }

    async fn fill_one(&mut self, selector: &str, value: &str, round: usize) -> DriverResult<()> {
        let input = Locator::first(selector);

        self.page.scroll_into_view(&input, self.action_timeout / 2).await?;
        if self.cancelled() {
            return Ok(());
        }
        self.page.fill(&input, value, self.action_timeout).await?;
        self.counters.fills += 1;
        if !pause(self.cancel, Duration::from_millis(100) + jitter(0.2)).await {
            return Ok(());
        }

        if self.plan.submit_after_fill {
            self.emitter.info(format!("Submitting form via Enter key on '{}'", selector));
            self.page
                .press(&input, "Enter", random_millis(100, 300), self.action_timeout)
                .await?;
            self.counters.submits += 1;
            if self.cancelled() {
                return Ok(());
            }
            self.emitter
                .status(format!("Waiting after submit {} (networkidle)...", round), true);
            self.wait_for_network_idle("form submit").await;
        }

        pause(self.cancel, self.plan.form_delay + jitter(0.5)).await;
        Ok(())
    }

    async fn click_phase(&mut self) {
        let plan = self.plan;
        debug!(phase = %Phase::Click, selectors = plan.click_selectors.len(), "Starting phase");
        self.emitter.info(format!(
            "Attempting clicks based on {} selector(s)...",
            plan.click_selectors.len()
        ));
        let mut clicks_done = 0u32;

        for selector in &plan.click_selectors {
            if self.cancelled() {
                break;
            }
            self.emitter.debug(format!("Attempting click: {}", selector));

            match self.click_one(selector).await {
                Ok(true) => {
                    clicks_done += 1;
                    self.counters.clicks += 1;
                    pause(self.cancel, Duration::from_secs(1) + jitter(0.5)).await;
                }
                Ok(false) => {}
                Err(e) if e.is_timeout() => {
                    self.emitter.warning(format!("Timeout clicking {}: {}", selector, e));
                }
                Err(e) => {
                    self.emitter.warning(format!("Error clicking {}: {}", selector, e));
                }
            }
        }

        if clicks_done > 0 && !self.cancelled() {
            self.emitter.status("Click phase finished. Waiting for network...", true);
            self.wait_for_network_idle("clicks").await;
            pause(self.cancel, self.plan.settle_time).await;
        }
    }

    /// Click the first visible and enabled match. Ok(false) if nothing was clicked.
    async fn click_one(&self, selector: &str) -> DriverResult<bool> {
        let count = self.page.count(selector).await?;
        if count == 0 {
            self.emitter
                .debug(format!("No elements found for click selector: {}", selector));
            return Ok(false);
        }

        let mut target = None;
        for nth in 0..count.min(CLICK_CANDIDATES) {
            if self.cancelled() {
                return Ok(false);
            }
            let candidate = Locator::new(selector, nth);
            match self.is_clickable(&candidate).await {
                Ok(true) => {
                    target = Some(candidate);
                    break;
                }
                Ok(false) => {}
                Err(e) => self.emitter.debug(format!(
                    "Error checking visibility/enabled for {} nth({}): {}",
                    selector, nth, e
                )),
            }
        }

        let Some(target) = target else {
            self.emitter.debug(format!(
                "No visible/enabled element found for click selector: {}",
                selector
            ));
            return Ok(false);
        };

        self.page.scroll_into_view(&target, self.action_timeout / 2).await?;

        if self.plan.hover_before_click && !self.cancelled() {
            self.emitter.debug(format!("Hovering over {}", selector));
            match self.page.hover(&target, self.action_timeout / 3).await {
                Ok(()) => {
                    pause(self.cancel, Duration::from_millis(200) + jitter(0.3)).await;
                }
                Err(e) => self
                    .emitter
                    .warning(format!("Hover failed for {}: {}", selector, e)),
            }
        }

        if self.cancelled() {
            return Ok(false);
        }
        self.page
            .click(&target, random_millis(50, 200), self.action_timeout)
            .await?;
        self.emitter.info(format!("Clicked element matching {}", selector));
        Ok(true)
    }

    async fn is_clickable(&self, locator: &Locator) -> DriverResult<bool> {
        Ok(self.page.is_visible(locator).await? && self.page.is_enabled(locator).await?)
    }

    async fn scroll_phase(&mut self) {
        let total = self.plan.scroll_count;
        debug!(phase = %Phase::Scroll, scrolls = total, "Starting phase");
        self.emitter.info(format!("Performing {} scroll(s)...", total));

        for step in 1..=total {
            if self.cancelled() {
                break;
            }
            self.emitter.debug(format!("Scroll {}/{}", step, total));
            match self.page.evaluate(SCROLL_TO_BOTTOM).await {
                Ok(_) => {
                    self.counters.scrolls += 1;
                    pause(self.cancel, self.plan.scroll_delay + jitter(0.2)).await;
                }
                Err(e) => self
                    .emitter
                    .warning(format!("Error during scroll {}: {}", step, e)),
            }
        }

        if !self.cancelled() {
            self.emitter.status("Scrolling finished. Waiting for network...", true);
            self.wait_for_network_idle("scroll").await;
            pause(self.cancel, self.plan.settle_time).await;
        }
    }

    /// Bounded network-idle wait; failures are only logged
    async fn wait_for_network_idle(&self, after: &str) {
        match self.page.wait_for_network_idle(self.action_timeout).await {
            Ok(()) => {}
            Err(DriverError::Timeout { .. }) => {
                self.emitter
                    .warning(format!("Timeout waiting network idle after {}", after));
            }
            Err(e) => {
                self.emitter
                    .warning(format!("Error waiting after {}: {}", after, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(0.0), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(0.2) < Duration::from_millis(200));
            let delay = random_millis(50, 200);
            assert!(delay >= Duration::from_millis(50) && delay < Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        assert!(pause(&cancel, Duration::from_secs(1)).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let started = tokio::time::Instant::now();
        assert!(!pause(&cancel, Duration::from_secs(60)).await);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn test_counters_total() {
        let counters = InteractionCounters {
            fills: 2,
            submits: 2,
            clicks: 1,
            scrolls: 3,
        };
        assert_eq!(counters.total(), 8);
    }
}
