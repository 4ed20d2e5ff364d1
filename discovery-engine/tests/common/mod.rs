//! In-memory browser driver for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use discovery_engine::{
    BrowserContext, BrowserDriver, BrowserSession, CapturedExchange, ContextOptions, DriverError,
    DriverResult, Headers, InteractionPlan, LaunchOptions, Locator, ObservedResponse, PageHandle,
    ResourceType, ResponseStream, ScanConfiguration, WaitStrategy,
};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Calls made against the fake browser
#[derive(Debug, Default)]
pub struct Calls {
    pub launches: AtomicUsize,
    pub contexts: AtomicUsize,
    pub pages: AtomicUsize,
    pub gotos: AtomicUsize,
    pub fill_attempts: AtomicUsize,
    pub fills: AtomicUsize,
    pub presses: AtomicUsize,
    pub click_attempts: AtomicUsize,
    pub clicks: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub page_closes: AtomicUsize,
    pub context_closes: AtomicUsize,
    pub browser_closes: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    Launch,
    Context,
    Page,
    Hook,
    Navigation,
    /// The page panics on the first scroll
    ScrollPanic,
}

/// Scripted behavior shared by every object the fake driver hands out
#[derive(Clone)]
struct Script {
    responses: Vec<CapturedExchange>,
    elements: HashMap<String, usize>,
    broken_selectors: HashSet<String>,
    fail_at: FailAt,
    cancel_at_scroll: Option<(usize, CancellationToken)>,
    calls: Arc<Calls>,
}

pub struct FakeDriver {
    script: Script,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            script: Script {
                responses: Vec::new(),
                elements: HashMap::new(),
                broken_selectors: HashSet::new(),
                fail_at: FailAt::Nothing,
                cancel_at_scroll: None,
                calls: Arc::new(Calls::default()),
            },
        }
    }

    /// Responses delivered to the observer when the page navigates
    pub fn with_response(mut self, exchange: CapturedExchange) -> Self {
        self.script.responses.push(exchange);
        self
    }

    /// Number of visible, enabled elements matching `selector`
    pub fn with_elements(mut self, selector: &str, count: usize) -> Self {
        self.script.elements.insert(selector.to_string(), count);
        self
    }

    /// Fills and clicks on `selector` fail even though the element exists
    pub fn with_broken_selector(mut self, selector: &str) -> Self {
        self.script.broken_selectors.insert(selector.to_string());
        self
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.script.fail_at = fail_at;
        self
    }

    /// Cancel `token` right after the given scroll step completes
    pub fn cancel_after_scroll(mut self, step: usize, token: CancellationToken) -> Self {
        self.script.cancel_at_scroll = Some((step, token));
        self
    }

    pub fn calls(&self) -> Arc<Calls> {
        Arc::clone(&self.script.calls)
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _options: &LaunchOptions) -> DriverResult<Box<dyn BrowserSession>> {
        self.script.calls.launches.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_at == FailAt::Launch {
            return Err(DriverError::Launch("executable not found".to_string()));
        }
        Ok(Box::new(FakeBrowser {
            script: self.script.clone(),
        }))
    }
}

struct FakeBrowser {
    script: Script,
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn new_context(&self, _options: &ContextOptions) -> DriverResult<Box<dyn BrowserContext>> {
        self.script.calls.contexts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_at == FailAt::Context {
            return Err(DriverError::Context("target crashed".to_string()));
        }
        Ok(Box::new(FakeContext {
            script: self.script.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.script.calls.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    script: Script,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        self.script.calls.pages.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_at == FailAt::Page {
            return Err(DriverError::Page("no target".to_string()));
        }
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            observer: Mutex::new(None),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.script.calls.context_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    script: Script,
    observer: Mutex<Option<UnboundedSender<Box<dyn ObservedResponse>>>>,
}

impl FakePage {
    fn known(&self, locator: &Locator) -> DriverResult<()> {
        match self.script.elements.get(&locator.selector) {
            Some(count) if locator.nth < *count => Ok(()),
            _ => Err(DriverError::ElementNotFound {
                selector: locator.selector.clone(),
            }),
        }
    }

    fn interact(&self, locator: &Locator) -> DriverResult<()> {
        self.known(locator)?;
        if self.script.broken_selectors.contains(&locator.selector) {
            return Err(DriverError::Interaction {
                selector: locator.selector.clone(),
                details: "element is detached".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn on_response(&self) -> DriverResult<ResponseStream> {
        if self.script.fail_at == FailAt::Hook {
            return Err(DriverError::Protocol("Network.enable failed".to_string()));
        }
        let (sender, receiver) = unbounded();
        *self.observer.lock().unwrap() = Some(sender);
        Ok(receiver.boxed())
    }

    async fn goto(&self, url: &str, _wait: WaitStrategy, timeout: Duration) -> DriverResult<()> {
        self.script.calls.gotos.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_at == FailAt::Navigation {
            return Err(DriverError::Timeout {
                condition: format!("navigation to {}", url),
                timeout,
            });
        }
        if let Some(sender) = self.observer.lock().unwrap().as_ref() {
            for exchange in &self.script.responses {
                let _ = sender.unbounded_send(Box::new(FakeResponse::new(exchange.clone())));
            }
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        Ok(self.script.elements.get(selector).copied().unwrap_or(0))
    }

    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool> {
        self.known(locator).map(|_| true)
    }

    async fn is_enabled(&self, locator: &Locator) -> DriverResult<bool> {
        self.known(locator).map(|_| true)
    }

    async fn scroll_into_view(&self, locator: &Locator, _timeout: Duration) -> DriverResult<()> {
        self.known(locator)
    }

    async fn fill(&self, locator: &Locator, _value: &str, _timeout: Duration) -> DriverResult<()> {
        self.script.calls.fill_attempts.fetch_add(1, Ordering::SeqCst);
        self.interact(locator)?;
        self.script.calls.fills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn click(&self, locator: &Locator, _delay: Duration, _timeout: Duration) -> DriverResult<()> {
        self.script.calls.click_attempts.fetch_add(1, Ordering::SeqCst);
        self.interact(locator)?;
        self.script.calls.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn hover(&self, locator: &Locator, _timeout: Duration) -> DriverResult<()> {
        self.known(locator)
    }

    async fn press(&self, locator: &Locator, _key: &str, _delay: Duration, _timeout: Duration) -> DriverResult<()> {
        self.known(locator)?;
        self.script.calls.presses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> DriverResult<serde_json::Value> {
        if self.script.fail_at == FailAt::ScrollPanic {
            panic!("renderer state corrupted");
        }
        let step = self.script.calls.scrolls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.script.cancel_at_scroll {
            if step == *at {
                token.cancel();
            }
        }
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.script.calls.page_closes.fetch_add(1, Ordering::SeqCst);
        self.observer.lock().unwrap().take();
        Ok(())
    }
}

/// Response whose bodies come straight from the scripted exchange
pub struct FakeResponse {
    head: CapturedExchange,
}

impl FakeResponse {
    pub fn new(exchange: CapturedExchange) -> Self {
        Self { head: exchange }
    }
}

#[async_trait]
impl ObservedResponse for FakeResponse {
    fn head(&self) -> &CapturedExchange {
        &self.head
    }

    async fn request_headers(&self) -> DriverResult<Headers> {
        Ok(self.head.request_headers.clone())
    }

    async fn request_body(&self) -> DriverResult<Option<Vec<u8>>> {
        Ok(self.head.request_body.clone())
    }

    async fn response_headers(&self) -> DriverResult<Headers> {
        Ok(self.head.response_headers.clone())
    }

    async fn response_body(&self) -> DriverResult<Option<Vec<u8>>> {
        Ok(self.head.response_body.clone())
    }
}

/// A JSON API response from a page script
pub fn json_response(method: &str, url: &str, status: u16, body: &str) -> CapturedExchange {
    CapturedExchange::new(method, url, ResourceType::Fetch, status)
        .with_response_header("Content-Type", "application/json")
        .with_response_body(body.as_bytes().to_vec())
}

/// Configuration with the given interaction plan and default filters
pub fn config_with(plan: InteractionPlan) -> ScanConfiguration {
    ScanConfiguration::builder("http://app.test/")
        .interaction(plan)
        .build()
        .unwrap()
        .0
}
