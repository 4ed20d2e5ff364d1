//! Browser Driver Contract
//!
//! The capabilities the discovery session needs from a browser automation
//! backend. [`crate::discovery::chromium`] implements them over the Chrome
//! DevTools Protocol; tests substitute an in-memory driver.

use crate::discovery::config::{ProxySettings, WaitStrategy};
use crate::discovery::model::{CapturedExchange, Headers};
use crate::error::DriverResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Options used when launching the browser process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<ProxySettings>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
        }
    }
}

/// Defaults applied to every page of an isolated browser context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub ignore_tls_errors: bool,
    pub bypass_csp: bool,
    pub navigation_timeout: Duration,
    pub action_timeout: Duration,
}

impl ContextOptions {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport: (1920, 1080),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            ignore_tls_errors: true,
            bypass_csp: true,
            navigation_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// A CSS selector narrowed to its n-th match
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub selector: String,
    pub nth: usize,
}

impl Locator {
    pub fn new(selector: impl Into<String>, nth: usize) -> Self {
        Self {
            selector: selector.into(),
            nth,
        }
    }

    pub fn first(selector: impl Into<String>) -> Self {
        Self::new(selector, 0)
    }
}

/// One network response as seen by the page.
///
/// [`ObservedResponse::head`] is available immediately and is what the
/// classifier looks at. Full header sets and bodies are fetched on demand and
/// may fail once the page has moved on.
#[async_trait]
pub trait ObservedResponse: Send + Sync {
    /// Method, URL, resource type, status and the headers known up front
    fn head(&self) -> &CapturedExchange;

    async fn request_headers(&self) -> DriverResult<Headers>;

    async fn request_body(&self) -> DriverResult<Option<Vec<u8>>>;

    async fn response_headers(&self) -> DriverResult<Headers>;

    async fn response_body(&self) -> DriverResult<Option<Vec<u8>>>;
}

/// Stream of responses observed by a page, in arrival order
pub type ResponseStream = BoxStream<'static, Box<dyn ObservedResponse>>;

/// Entry point: launches browser processes
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserSession>>;
}

/// A running browser
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Create an isolated context (separate cookies and storage)
    async fn new_context(&self, options: &ContextOptions) -> DriverResult<Box<dyn BrowserContext>>;

    async fn close(&self) -> DriverResult<()>;
}

/// An isolated browser context
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>>;

    async fn close(&self) -> DriverResult<()>;
}

/// A single page. Calls are never issued concurrently for the same page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Subscribe to responses. Must be called before the first navigation.
    async fn on_response(&self) -> DriverResult<ResponseStream>;

    async fn goto(&self, url: &str, wait: WaitStrategy, timeout: Duration) -> DriverResult<()>;

    /// Number of elements matching a CSS selector
    async fn count(&self, selector: &str) -> DriverResult<usize>;

    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool>;

    async fn is_enabled(&self, locator: &Locator) -> DriverResult<bool>;

    async fn scroll_into_view(&self, locator: &Locator, timeout: Duration) -> DriverResult<()>;

    /// Replace the element's value with `value`
    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> DriverResult<()>;

    /// Click, holding the button down for `delay`
    async fn click(&self, locator: &Locator, delay: Duration, timeout: Duration) -> DriverResult<()>;

    async fn hover(&self, locator: &Locator, timeout: Duration) -> DriverResult<()>;

    /// Press a key (e.g. `Enter`) on the element, holding it for `delay`
    async fn press(&self, locator: &Locator, key: &str, delay: Duration, timeout: Duration) -> DriverResult<()>;

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    /// Wait until no request has been in flight for a short quiet window
    async fn wait_for_network_idle(&self, timeout: Duration) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;
}
