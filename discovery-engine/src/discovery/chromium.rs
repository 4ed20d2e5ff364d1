//! Chromium Driver
//!
//! [`BrowserDriver`] implementation over the Chrome DevTools Protocol.
//! Each session launches its own Chromium with a throwaway profile; each
//! context is a CDP browser context; element operations run as page scripts
//! addressed by selector and match index.

use crate::discovery::config::WaitStrategy;
use crate::discovery::driver::{
    BrowserContext, BrowserDriver, BrowserSession, ContextOptions, LaunchOptions, Locator,
    ObservedResponse, PageHandle, ResponseStream,
};
use crate::discovery::model::{CapturedExchange, Headers, ResourceType};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, GetRequestPostDataParams,
    GetResponseBodyParams, RequestId, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, NavigateParams, SetBypassCspParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Quiet period that counts as "network idle"
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// Poll interval for element and idle waits
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn protocol_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

/// JSON-encode a string for embedding in a page script
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Launches a dedicated Chromium process per session
#[derive(Debug, Clone, Default)]
pub struct ChromiumDriver {
    /// Extra command line flags passed to Chromium
    pub extra_args: Vec<String>,
}

impl ChromiumDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserSession>> {
        let mut config_builder = BrowserConfig::builder();

        // Unique profile directory avoids SingletonLock clashes between runs
        let user_data_dir = std::env::temp_dir().join(format!("api_discovery_{}", Uuid::new_v4()));
        config_builder = config_builder.user_data_dir(&user_data_dir);

        if !options.headless {
            config_builder = config_builder.with_head();
        }

        if let Some(ref proxy) = options.proxy {
            config_builder = config_builder.arg(format!("--proxy-server={}", proxy.to_url()));
        }

        config_builder = config_builder
            .arg("--ignore-certificate-errors")
            .arg("--window-size=1920,1080")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        for arg in &self.extra_args {
            config_builder = config_builder.arg(arg);
        }

        let config = config_builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {:?}", e);
                }
            }
        });

        info!(
            "Browser launched (headless: {}, proxy: {:?})",
            options.headless,
            options.proxy.as_ref().map(|p| p.to_url())
        );

        Ok(Box::new(ChromiumSession {
            browser: Arc::new(RwLock::new(Some(browser))),
            handler_task: Mutex::new(Some(handler_task)),
            user_data_dir,
        }))
    }
}

/// A running Chromium process
pub struct ChromiumSession {
    browser: Arc<RwLock<Option<Browser>>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    user_data_dir: PathBuf,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_context(&self, options: &ContextOptions) -> DriverResult<Box<dyn BrowserContext>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(DriverError::Closed)?;

        let response = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| DriverError::Context(e.to_string()))?;
        let context_id = response.result.browser_context_id.clone();
        debug!("Created browser context {:?}", context_id);

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id,
            options: options.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let browser = self.browser.write().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser gracefully: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser process wait failed: {}", e);
            }
        }

        let handler_task = self
            .handler_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = handler_task {
            task.abort();
        }

        if self.user_data_dir.exists() {
            debug!("Cleaning up browser profile: {:?}", self.user_data_dir);
            if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
                warn!("Failed to remove browser profile dir: {:?}", e);
            }
        }
        info!("Browser closed");
        Ok(())
    }
}

/// An isolated CDP browser context
pub struct ChromiumContext {
    browser: Arc<RwLock<Option<Browser>>>,
    context_id: BrowserContextId,
    options: ContextOptions,
}

impl ChromiumContext {
    /// Apply context-level defaults to a freshly created page
    async fn configure_page(&self, page: &Page) -> DriverResult<()> {
        let options = &self.options;
        let page_error = |e: chromiumoxide::error::CdpError| DriverError::Page(e.to_string());

        page.execute(NetworkEnableParams::default()).await.map_err(page_error)?;
        page.set_user_agent(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .map_err(page_error)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(options.viewport.0),
            i64::from(options.viewport.1),
            1.0,
            false,
        ))
        .await
        .map_err(page_error)?;
        page.execute(SetTimezoneOverrideParams::new(options.timezone.clone()))
            .await
            .map_err(page_error)?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(options.locale.clone()),
        })
        .await
        .map_err(page_error)?;
        if options.bypass_csp {
            page.execute(SetBypassCspParams::new(true)).await.map_err(page_error)?;
        }
        if options.ignore_tls_errors {
            page.execute(SetIgnoreCertificateErrorsParams::new(true))
                .await
                .map_err(page_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        let page = {
            let guard = self.browser.read().await;
            let browser = guard.as_ref().ok_or(DriverError::Closed)?;
            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(self.context_id.clone())
                .build()
                .map_err(DriverError::Page)?;
            browser
                .new_page(params)
                .await
                .map_err(|e| DriverError::Page(e.to_string()))?
        };

        self.configure_page(&page).await?;
        let activity = NetworkActivity::track(&page).await?;

        Ok(Box::new(ChromiumPage {
            page,
            activity,
            default_timeout: self.options.action_timeout,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let guard = self.browser.read().await;
        if let Some(browser) = guard.as_ref() {
            browser
                .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
                .await
                .map_err(|e| DriverError::Context(e.to_string()))?;
        }
        Ok(())
    }
}

/// Requests currently in flight for a page, used for network-idle waits
struct NetworkActivity {
    state: Mutex<ActivityState>,
    task: JoinHandle<()>,
}

struct ActivityState {
    in_flight: HashSet<RequestId>,
    last_change: Instant,
}

enum ActivityEvent {
    Started(RequestId),
    Done(RequestId),
}

impl NetworkActivity {
    async fn track(page: &Page) -> DriverResult<Arc<Self>> {
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol_error)?
            .map(|e| ActivityEvent::Started(e.request_id.clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(protocol_error)?
            .map(|e| ActivityEvent::Done(e.request_id.clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(protocol_error)?
            .map(|e| ActivityEvent::Done(e.request_id.clone()));

        let mut events: BoxStream<'static, ActivityEvent> =
            stream::select_all(vec![started.boxed(), finished.boxed(), failed.boxed()]).boxed();

        let activity = Arc::new_cyclic(|weak: &std::sync::Weak<NetworkActivity>| {
            let weak = weak.clone();
            let task = tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let Some(activity) = weak.upgrade() else { break };
                    activity.apply(event);
                }
            });
            NetworkActivity {
                state: Mutex::new(ActivityState {
                    in_flight: HashSet::new(),
                    last_change: Instant::now(),
                }),
                task,
            }
        });
        Ok(activity)
    }

    fn apply(&self, event: ActivityEvent) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match event {
            ActivityEvent::Started(id) => {
                state.in_flight.insert(id);
            }
            ActivityEvent::Done(id) => {
                state.in_flight.remove(&id);
            }
        }
        state.last_change = Instant::now();
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.in_flight.is_empty() && state.last_change.elapsed() >= NETWORK_QUIET
    }

    async fn wait_for_idle(&self) {
        while !self.is_idle() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Drop for NetworkActivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A Chromium page
pub struct ChromiumPage {
    page: Page,
    activity: Arc<NetworkActivity>,
    default_timeout: Duration,
}

impl ChromiumPage {
    /// Run a script and return its JSON result; `undefined` becomes null
    async fn run_script(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    /// Script body run against the located element; `null` means "not found"
    fn element_script(locator: &Locator, body: &str) -> String {
        format!(
            "(() => {{ const el = document.querySelectorAll({})[{}]; if (!el) return null; {} }})()",
            js_string(&locator.selector),
            locator.nth,
            body
        )
    }

    /// Run an element script once, failing if the element does not exist
    async fn on_element(&self, locator: &Locator, body: &str) -> DriverResult<serde_json::Value> {
        let value = self.run_script(&Self::element_script(locator, body)).await?;
        if value.is_null() {
            return Err(DriverError::ElementNotFound {
                selector: format!("{} nth({})", locator.selector, locator.nth),
            });
        }
        Ok(value)
    }

    /// Retry an element script until the element shows up or `timeout` passes
    async fn wait_on_element(
        &self,
        locator: &Locator,
        body: &str,
        timeout: Duration,
        action: &str,
    ) -> DriverResult<serde_json::Value> {
        let attempt = async {
            loop {
                match self.on_element(locator, body).await {
                    Err(DriverError::ElementNotFound { .. }) => tokio::time::sleep(POLL_INTERVAL).await,
                    other => return other,
                }
            }
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| DriverError::Timeout {
                condition: format!("{} on {}", action, locator.selector),
                timeout,
            })?
    }

    /// Viewport coordinates of the element's center, after scrolling it into view
    async fn element_center(&self, locator: &Locator, timeout: Duration) -> DriverResult<(f64, f64)> {
        let value = self
            .wait_on_element(
                locator,
                "el.scrollIntoView({block: 'center', inline: 'center'}); \
                 const r = el.getBoundingClientRect(); \
                 return [r.left + r.width / 2, r.top + r.height / 2];",
                timeout,
                "locate",
            )
            .await?;
        let x = value.get(0).and_then(|v| v.as_f64());
        let y = value.get(1).and_then(|v| v.as_f64());
        match (x, y) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(DriverError::Interaction {
                selector: locator.selector.clone(),
                details: "element has no box".to_string(),
            }),
        }
    }

    async fn mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> DriverResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(DriverError::Protocol)?;
        self.page.execute(params).await.map_err(protocol_error)?;
        Ok(())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: &str) -> DriverResult<()> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key).code(key);
        if key == "Enter" {
            builder = builder.windows_virtual_key_code(13).text("\r");
        }
        let params = builder.build().map_err(DriverError::Protocol)?;
        self.page.execute(params).await.map_err(protocol_error)?;
        Ok(())
    }

    async fn navigate_dom_ready(&self, url: &str) -> DriverResult<()> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(protocol_error)?;
        self.page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        dom_ready.next().await;
        Ok(())
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn on_response(&self) -> DriverResult<ResponseStream> {
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol_error)?
            .map(NetworkEvent::Request);
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol_error)?
            .map(NetworkEvent::Response);
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(protocol_error)?
            .map(|e| NetworkEvent::Done(e.request_id.clone()));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(protocol_error)?
            .map(|e| NetworkEvent::Done(e.request_id.clone()));

        let events = stream::select_all(vec![
            requests.boxed(),
            responses.boxed(),
            finished.boxed(),
            failed.boxed(),
        ]);
        Ok(correlate(events, self.page.clone()))
    }

    async fn goto(&self, url: &str, wait: WaitStrategy, timeout: Duration) -> DriverResult<()> {
        info!("Navigating to: {}", url);
        let navigation = async {
            match wait {
                WaitStrategy::DomReady => self.navigate_dom_ready(url).await,
                WaitStrategy::Load | WaitStrategy::NetworkIdle => {
                    self.page
                        .goto(url)
                        .await
                        .map_err(|e| DriverError::Navigation(format!("Failed to navigate to {}: {}", url, e)))?;
                    if wait == WaitStrategy::NetworkIdle {
                        self.activity.wait_for_idle().await;
                    }
                    Ok(())
                }
            }
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| DriverError::Timeout {
                condition: format!("navigation to {} ({})", url, wait),
                timeout,
            })?
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        let value = self.run_script(&script).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool> {
        let value = self
            .on_element(
                locator,
                "const r = el.getBoundingClientRect(); const s = window.getComputedStyle(el); \
                 return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, locator: &Locator) -> DriverResult<bool> {
        let value = self
            .on_element(locator, "return !(el.disabled || el.getAttribute('aria-disabled') === 'true');")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn scroll_into_view(&self, locator: &Locator, timeout: Duration) -> DriverResult<()> {
        self.wait_on_element(
            locator,
            "el.scrollIntoView({block: 'center', inline: 'center'}); return true;",
            timeout,
            "scroll into view",
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> DriverResult<()> {
        let body = format!(
            "const v = {}; el.focus(); \
             if ('value' in el) {{ \
               const d = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value'); \
               if (d && d.set) {{ d.set.call(el, v); }} else {{ el.value = v; }} \
             }} else if (el.isContentEditable) {{ el.textContent = v; }} else {{ return false; }} \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); \
             return true;",
            js_string(value)
        );
        let filled = self.wait_on_element(locator, &body, timeout, "fill").await?;
        if filled.as_bool() != Some(true) {
            return Err(DriverError::Interaction {
                selector: locator.selector.clone(),
                details: "element is not fillable".to_string(),
            });
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator, delay: Duration, timeout: Duration) -> DriverResult<()> {
        let click = async {
            let (x, y) = self.element_center(locator, timeout).await?;
            self.mouse(DispatchMouseEventType::MouseMoved, x, y).await?;
            self.mouse(DispatchMouseEventType::MousePressed, x, y).await?;
            tokio::time::sleep(delay).await;
            self.mouse(DispatchMouseEventType::MouseReleased, x, y).await
        };
        tokio::time::timeout(timeout, click)
            .await
            .map_err(|_| DriverError::Timeout {
                condition: format!("click on {}", locator.selector),
                timeout,
            })?
    }

    async fn hover(&self, locator: &Locator, timeout: Duration) -> DriverResult<()> {
        let (x, y) = self.element_center(locator, timeout).await?;
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await
    }

    async fn press(&self, locator: &Locator, key: &str, delay: Duration, timeout: Duration) -> DriverResult<()> {
        self.wait_on_element(locator, "el.focus(); return true;", timeout, "focus")
            .await?;
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        tokio::time::sleep(delay).await;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        self.run_script(script).await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> DriverResult<()> {
        let timeout = if timeout.is_zero() { self.default_timeout } else { timeout };
        tokio::time::timeout(timeout, self.activity.wait_for_idle())
            .await
            .map_err(|_| DriverError::Timeout {
                condition: "network idle".to_string(),
                timeout,
            })
    }

    async fn close(&self) -> DriverResult<()> {
        self.page.clone().close().await.map_err(protocol_error)
    }
}

enum NetworkEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
    Done(RequestId),
}

/// What is known about a request before its response completes
struct PendingRequest {
    method: String,
    url: String,
    request_headers: Headers,
    has_post_data: bool,
}

/// Pair requests with their responses and yield an exchange once the
/// response body has finished loading (or failed to).
fn correlate(events: impl futures::Stream<Item = NetworkEvent> + Send + 'static, page: Page) -> ResponseStream {
    let (sender, receiver) = futures::channel::mpsc::unbounded::<Box<dyn ObservedResponse>>();

    tokio::spawn(async move {
        let mut events = Box::pin(events);
        let mut pending: HashMap<RequestId, PendingRequest> = HashMap::new();
        let mut responded: HashMap<RequestId, CapturedExchange> = HashMap::new();

        while let Some(event) = events.next().await {
            match event {
                NetworkEvent::Request(event) => {
                    let request = &event.request;
                    pending.insert(
                        event.request_id.clone(),
                        PendingRequest {
                            method: request.method.clone(),
                            url: request.url.clone(),
                            request_headers: cdp_headers(&request.headers),
                            has_post_data: request.has_post_data.unwrap_or(false),
                        },
                    );
                }
                NetworkEvent::Response(event) => {
                    let response = &event.response;
                    let request = pending.get(&event.request_id);
                    let mut response_headers = cdp_headers(&response.headers);
                    if !response_headers.contains("content-type") && !response.mime_type.is_empty() {
                        response_headers.append("content-type", response.mime_type.clone());
                    }
                    let mut exchange = CapturedExchange {
                        method: request.map(|r| r.method.clone()).unwrap_or_else(|| "GET".to_string()),
                        url: request.map(|r| r.url.clone()).unwrap_or_else(|| response.url.clone()),
                        resource_type: ResourceType::from_label(event.r#type.as_ref()),
                        status: u16::try_from(response.status).ok(),
                        request_headers: request.map(|r| r.request_headers.clone()).unwrap_or_default(),
                        request_body: None,
                        response_headers,
                        response_body: None,
                    };
                    if let Some(extra) = response.request_headers.as_ref() {
                        for (name, value) in cdp_headers(extra).iter() {
                            if !exchange.request_headers.contains(name) {
                                exchange.request_headers.append(name, value);
                            }
                        }
                    }
                    responded.insert(event.request_id.clone(), exchange);
                }
                NetworkEvent::Done(request_id) => {
                    let request = pending.remove(&request_id);
                    let Some(head) = responded.remove(&request_id) else {
                        continue;
                    };
                    let observed = ChromiumResponse {
                        head,
                        request_id,
                        has_post_data: request.map(|r| r.has_post_data).unwrap_or(false),
                        page: page.clone(),
                    };
                    if sender.unbounded_send(Box::new(observed)).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Network event stream ended");
    });

    receiver.boxed()
}

fn cdp_headers(headers: &chromiumoxide::cdp::browser_protocol::network::Headers) -> Headers {
    serde_json::to_value(headers)
        .map(|value| Headers::from_json(&value))
        .unwrap_or_default()
}

/// A completed response whose bodies are fetched from the page on demand
struct ChromiumResponse {
    head: CapturedExchange,
    request_id: RequestId,
    has_post_data: bool,
    page: Page,
}

#[async_trait]
impl ObservedResponse for ChromiumResponse {
    fn head(&self) -> &CapturedExchange {
        &self.head
    }

    async fn request_headers(&self) -> DriverResult<Headers> {
        Ok(self.head.request_headers.clone())
    }

    async fn request_body(&self) -> DriverResult<Option<Vec<u8>>> {
        if !self.has_post_data {
            return Ok(None);
        }
        let response = self
            .page
            .execute(GetRequestPostDataParams::new(self.request_id.clone()))
            .await
            .map_err(|e| DriverError::Capture(e.to_string()))?;
        Ok(Some(response.result.post_data.clone().into_bytes()))
    }

    async fn response_headers(&self) -> DriverResult<Headers> {
        Ok(self.head.response_headers.clone())
    }

    async fn response_body(&self) -> DriverResult<Option<Vec<u8>>> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(self.request_id.clone()))
            .await
            .map_err(|e| DriverError::Capture(e.to_string()))?;
        let body = &response.result;
        if body.base64_encoded {
            STANDARD
                .decode(body.body.as_bytes())
                .map(Some)
                .map_err(|e| DriverError::Capture(format!("Invalid base64 body: {}", e)))
        } else {
            Ok(Some(body.body.clone().into_bytes()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escaping() {
        assert_eq!(js_string("a'b\"c"), "\"a'b\\\"c\"");
    }

    #[test]
    fn test_element_script() {
        let script = ChromiumPage::element_script(&Locator::new("button.more", 2), "return true;");
        assert!(script.contains("document.querySelectorAll(\"button.more\")[2]"));
        assert!(script.ends_with("return true; })()"));
    }

    #[test]
    fn test_context_id_flows_into_target_and_disposal() {
        let context_id = BrowserContextId::from("ctx-1".to_string());
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .unwrap();
        assert_eq!(target.browser_context_id, Some(context_id.clone()));

        let dispose = DisposeBrowserContextParams::new(context_id.clone());
        assert_eq!(dispose.browser_context_id, context_id);
    }

    #[test]
    fn test_driver_args() {
        let driver = ChromiumDriver::new().with_arg("--no-sandbox");
        assert_eq!(driver.extra_args, vec!["--no-sandbox".to_string()]);
    }
}
