//! Scan Configuration
//!
//! Immutable per-run settings plus the validation helpers that turn raw user
//! input (URL, proxy, ignore list, selectors) into a configuration snapshot.

use crate::discovery::model::ResourceType;
use crate::discovery::status_filter::StatusFilter;
use crate::error::{DiscoveryError, DiscoveryResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

lazy_static! {
    static ref SCHEME_PREFIX: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap();
}

/// Patterns that never describe interesting API traffic: analytics, ad
/// networks, CDNs and static assets.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "google-analytics.com", "googletagmanager.com", "facebook.net", "connect.facebook.net",
    "fbcdn.net", "doubleclick.net", "googleadservices.com", "adservice.google.com",
    "googlesyndication.com", "fonts.googleapis.com", "fonts.gstatic.com",
    "gstatic.com/recaptcha", "criteo.com", "scorecardresearch.com", "krxd.net",
    "cdn-cgi/challenge-platform", "cdn-cgi/rum", "cdn.jsdelivr.net", "cdnjs.cloudflare.com",
    ".js", ".css", ".woff", ".woff2", ".ttf", ".svg", ".png", ".jpg", ".jpeg",
    ".gif", ".ico", ".webp", ".avif", ".mp4", ".webm", ".css.map", ".js.map",
    "google.com/ads", "youtube.com/api/stats", "googlevideo.com", "ytimg.com",
    "imasdk.googleapis.com", "/beacon", "/track", "/pixel", "analytics", "metrics", "segment.com",
];

/// Built-in user agent strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserAgentPreset {
    ChromeWindows,
    FirefoxWindows,
    SafariMac,
    SafariIphone,
    ChromeAndroid,
}

impl UserAgentPreset {
    pub const ALL: [UserAgentPreset; 5] = [
        UserAgentPreset::ChromeWindows,
        UserAgentPreset::FirefoxWindows,
        UserAgentPreset::SafariMac,
        UserAgentPreset::SafariIphone,
        UserAgentPreset::ChromeAndroid,
    ];

    pub fn user_agent(&self) -> &'static str {
        match self {
            UserAgentPreset::ChromeWindows => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
            UserAgentPreset::FirefoxWindows => "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
            UserAgentPreset::SafariMac => "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
            UserAgentPreset::SafariIphone => "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
            UserAgentPreset::ChromeAndroid => "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Mobile Safari/537.36",
        }
    }
}

impl FromStr for UserAgentPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome-windows" | "chrome" => Ok(UserAgentPreset::ChromeWindows),
            "firefox-windows" | "firefox" => Ok(UserAgentPreset::FirefoxWindows),
            "safari-mac" | "safari" => Ok(UserAgentPreset::SafariMac),
            "safari-iphone" | "iphone" => Ok(UserAgentPreset::SafariIphone),
            "chrome-android" | "android" => Ok(UserAgentPreset::ChromeAndroid),
            other => Err(format!("unknown user agent preset: {}", other)),
        }
    }
}

/// Resolve a user agent from a preset or a custom string. An empty custom
/// string falls back to the first preset.
pub fn resolve_user_agent(preset: Option<UserAgentPreset>, custom: Option<&str>) -> String {
    if let Some(custom) = custom {
        let custom = custom.trim();
        if !custom.is_empty() {
            return custom.to_string();
        }
    }
    preset
        .unwrap_or(UserAgentPreset::ChromeWindows)
        .user_agent()
        .to_string()
}

/// Navigation wait strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// `load` event fired
    Load,
    /// `DOMContentLoaded` fired
    DomReady,
    /// No network activity for a short quiet window
    #[default]
    NetworkIdle,
}

impl WaitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitStrategy::Load => "load",
            WaitStrategy::DomReady => "dom-ready",
            WaitStrategy::NetworkIdle => "network-idle",
        }
    }
}

impl FromStr for WaitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(WaitStrategy::Load),
            "dom-ready" | "domcontentloaded" | "domready" => Ok(WaitStrategy::DomReady),
            "network-idle" | "networkidle" => Ok(WaitStrategy::NetworkIdle),
            other => Err(format!("unknown wait strategy: {}", other)),
        }
    }
}

impl fmt::Display for WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(format!("unknown proxy scheme: {}", other)),
        }
    }
}

/// Proxy configuration for the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxySettings {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` (or a full `scheme://host:port`) input.
    /// Empty input means "no proxy".
    pub fn parse(input: &str, scheme: ProxyScheme) -> DiscoveryResult<Option<Self>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }

        let server = if ["http://", "https://", "socks5://"]
            .iter()
            .any(|prefix| input.starts_with(prefix))
        {
            input.to_string()
        } else {
            format!("{}://{}", scheme.as_str(), input)
        };

        let parsed = Url::parse(&server)
            .map_err(|e| DiscoveryError::InvalidParameter(format!("Invalid proxy format: {}: {}", input, e)))?;
        let scheme = parsed
            .scheme()
            .parse::<ProxyScheme>()
            .map_err(DiscoveryError::InvalidParameter)?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DiscoveryError::InvalidParameter(format!("Invalid proxy hostname: {}", input)))?;
        let port = parsed
            .port()
            .ok_or_else(|| DiscoveryError::InvalidParameter(format!("Invalid proxy port: {}", input)))?;

        Ok(Some(Self::new(scheme, host, port)))
    }

    /// Parse, dropping an invalid proxy with a warning
    pub fn parse_or_ignore(input: &str, scheme: ProxyScheme) -> (Option<Self>, Option<DiscoveryError>) {
        match Self::parse(input, scheme) {
            Ok(proxy) => (proxy, None),
            Err(e) => {
                warn!("{}. Ignoring proxy.", e);
                (None, Some(e))
            }
        }
    }

    /// Convert to proxy URL format
    pub fn to_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Scripted interaction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionPlan {
    /// Number of scroll-to-bottom steps
    pub scroll_count: u32,
    /// Pause after each scroll
    #[serde(with = "duration_secs")]
    pub scroll_delay: Duration,
    /// CSS selectors to click, in order
    pub click_selectors: Vec<String>,
    /// Hover over each element before clicking it
    pub hover_before_click: bool,
    /// CSS selector of the input to fill
    pub form_selector: Option<String>,
    /// Values typed into the form input, one per round
    pub form_values: Vec<String>,
    /// Press Enter after each fill
    pub submit_after_fill: bool,
    /// Pause between form rounds
    #[serde(with = "duration_secs")]
    pub form_delay: Duration,
    /// Pause after the initial load and after each phase
    #[serde(with = "duration_secs")]
    pub settle_time: Duration,
}

impl Default for InteractionPlan {
    fn default() -> Self {
        Self {
            scroll_count: 3,
            scroll_delay: Duration::from_millis(1500),
            click_selectors: Vec::new(),
            hover_before_click: false,
            form_selector: None,
            form_values: Vec::new(),
            submit_after_fill: true,
            form_delay: Duration::from_secs(2),
            settle_time: Duration::from_secs(2),
        }
    }
}

impl InteractionPlan {
    /// A plan that performs no interaction at all
    pub fn none() -> Self {
        Self {
            scroll_count: 0,
            ..Default::default()
        }
    }

    /// Whether the form phase has anything to do
    pub fn has_form_phase(&self) -> bool {
        self.form_selector.as_deref().is_some_and(|s| !s.trim().is_empty()) && !self.form_values.is_empty()
    }
}

/// Immutable settings for one discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfiguration {
    pub target_url: String,
    pub user_agent: String,
    pub proxy: Option<ProxySettings>,
    pub wait_strategy: WaitStrategy,
    #[serde(with = "duration_millis")]
    pub navigation_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub action_timeout: Duration,
    pub interaction: InteractionPlan,
    /// Empty set = every resource type passes
    pub resource_types: BTreeSet<ResourceType>,
    pub status_filter: StatusFilter,
    /// Lowercased substrings matched against URL host and path
    pub ignore_patterns: Vec<String>,
}

impl ScanConfiguration {
    pub fn builder(target_url: impl Into<String>) -> ScanConfigurationBuilder {
        ScanConfigurationBuilder::new(target_url)
    }

    /// Freeze into a shareable snapshot for a run
    pub fn snapshot(&self) -> Arc<ScanConfiguration> {
        Arc::new(self.clone())
    }
}

/// Resource types checked by default: the ones page scripts use
pub fn default_resource_types() -> BTreeSet<ResourceType> {
    [ResourceType::Xhr, ResourceType::Fetch].into_iter().collect()
}

/// Builder that validates raw input into a [`ScanConfiguration`].
///
/// Soft problems (bad proxy, bad status filter) do not fail the build; they
/// are reverted to defaults and listed by [`ScanConfigurationBuilder::warnings`].
#[derive(Debug, Clone)]
pub struct ScanConfigurationBuilder {
    target_url: String,
    user_agent: String,
    proxy: Option<ProxySettings>,
    wait_strategy: WaitStrategy,
    navigation_timeout: Duration,
    action_timeout: Duration,
    interaction: InteractionPlan,
    resource_types: BTreeSet<ResourceType>,
    status_filter: StatusFilter,
    user_ignore_patterns: Vec<String>,
    include_default_ignores: bool,
    warnings: Vec<String>,
}

impl ScanConfigurationBuilder {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            user_agent: UserAgentPreset::ChromeWindows.user_agent().to_string(),
            proxy: None,
            wait_strategy: WaitStrategy::default(),
            navigation_timeout: Duration::from_millis(60_000),
            action_timeout: Duration::from_millis(30_000),
            interaction: InteractionPlan::default(),
            resource_types: default_resource_types(),
            status_filter: StatusFilter::default(),
            user_ignore_patterns: Vec::new(),
            include_default_ignores: true,
            warnings: Vec::new(),
        }
    }

    /// Start from an existing configuration (e.g. loaded from a file)
    pub fn from_configuration(config: ScanConfiguration) -> Self {
        Self {
            target_url: config.target_url,
            user_agent: config.user_agent,
            proxy: config.proxy,
            wait_strategy: config.wait_strategy,
            navigation_timeout: config.navigation_timeout,
            action_timeout: config.action_timeout,
            interaction: config.interaction,
            resource_types: config.resource_types,
            status_filter: config.status_filter,
            user_ignore_patterns: config.ignore_patterns,
            include_default_ignores: false,
            warnings: Vec::new(),
        }
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        self.user_agent = resolve_user_agent(None, Some(&user_agent));
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxySettings>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Parse proxy input; an invalid proxy is ignored with a warning
    pub fn proxy_input(mut self, input: &str, scheme: ProxyScheme) -> Self {
        let (proxy, error) = ProxySettings::parse_or_ignore(input, scheme);
        if let Some(e) = error {
            self.warnings.push(format!("Invalid proxy format ignored: {}", e));
        }
        self.proxy = proxy;
        self
    }

    pub fn wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }

    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn interaction(mut self, plan: InteractionPlan) -> Self {
        self.interaction = plan;
        self
    }

    /// Comma-separated click selectors
    pub fn click_selectors_input(mut self, input: &str) -> Self {
        self.interaction.click_selectors = split_selectors(input);
        self
    }

    /// Newline-separated form values
    pub fn form_values_input(mut self, input: &str) -> Self {
        self.interaction.form_values = split_lines(input);
        self
    }

    pub fn resource_types(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        self.resource_types = types.into_iter().collect();
        self
    }

    pub fn status_filter(mut self, filter: StatusFilter) -> Self {
        self.status_filter = filter;
        self
    }

    /// Parse a status filter expression; a malformed one reverts to default
    pub fn status_filter_input(mut self, input: &str) -> Self {
        let (filter, error) = StatusFilter::parse_or_default(input);
        if let Some(e) = error {
            self.warnings.push(format!("Invalid status code input: {}. Using default.", e));
        }
        self.status_filter = filter;
        self
    }

    /// User ignore patterns, one per line; `#` starts a comment line
    pub fn ignore_input(mut self, input: &str) -> Self {
        self.user_ignore_patterns.extend(parse_ignore_lines(input));
        self
    }

    pub fn ignore_patterns(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.user_ignore_patterns
            .extend(patterns.into_iter().map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty()));
        self
    }

    /// Whether the built-in ignore list is merged in (on by default)
    pub fn default_ignores(mut self, include: bool) -> Self {
        self.include_default_ignores = include;
        self
    }

    /// Interaction plan as configured so far
    pub fn interaction_plan(&self) -> &InteractionPlan {
        &self.interaction
    }

    /// Soft validation problems collected so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Validate and produce the configuration plus any soft warnings
    pub fn build(self) -> DiscoveryResult<(ScanConfiguration, Vec<String>)> {
        let target_url = sanitize_target_url(&self.target_url)?;

        if self.navigation_timeout.is_zero() || self.action_timeout.is_zero() {
            return Err(DiscoveryError::InvalidParameter(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        let ignore_patterns = combine_ignore_patterns(
            &self.user_ignore_patterns,
            self.include_default_ignores,
        );
        debug!("Using {} combined ignore patterns.", ignore_patterns.len());

        let config = ScanConfiguration {
            target_url,
            user_agent: self.user_agent,
            proxy: self.proxy,
            wait_strategy: self.wait_strategy,
            navigation_timeout: self.navigation_timeout,
            action_timeout: self.action_timeout,
            interaction: self.interaction,
            resource_types: self.resource_types,
            status_filter: self.status_filter,
            ignore_patterns,
        };
        Ok((config, self.warnings))
    }
}

/// Add a scheme if missing and check the URL has a scheme and a host
pub fn sanitize_target_url(input: &str) -> DiscoveryResult<String> {
    let mut url = input.trim().to_string();
    if url.is_empty() {
        return Err(DiscoveryError::InvalidParameter("URL cannot be empty.".to_string()));
    }

    if !SCHEME_PREFIX.is_match(&url) {
        // `https:example.com` carries a scheme but no authority
        url = match url.split_once(':') {
            Some((scheme, rest))
                if matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https")
                    && !rest.is_empty()
                    && !rest.starts_with('/')
                    && !rest.chars().next().is_some_and(|c| c.is_ascii_digit()) =>
            {
                format!("{}://{}", scheme, rest)
            }
            _ => {
                debug!("Prepending https:// to URL: {}", url);
                format!("https://{}", url)
            }
        };
    }

    let parsed = Url::parse(&url)
        .map_err(|e| DiscoveryError::InvalidParameter(format!("Invalid URL structure: {}", e)))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(DiscoveryError::InvalidParameter(
            "Invalid URL format. Ensure it includes scheme and domain.".to_string(),
        ));
    }
    Ok(parsed.to_string())
}

/// Trimmed, lowercased, comment-free ignore lines
pub fn parse_ignore_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// Merge user patterns with the built-in list, removing duplicates
pub fn combine_ignore_patterns(user: &[String], include_defaults: bool) -> Vec<String> {
    let mut combined = BTreeSet::new();
    if include_defaults {
        combined.extend(DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()));
    }
    combined.extend(
        user.iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty()),
    );
    combined.into_iter().collect()
}

/// Comma-separated selectors, trimmed, empties dropped
pub fn split_selectors(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Newline-separated values, trimmed, empties dropped
pub fn split_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
