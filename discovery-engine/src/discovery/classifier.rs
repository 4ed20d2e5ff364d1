//! Exchange Classifier
//!
//! Decides whether an observed exchange is an API call worth reporting.
//! Rules run in a fixed order and the first failing rule excludes.

use crate::discovery::config::ScanConfiguration;
use crate::discovery::model::CapturedExchange;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Content-type fragments that mark a response as API traffic
const API_CONTENT_MARKERS: &[&str] = &["json", "xml", "javascript", "vnd.api+json"];

/// Why an exchange was included or excluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum Reason {
    NoResponse,
    Preflight,
    ResourceType(String),
    Status(u16),
    Ignored(String),
    ApiContentType(String),
    StateChangingMethod(String),
    ScriptedRequest(String),
    NotApiLike,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NoResponse => write!(f, "no response"),
            Reason::Preflight => write!(f, "preflight request"),
            Reason::ResourceType(rt) => write!(f, "resource type '{}' not allowed", rt),
            Reason::Status(status) => write!(f, "status {} filtered", status),
            Reason::Ignored(pattern) => write!(f, "matches ignore pattern '{}'", pattern),
            Reason::ApiContentType(ct) => write!(f, "API content type '{}'", ct),
            Reason::StateChangingMethod(method) => write!(f, "{} request succeeded", method),
            Reason::ScriptedRequest(rt) => write!(f, "{} request", rt),
            Reason::NotApiLike => write!(f, "not API-like"),
        }
    }
}

/// Outcome of classifying one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub include: bool,
    pub reason: Reason,
}

impl Classification {
    fn include(reason: Reason) -> Self {
        Self { include: true, reason }
    }

    fn exclude(reason: Reason) -> Self {
        Self { include: false, reason }
    }
}

/// Classify an exchange against the active configuration
pub fn classify(exchange: &CapturedExchange, config: &ScanConfiguration) -> Classification {
    let status = match exchange.status {
        Some(status) => status,
        None => return Classification::exclude(Reason::NoResponse),
    };
    if exchange.method.eq_ignore_ascii_case("OPTIONS") {
        return Classification::exclude(Reason::Preflight);
    }

    if !config.resource_types.is_empty() && !config.resource_types.contains(&exchange.resource_type) {
        return Classification::exclude(Reason::ResourceType(exchange.resource_type.to_string()));
    }

    if !config.status_filter.allows(status) {
        return Classification::exclude(Reason::Status(status));
    }

    if let Some(pattern) = matching_ignore_pattern(&exchange.url, &config.ignore_patterns) {
        return Classification::exclude(Reason::Ignored(pattern.to_string()));
    }

    let content_type = exchange.content_type().to_ascii_lowercase();
    if API_CONTENT_MARKERS.iter().any(|marker| content_type.contains(marker)) {
        return Classification::include(Reason::ApiContentType(content_type));
    }
    if !exchange.method.eq_ignore_ascii_case("GET") && status < 400 {
        return Classification::include(Reason::StateChangingMethod(exchange.method.to_ascii_uppercase()));
    }
    if exchange.resource_type.is_scripted() {
        return Classification::include(Reason::ScriptedRequest(exchange.resource_type.to_string()));
    }

    Classification::exclude(Reason::NotApiLike)
}

/// First ignore pattern found in the URL's host or path.
/// An unparseable URL is matched as a whole.
fn matching_ignore_pattern<'a>(url: &str, patterns: &'a [String]) -> Option<&'a str> {
    if patterns.is_empty() {
        return None;
    }

    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_lowercase(),
            parsed.path().to_lowercase(),
        ),
        Err(_) => (String::new(), url.to_lowercase()),
    };

    patterns
        .iter()
        .map(String::as_str)
        .find(|pattern| {
            let pattern = pattern.to_lowercase();
            !pattern.is_empty() && (host.contains(&pattern) || path.contains(&pattern))
        })
}
