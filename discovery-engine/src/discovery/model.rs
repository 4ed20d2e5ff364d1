//! Exchange Data Models
//!
//! Core data structures describing what the browser observed on the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Resource type reported by the browser for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Xhr,
    Fetch,
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Websocket,
    Other,
}

impl ResourceType {
    /// Every resource type, in display order
    pub const ALL: [ResourceType; 10] = [
        ResourceType::Xhr,
        ResourceType::Fetch,
        ResourceType::Document,
        ResourceType::Script,
        ResourceType::Stylesheet,
        ResourceType::Image,
        ResourceType::Font,
        ResourceType::Media,
        ResourceType::Websocket,
        ResourceType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::Document => "document",
            ResourceType::Script => "script",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Media => "media",
            ResourceType::Websocket => "websocket",
            ResourceType::Other => "other",
        }
    }

    /// Map a driver-reported label onto a known type. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(ResourceType::Other)
    }

    /// Whether requests of this type are issued by page scripts
    pub fn is_scripted(&self) -> bool {
        matches!(self, ResourceType::Xhr | ResourceType::Fetch)
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xhr" => Ok(ResourceType::Xhr),
            "fetch" => Ok(ResourceType::Fetch),
            "document" => Ok(ResourceType::Document),
            "script" => Ok(ResourceType::Script),
            "stylesheet" => Ok(ResourceType::Stylesheet),
            "image" => Ok(ResourceType::Image),
            "font" => Ok(ResourceType::Font),
            "media" => Ok(ResourceType::Media),
            "websocket" => Ok(ResourceType::Websocket),
            "other" => Ok(ResourceType::Other),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP header map with case-insensitive names.
///
/// Names are stored lowercased. Repeated headers are folded the way browsers
/// report them: joined with `", "`, except `set-cookie` which is joined with
/// a newline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, folding it into an existing value of the same name
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let value = value.into();
        match self.0.get_mut(&name) {
            Some(existing) => {
                let separator = if name == "set-cookie" { "\n" } else { ", " };
                existing.push_str(separator);
                existing.push_str(&value);
            }
            None => {
                self.0.insert(name, value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `content-type` value, or an empty string
    pub fn content_type(&self) -> &str {
        self.get("content-type").unwrap_or("")
    }

    /// Build from a JSON object as reported by browser protocols.
    /// Non-string values are rendered with their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut headers = Headers::new();
        if let Some(object) = value.as_object() {
            for (name, value) in object {
                match value {
                    serde_json::Value::String(s) => {
                        // Chromium reports repeated headers newline-joined
                        for part in s.split('\n') {
                            headers.append(name, part);
                        }
                    }
                    other => headers.append(name, other.to_string()),
                }
            }
        }
        headers
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// One observed request/response pair.
///
/// `status` is `None` when the request never received a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedExchange {
    pub method: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub status: Option<u16>,
    pub request_headers: Headers,
    pub request_body: Option<Vec<u8>>,
    pub response_headers: Headers,
    pub response_body: Option<Vec<u8>>,
}

impl CapturedExchange {
    /// Create an exchange that has a response with the given status
    pub fn new(method: impl Into<String>, url: impl Into<String>, resource_type: ResourceType, status: u16) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            resource_type,
            status: Some(status),
            request_headers: Headers::new(),
            request_body: None,
            response_headers: Headers::new(),
            response_body: None,
        }
    }

    pub fn with_response_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.response_headers.append(name, value);
        self
    }

    pub fn with_request_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request_headers.append(name, value);
        self
    }

    pub fn with_request_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    /// Deduplication key: `METHOD URL`
    pub fn identity_key(&self) -> String {
        identity_key(&self.method, &self.url)
    }

    pub fn content_type(&self) -> &str {
        self.response_headers.content_type()
    }
}

/// Deduplication key for a method/URL pair
pub fn identity_key(method: &str, url: &str) -> String {
    format!("{} {}", method, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "application/json");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert!(headers.contains("Content-type"));
        assert_eq!(headers.content_type(), "application/json");
    }

    #[test]
    fn test_headers_folding() {
        let mut headers = Headers::new();
        headers.append("Accept", "text/html");
        headers.append("accept", "application/json");
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(headers.get("accept"), Some("text/html, application/json"));
        assert_eq!(headers.get("set-cookie"), Some("a=1\nb=2"));
    }

    #[test]
    fn test_headers_from_json() {
        let value = serde_json::json!({
            "Content-Type": "text/plain",
            "Set-Cookie": "a=1\nb=2",
            "X-Count": 3
        });
        let headers = Headers::from_json(&value);
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("set-cookie"), Some("a=1\nb=2"));
        assert_eq!(headers.get("x-count"), Some("3"));
    }

    #[test]
    fn test_resource_type_labels() {
        assert_eq!(ResourceType::from_label("XHR"), ResourceType::Xhr);
        assert_eq!(ResourceType::from_label("WebSocket"), ResourceType::Websocket);
        assert_eq!(ResourceType::from_label("Manifest"), ResourceType::Other);
        assert!(ResourceType::Fetch.is_scripted());
        assert!(!ResourceType::Document.is_scripted());
    }

    #[test]
    fn test_identity_key() {
        let exchange = CapturedExchange::new("POST", "https://example.com/api", ResourceType::Fetch, 201);
        assert_eq!(exchange.identity_key(), "POST https://example.com/api");
    }
}
