//! API Records
//!
//! Normalizes observed exchanges into [`ApiRecord`]s: headers, bodies,
//! content type and a short preview snippet.

use crate::discovery::driver::ObservedResponse;
use crate::discovery::model::{identity_key, CapturedExchange, Headers};
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum snippet length in characters
pub const SNIPPET_LIMIT: usize = 300;

/// Header name fragments worth highlighting (credentials, sessions)
pub const INTERESTING_HEADERS: &[&str] = &[
    "authorization",
    "set-cookie",
    "cookie",
    "x-csrf-token",
    "x-api-key",
    "x-auth-token",
    "bearer",
    "jwt",
    "api-key",
    "apikey",
];

/// Request headers left out of generated cURL commands
const CURL_SKIPPED_HEADERS: &[&str] = &[
    "content-length",
    "host",
    "connection",
    "transfer-encoding",
    "accept-encoding",
];

/// One discovered API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub request_headers: Headers,
    #[serde(with = "optional_base64")]
    pub request_body: Option<Vec<u8>>,
    pub response_headers: Headers,
    #[serde(with = "optional_base64")]
    pub response_body: Option<Vec<u8>>,
    /// Preview derived from the response body
    pub snippet: String,
}

impl ApiRecord {
    /// Build a record from a fully captured exchange
    pub fn from_exchange(exchange: CapturedExchange) -> Self {
        let content_type = exchange.content_type().to_string();
        let snippet = format_snippet(exchange.response_body.as_deref(), &content_type);
        Self {
            method: exchange.method,
            url: exchange.url,
            status: exchange.status.unwrap_or(0),
            content_type,
            request_headers: exchange.request_headers,
            request_body: exchange.request_body,
            response_headers: exchange.response_headers,
            response_body: exchange.response_body,
            snippet,
        }
    }

    /// Deduplication key: `METHOD URL`
    pub fn identity_key(&self) -> String {
        identity_key(&self.method, &self.url)
    }

    /// Case-insensitive substring match over method, status, URL and
    /// content type. An empty term matches everything.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.method.to_lowercase().contains(&term)
            || self.status.to_string().contains(&term)
            || self.url.to_lowercase().contains(&term)
            || self.content_type.to_lowercase().contains(&term)
    }

    /// Request and response headers carrying credentials or session state
    pub fn interesting_headers(&self) -> Vec<(&str, &str)> {
        self.request_headers
            .iter()
            .chain(self.response_headers.iter())
            .filter(|(name, _)| is_interesting_header(name))
            .collect()
    }

    /// Reproduce the request as a shell-safe cURL command
    pub fn to_curl(&self) -> String {
        let method = self.method.to_ascii_uppercase();
        let mut cmd = format!("curl {}", shell_quote(&self.url));

        if method != "GET" {
            cmd.push_str(&format!(" -X {}", method));
        }

        for (name, value) in self.request_headers.iter() {
            // HTTP/2 pseudo headers (`:authority`, ...) are not real headers
            if name.starts_with(':') || CURL_SKIPPED_HEADERS.contains(&name) {
                continue;
            }
            cmd.push_str(&format!(" -H {}", shell_quote(&format!("{}: {}", name, value))));
        }

        let has_content_type = self.request_headers.contains("content-type");
        if let Some(body) = self.request_body.as_deref().filter(|b| !b.is_empty()) {
            match std::str::from_utf8(body) {
                Ok(text) => {
                    cmd.push_str(&format!(" --data-raw {}", shell_quote(text)));
                    let trimmed = text.trim_start();
                    if !has_content_type && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
                        cmd.push_str(" -H 'Content-Type: application/json'");
                    }
                }
                Err(_) => {
                    debug!("Request body for {} is binary; cURL needs a body file", self.url);
                    cmd.push_str(" --data-binary @'<request_body.bin>'");
                    if !has_content_type {
                        cmd.push_str(" -H 'Content-Type: application/octet-stream'");
                    }
                }
            }
        }

        if self.request_headers.contains("accept-encoding") {
            cmd.push_str(" --compressed");
        }
        cmd
    }
}

/// Whether a header name looks like it carries credentials
pub fn is_interesting_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    INTERESTING_HEADERS.iter().any(|fragment| name.contains(fragment))
}

/// Single-quote a string for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Whether a content type should be decoded as text for the snippet
fn is_text_content(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || ["json", "xml", "javascript", "html"]
            .iter()
            .any(|marker| content_type.contains(marker))
}

/// Build the preview snippet for a response body.
///
/// Text bodies are decoded leniently, JSON is pretty-printed, and the result
/// is cut to [`SNIPPET_LIMIT`] characters. Binary bodies get a placeholder.
pub fn format_snippet(body: Option<&[u8]>, content_type: &str) -> String {
    let body = match body {
        None => return "[No Response Body Captured]".to_string(),
        Some([]) => return "[Empty Response Body]".to_string(),
        Some(body) => body,
    };

    let content_type = content_type.to_lowercase();
    if !is_text_content(&content_type) {
        let size_kb = body.len() as f64 / 1024.0;
        let label = if content_type.is_empty() { "Unknown Type" } else { content_type.as_str() };
        return format!("[Binary Data ({}), Size: {:.2} KB]", label, size_kb);
    }

    let text = String::from_utf8_lossy(body);
    let snippet = if content_type.contains("json") {
        serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| text.into_owned())
    } else {
        text.into_owned()
    };

    truncate_chars(&snippet, SNIPPET_LIMIT)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Turns observed responses into records, fetching headers and bodies on
/// demand. Retrieval failures degrade the affected field instead of
/// dropping the record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder;

impl RecordBuilder {
    pub fn new() -> Self {
        Self
    }

    pub async fn build(&self, response: &dyn ObservedResponse) -> ApiRecord {
        let mut exchange = response.head().clone();

        match response.request_headers().await {
            Ok(headers) if !headers.is_empty() => exchange.request_headers = headers,
            Ok(_) => {}
            Err(e) => debug!(url = %exchange.url, "Could not get request headers: {}", e),
        }

        match response.request_body().await {
            Ok(body) => exchange.request_body = body,
            Err(e) => {
                debug!(url = %exchange.url, "Could not get request body: {}", e);
                exchange.request_body = None;
            }
        }

        match response.response_headers().await {
            Ok(headers) if !headers.is_empty() => exchange.response_headers = headers,
            Ok(_) => {}
            Err(e) => debug!(url = %exchange.url, "Could not get response headers: {}", e),
        }

        match response.response_body().await {
            Ok(body) => exchange.response_body = body,
            Err(e) => {
                debug!(url = %exchange.url, "Could not get response body: {}", e);
                exchange.response_body = None;
            }
        }

        ApiRecord::from_exchange(exchange)
    }
}

/// Base64 encoding for optional byte buffers
pub(crate) mod optional_base64 {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::model::ResourceType;
    use crate::error::{DriverError, DriverResult};
    use async_trait::async_trait;

    #[test]
    fn test_json_snippet_pretty_printed() {
        let snippet = format_snippet(Some(br#"{"a":1}"#), "application/json");
        assert_eq!(snippet, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_json_snippet_keeps_key_order() {
        let snippet = format_snippet(Some(br#"{"z":1,"a":2}"#), "application/json");
        assert_eq!(snippet, "{\n  \"z\": 1,\n  \"a\": 2\n}");
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let snippet = format_snippet(Some(b"{not json"), "application/json");
        assert_eq!(snippet, "{not json");
    }

    #[test]
    fn test_snippet_placeholders() {
        assert_eq!(format_snippet(None, "application/json"), "[No Response Body Captured]");
        assert_eq!(format_snippet(Some(b""), "text/plain"), "[Empty Response Body]");
        assert_eq!(
            format_snippet(Some(&[0u8; 2048]), "image/png"),
            "[Binary Data (image/png), Size: 2.00 KB]"
        );
        assert_eq!(
            format_snippet(Some(&[1, 2, 3]), ""),
            "[Binary Data (Unknown Type), Size: 0.00 KB]"
        );
    }

    #[test]
    fn test_snippet_truncation() {
        let body = "é".repeat(SNIPPET_LIMIT + 10);
        let snippet = format_snippet(Some(body.as_bytes()), "text/plain");
        assert_eq!(snippet.chars().count(), SNIPPET_LIMIT + 3);
        assert!(snippet.ends_with("..."));

        let exact = "x".repeat(SNIPPET_LIMIT);
        assert_eq!(format_snippet(Some(exact.as_bytes()), "text/html"), exact);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let snippet = format_snippet(Some(&[b'o', b'k', 0xff]), "text/plain");
        assert_eq!(snippet, "ok\u{fffd}");
    }

    fn record() -> ApiRecord {
        ApiRecord::from_exchange(
            CapturedExchange::new("POST", "https://api.example.test/v1/it's", ResourceType::Fetch, 201)
                .with_request_header("Authorization", "Bearer abc")
                .with_request_header("Accept-Encoding", "gzip")
                .with_request_header("Content-Length", "7")
                .with_request_header(":authority", "api.example.test")
                .with_request_body(r#"{"q":1}"#)
                .with_response_header("Content-Type", "application/json")
                .with_response_header("Set-Cookie", "sid=1")
                .with_response_body(r#"{"ok":true}"#),
        )
    }

    #[test]
    fn test_to_curl() {
        let curl = record().to_curl();
        assert_eq!(
            curl,
            "curl 'https://api.example.test/v1/it'\\''s' -X POST \
             -H 'authorization: Bearer abc' \
             --data-raw '{\"q\":1}' -H 'Content-Type: application/json' --compressed"
        );
    }

    #[test]
    fn test_to_curl_binary_body() {
        let mut record = record();
        record.request_body = Some(vec![0xff, 0xfe]);
        record.request_headers = Headers::new();
        let curl = record.to_curl();
        assert!(curl.ends_with("--data-binary @'<request_body.bin>' -H 'Content-Type: application/octet-stream'"));
        assert!(!curl.contains("--compressed"));
    }

    #[test]
    fn test_matches_and_interesting_headers() {
        let record = record();
        assert!(record.matches(""));
        assert!(record.matches("post"));
        assert!(record.matches("201"));
        assert!(record.matches("API.EXAMPLE"));
        assert!(record.matches("json"));
        assert!(!record.matches("delete"));

        let names: Vec<&str> = record.interesting_headers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["authorization", "set-cookie"]);
    }

    struct FlakyResponse {
        head: CapturedExchange,
    }

    #[async_trait]
    impl ObservedResponse for FlakyResponse {
        fn head(&self) -> &CapturedExchange {
            &self.head
        }

        async fn request_headers(&self) -> DriverResult<Headers> {
            Err(DriverError::Capture("target closed".to_string()))
        }

        async fn request_body(&self) -> DriverResult<Option<Vec<u8>>> {
            Err(DriverError::Capture("target closed".to_string()))
        }

        async fn response_headers(&self) -> DriverResult<Headers> {
            Ok(Headers::new())
        }

        async fn response_body(&self) -> DriverResult<Option<Vec<u8>>> {
            Err(DriverError::Capture("No resource with given identifier".to_string()))
        }
    }

    #[tokio::test]
    async fn test_builder_degrades_failed_retrieval() {
        let response = FlakyResponse {
            head: CapturedExchange::new("GET", "http://example.test/api", ResourceType::Xhr, 200)
                .with_request_header("accept", "*/*")
                .with_response_header("content-type", "application/json"),
        };

        let record = RecordBuilder::new().build(&response).await;
        assert_eq!(record.status, 200);
        assert_eq!(record.content_type, "application/json");
        assert_eq!(record.request_headers.get("accept"), Some("*/*"));
        assert!(record.request_body.is_none());
        assert!(record.response_body.is_none());
        assert_eq!(record.snippet, "[No Response Body Captured]");
    }

    #[test]
    fn test_record_serde_uses_base64() {
        let mut record = record();
        record.response_body = Some(vec![0, 159, 146, 150]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["response_body"], "AJ+Slg==");
        let restored: ApiRecord = serde_json::from_value(value).unwrap();
        assert_eq!(restored, record);
    }
}
