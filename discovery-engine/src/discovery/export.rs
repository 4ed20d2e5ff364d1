//! Record Export
//!
//! JSON export keeps full response bodies (base64) so records can be
//! re-imported byte for byte. CSV is a flat, human-oriented view with long
//! bodies truncated.

use crate::discovery::model::Headers;
use crate::discovery::record::{format_snippet, ApiRecord};
use crate::error::{DiscoveryError, DiscoveryResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Base64 bodies longer than this are truncated in CSV output
pub const CSV_BODY_LIMIT: usize = 1000;

const CSV_TRUNCATION_MARKER: &str = "...(truncated)";

const CSV_COLUMNS: &[&str] = &[
    "method",
    "status",
    "url",
    "content_type",
    "request_body",
    "raw_response_body_bytes",
];

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// `.csv` selects CSV, anything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Persisted shape of a record. The snippet is derived and not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ExportedRecord {
    method: String,
    url: String,
    status: u16,
    content_type: String,
    request_headers: Headers,
    request_body: Option<String>,
    response_headers: Headers,
    raw_response_body_bytes: Option<String>,
}

impl From<&ApiRecord> for ExportedRecord {
    fn from(record: &ApiRecord) -> Self {
        Self {
            method: record.method.clone(),
            url: record.url.clone(),
            status: record.status,
            content_type: record.content_type.clone(),
            request_headers: record.request_headers.clone(),
            request_body: record
                .request_body
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned()),
            response_headers: record.response_headers.clone(),
            raw_response_body_bytes: encode_body(record.response_body.as_deref()),
        }
    }
}

impl TryFrom<ExportedRecord> for ApiRecord {
    type Error = DiscoveryError;

    fn try_from(exported: ExportedRecord) -> Result<Self, Self::Error> {
        let response_body = exported
            .raw_response_body_bytes
            .map(|encoded| {
                STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    DiscoveryError::Export(format!(
                        "Invalid base64 body for {} {}: {}",
                        exported.method, exported.url, e
                    ))
                })
            })
            .transpose()?;
        let snippet = format_snippet(response_body.as_deref(), &exported.content_type);

        Ok(ApiRecord {
            method: exported.method,
            url: exported.url,
            status: exported.status,
            content_type: exported.content_type,
            request_headers: exported.request_headers,
            request_body: exported.request_body.map(String::into_bytes),
            response_headers: exported.response_headers,
            response_body,
            snippet,
        })
    }
}

/// Absent and empty bodies both export as null
fn encode_body(body: Option<&[u8]>) -> Option<String> {
    body.filter(|b| !b.is_empty()).map(|b| STANDARD.encode(b))
}

/// Pretty-printed JSON array of records
pub fn to_json(records: &[ApiRecord]) -> DiscoveryResult<String> {
    let exported: Vec<ExportedRecord> = records.iter().map(ExportedRecord::from).collect();
    Ok(serde_json::to_string_pretty(&exported)?)
}

/// Parse a JSON export, decoding bodies and rebuilding snippets
pub fn from_json(input: &str) -> DiscoveryResult<Vec<ApiRecord>> {
    let exported: Vec<ExportedRecord> = serde_json::from_str(input)?;
    exported.into_iter().map(ApiRecord::try_from).collect()
}

/// Flat CSV with every field quoted
pub fn to_csv(records: &[ApiRecord]) -> String {
    let mut csv = String::new();
    csv.push_str(
        &CSV_COLUMNS
            .iter()
            .map(|column| quote_csv(column))
            .collect::<Vec<_>>()
            .join(","),
    );
    csv.push_str("\r\n");

    for record in records {
        let request_body = record
            .request_body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .unwrap_or_default();
        let response_body = encode_body(record.response_body.as_deref())
            .map(|encoded| truncate_encoded(encoded, CSV_BODY_LIMIT))
            .unwrap_or_default();
        let status = record.status.to_string();

        let row = [
            record.method.as_str(),
            status.as_str(),
            record.url.as_str(),
            record.content_type.as_str(),
            request_body.as_str(),
            response_body.as_str(),
        ]
        .iter()
        .map(|field| quote_csv(field))
        .collect::<Vec<_>>()
        .join(",");

        csv.push_str(&row);
        csv.push_str("\r\n");
    }
    csv
}

fn truncate_encoded(encoded: String, limit: usize) -> String {
    if encoded.len() > limit {
        // base64 is ASCII, so byte slicing is safe
        format!("{}{}", &encoded[..limit], CSV_TRUNCATION_MARKER)
    } else {
        encoded
    }
}

fn quote_csv(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn write_json(path: &Path, records: &[ApiRecord]) -> DiscoveryResult<()> {
    if records.is_empty() {
        warn!("No API data provided to save.");
    }
    std::fs::write(path, to_json(records)?)?;
    info!("API details saved to {}", path.display());
    Ok(())
}

pub fn read_json(path: &Path) -> DiscoveryResult<Vec<ApiRecord>> {
    let input = std::fs::read_to_string(path)?;
    from_json(&input)
}

pub fn write_csv(path: &Path, records: &[ApiRecord]) -> DiscoveryResult<()> {
    if records.is_empty() {
        warn!("No data provided for CSV export.");
    }
    std::fs::write(path, to_csv(records))?;
    info!("Data exported as CSV to {}", path.display());
    Ok(())
}

/// Write records in the format chosen by the path's extension
pub fn write_records(path: &Path, records: &[ApiRecord]) -> DiscoveryResult<ExportFormat> {
    let format = ExportFormat::from_path(path);
    match format {
        ExportFormat::Json => write_json(path, records)?,
        ExportFormat::Csv => write_csv(path, records)?,
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::model::{CapturedExchange, ResourceType};

    fn record(body: &[u8]) -> ApiRecord {
        ApiRecord::from_exchange(
            CapturedExchange::new(
                "POST",
                "http://example.test/api/\"quoted\"",
                ResourceType::Fetch,
                200,
            )
            .with_request_body("a=1")
            .with_response_header("content-type", "application/octet-stream")
            .with_response_body(body.to_vec()),
        )
    }

    #[test]
    fn test_json_shape() {
        let json = to_json(&[record(b"\x00\x01")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let item = &value[0];
        assert_eq!(item["method"], "POST");
        assert_eq!(item["status"], 200);
        assert_eq!(item["request_body"], "a=1");
        assert_eq!(item["raw_response_body_bytes"], "AAE=");
        assert!(item.get("snippet").is_none());
        assert!(item.get("response_snippet").is_none());
    }

    #[test]
    fn test_empty_body_exports_null() {
        let json = to_json(&[record(b"")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value[0]["raw_response_body_bytes"].is_null());
    }

    #[test]
    fn test_import_rejects_bad_base64() {
        let input = r#"[{"method":"GET","url":"http://example.test/","status":200,
            "content_type":"","request_headers":{},"request_body":null,
            "response_headers":{},"raw_response_body_bytes":"%%%"}]"#;
        assert!(matches!(from_json(input), Err(DiscoveryError::Export(_))));
    }

    #[test]
    fn test_csv_quoting_and_truncation() {
        let csv = to_csv(&[record(&[7u8; 2000])]);
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next().unwrap(),
            "\"method\",\"status\",\"url\",\"content_type\",\"request_body\",\"raw_response_body_bytes\""
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"POST\",\"200\",\"http://example.test/api/\"\"quoted\"\"\","));
        assert!(row.ends_with("...(truncated)\""));

        let body_field = row.rsplit(",\"").next().unwrap();
        assert_eq!(body_field.len(), CSV_BODY_LIMIT + CSV_TRUNCATION_MARKER.len() + 1);
    }

    #[test]
    fn test_csv_short_body_kept() {
        let csv = to_csv(&[record(b"abc")]);
        assert!(csv.contains("\"YWJj\"\r\n"));
        assert!(!csv.contains("truncated"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out.CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Json);
    }
}
