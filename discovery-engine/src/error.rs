//! Discovery Engine Error Types

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a browser driver implementation
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser context creation failed: {0}")]
    Context(String),

    #[error("Page creation failed: {0}")]
    Page(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element interaction failed on {selector}: {details}")]
    Interaction { selector: String, details: String },

    #[error("Timeout after {timeout:?} waiting for {condition}")]
    Timeout { condition: String, timeout: Duration },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Browser resource already closed")]
    Closed,
}

impl DriverError {
    /// Whether this failure is a bounded wait running out
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Result type alias for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Main error type for the discovery engine
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Browser launch error: {0}")]
    Launch(#[source] DriverError),

    #[error("Context/page error: {0}")]
    ContextSetup(#[source] DriverError),

    #[error("Network hook registration failed: {0}")]
    HookRegistration(#[source] DriverError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid status code filter: {0}")]
    StatusFilter(#[from] StatusFilterError),

    #[error("Event channel closed by consumer")]
    ChannelClosed,

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for discovery engine operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Malformed token in a status code filter expression
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusFilterError {
    #[error("Invalid range format: {0}. Use '1xx' to '5xx'.")]
    InvalidRange(String),

    #[error("Invalid range base: {0}")]
    InvalidRangeBase(String),

    #[error("Status code out of range (100-599): {0}")]
    OutOfRange(String),

    #[error("Invalid status code format: {0}")]
    InvalidToken(String),
}
