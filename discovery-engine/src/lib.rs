//! Discovery Engine - Browser-Driven API Discovery
//!
//! This crate drives a real browser through a scripted interaction with a
//! target page and reports the API-like network calls it observes while
//! doing so:
//!
//! - **Form filling** with configured values, optionally submitted with Enter
//! - **Clicking** configured selectors to trigger lazy requests
//! - **Scrolling** to load infinite lists and deferred content
//!
//! ## Core Concepts
//!
//! - **ScanConfiguration**: Everything a run needs, snapshotted at start
//! - **RunSupervisor**: Starts a run and hands back a [`ScanHandle`]
//! - **ScanEvent**: Status, log, discovered API, error and finish events
//! - **ApiRecord**: One discovered call with headers, bodies and a snippet
//!
//! ## Example
//!
//! ```rust,ignore
//! use discovery_engine::{ChromiumDriver, RunSupervisor, ScanConfiguration, ScanEvent};
//! use std::sync::Arc;
//!
//! let (config, _warnings) = ScanConfiguration::builder("example.com").build()?;
//! let supervisor = RunSupervisor::new(Arc::new(ChromiumDriver::new()));
//!
//! let mut scan = supervisor.start(&config);
//! while let Some(event) = scan.next_event().await {
//!     if let ScanEvent::ApiFound { record } = &event {
//!         println!("{} {} {}", record.method, record.status, record.url);
//!     }
//!     if event.is_finished() {
//!         break;
//!     }
//! }
//! ```

pub mod discovery;
pub mod error;

// Re-exports
pub use discovery::chromium::ChromiumDriver;
pub use discovery::classifier::{classify, Classification, Reason};
pub use discovery::config::{
    InteractionPlan, ProxyScheme, ProxySettings, ScanConfiguration, ScanConfigurationBuilder,
    UserAgentPreset, WaitStrategy,
};
pub use discovery::dedup::Deduplicator;
pub use discovery::driver::{
    BrowserContext, BrowserDriver, BrowserSession, ContextOptions, LaunchOptions, Locator,
    ObservedResponse, PageHandle, ResponseStream,
};
pub use discovery::events::{EventEmitter, LogLevel, ScanEvent};
pub use discovery::export::ExportFormat;
pub use discovery::model::{CapturedExchange, Headers, ResourceType};
pub use discovery::record::{ApiRecord, RecordBuilder};
pub use discovery::scripter::{InteractionCounters, InteractionScripter};
pub use discovery::session::{DiscoverySession, SessionReport, SessionState};
pub use discovery::status_filter::StatusFilter;
pub use discovery::supervisor::{RunSupervisor, ScanHandle};
pub use error::{DiscoveryError, DiscoveryResult, DriverError, DriverResult, StatusFilterError};
