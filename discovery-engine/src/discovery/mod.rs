//! Discovery module - browser-driven API discovery

pub mod model;
pub mod status_filter;
pub mod config;
pub mod classifier;
pub mod record;
pub mod dedup;
pub mod events;
pub mod driver;
pub mod chromium;
pub mod scripter;
pub mod session;
pub mod supervisor;
pub mod export;
