use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Logging configuration for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to enable JSON formatted logs
    pub json_format: bool,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Whether to enable colored output (only for non-JSON format)
    pub enable_colors: bool,

    /// Log file path (optional, if None logs only to stderr)
    pub log_file: Option<String>,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("discovery_engine".to_string(), "info".to_string());
        module_levels.insert("chromiumoxide".to_string(), "warn".to_string());
        module_levels.insert("tungstenite".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            include_file_info: false,
            enable_colors: true,
            log_file: None,
            module_levels,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        let level = level.into();
        // The engine follows the requested level unless set explicitly
        self.module_levels
            .insert("discovery_engine".to_string(), level.clone());
        self.level = level;
        self
    }
}

/// Build the filter: `RUST_LOG` wins over the configured levels
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| anyhow!("Invalid log directive '{}': {}", directive, e))?,
        );
    }
    Ok(filter)
}

/// Initialize logging. The returned guard must be held for the life of the
/// process when a log file is configured.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.json_format {
        layers.push(fmt::layer().json().with_target(true).with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_file(config.include_file_info)
                .with_line_number(config.include_file_info)
                .with_ansi(config.enable_colors)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(log_file) = &config.log_file {
        let appender = create_file_appender(log_file)?;
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().json().with_writer(writer).with_ansi(false).boxed());
        guard = Some(worker_guard);
    }

    // Try to initialize logging, ignore if already initialized
    match tracing_subscriber::registry().with(layers).with(filter).try_init() {
        Ok(()) => tracing::debug!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(guard)
}

/// Daily rolling file appender for `log_file`
fn create_file_appender(log_file: &str) -> Result<tracing_appender::rolling::RollingFileAppender> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let log_path = Path::new(log_file);
    let directory = match log_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let filename = log_path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid log file name: {}", log_file))?
        .to_string_lossy();

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    Ok(RollingFileAppender::new(Rotation::DAILY, directory, filename.as_ref()))
}

/// Log level utilities
pub mod levels {
    /// Check if a log level string is valid
    pub fn is_valid_level(level: &str) -> bool {
        matches!(level.to_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_format);
        assert_eq!(config.module_levels.get("chromiumoxide").map(String::as_str), Some("warn"));
    }

    #[test]
    fn test_with_level_updates_engine() {
        let config = LoggingConfig::default().with_level("debug");
        assert_eq!(config.level, "debug");
        assert_eq!(
            config.module_levels.get("discovery_engine").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn test_level_validation() {
        assert!(levels::is_valid_level("WARN"));
        assert!(!levels::is_valid_level("verbose"));
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("agent.log");
        create_file_appender(path.to_str().unwrap()).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }
}
