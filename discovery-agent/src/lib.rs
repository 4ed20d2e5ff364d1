//! Discovery Agent
//!
//! Command line runner: builds a scan configuration from flags (optionally on
//! top of a JSON config file), runs one discovery scan, prints what it finds
//! and exports the collected records.

pub mod logging;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use discovery_engine::discovery::config::{resolve_user_agent, split_selectors};
use discovery_engine::discovery::export::write_records;
use discovery_engine::{
    ApiRecord, BrowserDriver, ChromiumDriver, ExportFormat, ProxyScheme, ResourceType,
    RunSupervisor, ScanConfiguration, ScanConfigurationBuilder, ScanEvent, UserAgentPreset,
    WaitStrategy,
};
use logging::LoggingConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target URL; `https://` is added when no scheme is given
    pub url: Option<String>,

    /// JSON scan configuration to start from; flags override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// User agent preset (chrome-windows, firefox-windows, safari-mac, safari-iphone, chrome-android)
    #[arg(long)]
    pub user_agent_preset: Option<String>,

    /// Custom user agent string, overrides the preset
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Proxy as host:port or scheme://host:port
    #[arg(long)]
    pub proxy: Option<String>,

    /// Scheme used when the proxy has none (http, https, socks5)
    #[arg(long, default_value = "http")]
    pub proxy_scheme: String,

    /// Navigation wait strategy (load, dom-ready, network-idle)
    #[arg(long)]
    pub wait: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(long)]
    pub navigation_timeout_ms: Option<u64>,

    /// Element action timeout in milliseconds
    #[arg(long)]
    pub action_timeout_ms: Option<u64>,

    /// Number of scroll-to-bottom steps
    #[arg(long)]
    pub scrolls: Option<u32>,

    /// Seconds to wait after each scroll
    #[arg(long)]
    pub scroll_delay: Option<f64>,

    /// Comma-separated CSS selectors to click
    #[arg(long)]
    pub click: Option<String>,

    /// Hover over elements before clicking
    #[arg(long)]
    pub hover: bool,

    /// CSS selector of the input to fill
    #[arg(long)]
    pub form_selector: Option<String>,

    /// Value to fill into the form input (repeatable)
    #[arg(long = "form-value")]
    pub form_values: Vec<String>,

    /// Do not press Enter after filling
    #[arg(long)]
    pub no_submit: bool,

    /// Seconds to wait between form rounds
    #[arg(long)]
    pub form_delay: Option<f64>,

    /// Seconds to wait after the initial load and after each phase
    #[arg(long)]
    pub settle: Option<f64>,

    /// Resource type to check (repeatable; `all` for every type)
    #[arg(long = "resource-type")]
    pub resource_types: Vec<String>,

    /// Status filter, e.g. `200,404` or `2xx,3xx`
    #[arg(long)]
    pub status: Option<String>,

    /// URL substring to ignore (repeatable)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,

    /// Do not merge the built-in ignore list
    #[arg(long)]
    pub no_default_ignores: bool,

    /// Export path; a `.csv` extension selects CSV
    #[arg(long, short = 'o', default_value = "viper_discovered_apis.json")]
    pub output: PathBuf,

    /// Only export records matching this term
    #[arg(long)]
    pub filter: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Also write JSON logs to this file (rotated daily)
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Args {
    pub fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default().with_level(self.log_level.clone());
        config.json_format = self.json_logs;
        config.log_file = self.log_file.clone();
        config
    }
}

fn parse_flag<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(|e| anyhow!(e))
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("--{} must be a non-negative number of seconds", flag));
    }
    Ok(Duration::from_secs_f64(value))
}

/// Build the scan configuration from flags. Returns it with the soft
/// warnings produced while validating.
pub fn build_configuration(args: &Args) -> Result<(ScanConfiguration, Vec<String>)> {
    let mut builder = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: ScanConfiguration = serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            ScanConfigurationBuilder::from_configuration(config)
        }
        None => {
            let url = args
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("A target URL is required"))?;
            ScanConfiguration::builder(url).default_ignores(!args.no_default_ignores)
        }
    };

    if let (Some(_), Some(url)) = (&args.config, &args.url) {
        builder = builder.target_url(url.clone());
    }

    if args.user_agent_preset.is_some() || args.user_agent.is_some() {
        let preset = args
            .user_agent_preset
            .as_deref()
            .map(parse_flag::<UserAgentPreset>)
            .transpose()?;
        builder = builder.user_agent(resolve_user_agent(preset, args.user_agent.as_deref()));
    }

    if let Some(proxy) = &args.proxy {
        let scheme = parse_flag::<ProxyScheme>(&args.proxy_scheme)?;
        builder = builder.proxy_input(proxy, scheme);
    }
    if let Some(wait) = &args.wait {
        builder = builder.wait_strategy(parse_flag::<WaitStrategy>(wait)?);
    }
    if let Some(ms) = args.navigation_timeout_ms {
        builder = builder.navigation_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.action_timeout_ms {
        builder = builder.action_timeout(Duration::from_millis(ms));
    }

    let mut plan = builder.interaction_plan().clone();
    if let Some(scrolls) = args.scrolls {
        plan.scroll_count = scrolls;
    }
    if let Some(delay) = args.scroll_delay {
        plan.scroll_delay = seconds(delay, "scroll-delay")?;
    }
    if let Some(click) = &args.click {
        plan.click_selectors = split_selectors(click);
    }
    if args.hover {
        plan.hover_before_click = true;
    }
    if let Some(selector) = &args.form_selector {
        plan.form_selector = Some(selector.trim().to_string());
    }
    if !args.form_values.is_empty() {
        plan.form_values = args
            .form_values
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
    }
    if args.no_submit {
        plan.submit_after_fill = false;
    }
    if let Some(delay) = args.form_delay {
        plan.form_delay = seconds(delay, "form-delay")?;
    }
    if let Some(settle) = args.settle {
        plan.settle_time = seconds(settle, "settle")?;
    }
    builder = builder.interaction(plan);

    if !args.resource_types.is_empty() {
        let types = if args.resource_types.iter().any(|t| t.eq_ignore_ascii_case("all")) {
            ResourceType::ALL.to_vec()
        } else {
            args.resource_types
                .iter()
                .map(|t| parse_flag::<ResourceType>(t))
                .collect::<Result<Vec<_>>>()?
        };
        builder = builder.resource_types(types);
    }
    if let Some(status) = &args.status {
        builder = builder.status_filter_input(status);
    }
    if !args.ignore.is_empty() {
        builder = builder.ignore_patterns(args.ignore.iter().cloned());
    }

    Ok(builder.build()?)
}

/// Outcome of one agent run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub apis_found: usize,
    pub exported: usize,
    pub cancelled: bool,
    pub failed: bool,
    pub output: PathBuf,
    pub format: String,
}

impl RunSummary {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Run a scan with the Chromium driver
pub async fn run_agent(args: Args, cancel: CancellationToken) -> Result<RunSummary> {
    run_agent_with_driver(args, Arc::new(ChromiumDriver::new()), cancel).await
}

/// Run a scan with the given driver until its `Finished` event, then export
pub async fn run_agent_with_driver(
    args: Args,
    driver: Arc<dyn BrowserDriver>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let (config, warnings) = build_configuration(&args)?;
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    tracing::info!("Starting API discovery...");
    tracing::info!("  Target: {}", config.target_url);
    tracing::info!("  Wait:   {}", config.wait_strategy);
    tracing::info!("  Output: {}", args.output.display());

    let started_at = Utc::now();
    let supervisor = RunSupervisor::new(driver).headless(!args.headed);
    let mut scan = supervisor.start_with_token(&config, cancel);
    let run_id = scan.run_id();

    let mut records: Vec<ApiRecord> = Vec::new();
    let mut failed = false;
    let mut cancelled = false;

    while let Some(event) = scan.next_event().await {
        match event {
            ScanEvent::Status { message, in_progress } => {
                if in_progress {
                    tracing::info!("{}", message);
                } else {
                    tracing::debug!("{}", message);
                }
            }
            // Engine log lines are already mirrored to tracing by the emitter
            ScanEvent::Log { .. } => {}
            ScanEvent::ApiFound { record } => {
                println!("{} {} {}", record.method, record.status, record.url);
                records.push(record);
            }
            ScanEvent::Error { message } => {
                tracing::error!("{}", message);
                failed = true;
            }
            ScanEvent::Finished { message, cancelled: was_cancelled } => {
                tracing::info!("{}", message);
                cancelled = was_cancelled;
                break;
            }
        }
    }

    let selected: Vec<ApiRecord> = match args.filter.as_deref() {
        Some(term) => records.iter().filter(|r| r.matches(term)).cloned().collect(),
        None => records.clone(),
    };
    let format = write_records(&args.output, &selected)
        .with_context(|| format!("Failed to export to {}", args.output.display()))?;

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        apis_found: records.len(),
        exported: selected.len(),
        cancelled,
        failed,
        output: args.output.clone(),
        format: match format {
            ExportFormat::Json => "json".to_string(),
            ExportFormat::Csv => "csv".to_string(),
        },
    };
    report(&summary, args.json_logs);
    Ok(summary)
}

fn report(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize summary: {}", e),
        }
        return;
    }

    let duration = summary.duration();
    println!();
    println!("Run:       {}", summary.run_id);
    println!("APIs:      {} found, {} exported", summary.apis_found, summary.exported);
    println!(
        "Duration:  {}.{:03}s",
        duration.num_seconds(),
        duration.num_milliseconds().rem_euclid(1000)
    );
    println!("Cancelled: {}", summary.cancelled);
    println!("Output:    {} ({})", summary.output.display(), summary.format);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["discovery-agent", "example.com"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let (config, warnings) = build_configuration(&args(&[])).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.target_url, "https://example.com/");
        assert_eq!(config.wait_strategy, WaitStrategy::NetworkIdle);
        assert_eq!(config.interaction.scroll_count, 3);
        assert!(config.ignore_patterns.iter().any(|p| p == "doubleclick.net"));
    }

    #[test]
    fn test_interaction_flags() {
        let (config, _) = build_configuration(&args(&[
            "--scrolls", "0",
            "--click", "button.more, a.next",
            "--form-selector", "#q",
            "--form-value", "shoes",
            "--form-value", "hats",
            "--no-submit",
            "--settle", "0.5",
        ]))
        .unwrap();
        let plan = &config.interaction;
        assert_eq!(plan.scroll_count, 0);
        assert_eq!(plan.click_selectors, vec!["button.more", "a.next"]);
        assert_eq!(plan.form_selector.as_deref(), Some("#q"));
        assert_eq!(plan.form_values, vec!["shoes", "hats"]);
        assert!(!plan.submit_after_fill);
        assert_eq!(plan.settle_time, Duration::from_millis(500));
    }

    #[test]
    fn test_soft_warnings() {
        let (config, warnings) =
            build_configuration(&args(&["--proxy", "localhost", "--status", "7xx"])).unwrap();
        assert!(config.proxy.is_none());
        assert!(config.status_filter.is_default());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_hard_errors() {
        assert!(build_configuration(&args(&["--wait", "forever"])).is_err());
        assert!(build_configuration(&args(&["--resource-type", "pdf"])).is_err());
        assert!(build_configuration(&args(&["--navigation-timeout-ms", "0"])).is_err());
        assert!(build_configuration(&args(&["--settle=-1"])).is_err());
        let no_url = Args::try_parse_from(["discovery-agent"]).unwrap();
        assert!(build_configuration(&no_url).is_err());
    }

    #[test]
    fn test_all_resource_types() {
        let (config, _) = build_configuration(&args(&["--resource-type", "all"])).unwrap();
        assert_eq!(config.resource_types.len(), ResourceType::ALL.len());
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let (base, _) = ScanConfiguration::builder("http://saved.test/").build().unwrap();
        std::fs::write(&path, serde_json::to_string(&base).unwrap()).unwrap();

        let parsed = Args::try_parse_from([
            "discovery-agent",
            "--config",
            path.to_str().unwrap(),
            "--scrolls",
            "7",
        ])
        .unwrap();
        let (config, _) = build_configuration(&parsed).unwrap();
        assert_eq!(config.target_url, "http://saved.test/");
        assert_eq!(config.interaction.scroll_count, 7);
        assert_eq!(config.ignore_patterns, base.ignore_patterns);
    }
}
