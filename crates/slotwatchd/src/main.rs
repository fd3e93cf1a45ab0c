// # slotwatchd - Pickup Slot Monitor Daemon
//
// Thin integration layer: everything that decides when to poll, what to
// alert and what to persist lives in slotwatch-core. This binary only:
//
// 1. Reads configuration from environment variables
// 2. Builds the client, sink, scheduler and state store
// 3. Optionally searches for stores and selects locations at startup
// 4. Runs the engine and bridges stdin control messages into it
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### State Store
// - `SLOTWATCH_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `SLOTWATCH_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Availability API
// - `SLOTWATCH_BASE_URL`: API base URL (defaults to production)
// - `SLOTWATCH_COOKIE`: Cookie header sent with every request
// - `SLOTWATCH_QUERY_TIMEOUT_SECS`: Upper bound on one slot query
//
// ### Watch-list Bootstrap
// - `SLOTWATCH_ADDRESS`: Search for stores near this address at startup
// - `SLOTWATCH_SELECT`: `all`, or comma-separated location ids to select
// - `SLOTWATCH_INTERVAL`: Polling interval in minutes (`0` disables)
//
// ### Notifications
// - `SLOTWATCH_WEBHOOK_URL`: Chat webhook receiving alerts
// - `SLOTWATCH_WEBHOOK_MENTION`: User id mentioned in every alert
//
// ## Control Input
//
// Each stdin line is one JSON control message; the reply is printed to
// stdout as one JSON line:
//
// ```text
// {"message":"updateMonitor","payload":{"interval":3}}
// {"reply":"ack"}
// ```
//
// ## Example
//
// ```bash
// export SLOTWATCH_STATE_STORE_PATH=/var/lib/slotwatch/state.json
// export SLOTWATCH_ADDRESS="78701"
// export SLOTWATCH_SELECT=all
// export SLOTWATCH_INTERVAL=5
//
// slotwatchd
// ```

use anyhow::{Context, Result};
use slotwatch_core::config_store::ConfigStore;
use slotwatch_core::traits::{AvailabilityClient, NotificationSink, Scheduler, StateStore};
use slotwatch_core::{
    ControlMessage, ControlReply, ControlSender, EngineConfig, EngineEvent, FileStateStore,
    MemoryNotificationSink, MemoryStateStore, MonitorConfig, MonitorEngine, TokioScheduler,
};
use slotwatch_heb::{HebClient, HebClientConfig};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Time allowed for in-flight passes to finish after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SlotwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SlotwatchExitCode> for ExitCode {
    fn from(code: SlotwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Which watch-list entries to select at startup
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    /// Leave the persisted selection alone
    Keep,
    /// Select every entry
    All,
    /// Select the listed location ids
    Ids(Vec<String>),
}

impl Selection {
    fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Keep;
        };
        if raw.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        Self::Ids(
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

/// Application configuration
struct Config {
    state_store_type: String,
    state_store_path: Option<String>,
    base_url: Option<String>,
    cookie: Option<String>,
    query_timeout_secs: Option<u64>,
    address: Option<String>,
    selection: Selection,
    interval: Option<i64>,
    webhook_url: Option<String>,
    webhook_mention: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    ///
    /// Empty values count as unset.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            state_store_type: var("SLOTWATCH_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            state_store_path: var("SLOTWATCH_STATE_STORE_PATH"),
            base_url: var("SLOTWATCH_BASE_URL"),
            cookie: var("SLOTWATCH_COOKIE"),
            query_timeout_secs: parse_var(&var, "SLOTWATCH_QUERY_TIMEOUT_SECS")?,
            address: var("SLOTWATCH_ADDRESS").map(|a| a.trim().to_string()),
            selection: Selection::parse(var("SLOTWATCH_SELECT").as_deref()),
            interval: parse_var(&var, "SLOTWATCH_INTERVAL")?,
            webhook_url: var("SLOTWATCH_WEBHOOK_URL"),
            webhook_mention: parse_var(&var, "SLOTWATCH_WEBHOOK_MENTION")?,
            log_level: var("SLOTWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "SLOTWATCH_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if self.state_store_type == "file" {
            let Some(path) = &self.state_store_path else {
                anyhow::bail!(
                    "SLOTWATCH_STATE_STORE_PATH is required when SLOTWATCH_STATE_STORE_TYPE=file. \
                    Set it via: export SLOTWATCH_STATE_STORE_PATH=/var/lib/slotwatch/state.json"
                );
            };

            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    anyhow::bail!(
                        "SLOTWATCH_STATE_STORE_PATH parent directory does not exist: {}. \
                        Create it first: mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
        }

        if let Some(url) = &self.base_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("SLOTWATCH_BASE_URL must use HTTP or HTTPS scheme. Got: {}", url);
            }
        }

        if let Some(timeout) = self.query_timeout_secs {
            if !(1..=300).contains(&timeout) {
                anyhow::bail!(
                    "SLOTWATCH_QUERY_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                    timeout
                );
            }
        }

        if let Some(interval) = self.interval {
            if interval > 1440 {
                anyhow::bail!(
                    "SLOTWATCH_INTERVAL must be at most 1440 minutes. Got: {}",
                    interval
                );
            }
        }

        if let Selection::Ids(ids) = &self.selection {
            if ids.is_empty() {
                anyhow::bail!("SLOTWATCH_SELECT must be 'all' or a list of location ids");
            }
        }

        if let Some(url) = &self.webhook_url {
            // Never echo the URL; it carries the webhook secret
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("SLOTWATCH_WEBHOOK_URL must use HTTP or HTTPS scheme");
            }
            if cfg!(not(feature = "webhook")) {
                anyhow::bail!(
                    "SLOTWATCH_WEBHOOK_URL is set but slotwatchd was built without the webhook feature"
                );
            }
        }

        if self.webhook_mention.is_some() && self.webhook_url.is_none() {
            anyhow::bail!("SLOTWATCH_WEBHOOK_MENTION requires SLOTWATCH_WEBHOOK_URL");
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }

    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(timeout) = self.query_timeout_secs {
            config.query_timeout_secs = timeout;
        }
        config
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} is not a valid number ({}): {}", key, e, raw))
        })
        .transpose()
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "SLOTWATCH_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SlotwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SlotwatchExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    // Logs go to stderr; stdout carries control replies
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SlotwatchExitCode::ConfigError.into();
    }

    info!("Starting slotwatchd");

    // One engine, a handful of tasks: a single-threaded runtime is plenty
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SlotwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let engine = match build_engine(&config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return SlotwatchExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(engine).await {
            error!("Daemon error: {:#}", e);
            SlotwatchExitCode::RuntimeError
        } else {
            SlotwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Engine plus the pieces the daemon keeps driving
struct Daemon {
    engine: MonitorEngine,
    events: mpsc::Receiver<EngineEvent>,
}

/// Build every component and apply the startup bootstrap
async fn build_engine(config: &Config) -> Result<Daemon> {
    let state_store: Arc<dyn StateStore> = match config.state_store_type.as_str() {
        "memory" => {
            warn!("Using in-memory state; the watch-list is lost on exit");
            Arc::new(MemoryStateStore::new())
        }
        _ => {
            let path = config
                .state_store_path
                .as_deref()
                .context("SLOTWATCH_STATE_STORE_PATH is required for the file store")?;
            Arc::new(
                FileStateStore::new(path)
                    .await
                    .with_context(|| format!("Failed to open state file {}", path))?,
            )
        }
    };

    let mut client_config = HebClientConfig {
        cookie: config.cookie.clone(),
        ..HebClientConfig::default()
    };
    if let Some(base_url) = &config.base_url {
        client_config.base_url = base_url.clone();
    }
    let client = Arc::new(HebClient::new(client_config).context("Failed to build API client")?);

    let sink = build_sink(config)?;
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());

    let (engine, events) = MonitorEngine::new(
        Arc::clone(&client) as Arc<dyn AvailabilityClient>,
        sink,
        scheduler,
        state_store,
        config.engine_config(),
    )
    .context("Failed to create engine")?;

    if let Some(address) = &config.address {
        match engine.search_stores(client.as_ref(), address).await {
            Ok(stores) => info!("Found {} store(s) near {}", stores.len(), address),
            // Keep polling the persisted watch-list
            Err(e) => warn!("Store search failed, keeping previous watch-list: {}", e),
        }
    }

    apply_selection(engine.config_store(), &config.selection).await;

    if let Some(interval) = config.interval {
        // Armed by the engine's restore on start
        engine
            .config_store()
            .set_monitor_config(&MonitorConfig::from_interval(interval))
            .await;
    }

    let selected = engine.config_store().selected_watch_list().await;
    for entry in &selected {
        info!(
            "Watching {} ({})",
            entry.location_id, entry.display_info.name
        );
    }
    if selected.is_empty() {
        warn!("No locations selected; set SLOTWATCH_SELECT or send setSelected");
    }

    Ok(Daemon { engine, events })
}

#[cfg(feature = "webhook")]
fn build_sink(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    use slotwatch_notify_webhook::{WebhookConfig, WebhookNotificationSink};

    match &config.webhook_url {
        Some(url) => {
            let mut webhook = WebhookConfig::new(url.clone());
            webhook.mention_id = config.webhook_mention;
            info!("Alerts go to the configured webhook");
            Ok(Arc::new(
                WebhookNotificationSink::new(webhook).context("Failed to build webhook sink")?,
            ))
        }
        None => Ok(log_only_sink()),
    }
}

#[cfg(not(feature = "webhook"))]
fn build_sink(_config: &Config) -> Result<Arc<dyn NotificationSink>> {
    Ok(log_only_sink())
}

fn log_only_sink() -> Arc<dyn NotificationSink> {
    warn!("No webhook configured; alerts are only logged");
    Arc::new(MemoryNotificationSink::new())
}

async fn apply_selection(store: &ConfigStore, selection: &Selection) {
    match selection {
        Selection::Keep => {}
        Selection::All => {
            let list: Vec<_> = store
                .watch_list()
                .await
                .into_iter()
                .map(|entry| entry.with_selected(true))
                .collect();
            store.replace_watch_list(&list).await;
        }
        Selection::Ids(ids) => {
            for id in ids {
                if !store.set_selected(id, true).await {
                    warn!("Location {} is not on the watch-list", id);
                }
            }
        }
    }
}

/// Run the engine until a shutdown signal
async fn run_daemon(daemon: Daemon) -> Result<()> {
    let Daemon { engine, events } = daemon;

    let mut signals = ShutdownSignals::install()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let event_logger = tokio::spawn(log_events(events));
    let bridge = tokio::spawn(bridge_control(engine.control()));

    info!("Daemon initialized successfully");

    let run = engine.run_with_shutdown(Some(shutdown_rx));
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result.context("Engine stopped unexpectedly"),
        signal = signals.recv() => {
            info!("Received shutdown signal: {}", signal);
            let _ = shutdown_tx.send(());

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut run).await {
                Ok(result) => result.context("Engine shutdown failed"),
                Err(_) => Err(anyhow::anyhow!(
                    "Shutdown timeout after {:?}",
                    SHUTDOWN_TIMEOUT
                )),
            }
        }
    };

    bridge.abort();
    event_logger.abort();
    info!("Daemon stopped");

    result
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}

/// Forward stdin control lines to the engine and print each reply
async fn bridge_control(control: ControlSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(reply) = handle_control_line(&control, &line).await {
                    println!("{}", reply);
                }
            }
            Ok(None) => {
                debug!("Control input closed");
                break;
            }
            Err(e) => {
                warn!("Failed to read control input: {}", e);
                break;
            }
        }
    }
}

/// Apply one control line and render the reply as JSON
///
/// Blank lines produce no reply.
async fn handle_control_line(control: &ControlSender, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let reply = match ControlMessage::from_json(line) {
        Ok(message) => control
            .request(message)
            .await
            .unwrap_or_else(|e| ControlReply::Rejected {
                error: e.to_string(),
            }),
        Err(e) => ControlReply::Rejected {
            error: format!("Invalid control message: {}", e),
        },
    };

    match serde_json::to_string(&reply) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to encode control reply: {}", e);
            None
        }
    }
}

/// Shutdown signal listeners, installed before the engine starts
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            sigint: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
        })
    }

    /// Name of the first signal received
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms (SIGINT only)
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwatch_core::control;
    use slotwatch_core::{DisplayInfo, WatchEntry};
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn memory_config(vars: &[(&str, &str)]) -> Config {
        let mut all = vec![("SLOTWATCH_STATE_STORE_TYPE", "memory")];
        all.extend_from_slice(vars);
        config_from(&all).unwrap()
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!(Selection::parse(None), Selection::Keep);
        assert_eq!(Selection::parse(Some("  ")), Selection::Keep);
        assert_eq!(Selection::parse(Some("ALL")), Selection::All);
        assert_eq!(
            Selection::parse(Some("590, 22,,")),
            Selection::Ids(vec!["590".to_string(), "22".to_string()])
        );
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.state_store_type, "file");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.selection, Selection::Keep);
        assert!(config.interval.is_none());
    }

    #[test]
    fn test_file_store_requires_path() {
        let config = config_from(&[]).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SLOTWATCH_STATE_STORE_PATH"));
    }

    #[test]
    fn test_file_store_parent_must_exist() {
        let config = config_from(&[(
            "SLOTWATCH_STATE_STORE_PATH",
            "/nonexistent-slotwatch-dir/state.json",
        )])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_store_is_valid() {
        assert!(memory_config(&[]).validate().is_ok());
    }

    #[test]
    fn test_unparsable_number_is_config_error() {
        let result = config_from(&[("SLOTWATCH_INTERVAL", "five")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_range() {
        assert!(
            memory_config(&[("SLOTWATCH_INTERVAL", "0")])
                .validate()
                .is_ok()
        );
        assert!(
            memory_config(&[("SLOTWATCH_INTERVAL", "2000")])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_webhook_validation_hides_url() {
        let config = memory_config(&[("SLOTWATCH_WEBHOOK_URL", "ftp://secret-token")]);
        let err = config.validate().unwrap_err().to_string();
        assert!(!err.contains("secret-token"));
    }

    #[test]
    fn test_mention_requires_webhook() {
        let config = memory_config(&[("SLOTWATCH_WEBHOOK_MENTION", "1234")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = memory_config(&[("SLOTWATCH_LOG_LEVEL", "loud")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_timeout_override() {
        let config = memory_config(&[("SLOTWATCH_QUERY_TIMEOUT_SECS", "12")]);
        assert_eq!(config.engine_config().query_timeout_secs, 12);
    }

    #[tokio::test]
    async fn test_control_line_round_trip() {
        let (tx, mut rx) = control::channel(4);
        let responder = tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.message, ControlMessage::Rescan);
            envelope.respond(ControlReply::Ack);
        });

        let reply = handle_control_line(&tx, r#"{"message":"rescan"}"#).await;
        assert_eq!(reply.as_deref(), Some(r#"{"reply":"ack"}"#));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_control_line_rejects_bad_json() {
        let (tx, _rx) = control::channel(4);

        let reply = handle_control_line(&tx, "{not json").await.unwrap();
        assert!(reply.contains(r#""reply":"rejected""#));
        assert!(reply.contains("Invalid control message"));

        assert!(handle_control_line(&tx, "   ").await.is_none());
    }

    #[tokio::test]
    async fn test_control_line_without_engine() {
        let (tx, rx) = control::channel(4);
        drop(rx);

        let reply = handle_control_line(&tx, r#"{"message":"query"}"#)
            .await
            .unwrap();
        assert!(reply.contains(r#""reply":"rejected""#));
    }

    #[tokio::test]
    async fn test_apply_selection() {
        let store = ConfigStore::new(Arc::new(MemoryStateStore::new()));
        store
            .replace_watch_list(&[
                WatchEntry::new("590", DisplayInfo::default()),
                WatchEntry::new("22", DisplayInfo::default()),
            ])
            .await;

        apply_selection(&store, &Selection::Ids(vec!["22".to_string()])).await;
        let selected = store.selected_watch_list().await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].location_id, "22");

        apply_selection(&store, &Selection::All).await;
        assert_eq!(store.selected_watch_list().await.len(), 2);
    }
}
