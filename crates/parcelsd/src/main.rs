// # parcelsd - Parcels Tracker Daemon
//
// A thin integration layer over parcels-core. All tracking logic lives in
// the library; this binary only wires it together:
//
// 1. Reading configuration from the environment (and `.env`)
// 2. Initializing logging and the runtime
// 3. Registering the tracking provider and stores
// 4. Running the poll scheduler until SIGTERM/SIGINT
// 5. Draining the update stream
//
// ## Configuration
//
// - `PARCELS_BOT_TOKEN`: Chat front-end token (required, never logged)
// - `PARCELS_SERVICE_URL`: Tracking-info service base URL (required)
// - `PARCELS_STORE_TYPE`: Store type (file, memory); default file
// - `PARCELS_DB_PATH`: Path to the store file (required for file)
// - `PARCELS_POLLING_INTERVAL`: Polling interval, e.g. `10m`, `90s`; default 10m
// - `PARCELS_UPDATE_BUFFER`: Update stream capacity; default 1
// - `PARCELS_HTTP_TIMEOUT_SECS`: Provider request timeout; default 30
// - `PARCELS_LOG_LEVEL`: trace, debug, info, warn, error; default info
//
// ## Example
//
// ```bash
// export PARCELS_BOT_TOKEN=123456:abcdef
// export PARCELS_SERVICE_URL=https://parcels.example.com
// export PARCELS_DB_PATH=/var/lib/parcels/trackings.json
// export PARCELS_POLLING_INTERVAL=10m
//
// parcelsd
// ```

use anyhow::Result;
use parcels_core::{
    ParcelService, ParcelsConfig, PollScheduler, PollerConfig, ProviderConfig, ProviderRegistry,
    StoreConfig, TrackingUpdate, UpdateStream,
};
use std::env;
use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long to wait for the update consumer after the engine stopped
const CONSUMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ParcelsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ParcelsExitCode> for ExitCode {
    fn from(code: ParcelsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    bot_token: String,
    service_url: String,
    store_type: String,
    db_path: Option<String>,
    polling_interval: Duration,
    update_buffer: usize,
    http_timeout_secs: u64,
    log_level: String,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<REDACTED>")
            .field("service_url", &self.service_url)
            .field("store_type", &self.store_type)
            .field("db_path", &self.db_path)
            .field("polling_interval", &self.polling_interval)
            .field("update_buffer", &self.update_buffer)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let polling_interval = match get("PARCELS_POLLING_INTERVAL") {
            Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| {
                anyhow::anyhow!("PARCELS_POLLING_INTERVAL '{}' is not a duration: {}", raw, e)
            })?,
            None => Duration::from_secs(600),
        };

        let update_buffer = match get("PARCELS_UPDATE_BUFFER") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                anyhow::anyhow!("PARCELS_UPDATE_BUFFER '{}' is not a number: {}", raw, e)
            })?,
            None => 1,
        };

        let http_timeout_secs = match get("PARCELS_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                anyhow::anyhow!("PARCELS_HTTP_TIMEOUT_SECS '{}' is not a number: {}", raw, e)
            })?,
            None => 30,
        };

        Ok(Self {
            bot_token: get("PARCELS_BOT_TOKEN").unwrap_or_default(),
            service_url: get("PARCELS_SERVICE_URL").unwrap_or_default(),
            store_type: get("PARCELS_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            db_path: get("PARCELS_DB_PATH"),
            polling_interval,
            update_buffer,
            http_timeout_secs,
            log_level: get("PARCELS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!(
                "PARCELS_BOT_TOKEN is required. \
                Set it via: export PARCELS_BOT_TOKEN=your_token"
            );
        }

        if self.service_url.is_empty() {
            anyhow::bail!(
                "PARCELS_SERVICE_URL is required. \
                Set it via: export PARCELS_SERVICE_URL=https://parcels.example.com"
            );
        }

        if !self.service_url.starts_with("https://") && !self.service_url.starts_with("http://") {
            anyhow::bail!(
                "PARCELS_SERVICE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.service_url
            );
        }

        match self.store_type.as_str() {
            "file" => match self.db_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "PARCELS_DB_PATH is required when PARCELS_STORE_TYPE=file. \
                    Set it via: export PARCELS_DB_PATH=/var/lib/parcels/trackings.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "PARCELS_DB_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            },
            "memory" => {}
            other => anyhow::bail!(
                "PARCELS_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if self.polling_interval < Duration::from_secs(1) {
            anyhow::bail!(
                "PARCELS_POLLING_INTERVAL must be at least 1s. Got: {}",
                humantime::format_duration(self.polling_interval)
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PARCELS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_parcels_config().validate()?;

        Ok(())
    }

    /// Library configuration for the engine
    fn to_parcels_config(&self) -> ParcelsConfig {
        let store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::File {
                path: self.db_path.clone().unwrap_or_default(),
            },
        };

        ParcelsConfig {
            provider: ProviderConfig::Http {
                base_url: self.service_url.clone(),
                timeout_secs: self.http_timeout_secs,
            },
            store,
            poller: PollerConfig {
                polling_interval_secs: self.polling_interval.as_secs(),
                update_buffer: self.update_buffer,
                ..PollerConfig::default()
            },
        }
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Load `.env` if present; a missing file is fine, a malformed one is not
fn load_dotenv() -> Result<bool> {
    dotenvy::dotenv().map(|_| true).or_else(|err| match err {
        dotenvy::Error::Io(_) => Ok(false),
        _ => Err(err.into()),
    })
}

fn main() -> ExitCode {
    if let Err(e) = load_dotenv() {
        eprintln!("Failed to load .env file: {}", e);
        return ParcelsExitCode::ConfigError.into();
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ParcelsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ParcelsExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ParcelsExitCode::ConfigError.into();
    }

    info!("Starting parcelsd daemon");
    debug!(?config, "Configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ParcelsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            ParcelsExitCode::RuntimeError
        } else {
            ParcelsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = ProviderRegistry::with_builtin_stores();

    #[cfg(feature = "http")]
    {
        info!("Registering HTTP tracking provider");
        parcels_provider_http::register(&registry);
    }

    let parcels_config = config.to_parcels_config();

    let provider = registry.create_provider(&parcels_config.provider)?;
    let store = registry.create_store(&parcels_config.store).await?;

    info!(
        provider = provider.provider_name(),
        store = parcels_config.store.type_name(),
        polling_interval = %humantime::format_duration(config.polling_interval),
        "Components created"
    );

    let (service, updates) = ParcelService::new(provider, store, &parcels_config.poller)?;
    let consumer = tokio::spawn(consume_updates(updates));

    let shutdown = shutdown_signal()?;
    let scheduler = PollScheduler::new(service.clone());

    scheduler
        .run_until(async {
            let signal_name = shutdown.await;
            info!(signal = signal_name, "Received shutdown signal");
        })
        .await?;

    info!("Shutting down daemon");
    service.shutdown().await;

    // Dropping the last service handle closes the update stream
    drop(scheduler);
    drop(service);

    match tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, consumer).await {
        Ok(Ok(())) => info!("Update consumer finished"),
        Ok(Err(e)) => error!("Update consumer failed: {}", e),
        Err(_) => warn!("Update consumer did not finish in {:?}", CONSUMER_DRAIN_TIMEOUT),
    }

    Ok(())
}

/// Drain the update stream, logging each update
///
/// A chat front end replaces this with message delivery.
async fn consume_updates(updates: UpdateStream) {
    let mut stream = updates.into_stream();
    while let Some(update) = stream.next().await {
        log_update(&update);
    }
}

fn log_update(update: &TrackingUpdate) {
    let user_id = update.user_id;
    let tracking_number = update.tracking_number.as_str();
    let display_name = update.display_name.as_deref().unwrap_or("");

    match &update.error {
        Some(err) if err.is_not_found() => {
            info!(user_id, tracking_number, display_name, "No tracking info yet");
        }
        Some(err) => {
            warn!(user_id, tracking_number, display_name, error = %err, "Tracking request failed");
        }
        None => {
            info!(
                user_id,
                tracking_number,
                display_name,
                new_infos = update.new_tracking_infos.len(),
                new_events = update.new_tracking_events.len(),
                "Tracking update"
            );
            for event in &update.new_tracking_events {
                debug!(tracking_number, time = %event.time, status = %event.status, "{}", event.description);
            }
        }
    }
}

/// Install SIGTERM/SIGINT handlers
///
/// The returned future resolves with the name of the first signal received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Install a CTRL-C handler
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("PARCELS_BOT_TOKEN", "123456:secret-token"),
        ("PARCELS_SERVICE_URL", "https://parcels.example.com"),
        ("PARCELS_STORE_TYPE", "memory"),
    ];

    #[test]
    fn test_defaults() {
        let config = config_from(REQUIRED).unwrap();
        config.validate().unwrap();

        assert_eq!(config.polling_interval, Duration::from_secs(600));
        assert_eq!(config.update_buffer, 1);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.log_level(), Level::INFO);

        let parcels = config.to_parcels_config();
        assert_eq!(parcels.poller.polling_interval_secs, 600);
        assert_eq!(parcels.store.type_name(), "memory");
    }

    #[test]
    fn test_polling_interval_is_humantime() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_POLLING_INTERVAL", "1h 30m"));
        let config = config_from(&vars).unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(5400));

        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_POLLING_INTERVAL", "often"));
        assert!(config_from(&vars).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_POLLING_INTERVAL", "500ms"));
        assert!(config_from(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_required_variables() {
        for missing in ["PARCELS_BOT_TOKEN", "PARCELS_SERVICE_URL"] {
            let vars: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != missing).collect();
            let err = config_from(&vars).unwrap().validate().unwrap_err();
            assert!(err.to_string().contains(missing), "{err}");
        }
    }

    #[test]
    fn test_file_store_requires_db_path() {
        let mut vars: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "PARCELS_STORE_TYPE")
            .collect();
        let err = config_from(&vars).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("PARCELS_DB_PATH"));

        vars.push(("PARCELS_DB_PATH", "trackings.json"));
        let config = config_from(&vars).unwrap();
        config.validate().unwrap();
        assert_eq!(config.to_parcels_config().store.type_name(), "file");
    }

    #[test]
    fn test_rejects_unknown_store_and_bad_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_STORE_TYPE", "sqlite"));
        assert!(config_from(&vars).unwrap().validate().is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_UPDATE_BUFFER", "lots"));
        assert!(config_from(&vars).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_UPDATE_BUFFER", "0"));
        assert!(config_from(&vars).unwrap().validate().is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("PARCELS_SERVICE_URL", "parcels.example.com"));
        assert!(config_from(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_bot_token_not_exposed_in_debug() {
        let config = config_from(REQUIRED).unwrap();
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret-token"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
