use clap::{Parser, ValueEnum};
use pkg_api::AppState;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::network::DEFAULT_API_PORT;
use pkg_constants::paths::{DEFAULT_SERVER_CONFIG, DEFAULT_SERVER_DATA_DIR};
use pkg_constants::provider::{
    DEFAULT_LOCAL_REGIONS, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_SECS,
};
use pkg_controllers::ExpiryController;
use pkg_engine::{CancelHandle, EngineConfig, LeaseManager, LogNotifier};
use pkg_provider::{LocalProvider, RetryingProvider};
use pkg_state::client::StateStore;
use pkg_state::{LeaseStore, MemoryLeaseStore, SlateLeaseStore};
use pkg_types::config::{ServerConfigFile, load_config_file};
use pkg_types::validate::{format_duration, parse_duration};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "leasehold-server", about = "Ephemeral lease engine server")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Bearer token required by the lease API
    #[arg(long)]
    token: Option<String>,

    /// Keep lease records in memory only
    #[arg(long)]
    ephemeral_store: bool,

    /// Maximum number of concurrently running leases
    #[arg(long)]
    max_concurrent_leases: Option<u32>,

    /// Maximum creations per rolling hour (0 = unlimited)
    #[arg(long)]
    max_creations_per_hour: Option<u32>,

    /// Base lease lifetime, e.g. 2h (0 disables expiry)
    #[arg(long)]
    base_lifetime: Option<String>,

    /// Maximum total extension per lease, e.g. 2h
    #[arg(long)]
    max_extension: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    // Load config file (returns defaults if file not found)
    let mut file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_API_PORT);
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir.take())
        .unwrap_or_else(|| DEFAULT_SERVER_DATA_DIR.to_string());
    let ephemeral = cli.ephemeral_store || file_cfg.ephemeral_store.unwrap_or(false);
    let token = match cli.token.or(file_cfg.token.take()) {
        Some(token) => token,
        None => {
            let token = uuid::Uuid::new_v4().simple().to_string();
            warn!("No API token configured; generated token {}", token);
            token
        }
    };
    file_cfg.max_concurrent_leases = cli.max_concurrent_leases.or(file_cfg.max_concurrent_leases);
    file_cfg.max_creations_per_hour = cli
        .max_creations_per_hour
        .or(file_cfg.max_creations_per_hour);
    file_cfg.base_lifetime = cli.base_lifetime.or(file_cfg.base_lifetime);
    file_cfg.max_extension = cli.max_extension.or(file_cfg.max_extension);
    let engine_cfg = EngineConfig::from_file(&file_cfg)?;

    info!("Starting leasehold-server");
    info!("  Port:            {}", port);
    info!(
        "  Store:           {}",
        if ephemeral { "memory" } else { data_dir.as_str() }
    );
    info!(
        "  Token:           {}***",
        token.chars().take(4).collect::<String>()
    );
    info!("  Max leases:      {}", engine_cfg.max_concurrent_leases);
    info!("  Max per hour:    {}", engine_cfg.max_creations_per_hour);
    info!("  Base lifetime:   {}", format_duration(engine_cfg.base_lifetime));
    info!("  Max extension:   {}", format_duration(engine_cfg.max_extension));

    // Lease store
    let (store, slate): (Arc<dyn LeaseStore>, Option<StateStore>) = if ephemeral {
        (Arc::new(MemoryLeaseStore::new()), None)
    } else {
        let state = StateStore::open(&data_dir).await?;
        (Arc::new(SlateLeaseStore::new(state.clone())), Some(state))
    };

    // Compute provider
    let provider_cfg = &file_cfg.provider;
    let kind = provider_cfg.kind.as_deref().unwrap_or("local");
    if kind != "local" {
        anyhow::bail!("unsupported provider kind '{}'", kind);
    }
    let regions = if provider_cfg.regions.is_empty() {
        DEFAULT_LOCAL_REGIONS.iter().map(|r| r.to_string()).collect()
    } else {
        provider_cfg.regions.clone()
    };
    let boot_delay = match &provider_cfg.boot_delay {
        Some(raw) => parse_duration(raw)?,
        None => Duration::ZERO,
    };
    let retry_backoff = match &provider_cfg.retry_backoff {
        Some(raw) => parse_duration(raw)?,
        None => Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
    };
    info!("  Provider:        {} ({})", kind, regions.join(", "));
    let provider = RetryingProvider::new(LocalProvider::new(regions).with_boot_delay(boot_delay))
        .with_attempts(provider_cfg.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS))
        .with_backoff(retry_backoff);

    let mut manager = LeaseManager::new(engine_cfg, Arc::new(provider), store);
    if let Some(notifier_cfg) = &file_cfg.notifier {
        let attachments_dir = notifier_cfg.attachments_dir.as_ref().map(PathBuf::from);
        info!(
            "  Notifier:        log (attachments: {})",
            attachments_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "discarded".to_string())
        );
        manager = manager.with_notifier(Arc::new(LogNotifier::new(attachments_dir)));
    }
    let manager = Arc::new(manager);

    // Shutdown on Ctrl-C
    let (shutdown, signal) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    // Start the ExpiryController background task
    let expiry = ExpiryController::new(manager.clone())
        .with_cancel(signal.clone())
        .start();

    let state = AppState {
        manager,
        token: token.clone(),
        listen_addr: String::new(),
        shutdown: signal,
    };
    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        token,
    };
    start_server(config, state).await?;

    if let Err(e) = expiry.await {
        warn!("ExpiryController task ended abnormally: {}", e);
    }
    if let Some(state) = slate {
        state.close().await?;
    }
    info!("leasehold-server stopped");
    Ok(())
}
