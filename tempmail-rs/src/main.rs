//! tempmail-rs: disposable mailbox server

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tempmail_rs::api::{ApiServer, AppState};
use tempmail_rs::config::{Config, LoggingConfig};
use tempmail_rs::setup::{self, InitOptions};
use tempmail_rs::smtp::{ListenerSet, SessionSettings};
use tempmail_rs::{DomainRegistry, MailStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = "config.toml";

/// How long open SMTP sessions get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "tempmail-rs", version, about = "Multi-domain disposable mailbox server")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the SMTP listeners, the retention sweep and the API (default)
    Serve,
    /// Write a configuration file for the given domains
    Init {
        /// Domain to receive mail for (repeatable)
        #[arg(long = "domain", required = true)]
        domains: Vec<String>,
        /// SMTP port of the first domain
        #[arg(long, default_value_t = 2525)]
        base_port: u16,
        #[arg(long, default_value_t = 3000)]
        web_port: u16,
        /// Acceptance quota per domain
        #[arg(long, default_value_t = 100)]
        max_accepted: u64,
        #[arg(long, default_value_t = 24)]
        retention_hours: u64,
        #[arg(long, default_value_t = 1)]
        cleanup_hours: u64,
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Init {
            domains,
            base_port,
            web_port,
            max_accepted,
            retention_hours,
            cleanup_hours,
            output,
            force,
        } => init(
            InitOptions {
                domains,
                base_port,
                web_port,
                max_accepted,
                retention_hours,
                cleanup_hours,
            },
            &output,
            force,
        ),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => subscriber.with(fmt::layer().json()).init(),
        "compact" => subscriber.with(fmt::layer().compact()).init(),
        _ => subscriber.with(fmt::layer()).init(),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Config::from_file(DEFAULT_CONFIG).context("loading config.toml")
        }
        None => Config::with_env_overrides(&Config::development())
            .context("applying environment overrides"),
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let using_defaults = config_path.is_none() && !Path::new(DEFAULT_CONFIG).exists();
    let config = load_config(config_path)?;
    init_logging(&config.logging);

    info!("Starting tempmail-rs v{}", env!("CARGO_PKG_VERSION"));
    if using_defaults {
        info!("No config file found, using development defaults");
    }
    info!("  Host: {}", config.server.hostname);
    info!("  Data directory: {}", config.storage.data_dir);
    info!(
        "  Retention: {:?} (sweep every {:?})",
        config.retention_window(),
        config.cleanup_interval()
    );

    let registry = Arc::new(
        DomainRegistry::open(config.registry_path(), &config.domains)
            .await
            .context("opening domain registry")?,
    );
    let store = Arc::new(
        MailStore::open(config.messages_path(), registry.clone())
            .await
            .context("opening message store")?,
    );

    let shutdown = CancellationToken::new();
    let retention = store.clone().start_retention_task(
        config.cleanup_interval(),
        config.retention_window(),
        shutdown.clone(),
    );

    let settings = SessionSettings {
        max_message_size: config.smtp.max_message_size,
        idle_timeout: config.idle_timeout(),
        enforce_quota: config.smtp.enforce_quota,
    };
    let domains = registry.list_enabled().await;
    if domains.is_empty() {
        warn!("No enabled domains configured; no SMTP listener will start");
    }
    let listeners = ListenerSet::start(
        &domains,
        &config.smtp.bind_addr,
        store.clone(),
        settings,
        shutdown.child_token(),
    )
    .await;

    let api = if config.api.enabled {
        let state = AppState {
            registry: registry.clone(),
            store: store.clone(),
            smtp_listeners: listeners.active_counter(),
            started_at: Instant::now(),
        };
        let server = ApiServer::new(state, config.api.listen_addr.clone());
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    for (name, addr) in listeners.addrs() {
        info!("  {} -> {}", name, addr);
    }

    wait_for_signal().await;
    info!("Shutdown signal received");

    shutdown.cancel();
    listeners.shutdown(SHUTDOWN_GRACE).await;
    if let Err(e) = retention.await {
        error!("Retention task panicked: {}", e);
    }
    if let Some(api) = api {
        if let Err(e) = api.await {
            error!("API task panicked: {}", e);
        }
    }

    info!("tempmail-rs stopped");
    Ok(())
}

fn init(opts: InitOptions, output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = setup::build_config(&opts)?;
    std::fs::write(output, config.to_toml()?)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Configuration written to {}", output.display());
    println!();
    for domain in &config.domains {
        println!("  {:<30} SMTP port {}", domain.name, domain.port);
    }
    println!();
    println!("Next steps:");
    print!("{}", setup::next_steps(&config));

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
