#![forbid(unsafe_code)]

//! `mc-warden`: Minecraft server sidecar agent binary.
//!
//! Bootstraps configuration, the database, the RCON client, the process
//! supervisor, the backup manager, and the HTTP API, then waits for a
//! shutdown signal. The supervised server is left running on shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mc_warden::api::{self, AppState};
use mc_warden::auth::SignedTokenVerifier;
use mc_warden::backup::BackupManager;
use mc_warden::config::GlobalConfig;
use mc_warden::logs::LogHub;
use mc_warden::persistence::backup_repo::BackupRepo;
use mc_warden::persistence::db;
use mc_warden::policy::CommandPolicy;
use mc_warden::rcon::RconClient;
use mc_warden::sandbox::Sandbox;
use mc_warden::supervisor::ProcessSupervisor;
use mc_warden::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mc-warden", about = "Minecraft server sidecar agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "mc-warden.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured server root.
    #[arg(long)]
    server_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mc-warden bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(root) = args.server_root {
        config.override_server_root(root)?;
    }
    config.load_credentials().await?;

    let config = Arc::new(config);
    info!(
        server_root = %config.server_root.display(),
        state_dir = %config.state_dir.display(),
        "configuration loaded"
    );

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    // ── Build services ──────────────────────────────────
    let ct = CancellationToken::new();
    let logs = Arc::new(LogHub::new(config.logs.capacity));
    let rcon = RconClient::new(config.rcon.clone(), ct.clone());
    let supervisor = Arc::new(ProcessSupervisor::new(
        config.server_root.clone(),
        config.launch.clone(),
        config.supervisor.clone(),
        config.logs.history_max,
        Arc::clone(&logs),
        Arc::new(rcon.clone()),
    ));
    let backups = BackupManager::new(
        config.server_root.clone(),
        config.backup_dir(),
        config.backups.clone(),
        BackupRepo::new(Arc::clone(&db)),
    )?;
    let sandbox = Arc::new(Sandbox::new(&config.server_root, &config.files)?);
    let verifier = Arc::new(SignedTokenVerifier::new(config.auth.token_secret.clone())?);

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        supervisor,
        rcon,
        logs,
        backups,
        sandbox,
        policy: CommandPolicy::default(),
        verifier,
    });

    // ── Start HTTP API ──────────────────────────────────
    let mut http = tokio::spawn(api::serve(Arc::clone(&state), ct.clone()));
    info!("mc-warden ready");

    // ── Wait for shutdown signal ────────────────────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
        }
        result = &mut http => {
            ct.cancel();
            return match result {
                Ok(outcome) => outcome,
                Err(err) => Err(AppError::Io(format!("HTTP task failed: {err}"))),
            };
        }
    }

    match http.await {
        Ok(Err(err)) => error!(%err, "HTTP API failed during shutdown"),
        Err(err) => error!(%err, "HTTP task panicked"),
        Ok(Ok(())) => {}
    }

    if state.supervisor.is_running() {
        info!(pid = ?state.supervisor.pid(), "leaving server running");
    }
    info!("mc-warden shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
