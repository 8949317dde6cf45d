//! `WearLink` Relay Server
//!
//! WebSocket relay that executes tools on behalf of linked wearable devices.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use wearlink_core::config::{Config, default_database_path, load_config};
use wearlink_core::tracing_init::init_tracing;
use wearlink_crypto::FieldCipher;

use wearlink_relay::credentials::{CredentialCoordinator, OAuthRefresher};
use wearlink_relay::link::{LinkService, spawn_link_sweep_task};
use wearlink_relay::registry::{ConnectionRegistry, spawn_heartbeat_task};
use wearlink_relay::server::{AppState, Dispatcher, router};
use wearlink_relay::storage::RelayDatabase;
use wearlink_relay::tools::google::{CalendarProvider, GmailProvider, GoogleClient, GoogleEndpoints};
use wearlink_relay::tools::third_party::ThirdPartyClient;
use wearlink_relay::tools::{OrchestratorOptions, ToolOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "wearlink-relay")]
#[command(version, about = "WearLink relay server - device gateway and tool orchestrator")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file (overrides config).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Hex-encoded 32-byte master key for credential encryption.
    #[arg(long, env = "WEARLINK_MASTER_KEY", hide_env_values = true)]
    master_key: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("wearlink_relay=info", args.log_json)?;

    let config = load_config(args.config.as_deref())?;
    let addr: SocketAddr = match args.addr {
        Some(addr) => addr,
        None => config.server.addr.parse()?,
    };

    info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, "Starting wearlink-relay");

    let db_path = args
        .db_path
        .clone()
        .or_else(|| config.server.database_path.clone())
        .or_else(default_database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening relay database");
    let db = RelayDatabase::open(&db_path).await?;

    let cipher = FieldCipher::from_hex(&args.master_key)?;

    let links = LinkService::new(
        db.clone(),
        Duration::from_secs(config.linking.token_ttl_secs),
        config.linking.pairing_uri_base.clone(),
    );
    let state = build_state(&config, db, cipher, links.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let heartbeat = spawn_heartbeat_task(
        state.registry.clone(),
        Duration::from_secs(config.connections.heartbeat_interval_secs.max(1)),
        shutdown_rx.clone(),
    );
    let sweep = spawn_link_sweep_task(
        links,
        Duration::from_secs(config.linking.sweep_interval_secs.max(1)),
        shutdown_rx,
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Relay listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(heartbeat, sweep);
    info!("Relay stopped");
    Ok(())
}

fn build_state(
    config: &Config,
    db: RelayDatabase,
    cipher: FieldCipher,
    links: LinkService,
) -> anyhow::Result<AppState> {
    let credentials = CredentialCoordinator::new(
        db.clone(),
        cipher.clone(),
        Arc::new(OAuthRefresher::new(&config.credentials)?),
        Duration::from_secs(config.credentials.refresh_buffer_secs),
    );

    let google = GoogleClient::new(
        GoogleEndpoints::default(),
        Duration::from_secs(config.tools.builtin_timeout_secs),
    )?;
    let options = OrchestratorOptions {
        cache_capacity: config.tools.cache_capacity,
        cache_ttl: Duration::from_secs(config.tools.cache_ttl_secs),
        max_result_bytes: config.tools.max_result_bytes,
    };
    let orchestrator = ToolOrchestrator::new(
        db.clone(),
        credentials,
        cipher,
        ThirdPartyClient::new(Duration::from_secs(config.tools.third_party_timeout_secs))?
            .with_max_body(config.tools.max_result_bytes.saturating_mul(8)),
        &options,
    )
    .with_builtin("gmail", "Gmail", Arc::new(GmailProvider::new(google.clone())))
    .with_builtin("calendar", "Google Calendar", Arc::new(CalendarProvider::new(google)));

    Ok(AppState {
        registry: ConnectionRegistry::new(config.connections.max_per_device),
        dispatcher: Dispatcher::new(db.clone(), Arc::new(orchestrator), links),
        db,
    })
}
