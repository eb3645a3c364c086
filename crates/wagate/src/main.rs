use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wagate::client::{EvolutionClient, MessagingClient};
use wagate::config::Config;
use wagate::events::EventBus;
use wagate::server::{AppState, build_app};
use wagate::session::SessionSupervisor;
use wagate::staging::AttachmentStager;

#[derive(Parser)]
#[command(name = "wagate", version, about = "HTTP gateway for a WhatsApp session")]
struct Cli {
    /// Path to the YAML config file. Missing file means defaults.
    #[arg(short, long, default_value = "wagate.yaml")]
    config: PathBuf,

    /// Override `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let stager = AttachmentStager::new(&config.staging.dir)
        .await
        .context("preparing staging directory")?;
    let bus = EventBus::new(config.server.event_capacity);

    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let client: Arc<dyn MessagingClient> = Arc::new(
        EvolutionClient::new(&config.bridge, client_tx.clone())
            .context("configuring bridge client")?,
    );
    info!(
        bridge = %config.bridge.api_url,
        instance = %config.bridge.instance_name,
        "Using WhatsApp bridge"
    );

    let shutdown = CancellationToken::new();
    let (supervisor, session) =
        SessionSupervisor::new(client.clone(), bus.clone(), config.reconnect.clone());
    let supervisor_handle = supervisor.spawn(client_rx, shutdown.clone());

    let state = AppState {
        client,
        phone: config.phone.formatter(),
        stager,
        events: bus,
        session,
        client_events: Some(client_tx),
        webhook_secret: config.bridge.webhook_secret.clone(),
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        shutdown: shutdown.clone(),
    };
    let app = build_app(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "App running");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutting down");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = supervisor_handle.await {
        warn!(error = %e, "Session supervisor task failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
