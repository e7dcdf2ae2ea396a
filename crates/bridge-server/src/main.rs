mod config;
mod retention;

use std::sync::Arc;

use anyhow::Context;
use bridge_db::{Database, RelayStore};
use bridge_gateway::commands::build_commands;
use bridge_gateway::types::RELAY_INTENTS;
use bridge_gateway::{DiscordGateway, DiscordHttp, DiscordPlatform};
use bridge_relay::{BotIdentity, FanOutSource, RelayProcessor, StaticFanOut, dispatcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;

/// Events buffered between the gateway reader and the dispatcher.
const EVENT_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bridge=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let store: Arc<dyn RelayStore> = db.clone();

    let fan_out = match &config.static_fanout {
        Some(path) => {
            let map = StaticFanOut::from_path(path)?;
            info!(path = %path.display(), channels = map.len(), "Using static fan-out map");
            FanOutSource::Static(map)
        }
        None => FanOutSource::Links,
    };

    let http = DiscordHttp::new(config.bot_token.clone(), config.request_timeout)
        .context("build Discord HTTP client")?;
    let application_id = http
        .current_application()
        .await
        .context("fetch Discord application")?;
    let bot_user = http.current_user().await.context("fetch Discord bot user")?;
    info!(
        application_id = %application_id,
        user_id = %bot_user.id,
        username = %bot_user.username,
        "Authenticated with Discord"
    );

    if config.register_commands {
        match http.register_commands(application_id, &build_commands()).await {
            Ok(()) => info!("Registered slash commands"),
            Err(e) => warn!(error = %e, "Slash command registration failed"),
        }
    }

    let shutdown = CancellationToken::new();
    let platform = Arc::new(DiscordPlatform::new(http, application_id));
    let processor = Arc::new(RelayProcessor::new(
        store,
        platform.clone(),
        fan_out,
        config.relay_config(),
        shutdown.clone(),
    ));
    processor.set_identity(BotIdentity {
        user_id: bot_user.id,
        application_id,
    });

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);

    let dispatcher = tokio::spawn(dispatcher::run(
        processor.clone(),
        rx,
        config.max_concurrent_events,
        shutdown.clone(),
    ));

    let gateway = {
        let shutdown = shutdown.clone();
        let platform = platform.clone();
        let gateway = DiscordGateway::new(config.bot_token.clone(), RELAY_INTENTS);
        tokio::spawn(async move {
            if let Err(e) = gateway.run(platform.http(), &tx, &shutdown).await {
                error!(error = %e, "Discord gateway stopped");
                shutdown.cancel();
            }
        })
    };

    let retention = config.retention_days.map(|days| {
        info!(days, "Correlation retention enabled");
        tokio::spawn(retention::run_prune_loop(db.clone(), days, shutdown.clone()))
    });

    info!("Bridge running");

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    if let Err(e) = gateway.await {
        error!(error = %e, "Gateway task failed");
    }
    if let Err(e) = dispatcher.await {
        error!(error = %e, "Dispatcher task failed");
    }
    if let Some(retention) = retention
        && let Err(e) = retention.await
    {
        error!(error = %e, "Retention task failed");
    }

    info!("Bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
