mod config;
mod events;
mod links;

use trace_err::*;
use tracing::{error, info};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn listen_for_cancel(cancel_token: &tokio_util::sync::CancellationToken) {
    #[cfg(unix)]
    let mut term_handler =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .trace_expect("Failed to register signal handlers");
    #[cfg(not(unix))]
    let mut term_handler = std::future::pending();

    let cancel_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = term_handler.recv() => {
                info!("Received terminate signal, stopping...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received CTRL+C, stopping...");
            }
        }
        cancel_token.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((config, config_source)) = config::init() else {
        return Ok(());
    };

    let log_level = std::env::var("DTN6_FORWARDER_LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .or(config.log_level)
        .unwrap_or(tracing::Level::INFO);

    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
        let filter = EnvFilter::builder()
            .with_default_directive(
                tracing_subscriber::filter::LevelFilter::from_level(log_level).into(),
            )
            .from_env_lossy();
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .init();
    }

    info!("{} version {} starting...", PKG_NAME, PKG_VERSION);
    info!("{config_source}");

    inner_main(config).await.inspect_err(|e| error!("{e}"))
}

async fn inner_main(config: config::Config) -> anyhow::Result<()> {
    let cancel_token = tokio_util::sync::CancellationToken::new();
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();

    let forwarder = links::init(&config, events_tx).await?;

    let events_task = events::spawn(events_rx);

    listen_for_cancel(&cancel_token);

    info!(
        links = forwarder.links.len(),
        routes = forwarder.routes.size().await,
        "Started successfully"
    );

    cancel_token.cancelled().await;

    for (id, open_link) in &forwarder.links {
        if open_link
            .contact
            .commands
            .send(dtn6_cla::Command::BreakContact)
            .await
            .is_err()
        {
            tracing::debug!(link = %id, "contact worker already gone");
        }
    }

    let _ = events_task.await;

    info!("Stopped");

    Ok(())
}
