mod answer;
mod catalog;
mod config;
mod dify;
mod pages;
mod publish;
mod relay;
mod server;
mod tagging;
mod upload;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    let bind = config.bind_addr()?;

    let relay = relay::ChatRelay::new(dify::DifyClient::new(&config.dify), &config.dify);

    let publisher: Arc<dyn publish::Publisher> = if config.github.enabled {
        Arc::new(publish::GitPublisher::new(
            &config.storage.base_dir,
            &config.github,
        ))
    } else {
        warn!("GitHub publishing disabled, uploads stay local");
        Arc::new(publish::NoopPublisher)
    };
    let uploads = upload::UploadPipeline::new(&config, tagging::create_tagger(&config), publisher);

    let state = server::AppState {
        relay,
        uploads: Arc::new(uploads),
    };
    let app = server::router(
        state,
        &config.storage.images_dir(),
        config.server.max_upload_bytes,
        config.dify.passthrough,
    );

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
