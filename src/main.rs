mod captioning;
mod config;
mod errors;
mod pipeline;
mod prompt;
mod providers;
mod server;
mod storage;
mod util;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::{
    captioning::{ImageDescriber, RetryPolicy},
    errors::Result,
    pipeline::ListingDescriber,
    providers::{openai::OpenAiChatClient, vertex::VertexCaptioner},
    storage::GcsObjectStore,
    util::{format_local, now_local},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = config::AppConfig::load()?;
    info!(
        target: "config",
        bucket = %config.storage.bucket,
        project = %config.vision.project_id,
        location = %config.vision.location,
        vision_model = %config.vision.model,
        chat_model = %config.chat.model,
        "configuration loaded"
    );

    let store = Arc::new(GcsObjectStore::new(&config.storage)?);
    let captioner = Arc::new(VertexCaptioner::from_config(&config.vision)?);
    let improver = Arc::new(OpenAiChatClient::from_config(&config.chat)?);

    let describer = ListingDescriber::new(
        store,
        ImageDescriber::new(captioner, RetryPolicy::from(&config.vision)),
        improver,
    );

    let app = server::router(Arc::new(describer), &config.server);

    server::run_server(config.server.bind_addr, app, shutdown_signal()).await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .with_timer(LocalTimer)
        .init();

    info!("tracing initialized");
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_local(&now_local(), "%Y-%m-%d %H:%M:%S%:z"))
    }
}
