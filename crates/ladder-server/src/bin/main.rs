use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ladder_server::config::LadderConfig;

#[tokio::main]
async fn main() -> ladder_server::error::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ladder_server=info,tower_http=info")),
        )
        .init();

    let config_path = PathBuf::from(
        std::env::var("LADDER_CONFIG").unwrap_or_else(|_| "config.json".to_string()),
    );
    let config = LadderConfig::load(&config_path)?;
    let addr = config.listen_addr.clone();

    let (app, _state) = ladder_server::build_app(config, Some(config_path)).await?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
