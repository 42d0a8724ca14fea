use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use cortex::core::clock::SystemClock;
use cortex::core::config::Config;
use cortex::logging;
use cortex::resource::{HttpClient, ResourceRetriever};
use cortex::runtime::Runtime;
use cortex::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = env::var("CORTEX_LOG_DIR").ok().map(PathBuf::from);
    logging::init(log_dir.as_deref());

    let config_path = env::var("CORTEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config =
        Config::load(Some(&config_path)).context("Failed to load engine configuration")?;

    let resource_client: Option<Arc<dyn ResourceRetriever>> =
        config.resource.endpoint.clone().map(|endpoint| {
            let timeout = Duration::from_millis(config.resource.timeout_ms);
            tracing::info!("Using deeprag endpoint {}", endpoint);
            Arc::new(HttpClient::new(endpoint, timeout)) as Arc<dyn ResourceRetriever>
        });

    let runtime = Arc::new(Runtime::build(
        config,
        resource_client,
        Arc::new(SystemClock),
    ));

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(7690);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(runtime);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
