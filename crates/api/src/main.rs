use std::process;
use std::sync::Arc;

use storefront_api::app::{AppServices, build_app};
use storefront_api::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().unwrap_or_else(|e| e.exit());
    storefront_observability::init_with(config.log_format);

    let services = Arc::new(AppServices::build(&config)?);
    let notifications = services.spawn_notifications()?;
    let app = build_app(services);

    let listener = match tokio::net::TcpListener::bind(config.socket_addr()).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.socket_addr(), error = %e, "failed to bind");
            process::exit(1);
        }
    };
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tokio::task::spawn_blocking(move || notifications.shutdown()).await?;
    Ok(())
}
