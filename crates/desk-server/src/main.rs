mod config;
mod wiring;

use std::error::Error;

use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = config::Config::from_env()?;
    runtime::logging::init_tracing(&config.log_filter)?;

    let (desk, desk_task) = wiring::start_desk(&config)?;
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, origin = %config.backend_origin, "desk server listening");

    axum::serve(listener, wiring::build_app(desk.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down live desk");
    desk.dispose().await;
    if let Err(err) = desk_task.await {
        warn!(%err, "live desk task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
