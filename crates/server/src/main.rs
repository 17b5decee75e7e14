mod api;
mod router;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use l2m_core::config::{load_dotenv, Config};
use l2m_lifecycle::LifecycleManager;

use crate::state::AppState;

/// Periodic health sweep over active rules. Log-only; rule status is
/// mutated by lifecycle calls exclusively, never by the monitor.
fn spawn_monitor(lifecycle: LifecycleManager, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Health monitor disabled (HEALTH_CHECK_INTERVAL=0)");
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; skip it so startup isn't
        // spent probing a cluster that may still be coming up.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            lifecycle.monitor_pass().await;
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let port = config.server.port;
    let state = Arc::new(AppState::from_config(config));
    spawn_monitor(
        state.lifecycle.clone(),
        state.config.monitor.health_check_interval_secs,
    );
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", port);
    axum::serve(listener, app).await?;

    Ok(())
}
