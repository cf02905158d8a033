use common::metrics::gather_metrics;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use storefront::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    init_telemetry(TelemetryConfig::from_env("storefront"))?;

    tracing::info!(
        request_timeout_ms = config.request_timeout_ms,
        cart_ttl_secs = config.cache_ttl.cart_secs,
        "Starting storefront core"
    );

    let state = AppState::connect(&config).await?;
    state.ping().await?;
    tracing::info!("Storefront core ready; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    match gather_metrics() {
        Ok(metrics) => tracing::debug!(metrics = %metrics, "Final metrics snapshot"),
        Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
    }

    shutdown_telemetry();
    Ok(())
}
