//! Usage service entry point: one metering cycle per invocation.

use usage_service::config::UsageConfig;
use usage_service::services::{ConsumptionCatalog, UsageReporter};

use connector_core::clients::Backends;
use connector_core::observability::init_tracing;
use tracing::Instrument;
use uuid::Uuid;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = UsageConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(&config.service_name, &config.log_level);

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("usage_run", %run_id);
    run(config).instrument(span).await
}

async fn run(config: UsageConfig) -> std::io::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        products = ?config.common.marketplace.usage_products(),
        target_project_id = config.target_project_id.as_deref().unwrap_or(""),
        "Starting usage-service"
    );

    let backends = Backends::build(&config.common).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build backend clients");
        std::io::Error::other(format!("Backend setup error: {}", e))
    })?;

    // Pre-flight: identity must be reachable with admin rights before
    // any report clock is touched.
    if let Err(e) = backends.identity.find_role("admin").await {
        tracing::error!(error = %e, "Operator account cannot resolve the admin role");
        return Err(std::io::Error::other(format!("Identity pre-check failed: {}", e)));
    }

    let Some(metering) = backends.metering.clone() else {
        tracing::error!("Metering service is not deployed, cannot report usage");
        return Err(std::io::Error::other("metering service unavailable"));
    };

    let reporter = UsageReporter::new(
        backends.commerce.clone(),
        backends.identity.clone(),
        ConsumptionCatalog::new(metering, &config.common.misc.report_zero_usage),
        config.common.clone(),
        config.target_project_id.clone(),
    );

    if let Err(e) = reporter.process_all().await {
        tracing::error!(error = %e, "Usage cycle failed");
        return Err(std::io::Error::other(format!("Usage cycle error: {}", e)));
    }

    tracing::info!("Usage cycle complete");
    Ok(())
}
