//! Usage-file confirmation entry point: one confirmation sweep per
//! invocation.

use usage_service::config::UsageConfig;
use usage_service::services::UsageFileConfirmer;

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

    init_tracing("usage-file-service", &config.log_level);

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("usage_file_run", %run_id);
    run(config).instrument(span).await
}

async fn run(config: UsageConfig) -> std::io::Result<()> {
    let backends = Backends::build(&config.common).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build backend clients");
        std::io::Error::other(format!("Backend setup error: {}", e))
    })?;

    if let Err(e) = backends.identity.find_role("admin").await {
        tracing::error!(error = %e, "Operator account cannot resolve the admin role");
        return Err(std::io::Error::other(format!("Identity pre-check failed: {}", e)));
    }

    let confirmer = UsageFileConfirmer::new(backends.commerce.clone(), config.common.clone());
    if let Err(e) = confirmer.process_all().await {
        tracing::error!(error = %e, "Usage file sweep failed");
        return Err(std::io::Error::other(format!("Usage file error: {}", e)));
    }

    tracing::info!("Usage file sweep complete");
    Ok(())
}
