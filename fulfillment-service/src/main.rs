//! Fulfillment service entry point: one batch cycle per invocation.

use fulfillment_service::config::FulfillmentConfig;
use fulfillment_service::services::{FulfillmentHandler, Provisioner, QuotaBackends};

use connector_core::clients::Backends;
use connector_core::observability::init_tracing;
use tracing::Instrument;
use uuid::Uuid;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = FulfillmentConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(&config.service_name, &config.log_level);

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("fulfillment_run", %run_id);
    run(config).instrument(span).await
}

async fn run(config: FulfillmentConfig) -> std::io::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        products = ?config.common.marketplace.products,
        "Starting fulfillment-service"
    );

    let backends = Backends::build(&config.common).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build backend clients");
        std::io::Error::other(format!("Backend setup error: {}", e))
    })?;

    // Pre-flight: the operator account must carry the admin role, or
    // every identity write below would fail halfway through a request.
    if let Err(e) = backends.identity.find_role("admin").await {
        tracing::error!(error = %e, "Operator account cannot resolve the admin role");
        return Err(std::io::Error::other(format!("Identity pre-check failed: {}", e)));
    }

    let handler = FulfillmentHandler::new(
        backends.commerce.clone(),
        backends.identity.clone(),
        Provisioner::new(backends.identity.clone(), backends.compute.clone()),
        QuotaBackends::from_backends(&backends),
        config.common.clone(),
    );

    let requests = match backends
        .commerce
        .list_pending_fulfillments(&config.common.marketplace.products)
        .await
    {
        Ok(requests) => requests,
        Err(e) => {
            tracing::error!(error = %e, "Unable to list pending fulfillment requests");
            return Err(std::io::Error::other(format!("Marketplace error: {}", e)));
        }
    };

    tracing::info!(pending = requests.len(), "Processing fulfillment requests");

    let mut failures = 0usize;
    for request in &requests {
        // A stuck request stays pending and is retried next cycle; it
        // must not take the rest of the batch down with it.
        if let Err(e) = handler.handle(request).await {
            failures += 1;
            tracing::error!(
                request_id = %request.id,
                asset_id = %request.asset.id,
                error = %e,
                "Fulfillment request failed unexpectedly"
            );
        }
    }

    tracing::info!(
        processed = requests.len(),
        failures,
        "Fulfillment cycle complete"
    );
    Ok(())
}
