//! HeyHook Worker - async RabbitMQ consumer for engagement scoring.
//!
//! This worker processes verified events from the webhook_events queue,
//! applying open/click/bounce/complaint and site activity to the Resend
//! contact's engagement score and tier segment.

mod consumer;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use heyhook::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        cloudamqp_url_set = !config.cloudamqp_url.is_empty(),
        resend_api_key_set = config.resend_api_key.is_some(),
        segments_configured = config.segments.is_some(),
        retry_attempts = config.retry_attempts,
        concurrency = config.worker_concurrency,
        "config_loaded"
    );

    // Start the consumer
    consumer::run(config).await?;

    Ok(())
}
