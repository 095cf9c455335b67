//! topicbus-pub: topic publisher
//!
//! Declares the exchange, then publishes one message per iteration under a
//! fixed routing key until interrupted or a publish fails.
//!
//! ## Configuration
//! - RABBITMQ_URL: Broker host:port (default: 127.0.0.1:25672)
//! - TOPICBUS_LOG: Log filter (default: info)
//! - TOPICBUS_CONFIG: Optional YAML configuration file

use clap::Parser;
use tracing::{error, warn};

use topicbus::bus::AmqpSession;
use topicbus::cli::PublisherArgs;
use topicbus::config::Config;
use topicbus::publisher;
use topicbus::shutdown::Shutdown;
use topicbus::utils::bootstrap::{init_tracing, wait_for_termination};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = PublisherArgs::parse();
    init_tracing();

    let config = Config::load(args.config.as_deref())
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let settings = args.settings(&config);

    let session = AmqpSession::open(&config.broker, &config.retry)
        .await
        .inspect_err(|e| error!(error = %e, "Unable to create AMQP client"))?;

    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.trigger();
    });

    let result = publisher::run(&session, &settings, signal).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close AMQP session cleanly");
    }

    result.inspect_err(|e| error!(error = %e, "Publisher failed"))?;
    Ok(())
}
