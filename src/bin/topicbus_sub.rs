//! topicbus-sub: topic subscriber
//!
//! Declares the exchange and an anonymous queue, binds the queue under each
//! comma-separated routing-key pattern, and logs every delivery until
//! interrupted.
//!
//! ## Configuration
//! - RABBITMQ_URL: Broker host:port (default: 127.0.0.1:25672)
//! - TOPICBUS_LOG: Log filter (default: info)
//! - TOPICBUS_CONFIG: Optional YAML configuration file

use clap::Parser;
use tracing::{error, info, warn};

use topicbus::bus::AmqpSession;
use topicbus::cli::SubscriberArgs;
use topicbus::config::Config;
use topicbus::shutdown::Shutdown;
use topicbus::subscriber::{self, LogSink};
use topicbus::utils::bootstrap::{init_tracing, wait_for_termination};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = SubscriberArgs::parse();
    init_tracing();

    let config = Config::load(args.config.as_deref())
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let patterns = args.patterns();

    let session = AmqpSession::open(&config.broker, &config.retry)
        .await
        .inspect_err(|e| error!(error = %e, "Unable to create AMQP client"))?;

    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.trigger();
    });

    let result = subscriber::run(&session, &args.exchange, &patterns, LogSink, signal).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close AMQP session cleanly");
    }

    let received = result.inspect_err(|e| error!(error = %e, "Subscriber failed"))?;
    info!(received, "Subscriber stopped");
    Ok(())
}
