//! Exchange, queue and binding declaration.
//!
//! Both roles declare the exchange, so neither depends on which process
//! starts first.

use tracing::info;

use crate::bus::{BusError, ExchangeSpec, Result, TopicChannel};

/// A subscriber's queue and the patterns it is bound under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub queue: String,
    pub exchange: String,
    pub patterns: Vec<String>,
}

/// Declare a durable topic exchange. Fails on an empty name before touching
/// the broker.
pub async fn declare_exchange<C>(channel: &C, name: &str) -> Result<ExchangeSpec>
where
    C: TopicChannel + ?Sized,
{
    if name.is_empty() {
        return Err(BusError::Config("exchange name must not be empty".to_string()));
    }
    let spec = ExchangeSpec::topic(name);
    channel.declare_exchange(&spec).await?;
    info!(exchange = %name, "Declared topic exchange");
    Ok(spec)
}

/// Declare the subscriber's server-named, exclusive, auto-delete queue.
pub async fn declare_anonymous_queue<C>(channel: &C) -> Result<String>
where
    C: TopicChannel + ?Sized,
{
    let queue = channel.declare_anonymous_queue().await?;
    info!(queue = %queue, "Declared anonymous queue");
    Ok(queue)
}

/// Bind `queue` to `exchange` under a single pattern.
pub async fn bind<C>(channel: &C, queue: &str, exchange: &str, pattern: &str) -> Result<()>
where
    C: TopicChannel + ?Sized,
{
    info!(exchange = %exchange, routing_key = %pattern, "Binding to exchange");
    channel.bind_queue(queue, exchange, pattern).await
}

/// One binding per pattern, in order. Stops at the first rejection.
pub async fn bind_all<C>(
    channel: &C,
    queue: &str,
    exchange: &str,
    patterns: &[String],
) -> Result<()>
where
    C: TopicChannel + ?Sized,
{
    for pattern in patterns {
        bind(channel, queue, exchange, pattern).await?;
    }
    Ok(())
}

/// Declare the exchange, then a fresh queue, then bind every pattern.
pub async fn prepare_subscriber<C>(
    channel: &C,
    exchange: &str,
    patterns: &[String],
) -> Result<Subscription>
where
    C: TopicChannel + ?Sized,
{
    declare_exchange(channel, exchange).await?;
    let queue = declare_anonymous_queue(channel).await?;
    bind_all(channel, &queue, exchange, patterns).await?;
    Ok(Subscription {
        queue,
        exchange: exchange.to_string(),
        patterns: patterns.to_vec(),
    })
}
