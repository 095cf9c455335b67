//! Publish loop.
//!
//! Publishes numbered, timestamped payloads to one exchange under a fixed
//! routing key, pausing a random interval between messages.

use std::time::Duration;

use chrono::Local;
use rand::Rng;
use tracing::info;

use crate::bus::{Result, TopicChannel};
use crate::message::{format_payload, Envelope, Sequence};
use crate::shutdown::ShutdownSignal;
use crate::topology;

/// What and where to publish.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub exchange: String,
    pub routing_key: String,
    /// Pause is uniform in `[0, max_delay)`; zero disables it.
    pub max_delay: Duration,
    /// Stop after this many messages. `None` runs until shutdown or error.
    pub limit: Option<u64>,
}

/// Uniform random pause in `[0, max)` at millisecond granularity.
pub fn random_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

/// Sequential publisher over one channel.
pub struct PublishLoop<'a, C: ?Sized> {
    channel: &'a C,
    settings: &'a PublishSettings,
    sequence: Sequence,
}

impl<'a, C> PublishLoop<'a, C>
where
    C: TopicChannel + ?Sized,
{
    pub fn new(channel: &'a C, settings: &'a PublishSettings) -> Self {
        Self {
            channel,
            settings,
            sequence: Sequence::new(),
        }
    }

    /// Messages published so far.
    pub fn sent(&self) -> u64 {
        self.sequence.last()
    }

    /// Publish one message and return its payload.
    ///
    /// The counter is only advanced past a value once it has been sent, so a
    /// failed publish does not leave a gap.
    pub async fn publish_next(&mut self) -> Result<String> {
        let mut next = self.sequence.clone();
        let counter = next.advance();
        let payload = format_payload(counter, &Local::now());

        self.channel
            .publish(
                &self.settings.exchange,
                &self.settings.routing_key,
                &Envelope::text(&payload),
            )
            .await?;
        self.sequence = next;

        info!(
            payload = %payload,
            exchange = %self.settings.exchange,
            routing_key = %self.settings.routing_key,
            "Send"
        );
        Ok(payload)
    }

    /// Publish until the limit, a shutdown, or the first error.
    ///
    /// Returns the number of messages sent.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<u64> {
        loop {
            if self.settings.limit.is_some_and(|limit| self.sent() >= limit) {
                break;
            }
            if shutdown.is_triggered() {
                break;
            }

            self.publish_next().await?;

            let pause = random_delay(self.settings.max_delay);
            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!(sent = self.sent(), "Publisher stopped");
        Ok(self.sent())
    }
}

/// Declare the exchange, then run the publish loop.
pub async fn run<C>(channel: &C, settings: &PublishSettings, shutdown: ShutdownSignal) -> Result<u64>
where
    C: TopicChannel + ?Sized,
{
    topology::declare_exchange(channel, &settings.exchange).await?;
    PublishLoop::new(channel, settings).run(shutdown).await
}

#[cfg(test)]
mod tests;
