//! AMQP (RabbitMQ) broker session.
//!
//! One connection and one channel per process. Every declare, bind, publish
//! and consume goes through that channel.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, info, warn};

use super::{BusError, Delivery, DeliveryStream, ExchangeKind, ExchangeSpec, Result, TopicChannel};
use crate::config::BrokerConfig;
use crate::message::Envelope;
use crate::utils::retry::{with_policy, RetryPolicy};

/// Reply code sent when closing normally.
const REPLY_SUCCESS: u16 = 200;

/// Connection and channel to a RabbitMQ broker.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    address: String,
}

impl AmqpSession {
    /// Connect and open the channel, retrying connectivity failures as the
    /// policy allows.
    pub async fn open(config: &BrokerConfig, policy: &RetryPolicy) -> Result<Self> {
        with_policy(policy, "broker", || Self::connect(config)).await
    }

    async fn connect(config: &BrokerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| {
                BusError::Connection(format!("Failed to connect to {}: {}", config.address, e))
            })?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        info!(address = %config.address, "Connected to AMQP");

        Ok(Self {
            connection,
            channel,
            address: config.address.clone(),
        })
    }

    /// Close the channel, then the connection.
    pub async fn close(self) -> Result<()> {
        let channel_result = self.channel.close(REPLY_SUCCESS, "Bye").await;
        if let Err(e) = &channel_result {
            warn!(error = %e, "Failed to close channel");
        }

        self.connection
            .close(REPLY_SUCCESS, "Bye")
            .await
            .map_err(|e| BusError::Connection(format!("Failed to close connection: {}", e)))?;

        debug!(address = %self.address, "Closed AMQP connection");
        channel_result
            .map_err(|e| BusError::Connection(format!("Failed to close channel: {}", e)))
    }

    fn lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }

    fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
        Delivery {
            exchange: delivery.exchange.as_str().to_string(),
            routing_key: delivery.routing_key.as_str().to_string(),
            content_type: delivery
                .properties
                .content_type()
                .as_ref()
                .map(|c| c.as_str().to_string()),
            body: delivery.data,
        }
    }
}

#[async_trait]
impl TopicChannel for AmqpSession {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> Result<()> {
        self.channel
            .exchange_declare(
                &exchange.name,
                Self::lapin_kind(exchange.kind),
                ExchangeDeclareOptions {
                    durable: exchange.durable,
                    auto_delete: exchange.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::DeclareExchange(format!("'{}': {}", exchange.name, e)))
    }

    async fn declare_anonymous_queue(&self) -> Result<String> {
        // An empty name asks the broker to generate one.
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::DeclareQueue(e.to_string()))?;

        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Bind(format!("'{}' to '{}': {}", pattern, exchange, e)))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &Envelope,
    ) -> Result<()> {
        let properties =
            BasicProperties::default().with_content_type(envelope.content_type.as_str().into());

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &envelope.body,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        // Without publisher confirms enabled this resolves immediately.
        confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: true,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        Ok(consumer
            .map(|delivery| {
                delivery
                    .map(Self::into_delivery)
                    .map_err(|e| BusError::Subscribe(format!("Delivery failed: {}", e)))
            })
            .boxed())
    }
}
