//! Broker channel abstraction.
//!
//! This module contains:
//! - `TopicChannel` trait: the operations both roles issue against a broker
//! - `BusError`: error taxonomy for connection and protocol failures
//! - Implementations: AMQP (RabbitMQ via lapin), in-memory topic exchange

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::message::Envelope;

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::AmqpSession;
pub use memory::{MemoryBroker, MemoryChannel};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Exchange declaration failed: {0}")]
    DeclareExchange(String),

    #[error("Queue declaration failed: {0}")]
    DeclareQueue(String),

    #[error("Bind failed: {0}")]
    Bind(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

impl BusError {
    /// Whether the failure may clear up on its own.
    ///
    /// Only connectivity failures qualify. Configuration and protocol
    /// rejections fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Connection(_))
    }
}

/// Exchange kinds understood by the bus. Only topic routing is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeKind {
    #[default]
    Topic,
}

/// Parameters of an exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    /// Survives broker restart.
    pub durable: bool,
    pub auto_delete: bool,
}

impl ExchangeSpec {
    /// Durable, non-auto-delete topic exchange.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Topic,
            durable: true,
            auto_delete: false,
        }
    }
}

/// A message as handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Delivery {
    /// Body rendered as text, replacing invalid UTF-8.
    pub fn body_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Stream of deliveries for one consumer. Ends when the channel closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Operations issued on a broker channel.
///
/// Implementations:
/// - `AmqpSession`: RabbitMQ via AMQP 0-9-1
/// - `MemoryChannel`: in-process topic exchange for testing
#[async_trait]
pub trait TopicChannel: Send + Sync {
    /// Declare an exchange. Identical redeclaration is a no-op; conflicting
    /// redeclaration fails with `BusError::DeclareExchange`.
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> Result<()>;

    /// Declare a server-named, non-durable, exclusive, auto-delete queue.
    ///
    /// Returns the generated queue name.
    async fn declare_anonymous_queue(&self) -> Result<String>;

    /// Bind a queue to an exchange under one routing-key pattern.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()>;

    /// Publish without mandatory/immediate flags. Unroutable messages are
    /// dropped by the broker.
    async fn publish(&self, exchange: &str, routing_key: &str, envelope: &Envelope)
        -> Result<()>;

    /// Start an auto-acknowledged, non-exclusive consumer on a queue.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;
}
