//! In-memory topic exchange.
//!
//! Models the broker state both roles touch: exchanges, exclusive
//! auto-delete queues and pattern bindings. Each `MemoryChannel` stands in
//! for one connection with its one channel; closing or dropping it deletes
//! the queues it owns, which ends their consumers' streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{BusError, Delivery, DeliveryStream, ExchangeSpec, Result, TopicChannel};
use crate::message::Envelope;
use crate::routing::topic_matches;

/// Prefix of broker-generated queue names.
const GENERATED_QUEUE_PREFIX: &str = "amq.gen-";

type DeliverySender = mpsc::UnboundedSender<Result<Delivery>>;
type DeliveryReceiver = mpsc::UnboundedReceiver<Result<Delivery>>;

struct QueueSlot {
    owner: u64,
    sender: DeliverySender,
    /// Taken by the first consumer.
    receiver: Option<DeliveryReceiver>,
}

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueSlot>,
    bindings: Vec<Binding>,
}

/// Shared broker state. Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel on a fresh logical connection.
    pub fn channel(&self) -> MemoryChannel {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        MemoryChannel {
            id,
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether an exchange with this name has been declared.
    pub fn has_exchange(&self, name: &str) -> bool {
        self.lock().exchanges.contains_key(name)
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    /// Patterns bound to a queue, in binding order.
    pub fn bindings_for(&self, queue: &str) -> Vec<String> {
        self.lock()
            .bindings
            .iter()
            .filter(|b| b.queue == queue)
            .map(|b| b.pattern.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_queue_name(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{:016x}", GENERATED_QUEUE_PREFIX, n)
    }
}

/// One connection's channel on a [`MemoryBroker`].
pub struct MemoryChannel {
    id: u64,
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Close the channel, deleting its exclusive queues and their bindings.
    ///
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.broker.lock();
        let owned: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, slot)| slot.owner == self.id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            state.queues.remove(name);
        }
        state.bindings.retain(|b| !owned.contains(&b.queue));
        debug!(channel = self.id, queues = owned.len(), "Memory channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> std::result::Result<(), String> {
        if self.is_closed() {
            Err("channel is closed".to_string())
        } else {
            Ok(())
        }
    }

    fn check_queue_access(&self, state: &State, queue: &str) -> std::result::Result<(), String> {
        match state.queues.get(queue) {
            None => Err(format!("no queue '{}'", queue)),
            Some(slot) if slot.owner != self.id => Err(format!(
                "queue '{}' is exclusive to another connection",
                queue
            )),
            Some(_) => Ok(()),
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl TopicChannel for MemoryChannel {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> Result<()> {
        self.ensure_open().map_err(BusError::DeclareExchange)?;
        if exchange.name.is_empty() {
            return Err(BusError::DeclareExchange(
                "the default exchange cannot be declared".to_string(),
            ));
        }

        let mut state = self.broker.lock();
        if let Some(existing) = state.exchanges.get(&exchange.name) {
            if existing != exchange {
                return Err(BusError::DeclareExchange(format!(
                    "inequivalent arguments for exchange '{}': declared {:?}, existing {:?}",
                    exchange.name, exchange, existing
                )));
            }
            return Ok(());
        }
        state
            .exchanges
            .insert(exchange.name.clone(), exchange.clone());
        Ok(())
    }

    async fn declare_anonymous_queue(&self) -> Result<String> {
        self.ensure_open().map_err(BusError::DeclareQueue)?;
        let name = self.broker.next_queue_name();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.broker.lock().queues.insert(
            name.clone(),
            QueueSlot {
                owner: self.id,
                sender,
                receiver: Some(receiver),
            },
        );
        Ok(name)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        self.ensure_open().map_err(BusError::Bind)?;
        let mut state = self.broker.lock();
        if !state.exchanges.contains_key(exchange) {
            return Err(BusError::Bind(format!("no exchange '{}'", exchange)));
        }
        self.check_queue_access(&state, queue)
            .map_err(BusError::Bind)?;

        let exists = state
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.exchange == exchange && b.pattern == pattern);
        if !exists {
            state.bindings.push(Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &Envelope,
    ) -> Result<()> {
        self.ensure_open().map_err(BusError::Publish)?;
        let state = self.broker.lock();
        if !state.exchanges.contains_key(exchange) {
            return Err(BusError::Publish(format!("no exchange '{}'", exchange)));
        }

        // A queue receives one copy no matter how many of its bindings match.
        let mut targets: Vec<&str> = Vec::new();
        for binding in &state.bindings {
            if binding.exchange == exchange
                && topic_matches(&binding.pattern, routing_key)
                && !targets.contains(&binding.queue.as_str())
            {
                targets.push(&binding.queue);
            }
        }

        for queue in targets {
            if let Some(slot) = state.queues.get(queue) {
                let delivery = Delivery {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    content_type: Some(envelope.content_type.clone()),
                    body: envelope.body.clone(),
                };
                // Receiver gone means the consumer stopped; the message is dropped.
                let _ = slot.sender.send(Ok(delivery));
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        self.ensure_open().map_err(BusError::Subscribe)?;
        let mut state = self.broker.lock();
        self.check_queue_access(&state, queue)
            .map_err(BusError::Subscribe)?;
        let receiver = state
            .queues
            .get_mut(queue)
            .and_then(|slot| slot.receiver.take())
            .ok_or_else(|| {
                BusError::Subscribe(format!("queue '{}' already has a consumer", queue))
            })?;
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}

#[cfg(test)]
mod tests;
