//! Consume loop.
//!
//! A spawned task drains the delivery stream into a `DeliverySink` until the
//! stream ends or shutdown fires. The main flow only holds the task's handle.

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::{BusError, Delivery, DeliveryStream, Result, TopicChannel};
use crate::shutdown::ShutdownSignal;
use crate::topology::{self, Subscription};

/// Handler for deliveries drained from the stream.
pub trait DeliverySink: Send + Sync + 'static {
    /// Process one delivery.
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()>;
}

/// Logs each body as it arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()> {
        info!(" [x] {}", delivery.body_lossy());
        Box::pin(async {})
    }
}

/// Forwards each delivery over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ForwardingSink {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl ForwardingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DeliverySink for ForwardingSink {
    fn handle(&self, delivery: Delivery) -> BoxFuture<'static, ()> {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.sender.send(delivery);
        Box::pin(async {})
    }
}

/// Spawns the draining task.
pub struct ConsumeLoop;

impl ConsumeLoop {
    pub fn spawn<S>(stream: DeliveryStream, sink: S, shutdown: ShutdownSignal) -> ConsumeHandle
    where
        S: DeliverySink,
    {
        ConsumeHandle {
            task: tokio::spawn(drain(stream, sink, shutdown)),
        }
    }
}

/// Handle to a running consume task.
pub struct ConsumeHandle {
    task: JoinHandle<u64>,
}

impl ConsumeHandle {
    /// Whether the task has already exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task and return how many deliveries it handled.
    pub async fn join(self) -> Result<u64> {
        self.task
            .await
            .map_err(|e| BusError::Subscribe(format!("Consumer task failed: {}", e)))
    }
}

async fn drain<S>(mut stream: DeliveryStream, sink: S, mut shutdown: ShutdownSignal) -> u64
where
    S: DeliverySink,
{
    let mut handled = 0;
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                debug!(handled, "Consumer stopping on shutdown");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(delivery)) => {
                    handled += 1;
                    sink.handle(delivery).await;
                }
                Some(Err(e)) => {
                    error!(error = %e, "Delivery stream failed");
                    break;
                }
                None => {
                    debug!(handled, "Delivery stream closed");
                    break;
                }
            },
        }
    }
    handled
}

/// Declare topology, start consuming on a spawned task, wait for shutdown,
/// then join the task.
///
/// Returns the number of deliveries handled.
pub async fn run<C, S>(
    channel: &C,
    exchange: &str,
    patterns: &[String],
    sink: S,
    mut shutdown: ShutdownSignal,
) -> Result<u64>
where
    C: TopicChannel + ?Sized,
    S: DeliverySink,
{
    let (subscription, stream) = subscribe(channel, exchange, patterns).await?;
    let handle = ConsumeLoop::spawn(stream, sink, shutdown.clone());

    info!(queue = %subscription.queue, " [*] Waiting for logs. To exit press CTRL+C");
    shutdown.wait().await;

    handle.join().await
}

/// Declare topology and open the delivery stream.
pub async fn subscribe<C>(
    channel: &C,
    exchange: &str,
    patterns: &[String],
) -> Result<(Subscription, DeliveryStream)>
where
    C: TopicChannel + ?Sized,
{
    let subscription = topology::prepare_subscriber(channel, exchange, patterns).await?;
    let stream = channel.consume(&subscription.queue).await?;
    Ok((subscription, stream))
}
