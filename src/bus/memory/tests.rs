use super::*;
use std::time::Duration;

async fn next_body(stream: &mut DeliveryStream) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(100), stream.next())
        .await
        .ok()
        .flatten()
        .map(|d| d.unwrap().body_lossy().into_owned())
}

async fn subscribed(
    broker: &MemoryBroker,
    exchange: &str,
    patterns: &[&str],
) -> (MemoryChannel, DeliveryStream) {
    let channel = broker.channel();
    channel
        .declare_exchange(&ExchangeSpec::topic(exchange))
        .await
        .unwrap();
    let queue = channel.declare_anonymous_queue().await.unwrap();
    for pattern in patterns {
        channel.bind_queue(&queue, exchange, pattern).await.unwrap();
    }
    let stream = channel.consume(&queue).await.unwrap();
    (channel, stream)
}

#[tokio::test]
async fn test_identical_exchange_declaration_is_idempotent() {
    let broker = MemoryBroker::new();
    let first = broker.channel();
    let second = broker.channel();

    first
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();
    second
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();

    assert!(broker.has_exchange("logs"));
}

#[tokio::test]
async fn test_conflicting_exchange_declaration_fails() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    channel
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();

    let transient = ExchangeSpec {
        durable: false,
        ..ExchangeSpec::topic("logs")
    };
    let err = channel.declare_exchange(&transient).await.unwrap_err();
    assert!(matches!(err, BusError::DeclareExchange(_)));
}

#[tokio::test]
async fn test_default_exchange_cannot_be_declared() {
    let broker = MemoryBroker::new();
    let err = broker
        .channel()
        .declare_exchange(&ExchangeSpec::topic(""))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::DeclareExchange(_)));
}

#[tokio::test]
async fn test_anonymous_queues_get_distinct_generated_names() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    let a = channel.declare_anonymous_queue().await.unwrap();
    let b = channel.declare_anonymous_queue().await.unwrap();
    assert_ne!(a, b);
    assert!(a.starts_with(GENERATED_QUEUE_PREFIX));
    assert_eq!(broker.queue_count(), 2);
}

#[tokio::test]
async fn test_bind_requires_existing_exchange() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    let queue = channel.declare_anonymous_queue().await.unwrap();
    let err = channel.bind_queue(&queue, "missing", "info").await.unwrap_err();
    assert!(matches!(err, BusError::Bind(_)));
}

#[tokio::test]
async fn test_queue_is_exclusive_to_owning_channel() {
    let broker = MemoryBroker::new();
    let owner = broker.channel();
    let other = broker.channel();
    owner
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();
    let queue = owner.declare_anonymous_queue().await.unwrap();

    assert!(matches!(
        other.bind_queue(&queue, "logs", "info").await,
        Err(BusError::Bind(_))
    ));
    assert!(matches!(
        other.consume(&queue).await,
        Err(BusError::Subscribe(_))
    ));
}

#[tokio::test]
async fn test_publish_requires_existing_exchange() {
    let broker = MemoryBroker::new();
    let err = broker
        .channel()
        .publish("missing", "info", &Envelope::text("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Publish(_)));
}

#[tokio::test]
async fn test_unroutable_publish_is_silently_dropped() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    channel
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();
    channel
        .publish("logs", "info", &Envelope::text("nobody listens"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_star_pattern_routing() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscribed(&broker, "logs", &["a.*"]).await;
    let publisher = broker.channel();

    publisher
        .publish("logs", "a.b", &Envelope::text("one word"))
        .await
        .unwrap();
    publisher
        .publish("logs", "a.b.c", &Envelope::text("two words"))
        .await
        .unwrap();

    assert_eq!(next_body(&mut stream).await.as_deref(), Some("\"one word\""));
    assert_eq!(next_body(&mut stream).await, None);
}

#[tokio::test]
async fn test_hash_pattern_routing() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscribed(&broker, "logs", &["a.#"]).await;
    let publisher = broker.channel();

    for key in ["a", "a.b", "a.b.c", "b.a"] {
        publisher
            .publish("logs", key, &Envelope::text(key))
            .await
            .unwrap();
    }

    assert_eq!(next_body(&mut stream).await.as_deref(), Some("\"a\""));
    assert_eq!(next_body(&mut stream).await.as_deref(), Some("\"a.b\""));
    assert_eq!(next_body(&mut stream).await.as_deref(), Some("\"a.b.c\""));
    assert_eq!(next_body(&mut stream).await, None);
}

#[tokio::test]
async fn test_overlapping_bindings_deliver_once_per_queue() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscribed(&broker, "logs", &["info", "#"]).await;

    broker
        .channel()
        .publish("logs", "info", &Envelope::text("once"))
        .await
        .unwrap();

    assert_eq!(next_body(&mut stream).await.as_deref(), Some("\"once\""));
    assert_eq!(next_body(&mut stream).await, None);
}

#[tokio::test]
async fn test_each_subscriber_queue_gets_a_copy() {
    let broker = MemoryBroker::new();
    let (_a, mut first) = subscribed(&broker, "logs", &["info"]).await;
    let (_b, mut second) = subscribed(&broker, "logs", &["#"]).await;

    broker
        .channel()
        .publish("logs", "info", &Envelope::text("fanout"))
        .await
        .unwrap();

    assert_eq!(next_body(&mut first).await.as_deref(), Some("\"fanout\""));
    assert_eq!(next_body(&mut second).await.as_deref(), Some("\"fanout\""));
}

#[tokio::test]
async fn test_delivery_carries_routing_metadata() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscribed(&broker, "logs", &["warn"]).await;
    broker
        .channel()
        .publish("logs", "warn", &Envelope::text("careful"))
        .await
        .unwrap();

    let delivery = stream.next().await.unwrap().unwrap();
    assert_eq!(delivery.exchange, "logs");
    assert_eq!(delivery.routing_key, "warn");
    assert_eq!(delivery.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_second_consumer_on_same_queue_is_rejected() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    let queue = channel.declare_anonymous_queue().await.unwrap();
    let _stream = channel.consume(&queue).await.unwrap();
    assert!(matches!(
        channel.consume(&queue).await,
        Err(BusError::Subscribe(_))
    ));
}

#[tokio::test]
async fn test_close_deletes_exclusive_queue_and_ends_stream() {
    let broker = MemoryBroker::new();
    let (sub, mut stream) = subscribed(&broker, "logs", &["info", "warn"]).await;
    assert_eq!(broker.queue_count(), 1);

    sub.close();

    assert!(sub.is_closed());
    assert_eq!(broker.queue_count(), 0);
    assert!(broker.has_exchange("logs"));
    let ended = tokio::time::timeout(Duration::from_millis(100), stream.next())
        .await
        .unwrap();
    assert!(ended.is_none());
}

#[tokio::test]
async fn test_drop_behaves_like_close() {
    let broker = MemoryBroker::new();
    let (sub, _stream) = subscribed(&broker, "logs", &["info"]).await;
    drop(sub);
    assert_eq!(broker.queue_count(), 0);
}

#[tokio::test]
async fn test_operations_fail_after_close() {
    let broker = MemoryBroker::new();
    let channel = broker.channel();
    channel
        .declare_exchange(&ExchangeSpec::topic("logs"))
        .await
        .unwrap();
    channel.close();

    assert!(matches!(
        channel.publish("logs", "info", &Envelope::text("late")).await,
        Err(BusError::Publish(_))
    ));
    assert!(matches!(
        channel.declare_anonymous_queue().await,
        Err(BusError::DeclareQueue(_))
    ));
}
