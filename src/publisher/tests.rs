use super::*;
use crate::bus::{BusError, DeliveryStream, MemoryBroker, MemoryChannel};
use crate::config::Config;
use crate::message::{Envelope, COUNTER_WIDTH};
use crate::shutdown::Shutdown;
use crate::topology::prepare_subscriber;
use futures::StreamExt;

fn settings(routing_key: &str, limit: Option<u64>) -> PublishSettings {
    PublishSettings {
        exchange: "logs".to_string(),
        routing_key: routing_key.to_string(),
        max_delay: Config::for_test().publisher.max_delay(),
        limit,
    }
}

async fn subscriber(broker: &MemoryBroker, patterns: &str) -> (MemoryChannel, DeliveryStream) {
    let channel = broker.channel();
    let subscription =
        prepare_subscriber(&channel, "logs", &crate::routing::split_patterns(patterns))
            .await
            .unwrap();
    let stream = channel.consume(&subscription.queue).await.unwrap();
    (channel, stream)
}

async fn drain_payloads(stream: &mut DeliveryStream) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Ok(Some(delivery)) =
        tokio::time::timeout(Duration::from_millis(50), stream.next()).await
    {
        let delivery = delivery.unwrap();
        payloads.push(Envelope::decode_text(&delivery.body).unwrap());
    }
    payloads
}

#[test]
fn test_random_delay_bounds() {
    assert_eq!(random_delay(Duration::ZERO), Duration::ZERO);
    for _ in 0..500 {
        assert!(random_delay(Duration::from_millis(1000)) < Duration::from_millis(1000));
    }
    assert_eq!(random_delay(Duration::from_millis(1)), Duration::ZERO);
}

#[test]
fn test_random_delay_saturates_oversized_bound() {
    // Duration::MAX in milliseconds does not fit a u64.
    assert!(random_delay(Duration::MAX) < Duration::MAX);
}

#[tokio::test]
async fn test_counter_starts_at_one_and_increments() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscriber(&broker, "info").await;
    let publisher = broker.channel();

    let sent = run(&publisher, &settings("info", Some(5)), ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(sent, 5);

    let payloads = drain_payloads(&mut stream).await;
    let counters: Vec<u64> = payloads
        .iter()
        .map(|p| p[..COUNTER_WIDTH].parse().unwrap())
        .collect();
    assert_eq!(counters, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_payload_shape() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscriber(&broker, "info").await;
    let publisher = broker.channel();

    run(&publisher, &settings("info", Some(3)), ShutdownSignal::never())
        .await
        .unwrap();

    for payload in drain_payloads(&mut stream).await {
        let (counter, stamp) = payload.split_once(' ').unwrap();
        assert_eq!(counter.len(), COUNTER_WIDTH);
        assert!(counter.chars().all(|c| c.is_ascii_digit()));
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}

#[tokio::test]
async fn test_end_to_end_routing_by_key() {
    let broker = MemoryBroker::new();
    let (_sub, mut stream) = subscriber(&broker, "info,warn").await;

    let info = broker.channel();
    let error = broker.channel();
    run(&info, &settings("info", Some(4)), ShutdownSignal::never())
        .await
        .unwrap();
    run(&error, &settings("error", Some(4)), ShutdownSignal::never())
        .await
        .unwrap();

    let payloads = drain_payloads(&mut stream).await;
    assert_eq!(payloads.len(), 4);
    for (i, payload) in payloads.iter().enumerate() {
        assert!(payload.starts_with(&format!("{:08} ", i + 1)));
    }
}

#[tokio::test]
async fn test_unbound_exchange_drops_messages_without_error() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    let sent = run(&publisher, &settings("info", Some(2)), ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(sent, 2);
}

#[tokio::test]
async fn test_run_declares_exchange_first() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    run(&publisher, &settings("info", Some(1)), ShutdownSignal::never())
        .await
        .unwrap();
    assert!(broker.has_exchange("logs"));
}

#[tokio::test]
async fn test_empty_exchange_is_rejected_before_publishing() {
    let broker = MemoryBroker::new();
    let mut bad = settings("info", Some(1));
    bad.exchange = String::new();
    let err = run(&broker.channel(), &bad, ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Config(_)));
}

#[tokio::test]
async fn test_publish_error_is_fatal() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    let settings = settings("info", None);

    // No exchange declared: the first publish fails and the loop ends.
    let err = PublishLoop::new(&publisher, &settings)
        .run(ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Publish(_)));
}

#[tokio::test]
async fn test_failed_publish_does_not_consume_a_counter_value() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    let settings = settings("info", None);
    let mut publish_loop = PublishLoop::new(&publisher, &settings);

    assert!(publish_loop.publish_next().await.is_err());
    assert_eq!(publish_loop.sent(), 0);

    crate::topology::declare_exchange(&publisher, "logs")
        .await
        .unwrap();
    let payload = publish_loop.publish_next().await.unwrap();
    assert!(payload.starts_with("00000001 "));
    assert_eq!(publish_loop.sent(), 1);
}

#[tokio::test]
async fn test_triggered_shutdown_stops_before_first_publish() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let sent = run(&publisher, &settings("info", None), shutdown.signal())
        .await
        .unwrap();
    assert_eq!(sent, 0);
}

#[tokio::test]
async fn test_shutdown_interrupts_pause() {
    let broker = MemoryBroker::new();
    let publisher = broker.channel();
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    let mut slow = settings("info", None);
    slow.max_delay = Duration::from_secs(60);

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();
    });

    let sent = tokio::time::timeout(Duration::from_secs(5), run(&publisher, &slow, signal))
        .await
        .expect("shutdown should interrupt the pause")
        .unwrap();
    assert!(sent >= 1);
    trigger.await.unwrap();
}
