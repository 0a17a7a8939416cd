//! Device relay behaviour
//!
//! Outbound routing over MQTT and HTTP, connection lifecycle, inbound
//! forwarding and teardown, observed through the flow host hooks.


use bytes::Bytes;
use flow_relay::config::TransportKind;
use flow_relay::protocol::{ConnectivityStatus, FlowMessage, RelayMessage};
use flow_relay::testing::{MockConnector, MockTelemetryPublisher};
use test_helpers::{outbound, test_device, TestRelay};

#[tokio::test]
async fn test_connected_device_publishes_and_forwards() {
    // Arrange
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.host.clear();

    let mut msg = outbound("d1", TransportKind::Mqtt, "21.5");
    msg.topic = Some("events/temperature".to_string());

    // Act
    t.relay.handle_outbound(msg).await;

    // Assert
    let published = t.connector.client.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "/devices/d1/events/temperature");
    assert_eq!(published[0].1, Bytes::from("21.5"));

    let sent = t.host.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].send_status);
    assert_eq!(sent[0].topic.as_deref(), Some("events/temperature"));
    assert_eq!(t.host.statuses(), vec![ConnectivityStatus::Connected]);
    assert!(t.host.errors().is_empty());
}

#[tokio::test]
async fn test_message_without_topic_goes_to_events() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "x"))
        .await;

    assert_eq!(t.connector.client.published()[0].0, "/devices/d1/events");
}

#[tokio::test]
async fn test_disconnected_device_drops_silently() {
    // Arrange: session exists but the broker never acknowledged it
    let mut t = TestRelay::new(MockConnector::new(), MockTelemetryPublisher::new());
    t.establish("d1").await;
    t.host.clear();

    // Act
    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "hello"))
        .await;

    // Assert
    assert!(t.connector.client.published().is_empty());
    assert!(t.host.sent().is_empty());
    assert!(t.host.errors().is_empty());
    assert_eq!(t.host.statuses(), vec![ConnectivityStatus::Disconnected]);
}

#[tokio::test]
async fn test_unknown_device_drops_silently() {
    let mut t = TestRelay::connected();

    let mut msg = outbound("ghost", TransportKind::Mqtt, "hello");
    msg.send_status = true;
    t.relay.handle_outbound(msg).await;

    assert!(t.host.sent().is_empty());
    assert!(t.host.errors().is_empty());
    assert_eq!(t.host.last_status(), Some(ConnectivityStatus::Disconnected));
}

#[tokio::test]
async fn test_publish_failure_reports_error_without_forwarding() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.connector.client.set_fail_publish(true);

    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "hello"))
        .await;

    assert!(t.host.sent().is_empty());
    let errors = t.host.errors();
    assert_eq!(errors.len(), 1);
    let attached = errors[0].1.as_ref().expect("message attached");
    assert!(!attached.send_status);
    assert_eq!(attached.payload, Bytes::from("hello"));
}

#[tokio::test]
async fn test_empty_payload_is_rejected() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, ""))
        .await;

    assert!(t.connector.client.published().is_empty());
    assert!(t.host.sent().is_empty());
    let errors = t.host.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "No data found in msg.payload");
}

#[tokio::test]
async fn test_http_success_forwards_without_send_status() {
    let mut t = TestRelay::connected();

    let mut msg = outbound("d2", TransportKind::Http, "{\"t\":1}");
    msg.send_status = true;
    t.relay.handle_outbound(msg).await;

    assert_eq!(
        t.publisher.calls(),
        vec![("d2".to_string(), Bytes::from("{\"t\":1}"))]
    );
    let sent = t.host.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].send_status);
    assert!(t.host.errors().is_empty());
}

#[tokio::test]
async fn test_http_failure_reports_and_still_forwards() {
    let mut t = TestRelay::new(MockConnector::new(), MockTelemetryPublisher::with_failure());

    t.relay
        .handle_outbound(outbound("d2", TransportKind::Http, "payload"))
        .await;

    assert_eq!(t.publisher.calls().len(), 1);
    assert_eq!(t.host.errors().len(), 1);
    assert!(t.host.errors()[0].0.contains("503"));
    let sent = t.host.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].send_status);
}

#[tokio::test]
async fn test_http_never_touches_broker() {
    let mut t = TestRelay::connected();
    t.establish("d2").await;
    let before = t.connector.client.published().len();

    t.relay
        .handle_outbound(outbound("d2", TransportKind::Http, "payload"))
        .await;

    assert_eq!(t.connector.client.published().len(), before);
}

#[tokio::test]
async fn test_establish_subscribes_config_and_commands() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    assert_eq!(
        t.connector.client.subscriptions(),
        vec!["/devices/d1/config", "/devices/d1/commands/#"]
    );
    let connection = t.relay.pool().get("d1").expect("pooled");
    assert!(connection.connected);
    assert_eq!(connection.subscribed_topics.len(), 2);
    assert_eq!(t.relay.status_of("d1"), ConnectivityStatus::Connected);
}

#[tokio::test]
async fn test_establish_is_idempotent_per_device() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.establish("d1").await;

    assert_eq!(t.connector.connects(), vec!["d1"]);
    assert_eq!(t.relay.pool().len(), 1);
}

#[tokio::test]
async fn test_failed_connect_leaves_device_disconnected_without_retry() {
    // Arrange
    let mut t = TestRelay::new(MockConnector::with_failure(), MockTelemetryPublisher::new());
    let device = test_device("d1", TransportKind::Mqtt);

    // Act
    let result = t.relay.establish_connection(&device).await;
    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "hello"))
        .await;

    // Assert
    assert!(result.is_err());
    assert!(t.relay.pool().is_empty());
    assert_eq!(t.connector.connects(), vec!["d1"]);
    assert!(t.host.sent().is_empty());
    assert!(t
        .host
        .statuses()
        .iter()
        .all(|s| *s == ConnectivityStatus::Disconnected));
}

#[tokio::test]
async fn test_inbound_message_is_forwarded() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.host.clear();

    let listener = t.connector.listener("d1").expect("listener");
    listener.message("/devices/d1/config", Bytes::from("{\"rate\":5}"));
    t.drain();

    let sent = t.host.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic.as_deref(), Some("/devices/d1/config"));
    assert_eq!(sent[0].payload, Bytes::from("{\"rate\":5}"));
    assert!(!sent[0].send_status);
    assert_eq!(t.host.statuses(), vec![ConnectivityStatus::Connected]);
}

#[tokio::test]
async fn test_broker_disconnect_updates_status_and_gates_publish() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    let listener = t.connector.listener("d1").expect("listener");
    listener.disconnected("connection reset");
    t.drain();
    assert_eq!(t.relay.status_of("d1"), ConnectivityStatus::Disconnected);
    assert_eq!(t.host.last_status(), Some(ConnectivityStatus::Disconnected));

    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "hello"))
        .await;
    assert!(t.connector.client.published().is_empty());

    listener.connected();
    t.drain();
    t.relay
        .handle_outbound(outbound("d1", TransportKind::Mqtt, "hello"))
        .await;
    assert_eq!(t.connector.client.published().len(), 1);
}

#[tokio::test]
async fn test_teardown_disconnects_and_ignores_later_events() {
    // Arrange
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    let listener = t.connector.listener("d1").expect("listener");

    // Act
    t.relay.teardown("d1").await;
    t.host.clear();
    listener.message("/devices/d1/commands/reboot", Bytes::from("now"));
    listener.connected();
    t.drain();

    // Assert
    assert_eq!(t.connector.client.disconnect_count(), 1);
    assert!(t.relay.pool().is_empty());
    assert!(t.host.sent().is_empty());
    assert!(t.host.statuses().is_empty());
}

#[tokio::test]
async fn test_events_from_replaced_session_are_ignored() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    let stale = t.connector.listener("d1").expect("first listener");

    t.relay.teardown("d1").await;
    t.establish("d1").await;
    t.host.clear();

    stale.disconnected("old session closed");
    stale.message("/devices/d1/config", Bytes::from("stale"));
    t.drain();

    assert_eq!(t.relay.status_of("d1"), ConnectivityStatus::Connected);
    assert!(t.host.sent().is_empty());
    assert_ne!(
        stale.session(),
        t.relay.pool().get("d1").expect("pooled").session
    );
}

#[tokio::test]
async fn test_teardown_of_unknown_device_is_noop() {
    let mut t = TestRelay::connected();
    t.relay.teardown("nobody").await;
    assert_eq!(t.connector.client.disconnect_count(), 0);
}

#[tokio::test]
async fn test_shutdown_tears_down_every_device() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.establish("d2").await;

    t.relay.shutdown().await;

    assert!(t.relay.pool().is_empty());
    assert_eq!(t.connector.client.disconnect_count(), 2);
}

#[tokio::test]
async fn test_each_outbound_is_forwarded_at_most_once() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    for i in 0..5 {
        let msg = FlowMessage::new(format!("m{i}"));
        t.relay
            .handle_outbound(RelayMessage::outbound(
                msg,
                "d1",
                TransportKind::Mqtt,
            ))
            .await;
    }

    assert_eq!(t.host.sent().len(), 5);
    assert_eq!(t.connector.client.published().len(), 5);
}

#[tokio::test]
async fn test_connected_scenario_forwards_payload_and_topic_unchanged() {
    let mut t = TestRelay::connected();
    t.establish("d1").await;

    let msg = FlowMessage::new("abc").with_topic("events");
    t.relay
        .handle_outbound(RelayMessage::outbound(
            msg,
            "d1",
            TransportKind::Mqtt,
        ))
        .await;

    assert_eq!(
        t.connector.client.published(),
        vec![("/devices/d1/events".to_string(), Bytes::from("abc"))]
    );
    let sent = t.host.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload, Bytes::from("abc"));
    assert_eq!(sent[0].topic.as_deref(), Some("events"));
    assert!(sent[0].send_status);
}

#[tokio::test]
async fn test_forwarded_message_keeps_caller_fields() {
    // Arrange
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    let msg = FlowMessage {
        filename: Some("gs://b/k".to_string()),
        content_type: Some("text/plain".to_string()),
        ..FlowMessage::new("abc").with_topic("events")
    };

    // Act
    t.relay
        .handle_outbound(RelayMessage::outbound(msg.clone(), "d1", TransportKind::Mqtt))
        .await;
    t.relay
        .handle_outbound(RelayMessage::outbound(msg.clone(), "d1", TransportKind::Http))
        .await;

    // Assert: only send_status differs from the input
    let sent = t.host.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0],
        FlowMessage {
            send_status: true,
            ..msg.clone()
        }
    );
    assert_eq!(sent[1], msg);
}

#[tokio::test]
async fn test_inbound_messages_forwarded_in_order_byte_for_byte() {
    // Arrange
    let mut t = TestRelay::connected();
    t.establish("d1").await;
    t.host.clear();
    let listener = t.connector.listener("d1").expect("listener");

    // Act: non-UTF-8 payloads on alternating topics
    let expected: Vec<(String, Bytes)> = (0..50u8)
        .map(|i| {
            let topic = if i % 2 == 0 {
                "/devices/d1/config".to_string()
            } else {
                format!("/devices/d1/commands/c{i}")
            };
            (topic, Bytes::from(vec![i, 0xff, 0x00, 0xc3]))
        })
        .collect();
    for (topic, payload) in &expected {
        listener.message(topic.clone(), payload.clone());
    }
    t.drain();

    // Assert
    let forwarded: Vec<(String, Bytes)> = t
        .host
        .sent()
        .into_iter()
        .map(|m| (m.topic.expect("inbound topic"), m.payload))
        .collect();
    assert_eq!(forwarded, expected);
}
