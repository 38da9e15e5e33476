//! Integration tests for the inbound acceptance flow and the established
//! connection, bridging to a real local TCP endpoint.

pub mod common;

use common::harness::{RecordingUplink, init_tracing};
use osprey_protocol::adapter::{ConnectionAdapter, ConnectionAdapterOptions};
use osprey_protocol::config::Config;
use osprey_protocol::error::Error;
use osprey_protocol::message::payload::{BridgeOptions, Data, DataAck};
use osprey_protocol::message::{ConnectionId, DeviceId, Message, MessageType};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::sleep;

fn test_options(target: String) -> ConnectionAdapterOptions {
    ConnectionAdapterOptions {
        cid: ConnectionId::generate(),
        local_device: DeviceId::from("local-device"),
        peer_device: DeviceId::from("peer-device"),
        bridge: BridgeOptions::new(target),
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    // Keep the handshake tickers fast so the tests stay short.
    config.connection.resend_interval = Duration::from_millis(50);
    config
}

/// A message as the peer would send it on this connection.
fn peer_message(options: &ConnectionAdapterOptions, kind: MessageType) -> Message {
    Message::control(
        options.peer_device.clone(),
        options.local_device.clone(),
        options.cid.clone(),
        kind,
    )
}

#[tokio::test]
async fn test_accept_success_resends_until_ready() {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stream_tx, stream_rx) = oneshot::channel::<TcpStream>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = stream_tx.send(stream);
    });

    let uplink = RecordingUplink::new();
    let options = test_options(addr.to_string());
    let mut adapter = ConnectionAdapter::new_inbound(options.clone(), test_config(), uplink.clone());

    adapter.start().await.unwrap();

    // The local TCP connection was established.
    let _stream = tokio::time::timeout(Duration::from_secs(2), stream_rx)
        .await
        .expect("local connection not established")
        .unwrap();

    // The accept message is re-sent until the peer confirms.
    uplink
        .wait_for_kind(MessageType::ConnectionAccept, 2, Duration::from_secs(2))
        .await;

    adapter
        .handle_message(peer_message(&options, MessageType::ConnectionReady))
        .await
        .unwrap();

    // The accept ticker stopped with the transition.
    sleep(Duration::from_millis(50)).await;
    let accepts = uplink.count_kind(MessageType::ConnectionAccept);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(uplink.count_kind(MessageType::ConnectionAccept), accepts);

    adapter.stop().await.unwrap();
    assert_eq!(uplink.count_kind(MessageType::ConnectionClose), 1);
}

#[tokio::test]
async fn test_accept_failure_reports_target_and_cause() {
    init_tracing();

    // Bind and drop a listener to get a port with nothing listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let uplink = RecordingUplink::new();
    let options = test_options(addr.to_string());
    let mut adapter = ConnectionAdapter::new_inbound(options, test_config(), uplink.clone());

    let err = adapter.start().await.unwrap_err();
    match &err {
        Error::LocalOpenFailed { target, .. } => assert_eq!(target, &addr.to_string()),
        other => panic!("expected LocalOpenFailed, got {:?}", other),
    }
    let text = err.to_string().to_lowercase();
    assert!(text.contains(&addr.port().to_string()));
    assert!(text.contains("connection refused"));

    // Exactly one connection-failed message, naming the target and the cause.
    let failed = uplink.messages_of_kind(MessageType::ConnectionFailed);
    assert_eq!(failed.len(), 1);
    let reason = String::from_utf8(failed[0].body.to_vec())
        .unwrap()
        .to_lowercase();
    assert!(reason.contains(&addr.port().to_string()));
    assert!(reason.contains("connection refused"));
}

#[tokio::test]
async fn test_established_data_flow_over_local_bridge() {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stream_tx, stream_rx) = oneshot::channel::<TcpStream>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = stream_tx.send(stream);
    });

    let uplink = RecordingUplink::new();
    let options = test_options(addr.to_string());
    let mut adapter = ConnectionAdapter::new_inbound(options.clone(), test_config(), uplink.clone());

    adapter.start().await.unwrap();
    let mut stream = tokio::time::timeout(Duration::from_secs(2), stream_rx)
        .await
        .expect("local connection not established")
        .unwrap();

    adapter
        .handle_message(peer_message(&options, MessageType::ConnectionReady))
        .await
        .unwrap();

    // Bytes written by the local endpoint become sequenced data messages.
    stream.write_all(b"ping").await.unwrap();
    uplink
        .wait_for_kind(MessageType::Data, 1, Duration::from_secs(2))
        .await;
    let sent = uplink.messages_of_kind(MessageType::Data);
    let data = Data::decode(&mut sent[0].body.clone()).unwrap();
    assert_eq!(data.seq, 0);
    assert_eq!(&data.payload[..], b"ping");

    // The peer's ack is accepted without error.
    let mut ack = peer_message(&options, MessageType::DataAck);
    ack.body = DataAck {
        seq: 0,
        retransmitted: false,
    }
    .to_body();
    adapter.handle_message(ack).await.unwrap();

    // Data from the peer is acked and delivered to the local endpoint.
    let mut inbound = peer_message(&options, MessageType::Data);
    inbound.body = Data {
        seq: 0,
        retransmitted: false,
        payload: bytes::Bytes::from_static(b"pong"),
    }
    .to_body();
    adapter.handle_message(inbound).await.unwrap();

    assert_eq!(uplink.count_kind(MessageType::DataAck), 1);
    let mut buf = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("payload not delivered to the local endpoint")
        .unwrap();
    assert_eq!(&buf, b"pong");

    adapter.stop().await.unwrap();
    assert_eq!(uplink.count_kind(MessageType::ConnectionClose), 1);
}
