use std::time::Duration;

use bytes::Bytes;
use mqtt_client::{
    packets::{
        ack_packets::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket},
        conn_ack_packet::ConnAckPacket,
        ping_resp_packet::PingRespPacket,
        publish_packet::PublishPacket,
        sub_ack_packet::SubAckPacket,
    },
    ConnectionOptions, ConnectionState, FrameBuffer, Message, Packet, PacketType, QoS, Session,
    SessionError,
};
use tokio::{
    io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::mpsc,
    time::{sleep, timeout},
};

/// Broker side of an in-memory connection, speaking through the crate's codec.
struct FakeBroker {
    stream: DuplexStream,
    buffer: FrameBuffer,
}

impl FakeBroker {
    /// Next packet from the client, `None` once the client closed the stream.
    async fn recv(&mut self) -> Option<Packet> {
        loop {
            if let Some(frame) = self.buffer.try_take_frame().unwrap() {
                return Some(Packet::decode(&frame).unwrap());
            }

            let mut chunk = [0u8; 1024];
            let read = timeout(Duration::from_secs(2), self.stream.read(&mut chunk))
                .await
                .expect("client went silent");

            match read {
                Ok(0) | Err(_) => return None,
                Ok(n) => self.buffer.push(&chunk[..n]),
            }
        }
    }

    async fn expect(&mut self) -> Packet {
        self.recv().await.expect("client closed the connection")
    }

    /// Asserts the client writes nothing for `window`.
    async fn assert_silent(&mut self, window: Duration) {
        assert!(self.buffer.is_empty(), "unexpected bytes buffered");

        let mut chunk = [0u8; 1024];
        if let Ok(Ok(n)) = timeout(window, self.stream.read(&mut chunk)).await {
            assert_eq!(n, 0, "unexpected bytes from client: {:02X?}", &chunk[..n]);
        }
    }

    async fn send(&mut self, packet: Packet) {
        self.send_all(&[packet]).await;
    }

    /// Writes all packets with a single write.
    async fn send_all(&mut self, packets: &[Packet]) {
        let mut bytes = Vec::new();
        for packet in packets {
            bytes.extend_from_slice(&packet.encode().unwrap().serialize());
        }
        self.stream.write_all(&bytes).await.unwrap();
    }
}

fn options() -> ConnectionOptions {
    ConnectionOptions::new("tcp://broker.test")
        .client_id("tester")
        .response_timeout(Duration::from_secs(2))
        .ping_interval(Duration::from_secs(3600))
}

fn conn_ack(return_code: u8) -> Packet {
    Packet::ConnAck(ConnAckPacket { session_present: false, return_code })
}

async fn connected(options: ConnectionOptions) -> (Session, FakeBroker) {
    let (client, server) = duplex(64 * 1024);
    let session = Session::new(options);
    let mut broker = FakeBroker { stream: server, buffer: FrameBuffer::new() };

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_with(client).await })
    };

    match broker.expect().await {
        Packet::Connect(connect) => assert_eq!(connect.client_id, "tester"),
        other => panic!("expected CONNECT, got {other}"),
    }
    broker.send(conn_ack(0)).await;

    assert_eq!(connecting.await.unwrap().unwrap(), 0);
    assert!(session.is_connected());

    (session, broker)
}

fn collect_messages() -> (mpsc::UnboundedSender<Message>, mpsc::UnboundedReceiver<Message>) {
    mpsc::unbounded_channel()
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(Duration::from_secs(2), rx.recv()).await.expect("no message delivered").unwrap()
}

async fn subscribe(
    session: &Session,
    broker: &mut FakeBroker,
    filter: &str,
    tx: mpsc::UnboundedSender<Message>,
) {
    let subscribing = {
        let session = session.clone();
        let filter = filter.to_string();
        tokio::spawn(async move {
            session
                .subscribe(&filter, QoS::ExactlyOnce, move |message| {
                    let _ = tx.send(message.clone());
                })
                .await
        })
    };

    let Packet::Subscribe(request) = broker.expect().await else {
        panic!("expected SUBSCRIBE");
    };
    assert_eq!(request.topics[0].filter, filter);
    broker
        .send(Packet::SubAck(SubAckPacket { packet_id: request.packet_id, return_codes: vec![2] }))
        .await;

    assert_eq!(subscribing.await.unwrap().unwrap(), vec![2]);
}

#[tokio::test]
async fn connect_refused_starts_no_keepalive() {
    let (client, server) = duplex(4096);
    let session = Session::new(options().ping_interval(Duration::from_millis(50)));
    let mut broker = FakeBroker { stream: server, buffer: FrameBuffer::new() };

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_with(client).await })
    };

    assert!(matches!(broker.expect().await, Packet::Connect(_)));
    broker.send(conn_ack(5)).await;

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(SessionError::ConnectionRefused(5))));
    assert_eq!(session.state(), ConnectionState::Disconnected);

    sleep(Duration::from_millis(150)).await;

    // The transport is closed without DISCONNECT or PINGREQ
    assert_eq!(broker.recv().await, None);
}

#[tokio::test]
async fn connect_times_out_without_conn_ack() {
    let (client, server) = duplex(4096);
    let session = Session::new(options().response_timeout(Duration::from_millis(100)));
    let mut broker = FakeBroker { stream: server, buffer: FrameBuffer::new() };

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_with(client).await })
    };
    assert!(matches!(broker.expect().await, Packet::Connect(_)));

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(SessionError::Timeout(PacketType::ConnAck))));
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let (session, _broker) = connected(options()).await;
    let (client, _server) = duplex(64);

    assert!(matches!(session.connect_with(client).await, Err(SessionError::AlreadyConnected)));
}

#[tokio::test]
async fn ping_waits_for_ping_resp() {
    let (session, mut broker) = connected(options()).await;

    let pinging = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };

    assert!(matches!(broker.expect().await, Packet::PingReq(_)));
    broker.send(Packet::PingResp(PingRespPacket)).await;

    pinging.await.unwrap().unwrap();
}

#[tokio::test]
async fn keepalive_pings_periodically() {
    let (_session, mut broker) = connected(options().ping_interval(Duration::from_millis(50))).await;

    for _ in 0..2 {
        assert!(matches!(broker.expect().await, Packet::PingReq(_)));
        broker.send(Packet::PingResp(PingRespPacket)).await;
    }
}

#[tokio::test]
async fn duplicate_subscription_is_rejected_before_io() {
    let (session, mut broker) = connected(options()).await;
    let (tx, _rx) = collect_messages();
    subscribe(&session, &mut broker, "a/+", tx).await;

    let result = session.subscribe("a/+", QoS::AtMostOnce, |_| {}).await;
    assert!(matches!(result, Err(SessionError::DuplicateSubscription(topic)) if topic == "a/+"));

    // Nothing was written for the rejected call
    let pinging = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    assert!(matches!(broker.expect().await, Packet::PingReq(_)));
    broker.send(Packet::PingResp(PingRespPacket)).await;
    pinging.await.unwrap().unwrap();
}

#[tokio::test]
async fn rejected_subscription_registers_no_callback() {
    let (session, mut broker) = connected(options()).await;

    let subscribing = {
        let session = session.clone();
        tokio::spawn(async move { session.subscribe("secret/#", QoS::AtMostOnce, |_| {}).await })
    };

    let Packet::Subscribe(request) = broker.expect().await else {
        panic!("expected SUBSCRIBE");
    };
    broker
        .send(Packet::SubAck(SubAckPacket {
            packet_id: request.packet_id,
            return_codes: vec![0x80],
        }))
        .await;

    let result = subscribing.await.unwrap();
    assert!(matches!(result, Err(SessionError::SubscriptionFailure(topic)) if topic == "secret/#"));
    assert!(session.subscriptions().is_empty());
}

#[tokio::test]
async fn publish_qos0_is_fire_and_forget() {
    let (session, mut broker) = connected(options()).await;

    session.publish("a/b", "hello", QoS::AtMostOnce).await.unwrap();

    let Packet::Publish(publish) = broker.expect().await else {
        panic!("expected PUBLISH");
    };
    assert_eq!(publish.qos, QoS::AtMostOnce);
    assert_eq!(publish.packet_id, None);
    assert_eq!(publish.payload, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn publish_qos1_waits_for_pub_ack() {
    let (session, mut broker) = connected(options()).await;

    let publishing = {
        let session = session.clone();
        tokio::spawn(async move { session.publish("a/b", "hello", QoS::AtLeastOnce).await })
    };

    let Packet::Publish(publish) = broker.expect().await else {
        panic!("expected PUBLISH");
    };
    let packet_id = publish.packet_id.unwrap();

    // An acknowledgment for another id does not complete the publish
    broker.send(Packet::PubAck(PubAckPacket::new(packet_id.wrapping_add(100)))).await;
    sleep(Duration::from_millis(50)).await;
    assert!(!publishing.is_finished());

    broker.send(Packet::PubAck(PubAckPacket::new(packet_id))).await;
    publishing.await.unwrap().unwrap();
}

#[tokio::test]
async fn publish_qos2_runs_full_handshake() {
    let (session, mut broker) = connected(options()).await;

    let publishing = {
        let session = session.clone();
        tokio::spawn(async move {
            let packet = PublishPacket {
                packet_id: Some(42),
                retain: true,
                ..PublishPacket::new("a/b", "exactly once", QoS::ExactlyOnce)
            };
            session.publish_packet(packet).await
        })
    };

    let Packet::Publish(publish) = broker.expect().await else {
        panic!("expected PUBLISH");
    };
    assert_eq!(publish.packet_id, Some(42));
    assert!(publish.retain);

    broker.send(Packet::PubRec(PubRecPacket::new(42))).await;
    assert_eq!(broker.expect().await, Packet::PubRel(PubRelPacket::new(42)));

    broker.send(Packet::PubComp(PubCompPacket::new(42))).await;
    publishing.await.unwrap().unwrap();
}

#[tokio::test]
async fn publish_qos2_times_out_without_pub_comp() {
    let (session, mut broker) =
        connected(options().response_timeout(Duration::from_millis(200))).await;

    let publishing = {
        let session = session.clone();
        tokio::spawn(async move { session.publish("a/b", "x", QoS::ExactlyOnce).await })
    };

    let Packet::Publish(publish) = broker.expect().await else {
        panic!("expected PUBLISH");
    };
    let packet_id = publish.packet_id.unwrap();
    broker.send(Packet::PubRec(PubRecPacket::new(packet_id))).await;
    assert!(matches!(broker.expect().await, Packet::PubRel(_)));

    let result = publishing.await.unwrap();
    assert!(matches!(result, Err(SessionError::Timeout(PacketType::PubComp))));
    assert!(session.is_connected());
}

#[tokio::test]
async fn publish_qos2_without_pub_rec_sends_no_pub_rel() {
    let (session, mut broker) =
        connected(options().response_timeout(Duration::from_millis(200))).await;

    let publishing = {
        let session = session.clone();
        tokio::spawn(async move { session.publish("a/b", "x", QoS::ExactlyOnce).await })
    };

    let Packet::Publish(publish) = broker.expect().await else {
        panic!("expected PUBLISH");
    };
    let packet_id = publish.packet_id.unwrap();

    let result = publishing.await.unwrap();
    assert!(matches!(result, Err(SessionError::Timeout(PacketType::PubRec))));

    // A late PUBREC no longer has a handshake to continue
    broker.send(Packet::PubRec(PubRecPacket::new(packet_id))).await;
    broker.assert_silent(Duration::from_millis(300)).await;
    assert!(session.is_connected());
}

#[tokio::test]
async fn inbound_qos1_is_acknowledged_and_delivered() {
    let (session, mut broker) = connected(options()).await;
    let (tx, mut rx) = collect_messages();
    subscribe(&session, &mut broker, "sensors/+/temp", tx).await;

    let publish = PublishPacket {
        packet_id: Some(7),
        ..PublishPacket::new("sensors/kitchen/temp", "21.5", QoS::AtLeastOnce)
    };
    broker.send(Packet::Publish(publish)).await;

    assert_eq!(broker.expect().await, Packet::PubAck(PubAckPacket::new(7)));

    let message = next_message(&mut rx).await;
    assert_eq!(message.topic, "sensors/kitchen/temp");
    assert_eq!(message.payload, Bytes::from_static(b"21.5"));
    assert_eq!(message.packet_id, Some(7));
    assert_eq!(message.qos, QoS::AtLeastOnce);
    assert_eq!(message.captures, vec!["kitchen".to_string()]);
}

#[tokio::test]
async fn inbound_qos2_completes_handshake() {
    let (session, mut broker) = connected(options()).await;
    let (tx, mut rx) = collect_messages();
    subscribe(&session, &mut broker, "cmd/#", tx).await;

    let publish = PublishPacket {
        packet_id: Some(9),
        dup: true,
        ..PublishPacket::new("cmd/reboot", "now", QoS::ExactlyOnce)
    };
    broker.send(Packet::Publish(publish)).await;

    assert_eq!(broker.expect().await, Packet::PubRec(PubRecPacket::new(9)));

    let message = next_message(&mut rx).await;
    assert_eq!(message.packet_id, Some(9));
    assert!(message.dup);

    broker.send(Packet::PubRel(PubRelPacket::new(9))).await;
    assert_eq!(broker.expect().await, Packet::PubComp(PubCompPacket::new(9)));
}

#[tokio::test]
async fn every_matching_filter_fires() {
    let (session, mut broker) = connected(options()).await;
    let (tx, mut rx) = collect_messages();
    subscribe(&session, &mut broker, "a/#", tx.clone()).await;
    subscribe(&session, &mut broker, "a/+", tx.clone()).await;
    subscribe(&session, &mut broker, "b/+", tx).await;

    broker.send(Packet::Publish(PublishPacket::new("a/x", "1", QoS::AtMostOnce))).await;

    let mut captures = vec![
        next_message(&mut rx).await.captures,
        next_message(&mut rx).await.captures,
    ];
    captures.sort();
    assert_eq!(captures, vec![Vec::<String>::new(), vec!["x".to_string()]]);

    sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn coalesced_frames_are_handled_in_order() {
    let (session, mut broker) = connected(options()).await;
    let (tx, mut rx) = collect_messages();
    subscribe(&session, &mut broker, "seq", tx).await;

    broker
        .send_all(&[
            Packet::Publish(PublishPacket::new("seq", "1", QoS::AtMostOnce)),
            Packet::Publish(PublishPacket::new("seq", "2", QoS::AtMostOnce)),
            Packet::Publish(PublishPacket::new("seq", "3", QoS::AtMostOnce)),
        ])
        .await;

    for expected in ["1", "2", "3"] {
        assert_eq!(next_message(&mut rx).await.payload, Bytes::from(expected));
    }
}

#[tokio::test]
async fn unsubscribe_drops_callback() {
    let (session, mut broker) = connected(options()).await;
    let (tx, mut rx) = collect_messages();
    subscribe(&session, &mut broker, "a/b", tx).await;

    let unsubscribing = {
        let session = session.clone();
        tokio::spawn(async move { session.unsubscribe("a/b").await })
    };

    let Packet::Unsubscribe(request) = broker.expect().await else {
        panic!("expected UNSUBSCRIBE");
    };
    assert_eq!(request.topics, vec!["a/b".to_string()]);
    broker.send(Packet::UnsubAck(UnsubAckPacket::new(request.packet_id))).await;
    unsubscribing.await.unwrap().unwrap();

    assert!(session.subscriptions().is_empty());

    broker.send(Packet::Publish(PublishPacket::new("a/b", "late", QoS::AtMostOnce))).await;
    sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_cancels_pending_requests() {
    let (session, mut broker) = connected(options()).await;

    let pinging = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    assert!(matches!(broker.expect().await, Packet::PingReq(_)));

    session.disconnect().await;

    assert!(matches!(pinging.await.unwrap(), Err(SessionError::Cancelled)));
    assert!(matches!(broker.expect().await, Packet::Disconnect(_)));
    assert_eq!(broker.recv().await, None);
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // A second call is a no-op
    session.disconnect().await;
}

#[tokio::test]
async fn peer_close_tears_session_down() {
    let (session, broker) = connected(options()).await;

    let pinging = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    sleep(Duration::from_millis(20)).await;

    drop(broker);

    assert!(matches!(pinging.await.unwrap(), Err(SessionError::Cancelled)));

    for _ in 0..100 {
        if session.state() == ConnectionState::Disconnected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("session still {:?}", session.state());
}

#[tokio::test]
async fn peer_disconnect_packet_tears_session_down() {
    let (session, mut broker) = connected(options()).await;

    broker.send(Packet::Disconnect(Default::default())).await;

    for _ in 0..100 {
        if !session.is_connected() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("session still connected");
}
