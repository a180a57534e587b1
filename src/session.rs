//! The client session: connection lifecycle, request correlation, and the
//! acknowledgment flows of every `QoS` level.

use std::{
    error::Error,
    fmt, io,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, error, info, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{watch, Mutex as AsyncMutex},
    time::{self, Instant},
};

use crate::{
    connection::{self, ConnectionReader, ConnectionWriter, TransportEvent},
    constants::SUBACK_FAILURE,
    frame::Frame,
    frame_buffer::FrameBuffer,
    options::ConnectionOptions,
    packets::{
        ack_packets::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
        conn_ack_packet::ConnectReturnCode,
        disconnect_packet::DisconnectPacket,
        ping_req_packet::PingReqPacket,
        publish_packet::PublishPacket,
        subscribe_packet::{SubscribePacket, SubscribeTopic},
        unsubscribe_packet::UnsubscribePacket,
        Packet, PacketError,
    },
    protocol::{packet_type::PacketType, qos::QoS},
    topic,
    watcher::{WatchError, Watcher},
};

#[derive(Debug)]
pub enum SessionError {
    /// Opening the transport failed.
    Transport(io::Error),

    /// Writing to the transport failed.
    TransportSend(io::Error),

    Packet(PacketError),

    /// No response of the given type arrived in time.
    Timeout(PacketType),

    /// The session was torn down while the request was pending.
    Cancelled,

    /// The broker answered CONNECT with a non-zero return code.
    ConnectionRefused(u8),

    /// The broker answered SUBSCRIBE with `SUBACK_FAILURE` for this filter.
    SubscriptionFailure(String),

    DuplicateSubscription(String),
    NotConnected,
    AlreadyConnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::TransportSend(e) => write!(f, "Failed to send packet: {e}"),
            Self::Packet(e) => write!(f, "{e}"),
            Self::Timeout(packet_type) => write!(f, "Timed out waiting for {packet_type}"),
            Self::Cancelled => write!(f, "Request cancelled by disconnect"),
            Self::ConnectionRefused(code) => match ConnectReturnCode::from_u8(*code) {
                Some(reason) => write!(f, "Connection refused: {reason} ({code})"),
                None => write!(f, "Connection refused with code {code}"),
            },
            Self::SubscriptionFailure(topic) => write!(f, "Subscription to {topic} failed"),
            Self::DuplicateSubscription(topic) => write!(f, "Already subscribed to {topic}"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::AlreadyConnected => write!(f, "Already connected"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(e) | Self::TransportSend(e) => Some(e),
            Self::Packet(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PacketError> for SessionError {
    fn from(e: PacketError) -> Self {
        Self::Packet(e)
    }
}

/// An application message delivered to a subscription callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub packet_id: Option<u16>,
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,

    /// Topic levels matched by `+` wildcards of the subscription filter.
    pub captures: Vec<String>,
}

/// Invoked on the dispatch task for every message matching its filter.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle state, tagged with the connection attempt it belongs to.
struct Status {
    state: ConnectionState,
    connection: u64,
}

struct Inner {
    options: ConnectionOptions,
    status: Mutex<Status>,
    writer: AsyncMutex<Option<ConnectionWriter>>,
    watcher: Watcher<Packet>,
    subscriptions: DashMap<String, MessageCallback>,
    next_packet_id: AtomicU16,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl Inner {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self) -> MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A client session with one broker.
///
/// Cloning is cheap and every clone drives the same connection. Sessions do not
/// reconnect: once disconnected, a new connection is made with [`Session::connect`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                status: Mutex::new(Status { state: ConnectionState::Disconnected, connection: 0 }),
                writer: AsyncMutex::new(None),
                watcher: Watcher::new(),
                subscriptions: DashMap::new(),
                next_packet_id: AtomicU16::new(1),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Opens a TCP connection to the configured broker and performs the handshake.
    ///
    /// # Errors
    /// - Returns `SessionError::AlreadyConnected` unless the session is disconnected.
    /// - Returns `SessionError::Transport` if the TCP connection cannot be opened.
    /// - Returns the handshake errors of [`Session::connect_with`].
    pub async fn connect(&self) -> Result<u8, SessionError> {
        let connection = self.begin_connecting()?;

        let address = self.inner.options.socket_address();
        debug!("Connecting to {address}");

        match TcpStream::connect(&address).await {
            Ok(stream) => self.establish(stream, connection).await,
            Err(e) => {
                self.inner.status().state = ConnectionState::Disconnected;
                Err(SessionError::Transport(e))
            }
        }
    }

    /// Performs the handshake over an already open stream.
    ///
    /// Returns the CONNACK return code. On success the keepalive ping starts. On
    /// failure the stream is closed.
    ///
    /// # Errors
    /// - Returns `SessionError::AlreadyConnected` unless the session is disconnected.
    /// - Returns `SessionError::ConnectionRefused` if CONNACK carries a non-zero code.
    /// - Returns `SessionError::Timeout` if no CONNACK arrives in time.
    pub async fn connect_with<S>(&self, stream: S) -> Result<u8, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let connection = self.begin_connecting()?;
        self.establish(stream, connection).await
    }

    /// Moves to `Connecting` and numbers the new connection attempt.
    fn begin_connecting(&self) -> Result<u64, SessionError> {
        let mut status = self.inner.status();
        if status.state != ConnectionState::Disconnected {
            return Err(SessionError::AlreadyConnected);
        }

        status.state = ConnectionState::Connecting;
        status.connection = status.connection.wrapping_add(1);
        Ok(status.connection)
    }

    async fn establish<S>(&self, stream: S, connection: u64) -> Result<u8, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = connection::split(stream);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        *self.inner.shutdown() = Some(shutdown_tx);
        *self.inner.writer.lock().await = Some(writer);

        tokio::spawn(self.clone().read_loop(reader, shutdown_rx.clone(), connection));

        let connect = Packet::Connect(self.inner.options.connect_packet());
        let response = match self.request(connect, PacketType::ConnAck, None).await {
            Ok(response) => response,
            Err(e) => {
                self.teardown(Some(connection)).await;
                return Err(e);
            }
        };

        let conn_ack = match response {
            Packet::ConnAck(conn_ack) => conn_ack,
            other => {
                self.teardown(Some(connection)).await;
                return Err(SessionError::Packet(PacketError::ProtocolError(Some(format!(
                    "Expected CONNACK, got {other}"
                )))));
            }
        };

        if !conn_ack.accepted() {
            warn!("Connection refused with code {}", conn_ack.return_code);
            self.teardown(Some(connection)).await;
            return Err(SessionError::ConnectionRefused(conn_ack.return_code));
        }

        let established = {
            let mut status = self.inner.status();
            let current =
                status.connection == connection && status.state == ConnectionState::Connecting;
            if current {
                status.state = ConnectionState::Connected;
            }
            current
        };

        // Torn down between CONNACK and here, release what is left of this connection
        if !established {
            self.teardown(Some(connection)).await;
            return Err(SessionError::Cancelled);
        }

        info!("Connected, session present: {}", conn_ack.session_present);

        tokio::spawn(self.clone().keep_alive(shutdown_rx));

        Ok(conn_ack.return_code)
    }

    /// Sends PINGREQ and waits for PINGRESP.
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.request(Packet::PingReq(PingReqPacket), PacketType::PingResp, None).await?;

        Ok(())
    }

    /// Subscribes to `topic` with a generated packet identifier.
    ///
    /// Returns the return codes of the SUBACK in request order, i.e. the granted `QoS`.
    pub async fn subscribe<F>(
        &self,
        topic: &str,
        qos: QoS,
        callback: F,
    ) -> Result<Vec<u8>, SessionError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe_with_id(topic, qos, None, callback).await
    }

    /// Subscribes to `topic` and registers `callback` once the broker accepts.
    ///
    /// # Errors
    /// - Returns `SessionError::DuplicateSubscription` before any I/O if `topic`
    ///   already has a callback.
    /// - Returns `SessionError::SubscriptionFailure` if the broker answers `SUBACK_FAILURE`.
    /// - Returns `SessionError::Packet` if `packet_id` is `Some(0)`.
    pub async fn subscribe_with_id<F>(
        &self,
        topic: &str,
        qos: QoS,
        packet_id: Option<u16>,
        callback: F,
    ) -> Result<Vec<u8>, SessionError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        if self.inner.subscriptions.contains_key(topic) {
            return Err(SessionError::DuplicateSubscription(topic.to_string()));
        }

        self.ensure_connected()?;

        let packet_id = packet_id.unwrap_or_else(|| self.next_packet_id());
        let subscribe = Packet::Subscribe(SubscribePacket {
            packet_id,
            topics: vec![SubscribeTopic::new(topic, qos)],
        });

        let return_codes = match self.request(subscribe, PacketType::SubAck, Some(packet_id)).await? {
            Packet::SubAck(sub_ack) => sub_ack.return_codes,
            _ => Vec::new(),
        };

        if return_codes.is_empty() {
            return Err(SessionError::Packet(PacketError::MalformedPacket(Some(
                "SUBACK without return code".into(),
            ))));
        }

        if return_codes.contains(&SUBACK_FAILURE) {
            return Err(SessionError::SubscriptionFailure(topic.to_string()));
        }

        match self.inner.subscriptions.entry(topic.to_string()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSubscription(topic.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(callback));
                Ok(return_codes)
            }
        }
    }

    /// Unsubscribes from `topic` and drops its callback once the broker acknowledges.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let packet_id = self.next_packet_id();
        let unsubscribe =
            Packet::Unsubscribe(UnsubscribePacket { packet_id, topics: vec![topic.to_string()] });

        self.request(unsubscribe, PacketType::UnsubAck, Some(packet_id)).await?;
        self.inner.subscriptions.remove(topic);

        Ok(())
    }

    /// Filters with a registered callback.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Publishes `payload` on `topic`, without DUP or RETAIN.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> Result<(), SessionError> {
        self.publish_packet(PublishPacket::new(topic, payload, qos)).await
    }

    /// Publishes `packet` and completes the acknowledgment flow of its `QoS`.
    ///
    /// A `QoS` > 0 packet without identifier gets a generated one. A failed step
    /// aborts the remaining steps.
    ///
    /// # Errors
    /// - Returns `SessionError::Timeout` naming the acknowledgment that did not arrive.
    /// - Returns `SessionError::TransportSend` if a write fails.
    pub async fn publish_packet(&self, mut packet: PublishPacket) -> Result<(), SessionError> {
        self.ensure_connected()?;

        match packet.qos {
            QoS::AtMostOnce => {
                packet.packet_id = None;
                self.send(&Packet::Publish(packet)).await
            }
            QoS::AtLeastOnce => {
                let packet_id = *packet.packet_id.get_or_insert_with(|| self.next_packet_id());

                self.request(Packet::Publish(packet), PacketType::PubAck, Some(packet_id)).await?;
                Ok(())
            }
            QoS::ExactlyOnce => {
                let packet_id = *packet.packet_id.get_or_insert_with(|| self.next_packet_id());

                self.request(Packet::Publish(packet), PacketType::PubRec, Some(packet_id)).await?;

                let pub_rel = Packet::PubRel(PubRelPacket::new(packet_id));
                self.request(pub_rel, PacketType::PubComp, Some(packet_id)).await?;
                Ok(())
            }
        }
    }

    /// Closes the session.
    ///
    /// Cancels pending requests, stops the keepalive ping, sends DISCONNECT if
    /// connected and closes the transport. Does nothing if already disconnected.
    pub async fn disconnect(&self) {
        self.teardown(None).await;
    }

    /// Allocates the next packet identifier, wrapping from 65535 back to 1.
    pub(crate) fn next_packet_id(&self) -> u16 {
        let next = |packet_id: u16| Some(if packet_id == u16::MAX { 1 } else { packet_id + 1 });

        self.inner
            .next_packet_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, next)
            .unwrap_or_else(|packet_id| packet_id)
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    async fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        match self.inner.writer.lock().await.as_mut() {
            Some(writer) => writer.write_packet(packet).await,
            None => Err(SessionError::NotConnected),
        }
    }

    /// Sends `packet` and waits for the response of type `expected`.
    async fn request(
        &self,
        packet: Packet,
        expected: PacketType,
        packet_id: Option<u16>,
    ) -> Result<Packet, SessionError> {
        let watching = self.inner.watcher.watch(
            move |response: &Packet| response.is(expected, packet_id),
            Some(self.inner.options.response_timeout),
        );

        // A failed send drops `watching`, which unregisters it
        self.send(&packet).await?;

        watching.wait().await.map_err(|e| match e {
            WatchError::Timeout => SessionError::Timeout(expected),
            WatchError::Cancelled => SessionError::Cancelled,
        })
    }

    /// Ends `connection`, or whatever connection is current when `None`.
    ///
    /// A stale connection number makes this a no-op, so a read loop that outlived
    /// its connection can not end a newer one.
    async fn teardown(&self, connection: Option<u64>) {
        // Held until the resources are taken, a new connection installs its writer after
        let mut writer_slot = self.inner.writer.lock().await;

        let previous = {
            let mut status = self.inner.status();
            if connection.is_some_and(|connection| connection != status.connection) {
                return;
            }
            std::mem::replace(&mut status.state, ConnectionState::Disconnected)
        };

        self.inner.watcher.clear();

        let shutdown = self.inner.shutdown().take();
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }

        let writer = writer_slot.take();
        drop(writer_slot);

        if let Some(mut writer) = writer {
            if previous == ConnectionState::Connected {
                let disconnect = Packet::Disconnect(DisconnectPacket);
                if let Err(e) = writer.write_packet(&disconnect).await {
                    debug!("Failed to send DISCONNECT: {e}");
                }
            }

            if let Err(e) = writer.shutdown().await {
                debug!("Failed to close transport: {e}");
            }
        }

        if previous != ConnectionState::Disconnected {
            info!("Disconnected");
        }
    }

    async fn keep_alive(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.inner.options.ping_interval;
        let mut interval = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                _ = interval.tick() => {
                    match self.ping().await {
                        Ok(()) => trace!("Keepalive ping answered"),
                        Err(SessionError::Cancelled | SessionError::NotConnected) => return,
                        Err(e) => warn!("Keepalive ping failed: {e}"),
                    }
                }
            }
        }
    }

    async fn read_loop(
        self,
        mut reader: ConnectionReader,
        mut shutdown: watch::Receiver<bool>,
        connection: u64,
    ) {
        let mut buffer = FrameBuffer::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                event = reader.next_event() => event,
            };

            match event {
                TransportEvent::Data(data) => {
                    trace!("Received bytes << {}", hex::encode(&data));
                    buffer.push(&data);

                    for frame in buffer.frames() {
                        match frame {
                            Ok(frame) => {
                                if !self.handle_frame(frame).await {
                                    self.teardown(Some(connection)).await;
                                    return;
                                }
                            }
                            Err(e) => error!("Discarding inbound bytes: {e}"),
                        }
                    }
                }
                TransportEvent::End => {
                    warn!("Connection closed by peer");
                    self.teardown(Some(connection)).await;
                    return;
                }
                TransportEvent::Error(e) => {
                    warn!("Connection error: {e}");
                    self.teardown(Some(connection)).await;
                    return;
                }
            }
        }
    }

    /// Processes one inbound frame. Returns `false` once the session must end.
    async fn handle_frame(&self, frame: Frame) -> bool {
        let packet = match Packet::decode(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                error!("Dropping frame with control byte {:#04x}: {e}", frame.control);
                return true;
            }
        };

        debug!("Received packet << {packet}");

        self.inner.watcher.resolve(&packet);

        match packet {
            Packet::Publish(publish) => {
                self.acknowledge(&publish).await;
                self.deliver(publish);
                true
            }
            Packet::Disconnect(_) => false,
            _ => true,
        }
    }

    async fn acknowledge(&self, publish: &PublishPacket) {
        let Some(packet_id) = publish.packet_id else {
            return;
        };

        match publish.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                if let Err(e) = self.send(&Packet::PubAck(PubAckPacket::new(packet_id))).await {
                    error!("Failed to send PUBACK for {packet_id}: {e}");
                }
            }
            QoS::ExactlyOnce => {
                let pub_rel = self.inner.watcher.watch(
                    move |packet: &Packet| packet.is(PacketType::PubRel, Some(packet_id)),
                    Some(self.inner.options.response_timeout),
                );

                if let Err(e) = self.send(&Packet::PubRec(PubRecPacket::new(packet_id))).await {
                    error!("Failed to send PUBREC for {packet_id}: {e}");
                    return;
                }

                let session = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = pub_rel.wait().await {
                        warn!("No PUBREL for {packet_id}: {e}");
                        return;
                    }

                    let pub_comp = Packet::PubComp(PubCompPacket::new(packet_id));
                    if let Err(e) = session.send(&pub_comp).await {
                        error!("Failed to send PUBCOMP for {packet_id}: {e}");
                    }
                });
            }
        }
    }

    /// Invokes every callback whose filter matches the topic of `publish`.
    fn deliver(&self, publish: PublishPacket) {
        let matching: Vec<(MessageCallback, Vec<String>)> = self
            .inner
            .subscriptions
            .iter()
            .filter_map(|entry| {
                let found = topic::matches(&publish.topic, entry.key());
                found.is_match().then(|| (entry.value().clone(), found.into_captures()))
            })
            .collect();

        if matching.is_empty() {
            debug!("No subscription matches {}", publish.topic);
            return;
        }

        let PublishPacket { topic, payload, qos, dup, retain, packet_id } = publish;

        for (callback, captures) in matching {
            let message = Message {
                topic: topic.clone(),
                payload: payload.clone(),
                packet_id,
                qos,
                dup,
                retain,
                captures,
            };
            callback(&message);
        }
    }
}
