use std::time::Duration;

use bytes::Bytes;

use crate::{
    constants::{DEFAULT_KEEP_ALIVE, DEFAULT_PING_INTERVAL, DEFAULT_PORT, DEFAULT_RESPONSE_TIMEOUT},
    packets::connect_packet::{ConnectPacket, Will},
};

/// Settings of a [`Session`](crate::session::Session).
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub(crate) address: String,
    pub(crate) client_id: String,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<Bytes>,
    pub(crate) clean_session: bool,
    pub(crate) will: Option<Will>,
    pub(crate) keep_alive: u16,
    pub(crate) ping_interval: Duration,
    pub(crate) response_timeout: Duration,
}

impl ConnectionOptions {
    /// Options for the broker at `address`, either `host[:port]` or `tcp://host[:port]`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client_id: String::new(),
            username: None,
            password: None,
            clean_session: true,
            will: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            ping_interval: DEFAULT_PING_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// An empty client id lets the session generate one.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<Bytes>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    /// Keep alive in seconds, advertised to the broker in CONNECT.
    pub fn keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Period of the keepalive ping once connected.
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// How long a request waits for its acknowledgment.
    pub fn response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// The `host:port` to open a TCP connection to.
    pub fn socket_address(&self) -> String {
        let address = self.address.strip_prefix("tcp://").unwrap_or(&self.address);
        let address = address.trim_end_matches('/');

        let has_port = match address.rsplit_once(':') {
            // "[::1]" has colons but no port
            Some((host, port)) => !port.is_empty() && !port.ends_with(']') && !host.is_empty(),
            None => false,
        };

        if has_port {
            address.to_string()
        } else {
            format!("{address}:{DEFAULT_PORT}")
        }
    }

    pub(crate) fn connect_packet(&self) -> ConnectPacket {
        ConnectPacket {
            client_id: self.client_id.clone(),
            clean_session: self.clean_session,
            keep_alive: self.keep_alive,
            will: self.will.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
