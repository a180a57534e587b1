//! An asynchronous MQTT 3.1.1 client.
//!
//! [`Session`] owns one connection to a broker and exposes connect, subscribe,
//! unsubscribe, publish, ping and disconnect. The wire codec ([`Packet`], [`Frame`],
//! [`FrameBuffer`]), the response correlation ([`Watcher`]) and the topic matcher
//! ([`topic::matches`]) are usable on their own.

pub(crate) mod connection;
pub(crate) mod constants;
pub mod frame;
pub mod frame_buffer;
pub mod options;
pub mod packets;
pub mod protocol;
pub mod session;
pub mod topic;
pub mod watcher;

pub use constants::SUBACK_FAILURE;
pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use options::ConnectionOptions;
pub use packets::{
    connect_packet::Will, DecodablePacket, EncodablePacket, Packet, PacketError,
};
pub use protocol::{packet_type::PacketType, qos::QoS};
pub use session::{ConnectionState, Message, MessageCallback, Session, SessionError};
pub use topic::TopicMatch;
pub use watcher::{WatchError, Watcher, Watching};
