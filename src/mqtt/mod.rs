//! MQTT 3.1.1 protocol implementation for embedded systems.
//!
//! This module contains the protocol core: the wire codec over
//! caller-supplied buffers ([`packet`]), topic filter matching with
//! wildcards ([`topic`]), and the client session state machine
//! ([`client`]).
//!
//! # Protocol Overview
//!
//! MQTT uses a publish-subscribe pattern where:
//! - **Publishers** send messages to topics
//! - **Subscribers** receive messages from topics they're interested in
//! - **Brokers** route messages between publishers and subscribers
//!
//! The main entry point is [`Client`], which provides blocking methods for
//! connecting, publishing, subscribing, and servicing inbound traffic.
//! Each call is bounded by the session's command timeout, and keep-alive
//! pings are emitted automatically while [`Client::poll`] or any waiting
//! call is driving the connection.

/// MQTT client implementation: the session state machine and public API.
pub mod client;

/// MQTT 3.1.1 wire codec: packet serialisation and deserialisation over
/// caller-owned buffers, plus the protocol-level types.
pub mod packet;

/// Topic name matching against subscription filters with `+` and `#`
/// wildcards.
pub mod topic;

pub use client::{Client, MessageHandler, OwnedMessage};
pub use packet::{
    Connack, ConnectOptions, ConnectReturnCode, Message, PacketType, QoS, SubackReturnCode, Will,
};
