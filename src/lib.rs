//! # libmqtt - embedded MQTT 3.1.1 client
//!
//! A lightweight MQTT 3.1.1 client for embedded systems and `no_std`
//! environments. The client drives a single broker connection through the
//! CONNECT/SUBSCRIBE/PUBLISH/PING/DISCONNECT exchanges over any byte-stream
//! transport the host supplies, using caller-owned fixed-size buffers and no
//! dynamic allocation on the hot path.
//!
//! ## Features
//!
//! - MQTT 3.1.1 (protocol level 4) compliance
//! - Quality of Service (QoS) levels 0, 1, and 2
//! - Keep-alive with automatic PINGREQ emission and lapse detection
//! - Last-will, username and password connect options
//! - Topic filter matching with `+` and `#` wildcards
//! - Connection agnostic: works with any transport implementing the
//!   [`network`] traits
//! - Deterministic memory use: the session borrows two caller-provided
//!   buffers that bound the maximum packet size
//!
//! ## Design
//!
//! The client is a blocking state machine. Every public call serialises a
//! packet into the send buffer, hands it to the transport under a deadline,
//! and, where the protocol demands an acknowledgement, drives the packet
//! cycle until the expected packet type arrives or the command timeout
//! expires. Inbound PUBLISH traffic is serviced by [`mqtt::Client::poll`],
//! which the application calls periodically.
//!
//! Exclusive access is expressed through `&mut self`: there is no internal
//! lock. A host that services the connection from a background thread wraps
//! the client in its platform's mutex and takes it for each call.
//!
//! ## Example
//!
//! ```rust,no_run
//! use libmqtt::mqtt::{Client, ConnectOptions, Message, QoS};
//! use libmqtt::network::{Close, Connection, Read, Write};
//! use libmqtt::platform::Timer;
//! # struct MockConnection;
//! # impl Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! # }
//! # impl Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connection for MockConnection {}
//! # #[derive(Default)]
//! # struct MockTimer;
//! # impl Timer for MockTimer {
//! #     fn countdown(&mut self, _ms: u32) {}
//! #     fn left(&self) -> u32 { 0 }
//! #     fn expired(&self) -> bool { true }
//! # }
//!
//! let mut send_buf = [0u8; 512];
//! let mut recv_buf = [0u8; 512];
//! let connection = MockConnection; // an established transport
//! let mut client: Client<'_, MockConnection, MockTimer> =
//!     Client::new(connection, 1_000, &mut send_buf, &mut recv_buf);
//!
//! let options = ConnectOptions {
//!     client_id: "sensor_device_01",
//!     keep_alive_seconds: 60,
//!     ..Default::default()
//! };
//!
//! // client.connect(&options)?;
//! // client.subscribe("commands/#", QoS::AtLeastOnce)?;
//! // client.publish("sensors/temperature", &mut Message::new(b"23.5", QoS::AtMostOnce))?;
//! // client.poll(100)?; // service inbound traffic and keep-alive
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support, including the
//!   `platform::SysTimer` deadline timer (default: disabled)
//! - `defmt`: Enable defmt formatting support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Transport abstraction: deadline-bounded byte channels and the common
/// error type shared by every fallible operation in this crate.
pub mod network;

/// Platform primitives required by the session: the countdown
/// [`Timer`](platform::Timer) contract and, with the `std` feature, a
/// monotonic implementation.
pub mod platform;

/// The MQTT 3.1.1 protocol core: wire codec, topic filter matching and the
/// client session state machine.
pub mod mqtt;
