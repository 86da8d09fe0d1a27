//! An MQTT client session based on the MQTT 3.1.1 specification.
//!
//! The [`Client`] owns an established transport and borrows two
//! caller-provided buffers for its lifetime; their capacity bounds the
//! largest packet the session can send or receive. Every public method is
//! a blocking call bounded by the session's command timeout: it serialises
//! its packet into the send buffer, hands it to the transport, and, where
//! the protocol demands an acknowledgement, drives the packet cycle until
//! the expected packet type arrives, the connection is lost, or the
//! deadline expires.
//!
//! The packet cycle is the only place the transport is read. Besides
//! dispatching inbound packets it maintains the keep-alive contract:
//! whenever the keep-alive interval elapses without outbound traffic it
//! emits a PINGREQ, and a missing PINGRESP within the command timeout is
//! reported as a lost connection.
//!
//! # Concurrency
//!
//! All methods take `&mut self`; the exclusive borrow is the session's
//! mutual exclusion. A handler invoked during the cycle cannot re-enter
//! the client; the borrow checker rejects it. Hosts that service the
//! connection from a background thread wrap the client in their
//! platform's mutex and call [`Client::poll`] under it.

use crate::network::error::Error;
use crate::network::{Connection, Read, Write};
use crate::platform::Timer;
use heapless::{String, Vec};

use super::packet::{
    self, Connack, ConnectOptions, ConnectReturnCode, Message, PacketType, QoS, SubackReturnCode,
};

/// Largest packet identifier; the counter wraps back to 1 past it.
const MAX_PACKET_ID: u16 = 65_535;

/// The callback invoked for every inbound PUBLISH.
///
/// Receives the topic name and the message; the message payload borrows
/// the session's receive buffer and must be copied (see
/// [`OwnedMessage`]) if it is needed after the callback returns.
pub type MessageHandler = dyn FnMut(&str, &Message<'_>);

/// An inbound message copied out of the session's receive buffer.
///
/// Handlers receive borrowed [`Message`]s; this is the owned snapshot for
/// hosts that queue messages for processing outside the callback.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OwnedMessage {
    /// The topic on which the message was published.
    pub topic: String<256>,
    /// The message payload data.
    pub payload: Vec<u8, 1024>,
    /// Delivery QoS granted by the broker.
    pub qos: QoS,
    /// Whether the message was a retained one.
    pub retained: bool,
}

impl OwnedMessage {
    /// Copy a delivery out of the receive buffer.
    ///
    /// Fails with [`Error::BufferSize`] if the topic or payload exceeds
    /// the fixed capacities.
    pub fn copy_from(topic: &str, message: &Message<'_>) -> Result<Self, Error> {
        Ok(Self {
            topic: String::try_from(topic).map_err(|_| Error::BufferSize)?,
            payload: Vec::from_slice(message.payload).map_err(|_| Error::BufferSize)?,
            qos: message.qos,
            retained: message.retained,
        })
    }
}

/// An MQTT 3.1.1 client session.
///
/// # Type Parameters
///
/// * `C` - The transport type implementing [`Connection`]
/// * `T` - The platform countdown timer; `T::default()` must produce an
///   expired timer
pub struct Client<'a, C: Connection, T: Timer + Default> {
    transport: C,
    send_buf: &'a mut [u8],
    recv_buf: &'a mut [u8],
    command_timeout_ms: u32,
    keep_alive_seconds: u16,
    next_packet_id: u16,
    connected: bool,
    ping_outstanding: bool,
    ping_timer: T,
    pingresp_timer: T,
    handler: Option<&'a mut MessageHandler>,
}

impl<C: Connection, T: Timer + Default> core::fmt::Debug for Client<'_, C, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("connected", &self.connected)
            .field("keep_alive_seconds", &self.keep_alive_seconds)
            .field("next_packet_id", &self.next_packet_id)
            .field("ping_outstanding", &self.ping_outstanding)
            .finish_non_exhaustive()
    }
}

impl<'a, C: Connection, T: Timer + Default> Client<'a, C, T> {
    /// Create a session over an established transport.
    ///
    /// No I/O is performed. `command_timeout_ms` is the deadline applied
    /// to every synchronous call; the buffers bound the maximum packet
    /// size in each direction and are borrowed for the client's lifetime.
    pub fn new(
        transport: C,
        command_timeout_ms: u32,
        send_buf: &'a mut [u8],
        recv_buf: &'a mut [u8],
    ) -> Self {
        Self {
            transport,
            send_buf,
            recv_buf,
            command_timeout_ms,
            keep_alive_seconds: 0,
            next_packet_id: 1,
            connected: false,
            ping_outstanding: false,
            ping_timer: T::default(),
            pingresp_timer: T::default(),
            handler: None,
        }
    }

    /// Register the callback invoked for every inbound PUBLISH, replacing
    /// any previous one.
    pub fn set_message_handler(&mut self, handler: &'a mut MessageHandler) {
        self.handler = Some(handler);
    }

    /// Tear down the session and hand the transport back, e.g. to close
    /// it or to connect again with fresh buffers.
    pub fn into_transport(self) -> C {
        self.transport
    }

    /// Whether a CONNACK with return code 0 has been observed and no loss
    /// of the connection has been detected since.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Establish the MQTT session: send CONNECT and wait for CONNACK.
    ///
    /// On success the session is connected and the keep-alive machinery
    /// is armed with the interval from `options`. A broker refusal is
    /// reported as [`Error::ConnectionRefused`] with the broker's return
    /// code.
    pub fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), Error> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }
        let mut deadline = T::default();
        deadline.countdown(self.command_timeout_ms);

        self.ping_outstanding = false;
        self.keep_alive_seconds = options.keep_alive_seconds;
        self.ping_timer
            .countdown(u32::from(self.keep_alive_seconds) * 1000);

        let len = packet::encode_connect(self.send_buf, options)?;
        self.send_packet(len, &deadline)?;
        self.wait_for(PacketType::Connack, &deadline)?;

        let Connack { code, .. } = packet::decode_connack(self.recv_buf)?;
        match code {
            ConnectReturnCode::Accepted => {
                self.connected = true;
                Ok(())
            }
            refused => Err(Error::ConnectionRefused(refused)),
        }
    }

    /// Subscribe to a topic filter and wait for the broker's SUBACK.
    ///
    /// Returns the broker's verdict: the granted maximum QoS, or
    /// [`SubackReturnCode::Failure`] if the broker refused the filter.
    pub fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<SubackReturnCode, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut deadline = T::default();
        deadline.countdown(self.command_timeout_ms);

        let id = self.next_id();
        let len = packet::encode_subscribe(self.send_buf, id, filter, qos)?;
        self.send_packet(len, &deadline)?;
        self.wait_for(PacketType::Suback, &deadline)?;

        let (_, code) = packet::decode_suback(self.recv_buf)?;
        Ok(code)
    }

    /// Unsubscribe from a topic filter and wait for UNSUBACK.
    pub fn unsubscribe(&mut self, filter: &str) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut deadline = T::default();
        deadline.countdown(self.command_timeout_ms);

        let id = self.next_id();
        let len = packet::encode_unsubscribe(self.send_buf, id, filter)?;
        self.send_packet(len, &deadline)?;
        self.wait_for(PacketType::Unsuback, &deadline)?;

        packet::decode_unsuback(self.recv_buf)?;
        Ok(())
    }

    /// Publish a message to a topic.
    ///
    /// For QoS ≥ 1 a fresh packet identifier is assigned into
    /// `message.id` and the call blocks until the handshake completes:
    /// PUBACK for QoS 1, PUBCOMP for QoS 2 (the intermediate
    /// PUBREC/PUBREL step is handled by the packet cycle). QoS 0 returns
    /// as soon as the packet is handed to the transport.
    pub fn publish(&mut self, topic: &str, message: &mut Message<'_>) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut deadline = T::default();
        deadline.countdown(self.command_timeout_ms);

        if message.qos != QoS::AtMostOnce {
            message.id = self.next_id();
        }
        let len = packet::encode_publish(self.send_buf, topic, message)?;
        self.send_packet(len, &deadline)?;

        match message.qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => {
                self.wait_for(PacketType::Puback, &deadline)?;
                packet::decode_ack(self.recv_buf)?;
                Ok(())
            }
            QoS::ExactlyOnce => {
                self.wait_for(PacketType::Pubcomp, &deadline)?;
                packet::decode_ack(self.recv_buf)?;
                Ok(())
            }
        }
    }

    /// Service the connection for `timeout_ms` milliseconds.
    ///
    /// Runs the packet cycle repeatedly: inbound publishes are delivered
    /// to the registered handler, QoS replies are sent, and keep-alive
    /// pings are emitted when due. This is the only way inbound traffic
    /// is processed between API calls, so hosts call it periodically.
    ///
    /// Returns immediately with `Ok(())` when the session is not
    /// connected. A detected connection loss clears the connected flag
    /// and is returned as [`Error::ConnectionLost`].
    pub fn poll(&mut self, timeout_ms: u32) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }
        let mut deadline = T::default();
        deadline.countdown(timeout_ms);

        loop {
            match self.cycle(&deadline) {
                Ok(_) => {}
                Err(Error::ConnectionLost) => {
                    self.connected = false;
                    return Err(Error::ConnectionLost);
                }
                Err(e) => return Err(e),
            }
            if deadline.expired() {
                return Ok(());
            }
        }
    }

    /// End the session: best-effort send of DISCONNECT.
    ///
    /// The connected flag is cleared whether or not the packet could be
    /// delivered.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let mut deadline = T::default();
        deadline.countdown(self.command_timeout_ms);

        let result = packet::encode_disconnect(self.send_buf)
            .and_then(|len| self.send_packet(len, &deadline));
        self.connected = false;
        result
    }

    fn next_id(&mut self) -> u16 {
        self.next_packet_id = if self.next_packet_id == MAX_PACKET_ID {
            1
        } else {
            self.next_packet_id + 1
        };
        self.next_packet_id
    }

    /// Write `length` bytes from the send buffer to the transport,
    /// issuing as many writes as needed within the deadline. A complete
    /// send restarts the keep-alive countdown.
    fn send_packet(&mut self, length: usize, deadline: &T) -> Result<(), Error> {
        let mut sent = 0;
        while sent < length && !deadline.expired() {
            match self
                .transport
                .write(&self.send_buf[sent..length], deadline.left())
            {
                Ok(n) => sent += n,
                Err(_) => break,
            }
        }
        if sent == length {
            self.ping_timer
                .countdown(u32::from(self.keep_alive_seconds) * 1000);
            Ok(())
        } else {
            Err(Error::ConnectionLost)
        }
    }

    /// Drive the cycle until the expected packet type arrives, the
    /// connection is lost, or the deadline expires. Unexpected packets
    /// and non-fatal cycle failures are skipped. A failed wait clears the
    /// connected flag.
    fn wait_for(&mut self, expected: PacketType, deadline: &T) -> Result<(), Error> {
        loop {
            if deadline.expired() {
                self.connected = false;
                return Err(Error::Timeout);
            }
            match self.cycle(deadline) {
                Ok(Some(packet_type)) if packet_type == expected => return Ok(()),
                Ok(_) => {}
                Err(Error::ConnectionLost) => {
                    self.connected = false;
                    return Err(Error::ConnectionLost);
                }
                Err(_) => {}
            }
        }
    }

    /// One iteration of the reactor: read at most one inbound packet,
    /// dispatch it, then attend to the keep-alive.
    ///
    /// `Ok(Some(_))` reports the packet type observed, `Ok(None)` that
    /// nothing arrived within the deadline (a packet the deadline cut
    /// short is dropped and reported the same way).
    /// [`Error::ConnectionLost`] is returned on a zero-byte read or a
    /// missed ping response; other errors are decode or reply-send
    /// failures for the current packet.
    fn cycle(&mut self, deadline: &T) -> Result<Option<PacketType>, Error> {
        let inbound = match self.read_packet(deadline) {
            Err(Error::ConnectionLost) => return Err(Error::ConnectionLost),
            other => other,
        };

        let status = match inbound {
            Ok(Some(packet_type)) => {
                self.dispatch(packet_type)?;
                Ok(Some(packet_type))
            }
            Ok(None) => Ok(None),
            // a malformed or oversized packet; keep the cycle alive so
            // the keep-alive still runs
            Err(e) => Err(e),
        };

        self.keepalive();

        if self.ping_outstanding && self.pingresp_timer.expired() {
            self.ping_outstanding = false;
            return Err(Error::ConnectionLost);
        }

        status
    }

    fn dispatch(&mut self, packet_type: PacketType) -> Result<(), Error> {
        match packet_type {
            // nothing to do; the type is reported so a waiting caller can
            // unblock
            PacketType::Connack
            | PacketType::Puback
            | PacketType::Suback
            | PacketType::Unsuback
            | PacketType::Pubcomp => {}
            PacketType::Publish => {
                let (topic, message) = packet::decode_publish(self.recv_buf)?;
                let (qos, id) = (message.qos, message.id);
                if let Some(handler) = self.handler.as_mut() {
                    handler(topic, &message);
                }
                let reply = match qos {
                    QoS::AtMostOnce => None,
                    QoS::AtLeastOnce => Some(PacketType::Puback),
                    QoS::ExactlyOnce => Some(PacketType::Pubrec),
                };
                if let Some(kind) = reply {
                    let len = packet::encode_ack(self.send_buf, kind, id)?;
                    let mut deadline = T::default();
                    deadline.countdown(self.command_timeout_ms);
                    self.send_packet(len, &deadline)?;
                }
            }
            PacketType::Pubrec => {
                let (_, id) = packet::decode_ack(self.recv_buf)?;
                let len = packet::encode_ack(self.send_buf, PacketType::Pubrel, id)?;
                let mut deadline = T::default();
                deadline.countdown(self.command_timeout_ms);
                self.send_packet(len, &deadline)?;
            }
            PacketType::Pingresp => {
                self.ping_outstanding = false;
            }
            // server-bound or unsolicited packets are ignored
            _ => {}
        }
        Ok(())
    }

    /// Emit a PINGREQ when the keep-alive interval has elapsed without
    /// outbound traffic. Best effort: a failed ping send is not an error
    /// here; the missing PINGRESP will surface as a lost connection.
    fn keepalive(&mut self) {
        if self.keep_alive_seconds == 0 || !self.connected {
            return;
        }
        if self.ping_timer.expired() && !self.ping_outstanding {
            if let Ok(len) = packet::encode_pingreq(self.send_buf) {
                let mut deadline = T::default();
                deadline.countdown(1000);
                if self.send_packet(len, &deadline).is_ok() {
                    self.pingresp_timer.countdown(self.command_timeout_ms);
                    self.ping_outstanding = true;
                }
            }
        }
    }

    /// Read one framed packet into the receive buffer: header byte,
    /// remaining-length prefix (re-encoded into the buffer behind the
    /// header), then the body.
    ///
    /// `Ok(None)` means no data arrived within the deadline, or that the
    /// deadline cut a packet short mid-read and it was dropped. A
    /// zero-byte read is an orderly close by the peer.
    fn read_packet(&mut self, deadline: &T) -> Result<Option<PacketType>, Error> {
        if self.recv_buf.len() < 5 {
            return Err(Error::BufferSize);
        }

        match self.transport.read(&mut self.recv_buf[..1], deadline.left()) {
            Ok(0) => return Err(Error::ConnectionLost),
            Ok(_) => {}
            Err(_) => return Ok(None),
        }

        // the remaining-length field arrives one byte at a time
        let mut remaining = 0usize;
        let mut multiplier = 1usize;
        let mut consumed = 0;
        loop {
            if consumed >= 4 {
                return Err(Error::Protocol);
            }
            let mut byte = [0u8; 1];
            match self.transport.read(&mut byte, deadline.left()) {
                Ok(0) => return Err(Error::ConnectionLost),
                Ok(_) => {}
                Err(_) => return Ok(None),
            }
            consumed += 1;
            remaining += usize::from(byte[0] & 0x7F) * multiplier;
            multiplier *= 128;
            if byte[0] & 0x80 == 0 {
                break;
            }
        }

        // put the length prefix back so decoders see a complete frame
        let prefix = packet::encode_length(&mut self.recv_buf[1..], remaining)?;
        let start = 1 + prefix;
        let end = start.checked_add(remaining).ok_or(Error::Protocol)?;
        if end > self.recv_buf.len() {
            return Err(Error::BufferSize);
        }

        let mut got = 0;
        while got < remaining {
            match self
                .transport
                .read(&mut self.recv_buf[start + got..end], deadline.left())
            {
                Ok(0) => return Err(Error::ConnectionLost),
                Ok(n) => got += n,
                Err(_) => return Ok(None),
            }
        }

        PacketType::from_header(self.recv_buf[0]).map(Some)
    }
}
