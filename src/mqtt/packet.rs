//! An MQTT 3.1.1 wire codec operating on caller-owned buffers.
//!
//! Every encoder writes one complete control packet (fixed header,
//! variable header, payload) into the front of the supplied buffer and
//! returns the number of bytes produced; [`Error::BufferSize`] is returned
//! before any transport activity when the packet does not fit. Every
//! decoder parses a complete framed packet (header byte, remaining-length
//! prefix, body) and fails with [`Error::Protocol`] unless all required
//! fields are present and in bounds. Nothing here allocates.

use crate::network::error::Error;

// MQTT Control Packet fixed-header bytes (type in the high nibble, the
// mandated flags of each type in the low nibble)
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PUBREC: u8 = 0x50;
const PUBREL: u8 = 0x62;
const PUBCOMP: u8 = 0x70;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const UNSUBSCRIBE: u8 = 0xA2;
const UNSUBACK: u8 = 0xB0;
const PINGREQ: u8 = 0xC0;
const DISCONNECT: u8 = 0xE0;

// Protocol constants defined by the MQTT 3.1.1 specification
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

/// Largest value the 4-byte remaining-length field can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::Protocol),
        }
    }
}

/// MQTT control packet types.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketType {
    /// Client request to connect to a broker.
    Connect,
    /// Connect acknowledgement.
    Connack,
    /// Publish message.
    Publish,
    /// Publish acknowledgement (QoS 1).
    Puback,
    /// Publish received (QoS 2, step 1).
    Pubrec,
    /// Publish release (QoS 2, step 2).
    Pubrel,
    /// Publish complete (QoS 2, step 3).
    Pubcomp,
    /// Subscribe request.
    Subscribe,
    /// Subscribe acknowledgement.
    Suback,
    /// Unsubscribe request.
    Unsubscribe,
    /// Unsubscribe acknowledgement.
    Unsuback,
    /// Ping request.
    Pingreq,
    /// Ping response.
    Pingresp,
    /// Client is disconnecting.
    Disconnect,
}

impl PacketType {
    /// Extract the packet type from a fixed-header byte.
    pub fn from_header(byte: u8) -> Result<Self, Error> {
        match byte >> 4 {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(Error::Protocol),
        }
    }
}

/// An MQTT application message, outbound or inbound.
///
/// For outbound messages the payload is the caller's; for inbound
/// deliveries it borrows the session's receive buffer and is only valid
/// for the duration of the handler call. The packet identifier is assigned
/// by the client for QoS ≥ 1 publishes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Message<'m> {
    /// Delivery guarantee requested (outbound) or granted (inbound).
    pub qos: QoS,
    /// Whether the broker should retain (outbound) or did retain
    /// (inbound) the message.
    pub retained: bool,
    /// Duplicate delivery flag.
    pub dup: bool,
    /// Packet identifier; 0 until assigned, meaningless for QoS 0.
    pub id: u16,
    /// The message payload data.
    pub payload: &'m [u8],
}

impl<'m> Message<'m> {
    /// A message with the given payload and QoS, no retain or duplicate
    /// flag, and an unassigned packet identifier.
    pub fn new(payload: &'m [u8], qos: QoS) -> Self {
        Self {
            qos,
            retained: false,
            dup: false,
            id: 0,
            payload,
        }
    }
}

/// A last-will message registered with the broker at connect time.
///
/// The broker publishes it on the will topic if the client disappears
/// without sending DISCONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Will<'a> {
    /// Topic the will is published on.
    pub topic: &'a str,
    /// Will message payload.
    pub message: &'a [u8],
    /// QoS the broker should use for the will publish.
    pub qos: QoS,
    /// Whether the broker should retain the will message.
    pub retained: bool,
}

/// Options for configuring the MQTT client connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,
    /// The keep-alive time in seconds; 0 disables keep-alive pings.
    pub keep_alive_seconds: u16,
    /// Whether to start a clean session.
    pub clean_session: bool,
    /// Optional user name for authentication.
    pub username: Option<&'a str>,
    /// Optional password for authentication.
    pub password: Option<&'a [u8]>,
    /// Optional last-will message.
    pub will: Option<Will<'a>>,
}

impl Default for ConnectOptions<'_> {
    fn default() -> Self {
        Self {
            client_id: "",
            keep_alive_seconds: 60,
            clean_session: true,
            username: None,
            password: None,
            will: None,
        }
    }
}

/// A decoded CONNACK packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Connack {
    /// Whether the broker resumed a previous session.
    pub session_present: bool,
    /// The broker's verdict on the connection request.
    pub code: ConnectReturnCode,
}

/// CONNACK return codes defined by MQTT 3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted,
    /// The broker does not support this protocol level.
    UnacceptableProtocolVersion,
    /// The client identifier is not allowed.
    IdentifierRejected,
    /// The MQTT service is unavailable.
    ServerUnavailable,
    /// The user name or password is malformed.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
}

impl ConnectReturnCode {
    fn from_u8(byte: u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(ConnectReturnCode::Accepted),
            1 => Ok(ConnectReturnCode::UnacceptableProtocolVersion),
            2 => Ok(ConnectReturnCode::IdentifierRejected),
            3 => Ok(ConnectReturnCode::ServerUnavailable),
            4 => Ok(ConnectReturnCode::BadUserNameOrPassword),
            5 => Ok(ConnectReturnCode::NotAuthorized),
            _ => Err(Error::Protocol),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectReturnCode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectReturnCode::Accepted => defmt::write!(f, "Accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                defmt::write!(f, "UnacceptableProtocolVersion")
            }
            ConnectReturnCode::IdentifierRejected => defmt::write!(f, "IdentifierRejected"),
            ConnectReturnCode::ServerUnavailable => defmt::write!(f, "ServerUnavailable"),
            ConnectReturnCode::BadUserNameOrPassword => defmt::write!(f, "BadUserNameOrPassword"),
            ConnectReturnCode::NotAuthorized => defmt::write!(f, "NotAuthorized"),
        }
    }
}

/// The broker's verdict on a single subscription request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SubackReturnCode {
    /// Subscription accepted at the contained maximum QoS.
    Granted(QoS),
    /// Subscription refused (wire value 0x80).
    Failure,
}

impl SubackReturnCode {
    fn from_u8(byte: u8) -> Result<Self, Error> {
        match byte {
            0x80 => Ok(SubackReturnCode::Failure),
            bits => Ok(SubackReturnCode::Granted(QoS::from_bits(bits)?)),
        }
    }
}

// ---------------------------------------------------------------------
// Buffer cursors
// ---------------------------------------------------------------------

struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_u8(&mut self, value: u8) -> Result<(), Error> {
        let slot = self.buf.get_mut(self.pos).ok_or(Error::BufferSize)?;
        *slot = value;
        self.pos += 1;
        Ok(())
    }

    fn put_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put_bytes(&value.to_be_bytes())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.pos + bytes.len();
        let slots = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(Error::BufferSize)?;
        slots.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// A UTF-8 string or binary field in the length-prefixed form used
    /// throughout the protocol.
    fn put_len_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > usize::from(u16::MAX) {
            return Err(Error::BufferSize);
        }
        self.put_u16(bytes.len() as u16)?;
        self.put_bytes(bytes)
    }

    fn put_remaining_length(&mut self, mut len: usize) -> Result<(), Error> {
        if len > MAX_REMAINING_LENGTH {
            return Err(Error::BufferSize);
        }
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            self.put_u8(byte)?;
            if len == 0 {
                break;
            }
        }
        Ok(())
    }

    fn finish(self) -> usize {
        self.pos
    }
}

struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_u8(&mut self) -> Result<u8, Error> {
        let byte = *self.buf.get(self.pos).ok_or(Error::Protocol)?;
        self.pos += 1;
        Ok(byte)
    }

    fn take_u16(&mut self) -> Result<u16, Error> {
        let hi = self.take_u8()?;
        let lo = self.take_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'b [u8], Error> {
        let end = self.pos.checked_add(len).ok_or(Error::Protocol)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Error::Protocol)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_str(&mut self) -> Result<&'b str, Error> {
        let len = usize::from(self.take_u16()?);
        let bytes = self.take_bytes(len)?;
        core::str::from_utf8(bytes).map_err(|_| Error::Protocol)
    }

    fn rest(&mut self) -> &'b [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }
}

// ---------------------------------------------------------------------
// Remaining-length field
// ---------------------------------------------------------------------

/// Encode a remaining-length value into the front of `buf`, returning the
/// number of bytes used (1 to 4).
pub(crate) fn encode_length(buf: &mut [u8], len: usize) -> Result<usize, Error> {
    let mut writer = Writer::new(buf);
    writer.put_remaining_length(len)?;
    Ok(writer.finish())
}

/// Decode a remaining-length value from the front of `buf`, returning the
/// value and the number of bytes consumed.
pub(crate) fn decode_length(buf: &[u8]) -> Result<(usize, usize), Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (index, &byte) in buf.iter().enumerate() {
        if index >= 4 {
            return Err(Error::Protocol);
        }
        value += usize::from(byte & 0x7F) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    // ran out of bytes with the continuation bit still set
    Err(Error::Protocol)
}

/// Split a framed packet into its fixed-header byte and body.
fn frame(buf: &[u8]) -> Result<(u8, Reader<'_>), Error> {
    let header = *buf.first().ok_or(Error::Protocol)?;
    let (len, consumed) = decode_length(&buf[1..])?;
    let start = 1 + consumed;
    let end = start.checked_add(len).ok_or(Error::Protocol)?;
    let body = buf.get(start..end).ok_or(Error::Protocol)?;
    Ok((header, Reader::new(body)))
}

fn expect_type(header: u8, expected: PacketType) -> Result<(), Error> {
    if PacketType::from_header(header)? == expected {
        Ok(())
    } else {
        Err(Error::Protocol)
    }
}

// ---------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------

/// Serialise a CONNECT packet for the given options.
pub fn encode_connect(buf: &mut [u8], options: &ConnectOptions<'_>) -> Result<usize, Error> {
    let mut remaining = 10 + 2 + options.client_id.len();
    if let Some(will) = &options.will {
        remaining += 4 + will.topic.len() + will.message.len();
    }
    if let Some(username) = options.username {
        remaining += 2 + username.len();
    }
    if let Some(password) = options.password {
        remaining += 2 + password.len();
    }

    let mut flags = 0u8;
    if options.clean_session {
        flags |= 0x02;
    }
    if let Some(will) = &options.will {
        flags |= 0x04 | ((will.qos as u8) << 3);
        if will.retained {
            flags |= 0x20;
        }
    }
    if options.username.is_some() {
        flags |= 0x80;
    }
    if options.password.is_some() {
        flags |= 0x40;
    }

    let mut writer = Writer::new(buf);
    writer.put_u8(CONNECT)?;
    writer.put_remaining_length(remaining)?;

    // --- Variable Header ---
    writer.put_len_bytes(PROTOCOL_NAME)?;
    writer.put_u8(PROTOCOL_LEVEL)?;
    writer.put_u8(flags)?;
    writer.put_u16(options.keep_alive_seconds)?;

    // --- Payload ---
    writer.put_len_bytes(options.client_id.as_bytes())?;
    if let Some(will) = &options.will {
        writer.put_len_bytes(will.topic.as_bytes())?;
        writer.put_len_bytes(will.message)?;
    }
    if let Some(username) = options.username {
        writer.put_len_bytes(username.as_bytes())?;
    }
    if let Some(password) = options.password {
        writer.put_len_bytes(password)?;
    }

    Ok(writer.finish())
}

/// Serialise a PUBLISH packet for the given topic and message.
pub fn encode_publish(buf: &mut [u8], topic: &str, message: &Message<'_>) -> Result<usize, Error> {
    let mut header = PUBLISH | ((message.qos as u8) << 1);
    if message.retained {
        header |= 0x01;
    }
    if message.dup {
        header |= 0x08;
    }

    let mut remaining = 2 + topic.len() + message.payload.len();
    if message.qos != QoS::AtMostOnce {
        remaining += 2;
    }

    let mut writer = Writer::new(buf);
    writer.put_u8(header)?;
    writer.put_remaining_length(remaining)?;
    writer.put_len_bytes(topic.as_bytes())?;
    if message.qos != QoS::AtMostOnce {
        writer.put_u16(message.id)?;
    }
    writer.put_bytes(message.payload)?;
    Ok(writer.finish())
}

/// Serialise one of the fixed-size acknowledgement packets: PUBACK,
/// PUBREC, PUBREL or PUBCOMP.
pub fn encode_ack(buf: &mut [u8], kind: PacketType, id: u16) -> Result<usize, Error> {
    let header = match kind {
        PacketType::Puback => PUBACK,
        PacketType::Pubrec => PUBREC,
        PacketType::Pubrel => PUBREL,
        PacketType::Pubcomp => PUBCOMP,
        _ => return Err(Error::Protocol),
    };
    let mut writer = Writer::new(buf);
    writer.put_u8(header)?;
    writer.put_remaining_length(2)?;
    writer.put_u16(id)?;
    Ok(writer.finish())
}

/// Serialise a SUBSCRIBE packet carrying a single topic filter.
pub fn encode_subscribe(buf: &mut [u8], id: u16, filter: &str, qos: QoS) -> Result<usize, Error> {
    let remaining = 2 + 2 + filter.len() + 1;
    let mut writer = Writer::new(buf);
    writer.put_u8(SUBSCRIBE)?;
    writer.put_remaining_length(remaining)?;
    writer.put_u16(id)?;
    writer.put_len_bytes(filter.as_bytes())?;
    writer.put_u8(qos as u8)?;
    Ok(writer.finish())
}

/// Serialise an UNSUBSCRIBE packet carrying a single topic filter.
pub fn encode_unsubscribe(buf: &mut [u8], id: u16, filter: &str) -> Result<usize, Error> {
    let remaining = 2 + 2 + filter.len();
    let mut writer = Writer::new(buf);
    writer.put_u8(UNSUBSCRIBE)?;
    writer.put_remaining_length(remaining)?;
    writer.put_u16(id)?;
    writer.put_len_bytes(filter.as_bytes())?;
    Ok(writer.finish())
}

/// Serialise a PINGREQ packet.
pub fn encode_pingreq(buf: &mut [u8]) -> Result<usize, Error> {
    let mut writer = Writer::new(buf);
    writer.put_u8(PINGREQ)?;
    writer.put_remaining_length(0)?;
    Ok(writer.finish())
}

/// Serialise a DISCONNECT packet.
pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, Error> {
    let mut writer = Writer::new(buf);
    writer.put_u8(DISCONNECT)?;
    writer.put_remaining_length(0)?;
    Ok(writer.finish())
}

// ---------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------

/// Deserialise a CONNACK packet.
pub fn decode_connack(buf: &[u8]) -> Result<Connack, Error> {
    let (header, mut body) = frame(buf)?;
    expect_type(header, PacketType::Connack)?;
    let flags = body.take_u8()?;
    let code = ConnectReturnCode::from_u8(body.take_u8()?)?;
    Ok(Connack {
        session_present: flags & 0x01 != 0,
        code,
    })
}

/// Deserialise a PUBLISH packet into its topic name and message.
///
/// The returned message borrows its payload from `buf`.
pub fn decode_publish(buf: &[u8]) -> Result<(&str, Message<'_>), Error> {
    let (header, mut body) = frame(buf)?;
    expect_type(header, PacketType::Publish)?;
    let qos = QoS::from_bits((header >> 1) & 0x03)?;
    let topic = body.take_str()?;
    let id = if qos == QoS::AtMostOnce {
        0
    } else {
        body.take_u16()?
    };
    Ok((
        topic,
        Message {
            qos,
            retained: header & 0x01 != 0,
            dup: header & 0x08 != 0,
            id,
            payload: body.rest(),
        },
    ))
}

/// Deserialise one of the fixed-size acknowledgement packets (PUBACK,
/// PUBREC, PUBREL, PUBCOMP), returning its type and packet identifier.
pub fn decode_ack(buf: &[u8]) -> Result<(PacketType, u16), Error> {
    let (header, mut body) = frame(buf)?;
    let kind = PacketType::from_header(header)?;
    let id = body.take_u16()?;
    Ok((kind, id))
}

/// Deserialise a SUBACK packet, returning the packet identifier and the
/// broker's verdict on the single requested subscription.
pub fn decode_suback(buf: &[u8]) -> Result<(u16, SubackReturnCode), Error> {
    let (header, mut body) = frame(buf)?;
    expect_type(header, PacketType::Suback)?;
    let id = body.take_u16()?;
    let code = SubackReturnCode::from_u8(body.take_u8()?)?;
    Ok((id, code))
}

/// Deserialise an UNSUBACK packet, returning the packet identifier.
pub fn decode_unsuback(buf: &[u8]) -> Result<u16, Error> {
    let (header, mut body) = frame(buf)?;
    expect_type(header, PacketType::Unsuback)?;
    body.take_u16()
}
