//! Common error types for network operations

use crate::mqtt::packet::ConnectReturnCode;

/// A common error type for the client and transport operations.
///
/// This enum defines the failures an MQTT session can surface. It is
/// designed to be simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a session that is not connected.
    NotConnected,
    /// A connect was attempted on a session that is already connected.
    AlreadyConnected,
    /// The peer closed the connection, a send could not be completed, or
    /// the keep-alive window lapsed without a ping response.
    ConnectionLost,
    /// A deadline expired before the awaited packet arrived.
    Timeout,
    /// A packet does not fit the caller-supplied buffer.
    BufferSize,
    /// A malformed packet was received.
    Protocol,
    /// The broker refused the connection with the contained return code.
    ConnectionRefused(ConnectReturnCode),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::AlreadyConnected => defmt::write!(f, "AlreadyConnected"),
            Error::ConnectionLost => defmt::write!(f, "ConnectionLost"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::BufferSize => defmt::write!(f, "BufferSize"),
            Error::Protocol => defmt::write!(f, "Protocol"),
            Error::ConnectionRefused(code) => defmt::write!(f, "ConnectionRefused({})", code),
        }
    }
}
