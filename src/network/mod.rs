//! # Network abstraction layer for embedded systems
//!
//! This module defines the transport contract the MQTT session is driven
//! over: a synchronous, deadline-bounded byte channel. The session never
//! opens, configures or re-establishes the connection itself; the host
//! hands it something that implements [`Connection`] and keeps ownership
//! of the policy around it (TCP vs TLS, reconnect strategy, socket
//! options).
//!
//! ## Design Philosophy
//!
//! - **Protocol Agnostic**: the traits carry bytes; they know nothing of
//!   MQTT framing
//! - **Deadline Bounded**: every read and write takes a time budget in
//!   milliseconds and must return when it is spent
//! - **Embedded-First**: designed for `no_std` environments; associated
//!   error types let HAL-level transports surface their own failures
//!
//! ## Contract
//!
//! A read that returns `Ok(0)` signals an orderly close by the peer; the
//! session treats it as a lost connection. A read that finds no data
//! within its budget returns an error, which the session treats as "no
//! traffic this cycle"; persistent transport faults surface through the
//! keep-alive machinery rather than being classified by the transport.
//! Both operations may transfer fewer bytes than requested.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use libmqtt::network::{Connection, Read, Write};
//! # struct MockConnection;
//! # impl Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! # }
//! # impl libmqtt::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connection for MockConnection {}
//!
//! fn exchange<C: Connection>(conn: &mut C) -> Result<(), ()> {
//!     let n = conn.write(b"probe", 500).map_err(|_| ())?;
//!     let mut response = [0u8; 64];
//!     let _ = conn.read(&mut response, 500).map_err(|_| ())?;
//!     let _ = n;
//!     Ok(())
//! }
//! ```

/// Common error types for network operations
pub mod error;

/// Re-exports of the transport traits for convenient importing
pub mod prelude {
    pub use super::{Close, Connection, Read, Write};
}

/// Trait for reading data from a network connection within a deadline.
///
/// # Examples
///
/// ```rust,no_run
/// use libmqtt::network::Read;
/// # struct MockConnection;
/// # impl Read for MockConnection {
/// #     type Error = std::io::Error;
/// #     fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
/// #         Ok(0)
/// #     }
/// # }
///
/// fn read_some<R: Read>(reader: &mut R) -> Result<usize, R::Error> {
///     let mut buffer = [0u8; 64];
///     reader.read(&mut buffer, 250)
/// }
/// ```
pub trait Read {
    /// Associated error type for read operations
    type Error: core::fmt::Debug;

    /// Read data from the connection into the provided buffer, blocking
    /// for at most `timeout_ms` milliseconds.
    ///
    /// Returns the number of bytes read, possibly fewer than requested.
    /// A return value of 0 indicates that the connection has been closed
    /// by the remote end. If no data arrives within the budget the
    /// implementation returns an error.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;
}

/// Trait for writing data to a network connection within a deadline.
pub trait Write {
    /// Associated error type for write operations
    type Error: core::fmt::Debug;

    /// Write data to the connection, blocking for at most `timeout_ms`
    /// milliseconds.
    ///
    /// Returns the number of bytes written. The implementation may write
    /// fewer bytes than requested; the caller is responsible for retrying
    /// with the remainder while its own deadline allows.
    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error>;
}

/// Trait for closing network connections.
pub trait Close {
    /// Associated error type for close operations
    type Error: core::fmt::Debug;

    /// Close the connection and free any associated resources.
    fn close(self) -> Result<(), Self::Error>;
}

/// A complete synchronous network connection.
///
/// This trait combines reading, writing, and closing capabilities into a
/// single unified interface. Any type implementing this trait can carry an
/// MQTT session.
pub trait Connection: Read + Write + Close {}
