//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into `NetError` variants while logging the
//! underlying cause.

use crate::base::neterror::NetError;
use std::io::{self, ErrorKind};

/// Map an IO error raised on an established connection.
pub fn io_to_net_error(e: &io::Error) -> NetError {
    if let Some(net) = e.get_ref().and_then(|inner| inner.downcast_ref::<NetError>()) {
        return *net;
    }
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => NetError::TimedOut,
        ErrorKind::ConnectionReset => NetError::ConnectionReset,
        ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        ErrorKind::NotConnected => NetError::SocketNotConnected,
        ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe => NetError::ConnectionClosed,
        ErrorKind::InvalidData => NetError::InvalidResponse,
        _ => NetError::ConnectionFailed,
    }
}

/// Wrap a `NetError` so it can travel through `std::io::Read`/`Write`.
pub fn net_to_io_error(e: NetError) -> io::Error {
    let kind = match e {
        NetError::TimedOut | NetError::ConnectionTimedOut => ErrorKind::TimedOut,
        NetError::ConnectionClosed => ErrorKind::UnexpectedEof,
        NetError::ConnectionReset => ErrorKind::ConnectionReset,
        NetError::ContentDecodingFailed
        | NetError::InvalidChunkedEncoding
        | NetError::IncompleteChunkedEncoding
        | NetError::ContentLengthMismatch => ErrorKind::InvalidData,
        _ => ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use httpengine::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect_timeout(&addr, timeout)
    ///     .connection_context("example.com", 443)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Map an error raised while reading or writing an established connection.
    fn io_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, port, error = %e, "connect failed");
            match e.kind() {
                ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
                ErrorKind::TimedOut | ErrorKind::WouldBlock => NetError::ConnectionTimedOut,
                _ => NetError::ConnectionFailed,
            }
        })
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(domain = %domain, error = %e, "DNS resolution failed");
            NetError::NameNotResolved
        })
    }

    fn io_context(self) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(error = %e, "connection I/O failed");
            io_to_net_error(&e)
        })
    }
}
