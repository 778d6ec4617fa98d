//! Request bodies: owned payloads and the writable sink an engine hands out.

use crate::base::context::net_to_io_error;
use crate::base::neterror::NetError;
use crate::socket::connection::Connection;
use bytes::Bytes;
use std::io::{self, Write};
use std::sync::Arc;

/// Request body for HTTP methods that send data.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Body with raw bytes.
    Bytes(Bytes),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::from(s.to_owned()))
    }
}

impl From<&[u8]> for RequestBody {
    fn from(s: &[u8]) -> Self {
        RequestBody::Bytes(Bytes::copy_from_slice(s))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl RequestBody {
    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the length of the body in bytes.
    pub fn len(&self) -> usize {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(b) => b.len(),
        }
    }
}

enum SinkKind {
    /// Buffers everything so the length is known before the headers go out,
    /// and so the body can be replayed on a new connection.
    Retryable {
        buffer: Vec<u8>,
        limit: Option<u64>,
    },
    FixedLength {
        connection: Arc<Connection>,
        remaining: u64,
    },
    Chunked {
        connection: Arc<Connection>,
        chunk_len: usize,
        pending: Vec<u8>,
    },
}

/// The writable request body of an exchange.
///
/// Obtained from [`HttpEngine::request_body`](crate::http::engine::HttpEngine::request_body).
/// Streaming sinks write straight to the connection; the retryable sink
/// buffers until the engine sends the request.
pub struct RequestBodySink {
    kind: SinkKind,
    closed: bool,
}

impl std::fmt::Debug for RequestBodySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            SinkKind::Retryable { .. } => "retryable",
            SinkKind::FixedLength { .. } => "fixed-length",
            SinkKind::Chunked { .. } => "chunked",
        };
        f.debug_struct("RequestBodySink")
            .field("kind", &kind)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RequestBodySink {
    /// A buffering sink. `limit` is the declared `Content-Length`, if any.
    pub fn retryable(limit: Option<u64>) -> Self {
        Self {
            kind: SinkKind::Retryable {
                buffer: Vec::new(),
                limit,
            },
            closed: false,
        }
    }

    pub(crate) fn fixed_length(connection: Arc<Connection>, length: u64) -> Self {
        Self {
            kind: SinkKind::FixedLength {
                connection,
                remaining: length,
            },
            closed: false,
        }
    }

    pub(crate) fn chunked(connection: Arc<Connection>, chunk_len: usize) -> Self {
        Self {
            kind: SinkKind::Chunked {
                connection,
                chunk_len: chunk_len.max(1),
                pending: Vec::new(),
            },
            closed: false,
        }
    }

    /// Whether bytes go to the wire as they are written. Streaming sinks
    /// require the request headers to be sent first.
    pub fn is_streaming(&self) -> bool {
        !matches!(self.kind, SinkKind::Retryable { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes buffered so far by a retryable sink.
    pub fn content_length(&self) -> Option<u64> {
        match &self.kind {
            SinkKind::Retryable { buffer, .. } => Some(buffer.len() as u64),
            _ => None,
        }
    }

    /// The buffered body of a retryable sink.
    pub fn buffered(&self) -> Option<&[u8]> {
        match &self.kind {
            SinkKind::Retryable { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Finish the body. Idempotent.
    ///
    /// Fixed-length sinks fail if fewer bytes than declared were written;
    /// chunked sinks emit the terminating chunk.
    pub fn close(&mut self) -> Result<(), NetError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &mut self.kind {
            SinkKind::Retryable { buffer, limit } => match limit {
                Some(limit) if buffer.len() as u64 != *limit => {
                    Err(NetError::ContentLengthMismatch)
                }
                _ => Ok(()),
            },
            SinkKind::FixedLength { remaining, .. } => {
                if *remaining != 0 {
                    Err(NetError::ContentLengthMismatch)
                } else {
                    Ok(())
                }
            }
            SinkKind::Chunked {
                connection,
                pending,
                ..
            } => {
                if !pending.is_empty() {
                    write_chunk(connection, pending)?;
                    pending.clear();
                }
                connection.write_all(b"0\r\n\r\n")
            }
        }
    }
}

fn write_chunk(connection: &Connection, data: &[u8]) -> Result<(), NetError> {
    let mut frame = Vec::with_capacity(data.len() + 12);
    frame.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    connection.write_all(&frame)
}

impl Write for RequestBodySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(net_to_io_error(NetError::IllegalState));
        }
        match &mut self.kind {
            SinkKind::Retryable { buffer, limit } => {
                if let Some(limit) = limit {
                    if buffer.len() as u64 + buf.len() as u64 > *limit {
                        return Err(net_to_io_error(NetError::ContentLengthMismatch));
                    }
                }
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            SinkKind::FixedLength {
                connection,
                remaining,
            } => {
                if buf.len() as u64 > *remaining {
                    return Err(net_to_io_error(NetError::ContentLengthMismatch));
                }
                connection.write_all(buf).map_err(net_to_io_error)?;
                *remaining -= buf.len() as u64;
                Ok(buf.len())
            }
            SinkKind::Chunked {
                connection,
                chunk_len,
                pending,
            } => {
                pending.extend_from_slice(buf);
                while pending.len() >= *chunk_len {
                    let rest = pending.split_off(*chunk_len);
                    write_chunk(connection, pending).map_err(net_to_io_error)?;
                    *pending = rest;
                }
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.kind {
            SinkKind::Retryable { .. } => Ok(()),
            SinkKind::FixedLength { connection, .. } | SinkKind::Chunked { connection, .. } => {
                connection.flush().map_err(net_to_io_error)
            }
        }
    }
}
