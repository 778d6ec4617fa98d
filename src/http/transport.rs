//! The wire-protocol seam between an engine and a connection.
//!
//! Chromium mapping: net/http/http_stream.h

use crate::base::neterror::NetError;
use crate::http::httpcache::CacheSink;
use crate::http::request::HttpRequest;
use crate::http::requestbody::RequestBodySink;
use crate::http::response::ResponseHead;
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

/// A framed response body read off a connection.
pub trait TransferSource: Read + Send {
    /// The whole body has been read and its framing verified.
    fn is_exhausted(&self) -> bool;
    /// The body runs until the peer closes the connection.
    fn is_unknown_length(&self) -> bool;
}

/// Shared handle to a response body's transfer source.
///
/// One handle feeds the caller-visible body (possibly through a decoder);
/// another stays with the engine so the connection can be drained and
/// judged for reuse when the exchange is released.
#[derive(Clone)]
pub struct TransferStream {
    inner: Arc<Mutex<Box<dyn TransferSource>>>,
}

impl fmt::Debug for TransferStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferStream")
            .field("exhausted", &self.is_exhausted())
            .field("unknown_length", &self.is_unknown_length())
            .finish()
    }
}

impl TransferStream {
    pub fn new(source: impl TransferSource + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn TransferSource>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().is_exhausted()
    }

    pub fn is_unknown_length(&self) -> bool {
        self.lock().is_unknown_length()
    }

    /// Read and discard whatever is left. Returns whether the body ended
    /// cleanly.
    pub fn drain(&self) -> bool {
        let mut buf = [0u8; 8 * 1024];
        let mut source = self.lock();
        loop {
            if source.is_exhausted() {
                return true;
            }
            match source.read(&mut buf) {
                Ok(0) => return source.is_exhausted(),
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    }
}

impl Read for TransferStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock().read(buf)
    }
}

/// Writes a request and reads a response over one connection.
///
/// The engine drives the calls in order: prepare and write headers,
/// write the body, flush, read the response head, then frame the body.
pub trait Transport: Send {
    /// Add the framing headers the body mode needs.
    fn prepare_request_headers(&mut self, request: &mut HttpRequest) -> Result<(), NetError>;

    /// The sink the request body is written to.
    fn create_request_body(&mut self, request: &HttpRequest) -> Result<RequestBodySink, NetError>;

    fn write_request_headers(&mut self, request: &HttpRequest) -> Result<(), NetError>;

    /// Send the buffered body of a retryable sink. Streaming sinks have
    /// already written theirs.
    fn write_request_body(&mut self, sink: &RequestBodySink) -> Result<(), NetError>;

    fn flush_request(&mut self) -> Result<(), NetError>;

    /// Read one response head. Interim (1xx) heads are returned as-is.
    fn read_response_headers(&mut self) -> Result<ResponseHead, NetError>;

    /// Frame the response body, teeing it into `cache_sink` when given.
    fn get_transfer_stream(
        &mut self,
        head: &ResponseHead,
        has_body: bool,
        cache_sink: Option<Box<dyn CacheSink>>,
    ) -> Result<TransferStream, NetError>;

    /// Whether the connection may carry another exchange, draining any
    /// unread body first.
    fn make_reusable(
        &mut self,
        canceled: bool,
        request_body: Option<&RequestBodySink>,
        response_body: Option<&TransferStream>,
    ) -> bool;
}
