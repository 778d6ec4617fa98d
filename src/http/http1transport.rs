//! HTTP/1.x transport.
//!
//! Chromium mapping: net/http/http_stream_parser.cc and
//! net/http/http_chunked_decoder.cc

use crate::base::context::{io_to_net_error, net_to_io_error, IoResultExt};
use crate::base::neterror::NetError;
use crate::http::cachecontrol;
use crate::http::httpcache::CacheSink;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::{request_target, BodyMode, HttpRequest};
use crate::http::requestbody::RequestBodySink;
use crate::http::response::{ResponseHead, StatusLine};
use crate::http::transport::{TransferSource, TransferStream, Transport};
use crate::socket::connection::Connection;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// Largest response head accepted, status line and headers together.
pub const MAX_HEADERS_SIZE: usize = 256 * 1024;

/// How long `make_reusable` waits for the rest of an unread body.
const DISCARD_TIMEOUT: Duration = Duration::from_millis(100);

/// Speaks HTTP/1.1 (and reads HTTP/1.0 responses) over one connection.
pub struct Http1Transport {
    connection: Arc<Connection>,
    request_close: bool,
    response_keep_alive: bool,
}

impl std::fmt::Debug for Http1Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1Transport")
            .field("connection", &self.connection.id())
            .field("request_close", &self.request_close)
            .field("response_keep_alive", &self.response_keep_alive)
            .finish()
    }
}

impl Http1Transport {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            request_close: false,
            response_keep_alive: true,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Serialize the request line and headers.
    pub fn encode_request_head(&self, request: &HttpRequest) -> Vec<u8> {
        let route = self.connection.route();
        let target = request_target(request.url(), route.uses_absolute_form());
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method().as_str(), target).as_bytes(),
        );
        request.headers().write_lines(&mut out);
        if route.uses_absolute_form() && !request.headers().contains("proxy-authorization") {
            if let Some(auth) = route.address().proxy().and_then(|p| p.auth_header()) {
                out.extend_from_slice(format!("proxy-authorization: {}\r\n", auth).as_bytes());
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

impl Transport for Http1Transport {
    fn prepare_request_headers(&mut self, request: &mut HttpRequest) -> Result<(), NetError> {
        match request.body_mode() {
            BodyMode::FixedLength(len) if request.permits_body() => {
                request.headers_mut().remove("transfer-encoding");
                request
                    .headers_mut()
                    .insert("Content-Length", &len.to_string())?;
            }
            BodyMode::Chunked(_) if request.permits_body() => {
                request.headers_mut().remove("content-length");
                request.headers_mut().insert("Transfer-Encoding", "chunked")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn create_request_body(&mut self, request: &HttpRequest) -> Result<RequestBodySink, NetError> {
        Ok(match request.body_mode() {
            BodyMode::FixedLength(len) => {
                RequestBodySink::fixed_length(Arc::clone(&self.connection), len)
            }
            BodyMode::Chunked(chunk_len) => {
                RequestBodySink::chunked(Arc::clone(&self.connection), chunk_len)
            }
            BodyMode::Buffered => {
                RequestBodySink::retryable(cachecontrol::content_length(request.headers()))
            }
        })
    }

    fn write_request_headers(&mut self, request: &HttpRequest) -> Result<(), NetError> {
        self.request_close = cachecontrol::has_connection_close(request.headers());
        let head = self.encode_request_head(request);
        tracing::debug!(
            id = self.connection.id(),
            method = %request.method(),
            url = %request.url(),
            "writing request headers"
        );
        self.connection.write_all(&head)
    }

    fn write_request_body(&mut self, sink: &RequestBodySink) -> Result<(), NetError> {
        match sink.buffered() {
            Some(body) if !body.is_empty() => self.connection.write_all(body),
            _ => Ok(()),
        }
    }

    fn flush_request(&mut self) -> Result<(), NetError> {
        self.connection.flush()
    }

    fn read_response_headers(&mut self) -> Result<ResponseHead, NetError> {
        let mut budget = MAX_HEADERS_SIZE;
        let status_line = match read_line(&self.connection, &mut budget)? {
            Some(line) => line,
            None => return Err(NetError::EmptyResponse),
        };
        let status = StatusLine::parse(&status_line)?;

        let mut headers = OrderedHeaderMap::new();
        loop {
            let line = read_line(&self.connection, &mut budget)?.ok_or(NetError::ConnectionClosed)?;
            if line.is_empty() {
                break;
            }
            headers
                .append_line(&line)
                .map_err(|_| NetError::InvalidHttpResponse)?;
        }

        self.connection
            .set_http_minor_version(status.http_minor_version());
        self.response_keep_alive = keeps_alive(&status, &headers);
        tracing::debug!(
            id = self.connection.id(),
            status = status.code.as_u16(),
            headers = headers.len(),
            "read response headers"
        );
        Ok(ResponseHead { status, headers })
    }

    fn get_transfer_stream(
        &mut self,
        head: &ResponseHead,
        has_body: bool,
        cache_sink: Option<Box<dyn CacheSink>>,
    ) -> Result<TransferStream, NetError> {
        let tee = Tee { sink: cache_sink };
        let connection = Arc::clone(&self.connection);
        if !has_body {
            let mut source = FixedLengthSource::new(connection, 0, tee);
            source.finish();
            return Ok(TransferStream::new(source));
        }
        if cachecontrol::is_chunked(&head.headers) {
            return Ok(TransferStream::new(ChunkedSource::new(connection, tee)));
        }
        if head.headers.contains("content-length") {
            let len = cachecontrol::content_length(&head.headers)
                .ok_or(NetError::InvalidHttpResponse)?;
            let mut source = FixedLengthSource::new(connection, len, tee);
            if len == 0 {
                source.finish();
            }
            return Ok(TransferStream::new(source));
        }
        Ok(TransferStream::new(UnknownLengthSource::new(connection, tee)))
    }

    fn make_reusable(
        &mut self,
        canceled: bool,
        request_body: Option<&RequestBodySink>,
        response_body: Option<&TransferStream>,
    ) -> bool {
        if canceled {
            return false;
        }
        if request_body.map(|sink| !sink.is_closed()).unwrap_or(false) {
            return false;
        }
        if self.request_close || !self.response_keep_alive {
            return false;
        }
        let Some(stream) = response_body else {
            return true;
        };
        if stream.is_unknown_length() {
            return false;
        }
        if stream.is_exhausted() {
            return true;
        }

        // Give the rest of the body a short window to arrive.
        let previous = self.connection.read_timeout();
        if self.connection.set_read_timeout(Some(DISCARD_TIMEOUT)).is_err() {
            return false;
        }
        let drained = stream.drain();
        let restored = self.connection.set_read_timeout(previous).is_ok();
        tracing::debug!(id = self.connection.id(), drained, "discarded unread response body");
        drained && restored
    }
}

/// A response keeps the connection open unless it says `close`, or it is
/// HTTP/1.0 without an explicit `keep-alive`.
fn keeps_alive(status: &StatusLine, headers: &OrderedHeaderMap) -> bool {
    if cachecontrol::has_connection_close(headers) {
        return false;
    }
    if status.http_minor_version() == 0 {
        return headers
            .get_all("connection")
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case("keep-alive"));
    }
    true
}

/// Read one CRLF- or LF-terminated line, charging it against `budget`.
/// `None` means the peer closed before sending anything.
fn read_line(connection: &Connection, budget: &mut usize) -> Result<Option<String>, NetError> {
    let mut buf = Vec::new();
    let limit = *budget as u64 + 1;
    let n = connection
        .with_reader(|r| r.by_ref().take(limit).read_until(b'\n', &mut buf))
        .io_context()?;
    if n == 0 {
        return Ok(None);
    }
    if n > *budget {
        return Err(NetError::ResponseHeadersTooBig);
    }
    *budget -= n;
    if buf.last() != Some(&b'\n') {
        return Err(NetError::ConnectionClosed);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| NetError::InvalidHttpResponse)
}

/// Copies body bytes into a cache entry as they are read.
struct Tee {
    sink: Option<Box<dyn CacheSink>>,
}

impl Tee {
    fn write(&mut self, data: &[u8]) {
        if let Some(sink) = self.sink.as_mut() {
            if sink.write_all(data).is_err() {
                self.abort();
            }
        }
    }

    fn commit(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.commit();
        }
    }

    fn abort(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.abort();
        }
    }
}

impl Drop for Tee {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Read up to `buf.len()` bytes from the connection.
fn read_some(connection: &Connection, buf: &mut [u8]) -> io::Result<usize> {
    connection.with_reader(|r| r.read(buf))
}

fn fail(tee: &mut Tee, e: NetError) -> io::Error {
    tee.abort();
    net_to_io_error(e)
}

/// A body of known length.
struct FixedLengthSource {
    connection: Arc<Connection>,
    remaining: u64,
    exhausted: bool,
    tee: Tee,
}

impl FixedLengthSource {
    fn new(connection: Arc<Connection>, length: u64, tee: Tee) -> Self {
        Self {
            connection,
            remaining: length,
            exhausted: false,
            tee,
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.tee.commit();
    }
}

impl Read for FixedLengthSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = match read_some(&self.connection, &mut buf[..want]) {
            Ok(n) => n,
            Err(e) => {
                let err = io_to_net_error(&e);
                self.tee.abort();
                return Err(net_to_io_error(err));
            }
        };
        if n == 0 {
            // Peer closed before the declared length arrived.
            return Err(fail(&mut self.tee, NetError::ContentLengthMismatch));
        }
        self.tee.write(&buf[..n]);
        self.remaining -= n as u64;
        if self.remaining == 0 {
            self.finish();
        }
        Ok(n)
    }
}

impl TransferSource for FixedLengthSource {
    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn is_unknown_length(&self) -> bool {
        false
    }
}

/// A body framed with chunked transfer coding.
struct ChunkedSource {
    connection: Arc<Connection>,
    chunk_remaining: u64,
    has_more_chunks: bool,
    first_chunk: bool,
    tee: Tee,
}

impl ChunkedSource {
    fn new(connection: Arc<Connection>, tee: Tee) -> Self {
        Self {
            connection,
            chunk_remaining: 0,
            has_more_chunks: true,
            first_chunk: true,
            tee,
        }
    }

    fn line(&self) -> Result<String, NetError> {
        let mut budget = MAX_HEADERS_SIZE;
        match read_line(&self.connection, &mut budget) {
            Ok(Some(line)) => Ok(line),
            Ok(None) | Err(NetError::ConnectionClosed) => Err(NetError::IncompleteChunkedEncoding),
            Err(NetError::ResponseHeadersTooBig) | Err(NetError::InvalidHttpResponse) => {
                Err(NetError::InvalidChunkedEncoding)
            }
            Err(e) => Err(e),
        }
    }

    /// Read the next chunk-size line, and the trailers after the last chunk.
    fn read_chunk_size(&mut self) -> Result<(), NetError> {
        if !self.first_chunk && !self.line()?.is_empty() {
            return Err(NetError::InvalidChunkedEncoding);
        }
        self.first_chunk = false;

        let line = self.line()?;
        let size = line.split(';').next().unwrap_or("").trim();
        if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(NetError::InvalidChunkedEncoding);
        }
        self.chunk_remaining =
            u64::from_str_radix(size, 16).map_err(|_| NetError::InvalidChunkedEncoding)?;

        if self.chunk_remaining == 0 {
            // Trailers are read and dropped.
            while !self.line()?.is_empty() {}
            self.has_more_chunks = false;
            self.tee.commit();
        }
        Ok(())
    }
}

impl Read for ChunkedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.has_more_chunks || buf.is_empty() {
            return Ok(0);
        }
        if self.chunk_remaining == 0 {
            if let Err(e) = self.read_chunk_size() {
                return Err(fail(&mut self.tee, e));
            }
            if !self.has_more_chunks {
                return Ok(0);
            }
        }

        let want = (buf.len() as u64).min(self.chunk_remaining) as usize;
        let n = match read_some(&self.connection, &mut buf[..want]) {
            Ok(0) => return Err(fail(&mut self.tee, NetError::IncompleteChunkedEncoding)),
            Ok(n) => n,
            Err(e) => {
                let err = io_to_net_error(&e);
                return Err(fail(&mut self.tee, err));
            }
        };
        self.tee.write(&buf[..n]);
        self.chunk_remaining -= n as u64;
        Ok(n)
    }
}

impl TransferSource for ChunkedSource {
    fn is_exhausted(&self) -> bool {
        !self.has_more_chunks
    }

    fn is_unknown_length(&self) -> bool {
        false
    }
}

/// A body delimited by the peer closing the connection.
struct UnknownLengthSource {
    connection: Arc<Connection>,
    input_exhausted: bool,
    tee: Tee,
}

impl UnknownLengthSource {
    fn new(connection: Arc<Connection>, tee: Tee) -> Self {
        Self {
            connection,
            input_exhausted: false,
            tee,
        }
    }
}

impl Read for UnknownLengthSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input_exhausted || buf.is_empty() {
            return Ok(0);
        }
        match read_some(&self.connection, buf) {
            Ok(0) => {
                self.input_exhausted = true;
                self.tee.commit();
                Ok(0)
            }
            Ok(n) => {
                self.tee.write(&buf[..n]);
                Ok(n)
            }
            Err(e) => {
                let err = io_to_net_error(&e);
                Err(fail(&mut self.tee, err))
            }
        }
    }
}

impl TransferSource for UnknownLengthSource {
    fn is_exhausted(&self) -> bool {
        self.input_exhausted
    }

    fn is_unknown_length(&self) -> bool {
        true
    }
}
