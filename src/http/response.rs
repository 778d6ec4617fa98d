//! HTTP response model.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::responsebody::ResponseBody;
use bytes::Bytes;
use http::{StatusCode, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseSource {
    /// Served from the cache without touching the network.
    Cache,
    /// Revalidated against the origin; the body is the cached one.
    ConditionalCache,
    /// Fetched from the network.
    Network,
}

impl ResponseSource {
    pub fn uses_cache(&self) -> bool {
        matches!(self, ResponseSource::Cache | ResponseSource::ConditionalCache)
    }

    pub fn uses_network(&self) -> bool {
        matches!(self, ResponseSource::ConditionalCache | ResponseSource::Network)
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseSource::Cache => "CACHE",
            ResponseSource::ConditionalCache => "CONDITIONAL_CACHE",
            ResponseSource::Network => "NETWORK",
        };
        f.write_str(s)
    }
}

/// Summary of the TLS session a response arrived over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsHandshake {
    pub protocol: String,
    pub cipher_suite: String,
    /// DER-encoded chain, leaf first.
    pub peer_certificates: Vec<Vec<u8>>,
}

/// `HTTP/1.1 200 OK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub code: StatusCode,
    pub reason: String,
}

impl StatusLine {
    pub fn new(version: Version, code: StatusCode, reason: &str) -> Self {
        Self {
            version,
            code,
            reason: reason.to_string(),
        }
    }

    /// Parse a response status line. Only HTTP/1.0 and HTTP/1.1 are spoken;
    /// the reason phrase may be empty.
    pub fn parse(line: &str) -> Result<Self, NetError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let (version, rest) = line.split_once(' ').ok_or(NetError::InvalidHttpResponse)?;
        let version = match version {
            "HTTP/1.1" => Version::HTTP_11,
            "HTTP/1.0" => Version::HTTP_10,
            _ => return Err(NetError::InvalidHttpResponse),
        };
        let (code, reason) = match rest.split_once(' ') {
            Some((code, reason)) => (code, reason),
            None => (rest, ""),
        };
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NetError::InvalidHttpResponse);
        }
        let code = StatusCode::from_bytes(code.as_bytes())
            .map_err(|_| NetError::InvalidHttpResponse)?;
        Ok(Self::new(version, code, reason))
    }

    /// The status line of a synthesized offline miss.
    pub fn gateway_timeout() -> Self {
        Self::new(Version::HTTP_11, StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout")
    }

    /// `0` for HTTP/1.0, `1` for HTTP/1.1.
    pub fn http_minor_version(&self) -> u8 {
        if self.version == Version::HTTP_10 {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = if self.version == Version::HTTP_10 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        };
        if self.reason.is_empty() {
            write!(f, "{} {}", version, self.code.as_u16())
        } else {
            write!(f, "{} {} {}", version, self.code.as_u16(), self.reason)
        }
    }
}

/// Status line plus headers, as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusLine,
    pub headers: OrderedHeaderMap,
}

/// HTTP response with accessible body.
/// This is the user-facing response type that owns the body.
pub struct HttpResponse {
    status: StatusLine,
    headers: OrderedHeaderMap,
    body: Option<ResponseBody>,
    source: Option<ResponseSource>,
    tls: Option<TlsHandshake>,
    sent_at: Option<SystemTime>,
    received_at: Option<SystemTime>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status.to_string())
            .field("source", &self.source)
            .field("headers", &self.headers.len())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl HttpResponse {
    pub fn new(head: ResponseHead) -> Self {
        Self {
            status: head.status,
            headers: head.headers,
            body: None,
            source: None,
            tls: None,
            sent_at: None,
            received_at: None,
        }
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsHandshake>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_times(mut self, sent_at: SystemTime, received_at: SystemTime) -> Self {
        self.sent_at = Some(sent_at);
        self.received_at = Some(received_at);
        self
    }

    pub(crate) fn set_source(&mut self, source: ResponseSource) {
        self.source = Some(source);
    }

    pub(crate) fn set_body(&mut self, body: Option<ResponseBody>) {
        self.body = body;
    }

    pub(crate) fn headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    pub fn status(&self) -> StatusCode {
        self.status.code
    }

    pub fn version(&self) -> Version {
        self.status.version
    }

    pub fn reason(&self) -> &str {
        &self.status.reason
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.status
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    /// Set once the engine has decided the response's origin.
    pub fn source(&self) -> Option<ResponseSource> {
        self.source
    }

    pub fn tls_handshake(&self) -> Option<&TlsHandshake> {
        self.tls.as_ref()
    }

    pub fn sent_at(&self) -> Option<SystemTime> {
        self.sent_at
    }

    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the response body for consumption.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Head of this response, without the body.
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Consume the body as bytes. A response without a body yields nothing.
    pub fn bytes(mut self) -> Result<Bytes, NetError> {
        match self.body.take() {
            Some(body) => body.bytes(),
            None => Ok(Bytes::new()),
        }
    }

    /// Consume the body as UTF-8 text.
    pub fn text(mut self) -> Result<String, NetError> {
        match self.body.take() {
            Some(body) => body.text(),
            None => Ok(String::new()),
        }
    }

    /// Consume the body as JSON.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, NetError> {
        self.body.take().ok_or(NetError::HttpBodyError)?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let s = StatusLine::parse("HTTP/1.1 304 Not Modified\r\n").unwrap();
        assert_eq!(s.code, StatusCode::NOT_MODIFIED);
        assert_eq!(s.reason, "Not Modified");
        assert_eq!(s.http_minor_version(), 1);

        let s = StatusLine::parse("HTTP/1.0 200").unwrap();
        assert_eq!(s.reason, "");
        assert_eq!(s.http_minor_version(), 0);
        assert_eq!(s.to_string(), "HTTP/1.0 200");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for line in ["", "HTTP/2 200 OK", "HTTP/1.1 20 OK", "HTTP/1.1 abc OK", "SSH-2.0-OpenSSH"] {
            assert_eq!(
                StatusLine::parse(line).unwrap_err(),
                NetError::InvalidHttpResponse,
                "{line}"
            );
        }
    }

    #[test]
    fn test_gateway_timeout_line() {
        assert_eq!(
            StatusLine::gateway_timeout().to_string(),
            "HTTP/1.1 504 Gateway Timeout"
        );
    }

    #[test]
    fn test_response_accessors() {
        let mut headers = OrderedHeaderMap::new();
        headers.append("Content-Type", "text/plain").unwrap();
        let mut response = HttpResponse::new(ResponseHead {
            status: StatusLine::parse("HTTP/1.1 200 OK").unwrap(),
            headers,
        })
        .with_body(ResponseBody::from_bytes(Bytes::from_static(b"hi")));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.source(), None);
        response.set_source(ResponseSource::Network);
        assert_eq!(response.source(), Some(ResponseSource::Network));
        assert!(response.has_body());
        assert_eq!(response.text().unwrap(), "hi");
    }

    #[test]
    fn test_source_flags() {
        assert!(ResponseSource::ConditionalCache.uses_cache());
        assert!(ResponseSource::ConditionalCache.uses_network());
        assert!(!ResponseSource::Cache.uses_network());
        assert_eq!(ResponseSource::Network.to_string(), "NETWORK");
    }
}
