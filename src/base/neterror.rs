use thiserror::Error;

/// Error codes surfaced by the exchange engine and its collaborators.
///
/// Numeric values follow Chromium's `net_error_list.h` where a matching
/// entry exists; engine-specific conditions use the reserved `-10000` range.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Operation timed out")]
    TimedOut,
    #[error("API used in an illegal state")]
    IllegalState,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Response body already consumed")]
    HttpBodyError,
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Response body is not valid JSON")]
    JsonParseError,

    // Cache Errors
    #[error("Cache read failure")]
    CacheReadFailure,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::InvalidArgument => -4,
            NetError::TimedOut => -7,
            NetError::IllegalState => -10001,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::TunnelConnectionFailed => -111,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::TooManyRedirects => -310,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed => -330,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::InvalidHttpResponse => -370,

            NetError::CacheReadFailure => -401,

            NetError::InvalidHeader => -10002,
            NetError::HttpBodyError => -10003,
            NetError::InvalidUtf8 => -10004,
            NetError::JsonParseError => -10005,

            NetError::Unknown(code) => *code,
        }
    }

    /// Whether this error happened while establishing a connection and the
    /// same request may be attempted again on another route.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionFailed
                | NetError::ConnectionRefused
                | NetError::ConnectionTimedOut
                | NetError::TunnelConnectionFailed
                | NetError::SslProtocolError
        )
    }

    /// Whether the error leaves the wire protocol in an unknown position.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            NetError::InvalidHttpResponse
                | NetError::InvalidResponse
                | NetError::InvalidChunkedEncoding
                | NetError::IncompleteChunkedEncoding
                | NetError::ResponseHeadersTooBig
                | NetError::EmptyResponse
                | NetError::ContentLengthMismatch
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -4 => NetError::InvalidArgument,
            -7 => NetError::TimedOut,
            -10001 => NetError::IllegalState,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -111 => NetError::TunnelConnectionFailed,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -310 => NetError::TooManyRedirects,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -330 => NetError::ContentDecodingFailed,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -370 => NetError::InvalidHttpResponse,

            -401 => NetError::CacheReadFailure,

            -10002 => NetError::InvalidHeader,
            -10003 => NetError::HttpBodyError,
            -10004 => NetError::InvalidUtf8,
            -10005 => NetError::JsonParseError,
            _ => NetError::Unknown(code),
        }
    }
}
