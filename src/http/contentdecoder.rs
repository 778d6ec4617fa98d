//! Transparent response decompression.
//!
//! Chromium mapping: net/filter/gzip_source_stream.cc

use crate::base::context::net_to_io_error;
use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use flate2::read::GzDecoder;
use std::io::{self, Read};

/// Whether the response should be gunzipped on the caller's behalf.
///
/// Only when the engine itself asked for gzip, and the server answered with it.
pub fn should_decode(transparent_gzip: bool, headers: &OrderedHeaderMap) -> bool {
    transparent_gzip
        && headers
            .get_str("content-encoding")
            .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
            .unwrap_or(false)
}

/// Drop the headers that describe the encoded body.
pub fn strip_encoding_headers(headers: &mut OrderedHeaderMap) {
    headers.remove("content-encoding");
    headers.remove("content-length");
}

/// Gunzips a body as it is read. Malformed input surfaces as
/// `ContentDecodingFailed`; framing errors from below pass through.
pub struct GzipBody<R: Read> {
    decoder: GzDecoder<R>,
}

impl<R: Read> GzipBody<R> {
    pub fn new(inner: R) -> Self {
        Self {
            decoder: GzDecoder::new(inner),
        }
    }
}

impl<R: Read> Read for GzipBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf).map_err(|e| {
            let passthrough = e
                .get_ref()
                .map(|inner| inner.is::<NetError>())
                .unwrap_or(false);
            if passthrough {
                e
            } else {
                tracing::debug!(error = %e, "gzip decoding failed");
                net_to_io_error(NetError::ContentDecodingFailed)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::context::io_to_net_error;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_decodes_gzip() {
        let mut body = GzipBody::new(Cursor::new(gzip(b"hello gzip")));
        let mut out = String::new();
        body.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello gzip");
    }

    #[test]
    fn test_corrupt_input() {
        let mut body = GzipBody::new(Cursor::new(b"definitely not gzip".to_vec()));
        let err = body.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(io_to_net_error(&err), NetError::ContentDecodingFailed);
    }

    #[test]
    fn test_should_decode() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Content-Encoding", "GZIP").unwrap();
        assert!(should_decode(true, &headers));
        assert!(!should_decode(false, &headers));
        headers.insert("Content-Encoding", "br").unwrap();
        assert!(!should_decode(true, &headers));
    }

    #[test]
    fn test_strip_headers() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Content-Encoding", "gzip").unwrap();
        headers.insert("Content-Length", "42").unwrap();
        headers.insert("Content-Type", "text/plain").unwrap();
        strip_encoding_headers(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("content-type"));
    }
}
