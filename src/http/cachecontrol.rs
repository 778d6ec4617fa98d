//! Cache-Control directive parsing for requests and responses.
//!
//! Chromium mapping: net/http/http_response_headers.cc (GetMaxAgeValue,
//! HasHeaderValue) and the request side of net/http/http_cache_transaction.cc.

use crate::http::httpdate;
use crate::http::orderedheaders::OrderedHeaderMap;
use std::time::{Duration, SystemTime};

/// Parsed Cache-Control directives.
///
/// Directives are collected from every `Cache-Control` field and from
/// `Pragma: no-cache`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<Duration>,
    pub s_max_age: Option<Duration>,
    pub max_stale: Option<Duration>,
    pub min_fresh: Option<Duration>,
    pub only_if_cached: bool,
    pub is_public: bool,
    pub must_revalidate: bool,
}

impl CacheControl {
    pub fn parse(headers: &OrderedHeaderMap) -> Self {
        let mut cc = CacheControl::default();

        for value in headers.get_all("cache-control") {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for directive in value.split(',') {
                let directive = directive.trim();
                if directive.is_empty() {
                    continue;
                }
                let (name, arg) = match directive.split_once('=') {
                    Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                    None => (directive, None),
                };

                match name.to_ascii_lowercase().as_str() {
                    "no-store" => cc.no_store = true,
                    "no-cache" => cc.no_cache = true,
                    "public" => cc.is_public = true,
                    "must-revalidate" => cc.must_revalidate = true,
                    "only-if-cached" => cc.only_if_cached = true,
                    "max-age" => cc.max_age = arg.and_then(parse_seconds),
                    "s-maxage" => cc.s_max_age = arg.and_then(parse_seconds),
                    "min-fresh" => cc.min_fresh = arg.and_then(parse_seconds),
                    // A bare max-stale accepts a response of any staleness.
                    "max-stale" => {
                        cc.max_stale = Some(arg.and_then(parse_seconds).unwrap_or(Duration::MAX))
                    }
                    _ => {}
                }
            }
        }

        for value in headers.get_all("pragma") {
            if let Ok(v) = value.to_str() {
                if v.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache")) {
                    cc.no_cache = true;
                }
            }
        }

        cc
    }
}

/// Parse a delta-seconds value. Overlong values saturate rather than fail.
fn parse_seconds(arg: &str) -> Option<Duration> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Duration::from_secs(arg.parse::<u64>().unwrap_or(u64::MAX)))
}

/// The `Vary` field names of a response, lowercased.
pub fn vary_fields(headers: &OrderedHeaderMap) -> Vec<String> {
    headers
        .get_all("vary")
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Whether the response varies on every request field (`Vary: *`).
pub fn has_vary_all(headers: &OrderedHeaderMap) -> bool {
    vary_fields(headers).iter().any(|f| f == "*")
}

/// Whether two requests agree on every field the response varies on.
pub fn vary_matches(
    response: &OrderedHeaderMap,
    cached_request: &OrderedHeaderMap,
    new_request: &OrderedHeaderMap,
) -> bool {
    vary_fields(response).iter().all(|field| {
        let cached: Vec<_> = cached_request.get_all(field).collect();
        let current: Vec<_> = new_request.get_all(field).collect();
        cached == current
    })
}

/// The subset of request headers named by the response's `Vary`.
pub fn vary_request_headers(
    response: &OrderedHeaderMap,
    request: &OrderedHeaderMap,
) -> OrderedHeaderMap {
    let mut out = OrderedHeaderMap::new();
    for field in vary_fields(response) {
        for (name, value) in request.iter() {
            if name.as_str() == field {
                out.push(name.clone(), value.clone());
            }
        }
    }
    out
}

/// Read an HTTP-date header.
pub fn date_header(headers: &OrderedHeaderMap, name: &str) -> Option<SystemTime> {
    headers.get_str(name).and_then(httpdate::parse)
}

/// Read a numeric `Content-Length`, rejecting conflicting duplicates.
pub fn content_length(headers: &OrderedHeaderMap) -> Option<u64> {
    let mut values = headers
        .get_all("content-length")
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.trim().parse::<u64>());
    let first = values.next()?.ok()?;
    values
        .all(|v| v.map(|n| n == first).unwrap_or(false))
        .then_some(first)
}

/// Whether the message body uses chunked transfer coding.
pub fn is_chunked(headers: &OrderedHeaderMap) -> bool {
    headers
        .get_all("transfer-encoding")
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

/// Whether a `Connection: close` token is present.
pub fn has_connection_close(headers: &OrderedHeaderMap) -> bool {
    headers
        .get_all("connection")
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("close"))
}
