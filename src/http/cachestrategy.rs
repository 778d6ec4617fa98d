//! Cache freshness decisions (RFC 7234).
//!
//! Given a request and the cached candidate for it, decide whether to serve
//! the cache, revalidate it, or go to the network. Pure: no I/O, the clock
//! is passed in.

use crate::http::cachecontrol::{self, CacheControl};
use crate::http::httpcache::CachedResponse;
use crate::http::httpdate;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::HttpRequest;
use crate::http::response::ResponseSource;
use http::StatusCode;
use std::time::{Duration, SystemTime};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Headers never forwarded from one hop to the next (RFC 2616 13.5.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// What to do with a request, carrying the candidate when it is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    Network,
    /// Serve this entry; warnings have been added to its headers.
    Cache(CachedResponse),
    /// Send a conditional request; on a match serve this entry.
    ConditionalCache(CachedResponse),
}

impl CacheDecision {
    pub fn source(&self) -> ResponseSource {
        match self {
            CacheDecision::Network => ResponseSource::Network,
            CacheDecision::Cache(_) => ResponseSource::Cache,
            CacheDecision::ConditionalCache(_) => ResponseSource::ConditionalCache,
        }
    }

    pub fn candidate(&self) -> Option<&CachedResponse> {
        match self {
            CacheDecision::Network => None,
            CacheDecision::Cache(c) | CacheDecision::ConditionalCache(c) => Some(c),
        }
    }
}

/// The outcome of [`CacheStrategy::compute`].
#[derive(Debug, Clone)]
pub struct CacheStrategy {
    pub decision: CacheDecision,
    /// Request headers to send, with any validators added.
    pub request_headers: OrderedHeaderMap,
}

impl CacheStrategy {
    pub fn compute(
        now: SystemTime,
        request: &HttpRequest,
        candidate: Option<CachedResponse>,
    ) -> CacheStrategy {
        let request_headers = request.headers().clone();
        let network = |request_headers| CacheStrategy {
            decision: CacheDecision::Network,
            request_headers,
        };

        let Some(mut candidate) = candidate else {
            return network(request_headers);
        };

        if candidate.method != *request.method() {
            return network(request_headers);
        }
        // An https response cached without its handshake cannot be trusted.
        if request.url().scheme() == "https" && candidate.tls.is_none() {
            return network(request_headers);
        }
        if !is_cacheable(&candidate, &request_headers) {
            return network(request_headers);
        }

        let request_cc = CacheControl::parse(&request_headers);
        if has_conditions(&request_headers) {
            return network(request_headers);
        }

        let response_cc = CacheControl::parse(&candidate.headers);
        let age = compute_age(&candidate, now);
        let heuristic = uses_heuristic_lifetime(&candidate, &response_cc);
        let mut fresh = freshness_lifetime(&candidate, &response_cc, request);
        if let Some(max_age) = request_cc.max_age {
            fresh = fresh.min(max_age);
        }
        let min_fresh = request_cc.min_fresh.unwrap_or_default();
        let max_stale = if response_cc.must_revalidate {
            Duration::ZERO
        } else {
            request_cc.max_stale.unwrap_or_default()
        };

        // A no-cache on either side forces revalidation of a fresh entry.
        if !request_cc.no_cache
            && !response_cc.no_cache
            && age.saturating_add(min_fresh) < fresh.saturating_add(max_stale)
        {
            if age.saturating_add(min_fresh) >= fresh {
                let _ = candidate
                    .headers
                    .append("Warning", "110 httpengine \"Response is stale\"");
            }
            if age > ONE_DAY && heuristic {
                let _ = candidate
                    .headers
                    .append("Warning", "113 httpengine \"Heuristic expiration\"");
            }
            tracing::debug!(url = %request.url(), age = ?age, fresh = ?fresh, "serving from cache");
            return CacheStrategy {
                decision: CacheDecision::Cache(candidate),
                request_headers,
            };
        }

        let etag = candidate.headers.get_str("etag").map(str::to_string);
        let last_modified = candidate.headers.get_str("last-modified").map(str::to_string);
        if etag.is_none() && last_modified.is_none() {
            return network(request_headers);
        }

        let mut conditional = request_headers;
        if let Some(etag) = etag {
            let _ = conditional.insert("If-None-Match", &etag);
        }
        if let Some(last_modified) = last_modified {
            let _ = conditional.insert("If-Modified-Since", &last_modified);
        }
        tracing::debug!(url = %request.url(), age = ?age, fresh = ?fresh, "revalidating cached response");
        CacheStrategy {
            decision: CacheDecision::ConditionalCache(candidate),
            request_headers: conditional,
        }
    }
}

/// Whether a stored response may be used for this request at all.
fn is_cacheable(candidate: &CachedResponse, request_headers: &OrderedHeaderMap) -> bool {
    if !is_response_cacheable(candidate.status.code, &candidate.headers, request_headers) {
        return false;
    }
    if cachecontrol::has_vary_all(&candidate.headers) {
        return false;
    }
    cachecontrol::vary_matches(&candidate.headers, &candidate.vary_headers, request_headers)
}

/// Whether a response with this status and these headers may be stored and
/// later served for a request carrying `request_headers`.
pub fn is_response_cacheable(
    status: StatusCode,
    response_headers: &OrderedHeaderMap,
    request_headers: &OrderedHeaderMap,
) -> bool {
    match status.as_u16() {
        200 | 203 | 300 | 301 | 410 => {}
        _ => return false,
    }

    let response_cc = CacheControl::parse(response_headers);
    let request_cc = CacheControl::parse(request_headers);
    if response_cc.no_store || request_cc.no_store {
        return false;
    }

    !(request_headers.contains("authorization")
        && !response_cc.is_public
        && !response_cc.must_revalidate
        && response_cc.s_max_age.is_none())
}

fn has_conditions(request_headers: &OrderedHeaderMap) -> bool {
    request_headers.contains("if-modified-since") || request_headers.contains("if-none-match")
}

/// Current age of the response (RFC 7234 4.2.3).
fn compute_age(candidate: &CachedResponse, now: SystemTime) -> Duration {
    let served = cachecontrol::date_header(&candidate.headers, "date");
    let apparent_received_age = served
        .and_then(|served| candidate.received_at.duration_since(served).ok())
        .unwrap_or_default();
    let received_age = match candidate
        .headers
        .get_str("age")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        Some(age) => apparent_received_age.max(Duration::from_secs(age)),
        None => apparent_received_age,
    };
    let response_duration = candidate
        .received_at
        .duration_since(candidate.sent_at)
        .unwrap_or_default();
    let resident_duration = now.duration_since(candidate.received_at).unwrap_or_default();
    received_age
        .saturating_add(response_duration)
        .saturating_add(resident_duration)
}

/// How long the response is fresh for, measured from its `Date`.
///
/// A response without a usable `Date` is treated as already stale.
fn freshness_lifetime(
    candidate: &CachedResponse,
    response_cc: &CacheControl,
    request: &HttpRequest,
) -> Duration {
    let Some(served) = cachecontrol::date_header(&candidate.headers, "date") else {
        return Duration::ZERO;
    };
    if let Some(max_age) = response_cc.max_age {
        return max_age;
    }
    if let Some(expires) = candidate.headers.get_str("expires") {
        return httpdate::parse(expires)
            .and_then(|expires| expires.duration_since(served).ok())
            .unwrap_or_default();
    }
    // Heuristic: 10% of the document's age when served. URLs with a query
    // never get one (RFC 7234 4.2.2).
    if request.url().query().is_none() {
        if let Some(last_modified) = cachecontrol::date_header(&candidate.headers, "last-modified")
        {
            return served
                .duration_since(last_modified)
                .map(|d| d / 10)
                .unwrap_or_default();
        }
    }
    Duration::ZERO
}

fn uses_heuristic_lifetime(candidate: &CachedResponse, response_cc: &CacheControl) -> bool {
    response_cc.max_age.is_none() && !candidate.headers.contains("expires")
}

/// Whether a network response confirms the cached one is still current.
pub fn validate(cached: &OrderedHeaderMap, network_status: StatusCode, network: &OrderedHeaderMap) -> bool {
    if network_status == StatusCode::NOT_MODIFIED {
        return true;
    }
    // The origin may answer a conditional GET with a full response that is
    // older than what we have.
    match (
        cachecontrol::date_header(cached, "last-modified"),
        cachecontrol::date_header(network, "last-modified"),
    ) {
        (Some(cached_lm), Some(network_lm)) => network_lm < cached_lm,
        _ => false,
    }
}

/// Merge the headers of a validated cached response with the network's.
///
/// Cached 1xx warnings are dropped; end-to-end fields present on the
/// network response replace the cached ones.
pub fn combine(cached: &OrderedHeaderMap, network: &OrderedHeaderMap) -> OrderedHeaderMap {
    let mut result = OrderedHeaderMap::new();
    for (name, value) in cached {
        if name.as_str() == "warning" && value.as_bytes().first() == Some(&b'1') {
            continue;
        }
        if is_end_to_end(name.as_str()) && network.contains(name.as_str()) {
            continue;
        }
        result.push(name.clone(), value.clone());
    }
    for (name, value) in network {
        if is_end_to_end(name.as_str()) {
            result.push(name.clone(), value.clone());
        }
    }
    result
}

/// `name` must be lowercase.
pub fn is_end_to_end(name: &str) -> bool {
    !HOP_BY_HOP.contains(&name)
}
