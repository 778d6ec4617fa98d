//! HTTP Cache implementation.
//!
//! Chromium mapping: net/http/http_cache.h (simplified in-memory version)
//!
//! The engine talks to a cache through [`ResponseCache`]. [`HttpCache`] is
//! the bundled in-memory store:
//! - entries keyed by URL (fragment stripped), GET only
//! - text metadata record plus body bytes per entry
//! - entry-count and byte limits with oldest-first eviction
//! - invalidation on POST/PUT/PATCH/DELETE
//! - request/network/hit counters

use crate::base::neterror::NetError;
use crate::http::cachecontrol;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHead, ResponseSource, StatusLine, TlsHandshake};
use crate::http::responsebody::ResponseBody;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use dashmap::DashMap;
use http::Method;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// A stored response, as handed to the cache strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub url: Url,
    pub method: Method,
    pub status: StatusLine,
    pub headers: OrderedHeaderMap,
    /// The request headers named by the response's `Vary`.
    pub vary_headers: OrderedHeaderMap,
    pub body: Bytes,
    pub tls: Option<TlsHandshake>,
    pub sent_at: SystemTime,
    pub received_at: SystemTime,
}

impl CachedResponse {
    /// Describe `response` to `request` for storage. The body is filled in
    /// once it has been read.
    pub fn describe(request: &HttpRequest, response: &HttpResponse) -> Self {
        let now = SystemTime::now();
        Self {
            url: request.url().clone(),
            method: request.method().clone(),
            status: response.status_line().clone(),
            headers: response.headers().clone(),
            vary_headers: cachecontrol::vary_request_headers(response.headers(), request.headers()),
            body: Bytes::new(),
            tls: response.tls_handshake().cloned(),
            sent_at: response.sent_at().unwrap_or(now),
            received_at: response.received_at().unwrap_or(now),
        }
    }

    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status.clone(),
            headers: self.headers.clone(),
        }
    }

    /// A caller-facing response serving the stored body.
    pub fn to_response(&self) -> HttpResponse {
        HttpResponse::new(self.head())
            .with_body(ResponseBody::from_bytes(self.body.clone()))
            .with_tls(self.tls.clone())
            .with_times(self.sent_at, self.received_at)
    }

    /// Serialize everything but the body as a line-oriented record.
    pub fn encode_metadata(&self) -> String {
        let mut out = String::new();
        out.push_str(self.url.as_str());
        out.push('\n');
        out.push_str(self.method.as_str());
        out.push('\n');
        push_headers(&mut out, &self.vary_headers);
        out.push_str(&self.status.to_string());
        out.push('\n');
        push_headers(&mut out, &self.headers);
        out.push_str(&format!("{}\n{}\n", millis(self.sent_at), millis(self.received_at)));
        match &self.tls {
            None => out.push_str("-\n"),
            Some(tls) => {
                out.push_str("tls\n");
                out.push_str(&format!("{}\n{}\n", tls.protocol, tls.cipher_suite));
                out.push_str(&format!("{}\n", tls.peer_certificates.len()));
                for cert in &tls.peer_certificates {
                    out.push_str(&general_purpose::STANDARD.encode(cert));
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Parse a record written by [`encode_metadata`](Self::encode_metadata).
    pub fn decode(metadata: &str, body: Bytes) -> Result<Self, NetError> {
        let mut lines = metadata.split('\n');
        let mut next = || lines.next().ok_or(NetError::CacheReadFailure);

        let url = Url::parse(next()?).map_err(|_| NetError::CacheReadFailure)?;
        let method =
            Method::from_bytes(next()?.as_bytes()).map_err(|_| NetError::CacheReadFailure)?;
        let vary_headers = read_headers(&mut next)?;
        let status = StatusLine::parse(next()?).map_err(|_| NetError::CacheReadFailure)?;
        let headers = read_headers(&mut next)?;
        let sent_at = parse_millis(next()?)?;
        let received_at = parse_millis(next()?)?;
        let tls = match next()? {
            "-" => None,
            "tls" => {
                let protocol = next()?.to_string();
                let cipher_suite = next()?.to_string();
                let count = parse_count(next()?)?;
                let mut peer_certificates = Vec::with_capacity(count);
                for _ in 0..count {
                    let der = general_purpose::STANDARD
                        .decode(next()?)
                        .map_err(|_| NetError::CacheReadFailure)?;
                    peer_certificates.push(der);
                }
                Some(TlsHandshake {
                    protocol,
                    cipher_suite,
                    peer_certificates,
                })
            }
            _ => return Err(NetError::CacheReadFailure),
        };

        Ok(Self {
            url,
            method,
            status,
            headers,
            vary_headers,
            body,
            tls,
            sent_at,
            received_at,
        })
    }
}

fn push_headers(out: &mut String, headers: &OrderedHeaderMap) {
    out.push_str(&format!("{}\n", headers.len()));
    for (name, value) in headers {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push('\n');
    }
}

fn read_headers<'a>(
    next: &mut impl FnMut() -> Result<&'a str, NetError>,
) -> Result<OrderedHeaderMap, NetError> {
    let count = parse_count(next()?)?;
    let mut headers = OrderedHeaderMap::new();
    for _ in 0..count {
        headers
            .append_line(next()?)
            .map_err(|_| NetError::CacheReadFailure)?;
    }
    Ok(headers)
}

fn parse_count(line: &str) -> Result<usize, NetError> {
    line.parse().map_err(|_| NetError::CacheReadFailure)
}

fn millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

fn parse_millis(line: &str) -> Result<SystemTime, NetError> {
    let ms: u64 = line.parse().map_err(|_| NetError::CacheReadFailure)?;
    Ok(UNIX_EPOCH + Duration::from_millis(ms))
}

/// Whether `method` invalidates stored responses for its URL.
pub fn invalidates_cache(method: &Method) -> bool {
    *method == Method::POST
        || *method == Method::PUT
        || *method == Method::PATCH
        || *method == Method::DELETE
}

/// Destination for a response body being written into a cache.
pub trait CacheSink: Write + Send {
    /// The body was read completely; make the entry visible.
    fn commit(self: Box<Self>);
    /// The body was truncated or the exchange failed; store nothing.
    fn abort(self: Box<Self>);
}

/// The cache an engine consults. Implementations must be thread-safe.
pub trait ResponseCache: Send + Sync {
    /// The stored response for `request`, if any. A record that cannot be
    /// read yields `NetError::CacheReadFailure`.
    fn get(&self, request: &HttpRequest) -> Result<Option<CachedResponse>, NetError>;

    /// Offer `response` for storage. Returns a sink for its body when the
    /// cache wants it.
    fn put(&self, request: &HttpRequest, response: &HttpResponse) -> Option<Box<dyn CacheSink>>;

    /// Drop the stored response if `request` invalidates it. Returns
    /// whether anything was removed.
    fn maybe_remove(&self, request: &HttpRequest) -> bool;

    /// Drop whatever is stored for `url`.
    fn remove(&self, url: &Url);

    /// Replace the metadata of `cached` after a successful revalidation.
    fn update(&self, cached: &CachedResponse, combined: &HttpResponse);

    /// Count one response by where it came from.
    fn track_response(&self, source: ResponseSource);

    /// Count a conditional request answered from the cache.
    fn track_conditional_cache_hit(&self);
}

/// Cache mode for controlling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal caching behavior (RFC 7234)
    #[default]
    Normal,
    /// Bypass cache for reads and writes
    Disabled,
    /// Only read from cache, don't write
    ReadOnly,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub request_count: usize,
    pub network_count: usize,
    pub hit_count: usize,
    pub write_success_count: usize,
    pub write_abort_count: usize,
}

/// Key: URL without fragment.
fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

struct Entry {
    metadata: String,
    body: Bytes,
    seq: u64,
}

struct Store {
    entries: DashMap<String, Entry>,
    max_entries: usize,
    max_size_bytes: usize,
    current_size: AtomicUsize,
    seq: AtomicU64,
    request_count: AtomicUsize,
    network_count: AtomicUsize,
    hit_count: AtomicUsize,
    write_success: AtomicUsize,
    write_abort: AtomicUsize,
}

impl Store {
    fn insert(&self, key: String, metadata: String, body: Bytes) {
        let size = metadata.len() + body.len();
        if size > self.max_size_bytes {
            tracing::debug!(key = %key, size, "entry larger than cache, not stored");
            return;
        }
        self.remove_by_key(&key);
        self.maybe_evict(size);
        self.current_size.fetch_add(size, Ordering::Relaxed);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            Entry {
                metadata,
                body,
                seq,
            },
        );
    }

    fn remove_by_key(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.current_size
                    .fetch_sub(entry.metadata.len() + entry.body.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Evict entries if needed to make room.
    fn maybe_evict(&self, new_entry_size: usize) {
        while self.entries.len() >= self.max_entries && !self.entries.is_empty() {
            self.evict_oldest();
        }
        while self.current_size.load(Ordering::Relaxed) + new_entry_size > self.max_size_bytes
            && !self.entries.is_empty()
        {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().seq)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            tracing::debug!(key = %key, "evicting cache entry");
            self.remove_by_key(&key);
        }
    }
}

/// In-memory HTTP cache.
///
/// Thread-safe implementation using DashMap for concurrent access.
/// Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct HttpCache {
    store: Arc<Store>,
    mode: CacheMode,
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("entries", &self.len())
            .field("size_bytes", &self.size_bytes())
            .field("mode", &self.mode)
            .finish()
    }
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCache {
    /// Create a new cache with default limits.
    pub fn new() -> Self {
        Self::with_limits(1000, 50 * 1024 * 1024)
    }

    /// Create a cache with custom limits.
    pub fn with_limits(max_entries: usize, max_size_bytes: usize) -> Self {
        Self {
            store: Arc::new(Store {
                entries: DashMap::new(),
                max_entries: max_entries.max(1),
                max_size_bytes,
                current_size: AtomicUsize::new(0),
                seq: AtomicU64::new(0),
                request_count: AtomicUsize::new(0),
                network_count: AtomicUsize::new(0),
                hit_count: AtomicUsize::new(0),
                write_success: AtomicUsize::new(0),
                write_abort: AtomicUsize::new(0),
            }),
            mode: CacheMode::Normal,
        }
    }

    /// Set the cache mode.
    pub fn set_mode(&mut self, mode: CacheMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Store a pre-serialized record, e.g. one imported from elsewhere.
    pub fn insert_raw(&self, url: &Url, metadata: String, body: Bytes) {
        self.store.insert(cache_key(url), metadata, body);
    }

    /// Store a complete response.
    pub fn insert(&self, entry: &CachedResponse) {
        self.store
            .insert(cache_key(&entry.url), entry.encode_metadata(), entry.body.clone());
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.store.entries.clear();
        self.store.current_size.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }

    /// Current cache size in bytes, metadata included.
    pub fn size_bytes(&self) -> usize {
        self.store.current_size.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let s = &self.store;
        CacheStats {
            request_count: s.request_count.load(Ordering::Relaxed),
            network_count: s.network_count.load(Ordering::Relaxed),
            hit_count: s.hit_count.load(Ordering::Relaxed),
            write_success_count: s.write_success.load(Ordering::Relaxed),
            write_abort_count: s.write_abort.load(Ordering::Relaxed),
        }
    }
}

impl ResponseCache for HttpCache {
    fn get(&self, request: &HttpRequest) -> Result<Option<CachedResponse>, NetError> {
        if self.mode == CacheMode::Disabled || *request.method() != Method::GET {
            return Ok(None);
        }
        let key = cache_key(request.url());
        let Some((metadata, body)) = self
            .store
            .entries
            .get(&key)
            .map(|e| (e.metadata.clone(), e.body.clone()))
        else {
            return Ok(None);
        };

        let cached = CachedResponse::decode(&metadata, body)?;
        if cache_key(&cached.url) != key || cached.method != *request.method() {
            return Ok(None);
        }
        Ok(Some(cached))
    }

    fn put(&self, request: &HttpRequest, response: &HttpResponse) -> Option<Box<dyn CacheSink>> {
        if invalidates_cache(request.method()) {
            self.maybe_remove(request);
            return None;
        }
        if self.mode != CacheMode::Normal || *request.method() != Method::GET {
            return None;
        }
        if cachecontrol::has_vary_all(response.headers()) {
            return None;
        }

        let described = CachedResponse::describe(request, response);
        Some(Box::new(HttpCacheSink {
            store: Arc::clone(&self.store),
            key: cache_key(request.url()),
            metadata: described.encode_metadata(),
            buffer: Vec::new(),
        }))
    }

    fn maybe_remove(&self, request: &HttpRequest) -> bool {
        if !invalidates_cache(request.method()) {
            return false;
        }
        let removed = self.store.remove_by_key(&cache_key(request.url()));
        if removed {
            tracing::debug!(url = %request.url(), method = %request.method(), "cache entry invalidated");
        }
        removed
    }

    fn remove(&self, url: &Url) {
        self.store.remove_by_key(&cache_key(url));
    }

    fn update(&self, cached: &CachedResponse, combined: &HttpResponse) {
        if self.mode != CacheMode::Normal {
            return;
        }
        let updated = CachedResponse {
            status: combined.status_line().clone(),
            headers: combined.headers().clone(),
            sent_at: combined.sent_at().unwrap_or(cached.sent_at),
            received_at: combined.received_at().unwrap_or(cached.received_at),
            ..cached.clone()
        };
        self.insert(&updated);
    }

    fn track_response(&self, source: ResponseSource) {
        self.store.request_count.fetch_add(1, Ordering::Relaxed);
        match source {
            ResponseSource::Network | ResponseSource::ConditionalCache => {
                self.store.network_count.fetch_add(1, Ordering::Relaxed);
            }
            ResponseSource::Cache => {
                self.store.hit_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn track_conditional_cache_hit(&self) {
        self.store.hit_count.fetch_add(1, Ordering::Relaxed);
    }
}

struct HttpCacheSink {
    store: Arc<Store>,
    key: String,
    metadata: String,
    buffer: Vec<u8>,
}

impl Write for HttpCacheSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CacheSink for HttpCacheSink {
    fn commit(self: Box<Self>) {
        let this = *self;
        tracing::debug!(key = %this.key, size = this.buffer.len(), "cache entry committed");
        this.store
            .insert(this.key, this.metadata, Bytes::from(this.buffer));
        this.store.write_success.fetch_add(1, Ordering::Relaxed);
    }

    fn abort(self: Box<Self>) {
        tracing::debug!(key = %self.key, "cache write aborted");
        self.store.write_abort.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{StatusCode, Version};

    fn response(headers: &[(&str, &str)]) -> HttpResponse {
        let mut h = OrderedHeaderMap::new();
        for (n, v) in headers {
            h.append(n, v).unwrap();
        }
        HttpResponse::new(ResponseHead {
            status: StatusLine::new(Version::HTTP_11, StatusCode::OK, "OK"),
            headers: h,
        })
    }

    fn store(cache: &HttpCache, request: &HttpRequest, resp: &HttpResponse, body: &[u8]) {
        let mut sink = cache.put(request, resp).unwrap();
        sink.write_all(body).unwrap();
        sink.commit();
    }

    #[test]
    fn test_put_commit_get() {
        let cache = HttpCache::new();
        let request = HttpRequest::get("https://example.com/page#frag").unwrap();
        let resp = response(&[("Cache-Control", "max-age=3600"), ("ETag", "\"a\"")]);
        store(&cache, &request, &resp, b"hello");

        let cached = cache
            .get(&HttpRequest::get("https://example.com/page").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(cached.body, Bytes::from_static(b"hello"));
        assert_eq!(cached.headers.get_str("etag"), Some("\"a\""));
        assert_eq!(cached.status.code, StatusCode::OK);
        assert_eq!(cache.stats().write_success_count, 1);
    }

    #[test]
    fn test_abort_stores_nothing() {
        let cache = HttpCache::new();
        let request = HttpRequest::get("http://example.com/").unwrap();
        let mut sink = cache.put(&request, &response(&[])).unwrap();
        sink.write_all(b"partial").unwrap();
        sink.abort();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().write_abort_count, 1);
    }

    #[test]
    fn test_post_invalidates() {
        let cache = HttpCache::new();
        let get = HttpRequest::get("http://example.com/api").unwrap();
        store(&cache, &get, &response(&[]), b"data");

        let post = HttpRequest::post("http://example.com/api").unwrap();
        assert!(cache.put(&post, &response(&[])).is_none());
        assert!(cache.is_empty());
        assert!(!cache.maybe_remove(&post));
    }

    #[test]
    fn test_vary_star_not_stored() {
        let cache = HttpCache::new();
        let request = HttpRequest::get("http://example.com/").unwrap();
        assert!(cache.put(&request, &response(&[("Vary", "*")])).is_none());
    }

    #[test]
    fn test_corrupt_metadata() {
        let cache = HttpCache::new();
        let url = Url::parse("http://example.com/bad").unwrap();
        cache.insert_raw(&url, "http://example.com/bad\nGET\nnot-a-number\n".into(), Bytes::new());
        let request = HttpRequest::get("http://example.com/bad").unwrap();
        assert_eq!(cache.get(&request).unwrap_err(), NetError::CacheReadFailure);
    }

    #[test]
    fn test_metadata_roundtrip_with_tls_and_vary() {
        let request = HttpRequest::get("https://example.com/v")
            .unwrap()
            .with_header("Accept-Language", "en")
            .unwrap();
        let resp = response(&[("Vary", "Accept-Language"), ("Set-Cookie", "a=1")])
            .with_tls(Some(TlsHandshake {
                protocol: "TLSv1_3".into(),
                cipher_suite: "TLS13_AES_128_GCM_SHA256".into(),
                peer_certificates: vec![vec![1, 2, 3]],
            }))
            .with_times(UNIX_EPOCH + Duration::from_millis(1000), UNIX_EPOCH + Duration::from_millis(2500));
        let described = CachedResponse::describe(&request, &resp);
        let decoded = CachedResponse::decode(&described.encode_metadata(), Bytes::new()).unwrap();
        assert_eq!(decoded, described);
        assert_eq!(decoded.vary_headers.get_str("accept-language"), Some("en"));
    }

    #[test]
    fn test_entry_limit_evicts_oldest() {
        let cache = HttpCache::with_limits(2, 1024 * 1024);
        for path in ["a", "b", "c"] {
            let request = HttpRequest::get(&format!("http://example.com/{path}")).unwrap();
            store(&cache, &request, &response(&[]), path.as_bytes());
        }
        assert_eq!(cache.len(), 2);
        let first = HttpRequest::get("http://example.com/a").unwrap();
        assert!(cache.get(&first).unwrap().is_none());
    }

    #[test]
    fn test_size_limit() {
        let cache = HttpCache::with_limits(100, 64);
        let request = HttpRequest::get("http://example.com/big").unwrap();
        store(&cache, &request, &response(&[]), &[0u8; 128]);
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_tracking() {
        let cache = HttpCache::new();
        cache.track_response(ResponseSource::Network);
        cache.track_response(ResponseSource::ConditionalCache);
        cache.track_conditional_cache_hit();
        cache.track_response(ResponseSource::Cache);
        let stats = cache.stats();
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.network_count, 2);
        assert_eq!(stats.hit_count, 2);
    }

    #[test]
    fn test_update_replaces_metadata_keeps_body() {
        let cache = HttpCache::new();
        let request = HttpRequest::get("http://example.com/u").unwrap();
        store(&cache, &request, &response(&[("ETag", "\"1\"")]), b"body");
        let cached = cache.get(&request).unwrap().unwrap();

        let combined = response(&[("ETag", "\"1\""), ("X-Refreshed", "yes")]);
        cache.update(&cached, &combined);

        let refreshed = cache.get(&request).unwrap().unwrap();
        assert_eq!(refreshed.headers.get_str("x-refreshed"), Some("yes"));
        assert_eq!(refreshed.body, Bytes::from_static(b"body"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disabled_mode() {
        let mut cache = HttpCache::new();
        cache.set_mode(CacheMode::Disabled);
        let request = HttpRequest::get("http://example.com/").unwrap();
        assert!(cache.put(&request, &response(&[])).is_none());
        assert!(cache.get(&request).unwrap().is_none());
    }
}
