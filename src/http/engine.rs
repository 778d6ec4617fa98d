//! One HTTP exchange: cache decision, connection, request, response.
//!
//! Chromium mapping: net/http/http_network_transaction.cc together with
//! net/http/http_cache_transaction.cc
//!
//! The engine is driven by two calls. [`HttpEngine::send_request`] decides
//! where the response comes from and, when the network is needed, binds a
//! connection. [`HttpEngine::read_response`] writes the request and reads the
//! response head, revalidating a conditional cache hit on the way.

use crate::base::context::io_to_net_error;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::cookies::CookieJar;
use crate::http::cachecontrol::{self, CacheControl};
use crate::http::cachestrategy::{self, CacheDecision, CacheStrategy};
use crate::http::contentdecoder::{self, GzipBody};
use crate::http::http1transport::Http1Transport;
use crate::http::httpcache::{CacheSink, CachedResponse, ResponseCache};
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::{self, HttpRequest};
use crate::http::requestbody::{RequestBody, RequestBodySink};
use crate::http::response::{HttpResponse, ResponseHead, ResponseSource, StatusLine};
use crate::http::responsebody::ResponseBody;
use crate::http::transport::{TransferStream, Transport};
use crate::socket::connection::Connection;
use crate::socket::manager::ConnectionManager;
use crate::socket::route::RouteSelector;
use http::{Method, StatusCode};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Lifecycle of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    SourceDecided,
    /// A connection is being acquired or is bound; the request has not
    /// been sent.
    Connecting,
    RequestSent,
    ResponseRead,
    CacheServed,
    Released,
}

impl EngineState {
    fn can_transition(self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, to),
            (Created, SourceDecided)
                | (SourceDecided, Connecting)
                | (SourceDecided, CacheServed)
                | (Connecting, RequestSent)
                | (RequestSent, ResponseRead)
                | (_, Released)
        )
    }

    fn to_load_state(self) -> LoadState {
        match self {
            EngineState::Created | EngineState::Released | EngineState::CacheServed => {
                LoadState::Idle
            }
            EngineState::SourceDecided => LoadState::WaitingForCache,
            EngineState::Connecting => LoadState::Connecting,
            EngineState::RequestSent => LoadState::WaitingForResponse,
            EngineState::ResponseRead => LoadState::ReadingResponse,
        }
    }
}

/// Collaborators shared by every exchange a client runs.
#[derive(Clone)]
pub struct EngineContext {
    pub manager: ConnectionManager,
    pub cache: Option<Arc<dyn ResponseCache>>,
    pub cookie_jar: Option<Arc<dyn CookieJar>>,
    pub user_agent: String,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("manager", &self.manager)
            .field("cache", &self.cache.is_some())
            .field("cookie_jar", &self.cookie_jar.is_some())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Counts body bytes read off the wire.
struct CountingReader {
    inner: TransferStream,
    count: Arc<AtomicU64>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// A single HTTP request/response exchange.
pub struct HttpEngine {
    ctx: EngineContext,
    /// The request as the caller built it, kept for [`recover`](Self::recover).
    user_request: HttpRequest,
    /// The request as sent, with default headers and validators.
    request: HttpRequest,
    state: EngineState,
    decision: Option<CacheDecision>,
    source: Option<ResponseSource>,

    selector: Option<RouteSelector>,
    /// A connection handed over from a previous exchange (redirects).
    handed_off: Option<Arc<Connection>>,
    connection: Option<Arc<Connection>>,
    /// Set once the connection has been given back, or is held for hand-off.
    connection_released: bool,
    connection_reused: bool,
    auto_release: bool,

    transport: Option<Box<dyn Transport>>,
    request_body: Option<RequestBodySink>,
    request_headers_written: bool,
    /// A transport call failed; the stream position is unknown.
    failed: bool,
    transparent_gzip: bool,
    sent_at: Option<SystemTime>,

    transfer_stream: Option<TransferStream>,
    response: Option<HttpResponse>,
    response_materialized: bool,
    network_bytes: Arc<AtomicU64>,
}

impl fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEngine")
            .field("url", &self.request.url().as_str())
            .field("state", &self.state)
            .field("source", &self.source)
            .field("connection", &self.connection.as_ref().map(|c| c.id()))
            .finish_non_exhaustive()
    }
}

impl HttpEngine {
    /// Create an exchange for `request`. `handed_off` is a connection
    /// released by a previous exchange that may be reused for this one.
    pub fn new(
        ctx: EngineContext,
        request: HttpRequest,
        handed_off: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            ctx,
            user_request: request.clone(),
            request,
            state: EngineState::Created,
            decision: None,
            source: None,
            selector: None,
            handed_off,
            connection: None,
            connection_released: false,
            connection_reused: false,
            auto_release: false,
            transport: None,
            request_body: None,
            request_headers_written: false,
            failed: false,
            transparent_gzip: false,
            sent_at: None,
            transfer_stream: None,
            response: None,
            response_materialized: false,
            network_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    fn transition(&mut self, to: EngineState) -> Result<(), NetError> {
        if !self.state.can_transition(to) {
            tracing::warn!(from = ?self.state, to = ?to, "illegal engine transition");
            return Err(NetError::IllegalState);
        }
        self.state = to;
        Ok(())
    }

    /// Decide the response source and, if the network is needed, bind a
    /// connection. Calling it again once the source is decided does nothing.
    pub fn send_request(&mut self) -> Result<(), NetError> {
        if self.state != EngineState::Created {
            return Ok(());
        }

        self.prepare_request_headers()?;
        let candidate = self.cache_candidate();
        let strategy = CacheStrategy::compute(SystemTime::now(), &self.request, candidate);
        *self.request.headers_mut() = strategy.request_headers;
        let decision = strategy.decision;

        if let Some(cache) = &self.ctx.cache {
            cache.track_response(decision.source());
        }
        self.transition(EngineState::SourceDecided)?;

        if self.is_only_if_cached() && !matches!(decision, CacheDecision::Cache(_)) {
            // Forbidden from using the network, and the cache is insufficient.
            tracing::debug!(url = %self.request.url(), "only-if-cached miss");
            self.source = Some(ResponseSource::Cache);
            let response = HttpResponse::new(ResponseHead {
                status: StatusLine::gateway_timeout(),
                headers: OrderedHeaderMap::new(),
            })
            .with_body(ResponseBody::empty());
            return self.serve_without_network(response);
        }

        match decision {
            CacheDecision::Cache(candidate) => {
                tracing::debug!(url = %self.request.url(), "response served from cache");
                self.source = Some(ResponseSource::Cache);
                let body = ResponseBody::from_bytes(candidate.body.clone());
                let has_body = !candidate.body.is_empty();
                let response = self.init_content_stream(candidate.to_response(), body, has_body);
                self.serve_without_network(response)
            }
            decision => {
                self.source = Some(decision.source());
                self.decision = Some(decision);
                self.connect()
            }
        }
    }

    /// Set by the cache policy or a `Cache-Control: only-if-cached` header.
    fn is_only_if_cached(&self) -> bool {
        self.request.cache_policy().only_if_cached
            || CacheControl::parse(self.request.headers()).only_if_cached
    }

    fn serve_without_network(&mut self, mut response: HttpResponse) -> Result<(), NetError> {
        if let Some(conn) = self.handed_off.take() {
            self.ctx.manager.recycle(&conn);
        }
        if let Some(source) = self.source {
            response.set_source(source);
        }
        self.response = Some(response);
        self.response_materialized = true;
        self.transition(EngineState::CacheServed)
    }

    fn prepare_request_headers(&mut self) -> Result<(), NetError> {
        let keep_alive = self
            .handed_off
            .as_ref()
            .map(|c| c.http_minor_version() != 0)
            .unwrap_or(true);
        let user_agent = self.ctx.user_agent.clone();
        self.transparent_gzip =
            request::apply_default_headers(&mut self.request, &user_agent, keep_alive)?;

        if let Some(jar) = &self.ctx.cookie_jar {
            if !self.request.headers().contains("cookie") {
                if let Some(cookies) = jar.cookie_header(self.request.url()) {
                    self.request.headers_mut().insert("Cookie", &cookies)?;
                }
            }
        }
        Ok(())
    }

    /// The stored response for this request, if caching applies. A corrupt
    /// entry is dropped and treated as a miss.
    fn cache_candidate(&self) -> Option<CachedResponse> {
        let cache = self.ctx.cache.as_ref()?;
        if !self.request.cache_policy().use_caches {
            return None;
        }
        match cache.get(&self.request) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(url = %self.request.url(), error = %e, "discarding unreadable cache entry");
                cache.remove(self.request.url());
                None
            }
        }
    }

    fn connect(&mut self) -> Result<(), NetError> {
        self.transition(EngineState::Connecting)?;

        let address = self.ctx.manager.address_for(self.request.url())?;
        let conn = match self.handed_off.take() {
            Some(conn) if *conn.route().address() == address => {
                conn.mark_used();
                conn
            }
            other => {
                if let Some(stale) = other {
                    self.ctx.manager.recycle(&stale);
                }
                if self.selector.is_none() {
                    self.selector = Some(self.ctx.manager.route_selector(self.request.url())?);
                }
                let selector = self.selector.as_mut().ok_or(NetError::IllegalState)?;
                self.ctx.manager.acquire(selector)?
            }
        };
        tracing::debug!(
            url = %self.request.url(),
            id = conn.id(),
            reused = conn.use_count() > 1,
            "connection bound"
        );
        self.connection_reused = conn.use_count() > 1;
        self.connection = Some(Arc::clone(&conn));
        self.connection_released = false;

        let mut transport: Box<dyn Transport> = Box::new(Http1Transport::new(conn));
        transport.prepare_request_headers(&mut self.request)?;
        if self.request.permits_body() {
            let mut sink = transport.create_request_body(&self.request)?;
            if sink.is_streaming() {
                self.sent_at = Some(SystemTime::now());
                transport.write_request_headers(&self.request)?;
                self.request_headers_written = true;
            }
            if let RequestBody::Bytes(bytes) = self.request.body() {
                sink.write_all(bytes).map_err(|e| io_to_net_error(&e))?;
            }
            self.request_body = Some(sink);
        }
        self.transport = Some(transport);
        Ok(())
    }

    /// The writable request body. `None` for methods without one.
    pub fn request_body(&mut self) -> Result<Option<&mut RequestBodySink>, NetError> {
        if self.state == EngineState::Created {
            return Err(NetError::IllegalState);
        }
        Ok(self.request_body.as_mut())
    }

    /// Send the request and read the response head. Idempotent once a
    /// response exists. After an error the exchange cannot be resumed and
    /// its connection is discarded at release.
    pub fn read_response(&mut self) -> Result<(), NetError> {
        if self.response_materialized {
            if let (Some(response), Some(source)) = (self.response.as_mut(), self.source) {
                response.set_source(source);
            }
            return Ok(());
        }
        if self.state != EngineState::Connecting || self.failed {
            return Err(NetError::IllegalState);
        }
        let result = self.exchange();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn exchange(&mut self) -> Result<(), NetError> {
        let transport = self.transport.as_mut().ok_or(NetError::IllegalState)?;

        if !self.request_headers_written {
            if let Some(len) = self.request_body.as_ref().and_then(|b| b.content_length()) {
                self.request.headers_mut().remove("transfer-encoding");
                self.request
                    .headers_mut()
                    .insert("Content-Length", &len.to_string())?;
            }
            self.sent_at = Some(SystemTime::now());
            transport.write_request_headers(&self.request)?;
            self.request_headers_written = true;
        }
        if let Some(sink) = self.request_body.as_mut() {
            sink.close()?;
            transport.write_request_body(sink)?;
        }
        transport.flush_request()?;
        self.transition(EngineState::RequestSent)?;

        let transport = self.transport.as_mut().ok_or(NetError::IllegalState)?;
        let head = loop {
            let head = transport.read_response_headers()?;
            if head.status.code != StatusCode::CONTINUE {
                break head;
            }
        };
        let received_at = SystemTime::now();
        let sent_at = self.sent_at.unwrap_or(received_at);
        self.save_cookies(&head.headers);

        let tls = self.connection.as_ref().and_then(|c| c.tls_handshake().cloned());
        let response = HttpResponse::new(head)
            .with_tls(tls)
            .with_times(sent_at, received_at);

        if let Some(CacheDecision::ConditionalCache(candidate)) = &self.decision {
            if cachestrategy::validate(&candidate.headers, response.status(), response.headers()) {
                return self.serve_validated(response);
            }
            tracing::debug!(url = %self.request.url(), "conditional request not satisfied");
            self.decision = Some(CacheDecision::Network);
        }

        let has_body = has_response_body(self.request.method(), &response);
        let cache_sink = if has_body { self.maybe_cache(&response) } else { None };
        let transport = self.transport.as_mut().ok_or(NetError::IllegalState)?;
        let stream = transport.get_transfer_stream(&response.head(), has_body, cache_sink)?;
        self.transfer_stream = Some(stream.clone());

        let body = ResponseBody::from_reader(Box::new(CountingReader {
            inner: stream,
            count: Arc::clone(&self.network_bytes),
        }));
        let mut response = self.init_content_stream(response, body, has_body);
        response.set_source(ResponseSource::Network);
        self.response = Some(response);
        self.response_materialized = true;
        self.transition(EngineState::ResponseRead)
    }

    /// The network confirmed the cached candidate: serve it with merged
    /// headers and give the connection back.
    fn serve_validated(&mut self, network: HttpResponse) -> Result<(), NetError> {
        let Some(CacheDecision::ConditionalCache(candidate)) = self.decision.take() else {
            return Err(NetError::IllegalState);
        };

        // Frame (and so drain) whatever body the validation carried.
        let has_body = has_response_body(self.request.method(), &network);
        if let Some(transport) = self.transport.as_mut() {
            let stream = transport.get_transfer_stream(&network.head(), has_body, None)?;
            self.transfer_stream = Some(stream);
        }
        self.release_connection(false);

        let headers = cachestrategy::combine(&candidate.headers, network.headers());
        let mut combined = HttpResponse::new(ResponseHead {
            status: candidate.status.clone(),
            headers,
        })
        .with_tls(candidate.tls.clone());
        if let (Some(sent), Some(received)) = (network.sent_at(), network.received_at()) {
            combined = combined.with_times(sent, received);
        }

        if let Some(cache) = &self.ctx.cache {
            cache.track_conditional_cache_hit();
            cache.update(&candidate, &combined);
        }
        tracing::debug!(url = %self.request.url(), "conditional cache hit");

        let body = ResponseBody::from_bytes(candidate.body.clone());
        let mut response = self.init_content_stream(combined, body, !candidate.body.is_empty());
        response.set_source(ResponseSource::ConditionalCache);
        self.response = Some(response);
        self.response_materialized = true;
        self.transition(EngineState::ResponseRead)
    }

    fn save_cookies(&self, headers: &OrderedHeaderMap) {
        let Some(jar) = &self.ctx.cookie_jar else {
            return;
        };
        let values: Vec<String> = headers
            .get_all("set-cookie")
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            jar.save_response_cookies(self.request.url(), &values);
        }
    }

    /// Offer a network response to the cache, or invalidate the entry it
    /// makes stale.
    fn maybe_cache(&self, response: &HttpResponse) -> Option<Box<dyn CacheSink>> {
        let cache = self.ctx.cache.as_ref()?;
        if !self.request.cache_policy().use_caches {
            return None;
        }
        if !cachestrategy::is_response_cacheable(
            response.status(),
            response.headers(),
            self.request.headers(),
        ) {
            cache.maybe_remove(&self.request);
            return None;
        }
        cache.put(&self.request, response)
    }

    /// Attach `body` to `response`, gunzipping it when the engine asked for
    /// gzip on the caller's behalf.
    fn init_content_stream(
        &self,
        mut response: HttpResponse,
        body: ResponseBody,
        has_body: bool,
    ) -> HttpResponse {
        if has_body && contentdecoder::should_decode(self.transparent_gzip, response.headers()) {
            contentdecoder::strip_encoding_headers(response.headers_mut());
            response.set_body(Some(ResponseBody::from_reader(Box::new(GzipBody::new(body)))));
        } else {
            response.set_body(Some(body));
        }
        response
    }

    /// Finish with the connection. A canceled exchange, or one whose
    /// connection cannot carry another request, discards it; otherwise it
    /// is recycled now or held for [`take_connection`](Self::take_connection).
    /// Safe to call more than once.
    pub fn release(&mut self, canceled: bool) {
        if let Some(CacheDecision::ConditionalCache(_)) = self.decision {
            self.decision = None;
        }
        self.release_connection(canceled);
        if let Some(conn) = self.handed_off.take() {
            self.ctx.manager.recycle(&conn);
        }
        self.state = EngineState::Released;
    }

    fn release_connection(&mut self, canceled: bool) {
        if self.connection_released {
            return;
        }
        let Some(conn) = self.connection.clone() else {
            return;
        };
        self.connection_released = true;

        // A request on the wire with no response read leaves the stream
        // position unknown.
        let exchange_complete = self.transfer_stream.is_some() || !self.request_headers_written;
        let reusable = !canceled
            && !self.failed
            && exchange_complete
            && self
                .transport
                .as_mut()
                .map(|t| {
                    t.make_reusable(
                        canceled,
                        self.request_body.as_ref(),
                        self.transfer_stream.as_ref(),
                    )
                })
                .unwrap_or(false);

        if !reusable {
            tracing::debug!(id = conn.id(), canceled, "discarding connection");
            self.ctx.manager.discard(&conn);
            self.connection = None;
        } else if self.auto_release {
            self.ctx.manager.recycle(&conn);
            self.connection = None;
        }
    }

    /// Return the connection to the pool at release instead of holding it.
    /// If it is already released and held, it is recycled now.
    pub fn automatically_release_connection_to_pool(&mut self) {
        self.auto_release = true;
        if self.connection_released {
            if let Some(conn) = self.connection.take() {
                self.ctx.manager.recycle(&conn);
            }
        }
    }

    /// Take a released, reusable connection to hand to the next exchange.
    pub fn take_connection(&mut self) -> Option<Arc<Connection>> {
        if self.connection_released {
            self.connection.take()
        } else {
            None
        }
    }

    /// A fresh engine for the same request after `error`, or `None` when
    /// the failure is not worth retrying.
    ///
    /// Connect failures move on to the next route. A stale pooled
    /// connection that died before answering is retried once on another
    /// connection. Requests whose body was streamed cannot be replayed.
    pub fn recover(mut self, error: NetError) -> Option<HttpEngine> {
        if self.request_body.as_ref().map(|b| b.is_streaming()).unwrap_or(false) {
            return None;
        }
        let has_next = self.selector.as_ref().map(|s| s.has_next()).unwrap_or(false);
        let connect_retry = error.is_connect_failure() && has_next;
        let stale_retry = self.connection_reused
            && matches!(
                error,
                NetError::EmptyResponse
                    | NetError::ConnectionClosed
                    | NetError::ConnectionReset
                    | NetError::ConnectionAborted
            );
        if !connect_retry && !stale_retry {
            return None;
        }
        tracing::debug!(url = %self.request.url(), error = %error, "recovering exchange");

        self.release_connection(true);
        let mut request = self.user_request.clone();
        if let Some(buffered) = self.request_body.as_ref().and_then(|b| b.buffered()) {
            if !buffered.is_empty() {
                request = request.with_body(buffered.to_vec());
            }
        }
        let mut next = HttpEngine::new(self.ctx.clone(), request, None);
        next.selector = self.selector.take();
        next.auto_release = self.auto_release;
        Some(next)
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<HttpResponse> {
        self.response.take()
    }

    pub fn response_source(&self) -> Option<ResponseSource> {
        self.source
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn load_state(&self) -> LoadState {
        self.state.to_load_state()
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Response body bytes read from the network so far.
    pub fn network_bytes(&self) -> u64 {
        self.network_bytes.load(Ordering::Relaxed)
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        if let Some(conn) = self.handed_off.take() {
            self.ctx.manager.recycle(&conn);
        }
        if let Some(conn) = self.connection.take() {
            if self.connection_released {
                self.ctx.manager.recycle(&conn);
            } else {
                tracing::debug!(id = conn.id(), "engine dropped with connection in use");
                self.ctx.manager.discard(&conn);
            }
        }
    }
}

/// Whether a response carries a body (RFC 7230 3.3.3).
pub fn has_response_body(method: &Method, response: &HttpResponse) -> bool {
    if *method == Method::HEAD {
        return false;
    }
    let code = response.status().as_u16();
    if (code < 100 || code >= 200)
        && code != StatusCode::NO_CONTENT.as_u16()
        && code != StatusCode::NOT_MODIFIED.as_u16()
    {
        return true;
    }
    // The status says no body, but framing headers disagree.
    cachecontrol::content_length(response.headers()).is_some()
        || cachecontrol::is_chunked(response.headers())
}
