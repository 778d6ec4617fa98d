//! HTTP Client with builder pattern.
//!
//! Runs one [`HttpEngine`] per hop: redirects are followed on a fresh
//! engine that inherits the previous hop's connection, and connect
//! failures are retried on the next route.
//!
//! # Example
//!
//! ```rust,no_run
//! use httpengine::Client;
//!
//! let client = Client::builder().max_redirects(5).build()?;
//! let resp = client.get("http://example.com/").send()?;
//! println!("{} via {:?}", resp.status(), resp.source());
//! # Ok::<(), httpengine::NetError>(())
//! ```

use crate::base::neterror::NetError;
use crate::config::ClientConfig;
use crate::cookies::{CookieJar, CookieMonster};
use crate::dns::{DnsResolverWithOverrides, GaiResolver, Resolve};
use crate::http::engine::{EngineContext, HttpEngine};
use crate::http::httpcache::{HttpCache, ResponseCache};
use crate::http::request::{BodyMode, CachePolicy, HttpRequest};
use crate::http::requestbody::RequestBody;
use crate::http::response::HttpResponse;
use crate::socket::connectjob::ConnectOptions;
use crate::socket::manager::ConnectionManager;
use crate::socket::pool::{ConnectionPool, PoolConfig};
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::TlsConfig;
use http::Method;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use url::Url;

/// HTTP Client for making requests.
///
/// Use [`Client::builder()`] to configure and create a client. Clones share
/// the connection pool, cache and cookie jar.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    ctx: EngineContext,
    cache: Option<Arc<HttpCache>>,
    cookies: Option<Arc<CookieMonster>>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("ctx", &self.inner.ctx)
            .field("follow_redirects", &self.inner.config.follow_redirects)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new client with default settings.
    pub fn new() -> Result<Self, NetError> {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a PATCH request.
    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        let request = Url::parse(url.as_ref())
            .map_err(|_| NetError::InvalidUrl)
            .and_then(|url| HttpRequest::new(method, url));
        RequestBuilder {
            client: self.clone(),
            request,
        }
    }

    /// A bare engine for `request`, for callers that drive the exchange
    /// themselves.
    pub fn engine(&self, request: HttpRequest) -> HttpEngine {
        HttpEngine::new(self.inner.ctx.clone(), request, None)
    }

    /// Run `request` to completion, following redirects.
    ///
    /// The returned body releases the connection when it is read to the end
    /// or dropped.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        let config = &self.inner.config;
        let mut request = request;
        let mut handed_off = None;
        let mut redirects = 0;

        loop {
            let engine = HttpEngine::new(self.inner.ctx.clone(), request.clone(), handed_off.take());
            let mut engine = self.run(engine)?;

            let target = if config.follow_redirects {
                engine.response().and_then(|r| redirect_target(request.url(), r))
            } else {
                None
            };
            let Some((location, status)) = target else {
                return Self::finish(engine);
            };

            redirects += 1;
            if redirects > config.max_redirects {
                engine.release(false);
                return Err(NetError::TooManyRedirects);
            }
            tracing::debug!(from = %request.url(), to = %location, status, "following redirect");

            let next = request.redirected(location, status)?;
            drop(engine.take_response());
            engine.release(false);
            handed_off = engine.take_connection();
            request = next;
        }
    }

    /// Send and read one hop, moving to the next route on connect failures.
    fn run(&self, mut engine: HttpEngine) -> Result<HttpEngine, NetError> {
        loop {
            let result = engine.send_request().and_then(|()| engine.read_response());
            let Err(error) = result else {
                return Ok(engine);
            };
            match engine.recover(error) {
                Some(next) => engine = next,
                None => return Err(error),
            }
        }
    }

    /// Hand the response to the caller; its body owns the engine and
    /// releases it at end of stream.
    fn finish(mut engine: HttpEngine) -> Result<HttpResponse, NetError> {
        engine.automatically_release_connection_to_pool();
        let mut response = engine.take_response().ok_or(NetError::IllegalState)?;
        match response.take_body() {
            Some(body) => {
                let body = body.with_release_hook(Box::new(move || {
                    let mut engine = engine;
                    engine.release(false);
                }));
                response.set_body(Some(body));
            }
            None => engine.release(false),
        }
        Ok(response)
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        self.inner.ctx.manager.pool()
    }

    pub fn cache(&self) -> Option<&Arc<HttpCache>> {
        self.inner.cache.as_ref()
    }

    pub fn cookie_store(&self) -> Option<&Arc<CookieMonster>> {
        self.inner.cookies.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Close idle connections past their keep-alive.
    pub fn cleanup_idle(&self) {
        self.pool().cleanup();
    }
}

/// The resolved `Location` of a redirect response, with its status.
fn redirect_target(base: &Url, response: &HttpResponse) -> Option<(Url, u16)> {
    let status = response.status().as_u16();
    if !matches!(status, 300 | 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    let location = response.headers().get_str("location")?;
    let target = base.join(location).ok()?;
    matches!(target.scheme(), "http" | "https").then_some((target, status))
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    cache: Option<HttpCache>,
    cookie_store: Option<CookieMonster>,
    proxy: Option<ProxySettings>,
    resolver: Option<Arc<dyn Resolve>>,
    dns_overrides: HashMap<String, Vec<SocketAddr>>,
    tls: TlsConfig,
}

impl ClientBuilder {
    /// Start from a full configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.config.max_idle_per_host = max;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive_secs = keep_alive.as_secs();
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Use `cache` instead of a fresh one. Clones of an [`HttpCache`] share
    /// storage, so the caller may keep a handle.
    pub fn cache(mut self, cache: HttpCache) -> Self {
        self.config.cache_enabled = true;
        self.cache = Some(cache);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.config.cache_enabled = false;
        self.cache = None;
        self
    }

    /// Set cookie store.
    pub fn cookie_store(mut self, store: CookieMonster) -> Self {
        self.config.cookies_enabled = true;
        self.cookie_store = Some(store);
        self
    }

    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self.cookie_store = None;
        self
    }

    /// Set proxy.
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Pin `host` to `addrs`, bypassing DNS.
    pub fn resolve_to_addrs(mut self, host: &str, addrs: &[SocketAddr]) -> Self {
        self.dns_overrides.insert(host.to_string(), addrs.to_vec());
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Trust an extra root certificate (DER).
    pub fn add_root_certificate(mut self, der: Vec<u8>) -> Self {
        self.tls = self.tls.with_root_certificate(der);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, NetError> {
        let config = self.config;
        let tls = self.tls.build()?;
        let proxy = match self.proxy {
            Some(proxy) => Some(proxy),
            None => config.proxy_settings()?,
        };

        let base_resolver: Arc<dyn Resolve> = self
            .resolver
            .unwrap_or_else(|| Arc::new(GaiResolver::new()));
        let resolver: Arc<dyn Resolve> = if self.dns_overrides.is_empty() {
            base_resolver
        } else {
            Arc::new(DnsResolverWithOverrides::new(base_resolver, self.dns_overrides))
        };

        let pool = Arc::new(ConnectionPool::new(PoolConfig {
            max_idle_per_address: config.max_idle_per_host,
            keep_alive: config.keep_alive(),
        }));
        let manager = ConnectionManager::new(
            pool,
            resolver,
            proxy,
            ConnectOptions {
                connect_timeout: config.connect_timeout(),
                read_timeout: config.read_timeout(),
                tls,
            },
        );

        let cache = config.cache_enabled.then(|| {
            Arc::new(self.cache.unwrap_or_else(|| {
                HttpCache::with_limits(config.cache_max_entries, config.cache_max_bytes)
            }))
        });
        let cookies = config
            .cookies_enabled
            .then(|| Arc::new(self.cookie_store.unwrap_or_default()));

        let ctx = EngineContext {
            manager,
            cache: cache.clone().map(|c| c as Arc<dyn ResponseCache>),
            cookie_jar: cookies.clone().map(|c| c as Arc<dyn CookieJar>),
            user_agent: config.user_agent.clone(),
        };
        tracing::debug!(?ctx, "client built");

        Ok(Client {
            inner: Arc::new(ClientInner {
                ctx,
                cache,
                cookies,
                config,
            }),
        })
    }
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    request: Result<HttpRequest, NetError>,
}

impl RequestBuilder {
    fn map(mut self, f: impl FnOnce(HttpRequest) -> Result<HttpRequest, NetError>) -> Self {
        self.request = self.request.and_then(f);
        self
    }

    /// Add a header. An invalid name or value fails the request at `send`.
    pub fn header(self, key: &str, value: &str) -> Self {
        self.map(|r| r.with_header(key, value))
    }

    /// Set request body.
    pub fn body(self, body: impl Into<RequestBody>) -> Self {
        self.map(|r| Ok(r.with_body(body)))
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(self, json: &T) -> Self {
        let bytes = serde_json::to_vec(json).map_err(|_| NetError::JsonParseError);
        self.map(|r| {
            let bytes = bytes?;
            r.with_header("Content-Type", "application/json")
                .map(|r| r.with_body(bytes))
        })
    }

    pub fn cache_policy(self, policy: CachePolicy) -> Self {
        self.map(|r| Ok(r.with_cache_policy(policy)))
    }

    /// Answer from the cache or not at all (a 504 on a miss).
    pub fn only_if_cached(self) -> Self {
        self.cache_policy(CachePolicy {
            use_caches: true,
            only_if_cached: true,
        })
    }

    /// Neither read nor populate the cache.
    pub fn bypass_cache(self) -> Self {
        self.cache_policy(CachePolicy {
            use_caches: false,
            only_if_cached: false,
        })
    }

    pub fn if_modified_since(self, at: SystemTime) -> Self {
        self.map(|r| Ok(r.with_if_modified_since(at)))
    }

    pub fn body_mode(self, mode: BodyMode) -> Self {
        self.map(|r| Ok(r.with_body_mode(mode)))
    }

    /// The request as built so far.
    pub fn build(self) -> Result<HttpRequest, NetError> {
        self.request
    }

    /// Send the request.
    pub fn send(self) -> Result<HttpResponse, NetError> {
        let request = self.request?;
        self.client.execute(request)
    }
}
