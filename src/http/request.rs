//! The request model handed to an [`HttpEngine`](crate::http::engine::HttpEngine).

use crate::base::neterror::NetError;
use crate::http::httpdate;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use http::Method;
use std::time::SystemTime;
use url::Url;

/// Per-request cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Consult and populate the response cache.
    pub use_caches: bool,
    /// Never touch the network; a cache miss yields a synthesized 504.
    pub only_if_cached: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            use_caches: true,
            only_if_cached: false,
        }
    }
}

/// How the request body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// Buffer the whole body, then send it with a computed `Content-Length`.
    #[default]
    Buffered,
    /// Stream exactly this many bytes.
    FixedLength(u64),
    /// Stream with chunked transfer coding, flushing every `n` bytes.
    Chunked(usize),
}

/// A single HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: OrderedHeaderMap,
    body: RequestBody,
    cache_policy: CachePolicy,
    if_modified_since: Option<SystemTime>,
    body_mode: BodyMode,
}

impl HttpRequest {
    /// Create a request. Only `http` and `https` URLs are accepted.
    pub fn new(method: Method, url: Url) -> Result<Self, NetError> {
        match url.scheme() {
            "http" | "https" => {}
            _ => return Err(NetError::UnknownUrlScheme),
        }
        if url.host_str().is_none() {
            return Err(NetError::InvalidUrl);
        }
        Ok(Self {
            method,
            url,
            headers: OrderedHeaderMap::new(),
            body: RequestBody::Empty,
            cache_policy: CachePolicy::default(),
            if_modified_since: None,
            body_mode: BodyMode::default(),
        })
    }

    pub fn get(url: &str) -> Result<Self, NetError> {
        Self::new(Method::GET, Url::parse(url).map_err(|_| NetError::InvalidUrl)?)
    }

    pub fn post(url: &str) -> Result<Self, NetError> {
        Self::new(Method::POST, Url::parse(url).map_err(|_| NetError::InvalidUrl)?)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, NetError> {
        self.headers.append(name, value)?;
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_if_modified_since(mut self, at: SystemTime) -> Self {
        self.if_modified_since = Some(at);
        self
    }

    pub fn with_body_mode(mut self, mode: BodyMode) -> Self {
        self.body_mode = mode;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn if_modified_since(&self) -> Option<SystemTime> {
        self.if_modified_since
    }

    pub fn body_mode(&self) -> BodyMode {
        self.body_mode
    }

    /// Whether the method carries a request body (POST, PUT, PATCH).
    pub fn permits_body(&self) -> bool {
        permits_request_body(&self.method)
    }

    /// Derive the request for a redirect target.
    ///
    /// 303 and POST redirects (other than 307/308) become bodiless GETs.
    /// Credentials are dropped when the origin changes.
    pub fn redirected(&self, location: Url, status: u16) -> Result<Self, NetError> {
        let keep_method = matches!(status, 307 | 308) || self.method == Method::HEAD;
        let mut next = Self::new(
            if keep_method {
                self.method.clone()
            } else {
                Method::GET
            },
            location,
        )?;
        next.cache_policy = self.cache_policy;
        next.body_mode = self.body_mode;
        if keep_method {
            next.body = self.body.clone();
        }

        let same_origin = next.url.origin() == self.url.origin();
        for (name, value) in self.headers.iter() {
            let name_str = name.as_str();
            if name_str == "host" || name_str == "cookie" {
                continue;
            }
            if !keep_method && matches!(name_str, "content-type" | "content-length") {
                continue;
            }
            if !same_origin && name_str == "authorization" {
                continue;
            }
            next.headers.push(name.clone(), value.clone());
        }
        Ok(next)
    }
}

/// Whether `method` carries a request body.
pub fn permits_request_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// `Host` header value: the host, plus the port when it is not the scheme default.
pub fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host.to_string()),
    }
}

/// Default `User-Agent` for requests that set none.
pub fn default_user_agent() -> String {
    format!("httpengine/{}", env!("CARGO_PKG_VERSION"))
}

/// Request target for the request line.
///
/// Requests through an HTTP proxy without a tunnel use the absolute form.
pub fn request_target(url: &Url, absolute_form: bool) -> String {
    if absolute_form {
        let mut absolute = url.clone();
        absolute.set_fragment(None);
        return absolute.to_string();
    }
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Fill in the headers every request carries.
///
/// Returns whether `Accept-Encoding: gzip` was added on the caller's behalf,
/// which makes response decompression transparent.
pub fn apply_default_headers(
    request: &mut HttpRequest,
    user_agent: &str,
    keep_alive: bool,
) -> Result<bool, NetError> {
    let has_body = request.permits_body();
    let if_modified_since = request.if_modified_since;
    let host = host_header(&request.url).ok_or(NetError::InvalidUrl)?;
    let headers = &mut request.headers;

    if !headers.contains("user-agent") {
        headers.insert("User-Agent", user_agent)?;
    }
    if !headers.contains("host") {
        headers.insert("Host", &host)?;
    }
    if keep_alive && !headers.contains("connection") {
        headers.insert("Connection", "Keep-Alive")?;
    }
    let transparent_gzip = !headers.contains("accept-encoding");
    if transparent_gzip {
        headers.insert("Accept-Encoding", "gzip")?;
    }
    if has_body && !headers.contains("content-type") {
        headers.insert("Content-Type", "application/x-www-form-urlencoded")?;
    }
    if let Some(at) = if_modified_since {
        headers.insert("If-Modified-Since", &httpdate::format(at))?;
    }
    Ok(transparent_gzip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_scheme() {
        let url = Url::parse("ftp://example.com/file").unwrap();
        assert_eq!(
            HttpRequest::new(Method::GET, url).unwrap_err(),
            NetError::UnknownUrlScheme
        );
    }

    #[test]
    fn test_host_header_omits_default_port() {
        let url = Url::parse("https://example.com:443/a").unwrap();
        assert_eq!(host_header(&url).unwrap(), "example.com");
        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(host_header(&url).unwrap(), "example.com:8080");
    }

    #[test]
    fn test_request_target() {
        let url = Url::parse("http://example.com/a/b?x=1#frag").unwrap();
        assert_eq!(request_target(&url, false), "/a/b?x=1");
        assert_eq!(request_target(&url, true), "http://example.com/a/b?x=1");
    }

    #[test]
    fn test_default_headers() {
        let mut request = HttpRequest::post("http://example.com/form").unwrap();
        let gzip = apply_default_headers(&mut request, "agent/1", true).unwrap();
        assert!(gzip);
        let h = request.headers();
        assert_eq!(h.get_str("user-agent"), Some("agent/1"));
        assert_eq!(h.get_str("host"), Some("example.com"));
        assert_eq!(h.get_str("connection"), Some("Keep-Alive"));
        assert_eq!(h.get_str("accept-encoding"), Some("gzip"));
        assert_eq!(
            h.get_str("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_caller_accept_encoding_disables_transparent_gzip() {
        let mut request = HttpRequest::get("http://example.com/")
            .unwrap()
            .with_header("Accept-Encoding", "identity")
            .unwrap();
        let gzip = apply_default_headers(&mut request, "agent/1", false).unwrap();
        assert!(!gzip);
        assert!(request.headers().get("connection").is_none());
        assert_eq!(request.headers().get_str("accept-encoding"), Some("identity"));
    }

    #[test]
    fn test_redirect_see_other_becomes_get() {
        let request = HttpRequest::post("http://example.com/form")
            .unwrap()
            .with_header("Authorization", "Basic abc")
            .unwrap()
            .with_body("a=1");
        let target = Url::parse("http://other.example.com/done").unwrap();
        let next = request.redirected(target, 303).unwrap();
        assert_eq!(next.method(), &Method::GET);
        assert!(next.body().is_empty());
        assert!(next.headers().get("authorization").is_none());
    }

    #[test]
    fn test_redirect_temporary_keeps_method_and_body() {
        let request = HttpRequest::post("http://example.com/a")
            .unwrap()
            .with_body("payload");
        let target = Url::parse("http://example.com/b").unwrap();
        let next = request.redirected(target, 307).unwrap();
        assert_eq!(next.method(), &Method::POST);
        assert_eq!(next.body().len(), 7);
    }
}
