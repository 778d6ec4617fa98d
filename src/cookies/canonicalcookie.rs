use time::OffsetDateTime;
use url::Url;

/// One stored cookie.
/// Modeled after Chromium's `net::CanonicalCookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub creation_time: OffsetDateTime,
    pub expiration_time: Option<OffsetDateTime>,
    pub secure: bool,
    pub http_only: bool,
    pub host_only: bool,
}

impl CanonicalCookie {
    /// A host-only session cookie.
    pub fn new(name: &str, value: &str, domain: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_ascii_lowercase(),
            path: path.to_string(),
            creation_time: OffsetDateTime::now_utc(),
            expiration_time: None,
            secure: false,
            http_only: false,
            host_only: true,
        }
    }

    /// Build from a `Set-Cookie` value received from `url`.
    ///
    /// Returns `None` for unparseable lines and for `Domain` attributes the
    /// origin may not set.
    pub fn from_set_cookie(url: &Url, line: &str) -> Option<Self> {
        let parsed = cookie::Cookie::parse(line).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                if !is_valid_cookie_domain(&d, &host) {
                    return None;
                }
                (d, false)
            }
            None => (host, true),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url),
        };

        let now = OffsetDateTime::now_utc();
        // Max-Age wins over Expires (RFC 6265 5.3).
        let expiration_time = match parsed.max_age() {
            Some(max_age) => Some(now + max_age),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        Some(Self {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            creation_time: now,
            expiration_time,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
        })
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        match self.expiration_time {
            Some(expiry) => expiry <= current_time,
            None => false,
        }
    }

    /// RFC 6265 domain matching.
    pub fn domain_matches(&self, request_host: &str) -> bool {
        if self.host_only {
            return self.domain.eq_ignore_ascii_case(request_host);
        }
        let host = request_host.to_ascii_lowercase();
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }

    /// RFC 6265 path matching.
    pub fn path_matches(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        request_path.starts_with(&self.path)
            && (self.path.ends_with('/') || request_path[self.path.len()..].starts_with('/'))
    }
}

/// A `Domain` attribute must cover the setting host and name more than a
/// bare top-level label. IP hosts may only set host-only cookies.
fn is_valid_cookie_domain(domain: &str, host: &str) -> bool {
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if host.parse::<std::net::IpAddr>().is_ok() {
        return domain == host;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// The directory of the request path (RFC 6265 5.1.4).
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}
