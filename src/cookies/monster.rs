use crate::cookies::canonicalcookie::CanonicalCookie;
use crate::cookies::CookieJar;
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies per domain (Chromium default).
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Maximum cookies across all domains.
const MAX_COOKIES_TOTAL: usize = 3000;

/// In-memory cookie jar.
/// Modeled after Chromium's `net::CookieMonster`.
#[derive(Debug, Clone, Default)]
pub struct CookieMonster {
    // Domain -> cookies set for it.
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
}

impl CookieMonster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `cookie`, replacing one with the same name and path.
    /// An already-expired cookie deletes its match instead.
    pub fn set_canonical_cookie(&self, cookie: CanonicalCookie) {
        let now = OffsetDateTime::now_utc();
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();
        entry.retain(|c| c.name != cookie.name || c.path != cookie.path);
        if cookie.is_expired(now) {
            return;
        }

        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            let Some(oldest) = entry
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.creation_time)
                .map(|(i, _)| i)
            else {
                break;
            };
            entry.remove(oldest);
        }
        entry.push(cookie);
        drop(entry);

        self.enforce_global_limit();
    }

    fn enforce_global_limit(&self) {
        while self.total_cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, usize, OffsetDateTime)> = None;
            for entry in self.store.iter() {
                for (idx, cookie) in entry.value().iter().enumerate() {
                    let older = oldest
                        .as_ref()
                        .map_or(true, |(_, _, t)| cookie.creation_time < *t);
                    if older {
                        oldest = Some((entry.key().clone(), idx, cookie.creation_time));
                    }
                }
            }
            let Some((domain, idx, _)) = oldest else {
                break;
            };
            if let Some(mut entry) = self.store.get_mut(&domain) {
                if idx < entry.len() {
                    entry.remove(idx);
                }
            }
        }
    }

    /// Cookies to send to `url`, longest path first, then oldest first.
    pub fn get_cookies_for_url(&self, url: &Url) -> Vec<CanonicalCookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let host = host.to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();
        let secure = url.scheme() == "https";

        let mut result = Vec::new();
        for domain in matching_domains(&host) {
            let Some(entry) = self.store.get(&domain) else {
                continue;
            };
            result.extend(
                entry
                    .iter()
                    .filter(|c| c.domain_matches(&host))
                    .filter(|c| c.path_matches(url.path()))
                    .filter(|c| secure || !c.secure)
                    .filter(|c| !c.is_expired(now))
                    .cloned(),
            );
        }

        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) {
        match CanonicalCookie::from_set_cookie(url, cookie_line) {
            Some(cookie) => self.set_canonical_cookie(cookie),
            None => tracing::debug!(url = %url, "rejected Set-Cookie"),
        }
    }

    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl CookieJar for CookieMonster {
    fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.get_cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn save_response_cookies(&self, url: &Url, set_cookie: &[String]) {
        for line in set_cookie {
            self.parse_and_save_cookie(url, line);
        }
    }
}

/// The host and each parent domain, e.g. `a.b.example.com`,
/// `b.example.com`, `example.com`.
fn matching_domains(host: &str) -> Vec<String> {
    let mut domains = vec![host.to_string()];
    if host.parse::<std::net::IpAddr>().is_ok() {
        return domains;
    }
    let parts: Vec<&str> = host.split('.').collect();
    for i in 1..parts.len().saturating_sub(1) {
        domains.push(parts[i..].join("."));
    }
    domains
}
