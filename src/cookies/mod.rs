//! Cookie storage consulted by the engine.
//!
//! | Chromium (C++) | httpengine | Responsibility |
//! |----------------|------------|----------------|
//! | `net::CookieStore` | [`CookieJar`] | What the engine needs from a jar |
//! | `net::CookieMonster` | [`CookieMonster`] | In-memory jar with eviction |
//! | `net::CanonicalCookie` | [`CanonicalCookie`] | Single cookie representation |

pub mod canonicalcookie;
pub mod monster;

pub use canonicalcookie::CanonicalCookie;
pub use monster::CookieMonster;

use url::Url;

/// A cookie store as seen by an exchange.
pub trait CookieJar: Send + Sync {
    /// The `Cookie` header value for a request to `url`, if any apply.
    fn cookie_header(&self, url: &Url) -> Option<String>;

    /// Store the `Set-Cookie` values of a response from `url`.
    fn save_response_cookies(&self, url: &Url, set_cookie: &[String]);
}
