//! Client configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```rust
//! # #[cfg(feature = "json")] {
//! use httpengine::config::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "max_redirects": 5 }"#).unwrap();
//! assert_eq!(config.max_redirects, 5);
//! assert_eq!(config.max_idle_per_host, 5);
//! # }
//! ```

use crate::base::neterror::NetError;
use crate::http::request::default_user_agent;
use crate::socket::proxy::ProxySettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chromium's redirect limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub connect_timeout_ms: u64,
    /// `0` disables the socket read timeout.
    pub read_timeout_ms: u64,

    pub max_idle_per_host: usize,
    pub keep_alive_secs: u64,

    pub follow_redirects: bool,
    pub max_redirects: usize,

    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,

    pub cookies_enabled: bool,

    /// `http://host:port` of an HTTP proxy.
    pub proxy: Option<String>,
    /// NO_PROXY-style bypass list for `proxy`.
    pub no_proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            max_idle_per_host: 5,
            keep_alive_secs: 300,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            cache_enabled: true,
            cache_max_entries: 1000,
            cache_max_bytes: 50 * 1024 * 1024,
            cookies_enabled: true,
            proxy: None,
            no_proxy: None,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(|e| {
            tracing::warn!(error = %e, "invalid client configuration");
            NetError::JsonParseError
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// The configured proxy, with its bypass rules.
    pub fn proxy_settings(&self) -> Result<Option<ProxySettings>, NetError> {
        let Some(url) = &self.proxy else {
            return Ok(None);
        };
        let mut proxy = ProxySettings::new(url)?;
        if let Some(no_proxy) = &self.no_proxy {
            proxy = proxy.with_bypass(no_proxy);
        }
        Ok(Some(proxy))
    }
}
