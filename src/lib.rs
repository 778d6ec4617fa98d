//! # httpengine
//!
//! A synchronous HTTP/1.1 exchange engine.
//!
//! For one logical HTTP call, an [`HttpEngine`](http::engine::HttpEngine)
//! decides between the local cache, the network, or a conditional
//! revalidation; checks a connection out of the pool and gives it back
//! exactly once; delegates wire framing to a [`Transport`](http::transport::Transport);
//! and hands back a correctly decoded response body.
//!
//! ## Features
//!
//! - **Caching**: RFC 7234 freshness, conditional revalidation, Vary matching
//! - **Connection Pooling**: 5 idle connections per address, 5 minute keep-alive
//! - **HTTP/1.x**: fixed-length, chunked and close-delimited bodies
//! - **Transparent gzip**: when the engine asked for it on the caller's behalf
//! - **Cookies**: RFC 6265 domain and path matching
//! - **Proxy Support**: HTTP proxies, CONNECT tunnels for https
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httpengine::Client;
//!
//! let client = Client::new()?;
//! let response = client.get("http://example.com/").send()?;
//! println!("Status: {}", response.status());
//! println!("{}", response.text()?);
//! # Ok::<(), httpengine::NetError>(())
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and load states
//! - [`http`] - Engine, cache strategy, cache store, transport, headers and bodies
//! - [`socket`] - Routes, connections, pooling, proxy and TLS
//! - [`dns`] - Pluggable blocking resolution
//! - [`cookies`] - Cookie jar
//! - [`client`] - Redirect-following client built on the engine
//! - [`config`] - Serializable client configuration

pub mod base;
pub mod client;
pub mod config;
pub mod cookies;
pub mod dns;
pub mod http;
pub mod socket;

pub use base::loadstate::LoadState;
pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use config::ClientConfig;
pub use http::{HttpEngine, HttpRequest, HttpResponse, ResponseSource};
