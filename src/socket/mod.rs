//! Socket and connection management.
//!
//! Mirrors Chromium's `net/socket/` for a blocking HTTP/1.1 client:
//! - [`route`]: addresses, routes and route selection
//! - [`connectjob`]: TCP → proxy tunnel → TLS connection flow
//! - [`connection`]: pooled connection with exactly-once disposal
//! - [`pool`]: idle connection pooling (5 per address, 5 minute keep-alive)
//! - [`manager`]: acquire / recycle / discard for engines
//! - [`proxy`]: HTTP proxy with NO_PROXY bypass
//! - [`tls`]: rustls client configuration and handshake

pub mod client;
pub mod connectjob;
pub mod connection;
pub mod manager;
pub mod pool;
pub mod proxy;
pub mod route;
pub mod tls;

pub use connection::{Connection, ConnectionState};
pub use manager::ConnectionManager;
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use proxy::ProxySettings;
pub use route::{Address, Route, RouteDatabase, RouteSelector};
