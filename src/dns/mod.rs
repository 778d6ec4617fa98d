//! DNS Resolution Module
//!
//! Provides pluggable, blocking DNS resolution with support for:
//! - System resolver (getaddrinfo)
//! - Hostname-to-IP override mechanism
//!
//! The `Resolve` trait is the seam a [`RouteSelector`](crate::socket::route::RouteSelector)
//! uses to turn a host into candidate socket addresses.
//!
//! # Example
//!
//! ```rust,ignore
//! use httpengine::dns::{GaiResolver, Name, Resolve};
//!
//! let resolver = GaiResolver::new();
//! for addr in resolver.resolve(Name::new("example.com"))? {
//!     println!("Resolved: {}", addr.ip());
//! }
//! ```

mod gai;
mod resolve;

pub use gai::GaiResolver;
pub use resolve::{DnsResolverWithOverrides, Name, Resolve};
