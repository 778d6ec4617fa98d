//! Addresses, routes and route selection.
//!
//! An [`Address`] is what a request needs to reach (origin plus proxy); a
//! [`Route`] is one concrete way to reach it (a resolved socket address).
//! The [`RouteSelector`] yields routes in order, pushing routes that failed
//! recently to the back.

use crate::base::neterror::NetError;
use crate::dns::{Name, Resolve};
use crate::socket::proxy::ProxySettings;
use dashmap::DashSet;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

/// The origin a connection is for. Connections are pooled per address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    tls: bool,
    host: String,
    port: u16,
    proxy: Option<ProxySettings>,
}

impl Address {
    /// Build the address for `url`. The proxy is dropped when its bypass
    /// rules match the target host.
    pub fn from_url(url: &Url, proxy: Option<&ProxySettings>) -> Result<Self, NetError> {
        let tls = match url.scheme() {
            "https" => true,
            "http" => false,
            _ => return Err(NetError::UnknownUrlScheme),
        };
        let host = url.host_str().ok_or(NetError::InvalidUrl)?.to_string();
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        let proxy = proxy.filter(|p| !p.should_bypass(&host)).cloned();
        Ok(Self {
            tls,
            host,
            port,
            proxy,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    /// The host and port the TCP connection is made to.
    fn connect_target(&self) -> (&str, u16) {
        match &self.proxy {
            Some(p) => (p.host(), p.port()),
            None => (&self.host, self.port),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)?;
        if let Some(p) = &self.proxy {
            write!(f, " via {}:{}", p.host(), p.port())?;
        }
        Ok(())
    }
}

/// One concrete way to reach an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    address: Address,
    socket_addr: SocketAddr,
}

impl Route {
    pub fn new(address: Address, socket_addr: SocketAddr) -> Self {
        Self {
            address,
            socket_addr,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The socket address dialed: the proxy's when proxied.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    pub fn via_proxy(&self) -> bool {
        self.address.proxy.is_some()
    }

    /// HTTPS through an HTTP proxy needs a `CONNECT` tunnel.
    pub fn requires_tunnel(&self) -> bool {
        self.via_proxy() && self.address.tls
    }

    /// Plain HTTP through a proxy sends absolute-form request targets.
    pub fn uses_absolute_form(&self) -> bool {
        self.via_proxy() && !self.address.tls
    }
}

/// Routes that failed recently. Shared by every selector of a client.
#[derive(Debug, Default)]
pub struct RouteDatabase {
    failed: DashSet<Route>,
}

impl RouteDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure to connect to `route`.
    pub fn failed(&self, route: &Route) {
        self.failed.insert(route.clone());
    }

    /// Record a success, clearing any earlier failure.
    pub fn connected(&self, route: &Route) {
        self.failed.remove(route);
    }

    pub fn should_postpone(&self, route: &Route) -> bool {
        self.failed.contains(route)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Yields the routes of one address.
///
/// Resolution happens on the first call to [`next`](Self::next), so a
/// host that cannot be resolved fails before any connect attempt.
pub struct RouteSelector {
    address: Address,
    resolver: Arc<dyn Resolve>,
    database: Arc<RouteDatabase>,
    routes: Option<VecDeque<Route>>,
    postponed: VecDeque<Route>,
}

impl fmt::Debug for RouteSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSelector")
            .field("address", &self.address)
            .field("routes", &self.routes)
            .field("postponed", &self.postponed.len())
            .finish_non_exhaustive()
    }
}

impl RouteSelector {
    pub fn new(address: Address, resolver: Arc<dyn Resolve>, database: Arc<RouteDatabase>) -> Self {
        Self {
            address,
            resolver,
            database,
            routes: None,
            postponed: VecDeque::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether another route may be tried. True before resolution.
    pub fn has_next(&self) -> bool {
        match &self.routes {
            None => true,
            Some(routes) => !routes.is_empty() || !self.postponed.is_empty(),
        }
    }

    /// The next route to try.
    pub fn next(&mut self) -> Result<Route, NetError> {
        if self.routes.is_none() {
            self.resolve()?;
        }
        let routes = self.routes.get_or_insert_with(VecDeque::new);
        routes
            .pop_front()
            .or_else(|| self.postponed.pop_front())
            .ok_or(NetError::ConnectionFailed)
    }

    /// Report a failed connect so later selectors try `route` last.
    pub fn connect_failed(&mut self, route: &Route, error: NetError) {
        tracing::debug!(route = %route.socket_addr(), address = %self.address, error = %error, "route failed");
        self.database.failed(route);
    }

    fn resolve(&mut self) -> Result<(), NetError> {
        let (host, port) = self.address.connect_target();
        let addrs = self.resolver.resolve(Name::new(host))?;
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        let mut routes = VecDeque::with_capacity(addrs.len());
        for mut socket_addr in addrs {
            socket_addr.set_port(port);
            let route = Route::new(self.address.clone(), socket_addr);
            if self.database.should_postpone(&route) {
                self.postponed.push_back(route);
            } else {
                routes.push_back(route);
            }
        }
        tracing::debug!(
            address = %self.address,
            routes = routes.len(),
            postponed = self.postponed.len(),
            "routes selected"
        );
        self.routes = Some(routes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct Fixed(Vec<SocketAddr>);

    impl Resolve for Fixed {
        fn resolve(&self, _name: Name) -> Result<Vec<SocketAddr>, NetError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl Resolve for Failing {
        fn resolve(&self, _name: Name) -> Result<Vec<SocketAddr>, NetError> {
            Err(NetError::NameNotResolved)
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 0)
    }

    #[test]
    fn test_address_from_url() {
        let url = Url::parse("https://example.com/a").unwrap();
        let address = Address::from_url(&url, None).unwrap();
        assert!(address.is_tls());
        assert_eq!(address.port(), 443);
        assert_eq!(address.to_string(), "https://example.com:443");
    }

    #[test]
    fn test_proxy_bypass_drops_proxy() {
        let proxy = ProxySettings::new("http://proxy.local:3128")
            .unwrap()
            .with_bypass("localhost");
        let url = Url::parse("http://localhost:8080/").unwrap();
        assert!(Address::from_url(&url, Some(&proxy)).unwrap().proxy().is_none());
        let url = Url::parse("http://example.com/").unwrap();
        assert!(Address::from_url(&url, Some(&proxy)).unwrap().proxy().is_some());
    }

    #[test]
    fn test_routes_use_target_port() {
        let url = Url::parse("http://example.com:8080/").unwrap();
        let address = Address::from_url(&url, None).unwrap();
        let mut selector = RouteSelector::new(
            address,
            Arc::new(Fixed(vec![addr(1), addr(2)])),
            Arc::new(RouteDatabase::new()),
        );
        assert!(selector.has_next());
        assert_eq!(selector.next().unwrap().socket_addr().port(), 8080);
        assert!(selector.has_next());
        selector.next().unwrap();
        assert!(!selector.has_next());
        assert_eq!(selector.next().unwrap_err(), NetError::ConnectionFailed);
    }

    #[test]
    fn test_failed_routes_are_postponed() {
        let url = Url::parse("http://example.com/").unwrap();
        let address = Address::from_url(&url, None).unwrap();
        let database = Arc::new(RouteDatabase::new());
        let resolver: Arc<dyn Resolve> = Arc::new(Fixed(vec![addr(1), addr(2)]));

        let mut first = RouteSelector::new(address.clone(), resolver.clone(), database.clone());
        let route = first.next().unwrap();
        first.connect_failed(&route, NetError::ConnectionRefused);
        assert_eq!(database.failed_count(), 1);

        let mut second = RouteSelector::new(address, resolver, database.clone());
        assert_eq!(second.next().unwrap().socket_addr().ip(), addr(2).ip());
        assert_eq!(second.next().unwrap().socket_addr().ip(), addr(1).ip());

        database.connected(&route);
        assert_eq!(database.failed_count(), 0);
    }

    #[test]
    fn test_unresolvable_host() {
        let url = Url::parse("http://nowhere.invalid/").unwrap();
        let address = Address::from_url(&url, None).unwrap();
        let mut selector =
            RouteSelector::new(address, Arc::new(Failing), Arc::new(RouteDatabase::new()));
        assert_eq!(selector.next().unwrap_err(), NetError::NameNotResolved);
    }

    #[test]
    fn test_route_flags() {
        let proxy = ProxySettings::new("http://proxy.local:3128").unwrap();
        let https = Address::from_url(&Url::parse("https://a.test/").unwrap(), Some(&proxy)).unwrap();
        let http = Address::from_url(&Url::parse("http://a.test/").unwrap(), Some(&proxy)).unwrap();
        assert!(Route::new(https, addr(1)).requires_tunnel());
        let plain = Route::new(http, addr(1));
        assert!(!plain.requires_tunnel());
        assert!(plain.uses_absolute_form());
    }
}
