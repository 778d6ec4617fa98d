use crate::base::neterror::NetError;
use crate::dns::Resolve;
use crate::socket::connectjob::{ConnectJob, ConnectOptions};
use crate::socket::connection::Connection;
use crate::socket::pool::ConnectionPool;
use crate::socket::proxy::ProxySettings;
use crate::socket::route::{Address, RouteDatabase, RouteSelector};
use std::sync::Arc;
use url::Url;

/// Hands connections to engines: pooled when possible, freshly connected
/// otherwise. Cheap to clone; clones share the pool and route database.
#[derive(Clone)]
pub struct ConnectionManager {
    pool: Arc<ConnectionPool>,
    routes: Arc<RouteDatabase>,
    resolver: Arc<dyn Resolve>,
    proxy: Option<ProxySettings>,
    options: ConnectOptions,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("pool", &self.pool)
            .field("proxy", &self.proxy)
            .field("connect_timeout", &self.options.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(
        pool: Arc<ConnectionPool>,
        resolver: Arc<dyn Resolve>,
        proxy: Option<ProxySettings>,
        options: ConnectOptions,
    ) -> Self {
        Self {
            pool,
            routes: Arc::new(RouteDatabase::new()),
            resolver,
            proxy,
            options,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn route_database(&self) -> &Arc<RouteDatabase> {
        &self.routes
    }

    /// The pooling key for `url` under this manager's proxy settings.
    pub fn address_for(&self, url: &Url) -> Result<Address, NetError> {
        Address::from_url(url, self.proxy.as_ref())
    }

    /// A fresh route selector for `url`.
    pub fn route_selector(&self, url: &Url) -> Result<RouteSelector, NetError> {
        Ok(RouteSelector::new(
            self.address_for(url)?,
            Arc::clone(&self.resolver),
            Arc::clone(&self.routes),
        ))
    }

    /// Obtain a connection for the selector's address.
    ///
    /// A healthy pooled connection wins. Otherwise the next route is
    /// connected; a connect failure is recorded against that route and
    /// returned so the caller may retry with [`RouteSelector::has_next`].
    pub fn acquire(&self, selector: &mut RouteSelector) -> Result<Arc<Connection>, NetError> {
        if let Some(conn) = self.pool.get(selector.address()) {
            conn.mark_used();
            return Ok(conn);
        }

        let route = selector.next()?;
        match ConnectJob::connect(&route, &self.options) {
            Ok(conn) => {
                self.routes.connected(&route);
                let conn = Arc::new(conn);
                self.pool.register(&conn);
                conn.mark_used();
                Ok(conn)
            }
            Err(e) => {
                if e.is_connect_failure() {
                    selector.connect_failed(&route, e);
                }
                Err(e)
            }
        }
    }

    /// Return a checked-out connection for reuse.
    pub fn recycle(&self, conn: &Arc<Connection>) -> bool {
        self.pool.recycle(conn)
    }

    /// Close a checked-out connection.
    pub fn discard(&self, conn: &Arc<Connection>) -> bool {
        self.pool.discard(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::GaiResolver;
    use crate::socket::tls::TlsConfig;
    use std::net::TcpListener;
    use std::time::Duration;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(ConnectionPool::default()),
            Arc::new(GaiResolver::new()),
            None,
            ConnectOptions {
                connect_timeout: Duration::from_secs(2),
                read_timeout: Some(Duration::from_secs(2)),
                tls: TlsConfig::default().build().unwrap(),
            },
        )
    }

    #[test]
    fn test_acquire_prefers_pool() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let manager = manager();

        let mut selector = manager.route_selector(&url).unwrap();
        let first = manager.acquire(&mut selector).unwrap();
        let _server = listener.accept().unwrap();
        assert!(manager.recycle(&first));

        let mut selector = manager.route_selector(&url).unwrap();
        let second = manager.acquire(&mut selector).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(second.use_count(), 2);
        assert_eq!(manager.pool().stats().created, 1);
    }

    #[test]
    fn test_connect_failure_is_recorded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        drop(listener);
        let manager = manager();

        let mut selector = manager.route_selector(&url).unwrap();
        let err = manager.acquire(&mut selector).unwrap_err();
        assert!(err.is_connect_failure());
        assert!(!selector.has_next());
        assert_eq!(manager.route_database().failed_count(), 1);
    }
}
