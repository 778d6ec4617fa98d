use crate::socket::connection::Connection;
use crate::socket::route::Address;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Idle limits of a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept per address; the oldest are evicted first.
    pub max_idle_per_address: usize,
    /// How long an idle connection may sit before it is closed.
    pub keep_alive: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_address: 5,
            keep_alive: Duration::from_secs(300),
        }
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections registered after a fresh connect.
    pub created: usize,
    /// Idle connections handed out again.
    pub reused: usize,
    /// Checkouts returned to the idle set.
    pub recycled: usize,
    /// Checkouts closed instead of returned.
    pub discarded: usize,
    /// Idle connections closed for age, health or overflow.
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    reused: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
    evicted: AtomicUsize,
}

/// Thread-safe pool of idle HTTP/1.1 connections, grouped by address.
///
/// Every checkout ends in exactly one of [`recycle`](Self::recycle) or
/// [`discard`](Self::discard); the connection's state flag rejects the
/// second call.
pub struct ConnectionPool {
    config: PoolConfig,
    idle: DashMap<Address, VecDeque<Arc<Connection>>>,
    counters: Counters,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("idle", &self.idle_count())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            idle: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Check out a healthy idle connection for `address`.
    ///
    /// The most recently returned connection is tried first; stale or dead
    /// ones met on the way are closed.
    pub fn get(&self, address: &Address) -> Option<Arc<Connection>> {
        let mut group = self.idle.get_mut(address)?;
        while let Some(conn) = group.pop_back() {
            if conn.idle_for() >= self.config.keep_alive || !conn.is_healthy() {
                if conn.try_close() {
                    self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                }
                continue;
            }
            if conn.try_check_out() {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(id = conn.id(), address = %address, "reusing pooled connection");
                return Some(conn);
            }
        }
        None
    }

    /// Account for a freshly connected, checked-out connection.
    pub fn register(&self, conn: &Arc<Connection>) {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id = conn.id(), route = %conn.route().socket_addr(), "connection created");
    }

    /// Return a checked-out connection to the idle set.
    ///
    /// Returns false if this checkout was already released, or if the
    /// connection turned out unhealthy and was closed instead.
    pub fn recycle(&self, conn: &Arc<Connection>) -> bool {
        if !conn.try_mark_idle() {
            tracing::warn!(id = conn.id(), state = ?conn.state(), "connection released twice");
            return false;
        }
        if !conn.is_healthy() {
            conn.try_close();
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(id = conn.id(), "recycled connection unhealthy, closing");
            return false;
        }

        let address = conn.route().address().clone();
        let mut group = self.idle.entry(address).or_default();
        group.push_back(Arc::clone(conn));
        while group.len() > self.config.max_idle_per_address {
            if let Some(oldest) = group.pop_front() {
                if oldest.try_close() {
                    self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.counters.recycled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id = conn.id(), uses = conn.use_count(), "connection recycled");
        true
    }

    /// Close a checked-out connection. Returns false on a second release.
    pub fn discard(&self, conn: &Arc<Connection>) -> bool {
        if !conn.try_discard() {
            tracing::warn!(id = conn.id(), state = ?conn.state(), "connection released twice");
            return false;
        }
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id = conn.id(), "connection discarded");
        true
    }

    /// Close idle connections past keep-alive or no longer healthy.
    pub fn cleanup(&self) {
        let keep_alive = self.config.keep_alive;
        for mut entry in self.idle.iter_mut() {
            entry.value_mut().retain(|conn| {
                let keep = conn.idle_for() < keep_alive && conn.is_healthy();
                if !keep && conn.try_close() {
                    self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                }
                keep
            });
        }
        self.idle.retain(|_, group| !group.is_empty());
    }

    /// Idle connections across all addresses.
    pub fn idle_count(&self) -> usize {
        self.idle.iter().map(|g| g.len()).sum()
    }

    pub fn idle_count_for(&self, address: &Address) -> usize {
        self.idle.get(address).map(|g| g.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            recycled: self.counters.recycled.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }
}
