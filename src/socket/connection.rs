//! A pooled connection: one socket plus the flags that make its disposal
//! happen exactly once per checkout.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::response::TlsHandshake;
use crate::socket::client::SocketType;
use crate::socket::route::Route;
use std::io::{BufReader, Write};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

const STATE_IN_USE: u8 = 0;
const STATE_IDLE: u8 = 1;
const STATE_CLOSED: u8 = 2;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a connection as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Checked out by an exchange.
    InUse,
    /// Parked in the pool.
    Idle,
    /// Shut down; never reused.
    Closed,
}

/// A live connection to one route.
///
/// Shared as `Arc<Connection>` between the engine, the transport, request
/// body sinks and response body streams. Reads go through an internal
/// buffer; writes go straight to the socket.
pub struct Connection {
    id: u64,
    route: Route,
    stream: Mutex<BufReader<SocketType>>,
    tls: Option<TlsHandshake>,
    http_minor_version: AtomicU8,
    state: AtomicU8,
    idle_since: Mutex<Instant>,
    use_count: AtomicUsize,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("route", &self.route.socket_addr())
            .field("state", &self.state())
            .field("use_count", &self.use_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a freshly connected socket. The connection starts checked out.
    pub fn new(route: Route, socket: SocketType, tls: Option<TlsHandshake>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            route,
            stream: Mutex::new(BufReader::new(socket)),
            tls,
            http_minor_version: AtomicU8::new(1),
            state: AtomicU8::new(STATE_IN_USE),
            idle_since: Mutex::new(Instant::now()),
            use_count: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn tls_handshake(&self) -> Option<&TlsHandshake> {
        self.tls.as_ref()
    }

    /// Minor version of the last response read (`0` for HTTP/1.0).
    pub fn http_minor_version(&self) -> u8 {
        self.http_minor_version.load(Ordering::Relaxed)
    }

    pub fn set_http_minor_version(&self, minor: u8) {
        self.http_minor_version.store(minor, Ordering::Relaxed);
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_IN_USE => ConnectionState::InUse,
            STATE_IDLE => ConnectionState::Idle,
            _ => ConnectionState::Closed,
        }
    }

    /// Number of exchanges that have used this connection.
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_used(&self) {
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    /// `Idle -> InUse`. Fails if someone else got there first.
    pub(crate) fn try_check_out(&self) -> bool {
        self.state
            .compare_exchange(STATE_IDLE, STATE_IN_USE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `InUse -> Idle`. Fails on a second release of the same checkout.
    pub(crate) fn try_mark_idle(&self) -> bool {
        let ok = self
            .state
            .compare_exchange(STATE_IN_USE, STATE_IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            *lock(&self.idle_since) = Instant::now();
        }
        ok
    }

    /// `InUse -> Closed`, shutting the socket down. Fails if the checkout
    /// was already recycled or discarded.
    pub(crate) fn try_discard(&self) -> bool {
        let ok = self
            .state
            .compare_exchange(STATE_IN_USE, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            lock(&self.stream).get_mut().shutdown();
        }
        ok
    }

    /// `InUse | Idle -> Closed`. Returns false if already closed.
    pub(crate) fn try_close(&self) -> bool {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return false;
        }
        lock(&self.stream).get_mut().shutdown();
        true
    }

    /// How long the connection has been parked.
    pub fn idle_for(&self) -> Duration {
        lock(&self.idle_since).elapsed()
    }

    /// A pooled connection is healthy when the peer has not closed it and
    /// no unsolicited bytes are waiting.
    pub fn is_healthy(&self) -> bool {
        if self.state() == ConnectionState::Closed {
            return false;
        }
        let stream = lock(&self.stream);
        stream.buffer().is_empty() && stream.get_ref().is_connected_and_idle()
    }

    pub fn write_all(&self, buf: &[u8]) -> Result<(), NetError> {
        lock(&self.stream).get_mut().write_all(buf).io_context()
    }

    pub fn flush(&self) -> Result<(), NetError> {
        lock(&self.stream).get_mut().flush().io_context()
    }

    /// Run `f` with exclusive access to the buffered reader.
    pub fn with_reader<T>(&self, f: impl FnOnce(&mut BufReader<SocketType>) -> T) -> T {
        f(&mut lock(&self.stream))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), NetError> {
        lock(&self.stream).get_ref().set_read_timeout(timeout).io_context()
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        lock(&self.stream).get_ref().read_timeout().ok().flatten()
    }
}

/// Lock ignoring poisoning; a panic mid-read leaves the socket in an
/// unknown state, which the reuse checks catch.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
