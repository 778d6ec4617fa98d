use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A TLS client stream over TCP.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Represents a connected socket (TCP or TLS).
/// Mimics net::StreamSocket.
pub enum SocketType {
    Tcp(TcpStream),
    Tls(Box<TlsStream>),
}

impl fmt::Debug for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Tcp(s) => f.debug_tuple("Tcp").field(&s.peer_addr().ok()).finish(),
            SocketType::Tls(s) => f.debug_tuple("Tls").field(&s.sock.peer_addr().ok()).finish(),
        }
    }
}

impl SocketType {
    /// The underlying TCP stream.
    pub fn tcp(&self) -> &TcpStream {
        match self {
            SocketType::Tcp(s) => s,
            SocketType::Tls(s) => &s.sock,
        }
    }

    /// Non-blocking probe of the TCP stream.
    ///
    /// Returns `None` when the peer closed or the socket errored, otherwise
    /// whether unread bytes are waiting.
    fn probe(stream: &TcpStream) -> Option<bool> {
        // peer_addr() returns Err if socket is disconnected
        stream.peer_addr().ok()?;
        stream.set_nonblocking(true).ok()?;

        let mut buf = [0u8; 1];
        let result = match stream.peek(&mut buf) {
            Ok(0) => None,                                          // EOF - connection closed
            Ok(_) => Some(true),                                    // Data available
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => Some(false), // Connected, quiet
            Err(_) => None,
        };

        stream.set_nonblocking(false).ok()?;
        result
    }

    /// Returns true if the socket is still connected.
    pub fn is_connected(&self) -> bool {
        Self::probe(self.tcp()).is_some()
    }

    /// Returns true if the socket is connected and has no pending data.
    /// Matches Chromium's IsConnectedAndIdle().
    ///
    /// TLS sockets may legitimately hold unread post-handshake records
    /// (session tickets), so only liveness is checked for them.
    pub fn is_connected_and_idle(&self) -> bool {
        match self {
            SocketType::Tcp(s) => Self::probe(s) == Some(false),
            SocketType::Tls(s) => Self::probe(&s.sock).is_some(),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp().set_read_timeout(timeout)
    }

    pub fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.tcp().read_timeout()
    }

    /// Close both directions. Errors are ignored; the peer may already be gone.
    pub fn shutdown(&mut self) {
        if let SocketType::Tls(s) = self {
            s.conn.send_close_notify();
            let _ = s.conn.complete_io(&mut s.sock);
        }
        let _ = self.tcp().shutdown(Shutdown::Both);
    }
}

impl Read for SocketType {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketType::Tcp(s) => s.read(buf),
            SocketType::Tls(s) => s.read(buf),
        }
    }
}

impl Write for SocketType {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketType::Tcp(s) => s.write(buf),
            SocketType::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketType::Tcp(s) => s.flush(),
            SocketType::Tls(s) => s.flush(),
        }
    }
}
