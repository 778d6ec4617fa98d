use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::client::SocketType;
use crate::socket::connection::Connection;
use crate::socket::route::Route;
use crate::socket::tls;
use rustls::ClientConfig;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on the size of a proxy's `CONNECT` response head.
const MAX_TUNNEL_RESPONSE: usize = 8 * 1024;

/// Socket-level options applied to every new connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub tls: Arc<ClientConfig>,
}

/// Establishes one connection over one route: TCP -> tunnel -> TLS.
/// Roughly equivalent to net::ConnectJob.
pub struct ConnectJob;

impl ConnectJob {
    pub fn connect(route: &Route, options: &ConnectOptions) -> Result<Connection, NetError> {
        let address = route.address();
        let target = route.socket_addr();

        // 1. TCP connect (to proxy or destination)
        tracing::debug!(route = %target, address = %address, "connecting");
        let stream = TcpStream::connect_timeout(&target, options.connect_timeout)
            .connection_context(&target.ip().to_string(), target.port())?;
        stream.set_nodelay(true).io_context()?;
        stream.set_read_timeout(options.read_timeout).io_context()?;

        // 2. Proxy tunnel for HTTPS through an HTTP proxy
        if route.requires_tunnel() {
            establish_tunnel(&stream, route)?;
        }

        // 3. TLS handshake, after any tunnel is established
        if address.is_tls() {
            let (tls_stream, summary) = tls::handshake(options.tls.clone(), address.host(), stream)?;
            Ok(Connection::new(
                route.clone(),
                SocketType::Tls(Box::new(tls_stream)),
                Some(summary),
            ))
        } else {
            Ok(Connection::new(route.clone(), SocketType::Tcp(stream), None))
        }
    }
}

/// Send `CONNECT host:port` and wait for a 2xx.
///
/// The response is read byte by byte so nothing past the head is consumed
/// before TLS takes over the stream.
fn establish_tunnel(mut stream: &TcpStream, route: &Route) -> Result<(), NetError> {
    let address = route.address();
    let target = format!("{}:{}", address.host(), address.port());

    let mut connect_req = format!(
        "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: Keep-Alive\r\n",
        target, target
    );
    if let Some(auth) = address.proxy().and_then(|p| p.auth_header()) {
        connect_req.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    connect_req.push_str("\r\n");
    stream.write_all(connect_req.as_bytes()).io_context()?;

    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_TUNNEL_RESPONSE {
            return Err(NetError::ResponseHeadersTooBig);
        }
        match stream.read(&mut byte).io_context()? {
            0 => return Err(NetError::TunnelConnectionFailed),
            _ => head.push(byte[0]),
        }
    }

    let status_line = head
        .split(|b| *b == b'\n')
        .next()
        .map(|l| String::from_utf8_lossy(l).trim().to_string())
        .unwrap_or_default();
    let code = status_line.split_whitespace().nth(1).unwrap_or("");
    if !code.starts_with('2') {
        tracing::debug!(target = %target, status = %status_line, "proxy tunnel refused");
        return Err(NetError::TunnelConnectionFailed);
    }
    tracing::debug!(target = %target, "proxy tunnel established");
    Ok(())
}
