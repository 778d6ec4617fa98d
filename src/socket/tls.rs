use crate::base::neterror::NetError;
use crate::http::response::TlsHandshake;
use crate::socket::client::TlsStream;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use std::net::TcpStream;
use std::sync::Arc;

/// TLS client settings shared by every connection of a client.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Offered ALPN protocols. Only HTTP/1.1 is spoken.
    pub alpn_protos: Vec<String>,
    /// Trust the bundled Mozilla roots.
    pub use_webpki_roots: bool,
    /// Extra trust anchors (DER), e.g. a private CA.
    pub extra_roots: Vec<Vec<u8>>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            alpn_protos: vec!["http/1.1".to_string()],
            use_webpki_roots: true,
            extra_roots: Vec::new(),
        }
    }
}

impl TlsConfig {
    pub fn with_root_certificate(mut self, der: Vec<u8>) -> Self {
        self.extra_roots.push(der);
        self
    }

    /// Build the rustls client configuration.
    pub fn build(&self) -> Result<Arc<ClientConfig>, NetError> {
        let mut root_store = RootCertStore::empty();
        if self.use_webpki_roots {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        for der in &self.extra_roots {
            root_store
                .add(CertificateDer::from(der.clone()))
                .map_err(|e| {
                    tracing::warn!(error = %e, "rejected extra root certificate");
                    NetError::InvalidArgument
                })?;
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|_| NetError::SslProtocolError)?
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config.alpn_protocols = self
            .alpn_protos
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect();
        Ok(Arc::new(config))
    }
}

/// Run the client handshake over an established TCP stream (possibly a
/// proxy tunnel). Blocks until the handshake completes or fails.
pub fn handshake(
    config: Arc<ClientConfig>,
    host: &str,
    mut tcp: TcpStream,
) -> Result<(TlsStream, TlsHandshake), NetError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let server_name =
        ServerName::try_from(bare.to_string()).map_err(|_| NetError::InvalidUrl)?;
    let mut conn = ClientConnection::new(config, server_name).map_err(|e| {
        tracing::debug!(host = %host, error = %e, "TLS setup failed");
        NetError::SslProtocolError
    })?;

    while conn.is_handshaking() {
        conn.complete_io(&mut tcp).map_err(|e| {
            tracing::debug!(host = %host, error = %e, "TLS handshake failed");
            match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    NetError::ConnectionTimedOut
                }
                _ => NetError::SslProtocolError,
            }
        })?;
    }

    let summary = TlsHandshake {
        protocol: conn
            .protocol_version()
            .map(|v| format!("{:?}", v))
            .unwrap_or_default(),
        cipher_suite: conn
            .negotiated_cipher_suite()
            .map(|cs| format!("{:?}", cs.suite()))
            .unwrap_or_default(),
        peer_certificates: conn
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default(),
    };
    tracing::debug!(
        host = %host,
        protocol = %summary.protocol,
        cipher = %summary.cipher_suite,
        "TLS handshake complete"
    );
    Ok((rustls::StreamOwned::new(conn, tcp), summary))
}
