//! TLS connector built on `tokio-rustls`, using the platform's webpki
//! trust roots. This is the network crate's only TLS collaborator: the
//! pool itself stays transport-agnostic via [`crate::pool::Transport`].

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector as RustlsConnector;

use crate::pool::{Connector, PoolError, Transport};

/// Connects over TLS, verifying the peer against the bundled Mozilla
/// root store and the SNI hostname given at construction.
pub struct TlsConnector {
    connector: RustlsConnector,
    hostname: String,
}

impl TlsConnector {
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            connector: RustlsConnector::from(Arc::new(config)),
            hostname: hostname.into(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, tcp: TcpStream, _addr: SocketAddr) -> Result<Box<dyn Transport>, PoolError> {
        let server_name = ServerName::try_from(self.hostname.clone())
            .map_err(|e| PoolError::Tls(format!("invalid SNI hostname {:?}: {e}", self.hostname)))?;
        let stream = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| PoolError::Tls(e.to_string()))?;
        Ok(Box::new(stream))
    }
}
