//! Delivery Handler
//!
//! Pushes generated CEF lines to the receiver over UDP, TCP or TLS syslog.
//! Each worker owns its handler; nothing here is shared across tasks. Lines
//! are flushed one at a time so the receiver never sees coalesced or
//! half-delivered batches, and a failed line never blocks the rest of the
//! batch.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{Protocol, SiemConfig};
use crate::error::DeliveryError;

/// Upper bound on lines handed to one [`SyslogHandler::push`] call. Hosts
/// feeding larger batches chunk them at this size.
pub const CHUNK_SIZE: usize = 2000;

/// One established syslog connection.
#[async_trait]
trait Transport: Send {
    async fn send_line(&mut self, line: &str) -> Result<(), DeliveryError>;
    async fn close(&mut self) -> Result<(), DeliveryError>;
}

/// Connected datagram socket; one line per datagram, no framing byte.
struct UdpTransport {
    socket: UdpSocket,
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), DeliveryError> {
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Stream socket; lines are newline-terminated and flushed individually so
/// the receiver can split records without buffering across pushes.
struct TcpTransport {
    stream: TcpStream,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), DeliveryError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// TLS over TCP with the same newline framing as [`TcpTransport`].
struct TlsTransport {
    stream: tokio_rustls::client::TlsStream<TcpStream>,
}

#[async_trait]
impl Transport for TlsTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), DeliveryError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Per-worker syslog delivery handle. Create one per push cycle with
/// [`SyslogHandler::connect`]; it is not meant to outlive the batch.
pub struct SyslogHandler {
    transport: Box<dyn Transport>,
    timeout: Duration,
}

impl SyslogHandler {
    /// Establish the configured transport. Connection establishment is
    /// bounded by the configured timeout.
    pub async fn connect(config: &SiemConfig) -> Result<Self, DeliveryError> {
        let addr = format!("{}:{}", config.server, config.port);
        let timeout = config.timeout();

        let transport: Box<dyn Transport> = match config.protocol {
            Protocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(DeliveryError::Connect)?;
                socket.connect(&addr).await.map_err(DeliveryError::Connect)?;
                Box::new(UdpTransport { socket })
            }
            Protocol::Tcp => {
                let stream = connect_tcp(&addr, timeout).await?;
                Box::new(TcpTransport { stream })
            }
            Protocol::Tls => {
                let pem = config.certificate.as_deref().unwrap_or("");
                let connector = tls_connector(pem)?;
                let server_name = ServerName::try_from(config.server.clone())
                    .map_err(|_| DeliveryError::ServerName(config.server.clone()))?;
                let tcp = connect_tcp(&addr, timeout).await?;
                let stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
                    .await
                    .map_err(|_| DeliveryError::Timeout(timeout))?
                    .map_err(|e| DeliveryError::Tls(e.to_string()))?;
                Box::new(TlsTransport { stream })
            }
        };

        tracing::debug!(server = %config.server, port = config.port, protocol = %config.protocol, "connected to receiver");
        Ok(Self { transport, timeout })
    }

    /// Send a batch of CEF lines, one write per line. A line that fails or
    /// times out is logged and skipped; the rest of the batch still goes
    /// out. Returns the number of lines delivered.
    pub async fn push(&mut self, lines: &[String]) -> usize {
        if lines.len() > CHUNK_SIZE {
            tracing::warn!(
                count = lines.len(),
                limit = CHUNK_SIZE,
                "batch exceeds the per-push chunk size"
            );
        }
        let mut delivered = 0;
        for (index, line) in lines.iter().enumerate() {
            let result = tokio::time::timeout(self.timeout, self.transport.send_line(line))
                .await
                .map_err(|_| DeliveryError::Timeout(self.timeout))
                .and_then(|r| r);
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::error!(index, error = %e, "failed to deliver line, skipping");
                }
            }
        }
        tracing::info!(delivered, total = lines.len(), "push cycle complete");
        delivered
    }

    /// Tear the connection down. Close errors are logged, not surfaced;
    /// the batch outcome was already reported by [`SyslogHandler::push`].
    pub async fn shutdown(mut self) {
        if let Err(e) = self.transport.close().await {
            tracing::warn!(error = %e, "error closing receiver connection");
        }
    }
}

/// Probe the receiver by establishing and immediately closing a connection.
/// Run after configuration validation so connection problems surface as
/// their own message.
pub async fn test_connectivity(config: &SiemConfig) -> Result<(), DeliveryError> {
    let handler = SyslogHandler::connect(config).await?;
    handler.shutdown().await;
    Ok(())
}

async fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream, DeliveryError> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| DeliveryError::Timeout(timeout))?
        .map_err(DeliveryError::Connect)
}

/// Build a TLS connector trusting exactly the PEM certificates from the
/// configuration.
fn tls_connector(pem: &str) -> Result<TlsConnector, DeliveryError> {
    let mut roots = RootCertStore::empty();
    let mut reader = Cursor::new(pem.as_bytes());
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| DeliveryError::Tls(e.to_string()))?;
        roots
            .add(cert)
            .map_err(|e| DeliveryError::Tls(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(DeliveryError::Tls(
            "no certificates found in configured PEM material".to_string(),
        ));
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
