//! Stream types for IMAP connections.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A stream that can be either plaintext or TLS, over any transport.
pub enum ImapStream<S> {
    /// Plaintext transport.
    Plain(S),
    /// TLS-encrypted transport (boxed to reduce enum size).
    Tls(Box<TlsStream<S>>),
}

impl<S> ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport without encryption.
    pub const fn plain(stream: S) -> Self {
        Self::Plain(stream)
    }

    /// Performs a TLS handshake over the transport (implicit TLS, port 993).
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not a valid server name or the
    /// handshake fails.
    pub async fn connect_tls(stream: S, host: &str, connector: &TlsConnector) -> Result<Self> {
        let server_name = ServerName::try_from(host.to_string())?;
        let tls = connector.connect(server_name, stream).await?;
        Ok(Self::Tls(Box::new(tls)))
    }

    /// Upgrades a plaintext stream to TLS after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS or the handshake fails.
    pub async fn upgrade_to_tls(self, host: &str, connector: &TlsConnector) -> Result<Self> {
        match self {
            Self::Plain(stream) => Self::connect_tls(stream, host, connector).await,
            Self::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl<S> AsyncRead for ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl<S> AsyncWrite for ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector trusting the bundled web PKI roots.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
