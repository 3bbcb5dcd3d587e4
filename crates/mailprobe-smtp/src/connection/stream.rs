//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore},
};

/// Longest reply line we accept before treating the peer as broken.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// SMTP stream (plain or TLS) over any transport.
#[derive(Debug)]
pub enum SmtpStream<S> {
    /// Unencrypted transport.
    Plain(BufReader<S>),
    /// TLS-encrypted transport.
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected transport without encryption.
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// Performs a TLS handshake over the transport (implicit TLS, port 465).
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is invalid or the handshake fails.
    pub async fn tls(stream: S, hostname: &str, connector: &TlsConnector) -> Result<Self> {
        let server_name = server_name(hostname)?;
        let tls_stream = connector.connect(server_name, stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads a line from the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the peer closes the connection, or
    /// the line exceeds the length limit.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = match self {
            Self::Plain(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("reply line too long".into()));
        }
        Ok(line.trim_end().to_string())
    }

    /// Writes data to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a plain stream to TLS (STARTTLS).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, connector: &TlsConnector) -> Result<Self> {
        let stream = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };
        Self::tls(stream, hostname, connector).await
    }
}

fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))
}

/// Creates a TLS connector trusting the bundled web PKI roots.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
