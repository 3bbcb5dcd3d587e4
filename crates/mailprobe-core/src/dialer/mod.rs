//! Connection establishment, direct or through a SOCKS proxy.

mod proxies;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};

pub use proxies::ProxyRotation;

use crate::check::{ErrorKind, ProxyEndpoint, ProxyScheme};

/// Byte stream a prober talks over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Established connection to a candidate endpoint.
pub type Transport = Box<dyn AsyncStream>;

/// Why a connection could not be established.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialError {
    /// The connect timeout elapsed.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The proxy could not be reached or refused to relay.
    #[error("proxy refused: {0}")]
    ProxyRefused(String),

    /// The proxy rejected our credentials.
    #[error("proxy authentication failed: {0}")]
    ProxyAuthFailed(String),

    /// The target host name did not resolve.
    #[error("DNS lookup failed: {0}")]
    DnsFailure(String),

    /// The target refused or could not be reached.
    #[error("connection refused: {0}")]
    ConnectRefused(String),
}

impl DialError {
    /// Maps the failure onto the result taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::ProxyRefused(_) => ErrorKind::ProxyRefused,
            Self::ProxyAuthFailed(_) => ErrorKind::ProxyAuthFailed,
            Self::DnsFailure(_) => ErrorKind::DnsFailure,
            Self::ConnectRefused(_) => ErrorKind::ConnectRefused,
        }
    }

    /// True when the endpoint could not be reached at all: the connection
    /// was refused or the name did not resolve.
    #[must_use]
    pub const fn is_refusal(&self) -> bool {
        matches!(self, Self::ConnectRefused(_) | Self::DnsFailure(_))
    }

    /// True for failures that blame the proxy rather than the target.
    #[must_use]
    pub const fn is_proxy_fault(&self) -> bool {
        matches!(self, Self::ProxyRefused(_) | Self::ProxyAuthFailed(_))
    }
}

/// Opens transports to candidate endpoints.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connects to `host:port`, tunnelling through `proxy` when given.
    async fn dial(
        &self,
        host: &str,
        port: u16,
        proxy: Option<&ProxyEndpoint>,
        connect_timeout: Duration,
    ) -> Result<Transport, DialError>;
}

/// TCP dialer with SOCKS4/SOCKS5 support.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl TcpDialer {
    /// Creates a dialer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn direct(host: &str, port: u16) -> Result<Transport, DialError> {
        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| DialError::DnsFailure(format!("{host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(DialError::DnsFailure(format!("{host}: no addresses")));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    // Probes are short request/response exchanges
                    let _ = stream.set_nodelay(true);
                    return Ok(Box::new(stream));
                }
                Err(e) => last_error = Some(format!("{addr}: {e}")),
            }
        }
        Err(DialError::ConnectRefused(
            last_error.unwrap_or_else(|| format!("{host}:{port}")),
        ))
    }

    async fn via_proxy(proxy: &ProxyEndpoint, host: &str, port: u16) -> Result<Transport, DialError> {
        let proxy_addr = tokio::net::lookup_host(proxy.address())
            .await
            .map_err(|e| DialError::ProxyRefused(format!("{}: {e}", proxy.address())))?
            .next()
            .ok_or_else(|| DialError::ProxyRefused(format!("{}: no addresses", proxy.address())))?;

        let target = (host, port);
        let stream: Transport = match proxy.scheme {
            ProxyScheme::Socks5 => match (&proxy.username, &proxy.password) {
                (Some(user), Some(pass)) => Box::new(
                    Socks5Stream::connect_with_password(proxy_addr, target, user, pass)
                        .await
                        .map_err(classify_socks_error)?,
                ),
                _ => Box::new(
                    Socks5Stream::connect(proxy_addr, target)
                        .await
                        .map_err(classify_socks_error)?,
                ),
            },
            ProxyScheme::Socks4 => match &proxy.username {
                Some(user) => Box::new(
                    Socks4Stream::connect_with_userid(proxy_addr, target, user)
                        .await
                        .map_err(classify_socks_error)?,
                ),
                None => Box::new(
                    Socks4Stream::connect(proxy_addr, target)
                        .await
                        .map_err(classify_socks_error)?,
                ),
            },
        };
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        host: &str,
        port: u16,
        proxy: Option<&ProxyEndpoint>,
        connect_timeout: Duration,
    ) -> Result<Transport, DialError> {
        let attempt = async {
            match proxy {
                Some(proxy) => Self::via_proxy(proxy, host, port).await,
                None => Self::direct(host, port).await,
            }
        };

        match tokio::time::timeout(connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout(connect_timeout)),
        }
    }
}

fn classify_socks_error(e: tokio_socks::Error) -> DialError {
    use tokio_socks::Error as S;

    match e {
        S::NoAcceptableAuthMethods
        | S::PasswordAuthFailure(_)
        | S::AuthorizationRequired
        | S::InvalidAuthValues(_) => DialError::ProxyAuthFailed(e.to_string()),
        S::ConnectionRefused
        | S::HostUnreachable
        | S::NetworkUnreachable
        | S::TtlExpired
        | S::ConnectionNotAllowedByRuleset => DialError::ConnectRefused(e.to_string()),
        S::InvalidTargetAddress(_) | S::AddressTypeNotSupported => {
            DialError::DnsFailure(e.to_string())
        }
        _ => DialError::ProxyRefused(e.to_string()),
    }
}
