//! SOCKS proxy endpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// SOCKS protocol version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    /// SOCKS5, optional username/password.
    #[default]
    Socks5,
    /// SOCKS4, optional user id.
    Socks4,
}

impl ProxyScheme {
    /// Returns the URL scheme.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socks5 => "socks5",
            Self::Socks4 => "socks4",
        }
    }
}

/// A SOCKS proxy.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// SOCKS version.
    pub scheme: ProxyScheme,
    /// Username (SOCKS5) or user id (SOCKS4).
    pub username: Option<String>,
    /// Password (SOCKS5 only).
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// Creates an unauthenticated proxy.
    #[must_use]
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme,
            username: None,
            password: None,
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(user) => write!(f, "{}://{user}@{}:{}", self.scheme.as_str(), self.host, self.port),
            None => write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port),
        }
    }
}

/// Accepts `host:port`, `host:port:user:pass`, and
/// `socks5://[user:pass@]host:port` / `socks4://[user@]host:port`.
impl FromStr for ProxyEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidInput(format!("malformed proxy: {s}"));

        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = match scheme.to_ascii_lowercase().as_str() {
                    "socks5" | "socks5h" => ProxyScheme::Socks5,
                    "socks4" | "socks4a" => ProxyScheme::Socks4,
                    _ => return Err(invalid()),
                };
                (Some(scheme), rest.trim_end_matches('/'))
            }
            None => (None, s),
        };

        let (auth, hostport) = match rest.rsplit_once('@') {
            Some((auth, hostport)) => (Some(auth), hostport),
            None => (None, rest),
        };

        let parts: Vec<&str> = hostport.split(':').collect();
        let (host, port, mut username, mut password) = match (scheme, parts.as_slice()) {
            (_, [host, port]) => (*host, *port, None, None),
            (None, [host, port, user, pass]) if auth.is_none() => {
                (*host, *port, Some(*user), Some(*pass))
            }
            _ => return Err(invalid()),
        };

        if let Some(auth) = auth {
            match auth.split_once(':') {
                Some((user, pass)) => {
                    username = Some(user);
                    password = Some(pass);
                }
                None => username = Some(auth),
            }
        }

        let port: u16 = port.parse().map_err(|_| invalid())?;
        if host.is_empty() || port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            scheme: scheme.unwrap_or_default(),
            username: username.filter(|u| !u.is_empty()).map(ToString::to_string),
            password: password.filter(|p| !p.is_empty()).map(ToString::to_string),
        })
    }
}
