//! Check data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProxyEndpoint;
use crate::batch::BatchId;
use crate::{Error, Result};

/// What a batch verifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// SMTP submission accounts.
    #[default]
    Smtp,
    /// IMAP accounts.
    Imap,
    /// SOCKS proxies.
    Socks,
}

impl Protocol {
    /// Returns the lowercase protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Imap => "imap",
            Self::Socks => "socks",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "imap" => Ok(Self::Imap),
            "socks" | "socks4" | "socks5" | "proxy" => Ok(Self::Socks),
            other => Err(Error::Config(format!("unknown protocol: {other}"))),
        }
    }
}

/// Account credential to verify.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// SMTP or IMAP.
    pub kind: Protocol,
    /// Login, normally the full email address.
    pub email: String,
    /// Password or app password.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Server given alongside the credential, tried first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_host: Option<String>,
    /// Port given alongside the credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_port: Option<u16>,
}

impl Credential {
    /// Creates a credential without a declared server.
    #[must_use]
    pub fn new(kind: Protocol, email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kind,
            email: email.into(),
            secret: secret.into(),
            declared_host: None,
            declared_port: None,
        }
    }

    /// Attaches a declared server.
    #[must_use]
    pub fn with_server(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.declared_host = Some(host.into());
        self.declared_port = port;
        self
    }

    /// Parses an `email:password` line.
    ///
    /// The password is everything after the first colon, so it may itself
    /// contain colons. A trailing `|host:port` (or `|host`) declares the
    /// server to try first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the line has no colon, the login is
    /// not an email address, or the password is empty.
    pub fn parse_line(kind: Protocol, line: &str) -> Result<Self> {
        let line = line.trim();
        let (email, rest) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("missing ':' separator: {}", redact(line))))?;

        let email = email.trim();
        let valid_email = email
            .rsplit_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(Error::InvalidInput(format!("not an email address: {email}")));
        }

        let (secret, server) = match rest.rsplit_once('|') {
            Some((secret, server)) => match parse_server(server) {
                Some(server) => (secret, Some(server)),
                None => (rest, None),
            },
            None => (rest, None),
        };
        if secret.is_empty() {
            return Err(Error::InvalidInput(format!("empty password for {email}")));
        }

        let credential = Self::new(kind, email, secret);
        Ok(match server {
            Some((host, port)) => credential.with_server(host, port),
            None => credential,
        })
    }

    /// Returns the lowercased domain part of the email.
    #[must_use]
    pub fn domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("declared_host", &self.declared_host)
            .field("declared_port", &self.declared_port)
            .finish()
    }
}

fn parse_server(s: &str) -> Option<(String, Option<u16>)> {
    let s = s.trim();
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse().ok()?)),
        None => (s, None),
    };
    let looks_like_host = host.contains('.')
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
    looks_like_host.then(|| (host.to_ascii_lowercase(), port))
}

fn redact(line: &str) -> String {
    line.chars().take(24).collect::<String>() + "..."
}

/// Transport security for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No encryption.
    Plaintext,
    /// Plain connect, then STARTTLS.
    #[serde(rename = "starttls")]
    StartTls,
    /// TLS from the first byte.
    ImplicitTls,
}

impl SecurityMode {
    /// Infers the security mode from a well-known port.
    #[must_use]
    pub const fn from_port(port: u16) -> Self {
        match port {
            465 | 993 => Self::ImplicitTls,
            25 | 587 | 143 => Self::StartTls,
            _ => Self::Plaintext,
        }
    }

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::StartTls => "starttls",
            Self::ImplicitTls => "implicit_tls",
        }
    }
}

impl FromStr for SecurityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plaintext" => Ok(Self::Plaintext),
            "starttls" => Ok(Self::StartTls),
            "implicit_tls" => Ok(Self::ImplicitTls),
            _ => Err(Error::InvalidInput(format!("unknown security mode: {s}"))),
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Server declared with the credential.
    Declared,
    /// Host derived from the email domain.
    Domain,
    /// Host taken from the domain's MX records.
    Mx,
    /// Reachability target of a proxy check.
    Target,
}

impl CandidateSource {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Domain => "domain",
            Self::Mx => "mx",
            Self::Target => "target",
        }
    }
}

impl FromStr for CandidateSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "declared" => Ok(Self::Declared),
            "domain" => Ok(Self::Domain),
            "mx" => Ok(Self::Mx),
            "target" => Ok(Self::Target),
            _ => Err(Error::InvalidInput(format!("unknown candidate source: {s}"))),
        }
    }
}

/// One concrete (host, port, security) combination to attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointCandidate {
    /// Host name.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Transport security.
    pub security: SecurityMode,
    /// Origin of the candidate.
    pub source: CandidateSource,
}

impl EndpointCandidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        security: SecurityMode,
        source: CandidateSource,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            security,
            source,
        }
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.security.as_str())
    }
}

/// The thing a task verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// An SMTP or IMAP account.
    Account(Credential),
    /// A proxy, in SOCKS batches.
    Proxy(ProxyEndpoint),
}

impl Subject {
    /// Returns the identifier reported in results (email or proxy address).
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Account(credential) => credential.email.clone(),
            Self::Proxy(proxy) => proxy.address(),
        }
    }
}

/// Index of a task within its batch, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final verdict of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Authenticated (or, for proxies, relayed traffic).
    Valid,
    /// Credentials were rejected.
    Invalid,
    /// Some endpoint answered but no candidate completed a check.
    Error,
    /// No endpoint could be reached at all.
    Dead,
}

impl CheckStatus {
    /// Returns the lowercase status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Error => "error",
            Self::Dead => "dead",
        }
    }
}

impl FromStr for CheckStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "error" => Ok(Self::Error),
            "dead" => Ok(Self::Dead),
            other => Err(Error::InvalidInput(format!("unknown status: {other}"))),
        }
    }
}

/// Why a check did not come back valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected by the server (or by the proxy under test).
    AuthFailed,
    /// TCP connection refused or reset.
    ConnectRefused,
    /// Host name did not resolve.
    DnsFailure,
    /// Connect, handshake or authentication took too long.
    Timeout,
    /// Proxy refused to connect or relay.
    ProxyRefused,
    /// Proxy rejected its own credentials.
    ProxyAuthFailed,
    /// Unexpected handshake response.
    ProtocolError,
    /// The resolver produced no candidate at all.
    NoCandidates,
}

impl ErrorKind {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::ConnectRefused => "connect_refused",
            Self::DnsFailure => "dns_failure",
            Self::Timeout => "timeout",
            Self::ProxyRefused => "proxy_refused",
            Self::ProxyAuthFailed => "proxy_auth_failed",
            Self::ProtocolError => "protocol_error",
            Self::NoCandidates => "no_candidates",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::AuthFailed,
            Self::ConnectRefused,
            Self::DnsFailure,
            Self::Timeout,
            Self::ProxyRefused,
            Self::ProxyAuthFailed,
            Self::ProtocolError,
            Self::NoCandidates,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| Error::InvalidInput(format!("unknown error kind: {s}")))
    }
}

/// Outcome of one task. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Batch the task belonged to.
    pub batch_id: BatchId,
    /// Task index in submission order.
    pub task_id: TaskId,
    /// Email address or proxy address.
    pub subject: String,
    /// Verdict.
    pub status: CheckStatus,
    /// Candidate that produced the verdict, for valid and invalid results.
    pub matched_candidate: Option<EndpointCandidate>,
    /// Time to a successful check.
    pub latency_ms: Option<u64>,
    /// Failure classification, set for every non-valid result.
    pub error_kind: Option<ErrorKind>,
    /// Human-readable failure detail, set for every non-valid result.
    pub error_detail: Option<String>,
    /// Number of candidates attempted.
    pub candidates_tried: u32,
    /// Completion order within the batch, starting at 1.
    pub sequence: u64,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

impl CheckResult {
    /// Builds a valid result.
    #[must_use]
    pub fn valid(
        batch_id: BatchId,
        task_id: TaskId,
        subject: String,
        candidate: EndpointCandidate,
        latency_ms: u64,
        candidates_tried: u32,
    ) -> Self {
        Self {
            batch_id,
            task_id,
            subject,
            status: CheckStatus::Valid,
            matched_candidate: Some(candidate),
            latency_ms: Some(latency_ms),
            error_kind: None,
            error_detail: None,
            candidates_tried,
            sequence: 0,
            completed_at: Utc::now(),
        }
    }

    /// Builds a non-valid result.
    #[must_use]
    pub fn failed(
        batch_id: BatchId,
        task_id: TaskId,
        subject: String,
        status: CheckStatus,
        kind: ErrorKind,
        detail: impl Into<String>,
        candidates_tried: u32,
    ) -> Self {
        Self {
            batch_id,
            task_id,
            subject,
            status,
            matched_candidate: None,
            latency_ms: None,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
            candidates_tried,
            sequence: 0,
            completed_at: Utc::now(),
        }
    }

    /// Records the candidate a non-valid verdict came from.
    #[must_use]
    pub fn at(mut self, candidate: EndpointCandidate) -> Self {
        self.matched_candidate = Some(candidate);
        self
    }
}
