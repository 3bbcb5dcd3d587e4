//! IMAP account verification.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mailprobe_imap::{Client, ImapStream, create_tls_connector};
use tokio_rustls::TlsConnector;

use super::{Outcome, Prober, bounded};
use crate::check::{EndpointCandidate, Protocol, SecurityMode, Subject};
use crate::dialer::Transport;

/// Greeting, STARTTLS or TLS wrap, LOGIN, LOGOUT.
#[derive(Clone)]
pub struct ImapProber {
    connector: TlsConnector,
}

impl std::fmt::Debug for ImapProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapProber").finish_non_exhaustive()
    }
}

impl Default for ImapProber {
    fn default() -> Self {
        Self::new()
    }
}

impl ImapProber {
    /// Creates a prober.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: create_tls_connector(),
        }
    }

    async fn attempt(
        &self,
        username: &str,
        password: &str,
        candidate: &EndpointCandidate,
        transport: Transport,
    ) -> mailprobe_imap::Result<()> {
        let stream = match candidate.security {
            SecurityMode::ImplicitTls => {
                ImapStream::connect_tls(transport, &candidate.host, &self.connector).await?
            }
            SecurityMode::StartTls | SecurityMode::Plaintext => ImapStream::plain(transport),
        };

        let mut client = Client::from_stream(stream).await?;
        if candidate.security == SecurityMode::StartTls {
            client = client.starttls(&candidate.host, &self.connector).await?;
        }

        let session = client.login(username, password).await?;
        if let Err(e) = session.logout().await {
            tracing::debug!(?e, host = %candidate.host, "LOGOUT after successful LOGIN failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Prober for ImapProber {
    fn protocol(&self) -> Protocol {
        Protocol::Imap
    }

    async fn probe(
        &self,
        subject: &Subject,
        candidate: &EndpointCandidate,
        transport: Transport,
        auth_timeout: Duration,
    ) -> Outcome {
        let Subject::Account(credential) = subject else {
            return Outcome::ProtocolError("IMAP probe needs an account".into());
        };
        let started = Instant::now();

        bounded(auth_timeout, async {
            match self
                .attempt(&credential.email, &credential.secret, candidate, transport)
                .await
            {
                Ok(()) => Outcome::Success(started.elapsed()),
                Err(e) if e.is_auth_rejection() => Outcome::AuthFailed(e.to_string()),
                Err(e) => Outcome::ProtocolError(e.to_string()),
            }
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::check::{CandidateSource, Credential, ProxyEndpoint, ProxyScheme};

    fn subject(password: &str) -> Subject {
        Subject::Account(Credential::new(Protocol::Imap, "user@example.com", password))
    }

    fn plaintext() -> EndpointCandidate {
        EndpointCandidate::new(
            "imap.example.com",
            1143,
            SecurityMode::Plaintext,
            CandidateSource::Declared,
        )
    }

    #[tokio::test]
    async fn valid_credentials() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .write(b"A0000 LOGIN user@example.com secret\r\n")
            .read(b"A0000 OK Logged in\r\n")
            .write(b"A0001 LOGOUT\r\n")
            .read(b"* BYE Logging out\r\nA0001 OK Logout completed\r\n")
            .build();

        let outcome = ImapProber::new()
            .probe(&subject("secret"), &plaintext(), Box::new(mock), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::Success(_)));
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN user@example.com wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();

        let outcome = ImapProber::new()
            .probe(&subject("wrong"), &plaintext(), Box::new(mock), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::AuthFailed(_)));
    }

    #[tokio::test]
    async fn unavailable_backend_is_not_auth_failure() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN user@example.com secret\r\n")
            .read(b"A0000 NO [UNAVAILABLE] Backend down\r\n")
            .build();

        let outcome = ImapProber::new()
            .probe(&subject("secret"), &plaintext(), Box::new(mock), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::ProtocolError(_)));
    }

    #[tokio::test]
    async fn smtp_banner_is_protocol_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"220 mx.example.com ESMTP\r\n")
            .build();

        let outcome = ImapProber::new()
            .probe(&subject("secret"), &plaintext(), Box::new(mock), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::ProtocolError(_)));
    }

    #[tokio::test]
    async fn proxy_subject_rejected() {
        let mock = tokio_test::io::Builder::new().build();
        let subject = Subject::Proxy(ProxyEndpoint::new(ProxyScheme::Socks5, "10.0.0.1", 1080));

        let outcome = ImapProber::new()
            .probe(&subject, &plaintext(), Box::new(mock), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Outcome::ProtocolError(_)));
    }
}
