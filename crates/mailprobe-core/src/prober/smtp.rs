//! SMTP account verification.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mailprobe_smtp::{Client, SmtpStream, create_tls_connector};
use tokio_rustls::TlsConnector;

use super::{Outcome, Prober, bounded};
use crate::check::{EndpointCandidate, Protocol, SecurityMode, Subject};
use crate::dialer::Transport;

/// Greeting, EHLO, STARTTLS or TLS wrap, AUTH, QUIT.
#[derive(Clone)]
pub struct SmtpProber {
    connector: TlsConnector,
    ehlo_name: String,
}

impl std::fmt::Debug for SmtpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpProber")
            .field("ehlo_name", &self.ehlo_name)
            .finish_non_exhaustive()
    }
}

impl SmtpProber {
    /// Creates a prober announcing itself as `ehlo_name`.
    #[must_use]
    pub fn new(ehlo_name: impl Into<String>) -> Self {
        Self {
            connector: create_tls_connector(),
            ehlo_name: ehlo_name.into(),
        }
    }

    async fn attempt(
        &self,
        username: &str,
        password: &str,
        candidate: &EndpointCandidate,
        transport: Transport,
    ) -> Result<(), mailprobe_smtp::Error> {
        let stream = match candidate.security {
            SecurityMode::ImplicitTls => {
                SmtpStream::tls(transport, &candidate.host, &self.connector).await?
            }
            SecurityMode::StartTls | SecurityMode::Plaintext => SmtpStream::plain(transport),
        };

        let mut client = Client::from_stream(stream).await?.ehlo(&self.ehlo_name).await?;
        if candidate.security == SecurityMode::StartTls {
            client = client
                .starttls(&candidate.host, &self.connector, &self.ehlo_name)
                .await?;
        }

        let client = client.auth(username, password).await?;
        if let Err(e) = client.quit().await {
            tracing::debug!(?e, host = %candidate.host, "QUIT after successful AUTH failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Prober for SmtpProber {
    fn protocol(&self) -> Protocol {
        Protocol::Smtp
    }

    async fn probe(
        &self,
        subject: &Subject,
        candidate: &EndpointCandidate,
        transport: Transport,
        auth_timeout: Duration,
    ) -> Outcome {
        let Subject::Account(credential) = subject else {
            return Outcome::ProtocolError("SMTP probe needs an account".into());
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
