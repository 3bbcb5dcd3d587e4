//! One connect/handshake/authenticate attempt per candidate.
//!
//! Every prober receives an already-dialed [`Transport`] and classifies what
//! happens on it into an [`Outcome`]. Authentication rejections end the task;
//! everything else lets the candidate loop move on.

mod imap;
mod smtp;
mod socks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use imap::ImapProber;
pub use smtp::SmtpProber;
pub use socks::SocksProber;

use crate::check::{EndpointCandidate, Protocol, Subject};
use crate::dialer::Transport;

/// Result of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handshake and authentication succeeded.
    Success(Duration),
    /// The server rejected the credentials.
    AuthFailed(String),
    /// The peer misbehaved or does not speak the protocol.
    ProtocolError(String),
    /// The auth timeout elapsed.
    Timeout,
}

impl Outcome {
    /// True when the candidate loop must not try further candidates.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::AuthFailed(_))
    }
}

/// Protocol-specific verification.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Protocol spoken by this prober.
    fn protocol(&self) -> Protocol;

    /// Runs one attempt over `transport`, bounded by `auth_timeout`.
    async fn probe(
        &self,
        subject: &Subject,
        candidate: &EndpointCandidate,
        transport: Transport,
        auth_timeout: Duration,
    ) -> Outcome;
}

/// Builds the prober for a batch.
#[must_use]
pub fn for_protocol(protocol: Protocol, ehlo_name: &str) -> Arc<dyn Prober> {
    match protocol {
        Protocol::Smtp => Arc::new(SmtpProber::new(ehlo_name)),
        Protocol::Imap => Arc::new(ImapProber::new()),
        Protocol::Socks => Arc::new(SocksProber::new()),
    }
}

/// Runs `attempt` under `limit`, mapping an elapsed timer to [`Outcome::Timeout`].
async fn bounded<F>(limit: Duration, attempt: F) -> Outcome
where
    F: std::future::Future<Output = Outcome>,
{
    tokio::time::timeout(limit, attempt)
        .await
        .unwrap_or(Outcome::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_outcomes() {
        assert!(Outcome::Success(Duration::ZERO).is_terminal());
        assert!(Outcome::AuthFailed("535".into()).is_terminal());
        assert!(!Outcome::Timeout.is_terminal());
        assert!(!Outcome::ProtocolError("x".into()).is_terminal());
    }

    #[test]
    fn selected_by_protocol() {
        assert_eq!(for_protocol(Protocol::Imap, "x").protocol(), Protocol::Imap);
        assert_eq!(for_protocol(Protocol::Socks, "x").protocol(), Protocol::Socks);
        assert_eq!(for_protocol(Protocol::Smtp, "x").protocol(), Protocol::Smtp);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out() {
        let outcome = bounded(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Outcome::Success(Duration::ZERO)
        })
        .await;
        assert_eq!(outcome, Outcome::Timeout);
    }
}
