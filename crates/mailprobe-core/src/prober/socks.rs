//! SOCKS proxy reachability.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{Outcome, Prober, bounded};
use crate::check::{EndpointCandidate, Protocol, Subject};
use crate::dialer::Transport;

/// Confirms a tunnel by reading the target's first bytes.
///
/// The SOCKS handshake itself happens in the dialer; by the time this runs
/// the proxy has accepted the CONNECT. Mail servers speak first, so a banner
/// proves bytes flow end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocksProber;

impl SocksProber {
    /// Creates a prober.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prober for SocksProber {
    fn protocol(&self) -> Protocol {
        Protocol::Socks
    }

    async fn probe(
        &self,
        _subject: &Subject,
        candidate: &EndpointCandidate,
        mut transport: Transport,
        auth_timeout: Duration,
    ) -> Outcome {
        let started = Instant::now();
        let mut banner = [0u8; 64];

        bounded(auth_timeout, async {
            match transport.read(&mut banner).await {
                Ok(0) => Outcome::ProtocolError(format!("{candidate} closed without a banner")),
                Ok(_) => Outcome::Success(started.elapsed()),
                Err(e) => Outcome::ProtocolError(e.to_string()),
            }
        })
        .await
    }
}
