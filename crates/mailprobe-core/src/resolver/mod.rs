//! Candidate endpoint resolution.
//!
//! A credential expands into an ordered, lazy sequence of
//! [`EndpointCandidate`]s:
//!
//! 1. the server declared with the credential,
//! 2. well-known host names under the email domain against the port matrix,
//! 3. the domain's MX hosts against the same matrix.
//!
//! The MX lookup only runs when the consumer gets that far. Proxy subjects
//! expand into the configured reachability targets.

mod dns;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

pub use dns::DnsMxLookup;

use crate::check::{CandidateSource, EndpointCandidate, Protocol, SecurityMode, Subject};

const SMTP_PORTS: &[(u16, SecurityMode)] = &[
    (465, SecurityMode::ImplicitTls),
    (587, SecurityMode::StartTls),
    (25, SecurityMode::StartTls),
];

const IMAP_PORTS: &[(u16, SecurityMode)] = &[
    (993, SecurityMode::ImplicitTls),
    (143, SecurityMode::StartTls),
];

/// Port/security matrix tried against every derived host.
#[must_use]
pub const fn port_matrix(protocol: Protocol) -> &'static [(u16, SecurityMode)] {
    match protocol {
        Protocol::Smtp => SMTP_PORTS,
        Protocol::Imap => IMAP_PORTS,
        Protocol::Socks => &[],
    }
}

/// Host name prefixes tried under the email domain.
#[must_use]
pub const fn host_prefixes(protocol: Protocol) -> &'static [&'static str] {
    match protocol {
        Protocol::Smtp => &["smtp", "mail"],
        Protocol::Imap => &["imap", "mail"],
        Protocol::Socks => &[],
    }
}

/// One MX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    /// Lower is preferred.
    pub preference: u16,
    /// Exchange host, lowercase, without the trailing dot.
    pub exchange: String,
}

impl MxRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Failed MX lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MxError {
    /// The resolver gave up waiting.
    #[error("MX lookup for {domain} timed out")]
    Timeout {
        /// Queried domain.
        domain: String,
    },

    /// Any other resolver failure.
    #[error("MX lookup for {domain} failed: {detail}")]
    Lookup {
        /// Queried domain.
        domain: String,
        /// Resolver message.
        detail: String,
    },
}

/// MX record source.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// Returns the MX records of `domain`, in any order.
    ///
    /// A domain without MX records yields an empty list. A failed lookup is
    /// logged by the caller and treated as "no MX hosts".
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError>;
}

/// Builds candidate sequences.
#[derive(Clone)]
pub struct EndpointResolver {
    mx: Arc<dyn MxLookup>,
    socks_targets: Vec<EndpointCandidate>,
}

impl std::fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("socks_targets", &self.socks_targets)
            .finish_non_exhaustive()
    }
}

impl EndpointResolver {
    /// Creates a resolver using `mx` for stage three.
    #[must_use]
    pub fn new(mx: Arc<dyn MxLookup>) -> Self {
        Self {
            mx,
            socks_targets: Vec::new(),
        }
    }

    /// Sets the `host:port` targets proxies must reach.
    #[must_use]
    pub fn with_socks_targets(mut self, targets: &[(String, u16)]) -> Self {
        self.socks_targets = targets
            .iter()
            .map(|(host, port)| {
                EndpointCandidate::new(
                    host.clone(),
                    *port,
                    SecurityMode::Plaintext,
                    CandidateSource::Target,
                )
            })
            .collect();
        self
    }

    /// Expands a subject into its candidate sequence.
    #[must_use]
    pub fn resolve(&self, subject: &Subject) -> Candidates {
        let mut candidates = Candidates::empty(Arc::clone(&self.mx));

        let credential = match subject {
            Subject::Proxy(_) => {
                for target in &self.socks_targets {
                    candidates.push(target.clone());
                }
                return candidates;
            }
            Subject::Account(credential) => credential,
        };

        let matrix = port_matrix(credential.kind);

        if let Some(host) = credential.declared_host.as_deref() {
            let host = host.trim().to_ascii_lowercase();
            match credential.declared_port {
                Some(port) => candidates.push(EndpointCandidate::new(
                    host,
                    port,
                    SecurityMode::from_port(port),
                    CandidateSource::Declared,
                )),
                None => candidates.push_matrix(&host, matrix, CandidateSource::Declared),
            }
        }

        if let Some(domain) = credential.domain() {
            for prefix in host_prefixes(credential.kind) {
                candidates.push_matrix(&format!("{prefix}.{domain}"), matrix, CandidateSource::Domain);
            }
            if !matrix.is_empty() {
                candidates.pending_mx = Some(PendingMx { domain, matrix });
            }
        }

        candidates
    }
}

struct PendingMx {
    domain: String,
    matrix: &'static [(u16, SecurityMode)],
}

/// Lazy, finite, single-use candidate sequence.
pub struct Candidates {
    queue: VecDeque<EndpointCandidate>,
    seen: HashSet<(String, u16)>,
    pending_mx: Option<PendingMx>,
    mx: Arc<dyn MxLookup>,
}

impl Candidates {
    fn empty(mx: Arc<dyn MxLookup>) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            pending_mx: None,
            mx,
        }
    }

    fn push(&mut self, candidate: EndpointCandidate) {
        if self.seen.insert((candidate.host.clone(), candidate.port)) {
            self.queue.push_back(candidate);
        }
    }

    fn push_matrix(
        &mut self,
        host: &str,
        matrix: &[(u16, SecurityMode)],
        source: CandidateSource,
    ) {
        for &(port, security) in matrix {
            self.push(EndpointCandidate::new(host, port, security, source));
        }
    }

    /// Returns the next candidate, running the MX lookup when the static
    /// candidates are used up.
    pub async fn next(&mut self) -> Option<EndpointCandidate> {
        loop {
            if let Some(candidate) = self.queue.pop_front() {
                return Some(candidate);
            }

            let pending = self.pending_mx.take()?;
            let mut records = match self.mx.lookup_mx(&pending.domain).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::debug!(error = %e, "MX lookup failed, skipping MX hosts");
                    Vec::new()
                }
            };
            records.sort_by(|a, b| {
                a.preference
                    .cmp(&b.preference)
                    .then_with(|| a.exchange.cmp(&b.exchange))
            });

            for record in records {
                let host = record.exchange.trim_end_matches('.').to_ascii_lowercase();
                // Null MX (RFC 7505) has an empty exchange
                if host.is_empty() {
                    continue;
                }
                self.push_matrix(&host, pending.matrix, CandidateSource::Mx);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::check::{Credential, ProxyEndpoint, ProxyScheme};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StaticMx {
        records: Vec<MxRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MxLookup for StaticMx {
        async fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, MxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    async fn collect(mut candidates: Candidates) -> Vec<(String, u16, SecurityMode, CandidateSource)> {
        let mut out = Vec::new();
        while let Some(c) = candidates.next().await {
            out.push((c.host, c.port, c.security, c.source));
        }
        out
    }

    #[tokio::test]
    async fn smtp_order_declared_domain_mx() {
        let mx = Arc::new(StaticMx {
            records: vec![
                MxRecord::new(20, "mx2.example.com."),
                MxRecord::new(10, "mx1.example.com."),
            ],
            ..Default::default()
        });
        let resolver = EndpointResolver::new(mx);
        let credential = Credential::new(Protocol::Smtp, "a@Example.com", "pw")
            .with_server("smtp.example.com", Some(587));

        let all = collect(resolver.resolve(&Subject::Account(credential))).await;

        assert_eq!(
            all[0],
            ("smtp.example.com".into(), 587, SecurityMode::StartTls, CandidateSource::Declared)
        );
        // smtp.example.com:587 is not repeated by the domain stage
        assert_eq!(
            all[1..6],
            [
                ("smtp.example.com".into(), 465, SecurityMode::ImplicitTls, CandidateSource::Domain),
                ("smtp.example.com".into(), 25, SecurityMode::StartTls, CandidateSource::Domain),
                ("mail.example.com".into(), 465, SecurityMode::ImplicitTls, CandidateSource::Domain),
                ("mail.example.com".into(), 587, SecurityMode::StartTls, CandidateSource::Domain),
                ("mail.example.com".into(), 25, SecurityMode::StartTls, CandidateSource::Domain),
            ]
        );
        assert_eq!(all[6].0, "mx1.example.com");
        assert_eq!(all[9].0, "mx2.example.com");
        assert!(all[6..].iter().all(|c| c.3 == CandidateSource::Mx));
        assert_eq!(all.len(), 12);
    }

    #[tokio::test]
    async fn mx_lookup_is_lazy() {
        let mx = Arc::new(StaticMx::default());
        let resolver = EndpointResolver::new(Arc::clone(&mx) as Arc<dyn MxLookup>);
        let credential = Credential::new(Protocol::Imap, "a@example.com", "pw");

        let mut candidates = resolver.resolve(&Subject::Account(credential));
        let first = candidates.next().await.unwrap();
        assert_eq!((first.host.as_str(), first.port), ("imap.example.com", 993));
        assert_eq!(mx.calls.load(Ordering::SeqCst), 0);

        let rest = collect(candidates).await;
        assert_eq!(rest.len(), 3);
        assert_eq!(mx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn declared_host_without_port_uses_matrix() {
        let resolver = EndpointResolver::new(Arc::new(StaticMx::default()));
        let credential = Credential::new(Protocol::Imap, "a@example.com", "pw")
            .with_server("imap.provider.net", None);

        let all = collect(resolver.resolve(&Subject::Account(credential))).await;
        assert_eq!(all[0].0, "imap.provider.net");
        assert_eq!(all[1].0, "imap.provider.net");
        assert_eq!((all[0].1, all[1].1), (993, 143));
    }

    #[tokio::test]
    async fn declared_nonstandard_port_is_plaintext() {
        let resolver = EndpointResolver::new(Arc::new(StaticMx::default()));
        let credential = Credential::new(Protocol::Smtp, "a@example.com", "pw")
            .with_server("relay.example.com", Some(2525));
        let first = resolver
            .resolve(&Subject::Account(credential))
            .next()
            .await
            .unwrap();
        assert_eq!(first.security, SecurityMode::Plaintext);
    }

    #[tokio::test]
    async fn mx_duplicates_and_null_mx_skipped() {
        let mx = Arc::new(StaticMx {
            records: vec![MxRecord::new(0, "."), MxRecord::new(5, "mail.example.com")],
            ..Default::default()
        });
        let resolver = EndpointResolver::new(mx);
        let credential = Credential::new(Protocol::Imap, "a@example.com", "pw");
        let all = collect(resolver.resolve(&Subject::Account(credential))).await;
        // imap.* and mail.* x 2 ports; the MX host equals mail.example.com
        assert_eq!(all.len(), 4);
        let unique: HashSet<_> = all.iter().map(|c| (c.0.clone(), c.1)).collect();
        assert_eq!(unique.len(), all.len());
    }

    struct FailingMx;

    #[async_trait]
    impl MxLookup for FailingMx {
        async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError> {
            Err(MxError::Timeout {
                domain: domain.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_mx_lookup_keeps_static_candidates() {
        let resolver = EndpointResolver::new(Arc::new(FailingMx));
        let credential = Credential::new(Protocol::Smtp, "a@example.com", "pw");
        let all = collect(resolver.resolve(&Subject::Account(credential))).await;
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|c| c.3 == CandidateSource::Domain));

        let err = FailingMx.lookup_mx("example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "MX lookup for example.com timed out");
    }

    #[tokio::test]
    async fn proxy_subject_uses_targets() {
        let resolver = EndpointResolver::new(Arc::new(StaticMx::default())).with_socks_targets(&[
            ("smtp.gmail.com".into(), 587),
            ("smtp.office365.com".into(), 587),
        ]);
        let proxy = ProxyEndpoint::new(ProxyScheme::Socks5, "10.0.0.1", 1080);
        let all = collect(resolver.resolve(&Subject::Proxy(proxy))).await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.3 == CandidateSource::Target));
    }
}
