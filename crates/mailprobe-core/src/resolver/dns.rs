//! MX lookups over the system resolver.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;

use super::{MxError, MxLookup, MxRecord};

/// [`MxLookup`] backed by `hickory-resolver`.
#[derive(Clone)]
pub struct DnsMxLookup {
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for DnsMxLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsMxLookup").finish_non_exhaustive()
    }
}

impl DnsMxLookup {
    /// Uses `/etc/resolv.conf` (or the platform equivalent), falling back to
    /// the default public resolvers when it cannot be read.
    #[must_use]
    pub fn from_system_conf() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::warn!(?e, "system resolver config unavailable, using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }

    /// Wraps an existing resolver.
    #[must_use]
    pub const fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl MxLookup for DnsMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| {
                    let exchange = mx.exchange().to_lowercase().to_string();
                    MxRecord::new(mx.preference(), exchange.trim_end_matches('.'))
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                ResolveErrorKind::Timeout => Err(MxError::Timeout {
                    domain: domain.to_string(),
                }),
                _ => Err(MxError::Lookup {
                    domain: domain.to_string(),
                    detail: e.to_string(),
                }),
            },
        }
    }
}
