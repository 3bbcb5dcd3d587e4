//! # mailprobe-core
//!
//! Bulk verification engine for SMTP accounts, IMAP accounts and SOCKS
//! proxies.
//!
//! This crate provides:
//! - **Worker pools** - named, shared concurrency limits with per-batch cancellation
//! - **Endpoint resolution** - declared server, domain-derived hosts and MX hosts
//! - **Dialing** - direct TCP or SOCKS4/SOCKS5 tunnels with proxy rotation
//! - **Probing** - SMTP and IMAP authentication, proxy reachability
//! - **Stop rules** - attempt, duration, error-rate and success-rate limits
//! - **Result storage** - in-memory and `SQLite` stores
//! - **Orchestration** - start, stop, status, wait, subscribe
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailprobe_core::{
//!     BatchConfig, BatchOrchestrator, Credential, PoolRegistry, Protocol, SqliteResultStore,
//!     Subject,
//! };
//!
//! let store = Arc::new(SqliteResultStore::new("results.db").await?);
//! let orchestrator = BatchOrchestrator::new(Arc::new(PoolRegistry::default()), store);
//!
//! let inputs = vec![Subject::Account(Credential::parse_line(
//!     Protocol::Smtp,
//!     "alice@example.com:secret",
//! )?)];
//! let config = BatchConfig::builder().max_concurrent(20).build()?;
//!
//! let id = orchestrator.start(inputs, Vec::new(), config).await?;
//! let metrics = orchestrator.wait(id).await?;
//! println!("{} valid of {}", metrics.valid, metrics.attempts);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod check;
pub mod dialer;
mod error;
pub mod pool;
pub mod prober;
pub mod resolver;
pub mod sink;

pub use batch::{
    BatchConfig, BatchConfigBuilder, BatchId, BatchMetrics, BatchOrchestrator, BatchState,
    StopCondition, StopReason,
};
pub use check::{
    CandidateSource, CheckResult, CheckStatus, Credential, EndpointCandidate, ErrorKind,
    Protocol, ProxyEndpoint, ProxyScheme, SecurityMode, Subject, TaskId,
};
pub use dialer::{AsyncStream, DialError, Dialer, ProxyRotation, TcpDialer, Transport};
pub use error::{Error, Result};
pub use pool::{DEFAULT_MAX_WORKERS, Permit, PoolError, PoolRegistry, PoolToken, WorkerPool};
pub use prober::{ImapProber, Outcome, Prober, SmtpProber, SocksProber};
pub use resolver::{
    Candidates, DnsMxLookup, EndpointResolver, MxError, MxLookup, MxRecord,
};
pub use sink::{MemoryResultStore, ResultSink, ResultStore, SqliteResultStore};
