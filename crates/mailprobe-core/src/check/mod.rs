//! Inputs and outputs of a single check.
//!
//! A check takes one [`Subject`] (an account credential, or a proxy when the
//! batch verifies proxies), walks its [`EndpointCandidate`]s and produces
//! exactly one [`CheckResult`].

mod model;
mod proxy;

pub use model::{
    CandidateSource, CheckResult, CheckStatus, Credential, EndpointCandidate, ErrorKind, Protocol,
    SecurityMode, Subject, TaskId,
};
pub use proxy::{ProxyEndpoint, ProxyScheme};
