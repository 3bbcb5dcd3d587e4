//! The candidate loop run for every input.

use std::sync::Arc;
use std::time::Duration;

use crate::batch::BatchId;
use crate::check::{
    CheckResult, CheckStatus, EndpointCandidate, ErrorKind, ProxyEndpoint, Subject, TaskId,
};
use crate::dialer::{DialError, Dialer, ProxyRotation, Transport};
use crate::prober::{Outcome, Prober};
use crate::resolver::EndpointResolver;

/// Everything a task needs, shared by all tasks of a batch.
pub(crate) struct TaskContext {
    pub batch_id: BatchId,
    pub resolver: EndpointResolver,
    pub dialer: Arc<dyn Dialer>,
    pub prober: Arc<dyn Prober>,
    pub proxies: Arc<ProxyRotation>,
    pub timeout: Duration,
}

enum Dialed {
    Connected(Transport),
    Failed(DialError),
    /// Every batch proxy has been marked unusable.
    NoProxyLeft(DialError),
}

struct Failure {
    kind: ErrorKind,
    detail: String,
}

impl TaskContext {
    /// Runs one task to its single result.
    pub async fn run(&self, task_id: TaskId, subject: &Subject) -> CheckResult {
        let label = subject.label();
        let mut candidates = self.resolver.resolve(subject);
        let mut proxy = self.initial_proxy(subject);
        let mut tried = 0u32;
        // Dead only while every candidate refused the connection outright
        let mut refused_only = true;
        let mut last: Option<Failure> = None;

        if matches!(subject, Subject::Account(_)) && !self.proxies.is_empty() && proxy.is_none() {
            return self.fail(
                task_id,
                label,
                CheckStatus::Dead,
                ErrorKind::ProxyRefused,
                "no usable proxy left",
                0,
            );
        }

        while let Some(candidate) = candidates.next().await {
            tried += 1;

            let transport = match self.dial(subject, &candidate, &mut proxy).await {
                Dialed::Connected(transport) => transport,
                Dialed::NoProxyLeft(e) => {
                    return self.fail(
                        task_id,
                        label,
                        CheckStatus::Dead,
                        ErrorKind::ProxyRefused,
                        format!("no usable proxy left: {e}"),
                        tried,
                    );
                }
                Dialed::Failed(e) => {
                    tracing::debug!(subject = %label, %candidate, error = %e, "dial failed");
                    if let (Subject::Proxy(_), DialError::ProxyAuthFailed(detail)) = (subject, &e)
                    {
                        return self
                            .fail(
                                task_id,
                                label,
                                CheckStatus::Invalid,
                                ErrorKind::ProxyAuthFailed,
                                detail.clone(),
                                tried,
                            )
                            .at(candidate);
                    }
                    // A later refusal does not hide why the task is not dead
                    let refusal = e.is_refusal();
                    if refused_only || !refusal {
                        last = Some(Failure {
                            kind: e.kind(),
                            detail: format!("{candidate}: {e}"),
                        });
                    }
                    refused_only &= refusal;
                    continue;
                }
            };
            refused_only = false;

            match self
                .prober
                .probe(subject, &candidate, transport, self.timeout)
                .await
            {
                Outcome::Success(latency) => {
                    tracing::debug!(subject = %label, %candidate, ?latency, "check succeeded");
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    return CheckResult::valid(
                        self.batch_id,
                        task_id,
                        label,
                        candidate,
                        latency_ms,
                        tried,
                    );
                }
                Outcome::AuthFailed(detail) => {
                    tracing::debug!(subject = %label, %candidate, %detail, "credentials rejected");
                    return self
                        .fail(
                            task_id,
                            label,
                            CheckStatus::Invalid,
                            ErrorKind::AuthFailed,
                            detail,
                            tried,
                        )
                        .at(candidate);
                }
                Outcome::ProtocolError(detail) => {
                    tracing::debug!(subject = %label, %candidate, %detail, "protocol error");
                    last = Some(Failure {
                        kind: ErrorKind::ProtocolError,
                        detail: format!("{candidate}: {detail}"),
                    });
                }
                Outcome::Timeout => {
                    tracing::debug!(subject = %label, %candidate, "probe timed out");
                    last = Some(Failure {
                        kind: ErrorKind::Timeout,
                        detail: format!("{candidate}: no answer within {:?}", self.timeout),
                    });
                }
            }
        }

        let status = if refused_only { CheckStatus::Dead } else { CheckStatus::Error };
        match last {
            Some(failure) => {
                self.fail(task_id, label, status, failure.kind, failure.detail, tried)
            }
            None => {
                let detail = format!("no candidate endpoints for {label}");
                self.fail(
                    task_id,
                    label,
                    CheckStatus::Dead,
                    ErrorKind::NoCandidates,
                    detail,
                    tried,
                )
            }
        }
    }

    fn initial_proxy(&self, subject: &Subject) -> Option<(Option<usize>, ProxyEndpoint)> {
        match subject {
            Subject::Proxy(proxy) => Some((None, proxy.clone())),
            Subject::Account(_) => self
                .proxies
                .next()
                .map(|(index, proxy)| (Some(index), proxy.clone())),
        }
    }

    /// Dials one candidate, rotating batch proxies that refuse us.
    async fn dial(
        &self,
        subject: &Subject,
        candidate: &EndpointCandidate,
        proxy: &mut Option<(Option<usize>, ProxyEndpoint)>,
    ) -> Dialed {
        loop {
            let result = self
                .dialer
                .dial(
                    &candidate.host,
                    candidate.port,
                    proxy.as_ref().map(|(_, endpoint)| endpoint),
                    self.timeout,
                )
                .await;

            let e = match result {
                Ok(transport) => return Dialed::Connected(transport),
                Err(e) => e,
            };

            // Only batch proxies rotate; a proxy under test is the subject
            let rotating = matches!(subject, Subject::Account(_));
            match proxy.as_ref() {
                Some((Some(index), endpoint)) if rotating && e.is_proxy_fault() => {
                    tracing::debug!(proxy = %endpoint, error = %e, "rotating away from proxy");
                    self.proxies.mark_unusable(*index);
                    match self.proxies.next() {
                        Some((next, endpoint)) => *proxy = Some((Some(next), endpoint.clone())),
                        None => return Dialed::NoProxyLeft(e),
                    }
                }
                _ => return Dialed::Failed(e),
            }
        }
    }

    fn fail(
        &self,
        task_id: TaskId,
        label: String,
        status: CheckStatus,
        kind: ErrorKind,
        detail: impl Into<String>,
        tried: u32,
    ) -> CheckResult {
        CheckResult::failed(self.batch_id, task_id, label, status, kind, detail, tried)
    }
}
