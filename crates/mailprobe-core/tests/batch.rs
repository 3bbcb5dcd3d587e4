//! Orchestrator tests against in-memory dialers and probers.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use mailprobe_core::{
    BatchConfig, BatchId, BatchMetrics, BatchOrchestrator, BatchState, CandidateSource,
    CheckResult, CheckStatus, Credential, DialError, Dialer, EndpointCandidate, Error, ErrorKind,
    MemoryResultStore, MxError, MxLookup, MxRecord, Outcome, PoolRegistry, Prober, Protocol,
    ProxyEndpoint, ProxyScheme, Result, ResultStore, SqliteResultStore, StopReason, Subject,
    Transport,
};

/// Connects to hosts in `reachable`, refuses everything else.
struct FakeDialer {
    reachable: HashSet<String>,
}

impl FakeDialer {
    fn new(hosts: &[&str]) -> Self {
        Self {
            reachable: hosts.iter().map(|h| (*h).to_string()).collect(),
        }
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(
        &self,
        host: &str,
        port: u16,
        proxy: Option<&ProxyEndpoint>,
        _connect_timeout: Duration,
    ) -> std::result::Result<Transport, DialError> {
        if let Some(proxy) = proxy {
            if proxy.host.starts_with("bad") {
                return Err(DialError::ProxyRefused(format!("{proxy} is down")));
            }
            if proxy.username.as_deref() == Some("wrong") {
                return Err(DialError::ProxyAuthFailed("bad proxy password".into()));
            }
        }
        if self.reachable.contains(host) {
            let (client, _server) = tokio::io::duplex(64);
            Ok(Box::new(client))
        } else {
            Err(DialError::ConnectRefused(format!("{host}:{port}")))
        }
    }
}

/// Answers every dial with a timeout.
struct SilentDialer;

#[async_trait]
impl Dialer for SilentDialer {
    async fn dial(
        &self,
        _host: &str,
        _port: u16,
        _proxy: Option<&ProxyEndpoint>,
        connect_timeout: Duration,
    ) -> std::result::Result<Transport, DialError> {
        Err(DialError::Timeout(connect_timeout))
    }
}

/// Decides by password: `good` passes, `bad` is rejected, `gated` waits for
/// the gate first. Hosts named `broken*` answer with garbage.
#[derive(Default)]
struct FakeProber {
    gate: Option<Arc<Semaphore>>,
    started: AtomicUsize,
    probed: parking_lot::Mutex<Vec<EndpointCandidate>>,
}

impl FakeProber {
    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn protocol(&self) -> Protocol {
        Protocol::Smtp
    }

    async fn probe(
        &self,
        subject: &Subject,
        candidate: &EndpointCandidate,
        _transport: Transport,
        _auth_timeout: Duration,
    ) -> Outcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.probed.lock().push(candidate.clone());
        if candidate.host.starts_with("broken") {
            return Outcome::ProtocolError("unexpected greeting".into());
        }
        let secret = match subject {
            Subject::Account(credential) => credential.secret.as_str(),
            Subject::Proxy(_) => "good",
        };
        match secret {
            "bad" => Outcome::AuthFailed("535 5.7.8 Authentication failed".into()),
            "gated" => {
                if let Some(gate) = &self.gate {
                    let _permit = gate.acquire().await.unwrap();
                }
                Outcome::Success(Duration::from_millis(5))
            }
            _ => Outcome::Success(Duration::from_millis(42)),
        }
    }
}

struct StaticMx(Vec<MxRecord>);

#[async_trait]
impl MxLookup for StaticMx {
    async fn lookup_mx(&self, _domain: &str) -> std::result::Result<Vec<MxRecord>, MxError> {
        Ok(self.0.clone())
    }
}

/// Accepts metrics but refuses every result.
struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
    async fn append(&self, _result: &CheckResult) -> Result<()> {
        Err(Error::StoreUnavailable("disk full".into()))
    }
    async fn save_metrics(&self, _metrics: &BatchMetrics) -> Result<()> {
        Ok(())
    }
    async fn metrics(&self, _batch_id: BatchId) -> Result<Option<BatchMetrics>> {
        Ok(None)
    }
    async fn recent(&self, _batch_id: BatchId, _limit: usize) -> Result<Vec<CheckResult>> {
        Ok(Vec::new())
    }
    async fn results(&self, _batch_id: BatchId) -> Result<Vec<CheckResult>> {
        Ok(Vec::new())
    }
}

fn orchestrator(
    store: Arc<dyn ResultStore>,
    dialer: impl Dialer + 'static,
    prober: Arc<FakeProber>,
    mx: Vec<MxRecord>,
) -> BatchOrchestrator {
    BatchOrchestrator::new(Arc::new(PoolRegistry::new(4)), store)
        .with_dialer(Arc::new(dialer))
        .with_prober(prober)
        .with_mx_lookup(Arc::new(StaticMx(mx)))
}

fn account(index: usize, secret: &str) -> Subject {
    Subject::Account(
        Credential::new(Protocol::Smtp, format!("user{index}@example.com"), secret)
            .with_server("smtp.example.com", Some(587)),
    )
}

fn assert_consistent(metrics: &BatchMetrics) {
    assert_eq!(metrics.successes + metrics.failures, metrics.attempts);
    assert_eq!(
        metrics.valid + metrics.invalid + metrics.error + metrics.dead,
        metrics.attempts
    );
}

#[tokio::test]
async fn error_rate_stops_batch_early() {
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(
        store.clone(),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let inputs = (0..20)
        .map(|i| account(i, if i < 15 { "bad" } else { "good" }))
        .collect();
    let config = BatchConfig::builder()
        .max_concurrent(1)
        .pool_name("error-rate")
        .evaluate_every(1)
        .max_error_rate_pct(50.0)
        .min_sample_size(10)
        .build()
        .unwrap();

    let id = orchestrator.start(inputs, Vec::new(), config).await.unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();

    assert_eq!(metrics.state, BatchState::Stopped);
    assert_eq!(metrics.stop_reason, Some(StopReason::ErrorRateExceeded));
    assert!(metrics.attempts >= 10);
    assert!(metrics.attempts < 20);
    assert_eq!(metrics.valid, 0);
    assert_consistent(&metrics);

    let stored = store.results(id).await.unwrap();
    assert_eq!(stored.len() as u64, metrics.attempts);
    let tasks: HashSet<_> = stored.iter().map(|r| r.task_id).collect();
    assert_eq!(tasks.len(), stored.len());
}

#[tokio::test]
async fn wrong_password_is_invalid_after_one_candidate() {
    let prober = Arc::new(FakeProber::default());
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::clone(&prober),
        Vec::new(),
    );

    let id = orchestrator
        .start(vec![account(0, "bad")], Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Completed);
    assert_eq!(metrics.stop_reason, None);

    let results = orchestrator.recent(id, 10).await.unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.status, CheckStatus::Invalid);
    assert_eq!(result.error_kind, Some(ErrorKind::AuthFailed));
    assert!(result.error_detail.is_some());
    assert_eq!(result.candidates_tried, 1);
    assert_eq!(result.sequence, 1);
    assert_eq!(prober.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn falls_back_to_mx_host() {
    let prober = Arc::new(FakeProber::default());
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["mx1.example.org"]),
        Arc::clone(&prober),
        vec![MxRecord::new(10, "mx1.example.org")],
    );
    let subject = Subject::Account(
        Credential::new(Protocol::Smtp, "alice@example.com", "good")
            .with_server("dead.example.net", Some(587)),
    );

    let id = orchestrator
        .start(vec![subject], Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.valid, 1);

    let result = orchestrator.recent(id, 1).await.unwrap().remove(0);
    assert_eq!(result.status, CheckStatus::Valid);
    assert_eq!(result.latency_ms, Some(42));
    let candidate = result.matched_candidate.unwrap();
    assert_eq!(candidate.host, "mx1.example.org");
    assert_eq!(candidate.source, CandidateSource::Mx);
    // declared + smtp./mail. x 3 ports + the first MX candidate
    assert_eq!(result.candidates_tried, 8);
    assert_eq!(prober.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_everywhere_is_dead() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&[]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let no_domain = Subject::Account(Credential::new(Protocol::Smtp, "nodomain", "good"));

    let id = orchestrator
        .start(vec![account(0, "good"), no_domain], Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.dead, 2);
    assert_consistent(&metrics);

    let mut results = orchestrator.recent(id, 10).await.unwrap();
    results.sort_by_key(|r| r.task_id);
    assert_eq!(results[0].error_kind, Some(ErrorKind::ConnectRefused));
    assert_eq!(results[1].error_kind, Some(ErrorKind::NoCandidates));
    assert_eq!(results[1].candidates_tried, 0);
}

#[tokio::test]
async fn stop_lets_in_flight_tasks_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let prober = Arc::new(FakeProber::gated(Arc::clone(&gate)));
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::clone(&prober),
        Vec::new(),
    );
    let inputs = (0..10).map(|i| account(i, "gated")).collect();
    let config = BatchConfig::builder()
        .max_concurrent(2)
        .pool_name("stop-test")
        .build()
        .unwrap();

    let id = orchestrator.start(inputs, Vec::new(), config).await.unwrap();
    while prober.started.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Nothing changes while both tasks are blocked
    let first = serde_json::to_string(&orchestrator.status(id).await.unwrap()).unwrap();
    let second = serde_json::to_string(&orchestrator.status(id).await.unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(orchestrator.status(id).await.unwrap().state, BatchState::Running);

    orchestrator.stop(id).unwrap();
    gate.add_permits(100);
    let metrics = orchestrator.wait(id).await.unwrap();

    assert_eq!(metrics.state, BatchState::Stopped);
    assert_eq!(metrics.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(metrics.attempts, 2);
    assert_eq!(metrics.valid, 2);
    assert_eq!(prober.started.load(Ordering::SeqCst), 2);
    assert!(metrics.stopped_at.is_some());

    // Stopping again is harmless and the snapshot is stable
    orchestrator.stop(id).unwrap();
    let a = serde_json::to_string(&orchestrator.status(id).await.unwrap()).unwrap();
    let b = serde_json::to_string(&orchestrator.status(id).await.unwrap()).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn attempt_cap() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );

    let capped = BatchConfig::builder().max_attempts(3).build().unwrap();
    let inputs = (0..5).map(|i| account(i, "good")).collect();
    let id = orchestrator.start(inputs, Vec::new(), capped).await.unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Stopped);
    assert_eq!(metrics.stop_reason, Some(StopReason::MaxAttemptsReached));
    assert_eq!(metrics.attempts, 3);

    let exact = BatchConfig::builder().max_attempts(5).build().unwrap();
    let inputs = (0..5).map(|i| account(i, "good")).collect();
    let id = orchestrator.start(inputs, Vec::new(), exact).await.unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Completed);
    assert_eq!(metrics.attempts, 5);

    assert_eq!(orchestrator.batches().len(), 2);
}

#[tokio::test]
async fn refused_proxies_rotate_then_exhaust() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );

    let proxies = vec![
        ProxyEndpoint::new(ProxyScheme::Socks5, "bad-proxy.example.net", 1080),
        ProxyEndpoint::new(ProxyScheme::Socks5, "good-proxy.example.net", 1080),
    ];
    let id = orchestrator
        .start(vec![account(0, "good")], proxies, BatchConfig::default())
        .await
        .unwrap();
    assert_eq!(orchestrator.wait(id).await.unwrap().valid, 1);

    let proxies = vec![
        ProxyEndpoint::new(ProxyScheme::Socks5, "bad-1.example.net", 1080),
        ProxyEndpoint::new(ProxyScheme::Socks4, "bad-2.example.net", 1080),
    ];
    let id = orchestrator
        .start(vec![account(0, "good")], proxies, BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.dead, 1);
    let result = orchestrator.recent(id, 1).await.unwrap().remove(0);
    assert_eq!(result.error_kind, Some(ErrorKind::ProxyRefused));
}

#[tokio::test]
async fn socks_batch_checks_proxies() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.gmail.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let inputs = vec![
        Subject::Proxy(ProxyEndpoint::new(ProxyScheme::Socks5, "10.0.0.1", 1080)),
        Subject::Proxy(
            ProxyEndpoint::new(ProxyScheme::Socks5, "10.0.0.2", 1080).with_auth("wrong", "pw"),
        ),
    ];
    let config = BatchConfig::builder()
        .protocol(Protocol::Socks)
        .build()
        .unwrap();

    let id = orchestrator.start(inputs, Vec::new(), config).await.unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Completed);
    assert_eq!(metrics.valid, 1);
    assert_eq!(metrics.invalid, 1);

    let mut results = orchestrator.recent(id, 2).await.unwrap();
    results.sort_by_key(|r| r.task_id);
    assert_eq!(results[0].subject, "10.0.0.1:1080");
    assert_eq!(
        results[0].matched_candidate.as_ref().unwrap().source,
        CandidateSource::Target
    );
    assert_eq!(results[1].error_kind, Some(ErrorKind::ProxyAuthFailed));
}

#[tokio::test]
async fn store_failure_fails_batch() {
    let orchestrator = orchestrator(
        Arc::new(BrokenStore),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let config = BatchConfig::builder()
        .max_concurrent(1)
        .pool_name("broken-store")
        .build()
        .unwrap();
    let inputs = (0..5).map(|i| account(i, "good")).collect();

    let id = orchestrator.start(inputs, Vec::new(), config).await.unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Failed);
    assert_eq!(metrics.stop_reason, Some(StopReason::ResultSinkUnavailable));
    assert_consistent(&metrics);
}

#[tokio::test]
async fn subscribers_receive_every_result() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::gated(Arc::clone(&gate))),
        Vec::new(),
    );
    let inputs = (0..3).map(|i| account(i, "gated")).collect();

    let id = orchestrator
        .start(inputs, Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let mut rx = orchestrator.subscribe(id).unwrap();
    gate.add_permits(3);

    let mut sequences = Vec::new();
    for _ in 0..3 {
        sequences.push(rx.recv().await.unwrap().sequence);
    }
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(orchestrator.wait(id).await.unwrap().valid, 3);
}

#[tokio::test]
async fn rejects_mismatched_inputs() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&[]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let imap = Subject::Account(Credential::new(Protocol::Imap, "a@example.com", "x"));

    let err = orchestrator
        .start(vec![imap], Vec::new(), BatchConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(matches!(
        orchestrator.status(BatchId::new()).await,
        Err(Error::BatchNotFound(_))
    ));
    assert!(orchestrator.stop(BatchId::new()).is_err());
}

#[tokio::test]
async fn sqlite_store_serves_finished_batches() {
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::in_memory().await.unwrap());
    let first = orchestrator(
        Arc::clone(&store),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let inputs = (0..3).map(|i| account(i, "good")).collect();
    let id = first
        .start(inputs, Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let finished = first.wait(id).await.unwrap();

    // A second orchestrator only sees the store
    let second = orchestrator(
        Arc::clone(&store),
        FakeDialer::new(&[]),
        Arc::new(FakeProber::default()),
        Vec::new(),
    );
    let loaded = second.status(id).await.unwrap();
    assert_eq!(loaded.state, BatchState::Completed);
    assert_eq!(loaded.valid, finished.valid);
    assert_eq!(loaded.attempts, 3);

    let recent = second.recent(id, 2).await.unwrap();
    assert_eq!(
        recent.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn timeouts_count_toward_error() {
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        SilentDialer,
        Arc::new(FakeProber::default()),
        Vec::new(),
    );

    let id = orchestrator
        .start(vec![account(0, "good")], Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.error, 1);
    assert_eq!(metrics.dead, 0);
    assert_consistent(&metrics);

    let result = orchestrator.recent(id, 1).await.unwrap().remove(0);
    assert_eq!(result.status, CheckStatus::Error);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    // declared 587, then smtp. 465/25 and mail. x 3 ports
    assert_eq!(result.candidates_tried, 6);
    assert!(result.matched_candidate.is_none());
}

#[tokio::test]
async fn reachable_without_handshake_is_error() {
    let prober = Arc::new(FakeProber::default());
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["broken.example.com"]),
        Arc::clone(&prober),
        Vec::new(),
    );
    let subject = Subject::Account(
        Credential::new(Protocol::Smtp, "alice@example.com", "good")
            .with_server("broken.example.com", Some(587)),
    );

    let id = orchestrator
        .start(vec![subject], Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Completed);
    assert_eq!(metrics.error, 1);
    assert_consistent(&metrics);

    let result = orchestrator.recent(id, 1).await.unwrap().remove(0);
    assert_eq!(result.status, CheckStatus::Error);
    // The refused smtp./mail. candidates after it keep the handshake failure
    assert_eq!(result.error_kind, Some(ErrorKind::ProtocolError));
    assert!(result.error_detail.unwrap().contains("unexpected greeting"));
    assert_eq!(result.candidates_tried, 7);
    assert_eq!(prober.started.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn duration_limit_stops_blocked_batch() {
    let gate = Arc::new(Semaphore::new(0));
    let prober = Arc::new(FakeProber::gated(Arc::clone(&gate)));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(
        store.clone(),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::clone(&prober),
        Vec::new(),
    );
    let inputs = (0..6).map(|i| account(i, "gated")).collect();
    let config = BatchConfig::builder()
        .max_concurrent(2)
        .pool_name("duration")
        .max_duration_seconds(1)
        .check_interval_ms(100)
        .build()
        .unwrap();

    let id = orchestrator.start(inputs, Vec::new(), config).await.unwrap();
    while prober.started.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // No result arrives, so only the timer can notice the limit
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.status(id).await.unwrap().attempts, 0);
    gate.add_permits(100);

    let metrics = orchestrator.wait(id).await.unwrap();
    assert_eq!(metrics.state, BatchState::Stopped);
    assert_eq!(metrics.stop_reason, Some(StopReason::MaxDurationReached));
    assert_eq!(metrics.attempts, 2);
    assert_eq!(metrics.valid, 2);
    assert_eq!(prober.started.load(Ordering::SeqCst), 2);
    assert_eq!(store.results(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stop_before_admission_starts_nothing() {
    let prober = Arc::new(FakeProber::default());
    let orchestrator = orchestrator(
        Arc::new(MemoryResultStore::new()),
        FakeDialer::new(&["smtp.example.com"]),
        Arc::clone(&prober),
        Vec::new(),
    );
    let inputs = (0..5).map(|i| account(i, "good")).collect();

    let id = orchestrator
        .start(inputs, Vec::new(), BatchConfig::default())
        .await
        .unwrap();
    orchestrator.stop(id).unwrap();
    let metrics = orchestrator.wait(id).await.unwrap();

    assert_eq!(metrics.state, BatchState::Stopped);
    assert_eq!(metrics.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(metrics.attempts, 0);
    assert_eq!(prober.started.load(Ordering::SeqCst), 0);
}
