//! Batch lifecycle and the start/stop/status control surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::BatchConfig;
use super::model::{BatchId, BatchMetrics, BatchState, StopReason};
use super::stop::StopCondition;
use super::task::TaskContext;
use crate::check::{CheckResult, Protocol, ProxyEndpoint, Subject, TaskId};
use crate::dialer::{Dialer, ProxyRotation, TcpDialer};
use crate::pool::{PoolRegistry, PoolToken, WorkerPool};
use crate::prober::{self, Prober};
use crate::resolver::{DnsMxLookup, EndpointResolver, MxLookup};
use crate::sink::{ResultSink, ResultStore};
use crate::{Error, Result};

/// Metrics are written to the store after this many appended results.
const METRICS_FLUSH_EVERY: u64 = 50;

/// One running or finished batch.
struct BatchRun {
    id: BatchId,
    config: BatchConfig,
    condition: StopCondition,
    sink: Arc<ResultSink>,
    token: PoolToken,
    started: Instant,
    tripped: Mutex<Option<StopReason>>,
    store_failed: AtomicBool,
    done: watch::Sender<bool>,
}

impl BatchRun {
    /// Records why the batch halts and stops admission. The first reason wins.
    fn trip(&self, reason: StopReason) {
        {
            let mut tripped = self.tripped.lock();
            if tripped.is_some() {
                return;
            }
            *tripped = Some(reason);
        }
        tracing::info!(batch_id = %self.id, %reason, "stopping batch");
        self.token.cancel();
    }

    fn evaluate(&self, metrics: &BatchMetrics) {
        let reason = match self.condition.should_stop(metrics, self.started.elapsed()) {
            // Hitting the cap on the last input is plain completion
            Some(StopReason::MaxAttemptsReached) if metrics.remaining() == 0 => None,
            other => other,
        };
        if let Some(reason) = reason {
            self.trip(reason);
        }
    }

    fn terminal(&self, submitted: usize, total: usize) -> (BatchState, Option<StopReason>) {
        if self.store_failed.load(Ordering::Acquire) {
            return (BatchState::Failed, Some(StopReason::ResultSinkUnavailable));
        }
        if let Some(reason) = *self.tripped.lock() {
            return (BatchState::Stopped, Some(reason));
        }
        if submitted < total {
            return (BatchState::Stopped, Some(StopReason::MaxAttemptsReached));
        }
        (BatchState::Completed, None)
    }
}

/// Top-level coordinator.
///
/// Owns every batch it started. Pools come from an injected
/// [`PoolRegistry`], so several orchestrators can share capacity.
pub struct BatchOrchestrator {
    registry: Arc<PoolRegistry>,
    store: Arc<dyn ResultStore>,
    dialer: Arc<dyn Dialer>,
    mx: Arc<dyn MxLookup>,
    prober: Option<Arc<dyn Prober>>,
    batches: Mutex<HashMap<BatchId, Arc<BatchRun>>>,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("registry", &self.registry)
            .field("batches", &self.batches.lock().len())
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    /// Creates an orchestrator dialing over TCP and resolving MX records
    /// through the system resolver.
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            registry,
            store,
            dialer: Arc::new(TcpDialer::new()),
            mx: Arc::new(DnsMxLookup::from_system_conf()),
            prober: None,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the dialer.
    #[must_use]
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replaces the MX source.
    #[must_use]
    pub fn with_mx_lookup(mut self, mx: Arc<dyn MxLookup>) -> Self {
        self.mx = mx;
        self
    }

    /// Uses `prober` for every batch instead of picking one per protocol.
    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// The pool registry batches run in.
    #[must_use]
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Starts a batch and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or an input
    /// does not match the batch protocol, and a store error if the initial
    /// metrics cannot be written.
    pub async fn start(
        &self,
        inputs: Vec<Subject>,
        proxies: Vec<ProxyEndpoint>,
        config: BatchConfig,
    ) -> Result<BatchId> {
        config.validate()?;
        check_inputs(config.protocol, &inputs)?;

        let resolver = EndpointResolver::new(Arc::clone(&self.mx))
            .with_socks_targets(&config.parsed_socks_targets()?);
        let prober = self.prober.clone().unwrap_or_else(|| {
            prober::for_protocol(config.protocol, &config.ehlo_name)
        });
        let pool = self.registry.pool(&config.pool_name, config.max_concurrent);

        let id = BatchId::new();
        let sink = Arc::new(ResultSink::new(id, config.protocol, inputs.len() as u64));
        let metrics = sink.start();
        self.store.save_metrics(&metrics).await?;

        let (done, _) = watch::channel(false);
        let run = Arc::new(BatchRun {
            id,
            condition: config.stop_condition(),
            sink,
            token: PoolToken::new(),
            started: Instant::now(),
            tripped: Mutex::new(None),
            store_failed: AtomicBool::new(false),
            done,
            config,
        });
        let context = Arc::new(TaskContext {
            batch_id: id,
            resolver,
            dialer: Arc::clone(&self.dialer),
            prober,
            proxies: Arc::new(ProxyRotation::new(proxies)),
            timeout: run.config.timeout(),
        });

        self.batches.lock().insert(id, Arc::clone(&run));
        tracing::info!(
            batch_id = %id,
            protocol = %run.config.protocol,
            inputs = inputs.len(),
            pool = pool.name(),
            "batch started"
        );

        tokio::spawn(drive(run, pool, context, Arc::clone(&self.store), inputs));
        Ok(id)
    }

    /// Stops a batch: no new tasks start, in-flight tasks are recorded.
    ///
    /// Admission is decided at pool acquisition: a task is in flight once
    /// its slot was granted under an uncancelled token and the driver saw the
    /// token still live right after. Stopping a finished batch does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchNotFound`] for an unknown id.
    pub fn stop(&self, batch_id: BatchId) -> Result<()> {
        let run = self.run(batch_id)?;
        if !run.sink.snapshot().state.is_terminal() {
            run.trip(StopReason::Cancelled);
        }
        Ok(())
    }

    /// Current metrics of a batch, falling back to the store for batches
    /// started by another process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchNotFound`] if the batch is unknown.
    pub async fn status(&self, batch_id: BatchId) -> Result<BatchMetrics> {
        if let Ok(run) = self.run(batch_id) {
            return Ok(run.sink.snapshot());
        }
        self.store
            .metrics(batch_id)
            .await?
            .ok_or(Error::BatchNotFound(batch_id))
    }

    /// Waits until the batch reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchNotFound`] for an unknown id.
    pub async fn wait(&self, batch_id: BatchId) -> Result<BatchMetrics> {
        let run = self.run(batch_id)?;
        let mut done = run.done.subscribe();
        done.wait_for(|finished| *finished)
            .await
            .map_err(|_| Error::BatchNotFound(batch_id))?;
        Ok(run.sink.snapshot())
    }

    /// Live stream of results recorded after this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchNotFound`] for an unknown id.
    pub fn subscribe(&self, batch_id: BatchId) -> Result<broadcast::Receiver<CheckResult>> {
        Ok(self.run(batch_id)?.sink.subscribe())
    }

    /// Up to `limit` most recent results, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchNotFound`] if the batch is unknown, or a store
    /// error.
    pub async fn recent(&self, batch_id: BatchId, limit: usize) -> Result<Vec<CheckResult>> {
        if let Ok(run) = self.run(batch_id) {
            return Ok(run.sink.recent(limit));
        }
        if self.store.metrics(batch_id).await?.is_none() {
            return Err(Error::BatchNotFound(batch_id));
        }
        self.store.recent(batch_id, limit).await
    }

    /// Metrics of every batch this orchestrator started, oldest first.
    #[must_use]
    pub fn batches(&self) -> Vec<BatchMetrics> {
        let mut all: Vec<_> = self
            .batches
            .lock()
            .values()
            .map(|run| run.sink.snapshot())
            .collect();
        all.sort_by_key(|m| m.started_at);
        all
    }

    fn run(&self, batch_id: BatchId) -> Result<Arc<BatchRun>> {
        self.batches
            .lock()
            .get(&batch_id)
            .cloned()
            .ok_or(Error::BatchNotFound(batch_id))
    }
}

fn check_inputs(protocol: Protocol, inputs: &[Subject]) -> Result<()> {
    for (index, subject) in inputs.iter().enumerate() {
        let matches = match (protocol, subject) {
            (Protocol::Socks, Subject::Proxy(_)) => true,
            (protocol, Subject::Account(credential)) => credential.kind == protocol,
            _ => false,
        };
        if !matches {
            return Err(Error::Config(format!(
                "input {index} ({}) cannot run in a {protocol} batch",
                subject.label()
            )));
        }
    }
    Ok(())
}

/// Submits tasks, then settles the batch once the last one is recorded.
async fn drive(
    run: Arc<BatchRun>,
    pool: Arc<WorkerPool>,
    context: Arc<TaskContext>,
    store: Arc<dyn ResultStore>,
    inputs: Vec<Subject>,
) {
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_results(
        Arc::clone(&run),
        Arc::clone(&store),
        results_rx,
    ));
    let ticker = tokio::spawn(tick(Arc::clone(&run)));

    let total = inputs.len();
    let cap = run
        .condition
        .max_attempts
        .map_or(total, |max| usize::try_from(max).unwrap_or(usize::MAX).min(total));

    let mut tasks = JoinSet::new();
    let mut submitted = 0usize;
    for (index, subject) in inputs.into_iter().take(cap).enumerate() {
        let Ok(permit) = pool.acquire(&run.token).await else {
            break;
        };
        // A stop may land between the grant and the spawn
        if run.token.is_cancelled() {
            drop(permit);
            break;
        }
        submitted += 1;

        let run = Arc::clone(&run);
        let context = Arc::clone(&context);
        let results_tx = results_tx.clone();
        tasks.spawn(async move {
            let result = context.run(TaskId(index as u64), &subject).await;
            let (result, metrics) = run.sink.record(result);
            if metrics.attempts % run.config.evaluate_every == 0 {
                run.evaluate(&metrics);
            }
            // The writer outlives every task
            let _ = results_tx.send(result);
            drop(permit);
        });
    }
    drop(results_tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(batch_id = %run.id, ?e, "check task aborted");
        }
    }
    ticker.abort();
    if let Err(e) = writer.await {
        tracing::error!(batch_id = %run.id, ?e, "result writer aborted");
    }

    let (state, reason) = run.terminal(submitted, total);
    let metrics = run.sink.finish(state, reason);
    run.token.cancel();
    if let Err(e) = store.save_metrics(&metrics).await {
        tracing::warn!(batch_id = %run.id, ?e, "failed to persist final metrics");
    }

    tracing::info!(
        batch_id = %run.id,
        state = %metrics.state,
        reason = ?metrics.stop_reason,
        attempts = metrics.attempts,
        valid = metrics.valid,
        invalid = metrics.invalid,
        error = metrics.error,
        dead = metrics.dead,
        "batch finished"
    );
    run.done.send_replace(true);
}

/// Appends results in completion order.
async fn write_results(
    run: Arc<BatchRun>,
    store: Arc<dyn ResultStore>,
    mut results: mpsc::UnboundedReceiver<CheckResult>,
) {
    let mut since_flush = 0u64;
    while let Some(result) = results.recv().await {
        if run.store_failed.load(Ordering::Acquire) {
            continue;
        }
        if let Err(e) = store.append(&result).await {
            tracing::warn!(batch_id = %run.id, ?e, "result store unavailable");
            run.store_failed.store(true, Ordering::Release);
            run.trip(StopReason::ResultSinkUnavailable);
            continue;
        }

        since_flush += 1;
        if since_flush >= METRICS_FLUSH_EVERY {
            since_flush = 0;
            if let Err(e) = store.save_metrics(&run.sink.snapshot()).await {
                tracing::warn!(batch_id = %run.id, ?e, "failed to persist metrics");
            }
        }
    }
}

/// Re-evaluates stop rules on a timer so time limits fire between results.
async fn tick(run: Arc<BatchRun>) {
    if run.condition.is_disabled() {
        return;
    }
    let mut interval = tokio::time::interval(run.config.check_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = run.token.cancelled() => break,
            _ = interval.tick() => run.evaluate(&run.sink.snapshot()),
        }
    }
}
