//! SQLite result storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::ResultStore;
use crate::batch::{BatchId, BatchMetrics};
use crate::check::{CheckResult, EndpointCandidate, TaskId};
use crate::{Error, Result};

/// Append-only `check_results` plus one `batch_metrics` row per batch.
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Opens (or creates) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS check_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                task_id INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                subject TEXT NOT NULL,
                status TEXT NOT NULL,
                candidate_host TEXT,
                candidate_port INTEGER,
                candidate_security TEXT,
                candidate_source TEXT,
                latency_ms INTEGER,
                error_kind TEXT,
                error_detail TEXT,
                candidates_tried INTEGER NOT NULL,
                completed_at TEXT NOT NULL,
                UNIQUE(batch_id, task_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_check_results_sequence
            ON check_results(batch_id, sequence)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS batch_metrics (
                batch_id TEXT PRIMARY KEY,
                protocol TEXT NOT NULL,
                state TEXT NOT NULL,
                stop_reason TEXT,
                total_inputs INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                successes INTEGER NOT NULL,
                failures INTEGER NOT NULL,
                valid INTEGER NOT NULL,
                invalid INTEGER NOT NULL,
                error INTEGER NOT NULL,
                dead INTEGER NOT NULL,
                min_latency_ms INTEGER,
                avg_latency_ms REAL,
                max_latency_ms INTEGER,
                latency_total_ms INTEGER NOT NULL,
                error_rate REAL NOT NULL,
                success_rate REAL NOT NULL,
                started_at TEXT,
                stopped_at TEXT,
                updated_at TEXT NOT NULL,
                duration_seconds REAL NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn select_results(
        &self,
        batch_id: BatchId,
        limit: Option<usize>,
    ) -> Result<Vec<CheckResult>> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    r"
                    SELECT * FROM (
                        SELECT * FROM check_results
                        WHERE batch_id = ?
                        ORDER BY sequence DESC
                        LIMIT ?
                    ) ORDER BY sequence ASC
                    ",
                )
                .bind(batch_id.to_string())
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"
                    SELECT * FROM check_results
                    WHERE batch_id = ?
                    ORDER BY sequence ASC
                    ",
                )
                .bind(batch_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(result_from_row).collect()
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn append(&self, result: &CheckResult) -> Result<()> {
        let candidate = result.matched_candidate.as_ref();
        sqlx::query(
            r"
            INSERT INTO check_results
                (batch_id, task_id, sequence, subject, status,
                 candidate_host, candidate_port, candidate_security, candidate_source,
                 latency_ms, error_kind, error_detail, candidates_tried, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(result.batch_id.to_string())
        .bind(to_i64(result.task_id.0))
        .bind(to_i64(result.sequence))
        .bind(&result.subject)
        .bind(result.status.as_str())
        .bind(candidate.map(|c| c.host.clone()))
        .bind(candidate.map(|c| c.port))
        .bind(candidate.map(|c| c.security.as_str()))
        .bind(candidate.map(|c| c.source.as_str()))
        .bind(result.latency_ms.map(to_i64))
        .bind(result.error_kind.map(|k| k.as_str()))
        .bind(&result.error_detail)
        .bind(result.candidates_tried)
        .bind(result.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_metrics(&self, metrics: &BatchMetrics) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO batch_metrics
                (batch_id, protocol, state, stop_reason, total_inputs, attempts,
                 successes, failures, valid, invalid, error, dead,
                 min_latency_ms, avg_latency_ms, max_latency_ms, latency_total_ms,
                 error_rate, success_rate, started_at, stopped_at, updated_at,
                 duration_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(batch_id) DO UPDATE SET
                state = excluded.state,
                stop_reason = excluded.stop_reason,
                attempts = excluded.attempts,
                successes = excluded.successes,
                failures = excluded.failures,
                valid = excluded.valid,
                invalid = excluded.invalid,
                error = excluded.error,
                dead = excluded.dead,
                min_latency_ms = excluded.min_latency_ms,
                avg_latency_ms = excluded.avg_latency_ms,
                max_latency_ms = excluded.max_latency_ms,
                latency_total_ms = excluded.latency_total_ms,
                error_rate = excluded.error_rate,
                success_rate = excluded.success_rate,
                started_at = excluded.started_at,
                stopped_at = excluded.stopped_at,
                updated_at = excluded.updated_at,
                duration_seconds = excluded.duration_seconds
            ",
        )
        .bind(metrics.batch_id.to_string())
        .bind(metrics.protocol.as_str())
        .bind(metrics.state.as_str())
        .bind(metrics.stop_reason.map(|r| r.as_str()))
        .bind(to_i64(metrics.total_inputs))
        .bind(to_i64(metrics.attempts))
        .bind(to_i64(metrics.successes))
        .bind(to_i64(metrics.failures))
        .bind(to_i64(metrics.valid))
        .bind(to_i64(metrics.invalid))
        .bind(to_i64(metrics.error))
        .bind(to_i64(metrics.dead))
        .bind(metrics.min_latency_ms.map(to_i64))
        .bind(metrics.avg_latency_ms)
        .bind(metrics.max_latency_ms.map(to_i64))
        .bind(to_i64(metrics.latency_total_ms))
        .bind(metrics.error_rate)
        .bind(metrics.success_rate)
        .bind(metrics.started_at.map(|t| t.to_rfc3339()))
        .bind(metrics.stopped_at.map(|t| t.to_rfc3339()))
        .bind(metrics.updated_at.to_rfc3339())
        .bind(metrics.duration_seconds)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn metrics(&self, batch_id: BatchId) -> Result<Option<BatchMetrics>> {
        let row = sqlx::query("SELECT * FROM batch_metrics WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(metrics_from_row).transpose()
    }

    async fn recent(&self, batch_id: BatchId, limit: usize) -> Result<Vec<CheckResult>> {
        self.select_results(batch_id, Some(limit)).await
    }

    async fn results(&self, batch_id: BatchId) -> Result<Vec<CheckResult>> {
        self.select_results(batch_id, None).await
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("bad timestamp {value:?}: {e}")))
}

fn result_from_row(row: &SqliteRow) -> Result<CheckResult> {
    let candidate = match (
        row.get::<Option<String>, _>("candidate_host"),
        row.get::<Option<u16>, _>("candidate_port"),
        row.get::<Option<String>, _>("candidate_security"),
        row.get::<Option<String>, _>("candidate_source"),
    ) {
        (Some(host), Some(port), Some(security), Some(source)) => Some(EndpointCandidate::new(
            host,
            port,
            security.parse()?,
            source.parse()?,
        )),
        _ => None,
    };

    Ok(CheckResult {
        batch_id: row.get::<String, _>("batch_id").parse()?,
        task_id: TaskId(to_u64(row.get("task_id"))),
        subject: row.get("subject"),
        status: row.get::<String, _>("status").parse()?,
        matched_candidate: candidate,
        latency_ms: row.get::<Option<i64>, _>("latency_ms").map(to_u64),
        error_kind: row
            .get::<Option<String>, _>("error_kind")
            .map(|k| k.parse())
            .transpose()?,
        error_detail: row.get("error_detail"),
        candidates_tried: row.get("candidates_tried"),
        sequence: to_u64(row.get("sequence")),
        completed_at: parse_time(&row.get::<String, _>("completed_at"))?,
    })
}

fn metrics_from_row(row: &SqliteRow) -> Result<BatchMetrics> {
    let optional_time = |column: &str| -> Result<Option<DateTime<Utc>>> {
        row.get::<Option<String>, _>(column)
            .map(|t| parse_time(&t))
            .transpose()
    };

    Ok(BatchMetrics {
        batch_id: row.get::<String, _>("batch_id").parse()?,
        protocol: row.get::<String, _>("protocol").parse()?,
        state: row.get::<String, _>("state").parse()?,
        total_inputs: to_u64(row.get("total_inputs")),
        attempts: to_u64(row.get("attempts")),
        successes: to_u64(row.get("successes")),
        failures: to_u64(row.get("failures")),
        valid: to_u64(row.get("valid")),
        invalid: to_u64(row.get("invalid")),
        error: to_u64(row.get("error")),
        dead: to_u64(row.get("dead")),
        min_latency_ms: row.get::<Option<i64>, _>("min_latency_ms").map(to_u64),
        avg_latency_ms: row.get("avg_latency_ms"),
        max_latency_ms: row.get::<Option<i64>, _>("max_latency_ms").map(to_u64),
        latency_total_ms: to_u64(row.get("latency_total_ms")),
        error_rate: row.get("error_rate"),
        success_rate: row.get("success_rate"),
        stop_reason: row
            .get::<Option<String>, _>("stop_reason")
            .map(|r| r.parse())
            .transpose()?,
        started_at: optional_time("started_at")?,
        stopped_at: optional_time("stopped_at")?,
        updated_at: parse_time(&row.get::<String, _>("updated_at"))?,
        duration_seconds: row.get("duration_seconds"),
    })
}
