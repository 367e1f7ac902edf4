//! # PostgreSQL Batch Store
//!
//! [`BatchRepository`] and [`JobQueue`] on PostgreSQL. Claiming uses
//! `FOR UPDATE SKIP LOCKED` so any number of workers can poll the same queue;
//! counter updates are single `UPDATE ... RETURNING` statements and
//! finalization is a conditional update that only one caller can win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::batch_store::{BatchRepository, JobQueue};
use crate::config::DatabaseConfig;
use crate::error::{Result, RetentionError};
use crate::models::{
    AuditLogEntry, Batch, BatchOperation, BatchProgress, HistoricBatch, JobPayload, JobState,
    PropertyChange, QueuedJob,
};

const JOB_COLUMNS: &str = "job_id, batch_id, deployment_id, payload, retries, state, last_error, \
     created_at, lock_expires_at";

const BATCH_COLUMNS: &str = "batch_id, batch_type, total_seed_jobs, total_jobs, completed_jobs, \
     remaining_jobs, seed_completed, invocations_per_batch_job, chunk_size, operation, \
     created_at, start_time, finalized_at";

const PROGRESS_COLUMNS: &str = "batch_id, total_jobs, completed_jobs, remaining_jobs, \
     seed_completed, finalized_at IS NOT NULL AS finalized";

fn db_error(context: &str, err: sqlx::Error) -> RetentionError {
    error!(context = context, error = %err, "Batch store query failed");
    RetentionError::DatabaseError(format!("{context}: {err}"))
}

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    batch_id: Uuid,
    batch_type: String,
    total_seed_jobs: i32,
    total_jobs: i32,
    completed_jobs: i32,
    remaining_jobs: i32,
    seed_completed: bool,
    invocations_per_batch_job: i32,
    chunk_size: Option<i32>,
    operation: Json<BatchOperation>,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = RetentionError;

    fn try_from(row: BatchRow) -> Result<Self> {
        Ok(Batch {
            batch_id: row.batch_id,
            batch_type: row.batch_type.parse().map_err(RetentionError::StoreError)?,
            total_seed_jobs: row.total_seed_jobs as u32,
            total_jobs: row.total_jobs as u32,
            completed_jobs: row.completed_jobs as u32,
            remaining_jobs: row.remaining_jobs as u32,
            seed_completed: row.seed_completed,
            invocations_per_batch_job: row.invocations_per_batch_job as u32,
            chunk_size: row.chunk_size.map(|size| size as u32),
            operation: row.operation.0,
            created_at: row.created_at,
            start_time: row.start_time,
            finalized_at: row.finalized_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    batch_id: Uuid,
    deployment_id: Option<String>,
    payload: Json<JobPayload>,
    retries: i32,
    state: String,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    lock_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = RetentionError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(QueuedJob {
            job_id: row.job_id,
            batch_id: row.batch_id,
            deployment_id: row.deployment_id,
            payload: row.payload.0,
            retries: row.retries.max(0) as u32,
            state: row.state.parse().map_err(RetentionError::StoreError)?,
            last_error: row.last_error,
            created_at: row.created_at,
            lock_expires_at: row.lock_expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    batch_id: Uuid,
    total_jobs: i32,
    completed_jobs: i32,
    remaining_jobs: i32,
    seed_completed: bool,
    finalized: bool,
}

impl From<ProgressRow> for BatchProgress {
    fn from(row: ProgressRow) -> Self {
        BatchProgress {
            batch_id: row.batch_id,
            total_jobs: row.total_jobs as u32,
            completed_jobs: row.completed_jobs as u32,
            remaining_jobs: row.remaining_jobs.max(0) as u32,
            seed_completed: row.seed_completed,
            finalized: row.finalized,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoricBatchRow {
    batch_id: Uuid,
    batch_type: String,
    total_jobs: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    entry_id: Uuid,
    operation_type: String,
    category: String,
    entity_type: String,
    batch_id: Option<Uuid>,
    logged_at: DateTime<Utc>,
    properties: Json<Vec<PropertyChange>>,
}

#[derive(Debug, Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration. `DATABASE_URL` is used when no url is configured.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = match &config.url {
            Some(url) => url.clone(),
            None => std::env::var("DATABASE_URL").map_err(|_| {
                RetentionError::Configuration(crate::config::ConfigurationError::invalid_value(
                    "database.url",
                    "<unset>",
                    "set database.url or DATABASE_URL",
                ))
            })?,
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&url)
            .await
            .map_err(|e| db_error("connect", e))?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RetentionError::DatabaseError(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_job(tx: &mut Transaction<'_, Postgres>, job: &QueuedJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retention_jobs
                (job_id, batch_id, deployment_id, payload, retries, state, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', NULL, $6)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(job.job_id)
        .bind(job.batch_id)
        .bind(&job.deployment_id)
        .bind(Json(&job.payload))
        .bind(job.retries as i32)
        .bind(job.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("insert job", e))?;
        Ok(())
    }

    async fn fetch_progress(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
    ) -> Result<BatchProgress> {
        let query = format!("SELECT {PROGRESS_COLUMNS} FROM retention_batches WHERE batch_id = $1");
        let row = sqlx::query_as::<_, ProgressRow>(&query)
            .bind(batch_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("fetch progress", e))?;
        row.map(BatchProgress::from)
            .ok_or(RetentionError::BatchNotFound(batch_id))
    }
}

#[async_trait]
impl BatchRepository for PgBatchStore {
    #[instrument(skip(self, batch, seed_job), fields(batch_id = %batch.batch_id))]
    async fn create_batch(&self, batch: &Batch, seed_job: &QueuedJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO retention_batches
                (batch_id, batch_type, total_seed_jobs, total_jobs, completed_jobs, remaining_jobs,
                 seed_completed, invocations_per_batch_job, chunk_size, operation, created_at, start_time)
            VALUES ($1, $2, $3, 0, 0, 0, FALSE, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(batch.batch_id)
        .bind(batch.batch_type.as_str())
        .bind(batch.total_seed_jobs as i32)
        .bind(batch.invocations_per_batch_job as i32)
        .bind(batch.chunk_size.map(|size| size as i32))
        .bind(Json(&batch.operation))
        .bind(batch.created_at)
        .bind(batch.start_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert batch", e))?;

        Self::insert_job(&mut tx, seed_job).await?;
        tx.commit().await?;

        debug!("Batch and seed job inserted");
        Ok(())
    }

    #[instrument(skip(self, jobs), fields(job_count = jobs.len()))]
    async fn complete_seed(
        &self,
        batch_id: Uuid,
        seed_job_id: Uuid,
        jobs: &[QueuedJob],
    ) -> Result<BatchProgress> {
        let mut tx = self.pool.begin().await?;

        for job in jobs {
            Self::insert_job(&mut tx, job).await?;
        }

        sqlx::query("DELETE FROM retention_jobs WHERE job_id = $1")
            .bind(seed_job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete seed job", e))?;

        sqlx::query(
            r#"
            UPDATE retention_batches
            SET total_jobs = $2, remaining_jobs = $2, seed_completed = TRUE
            WHERE batch_id = $1 AND NOT seed_completed
            "#,
        )
        .bind(batch_id)
        .bind(jobs.len() as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("record seed result", e))?;

        let progress = Self::fetch_progress(&mut tx, batch_id).await?;
        tx.commit().await?;
        Ok(progress)
    }

    async fn find_batch(&self, batch_id: Uuid) -> Result<Option<Batch>> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM retention_batches WHERE batch_id = $1");
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find batch", e))?
            .map(Batch::try_from)
            .transpose()
    }

    async fn batch_progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>> {
        let query = format!("SELECT {PROGRESS_COLUMNS} FROM retention_batches WHERE batch_id = $1");
        Ok(sqlx::query_as::<_, ProgressRow>(&query)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("batch progress", e))?
            .map(BatchProgress::from))
    }

    #[instrument(skip(self))]
    async fn complete_execution_job(&self, job_id: Uuid) -> Result<Option<BatchProgress>> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(Uuid,)> =
            sqlx::query_as("DELETE FROM retention_jobs WHERE job_id = $1 RETURNING batch_id")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("delete execution job", e))?;

        let Some((batch_id,)) = deleted else {
            tx.rollback().await?;
            return Ok(None);
        };

        let query = format!(
            "UPDATE retention_batches \
             SET remaining_jobs = remaining_jobs - 1, completed_jobs = completed_jobs + 1 \
             WHERE batch_id = $1 RETURNING {PROGRESS_COLUMNS}"
        );
        let progress = sqlx::query_as::<_, ProgressRow>(&query)
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("decrement remaining jobs", e))?
            .map(BatchProgress::from)
            .ok_or(RetentionError::BatchNotFound(batch_id))?;

        tx.commit().await?;
        Ok(Some(progress))
    }

    #[instrument(skip(self, historic, audit_entry))]
    async fn try_finalize(
        &self,
        batch_id: Uuid,
        historic: &HistoricBatch,
        audit_entry: &AuditLogEntry,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let won: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE retention_batches SET finalized_at = $2
            WHERE batch_id = $1
              AND finalized_at IS NULL
              AND seed_completed
              AND remaining_jobs <= 0
            RETURNING batch_id
            "#,
        )
        .bind(batch_id)
        .bind(historic.end_time)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("claim finalization", e))?;

        if won.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO retention_historic_batches
                (batch_id, batch_type, total_jobs, start_time, end_time, removal_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(historic.batch_id)
        .bind(historic.batch_type.as_str())
        .bind(historic.total_jobs as i32)
        .bind(historic.start_time)
        .bind(historic.end_time)
        .bind(historic.removal_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert historic batch", e))?;

        insert_audit_entry(&mut tx, audit_entry).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn drained_batches(&self, limit: usize) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT batch_id FROM retention_batches
            WHERE finalized_at IS NULL AND seed_completed AND remaining_jobs <= 0
            ORDER BY created_at, batch_id
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list drained batches", e))?;
        Ok(rows.into_iter().map(|(batch_id,)| batch_id).collect())
    }

    async fn historic_batch(&self, batch_id: Uuid) -> Result<Option<HistoricBatch>> {
        let row = sqlx::query_as::<_, HistoricBatchRow>(
            r#"
            SELECT batch_id, batch_type, total_jobs, start_time, end_time, removal_time
            FROM retention_historic_batches WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find historic batch", e))?;

        row.map(|row| {
            Ok(HistoricBatch {
                batch_id: row.batch_id,
                batch_type: row.batch_type.parse().map_err(RetentionError::StoreError)?,
                total_jobs: row.total_jobs as u32,
                start_time: row.start_time,
                end_time: row.end_time,
                removal_time: row.removal_time,
            })
        })
        .transpose()
    }

    async fn record_audit_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_audit_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn audit_entries(&self) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT entry_id, operation_type, category, entity_type, batch_id, logged_at, properties
            FROM retention_audit_log ORDER BY logged_at, entry_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list audit entries", e))?;

        Ok(rows
            .into_iter()
            .map(|row| AuditLogEntry {
                entry_id: row.entry_id,
                operation_type: row.operation_type,
                category: row.category,
                entity_type: row.entity_type,
                batch_id: row.batch_id,
                timestamp: row.logged_at,
                properties: row.properties.0,
            })
            .collect())
    }
}

async fn insert_audit_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditLogEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO retention_audit_log
            (entry_id, operation_type, category, entity_type, batch_id, logged_at, properties)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.entry_id)
    .bind(&entry.operation_type)
    .bind(&entry.category)
    .bind(&entry.entity_type)
    .bind(entry.batch_id)
    .bind(entry.timestamp)
    .bind(Json(&entry.properties))
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("insert audit entry", e))?;
    Ok(())
}

#[async_trait]
impl JobQueue for PgBatchStore {
    async fn enqueue(&self, job: &QueuedJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_job(&mut tx, job).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lock_expires_at: DateTime<Utc>,
    ) -> Result<Option<QueuedJob>> {
        let query = format!(
            r#"
            UPDATE retention_jobs SET state = 'claimed', lock_expires_at = $2
            WHERE job_id = (
                SELECT job_id FROM retention_jobs
                WHERE state = 'pending'
                   OR (state = 'claimed' AND lock_expires_at <= $1)
                ORDER BY created_at, job_id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        sqlx::query_as::<_, JobRow>(&query)
            .bind(now)
            .bind(lock_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("claim job", e))?
            .map(QueuedJob::try_from)
            .transpose()
    }

    #[instrument(skip(self, successor), fields(successor_id = %successor.job_id))]
    async fn replace(&self, job_id: Uuid, successor: &QueuedJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM retention_jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete replaced job", e))?;
        Self::insert_job(&mut tx, successor).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn fail_attempt(&self, job_id: Uuid, error: &str) -> Result<JobState> {
        let state: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE retention_jobs
            SET retries = GREATEST(retries - 1, 0),
                last_error = $2,
                lock_expires_at = NULL,
                state = CASE WHEN retries <= 1 THEN 'failed' ELSE 'pending' END
            WHERE job_id = $1
            RETURNING state
            "#,
        )
        .bind(job_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("record failed attempt", e))?;

        let (state,) = state.ok_or(RetentionError::JobNotFound(job_id))?;
        state.parse().map_err(RetentionError::StoreError)
    }

    async fn jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<QueuedJob>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM retention_jobs WHERE batch_id = $1 ORDER BY created_at, job_id"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list batch jobs", e))?
            .into_iter()
            .map(QueuedJob::try_from)
            .collect()
    }

    async fn failed_jobs(&self) -> Result<Vec<QueuedJob>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM retention_jobs WHERE state = 'failed' ORDER BY created_at, job_id"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list failed jobs", e))?
            .into_iter()
            .map(QueuedJob::try_from)
            .collect()
    }
}
