//! Categorization job repository implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tally_core::defaults::job_backoff_minutes;
use tally_core::{
    CategorizationJob, CategorizationJobRepository, Error, JobStatus, MerchantKey, QueueStats,
    Result,
};

/// PostgreSQL implementation of CategorizationJobRepository.
pub struct PgCategorizationJobRepository {
    pool: Pool<Postgres>,
}

impl PgCategorizationJobRepository {
    /// Create a new PgCategorizationJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert JobStatus to string for database.
    fn job_status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Parse a job row into a CategorizationJob struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> CategorizationJob {
        CategorizationJob {
            id: row.get("id"),
            expense_id: row.get("expense_id"),
            merchant_key: MerchantKey(row.get("merchant_key")),
            description: row.get("description"),
            user_id: row.get("user_id"),
            status: Self::str_to_job_status(row.get("status")),
            attempts: row.get("attempts"),
            last_attempt: row.get("last_attempt"),
            next_retry: row.get("next_retry"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl CategorizationJobRepository for PgCategorizationJobRepository {
    async fn create(
        &self,
        expense_id: Uuid,
        merchant_key: &MerchantKey,
        description: &str,
        user_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();

        // Atomic insert-or-nothing on the expense_id unique constraint, so
        // concurrent enqueues of the same expense cannot race into
        // duplicate jobs.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO categorization_job
                 (id, expense_id, merchant_key, description, user_id, status, attempts, created_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6)
             ON CONFLICT (expense_id) DO NOTHING
             RETURNING id",
        )
        .bind(job_id)
        .bind(expense_id)
        .bind(merchant_key.as_str())
        .bind(description)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match inserted {
            Some(id) => Ok(id),
            None => {
                // Duplicate enqueue: hand back the existing job's id.
                let existing = sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM categorization_job WHERE expense_id = $1",
                )
                .bind(expense_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
                Ok(existing)
            }
        }
    }

    async fn poll_ready(&self, max_jobs: i64) -> Result<Vec<CategorizationJob>> {
        let now = Utc::now();

        // Pending jobs first, oldest-first, then due retries by how long
        // they've been waiting.
        let pending = sqlx::query(
            "SELECT id, expense_id, merchant_key, description, user_id, status,
                    attempts, last_attempt, next_retry, error_message, created_at
             FROM categorization_job
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT $1",
        )
        .bind(max_jobs)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut jobs: Vec<CategorizationJob> =
            pending.into_iter().map(Self::parse_job_row).collect();

        let remaining = max_jobs - jobs.len() as i64;
        if remaining > 0 {
            let retries = sqlx::query(
                "SELECT id, expense_id, merchant_key, description, user_id, status,
                        attempts, last_attempt, next_retry, error_message, created_at
                 FROM categorization_job
                 WHERE status = 'failed' AND next_retry IS NOT NULL AND next_retry <= $1
                 ORDER BY next_retry ASC
                 LIMIT $2",
            )
            .bind(now)
            .bind(remaining)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

            jobs.extend(retries.into_iter().map(Self::parse_job_row));
        }

        Ok(jobs)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE categorization_job
             SET status = 'processing', last_attempt = $2
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE categorization_job
             SET status = 'completed',
                 attempts = attempts + 1,
                 next_retry = NULL,
                 error_message = NULL
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let attempts = sqlx::query_scalar::<_, i32>(
            "SELECT attempts FROM categorization_job WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::JobNotFound(job_id))?;

        let new_attempts = attempts + 1;
        let next_retry = now + Duration::minutes(job_backoff_minutes(new_attempts));

        sqlx::query(
            "UPDATE categorization_job
             SET status = 'failed',
                 attempts = $2,
                 last_attempt = $3,
                 next_retry = $4,
                 error_message = $5
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(new_attempts)
        .bind(now)
        .bind(next_retry)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn cleanup_completed(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days);

        let result = sqlx::query(
            "DELETE FROM categorization_job
             WHERE status = 'completed' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let now = Utc::now();

        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                 COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                 COUNT(*) FILTER (WHERE status = 'failed'
                     AND next_retry IS NOT NULL AND next_retry <= $1) AS retryable,
                 COUNT(*) AS total
             FROM categorization_job",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            retryable: row.get("retryable"),
            total: row.get("total"),
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<CategorizationJob>> {
        let row = sqlx::query(
            "SELECT id, expense_id, merchant_key, description, user_id, status,
                    attempts, last_attempt, next_retry, error_message, created_at
             FROM categorization_job
             WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }
}
