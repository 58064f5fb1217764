//! Background worker draining the categorization job queue.
//!
//! The worker is deliberately slow: one job per tick, with a pause after
//! every provider call, so that steady-state processing can never exhaust
//! the provider's per-minute budget on its own. Heuristic hits cost nothing
//! and skip the pause entirely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tally_core::defaults::{
    AI_WORKER_MAX_RETRIES, DEFAULT_PROVIDER, DRAIN_CHUNK_SIZE, DRAIN_PAUSE_SECS,
    EVENT_BUS_CAPACITY, WORKER_BATCH_SIZE, WORKER_POST_CALL_DELAY_SECS, WORKER_TICK_SECS,
};
use tally_core::{
    classify_by_keywords, CategorizationJob, CategorizationJobRepository, Confidence, Error,
    ExpenseRepository, MappingRepository, RateLimitRepository, ResolutionSource, Result,
};
use tally_db::Database;
use tally_inference::MerchantClassifier;

/// Configuration for the categorization worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Interval between queue polls, in seconds.
    pub tick_secs: u64,
    /// Jobs pulled per tick.
    pub batch_size: i64,
    /// Pause after each provider call, in seconds.
    pub post_call_delay_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_secs: WORKER_TICK_SECS,
            batch_size: WORKER_BATCH_SIZE,
            post_call_delay_secs: WORKER_POST_CALL_DELAY_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CATEGORIZATION_WORKER_ENABLED` | `true` | Enable/disable processing |
    /// | `CATEGORIZATION_TICK_SECS` | `5` | Seconds between queue polls |
    /// | `CATEGORIZATION_BATCH_SIZE` | `1` | Jobs pulled per tick |
    /// | `CATEGORIZATION_POST_CALL_DELAY_SECS` | `4` | Pause after a provider call |
    pub fn from_env() -> Self {
        let enabled = std::env::var("CATEGORIZATION_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let tick_secs = std::env::var("CATEGORIZATION_TICK_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_TICK_SECS);

        let batch_size = std::env::var("CATEGORIZATION_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(WORKER_BATCH_SIZE)
            .max(1);

        let post_call_delay_secs = std::env::var("CATEGORIZATION_POST_CALL_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_POST_CALL_DELAY_SECS);

        Self {
            tick_secs,
            batch_size,
            post_call_delay_secs,
            enabled,
        }
    }

    /// Set the tick interval.
    pub fn with_tick_secs(mut self, secs: u64) -> Self {
        self.tick_secs = secs;
        self
    }

    /// Set the per-tick batch size.
    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the post-provider-call pause.
    pub fn with_post_call_delay_secs(mut self, secs: u64) -> Self {
        self.post_call_delay_secs = secs;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the categorization worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
    /// A job was started.
    JobStarted { job_id: Uuid },
    /// A job completed with a category.
    JobCompleted {
        job_id: Uuid,
        category: String,
        source: ResolutionSource,
    },
    /// A job failed and was rescheduled.
    JobFailed { job_id: Uuid, error: String },
    /// A job was rescheduled without a provider call because the budget
    /// was already exhausted.
    JobDeferred { job_id: Uuid },
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// How a single job was disposed of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// Completed with a category from the given source.
    Completed {
        category: String,
        source: ResolutionSource,
    },
    /// Failed and rescheduled per the backoff table.
    Failed { error: String },
    /// Rescheduled without calling the provider: the budget was exhausted.
    Deferred,
}

/// Background worker that processes categorization jobs.
pub struct CategorizationWorker {
    mappings: Arc<dyn MappingRepository>,
    jobs: Arc<dyn CategorizationJobRepository>,
    rate_limits: Arc<dyn RateLimitRepository>,
    expenses: Arc<dyn ExpenseRepository>,
    classifier: Arc<MerchantClassifier>,
    config: WorkerConfig,
    provider: String,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl CategorizationWorker {
    /// Create a new worker over the given repositories.
    pub fn new(
        mappings: Arc<dyn MappingRepository>,
        jobs: Arc<dyn CategorizationJobRepository>,
        rate_limits: Arc<dyn RateLimitRepository>,
        expenses: Arc<dyn ExpenseRepository>,
        classifier: Arc<MerchantClassifier>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            mappings,
            jobs,
            rate_limits,
            expenses,
            classifier,
            config,
            provider: DEFAULT_PROVIDER.to_string(),
            event_tx,
        }
    }

    /// Create a worker backed by the PostgreSQL repositories.
    pub fn from_database(
        db: &Database,
        classifier: Arc<MerchantClassifier>,
        config: WorkerConfig,
    ) -> Self {
        Self::new(
            Arc::new(tally_db::PgMappingRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgCategorizationJobRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgRateLimitRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgExpenseRepository::new(db.pool.clone())),
            classifier,
            config,
        )
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Categorization worker is disabled, not starting");
            return;
        }

        info!(
            tick_secs = self.config.tick_secs,
            batch_size = self.config.batch_size,
            "Categorization worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let tick = Duration::from_secs(self.config.tick_secs);
        loop {
            match self.jobs.poll_ready(self.config.batch_size).await {
                Ok(jobs) => {
                    for job in jobs {
                        self.run_job(job).await;
                    }
                }
                Err(e) => error!(error = ?e, "Failed to poll job queue"),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Categorization worker received shutdown signal");
                    break;
                }
                _ = sleep(tick) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Categorization worker stopped");
    }

    /// Process one job end to end, including state transitions and events.
    async fn run_job(&self, job: CategorizationJob) {
        let start = Instant::now();
        let job_id = job.id;

        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });
        if let Err(e) = self.jobs.mark_processing(job_id).await {
            error!(error = ?e, job_id = %job_id, "Failed to mark job processing");
            return;
        }

        match self.process_job(&job).await {
            Ok(JobDisposition::Completed { category, source }) => {
                info!(
                    job_id = %job_id,
                    merchant_key = %job.merchant_key,
                    category = %category,
                    source = source.as_str(),
                    attempts = job.attempts + 1,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                    job_id,
                    category,
                    source,
                });
            }
            Ok(JobDisposition::Failed { error }) => {
                warn!(
                    job_id = %job_id,
                    merchant_key = %job.merchant_key,
                    error = %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job failed, rescheduled"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed { job_id, error });
            }
            Ok(JobDisposition::Deferred) => {
                debug!(
                    job_id = %job_id,
                    merchant_key = %job.merchant_key,
                    "Provider budget exhausted, job deferred"
                );
                let _ = self.event_tx.send(WorkerEvent::JobDeferred { job_id });
            }
            Err(e) => {
                // Persistence failed; the job stays in processing until a
                // later poll or operator intervention.
                error!(error = ?e, job_id = %job_id, "Failed to record job outcome");
            }
        }
    }

    /// Classify one job and persist the outcome.
    ///
    /// Heuristics run first and cost nothing. The provider is only called
    /// when the budget allows; an exhausted budget reschedules the job
    /// through the normal failure path without consuming an attempt at the
    /// provider.
    pub async fn process_job(&self, job: &CategorizationJob) -> Result<JobDisposition> {
        if let Some(category) = classify_by_keywords(&job.merchant_key, &job.description) {
            self.mappings
                .upsert_global(&job.merchant_key, category, Confidence::Ai, None)
                .await?;
            self.finish_job(job, category).await?;
            return Ok(JobDisposition::Completed {
                category: category.to_string(),
                source: ResolutionSource::Heuristic,
            });
        }

        if !self.rate_limits.try_acquire(&self.provider).await? {
            self.jobs
                .mark_failed(job.id, "provider rate limit exhausted")
                .await?;
            return Ok(JobDisposition::Deferred);
        }

        self.rate_limits.record_request(&self.provider).await?;
        let result = self
            .classifier
            .classify_with_retry(&job.merchant_key, &job.description, AI_WORKER_MAX_RETRIES)
            .await;

        // Flat pause after every provider call keeps steady-state throughput
        // under the per-window budget.
        sleep(Duration::from_secs(self.config.post_call_delay_secs)).await;

        match result {
            Ok(outcome) => {
                self.mappings
                    .upsert_global(
                        &job.merchant_key,
                        &outcome.category,
                        Confidence::Ai,
                        outcome.raw_response.as_deref().map(str::trim),
                    )
                    .await?;
                self.finish_job(job, &outcome.category).await?;
                let source = if outcome.retried() {
                    ResolutionSource::AiRetry
                } else {
                    ResolutionSource::Ai
                };
                Ok(JobDisposition::Completed {
                    category: outcome.category,
                    source,
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.jobs.mark_failed(job.id, &error).await?;
                Ok(JobDisposition::Failed { error })
            }
        }
    }

    async fn finish_job(&self, job: &CategorizationJob, category: &str) -> Result<()> {
        self.expenses.set_category(job.expense_id, category).await?;
        self.jobs.mark_completed(job.id).await
    }

    /// Drain the backlog in rate-limit-sized chunks.
    ///
    /// Processes up to [`DRAIN_CHUNK_SIZE`] ready jobs, pauses one full
    /// window, and repeats until a poll comes back short. Returns the number
    /// of jobs processed.
    pub async fn drain_backlog(&self) -> Result<u64> {
        let mut processed = 0u64;

        loop {
            let jobs = self.jobs.poll_ready(DRAIN_CHUNK_SIZE).await?;
            let full_chunk = jobs.len() as i64 == DRAIN_CHUNK_SIZE;

            for job in jobs {
                self.run_job(job).await;
                processed += 1;
            }

            if !full_chunk {
                break;
            }
            info!(
                processed,
                pause_secs = DRAIN_PAUSE_SECS,
                "Drain chunk complete, pausing for budget reset"
            );
            sleep(Duration::from_secs(DRAIN_PAUSE_SECS)).await;
        }

        info!(processed, "Backlog drain finished");
        Ok(processed)
    }
}
