//! Maintenance scheduler: periodic sweeps that keep the pipeline tidy.
//!
//! Two cadences: a daily pass that sweeps uncategorized expenses into the
//! pipeline and garbage-collects old completed jobs, and a weekly pass that
//! logs aggregate statistics. Sweep work prefers the free heuristic path and
//! enqueues the rest instead of calling the provider directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, instrument};

use tally_core::defaults::{
    JOB_RETENTION_DAYS, MAINTENANCE_DAILY_SECS, MAINTENANCE_WEEKLY_SECS, SCAN_BATCH_SIZE,
};
use tally_core::{
    classify_by_keywords, normalize_merchant, CategorizationJobRepository, Confidence, Error,
    ExpenseRepository, MappingRepository, QueueStats, Result,
};
use tally_db::Database;

/// Summary of one daily maintenance pass.
#[derive(Debug, Clone, Default)]
pub struct DailyPassSummary {
    /// Uncategorized expenses examined.
    pub scanned: u64,
    /// Expenses categorized on the spot by heuristics.
    pub heuristic_hits: u64,
    /// Expenses handed to the job queue.
    pub enqueued: u64,
    /// Completed jobs deleted by retention cleanup.
    pub jobs_deleted: u64,
}

/// Snapshot logged by the weekly statistics pass.
#[derive(Debug, Clone)]
pub struct WeeklySnapshot {
    /// Category -> count over all categorized expenses.
    pub distribution: Vec<(String, i64)>,
    /// Job queue counts by status.
    pub queue: QueueStats,
}

/// Handle for stopping a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Periodic maintenance runner.
pub struct MaintenanceScheduler {
    mappings: Arc<dyn MappingRepository>,
    jobs: Arc<dyn CategorizationJobRepository>,
    expenses: Arc<dyn ExpenseRepository>,
    daily_interval: Duration,
    weekly_interval: Duration,
}

impl MaintenanceScheduler {
    /// Create a new scheduler over the given repositories.
    pub fn new(
        mappings: Arc<dyn MappingRepository>,
        jobs: Arc<dyn CategorizationJobRepository>,
        expenses: Arc<dyn ExpenseRepository>,
    ) -> Self {
        Self {
            mappings,
            jobs,
            expenses,
            daily_interval: Duration::from_secs(MAINTENANCE_DAILY_SECS),
            weekly_interval: Duration::from_secs(MAINTENANCE_WEEKLY_SECS),
        }
    }

    /// Create a scheduler backed by the PostgreSQL repositories.
    pub fn from_database(db: &Database) -> Self {
        Self::new(
            Arc::new(tally_db::PgMappingRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgCategorizationJobRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgExpenseRepository::new(db.pool.clone())),
        )
    }

    /// Override the cadences (tests, accelerated environments).
    pub fn with_intervals(mut self, daily: Duration, weekly: Duration) -> Self {
        self.daily_interval = daily;
        self.weekly_interval = weekly;
        self
    }

    /// Run one daily pass: sweep uncategorized expenses, then garbage-collect
    /// completed jobs past retention.
    #[instrument(skip(self))]
    pub async fn run_daily_pass(&self) -> Result<DailyPassSummary> {
        let mut summary = DailyPassSummary::default();

        let expenses = self.expenses.list_uncategorized(SCAN_BATCH_SIZE).await?;
        for expense in expenses {
            summary.scanned += 1;
            let key = normalize_merchant(&expense.merchant_name);

            if let Some(category) = classify_by_keywords(&key, &expense.description) {
                self.mappings
                    .upsert_global(&key, category, Confidence::Ai, None)
                    .await?;
                self.expenses.set_category(expense.id, category).await?;
                summary.heuristic_hits += 1;
            } else {
                self.jobs
                    .create(expense.id, &key, &expense.description, expense.user_id)
                    .await?;
                summary.enqueued += 1;
            }
        }

        summary.jobs_deleted = self.jobs.cleanup_completed(JOB_RETENTION_DAYS).await?;

        info!(
            scanned = summary.scanned,
            heuristic_hits = summary.heuristic_hits,
            enqueued = summary.enqueued,
            jobs_deleted = summary.jobs_deleted,
            "Daily maintenance pass finished"
        );
        Ok(summary)
    }

    /// Run one weekly statistics pass and log the snapshot.
    #[instrument(skip(self))]
    pub async fn run_weekly_stats(&self) -> Result<WeeklySnapshot> {
        let distribution = self.expenses.category_distribution().await?;
        let queue = self.jobs.stats().await?;

        for (category, count) in &distribution {
            info!(category = %category, count, "Weekly category count");
        }
        info!(
            pending = queue.pending,
            processing = queue.processing,
            completed = queue.completed,
            failed = queue.failed,
            retryable = queue.retryable,
            "Weekly queue statistics"
        );
        Ok(WeeklySnapshot {
            distribution,
            queue,
        })
    }

    /// Start the scheduler and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut daily = interval(self.daily_interval);
            let mut weekly = interval(self.weekly_interval);
            // Both tickers fire immediately; skip the initial tick so startup
            // doesn't race a full sweep.
            daily.tick().await;
            weekly.tick().await;

            info!(
                daily_secs = self.daily_interval.as_secs(),
                weekly_secs = self.weekly_interval.as_secs(),
                "Maintenance scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Maintenance scheduler received shutdown signal");
                        break;
                    }
                    _ = daily.tick() => {
                        if let Err(e) = self.run_daily_pass().await {
                            error!(error = ?e, "Daily maintenance pass failed");
                        }
                    }
                    _ = weekly.tick() => {
                        if let Err(e) = self.run_weekly_stats().await {
                            error!(error = ?e, "Weekly statistics pass failed");
                        }
                    }
                }
            }
        });

        SchedulerHandle { shutdown_tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        InMemoryExpenseRepository, InMemoryJobRepository, InMemoryMappingRepository,
    };
    use tally_core::MerchantKey;

    fn scheduler() -> (
        InMemoryMappingRepository,
        InMemoryJobRepository,
        InMemoryExpenseRepository,
        MaintenanceScheduler,
    ) {
        let mappings = InMemoryMappingRepository::new();
        let jobs = InMemoryJobRepository::new();
        let expenses = InMemoryExpenseRepository::new();
        let sched = MaintenanceScheduler::new(
            Arc::new(mappings.clone()),
            Arc::new(jobs.clone()),
            Arc::new(expenses.clone()),
        );
        (mappings, jobs, expenses, sched)
    }

    #[tokio::test]
    async fn test_daily_pass_splits_heuristic_and_queue() {
        let (mappings, jobs, expenses, sched) = scheduler();

        let woolies = expenses.insert("WOOLWORTHS TOWN HALL", "WOOLWORTHS TOWN HALL", None);
        let unknown = expenses.insert("ZVQRT", "no keywords here", None);

        let summary = sched.run_daily_pass().await.unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.heuristic_hits, 1);
        assert_eq!(summary.enqueued, 1);

        assert_eq!(expenses.category_of(woolies).as_deref(), Some("Groceries"));
        assert!(expenses.category_of(unknown).is_none());
        assert!(mappings
            .get_global(&MerchantKey::from("WOOLWORTHS"))
            .await
            .unwrap()
            .is_some());

        let stats = jobs.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn test_daily_pass_is_idempotent_for_queued_expenses() {
        let (_, jobs, expenses, sched) = scheduler();
        expenses.insert("ZVQRT", "no keywords here", None);

        sched.run_daily_pass().await.unwrap();
        sched.run_daily_pass().await.unwrap();

        let stats = jobs.stats().await.unwrap();
        assert_eq!(stats.pending, 1, "re-scan must not duplicate jobs");
    }

    #[tokio::test]
    async fn test_weekly_stats_reports_distribution() {
        let (_, _, expenses, sched) = scheduler();
        let a = expenses.insert("WOOLWORTHS", "", None);
        let b = expenses.insert("COLES", "", None);
        let c = expenses.insert("UBER", "", None);
        for (id, category) in [(a, "Groceries"), (b, "Groceries"), (c, "Transport")] {
            expenses.set_category(id, category).await.unwrap();
        }

        let snapshot = sched.run_weekly_stats().await.unwrap();
        assert_eq!(
            snapshot.distribution,
            vec![
                ("Groceries".to_string(), 2),
                ("Transport".to_string(), 1),
            ]
        );
    }
}
