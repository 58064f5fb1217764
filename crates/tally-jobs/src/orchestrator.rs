//! Categorization orchestrator: the synchronous resolution path.
//!
//! Resolution walks the sources cheapest-first: the user's personal mapping,
//! the crowd mapping, the keyword heuristics, and only then the AI provider,
//! gated by the shared rate limiter. Background work (the job queue) reuses
//! the same repositories but lives in [`crate::worker`].

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::categories::is_known_category;
use tally_core::defaults::{AI_MAX_RETRIES, DEFAULT_PROVIDER};
use tally_core::{
    classify_by_keywords, normalize_merchant, CategorizationJobRepository, Confidence, Error,
    ExpenseRepository, MappingRepository, QueueStats, RateLimitRepository, RateLimitStatus,
    Resolution, ResolutionSource, Result,
};
use tally_db::Database;
use tally_inference::MerchantClassifier;

/// Outcome of a bulk categorization run.
///
/// A bulk run stops calling the provider the moment the budget runs out;
/// everything not yet resolved is enqueued instead of dropped.
#[derive(Debug)]
pub struct BulkCategorizationOutcome {
    /// Expenses resolved and persisted, with their resolutions.
    pub resolved: Vec<(Uuid, Resolution)>,
    /// Expenses that failed for a non-rate-limit reason, with the error text.
    pub failed: Vec<(Uuid, String)>,
    /// Expenses pushed to the job queue after the budget ran out.
    pub deferred: Vec<Uuid>,
    /// Budget view at the end of the run.
    pub rate_limit: RateLimitStatus,
}

/// Resolves categories for expenses and records the results.
pub struct CategorizationOrchestrator {
    mappings: Arc<dyn MappingRepository>,
    jobs: Arc<dyn CategorizationJobRepository>,
    rate_limits: Arc<dyn RateLimitRepository>,
    expenses: Arc<dyn ExpenseRepository>,
    classifier: Arc<MerchantClassifier>,
    provider: String,
}

impl CategorizationOrchestrator {
    /// Create a new orchestrator over the given repositories.
    pub fn new(
        mappings: Arc<dyn MappingRepository>,
        jobs: Arc<dyn CategorizationJobRepository>,
        rate_limits: Arc<dyn RateLimitRepository>,
        expenses: Arc<dyn ExpenseRepository>,
        classifier: Arc<MerchantClassifier>,
    ) -> Self {
        Self {
            mappings,
            jobs,
            rate_limits,
            expenses,
            classifier,
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }

    /// Create an orchestrator backed by the PostgreSQL repositories.
    pub fn from_database(db: &Database, classifier: Arc<MerchantClassifier>) -> Self {
        Self::new(
            Arc::new(tally_db::PgMappingRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgCategorizationJobRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgRateLimitRepository::new(db.pool.clone())),
            Arc::new(tally_db::PgExpenseRepository::new(db.pool.clone())),
            classifier,
        )
    }

    /// Resolve a category for a merchant without touching any expense row.
    ///
    /// Source priority: personal mapping, crowd mapping, keyword heuristics,
    /// then the AI provider. A heuristic or AI hit is written back to the
    /// crowd mapping so the next lookup short-circuits. Returns
    /// [`Error::RateLimited`] when the provider budget is exhausted, with
    /// `retry_after` set to the window rollover.
    ///
    /// With `enable_retry` the provider call rides out transient 429s
    /// in-call; without it a single attempt is made and any non-rate-limit
    /// provider failure degrades to the fallback category instead of
    /// erroring. Degraded fallbacks are not written to the crowd mapping, so
    /// a later attempt can still classify the merchant properly.
    pub async fn resolve(
        &self,
        user_id: Option<Uuid>,
        merchant_name: &str,
        description: &str,
        enable_retry: bool,
    ) -> Result<Resolution> {
        let key = normalize_merchant(merchant_name);

        if let Some(uid) = user_id {
            if let Some(personal) = self.mappings.get_personal(uid, &key).await? {
                debug!(
                    merchant_key = %key,
                    category = %personal.category,
                    source = ResolutionSource::Personal.as_str(),
                    "Resolved from personal mapping"
                );
                return Ok(Resolution {
                    category: personal.category,
                    source: ResolutionSource::Personal,
                    attempts: None,
                });
            }
        }

        if let Some(global) = self.mappings.get_global(&key).await? {
            debug!(
                merchant_key = %key,
                category = %global.category,
                source = ResolutionSource::Global.as_str(),
                "Resolved from crowd mapping"
            );
            return Ok(Resolution {
                category: global.category,
                source: ResolutionSource::Global,
                attempts: None,
            });
        }

        if let Some(category) = classify_by_keywords(&key, description) {
            self.mappings
                .upsert_global(&key, category, Confidence::Ai, None)
                .await?;
            debug!(
                merchant_key = %key,
                category,
                source = ResolutionSource::Heuristic.as_str(),
                "Resolved from keyword heuristics"
            );
            return Ok(Resolution {
                category: category.to_string(),
                source: ResolutionSource::Heuristic,
                attempts: None,
            });
        }

        if !self.rate_limits.try_acquire(&self.provider).await? {
            let status = self.rate_limits.status(&self.provider).await?;
            warn!(
                merchant_key = %key,
                provider = %self.provider,
                resets_at = %status.resets_at,
                "Provider budget exhausted, deferring classification"
            );
            return Err(Error::RateLimited {
                retry_after: Some(status.resets_at),
            });
        }

        self.rate_limits.record_request(&self.provider).await?;
        let outcome = if enable_retry {
            self.classifier
                .classify_with_retry(&key, description, AI_MAX_RETRIES)
                .await?
        } else {
            self.classifier.classify(&key, description).await?
        };

        if outcome.final_attempt_succeeded {
            self.mappings
                .upsert_global(
                    &key,
                    &outcome.category,
                    Confidence::Ai,
                    outcome.raw_response.as_deref().map(str::trim),
                )
                .await?;
        }

        let source = if outcome.retried() {
            ResolutionSource::AiRetry
        } else {
            ResolutionSource::Ai
        };
        info!(
            merchant_key = %key,
            category = %outcome.category,
            source = source.as_str(),
            attempts = outcome.attempts,
            "Resolved from AI provider"
        );
        Ok(Resolution {
            category: outcome.category,
            source,
            attempts: Some(outcome.attempts),
        })
    }

    /// Resolve and persist a category for one expense.
    pub async fn categorize_expense(&self, expense_id: Uuid) -> Result<Resolution> {
        let expense = self
            .expenses
            .get(expense_id)
            .await?
            .ok_or(Error::ExpenseNotFound(expense_id))?;

        let resolution = self
            .resolve(
                expense.user_id,
                &expense.merchant_name,
                &expense.description,
                false,
            )
            .await?;
        self.expenses
            .set_category(expense_id, &resolution.category)
            .await?;
        Ok(resolution)
    }

    /// Enqueue background categorization for an expense.
    ///
    /// Idempotent: enqueueing the same expense twice returns the same job id.
    pub async fn enqueue_expense(&self, expense_id: Uuid) -> Result<Uuid> {
        let expense = self
            .expenses
            .get(expense_id)
            .await?
            .ok_or(Error::ExpenseNotFound(expense_id))?;

        let key = normalize_merchant(&expense.merchant_name);
        self.jobs
            .create(expense_id, &key, &expense.description, expense.user_id)
            .await
    }

    /// Apply an explicit user correction to an expense.
    ///
    /// Writes the expense row and registers a crowd vote. With
    /// `apply_to_all_from_merchant` (and an owning user on the expense) it
    /// also records a personal override, pinning the merchant to this
    /// category for that user regardless of later votes; without it the
    /// correction stays scoped to the one expense.
    pub async fn apply_user_override(
        &self,
        expense_id: Uuid,
        category: &str,
        apply_to_all_from_merchant: bool,
    ) -> Result<()> {
        if !is_known_category(category) {
            return Err(Error::InvalidInput(format!(
                "Unknown category: {category}"
            )));
        }

        let expense = self
            .expenses
            .get(expense_id)
            .await?
            .ok_or(Error::ExpenseNotFound(expense_id))?;
        let key = normalize_merchant(&expense.merchant_name);

        self.expenses.set_category(expense_id, category).await?;
        let mapping = self.mappings.vote(&key, category).await?;

        if apply_to_all_from_merchant {
            if let Some(uid) = expense.user_id {
                self.mappings.upsert_personal(uid, &key, category).await?;
            }
        }

        info!(
            expense_id = %expense_id,
            merchant_key = %key,
            category,
            vote_count = mapping.vote_count,
            "Applied user override"
        );
        Ok(())
    }

    /// Categorize a batch of expenses, stopping provider calls when the
    /// budget runs out and deferring the rest to the job queue.
    pub async fn bulk_categorize(&self, expense_ids: &[Uuid]) -> Result<BulkCategorizationOutcome> {
        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        let mut deferred = Vec::new();

        let mut iter = expense_ids.iter();
        for &expense_id in iter.by_ref() {
            match self.categorize_expense(expense_id).await {
                Ok(resolution) => resolved.push((expense_id, resolution)),
                Err(Error::RateLimited { .. }) => {
                    // Budget gone for this window; everything left goes to
                    // the queue, starting with the expense that hit the wall.
                    match self.enqueue_expense(expense_id).await {
                        Ok(_) => deferred.push(expense_id),
                        Err(e) => failed.push((expense_id, e.to_string())),
                    }
                    break;
                }
                Err(e) => failed.push((expense_id, e.to_string())),
            }
        }
        for &expense_id in iter {
            match self.enqueue_expense(expense_id).await {
                Ok(_) => deferred.push(expense_id),
                Err(e) => failed.push((expense_id, e.to_string())),
            }
        }

        let rate_limit = self.rate_limits.status(&self.provider).await?;
        info!(
            resolved = resolved.len(),
            failed = failed.len(),
            deferred = deferred.len(),
            remaining_budget = rate_limit.remaining,
            "Bulk categorization finished"
        );
        Ok(BulkCategorizationOutcome {
            resolved,
            failed,
            deferred,
            rate_limit,
        })
    }

    /// Rebuild crowd mappings from categorized history.
    pub async fn rebuild_consensus(
        &self,
        records: &[tally_core::CategorizedRecord],
    ) -> Result<u64> {
        self.mappings.rebuild_from_history(records).await
    }

    /// Current provider budget view.
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus> {
        self.rate_limits.status(&self.provider).await
    }

    /// Current job queue statistics.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.jobs.stats().await
    }
}
