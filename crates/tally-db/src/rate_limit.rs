//! Rate limit repository implementation: a fixed request window per provider.
//!
//! The window state lives in one row per provider so that every process
//! sharing the database shares the budget. Rollover happens lazily inside
//! each statement's CASE arms; there is no background reset task.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres, Row};

use tally_core::defaults::{RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW_SECS};
use tally_core::{Error, RateLimitRepository, RateLimitStatus, Result};

/// PostgreSQL implementation of RateLimitRepository.
pub struct PgRateLimitRepository {
    pool: Pool<Postgres>,
    window_secs: i64,
    max_requests: i32,
}

impl PgRateLimitRepository {
    /// Create a new PgRateLimitRepository with the default window and budget.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            window_secs: RATE_LIMIT_WINDOW_SECS,
            max_requests: RATE_LIMIT_MAX_REQUESTS,
        }
    }

    /// Override the window length and request budget (tests, alternate tiers).
    pub fn with_limits(pool: Pool<Postgres>, window_secs: i64, max_requests: i32) -> Self {
        Self {
            pool,
            window_secs,
            max_requests,
        }
    }

    /// Upsert the provider row, rolling the window over if it has elapsed,
    /// and return the request count for the current window.
    ///
    /// `increment` is 0 for a read-only probe and 1 to consume budget.
    async fn roll_window(&self, provider: &str, increment: i32) -> Result<(i32, chrono::DateTime<chrono::Utc>)> {
        let now = Utc::now();
        let window_start_cutoff = now - Duration::seconds(self.window_secs);

        let row = sqlx::query(
            "INSERT INTO rate_limit_state
                 (provider, request_count, window_start, last_reset, last_request)
             VALUES ($1, $2, $3, $3, CASE WHEN $2 > 0 THEN $3 END)
             ON CONFLICT (provider) DO UPDATE SET
                 request_count = CASE
                     WHEN rate_limit_state.window_start <= $4 THEN $2
                     ELSE rate_limit_state.request_count + $2
                 END,
                 window_start = CASE
                     WHEN rate_limit_state.window_start <= $4 THEN $3
                     ELSE rate_limit_state.window_start
                 END,
                 last_reset = CASE
                     WHEN rate_limit_state.window_start <= $4 THEN $3
                     ELSE rate_limit_state.last_reset
                 END,
                 last_request = CASE
                     WHEN $2 > 0 THEN $3
                     ELSE rate_limit_state.last_request
                 END
             RETURNING request_count, window_start",
        )
        .bind(provider)
        .bind(increment)
        .bind(now)
        .bind(window_start_cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((row.get("request_count"), row.get("window_start")))
    }
}

#[async_trait]
impl RateLimitRepository for PgRateLimitRepository {
    async fn try_acquire(&self, provider: &str) -> Result<bool> {
        let (count, _) = self.roll_window(provider, 0).await?;
        Ok(count < self.max_requests)
    }

    async fn record_request(&self, provider: &str) -> Result<()> {
        self.roll_window(provider, 1).await?;
        Ok(())
    }

    async fn status(&self, provider: &str) -> Result<RateLimitStatus> {
        let (count, window_start) = self.roll_window(provider, 0).await?;
        let remaining = (self.max_requests - count).max(0);

        Ok(RateLimitStatus {
            provider: provider.to_string(),
            available: count < self.max_requests,
            limit: self.max_requests,
            remaining,
            resets_at: window_start + Duration::seconds(self.window_secs),
        })
    }
}
