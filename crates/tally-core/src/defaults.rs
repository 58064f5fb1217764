//! Centralized default constants for the tally categorization engine.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Fixed-window size for provider rate limiting, in seconds.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Maximum provider requests per window. The external classification
/// provider caps free-tier usage at 15-16 requests per minute; staying at 15
/// leaves no headroom to exceed the cap mid-window.
pub const RATE_LIMIT_MAX_REQUESTS: i32 = 15;

/// Provider key for the default classification endpoint.
pub const DEFAULT_PROVIDER: &str = "openai";

// =============================================================================
// AI CLASSIFICATION
// =============================================================================

/// Sampling temperature: low, since only a category name is expected.
pub const AI_TEMPERATURE: f32 = 0.3;

/// Maximum completion tokens: the longest category name is a few words.
pub const AI_MAX_TOKENS: u32 = 20;

/// Default retry budget for interactive classification calls.
pub const AI_MAX_RETRIES: u32 = 3;

/// Reduced retry budget for background jobs, which reschedule on failure.
pub const AI_WORKER_MAX_RETRIES: u32 = 2;

/// Base delay for rate-limit retry backoff, in milliseconds.
pub const AI_BACKOFF_BASE_MS: u64 = 1_000;

/// Cap on a single rate-limit retry delay, in milliseconds.
pub const AI_BACKOFF_CAP_MS: u64 = 30_000;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Retry schedule for failed categorization jobs, in minutes, indexed by
/// attempt number (1-indexed). Attempts beyond the table clamp to the last
/// entry: failed jobs keep retrying at a 24-hour cadence with no terminal
/// dead-letter state.
pub const JOB_BACKOFF_MINUTES: [i64; 6] = [1, 5, 30, 120, 720, 1440];

/// Retention window for completed jobs before garbage collection, in days.
pub const JOB_RETENTION_DAYS: i64 = 7;

/// Backoff delay in minutes for a job that has failed `attempts` times.
///
/// `attempts` is the post-failure count (first failure passes 1). Zero and
/// negative values clamp to the first entry.
pub fn job_backoff_minutes(attempts: i32) -> i64 {
    let idx = (attempts.max(1) as usize - 1).min(JOB_BACKOFF_MINUTES.len() - 1);
    JOB_BACKOFF_MINUTES[idx]
}

// =============================================================================
// BACKGROUND WORKER
// =============================================================================

/// Interval between worker ticks, in seconds.
pub const WORKER_TICK_SECS: u64 = 5;

/// Jobs pulled per tick in the conservative configuration.
pub const WORKER_BATCH_SIZE: i64 = 1;

/// Delay after each provider call, in seconds, to stay under the rate limit
/// across consecutive ticks.
pub const WORKER_POST_CALL_DELAY_SECS: u64 = 4;

/// Chunk size for the manual backlog drain: one window's worth of requests.
pub const DRAIN_CHUNK_SIZE: i64 = 15;

/// Pause between full drain chunks, in seconds (one full window).
pub const DRAIN_PAUSE_SECS: u64 = 60;

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// MAINTENANCE
// =============================================================================

/// Interval for the daily maintenance pass (uncategorized scan + job GC),
/// in seconds.
pub const MAINTENANCE_DAILY_SECS: u64 = 24 * 60 * 60;

/// Interval for the weekly statistics aggregation, in seconds.
pub const MAINTENANCE_WEEKLY_SECS: u64 = 7 * 24 * 60 * 60;

/// Batch size for the daily uncategorized-expense scan.
pub const SCAN_BATCH_SIZE: i64 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_table_follows_spec_schedule() {
        assert_eq!(job_backoff_minutes(1), 1);
        assert_eq!(job_backoff_minutes(2), 5);
        assert_eq!(job_backoff_minutes(3), 30);
        assert_eq!(job_backoff_minutes(4), 120);
        assert_eq!(job_backoff_minutes(5), 720);
        assert_eq!(job_backoff_minutes(6), 1440);
    }

    #[test]
    fn test_backoff_clamps_past_table_end() {
        assert_eq!(job_backoff_minutes(7), 1440);
        assert_eq!(job_backoff_minutes(100), 1440);
    }

    #[test]
    fn test_backoff_clamps_below_one() {
        assert_eq!(job_backoff_minutes(0), 1);
        assert_eq!(job_backoff_minutes(-3), 1);
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let mut last = 0;
        for attempt in 1..=10 {
            let delay = job_backoff_minutes(attempt);
            assert!(delay >= last, "backoff must never decrease");
            last = delay;
        }
    }

    #[test]
    fn test_rate_limit_defaults() {
        assert_eq!(RATE_LIMIT_WINDOW_SECS, 60);
        assert!(RATE_LIMIT_MAX_REQUESTS < 16);
    }
}
