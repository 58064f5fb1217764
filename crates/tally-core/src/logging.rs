//! Structured logging field name constants for tally.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

/// Subsystem originating the log event.
/// Values: "db", "inference", "jobs", "orchestrator"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "worker", "classifier", "scheduler"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "resolve", "classify", "poll_ready", "drain"
pub const OPERATION: &str = "op";

/// Expense UUID being operated on.
pub const EXPENSE_ID: &str = "expense_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Normalized merchant key.
pub const MERCHANT_KEY: &str = "merchant_key";

/// Rate-limit provider key.
pub const PROVIDER: &str = "provider";

/// Resolved category name.
pub const CATEGORY: &str = "category";

/// Resolution source ("personal", "global", "heuristic", "ai", "ai-retry").
pub const SOURCE: &str = "source";

/// Classification attempt count.
pub const ATTEMPTS: &str = "attempts";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of items returned or processed.
pub const RESULT_COUNT: &str = "result_count";

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
