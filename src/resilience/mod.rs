//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (node RPC, relay API):
//!     → timeouts.rs (enforce upstream deadline)
//!     → On retryable failure: retries.rs (bounded attempts)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for reads (nonce, gas price); broadcasts are never blindly retried
//! - The caller decides which errors are retryable

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use retries::{retry_with_bound, RetryPolicy};
pub use timeouts::{with_deadline, DeadlineExceeded};
