//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Chains → Store (+ restore) → Service
//!     → spawn gas refreshers + expiry sweeper → bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → background tasks exit
//!     → store persisted → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: an invalid config or unreadable store aborts startup
//! - Background tasks get a bounded drain period, then are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{build_service, spawn_background, StartupError};
