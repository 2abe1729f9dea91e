//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     prober.rs run_once (eager cycle, before the listener serves)
//!
//! Every interval:
//!     Probe each node concurrently (bounded by the probe timeout)
//!     → Collect the healthy subset
//!     → NodePool::replace_healthy (one atomic publish)
//! ```
//!
//! # Design Decisions
//! - A node's health is decided by its latest probe only
//! - Probe failures are contained here; request callers never see them
//! - Shutdown stops the schedule; a cycle still in flight is not published

pub mod prober;

pub use prober::HealthProber;
