//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs, http/server.rs):
//!     Load config → Validate → Build pool → Eager probe cycle → Spawn prober → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop prober schedule → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pool and health, listener last
//! - Every background task is joined before `run` returns

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
