//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Prober finishes a cycle
//!     → pool.rs (replace_healthy: swap the whole snapshot)
//!
//! Dispatch request
//!     → affinity.rs (pinned origin node for reencrypt, if any)
//!     → pool.rs (snapshot of the healthy set)
//!     → round_robin.rs (atomic fetch-and-increment, index mod len)
//!     → node.rs (endpoint URL for the operation)
//! ```
//!
//! # Design Decisions
//! - Fixed pool: nodes are never added or removed at runtime
//! - Nodes that have not been probed yet are excluded from selection
//! - Unhealthy nodes are excluded only by the next published cycle

pub mod affinity;
pub mod node;
pub mod pool;
pub mod round_robin;

pub use affinity::DelegationAffinity;
pub use node::{Node, NodeHealth};
pub use pool::{HealthReport, HealthSnapshot, NodePool, Selection};
