//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → dispatcher.rs (validate, pick node)
//!     → upstream.rs (POST to node with timeout)
//!     → dispatcher.rs (classify reply, pin delegation, audit)
//!     → HTTP handler relays reply or maps DispatchError
//! ```
//!
//! # Error Taxonomy
//! - No capacity (503): healthy set empty, or pinned origin node unhealthy
//! - Upstream unreachable (502): transport failure or timeout
//! - Upstream rejected (node's status): relayed verbatim
//! - Probe failures never reach this module

pub mod dispatcher;
pub mod error;
pub mod types;
pub mod upstream;

pub use dispatcher::{Dispatched, Dispatcher};
pub use error::DispatchError;
pub use types::{
    HealthResponse, Operation, ReEncryptRequest, ReEncryptResponse, ReKeyRequest, ReKeyResponse,
    UpstreamStatus, UpstreamsResponse,
};
pub use upstream::{UpstreamClient, UpstreamReply};
