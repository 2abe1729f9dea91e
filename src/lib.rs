//! Re-key request balancer library.
//!
//! Routes delegation requests (`gen_rekey`, `reencrypt`) across a fixed pool
//! of worker nodes, probes their liveness in the background and excludes
//! unhealthy nodes from round-robin selection.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::schema::BalancerConfig;
pub use dispatch::{DispatchError, Dispatcher};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::NodePool;
