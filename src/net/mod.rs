//! Network layer for the XML-RPC server.
//!
//! This module contains:
//! - `lifecycle`: per-connection state machine and accept policy
//! - `handler`: single request-response exchange handling
//! - `server`: TCP acceptor and worker-pool ownership

pub mod handler;
pub mod lifecycle;
pub mod server;

// Re-export main entry points
pub use lifecycle::{AcceptPolicy, AllowAll, ConnectionLifecycle, LifecycleState};
pub use server::{BoundServer, XmlRpcServer};
