//! RPC dispatch layer.
//!
//! This module contains:
//! - `registry` - startup-built method table with Async/Sync tagging
//! - `router` - inline vs. worker-pool execution routing
//! - `dispatch` - marshaled dispatch (bytes in, bytes out)

mod dispatch;
mod registry;
mod router;

pub use dispatch::{Dispatch, RpcDispatcher};
pub use registry::{
    AsyncHandler, DispatchHook, Handler, MethodFuture, MethodRegistry, RegistryBuilder,
    RegistryError, SyncHandler,
};
pub use router::{ExecutionRouter, WorkerPool};
