//! TCP server: accept loop and per-connection task spawning.
//!
//! The acceptor owns the worker-pool decision: the pool is created
//! exactly once when serving starts, and its admission gate is closed
//! when the accept loop ends. A failure inside one connection's task
//! never reaches the acceptor.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::*;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::Config;
use crate::protocol::xmlrpc::Charset;
use crate::rpc::{ExecutionRouter, MethodRegistry, RpcDispatcher, WorkerPool};

use super::lifecycle::{AcceptPolicy, AllowAll, ConnectionLifecycle};

/// Unbound server: configuration plus the method registry.
pub struct XmlRpcServer {
    cfg: Arc<Config>,
    registry: Arc<MethodRegistry>,
    policy: Arc<dyn AcceptPolicy>,
}

impl XmlRpcServer {
    pub fn new(cfg: Arc<Config>, registry: MethodRegistry) -> Self {
        Self {
            cfg,
            registry: Arc::new(registry),
            policy: Arc::new(AllowAll),
        }
    }

    /// Replace the connection-admission policy.
    pub fn with_accept_policy(mut self, policy: Arc<dyn AcceptPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Bind the listener and validate everything serving depends on.
    pub async fn bind(self) -> io::Result<BoundServer> {
        let charset = Charset::from_name(&self.cfg.rpc.encoding).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported encoding {:?}", self.cfg.rpc.encoding),
            )
        })?;
        let listener = TcpListener::bind(&self.cfg.server.bind_addr).await?;
        Ok(BoundServer {
            listener,
            charset,
            cfg: self.cfg,
            registry: self.registry,
            policy: self.policy,
        })
    }
}

/// Server with a bound listener, ready to accept.
pub struct BoundServer {
    listener: TcpListener,
    charset: Charset,
    cfg: Arc<Config>,
    registry: Arc<MethodRegistry>,
    policy: Arc<dyn AcceptPolicy>,
}

impl BoundServer {
    /// The bound address; useful with an ephemeral port.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, spawning one
    /// lifecycle task per connection.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        // The pool decision happens exactly once, here: an explicit
        // worker count and at least one Sync method, or no pool at all.
        let pool = if self.cfg.pool.max_workers > 0 && self.registry.has_sync_methods() {
            Some(WorkerPool::new(self.cfg.pool.max_workers))
        } else {
            None
        };
        let router = Arc::new(ExecutionRouter::new(pool));
        let dispatcher = Arc::new(RpcDispatcher::new(
            self.registry.clone(),
            router.clone(),
            self.charset,
            self.cfg.rpc.allow_none,
        ));

        info!(
            "xmlrpc listening on {} pool_workers={}",
            self.listener.local_addr()?,
            if router.has_pool() {
                self.cfg.pool.max_workers
            } else {
                0
            }
        );

        loop {
            let (socket, addr) = tokio::select! {
                _ = shutdown.changed() => break,
                res = self.listener.accept() => match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept: {}", e);
                        continue;
                    }
                },
            };

            let cfg = self.cfg.clone();
            let policy = self.policy.clone();
            let dispatcher = dispatcher.clone();

            tokio::spawn(async move {
                debug!("new connection from {}", addr);
                let lifecycle = ConnectionLifecycle::new(socket, addr);
                match lifecycle.run(&cfg, policy.as_ref(), dispatcher.as_ref()).await {
                    Ok(()) => debug!("connection {} closed cleanly", addr),
                    Err(e) => error!("connection {}: {}", addr, e),
                }
            });
        }

        // Server stop: close the pool's admission gate without waiting
        // for outstanding work.
        router.shutdown();
        info!("xmlrpc server stopped");
        Ok(())
    }

    /// Accept indefinitely; convenience wrapper over [`serve`].
    ///
    /// [`serve`]: BoundServer::serve
    pub async fn serve_forever(self) -> io::Result<()> {
        let (_keep_alive, shutdown) = watch::channel(false);
        self.serve(shutdown).await
    }
}
