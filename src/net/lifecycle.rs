//! Per-connection lifecycle state machine.
//!
//! Every connection walks `Verifying → Processing → {ErrorHandling} →
//! ShuttingDown → Closed`. The lifecycle owns the transport outright,
//! so the socket is released on every exit path: the explicit shutdown
//! covers normal completion and handled errors, and task cancellation
//! drops the lifecycle, which closes the socket through ownership.

use std::net::SocketAddr;

use log::*;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

use crate::common::error::ConnError;
use crate::config::Config;
use crate::rpc::Dispatch;

use super::handler::handle_request;

/// Connection-admission hook, consulted before any bytes are read.
pub trait AcceptPolicy: Send + Sync {
    /// Return false to refuse the connection; it is closed without a
    /// response and the request handler never runs.
    fn verify(&self, peer: SocketAddr) -> bool;
}

/// Default policy: every connection is admitted.
pub struct AllowAll;

impl AcceptPolicy for AllowAll {
    fn verify(&self, _peer: SocketAddr) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Verifying,
    Processing,
    ErrorHandling,
    ShuttingDown,
    Closed,
}

/// Owns one connection from accept to close.
pub struct ConnectionLifecycle<S> {
    stream: BufStream<S>,
    peer: SocketAddr,
    state: LifecycleState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionLifecycle<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream: BufStream::new(stream),
            peer,
            state: LifecycleState::Verifying,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Drive the connection through its states.
    ///
    /// Recoverable errors (transport, framing) are reported to the
    /// operator log and end with a clean close and `Ok`. The returned
    /// `Err` is reserved for failures of the cleanup path itself, which
    /// the spawning task surfaces after the close attempt.
    pub async fn run(
        mut self,
        cfg: &Config,
        policy: &dyn AcceptPolicy,
        dispatcher: &dyn Dispatch,
    ) -> Result<(), ConnError> {
        if !policy.verify(self.peer) {
            debug!("{}: refused by accept policy", self.peer);
            return self.shutdown().await;
        }

        self.state = LifecycleState::Processing;
        match handle_request(&mut self.stream, self.peer, cfg, dispatcher).await {
            Ok(()) => self.shutdown().await,
            Err(e) => {
                self.state = LifecycleState::ErrorHandling;
                error!("{}: error while processing connection: {}", self.peer, e);
                self.shutdown().await
            }
        }
    }

    /// Flush buffered output and shut the transport down.
    ///
    /// Idempotent: the state moves to `Closed` whether or not the flush
    /// succeeds, and a second call is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), ConnError> {
        if self.state == LifecycleState::Closed {
            return Ok(());
        }
        self.state = LifecycleState::ShuttingDown;
        let res = async {
            self.stream.flush().await?;
            self.stream.get_mut().shutdown().await
        }
        .await;
        self.state = LifecycleState::Closed;
        res.map_err(ConnError::Framework)
    }
}
