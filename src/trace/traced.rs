//! Traced Connection Wrapper
//!
//! Every connection handed out by a [`PoolHandle`](crate::PoolHandle) is
//! wrapped in a [`TracedConnection`]. Tracing is opt-in per acquisition:
//!
//! ```text
//!            arm_trace()              first execute/send/receive,
//!   ┌─────┐ ───────────> ┌───────┐    or a failed flush     ┌───────┐
//!   │ Off │              │ Armed │ ───────────────────────> │ Fired │
//!   └─────┘              └───────┘     (emits one record)   └───────┘
//! ```
//!
//! A traced acquisition logs exactly one record, for the first operation
//! that completes while armed. Pipelines issue many operations per
//! acquisition, and one representative record is what the logs need. A
//! successful flush carries nothing worth logging and leaves the state
//! untouched.
//!
//! The state lives on the wrapper, never on the pooled connection, so it
//! cannot leak into the next acquisition of the same socket.

use crate::connection::{ClientConnection, ConnectionFactory};
use crate::error::PoolResult;
use crate::pool::PooledConnection;
use crate::protocol::RespValue;
use crate::trace::render::{render, render_args};
use bytes::Bytes;
use tracing::{error, info};

/// Per-acquisition trace state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceState {
    #[default]
    Off,
    Armed,
    Fired,
}

impl TraceState {
    /// Moves `Armed` to `Fired`, reporting whether a record should be emitted.
    fn fire(&mut self) -> bool {
        if *self == TraceState::Armed {
            *self = TraceState::Fired;
            true
        } else {
            false
        }
    }
}

/// A pooled connection with optional one-shot tracing.
pub struct TracedConnection<F: ConnectionFactory> {
    conn: PooledConnection<F>,
    trace: TraceState,
}

impl<F: ConnectionFactory> TracedConnection<F> {
    pub fn new(conn: PooledConnection<F>) -> Self {
        Self {
            conn,
            trace: TraceState::Off,
        }
    }

    /// Logs the next operation on this acquisition.
    pub fn arm_trace(mut self) -> Self {
        self.trace = TraceState::Armed;
        self
    }

    pub fn trace_state(&self) -> TraceState {
        self.trace
    }

    pub fn is_alive(&self) -> bool {
        self.conn.is_alive()
    }

    /// Sends a command and waits for its reply.
    pub async fn execute(&mut self, name: &str, args: &[Bytes]) -> PoolResult<RespValue> {
        let result = self.conn.execute(name, args).await;
        if self.trace.fire() {
            match &result {
                Ok(reply) => info!(
                    command_name = name,
                    args = %render_args(args),
                    result = %render(reply),
                    "redis do"
                ),
                Err(err) => error!(
                    error = %err,
                    command_name = name,
                    args = %render_args(args),
                    "redis do error"
                ),
            }
        }
        result
    }

    /// Buffers a command without flushing it.
    pub async fn send(&mut self, name: &str, args: &[Bytes]) -> PoolResult<()> {
        let result = self.conn.send(name, args).await;
        if self.trace.fire() {
            match &result {
                Ok(()) => info!(command_name = name, args = %render_args(args), "redis send"),
                Err(err) => error!(
                    error = %err,
                    command_name = name,
                    args = %render_args(args),
                    "redis send error"
                ),
            }
        }
        result
    }

    pub async fn flush(&mut self) -> PoolResult<()> {
        let result = self.conn.flush().await;
        if let Err(err) = &result {
            if self.trace.fire() {
                error!(error = %err, "redis flush error");
            }
        }
        result
    }

    /// Reads a single reply.
    pub async fn receive(&mut self) -> PoolResult<RespValue> {
        let result = self.conn.receive().await;
        if self.trace.fire() {
            match &result {
                Ok(reply) => info!(result = %render(reply), "redis receive"),
                Err(err) => error!(error = %err, "redis receive error"),
            }
        }
        result
    }

    /// Returns the connection to the pool. Failures closing the underlying
    /// socket are logged by the pool, never returned.
    pub fn close(self) {
        self.conn.release();
    }
}
