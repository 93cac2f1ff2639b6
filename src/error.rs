//! Error Types
//!
//! One error enum covers the whole crate. The pool never retries and never
//! rewrites an error into a different kind; the only error it invents on its
//! own is [`PoolError::Capacity`].

use crate::protocol::ParseError;
use thiserror::Error;

/// Result type used throughout the crate.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the pool, its connections and the reply adapters.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A connection was requested before the pool was initialized.
    /// This is a programming error rather than a runtime condition.
    #[error("redis pool is not initialized, initialize it before requesting connections")]
    NotInitialized,

    /// `initialize` was called on a slot that already holds a pool.
    #[error("redis pool is already initialized")]
    AlreadyInitialized,

    /// The admission gate rejected the acquisition.
    #[error("redis connect clients exceeded the limit of {ceiling}")]
    Capacity { ceiling: usize },

    /// The pool has been shut down.
    #[error("redis pool is closed")]
    PoolClosed,

    /// Could not open the transport to the server.
    #[error("dial error: {0}")]
    Dial(#[source] std::io::Error),

    /// The server rejected AUTH.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// I/O failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that are not valid RESP.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The server answered with an error reply.
    #[error("{0}")]
    Server(String),

    /// The connection was closed, either explicitly or after a fatal error.
    #[error("connection closed")]
    ConnectionClosed,

    /// A reply adapter got a null reply.
    #[error("nil returned")]
    Nil,

    /// A reply adapter got a reply of the wrong shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Configuration rejected by `PoolConfig::validate`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Fatal errors indicate misuse of the pool and should abort the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::NotInitialized)
    }

    /// True when the connection that produced this error must not be reused.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            PoolError::Io(_) | PoolError::Protocol(_) | PoolError::ConnectionClosed
        )
    }
}
