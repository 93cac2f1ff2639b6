//! # FlashPool - A Pooled Client for Redis-Compatible Servers
//!
//! FlashPool keeps a small set of authenticated connections to one
//! Redis-compatible server and hands them out to request handlers. Many
//! services share a single server, so the pool is deliberately frugal: few
//! idle connections, an idle timeout, and a hard stop when a process holds
//! too many connections at once.
//!
//! ## Features
//!
//! - **Verified at startup**: dial, AUTH, SELECT and PING must all succeed
//!   before the pool is handed out
//! - **Idle reuse**: up to three idle connections, checked with PING before reuse
//! - **Admission ceiling**: acquisitions fail fast above 2800 active connections
//! - **One-shot tracing**: arm a connection and its next operation is logged
//! - **Async I/O**: built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashPool                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ PoolHandle  │───>│ Admission   │───>│    Pool     │                  │
//! │  │             │    │   Gate      │    │ (idle set)  │                  │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │ dial / check            │
//! │         ▼                                     ▼                         │
//! │  ┌─────────────┐                       ┌─────────────┐   ┌───────────┐ │
//! │  │  Traced     │                       │ Connection  │──>│   RESP    │ │
//! │  │ Connection  │                       │  Factory    │   │  Parser   │ │
//! │  └─────────────┘                       └─────────────┘   └───────────┘ │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │              IdleReaper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use bytes::Bytes;
//! use flashpool::{reply, PoolHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let redis = PoolHandle::connect("127.0.0.1:6379", "secret").await?;
//!
//!     let mut conn = redis.get_connection().await?.arm_trace();
//!     conn.execute("SET", &[Bytes::from("name"), Bytes::from("Ariz")]).await?;
//!     let name = reply::string(conn.execute("GET", &[Bytes::from("name")]).await)?;
//!     conn.close();
//!
//!     println!("{}", name);
//!     redis.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP reply types, parser and command encoding
//! - [`connection`]: the client connection and the factory that dials it
//! - [`pool`]: idle set, admission gate, reaper and statistics
//! - [`trace`]: per-acquisition tracing wrapper
//! - [`handle`]: the pool handle services are wired with
//! - [`reply`]: adapters from replies to Rust types

pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod pool;
pub mod protocol;
pub mod reply;
pub mod trace;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use config::PoolConfig;
pub use connection::{ClientConnection, ConnectionFactory, RespConnection, TcpConnectionFactory};
pub use error::{PoolError, PoolResult};
pub use handle::{PoolHandle, PoolSlot};
pub use pool::{AdmissionGate, IdleReaper, Pool, PoolStatsSnapshot, PooledConnection};
pub use protocol::{ParseError, RespParser, RespValue};
pub use trace::{TraceState, TracedConnection};

/// The default port of Redis-compatible servers
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to connect to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashPool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
