//! Connection Module
//!
//! Everything that touches a single server connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐ dial / health_check  ┌──────────────────────┐
//! │  ConnectionFactory       │ ───────────────────> │  ClientConnection    │
//! │  (TcpConnectionFactory)  │                      │  (RespConnection<S>) │
//! │  connect, AUTH, SELECT   │                      │  execute / send /    │
//! └──────────────────────────┘                      │  flush / receive     │
//!                                                   └──────────────────────┘
//! ```
//!
//! The pool is generic over [`ConnectionFactory`], so tests plug in
//! in-memory connections and production code plugs in TCP.

pub mod client;
pub mod factory;

pub use client::{ClientConnection, RespConnection};
pub use factory::{handshake, ping, ConnectionFactory, TcpConnectionFactory};
