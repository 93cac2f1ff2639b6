//! Per-acquisition Tracing
//!
//! - `traced`: [`TracedConnection`], the one-shot tracing wrapper handed out
//!   by the pool handle
//! - `render`: turns replies and arguments into log-friendly text

pub mod render;
pub mod traced;

pub use render::{render, render_args, Rendered};
pub use traced::{TraceState, TracedConnection};
