//! Connection Pool Module
//!
//! ## Architecture
//!
//! ```text
//!   caller
//!     │ admit()
//!     ▼
//! ┌───────────────┐  active > ceiling  ┌──────────────────┐
//! │ AdmissionGate │ ─────────────────> │ Capacity error   │
//! └───────┬───────┘                    └──────────────────┘
//!         │ acquire()
//!         ▼
//! ┌──────────────────────────────┐        ┌────────────────────┐
//! │ Pool                         │ dial() │ ConnectionFactory  │
//! │  idle set (LIFO, Mutex)      │ ─────> │                    │
//! │  active count (atomic)       │ check  │                    │
//! └──────────────────────────────┘        └────────────────────┘
//!         ▲
//!         │ reap_idle() every reap_interval
//! ┌───────┴──────────┐
//! │ IdleReaper       │
//! │ (Tokio task)     │
//! └──────────────────┘
//! ```

pub mod gate;
pub mod manager;
pub mod reaper;
pub mod stats;

pub use gate::AdmissionGate;
pub use manager::{Pool, PooledConnection};
pub use reaper::IdleReaper;
pub use stats::{PoolStats, PoolStatsSnapshot};
