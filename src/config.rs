//! Pool Configuration
//!
//! `PoolConfig` is fixed once the pool is built. The defaults match the
//! sizing the pool was tuned with in production: three idle connections,
//! a four minute idle timeout, and an admission ceiling of 2800.

use crate::error::{PoolError, PoolResult};
use std::time::Duration;

/// Default server address (same as Redis)
pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";

/// Idle connections kept for reuse.
pub const DEFAULT_IDLE_CAP: usize = 3;

/// Idle connections older than this are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Active connections beyond which acquisitions are rejected.
/// Found by load testing; keep it well below the server's `maxclients`
/// when several services share one instance.
pub const DEFAULT_MAX_ACTIVE: usize = 2800;

/// How often the background reaper scans the idle set.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// AUTH secret. Empty skips AUTH.
    pub password: String,
    /// Database index passed to SELECT.
    pub database: i64,
    /// Maximum idle connections kept in the pool.
    pub idle_cap: usize,
    /// Idle connections unused for longer than this are closed.
    pub idle_timeout: Duration,
    /// Admission ceiling on checked-out connections.
    pub max_active: usize,
    /// Interval between reaper scans.
    pub reap_interval: Duration,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            password: String::new(),
            database: 0,
            idle_cap: DEFAULT_IDLE_CAP,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_active: DEFAULT_MAX_ACTIVE,
            reap_interval: DEFAULT_REAP_INTERVAL,
            connect_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Reference configuration for `addr`, authenticating with `password`.
    pub fn new(addr: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_idle_cap(mut self, idle_cap: usize) -> Self {
        self.idle_cap = idle_cap;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Rejects settings the pool cannot run with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.addr.trim().is_empty() {
            return Err(PoolError::InvalidConfig("address is empty".to_string()));
        }
        if self.reap_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "reap interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
