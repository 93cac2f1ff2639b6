//! Pool Statistics
//!
//! Plain atomic counters, updated with `Ordering::Relaxed`: they feed
//! dashboards and logs, never control flow.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PoolStats {
    /// Connections created by the factory
    pub dialed: AtomicU64,
    /// Acquisitions served from the idle set
    pub reused: AtomicU64,
    /// Idle connections closed for exceeding the idle timeout
    pub reaped: AtomicU64,
    /// Idle connections discarded after a failed its health check
    pub health_check_failures: AtomicU64,
    /// Underlying close calls that returned an error
    pub close_failures: AtomicU64,
    /// Acquisitions turned away by the admission gate
    pub capacity_rejections: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_dialed(&self) {
        self.dialed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections_reaped(&self, count: usize) {
        self.reaped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn health_check_failed(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn close_failed(&self) {
        self.close_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capacity_rejected(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub active: usize,
    pub idle: usize,
    pub dialed: u64,
    pub reused: u64,
    pub reaped: u64,
    pub health_check_failures: u64,
    pub close_failures: u64,
    pub capacity_rejections: u64,
}

impl PoolStatsSnapshot {
    pub(crate) fn capture(stats: &PoolStats, active: usize, idle: usize) -> Self {
        Self {
            active,
            idle,
            dialed: stats.dialed.load(Ordering::Relaxed),
            reused: stats.reused.load(Ordering::Relaxed),
            reaped: stats.reaped.load(Ordering::Relaxed),
            health_check_failures: stats.health_check_failures.load(Ordering::Relaxed),
            close_failures: stats.close_failures.load(Ordering::Relaxed),
            capacity_rejections: stats.capacity_rejections.load(Ordering::Relaxed),
        }
    }
}
