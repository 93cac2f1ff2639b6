//! Admission Gate
//!
//! Several services usually share one server, and the server's connection
//! limit is shared between all of them. Each process therefore limits
//! itself: once more than `ceiling` connections are checked out, further
//! acquisitions fail fast with [`PoolError::Capacity`] instead of piling
//! more sockets onto a struggling server.
//!
//! The check reads the active count and then acquires, without holding
//! anything in between. Concurrent callers can overshoot the ceiling by a
//! few connections. The ceiling only has to stop runaway growth.
//!
//! Rejections are counted in the pool's stats as `capacity_rejections`.

use crate::connection::ConnectionFactory;
use crate::error::{PoolError, PoolResult};
use crate::pool::{Pool, PooledConnection};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct AdmissionGate {
    ceiling: usize,
}

impl AdmissionGate {
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Acquires from `pool` unless more than `ceiling` connections are out.
    pub async fn admit<F: ConnectionFactory>(
        &self,
        pool: &Pool<F>,
    ) -> PoolResult<PooledConnection<F>> {
        let active = pool.active_count();
        if active > self.ceiling {
            pool.record_rejection();
            warn!(active, ceiling = self.ceiling, "Admission ceiling exceeded");
            return Err(PoolError::Capacity {
                ceiling: self.ceiling,
            });
        }
        pool.acquire().await
    }
}
