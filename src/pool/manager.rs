//! Connection Pool
//!
//! Keeps a small set of idle connections for reuse and counts the ones
//! currently checked out.
//!
//! ## Design Decisions
//!
//! 1. **LIFO idle set**: the most recently released connection is handed out
//!    first, so the oldest entries collect at the back where the reaper
//!    trims them.
//! 2. **Short critical sections**: the idle mutex is held only while moving
//!    entries in or out. Health checks, dials and closes happen outside it.
//! 3. **Soft idle cap**: there is no limit on checked-out connections here.
//!    Connections released while the idle set is full are closed instead of
//!    pooled. Bounding checkouts is the admission gate's job.
//! 4. **No retries**: a failed dial is returned to the caller unchanged.
//! 5. **Only clean connections are pooled**: a connection released with
//!    replies still owed, or abandoned mid-operation, is closed. Its reply
//!    stream would otherwise be read by the next caller.
//! 6. **Release never panics**: it runs from `Drop`, so a poisoned idle
//!    lock is recovered rather than unwrapped.
//!
//! ## Lifecycle of a Connection
//!
//! ```text
//!   dial() ──> checked out ──release──> idle ──acquire (check ok)──> checked out
//!                  │                     │
//!                  │ dead / unread /     │
//!                  │ idle full           │ idle > idle_timeout or check fails
//!                  ▼                     ▼
//!                closed                closed
//! ```

use crate::config::PoolConfig;
use crate::connection::{ClientConnection, ConnectionFactory};
use crate::error::{PoolError, PoolResult};
use crate::pool::stats::{PoolStats, PoolStatsSnapshot};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

struct IdleEntry<C> {
    conn: C,
    last_used: Instant,
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    /// Front = most recently released
    idle: Mutex<VecDeque<IdleEntry<F::Conn>>>,
    /// Checked-out connections
    active: AtomicUsize,
    closed: AtomicBool,
    stats: PoolStats,
}

/// Shared handle to a connection pool. Clones refer to the same pool.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let idle = VecDeque::with_capacity(config.idle_cap);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                config,
                idle: Mutex::new(idle),
                active: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                stats: PoolStats::new(),
            }),
        }
    }

    /// Checks out a connection.
    ///
    /// Reuses the most recent idle connection that is younger than the idle
    /// timeout and passes the factory's health check; otherwise dials a new one.
    /// The active count only moves when a connection is returned.
    pub async fn acquire(&self) -> PoolResult<PooledConnection<F>> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let idle_timeout = self.inner.config.idle_timeout;
        while let Some(mut entry) = self.pop_idle() {
            if entry.last_used.elapsed() > idle_timeout {
                trace!("Discarding idle connection past its timeout");
                self.inner.stats.connections_reaped(1);
                self.close_connection(&mut entry.conn);
                continue;
            }

            if self.inner.factory.health_check(&mut entry.conn).await {
                self.inner.stats.connection_reused();
                return Ok(self.check_out(entry.conn));
            }

            debug!("Idle connection failed its health check, discarding");
            self.inner.stats.health_check_failed();
            self.close_connection(&mut entry.conn);
        }

        let conn = self.inner.factory.dial().await?;
        self.inner.stats.connection_dialed();
        let pooled = self.check_out(conn);
        debug!(
            addr = %self.inner.config.addr,
            active = self.active_count(),
            "Dialed new connection"
        );
        Ok(pooled)
    }

    /// Closes idle connections unused for longer than the idle timeout.
    /// Returns how many were closed.
    pub fn reap_idle(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout;
        let stale: Vec<IdleEntry<F::Conn>> = {
            let mut idle = self.idle();
            let mut stale = Vec::new();
            while idle
                .back()
                .is_some_and(|entry| entry.last_used.elapsed() > idle_timeout)
            {
                if let Some(entry) = idle.pop_back() {
                    stale.push(entry);
                }
            }
            stale
        };

        let count = stale.len();
        for mut entry in stale {
            self.close_connection(&mut entry.conn);
        }
        if count > 0 {
            self.inner.stats.connections_reaped(count);
        }
        count
    }

    /// Shuts the pool down: closes idle connections and rejects further
    /// acquisitions. Connections still checked out are closed on release.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<IdleEntry<F::Conn>> = self.idle().drain(..).collect();
        let count = drained.len();
        for mut entry in drained {
            self.close_connection(&mut entry.conn);
        }

        info!(
            closed_idle = count,
            active = self.active_count(),
            "Connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of checked-out connections.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot::capture(&self.inner.stats, self.active_count(), self.idle_count())
    }

    fn pop_idle(&self) -> Option<IdleEntry<F::Conn>> {
        self.idle().pop_front()
    }

    /// The idle set. Entries are plain values, so a poisoned lock still
    /// guards a consistent queue.
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleEntry<F::Conn>>> {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts an acquisition turned away by the admission gate.
    pub(crate) fn record_rejection(&self) {
        self.inner.stats.capacity_rejected();
    }

    fn check_out(&self, conn: F::Conn) -> PooledConnection<F> {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
        }
    }

    fn release(&self, mut conn: F::Conn) {
        let _ = self
            .inner
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if conn.is_alive() && !conn.is_idle() {
            debug!("Released connection still owes replies, closing it");
        } else if conn.is_alive() {
            let mut idle = self.idle();
            // `closed` is checked under the lock so `close()` cannot miss it.
            if !self.is_closed() && idle.len() < self.inner.config.idle_cap {
                idle.push_front(IdleEntry {
                    conn,
                    last_used: Instant::now(),
                });
                return;
            }
        }

        self.close_connection(&mut conn);
    }

    fn close_connection(&self, conn: &mut F::Conn) {
        if let Err(err) = conn.close() {
            self.inner.stats.close_failed();
            warn!(error = %err, "Failed to close connection");
        }
    }
}

/// A checked-out connection. Dropping it returns the connection to its pool.
pub struct PooledConnection<F: ConnectionFactory> {
    /// Always `Some` until released
    conn: Option<F::Conn>,
    pool: Pool<F>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Returns the connection to the pool.
    pub fn release(self) {
        drop(self);
    }

    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until release")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until release")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFactory;
    use std::time::Duration;

    fn pool_with(idle_cap: usize, idle_timeout: Duration) -> (Pool<MockFactory>, MockFactory) {
        let factory = MockFactory::new();
        let config = PoolConfig::default()
            .with_idle_cap(idle_cap)
            .with_idle_timeout(idle_timeout);
        (Pool::new(factory.clone(), config), factory)
    }

    #[tokio::test]
    async fn test_active_count_returns_to_baseline() {
        let (pool, _) = pool_with(3, Duration::from_secs(60));

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.active_count(), 2);

        a.release();
        assert_eq!(pool.active_count(), 1);
        drop(b);
        assert_eq!(pool.active_count(), 0);

        for _ in 0..10 {
            let conn = pool.acquire().await.unwrap();
            assert_eq!(pool.active_count(), 1);
            conn.release();
            assert_eq!(pool.active_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));

        let first = pool.acquire().await.unwrap();
        let id = first.id;
        first.release();
        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id, id);
        assert_eq!(factory.state.dialed.load(Ordering::SeqCst), 1);
        assert_eq!(factory.state.health_checks.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test]
    async fn test_stale_connection_is_not_reused() {
        let (pool, factory) = pool_with(3, Duration::from_millis(20));

        let first = pool.acquire().await.unwrap();
        let id = first.id;
        first.release();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = pool.acquire().await.unwrap();
        assert_ne!(second.id, id);
        assert_eq!(factory.state.dialed.load(Ordering::SeqCst), 2);
        assert_eq!(factory.state.closed.load(Ordering::SeqCst), 1);
        // Stale entries are dropped before probing.
        assert_eq!(factory.state.health_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_health_check_discards_and_dials() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));

        pool.acquire().await.unwrap().release();
        factory.state.fail_health_check.store(true, Ordering::SeqCst);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(pool.stats().health_check_failures, 1);
        assert_eq!(factory.state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dial_error_propagates_without_retry() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));
        factory.state.fail_dial.store(true, Ordering::SeqCst);

        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, PoolError::Dial(_)));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.state.dialed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overflow_beyond_idle_cap_is_closed() {
        let (pool, factory) = pool_with(2, Duration::from_secs(60));

        let conns = vec![
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
        ];
        assert_eq!(pool.active_count(), 3);
        drop(conns);

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(factory.state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_connection_is_not_pooled() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));

        let mut conn = pool.acquire().await.unwrap();
        conn.close().unwrap();
        conn.release();

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.state.open(), 0);

        let mut conn = pool.acquire().await.unwrap();
        conn.kill();
        conn.release();
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_reap_idle_closes_only_stale_entries() {
        let (pool, factory) = pool_with(3, Duration::from_millis(30));

        pool.acquire().await.unwrap().release();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let fresh = pool.acquire().await.unwrap(); // dials: the idle one is stale
        let other = pool.acquire().await.unwrap();
        fresh.release();
        other.release();

        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.reap_idle(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.reap_idle(), 2);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(factory.state.open(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_is_counted_not_propagated() {
        let (pool, factory) = pool_with(0, Duration::from_secs(60));
        factory.state.fail_close.store(true, Ordering::SeqCst);

        pool.acquire().await.unwrap().release();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.stats().close_failures, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_and_drains() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));

        let held = pool.acquire().await.unwrap();
        pool.acquire().await.unwrap().release();
        assert_eq!(pool.idle_count(), 1);

        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));

        held.release();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.state.open(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_release_never_leaks() {
        let (pool, _) = pool_with(3, Duration::from_secs(60));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let conn = pool.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                    conn.release();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(pool.active_count(), 0);
        assert!(pool.idle_count() <= 3);
    }

    #[tokio::test]
    async fn test_connection_with_unread_replies_is_not_pooled() {
        let (pool, factory) = pool_with(3, Duration::from_secs(60));

        let mut conn = pool.acquire().await.unwrap();
        conn.send("INCR", &[bytes::Bytes::from("hits")]).await.unwrap();
        conn.release();

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(factory.state.open(), 0);

        // The next caller gets a fresh connection, not the old pipeline.
        let next = pool.acquire().await.unwrap();
        assert_eq!(next.id, 1);
        assert_eq!(factory.state.health_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_release_recovers_poisoned_idle_lock() {
        let (pool, _) = pool_with(3, Duration::from_secs(60));
        let conn = pool.acquire().await.unwrap();

        let inner = Arc::clone(&pool.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.idle.lock().unwrap();
            panic!("poison the idle lock");
        })
        .join();
        assert!(pool.inner.idle.is_poisoned());

        conn.release();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);
        assert!(pool.acquire().await.is_ok());
    }
}
