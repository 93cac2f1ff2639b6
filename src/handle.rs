//! Pool Handle
//!
//! [`PoolHandle`] bundles everything a service needs to talk to one server:
//! the pool, its admission gate and the background reaper. It is built once
//! at startup and passed to whoever needs connections.
//!
//! ```ignore
//! let redis = PoolHandle::connect("backend:6379", "secret").await?;
//!
//! let mut conn = redis.get_connection().await?.arm_trace();
//! conn.execute("SET", &[Bytes::from("k"), Bytes::from("v")]).await?;
//! conn.close();
//! ```
//!
//! [`PoolSlot`] covers callers that only learn the server address after
//! they were wired up: it starts empty and is filled once.

use crate::config::PoolConfig;
use crate::connection::{ConnectionFactory, TcpConnectionFactory};
use crate::error::{PoolError, PoolResult};
use crate::pool::{AdmissionGate, IdleReaper, Pool};
use crate::trace::TracedConnection;
use std::sync::OnceLock;
use tracing::{error, info};

/// An initialized pool together with its gate and reaper.
pub struct PoolHandle<F: ConnectionFactory> {
    pool: Pool<F>,
    gate: AdmissionGate,
    reaper: IdleReaper,
}

impl<F: ConnectionFactory> PoolHandle<F> {
    /// Builds the pool and verifies the server end to end.
    ///
    /// One connection is acquired and answers `PING` before the handle is
    /// returned. A dial, AUTH or PING failure is returned as is, and the
    /// pool is closed so no connection stays open.
    pub async fn initialize(factory: F, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let pool = Pool::new(factory, config);
        let gate = AdmissionGate::new(pool.config().max_active);

        if let Err(err) = verify(&pool, &gate).await {
            pool.close();
            return Err(err);
        }

        let reaper = IdleReaper::start(pool.clone(), pool.config().reap_interval);

        info!(
            addr = %pool.config().addr,
            database = pool.config().database,
            idle_cap = pool.config().idle_cap,
            max_active = gate.ceiling(),
            "Redis pool initialized"
        );

        Ok(Self { pool, gate, reaper })
    }

    /// Checks out a connection through the admission gate.
    pub async fn get_connection(&self) -> PoolResult<TracedConnection<F>> {
        self.gate.admit(&self.pool).await.map(TracedConnection::new)
    }

    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Stops the reaper and closes the pool.
    pub fn shutdown(&self) {
        self.reaper.stop();
        self.pool.close();
    }
}

impl PoolHandle<TcpConnectionFactory> {
    /// Connects to `addr` with the default pool sizing.
    pub async fn connect(addr: impl Into<String>, password: impl Into<String>) -> PoolResult<Self> {
        Self::connect_with(PoolConfig::new(addr, password)).await
    }

    pub async fn connect_with(config: PoolConfig) -> PoolResult<Self> {
        let factory = TcpConnectionFactory::new(&config);
        Self::initialize(factory, config).await
    }
}

async fn verify<F: ConnectionFactory>(pool: &Pool<F>, gate: &AdmissionGate) -> PoolResult<()> {
    let mut conn = TracedConnection::new(gate.admit(pool).await?);
    let result = conn.execute("PING", &[]).await;
    conn.close();
    result.map(|_| ())
}

/// A [`PoolHandle`] that is filled in after construction.
pub struct PoolSlot<F: ConnectionFactory> {
    cell: OnceLock<PoolHandle<F>>,
}

impl<F: ConnectionFactory> Default for PoolSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ConnectionFactory> PoolSlot<F> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Initializes the pool and stores it. Fails with
    /// [`PoolError::AlreadyInitialized`] if the slot is already filled.
    pub async fn initialize(&self, factory: F, config: PoolConfig) -> PoolResult<&PoolHandle<F>> {
        if self.cell.get().is_some() {
            return Err(PoolError::AlreadyInitialized);
        }

        let handle = PoolHandle::initialize(factory, config).await?;
        if let Err(lost) = self.cell.set(handle) {
            // Another caller filled the slot while we were connecting.
            lost.shutdown();
            return Err(PoolError::AlreadyInitialized);
        }
        self.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> PoolResult<&PoolHandle<F>> {
        self.cell.get().ok_or_else(|| {
            let err = PoolError::NotInitialized;
            error!(error = %err, "Connection requested from an empty pool slot");
            err
        })
    }

    pub async fn get_connection(&self) -> PoolResult<TracedConnection<F>> {
        self.get()?.get_connection().await
    }
}
