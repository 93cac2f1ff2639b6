//! Background Idle Reaper
//!
//! `acquire` already skips idle connections past their timeout, but a pool
//! that goes quiet would otherwise hold those sockets open forever. The
//! reaper runs as a Tokio task and trims the idle set on a fixed interval.
//!
//! The task stops when [`IdleReaper::stop`] is called or the handle is
//! dropped.

use crate::connection::ConnectionFactory;
use crate::pool::Pool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// A handle to the running reaper task.
#[derive(Debug)]
pub struct IdleReaper {
    shutdown_tx: watch::Sender<bool>,
}

impl IdleReaper {
    /// Spawns the reaper for `pool`, scanning every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F: ConnectionFactory>(pool: Pool<F>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(reaper_loop(pool, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis(), "Idle connection reaper started");

        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Idle connection reaper stopped");
        }
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop<F: ConnectionFactory>(
    pool: Pool<F>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Idle reaper received shutdown signal");
                    return;
                }
            }
        }

        if pool.is_closed() {
            debug!("Pool closed, idle reaper exiting");
            return;
        }

        let reaped = pool.reap_idle();
        if reaped > 0 {
            debug!(
                reaped = reaped,
                idle_remaining = pool.idle_count(),
                "Reaped idle connections"
            );
        }
    }
}
