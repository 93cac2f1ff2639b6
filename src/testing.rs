//! In-memory connections for unit tests.

use crate::connection::{ClientConnection, ConnectionFactory};
use crate::error::{PoolError, PoolResult};
use crate::protocol::RespValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared between a [`MockFactory`] and every connection it dials.
#[derive(Default)]
pub struct MockState {
    pub dialed: AtomicUsize,
    pub closed: AtomicUsize,
    pub health_checks: AtomicUsize,
    pub fail_dial: AtomicBool,
    pub fail_health_check: AtomicBool,
    pub fail_close: AtomicBool,
    /// Results handed out by execute/send/flush/receive, in order.
    /// When empty every operation succeeds with `+OK`.
    pub script: Mutex<VecDeque<PoolResult<RespValue>>>,
    /// Commands seen by execute/send, as `NAME arg...`.
    pub commands: Mutex<Vec<String>>,
}

impl MockState {
    pub fn push(&self, result: PoolResult<RespValue>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn open(&self) -> usize {
        self.dialed.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    fn next(&self) -> PoolResult<RespValue> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RespValue::ok()))
    }

    fn record(&self, name: &str, args: &[Bytes]) {
        let mut line = name.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&String::from_utf8_lossy(arg));
        }
        self.commands.lock().unwrap().push(line);
    }
}

pub struct MockConnection {
    pub id: usize,
    alive: bool,
    /// Commands sent without their reply being received
    pending: usize,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Marks the connection dead without going through `close`.
    pub fn kill(&mut self) {
        self.alive = false;
    }
}

#[async_trait]
impl ClientConnection for MockConnection {
    async fn execute(&mut self, name: &str, args: &[Bytes]) -> PoolResult<RespValue> {
        self.state.record(name, args);
        self.pending = 0;
        self.state.next()
    }

    async fn send(&mut self, name: &str, args: &[Bytes]) -> PoolResult<()> {
        self.state.record(name, args);
        self.pending += 1;
        self.state.next().map(|_| ())
    }

    async fn flush(&mut self) -> PoolResult<()> {
        self.state.next().map(|_| ())
    }

    async fn receive(&mut self) -> PoolResult<RespValue> {
        self.pending = self.pending.saturating_sub(1);
        self.state.next()
    }

    fn close(&mut self) -> PoolResult<()> {
        if self.alive {
            self.alive = false;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(PoolError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn is_idle(&self) -> bool {
        self.pending == 0
    }
}

#[derive(Clone, Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Conn = MockConnection;

    async fn dial(&self) -> PoolResult<MockConnection> {
        if self.state.fail_dial.load(Ordering::SeqCst) {
            return Err(PoolError::Dial(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        let id = self.state.dialed.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id,
            alive: true,
            pending: 0,
            state: Arc::clone(&self.state),
        })
    }

    async fn health_check(&self, conn: &mut MockConnection) -> bool {
        self.state.health_checks.fetch_add(1, Ordering::SeqCst);
        conn.alive && !self.state.fail_health_check.load(Ordering::SeqCst)
    }
}
