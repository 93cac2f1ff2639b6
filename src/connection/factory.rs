//! Connection Factory
//!
//! Builds fresh connections for the pool and decides whether an idle one is
//! still worth handing out.
//!
//! A new TCP connection goes through the same handshake every time:
//!
//! 1. connect to the configured address
//! 2. `AUTH <password>` when a password is configured; a rejection closes the
//!    half-open connection and surfaces [`PoolError::Auth`]
//! 3. `SELECT <db>`, best-effort, since database 0 is a safe fallback

use crate::config::PoolConfig;
use crate::connection::client::{ClientConnection, RespConnection};
use crate::error::{PoolError, PoolResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Creates and validates connections on behalf of the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: ClientConnection;

    /// Opens a new, ready-to-use connection.
    async fn dial(&self) -> PoolResult<Self::Conn>;

    /// Health check for an idle connection about to be reused.
    async fn health_check(&self, conn: &mut Self::Conn) -> bool;
}

/// Dials Redis-compatible servers over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    addr: String,
    password: String,
    database: i64,
    connect_timeout: Option<Duration>,
}

impl TcpConnectionFactory {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            addr: config.addr.clone(),
            password: config.password.clone(),
            database: config.database,
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect_stream(&self) -> std::io::Result<TcpStream> {
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                })??,
            None => TcpStream::connect(&self.addr).await?,
        };
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Conn = RespConnection<TcpStream>;

    async fn dial(&self) -> PoolResult<Self::Conn> {
        let stream = self.connect_stream().await.map_err(PoolError::Dial)?;
        let mut conn = RespConnection::new(stream);
        handshake(&mut conn, &self.password, self.database).await?;
        trace!(addr = %self.addr, "Connection established");
        Ok(conn)
    }

    async fn health_check(&self, conn: &mut Self::Conn) -> bool {
        ping(conn).await
    }
}

/// Runs AUTH and SELECT on a freshly opened connection.
///
/// On AUTH failure the connection is closed before the error is returned.
pub async fn handshake<C: ClientConnection>(
    conn: &mut C,
    password: &str,
    database: i64,
) -> PoolResult<()> {
    if !password.is_empty() {
        let auth = conn
            .execute("AUTH", &[Bytes::copy_from_slice(password.as_bytes())])
            .await;
        if let Err(err) = auth {
            let _ = conn.close();
            return Err(match err {
                PoolError::Server(msg) => PoolError::Auth(msg),
                other => other,
            });
        }
    }

    if let Err(err) = conn
        .execute("SELECT", &[Bytes::from(database.to_string())])
        .await
    {
        debug!(database, error = %err, "SELECT failed, staying on the default database");
    }

    Ok(())
}

/// `PING`, reporting only whether it succeeded.
pub async fn ping<C: ClientConnection>(conn: &mut C) -> bool {
    match conn.execute("PING", &[]).await {
        Ok(_) => true,
        Err(err) => {
            debug!(error = %err, "Health check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const AUTH: &[u8] = b"*2\r\n$4\r\nAUTH\r\n$6\r\nsecret\r\n";
    const SELECT_0: &[u8] = b"*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n";

    #[tokio::test]
    async fn handshake_authenticates_then_selects() {
        let mock = Builder::new()
            .write(AUTH)
            .read(b"+OK\r\n")
            .write(SELECT_0)
            .read(b"+OK\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        handshake(&mut conn, "secret", 0).await.unwrap();
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn handshake_skips_auth_without_password() {
        let mock = Builder::new()
            .write(b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n")
            .read(b"+OK\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        handshake(&mut conn, "", 3).await.unwrap();
    }

    #[tokio::test]
    async fn handshake_rejected_auth_closes_connection() {
        let mock = Builder::new()
            .write(AUTH)
            .read(b"-WRONGPASS invalid username-password pair\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        let err = handshake(&mut conn, "secret", 0).await.unwrap_err();
        assert!(matches!(err, PoolError::Auth(ref msg) if msg.starts_with("WRONGPASS")));
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn handshake_ignores_select_failure() {
        let mock = Builder::new()
            .write(b"*2\r\n$6\r\nSELECT\r\n$2\r\n99\r\n")
            .read(b"-ERR DB index is out of range\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        handshake(&mut conn, "", 99).await.unwrap();
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn ping_reports_failure_as_false() {
        let mock = Builder::new()
            .write(b"*1\r\n$4\r\nPING\r\n")
            .read(b"+PONG\r\n")
            .write(b"*1\r\n$4\r\nPING\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        assert!(ping(&mut conn).await);
        assert!(!ping(&mut conn).await);
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn dial_refused_is_a_dial_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let factory = TcpConnectionFactory::new(&PoolConfig::new(addr, ""));
        let err = factory.dial().await.err().unwrap();
        assert!(matches!(err, PoolError::Dial(_)));
    }
}
