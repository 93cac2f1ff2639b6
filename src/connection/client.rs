//! Client Connection
//!
//! A single connection to the server, speaking RESP2. The pool only sees the
//! [`ClientConnection`] trait; [`RespConnection`] is the production
//! implementation and works over any async byte stream, which keeps it
//! testable against in-memory mocks.
//!
//! ## Buffering Model
//!
//! ```text
//!   send()      ──> write_buf (pending += 1)
//!   flush()     ──> write_buf ──> socket
//!   receive()   <── read_buf  <── socket        (pending -= 1)
//!   execute()   = send + flush + receive every pending reply
//! ```
//!
//! Any I/O or protocol failure poisons the connection: the stream is dropped,
//! `is_alive()` turns false and the pool discards it on release.
//!
//! An operation whose future is dropped before it completes (for example by
//! `tokio::time::timeout`) leaves the connection marked in flight. The
//! request/reply stream can no longer be trusted, so the connection reports
//! itself dead and the next operation closes it.

use crate::error::{PoolError, PoolResult};
use crate::protocol::{encode_command, RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// The operations the pool and its callers need from a server connection.
#[async_trait]
pub trait ClientConnection: Send + 'static {
    /// Sends a command and waits for its reply.
    ///
    /// Replies to commands buffered with [`send`](Self::send) are read and
    /// discarded first. An empty `name` flushes and returns all pending
    /// replies as one array instead.
    async fn execute(&mut self, name: &str, args: &[Bytes]) -> PoolResult<RespValue>;

    /// Buffers a command without flushing it.
    async fn send(&mut self, name: &str, args: &[Bytes]) -> PoolResult<()>;

    /// Writes buffered commands to the server.
    async fn flush(&mut self) -> PoolResult<()>;

    /// Reads a single reply.
    async fn receive(&mut self) -> PoolResult<RespValue>;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&mut self) -> PoolResult<()>;

    /// False once the connection is closed, has failed, or was abandoned
    /// mid-operation.
    fn is_alive(&self) -> bool;

    /// True when no replies are owed and no commands wait for a flush.
    /// The pool only keeps idle connections that are alive and idle.
    fn is_idle(&self) -> bool;
}

/// RESP2 connection over an async byte stream.
pub struct RespConnection<S> {
    /// `None` once closed or poisoned
    stream: Option<S>,

    /// Bytes read from the server and not yet parsed
    read_buf: BytesMut,

    /// Encoded commands waiting for a flush
    write_buf: Vec<u8>,

    parser: RespParser,

    /// Replies owed by the server for commands already sent
    pending: usize,

    /// Set while an awaiting operation runs, cleared when it completes
    in_flight: bool,
}

impl<S> RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_buf: Vec::with_capacity(256),
            parser: RespParser::new(),
            pending: 0,
            in_flight: false,
        }
    }

    /// Number of replies the server still owes.
    pub fn pending(&self) -> usize {
        self.pending
    }

    fn ensure_open(&mut self) -> PoolResult<()> {
        if self.in_flight {
            trace!("Previous operation was cancelled, closing connection");
            self.shutdown();
        }
        if self.stream.is_some() {
            Ok(())
        } else {
            Err(PoolError::ConnectionClosed)
        }
    }

    /// Marks the start of an operation that awaits the socket.
    fn begin(&mut self) -> PoolResult<()> {
        self.ensure_open()?;
        self.in_flight = true;
        Ok(())
    }

    /// Marks the operation complete and poisons on fatal errors.
    fn finish<T>(&mut self, result: PoolResult<T>) -> PoolResult<T> {
        self.in_flight = false;
        self.check(result)
    }

    /// Drops the stream when `result` carries a connection-fatal error.
    fn check<T>(&mut self, result: PoolResult<T>) -> PoolResult<T> {
        if let Err(err) = &result {
            if err.is_connection_fatal() && self.stream.is_some() {
                trace!(error = %err, "Connection poisoned");
                self.shutdown();
            }
        }
        result
    }

    fn shutdown(&mut self) {
        self.stream = None;
        self.pending = 0;
        self.in_flight = false;
        self.read_buf.clear();
        self.write_buf.clear();
    }

    fn buffer_command(&mut self, name: &str, args: &[Bytes]) {
        encode_command(name, args, &mut self.write_buf);
        self.pending += 1;
    }

    async fn write_pending(&mut self) -> PoolResult<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(PoolError::ConnectionClosed)?;
        stream.write_all(&self.write_buf).await?;
        stream.flush().await?;
        trace!(bytes = self.write_buf.len(), "Flushed commands");
        self.write_buf.clear();
        Ok(())
    }

    async fn read_reply(&mut self) -> PoolResult<RespValue> {
        loop {
            if !self.read_buf.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.read_buf)? {
                    self.read_buf.advance(consumed);
                    return Ok(value);
                }
            }

            if self.read_buf.capacity() - self.read_buf.len() < 1024 {
                self.read_buf.reserve(INITIAL_BUFFER_SIZE);
            }

            let stream = self.stream.as_mut().ok_or(PoolError::ConnectionClosed)?;
            let n = stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(PoolError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            trace!(bytes = n, "Read data");
        }
    }

    async fn execute_inner(&mut self, name: &str, args: &[Bytes]) -> PoolResult<RespValue> {
        if name.is_empty() {
            self.write_pending().await?;
            let mut replies = Vec::with_capacity(self.pending);
            while self.pending > 0 {
                self.pending -= 1;
                replies.push(self.read_reply().await?);
            }
            return Ok(RespValue::Array(replies));
        }

        self.buffer_command(name, args);
        self.write_pending().await?;

        // The last reply belongs to this command; earlier ones answer
        // buffered sends. The first error reply wins.
        let mut reply = RespValue::Null;
        let mut server_error = None;
        while self.pending > 0 {
            self.pending -= 1;
            reply = self.read_reply().await?;
            if let RespValue::Error(msg) = &reply {
                server_error.get_or_insert_with(|| msg.clone());
            }
        }

        match server_error {
            Some(msg) => Err(PoolError::Server(msg)),
            None => Ok(reply),
        }
    }

    async fn receive_inner(&mut self) -> PoolResult<RespValue> {
        self.write_pending().await?;
        let reply = self.read_reply().await?;
        self.pending = self.pending.saturating_sub(1);
        match reply {
            RespValue::Error(msg) => Err(PoolError::Server(msg)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl<S> ClientConnection for RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn execute(&mut self, name: &str, args: &[Bytes]) -> PoolResult<RespValue> {
        self.begin()?;
        let result = self.execute_inner(name, args).await;
        self.finish(result)
    }

    async fn send(&mut self, name: &str, args: &[Bytes]) -> PoolResult<()> {
        self.ensure_open()?;
        self.buffer_command(name, args);
        Ok(())
    }

    async fn flush(&mut self) -> PoolResult<()> {
        self.begin()?;
        let result = self.write_pending().await;
        self.finish(result)
    }

    async fn receive(&mut self) -> PoolResult<RespValue> {
        self.begin()?;
        let result = self.receive_inner().await;
        self.finish(result)
    }

    fn close(&mut self) -> PoolResult<()> {
        // Dropping the stream closes the socket.
        self.shutdown();
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.stream.is_some() && !self.in_flight
    }

    fn is_idle(&self) -> bool {
        self.pending == 0 && self.write_buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn args(items: &[&'static str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let mock = Builder::new()
            .write(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .read(b"+OK\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        let reply = conn.execute("SET", &args(&["name", "Ariz"])).await.unwrap();
        assert_eq!(reply, RespValue::ok());
        assert!(conn.is_alive());
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let mock = Builder::new()
            .write(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .read(b"$4\r\nAr")
            .read(b"iz\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        let reply = conn.execute("GET", &args(&["name"])).await.unwrap();
        assert_eq!(reply, RespValue::bulk_string(Bytes::from("Ariz")));
    }

    #[tokio::test]
    async fn test_error_reply_keeps_connection_alive() {
        let mock = Builder::new()
            .write(b"*1\r\n$3\r\nFOO\r\n")
            .read(b"-ERR unknown command 'FOO'\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        let err = conn.execute("FOO", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::Server(ref msg) if msg == "ERR unknown command 'FOO'"));
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn test_send_flush_receive_pipeline() {
        let mock = Builder::new()
            .write(b"*2\r\n$4\r\nINCR\r\n$1\r\na\r\n*2\r\n$4\r\nINCR\r\n$1\r\nb\r\n")
            .read(b":1\r\n:7\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        conn.send("INCR", &args(&["a"])).await.unwrap();
        conn.send("INCR", &args(&["b"])).await.unwrap();
        assert_eq!(conn.pending(), 2);
        conn.flush().await.unwrap();

        assert_eq!(conn.receive().await.unwrap(), RespValue::Integer(1));
        assert_eq!(conn.receive().await.unwrap(), RespValue::Integer(7));
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn test_execute_discards_pending_replies() {
        let mock = Builder::new()
            .write(b"*2\r\n$4\r\nINCR\r\n$1\r\na\r\n*1\r\n$4\r\nPING\r\n")
            .read(b":1\r\n+PONG\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        conn.send("INCR", &args(&["a"])).await.unwrap();
        let reply = conn.execute("PING", &[]).await.unwrap();
        assert_eq!(reply, RespValue::pong());
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_execute_collects_pending() {
        let mock = Builder::new()
            .write(b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .read(b"+PONG\r\n$-1\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        conn.send("PING", &[]).await.unwrap();
        conn.send("GET", &args(&["k"])).await.unwrap();
        let reply = conn.execute("", &[]).await.unwrap();
        assert_eq!(
            reply,
            RespValue::array(vec![RespValue::pong(), RespValue::Null])
        );
    }

    #[tokio::test]
    async fn test_eof_poisons_connection() {
        let mock = Builder::new().write(b"*1\r\n$4\r\nPING\r\n").build();
        let mut conn = RespConnection::new(mock);

        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::Io(_)));
        assert!(!conn.is_alive());

        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_protocol_error_poisons_connection() {
        let mock = Builder::new()
            .write(b"*1\r\n$4\r\nPING\r\n")
            .read(b"?garbage\r\n")
            .build();
        let mut conn = RespConnection::new(mock);

        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::Protocol(_)));
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = Builder::new().build();
        let mut conn = RespConnection::new(mock);

        assert!(conn.close().is_ok());
        assert!(conn.close().is_ok());
        assert!(!conn.is_alive());
        assert!(matches!(
            conn.send("PING", &[]).await,
            Err(PoolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_execute_is_not_reused() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = RespConnection::new(client);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            conn.execute("GET", &args(&["k"])),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!conn.is_alive());

        // The late reply must never be handed to the next command.
        server.write_all(b"$5\r\nstale\r\n").await.unwrap();
        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::ConnectionClosed));
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_cancelled_receive_is_not_reused() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut conn = RespConnection::new(client);

        conn.send("GET", &args(&["k"])).await.unwrap();
        conn.flush().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(20), conn.receive())
            .await
            .is_err());

        assert!(!conn.is_alive());
        assert!(matches!(
            conn.receive().await,
            Err(PoolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_idle_only_without_outstanding_replies() {
        let mock = Builder::new()
            .write(b"*1\r\n$4\r\nPING\r\n")
            .read(b"+PONG\r\n")
            .build();
        let mut conn = RespConnection::new(mock);
        assert!(conn.is_idle());

        conn.send("PING", &[]).await.unwrap();
        assert!(!conn.is_idle());
        conn.flush().await.unwrap();
        assert!(!conn.is_idle());
        conn.receive().await.unwrap();
        assert!(conn.is_idle());
        assert!(conn.is_alive());
    }
}
