//! Connection pool (C3): connections keyed by `(address, port)`, with a
//! per-connection hit cap, idle-eviction, and a plaintext-or-TLS
//! transport behind a single trait object so the rest of the pipeline
//! does not care which one it has.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool is at capacity ({0} connections)")]
    Exhausted(usize),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("write timed out")]
    WriteTimeout,
}

/// Object-safe combination of `AsyncRead + AsyncWrite`, used to erase the
/// plaintext/TLS distinction once a connection is established.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// An owned or pool-held connection. Owned by the pool while idle, by the
/// caller while checked out; never both (spec invariant).
pub struct Connection {
    pub key: SocketAddr,
    pub transport: Box<dyn Transport>,
    pub read_buf: Vec<u8>,
    pub read_pos: usize,
    pub start_time: Instant,
    pub close_time: Option<Instant>,
    pub hit_count: u32,
    pub eof: bool,
}

impl Connection {
    /// Writes `bufs` concatenated as a single buffer within `write_timeout`.
    /// Plaintext and TLS connections are treated identically here: a
    /// single contiguous buffer and one write call, matching the
    /// original's TLS path (the original's plaintext path loops `writev`
    /// over short writes; `write_all` already does this for us).
    pub async fn writev_all(&mut self, bufs: &[&[u8]], write_timeout: Duration) -> Result<(), PoolError> {
        let mut combined = Vec::with_capacity(bufs.iter().map(|b| b.len()).sum());
        for b in bufs {
            combined.extend_from_slice(b);
        }
        timeout(write_timeout, self.transport.write_all(&combined))
            .await
            .map_err(|_| PoolError::WriteTimeout)??;
        Ok(())
    }
}

/// Pool sizing configuration: global connection cap, per-connection hit
/// cap before mandatory close, and maximum idle seconds before lazy close.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_hits: u32,
    pub idle_time: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 512,
            max_hits: 10_000,
            idle_time: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct Buckets {
    idle: HashMap<SocketAddr, Vec<Connection>>,
}

/// Fixed-capacity, key-hashed pool of connections. See spec.md §4.3 for
/// the exact open/release/terminate algorithm this implements.
pub struct ConnectionPool {
    config: PoolConfig,
    buckets: Mutex<Buckets>,
    open_count: AtomicUsize,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            buckets: Mutex::new(Buckets { idle: HashMap::new() }),
            open_count: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Takes an idle connection matching `addr` if one exists and is
    /// still usable (hit count and idle age within configured caps); it
    /// is destroyed (dropped, not returned) otherwise.
    fn take_idle(&self, addr: SocketAddr) -> Option<Connection> {
        let mut buckets = self.buckets.lock().expect("pool mutex poisoned");
        let list = buckets.idle.get_mut(&addr)?;
        while let Some(mut conn) = list.pop() {
            let idle_for = conn.close_time.map(|t| t.elapsed()).unwrap_or_default();
            if conn.hit_count < self.config.max_hits && idle_for < self.config.idle_time {
                conn.hit_count += 1;
                conn.close_time = None;
                self.open_count.fetch_add(0, Ordering::SeqCst); // no-op, already counted
                return Some(conn);
            }
            self.open_count.fetch_sub(1, Ordering::SeqCst);
            // conn dropped here, closing the transport.
        }
        None
    }

    /// Establishes (or reuses from idle) a connection to `addr`.
    pub async fn open(&self, addr: SocketAddr, connector: &dyn Connector) -> Result<Connection, PoolError> {
        if let Some(conn) = self.take_idle(addr) {
            return Ok(conn);
        }

        if self.open_count.load(Ordering::SeqCst) >= self.config.max_connections {
            return Err(PoolError::Exhausted(self.config.max_connections));
        }

        let tcp = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PoolError::ConnectTimeout)??;
        tcp.set_nodelay(true).ok();

        let transport = connector.connect(tcp, addr).await?;

        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(Connection {
            key: addr,
            transport,
            read_buf: Vec::with_capacity(8192),
            read_pos: 0,
            start_time: Instant::now(),
            close_time: None,
            hit_count: 1,
            eof: false,
        })
    }

    /// Returns a checked-out connection to the idle pool.
    pub fn release(&self, mut conn: Connection) {
        conn.close_time = Some(Instant::now());
        let key = conn.key;
        let mut buckets = self.buckets.lock().expect("pool mutex poisoned");
        buckets.idle.entry(key).or_default().push(conn);
    }

    /// Drops a checked-out connection without returning it to the pool
    /// (used after any I/O error, per spec.md §4.3 failure policy).
    pub fn terminate(&self, conn: Connection) {
        drop(conn);
        self.open_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Establishes the transport for a freshly connected TCP socket —
/// plaintext passthrough or a TLS handshake. Kept as a trait so the pool
/// itself stays agnostic to the TLS collaborator in use (spec.md's
/// OpenSSL/TLS I/O is an external collaborator; here that collaborator is
/// `tokio-rustls`).
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, tcp: TcpStream, addr: SocketAddr) -> Result<Box<dyn Transport>, PoolError>;
}

/// A connector that never upgrades to TLS.
pub struct PlaintextConnector;

#[async_trait::async_trait]
impl Connector for PlaintextConnector {
    async fn connect(&self, tcp: TcpStream, _addr: SocketAddr) -> Result<Box<dyn Transport>, PoolError> {
        Ok(Box::new(tcp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_count_tracks_allocated_minus_terminated() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let pool = ConnectionPool::new(PoolConfig::default());
        let conn = pool.open(addr, &PlaintextConnector).await.unwrap();
        assert_eq!(pool.open_count(), 1);
        pool.terminate(conn);
        assert_eq!(pool.open_count(), 0);
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let pool = ConnectionPool::new(PoolConfig::default());
        let conn = pool.open(addr, &PlaintextConnector).await.unwrap();
        assert_eq!(pool.open_count(), 1);
        pool.release(conn);
        let reused = pool.open(addr, &PlaintextConnector).await.unwrap();
        assert_eq!(reused.hit_count, 2);
        assert_eq!(pool.open_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_rejects_new_connections() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let mut config = PoolConfig::default();
        config.max_connections = 1;
        let pool = ConnectionPool::new(config);
        let _conn = pool.open(addr, &PlaintextConnector).await.unwrap();
        let err = pool.open(addr, &PlaintextConnector).await;
        assert!(matches!(err, Err(PoolError::Exhausted(1))));
    }
}
