//! Transport-level building blocks shared by every Droplet backend:
//! connection pooling, HTTP reply parsing, TLS, retry pacing and
//! per-key rate limiting. None of this module knows about buckets,
//! resources, or any particular storage provider's wire format — that
//! lives in the `droplet` crate, layered on top.

pub mod backoff;
pub mod pool;
pub mod ratelimiter;
pub mod reply;
pub mod tls;

pub use backoff::ExponentialBackoff;
pub use pool::{Connection, ConnectionPool, Connector, PlaintextConnector, PoolConfig, PoolError};
pub use ratelimiter::quota::Quota;
pub use ratelimiter::{RateLimited, RateLimiter};
pub use reply::{ReplyError, ReplyHead, ReplyHeader, ReplyReader};
pub use tls::TlsConnector;
