//! Droplet: a unified client library for cloud and object storage
//! systems (S3-compatible REST, CDMI, Scality sproxyd, Scality SRWS,
//! OpenStack Swift, and local POSIX) behind one dispatch API.
//!
//! The request pipeline and backend dispatch subsystem is the core of
//! this crate: [`dispatch`] exposes the public per-verb surface, routed
//! through the [`vtable::Backend`] trait that each backend in
//! [`backend`] implements. [`context::Context`] aggregates a profile, the
//! selected backend, the endpoint list, and the connection pool.

pub mod backend;
pub mod condition;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ntinydb;
pub mod request;
pub mod signer;
pub mod stream;
pub mod sysmd;
pub mod uks;
pub mod vtable;

pub use config::{Profile, ProfileFile};
pub use context::Context;
pub use error::DplError;
pub use request::{Method, RequestState};
pub use stream::{Locator, Stream, StreamMode};
pub use vtable::{Backend, BucketEntry, Capabilities, GetOutcome, HeadOutcome, ListEntry, Redirect, VerbResult};
