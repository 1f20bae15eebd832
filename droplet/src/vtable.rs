//! Backend vtable (C11): a named record of function pointers, one per
//! verb, modeled as an async trait with default "not supported"
//! implementations (spec.md §3/§4.9/§9 "Backend vtable with nullable
//! slots"). Backends are independent implementations of this interface,
//! not generalizations of one another — there is deliberately no shared
//! base implementation beyond the defaults.

use async_trait::async_trait;
use bitflags::bitflags;
use droplet_core::Dict;

use crate::error::DplError;
use crate::request::RequestState;
use crate::sysmd::SysMetadata;

bitflags! {
    /// Which verbs/capabilities a backend advertises. Distinct from "the
    /// vtable slot is null" (which any call can hit regardless of this
    /// flag set) — this is for callers that want to skip a codepath
    /// before even trying, e.g. to avoid building a doomed request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const STREAMING      = 1 << 0;
        const ID_ADDRESSING  = 1 << 1;
        const SIGNED_URLS    = 1 << 2;
        const VERSIONING     = 1 << 3;
        const ACL            = 1 << 4;
    }
}

/// One entry in a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub name: String,
    pub size: u64,
    pub last_modified: i64,
    pub etag: String,
}

/// One entry in a "list all my buckets" reply.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: i64,
}

/// The bytes and metadata returned by a `get`.
#[derive(Debug, Clone)]
pub struct GetOutcome {
    pub data: Vec<u8>,
    pub metadata: Dict,
    pub sysmd: SysMetadata,
}

/// The metadata returned by a `head`.
#[derive(Debug, Clone)]
pub struct HeadOutcome {
    pub metadata: Dict,
    pub sysmd: SysMetadata,
}

/// A redirect surfaced by a backend call, carrying the absolute URI the
/// dispatch layer must split and re-drive (spec.md §4.7 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

/// Either the verb's normal result or a redirect. Dispatch (C9) handles
/// the redirect case; vtable implementations never recurse themselves.
#[derive(Debug, Clone)]
pub enum VerbResult<T> {
    Done(T),
    Redirect(Redirect),
}

/// The per-backend vtable (spec.md §3 "Backend vtable", §4.9). Every
/// method defaults to `Err(DplError::Enotimpl)`: a backend "implements"
/// a verb purely by overriding it, the same way the original leaves a
/// function-pointer slot null.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    async fn login(&self) -> Result<(), DplError> {
        Err(DplError::Enotimpl)
    }

    /// Whether this backend addresses objects by path or by a
    /// backend-native id scheme (spec.md §4.6 "Object-id handling").
    fn get_id_scheme(&self) -> Result<&'static str, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn list_all_my_buckets(&self) -> Result<VerbResult<Vec<BucketEntry>>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn make_bucket(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn list_bucket(&self, _req: &RequestState) -> Result<VerbResult<Vec<ListEntry>>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn list_bucket_attrs(&self, _req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn delete_bucket(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn delete_all(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn delete_all_id(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn put(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn put_id(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn post(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn post_id(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn get(&self, _req: &RequestState) -> Result<VerbResult<GetOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn get_id(&self, _req: &RequestState) -> Result<VerbResult<GetOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn head(&self, _req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn head_id(&self, _req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn head_raw(&self, _req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn head_id_raw(&self, _req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn deletef(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn delete_id(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn copy(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn copy_id(&self, _req: &RequestState) -> Result<VerbResult<()>, DplError> {
        Err(DplError::Enotimpl)
    }

    fn genurl(&self, _req: &RequestState) -> Result<String, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_resume(&self, _req: &RequestState, _status: serde_json::Value) -> Result<(), DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_getmd(&self, _req: &RequestState) -> Result<HeadOutcome, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_get(&self, _req: &RequestState, _status: &serde_json::Value, _len: usize) -> Result<(Vec<u8>, serde_json::Value), DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_putmd(&self, _req: &RequestState) -> Result<(), DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_put(&self, _req: &RequestState, _status: &serde_json::Value, _buf: &[u8]) -> Result<serde_json::Value, DplError> {
        Err(DplError::Enotimpl)
    }

    async fn stream_flush(&self, _req: &RequestState) -> Result<(), DplError> {
        Err(DplError::Enotimpl)
    }
}
