//! Stream cursor (C10, spec.md §4.8): an object opened for either
//! reading or writing, carrying an opaque backend-defined resume status
//! (a JSON object, e.g. `{ "offset": N }`) instead of an implicit
//! position. Each backend implements `stream_*` however it likes — the
//! POSIX backend `pread`/`pwrite`s a file at the status's `offset` field.

use droplet_core::Dict;
use serde_json::Value;

use crate::condition::Condition;
use crate::context::Context;
use crate::error::DplError;
use crate::request::{Method, RequestState};
use crate::sysmd::SysMetadata;
use crate::vtable::HeadOutcome;

/// Whether a stream was opened for reading or writing. A stream is never
/// both (spec.md §3 "Stream" lifecycle: "used for either read or write,
/// not both").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
}

/// How the object is named: by path, or by a backend-native id. Only
/// backends that advertise an id scheme via [`crate::vtable::Backend::get_id_scheme`]
/// accept [`Locator::Id`] (spec.md §9 Open Question: POSIX keeps
/// `locator_is_id` not-supported, and no backend in this crate currently
/// implements id addressing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Path(String),
    Id(String),
}

/// A cursor over one object, bound to a context and a snapshot of
/// options/condition/metadata/sysmd taken at open time (spec.md §3).
pub struct Stream<'ctx> {
    ctx: &'ctx Context,
    mode: StreamMode,
    req: RequestState,
    status: Value,
}

impl<'ctx> Stream<'ctx> {
    /// Opens a stream bound to `(bucket, locator)`, snapshotting
    /// `metadata`/`sysmd`/`condition` onto the request the `stream_*`
    /// vtable calls will see (spec.md §4.8 "Open creates a stream...").
    pub async fn open(
        ctx: &'ctx Context,
        bucket: Option<String>,
        locator: Locator,
        mode: StreamMode,
        metadata: Dict,
        sysmd: SysMetadata,
        condition: Condition,
    ) -> Result<Self, DplError> {
        if let Locator::Id(_) = locator {
            ctx.backend.get_id_scheme()?;
        }

        let resource = match locator {
            Locator::Path(path) => path,
            Locator::Id(id) => id,
        };
        let method = match mode {
            StreamMode::Read => Method::Get,
            StreamMode::Write => Method::Put,
        };
        let mut req = RequestState::new(method, bucket, resource);
        req.metadata = metadata;
        req.sysmd = sysmd;
        req.condition = condition;

        Ok(Self { ctx, mode, req, status: Value::Object(serde_json::Map::new()) })
    }

    /// Re-installs an opaque resume token obtained from a prior `status()`
    /// call, e.g. after a process restart (spec.md §4.8 "resume(status)").
    pub async fn resume(&mut self, status: Value) -> Result<(), DplError> {
        self.ctx.backend.stream_resume(&self.req, status.clone()).await?;
        self.status = status;
        Ok(())
    }

    /// Fetches metadata via a `head_raw`-equivalent call (spec.md §4.8
    /// "getmd fetches metadata via a head_raw").
    pub async fn getmd(&self) -> Result<HeadOutcome, DplError> {
        self.ctx.backend.stream_getmd(&self.req).await
    }

    /// Updates metadata without touching the payload.
    pub async fn putmd(&self) -> Result<(), DplError> {
        self.ctx.backend.stream_putmd(&self.req).await
    }

    /// Reads up to `len` bytes at the current offset. On failure the
    /// stream's status is left at its last successful value, so a caller
    /// can retry via `resume` (spec.md §4.8 "Failure semantics").
    pub async fn get(&mut self, len: usize) -> Result<Vec<u8>, DplError> {
        if self.mode != StreamMode::Read {
            return Err(DplError::Einval);
        }
        let (data, status) = self.ctx.backend.stream_get(&self.req, &self.status, len).await?;
        self.status = status;
        Ok(data)
    }

    /// Writes `buf` at the current offset.
    pub async fn put(&mut self, buf: &[u8]) -> Result<(), DplError> {
        if self.mode != StreamMode::Write {
            return Err(DplError::Einval);
        }
        let status = self.ctx.backend.stream_put(&self.req, &self.status, buf).await?;
        self.status = status;
        Ok(())
    }

    /// Advisory flush; not required for correctness (spec.md §4.8 "flush
    /// is advisory").
    pub async fn flush(&self) -> Result<(), DplError> {
        self.ctx.backend.stream_flush(&self.req).await
    }

    /// The current opaque resume token, suitable for later `resume`.
    #[must_use]
    pub fn status(&self) -> &Value {
        &self.status
    }

    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn id_locator_rejected_when_backend_has_no_id_scheme() {
        let mut profile = Profile::test_default();
        profile.backend = "posix".to_string();
        profile.host = "127.0.0.1".to_string();
        let ctx = Context::new(profile).unwrap();

        let err = Stream::open(&ctx, None, Locator::Id("deadbeef".to_string()), StreamMode::Read, Dict::default(), SysMetadata::new(), Condition::new())
            .await
            .unwrap_err();
        assert_eq!(err, DplError::Enotimpl);
    }

    #[rstest]
    #[tokio::test]
    async fn write_stream_rejects_get() {
        let mut profile = Profile::test_default();
        profile.backend = "posix".to_string();
        profile.host = "127.0.0.1".to_string();
        let ctx = Context::new(profile).unwrap();

        let mut stream = Stream::open(
            &ctx,
            None,
            Locator::Path("/tmp/droplet-stream-test-object".to_string()),
            StreamMode::Write,
            Dict::default(),
            SysMetadata::new(),
            Condition::new(),
        )
        .await
        .unwrap();
        assert_eq!(stream.get(16).await, Err(DplError::Einval));
    }
}
