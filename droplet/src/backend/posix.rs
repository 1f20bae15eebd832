//! POSIX backend (C12): maps the vtable directly onto local filesystem
//! syscalls (spec.md §4.10's local storage backend). No HTTP, no
//! signing, no connection pool — the vtable's proof that a completely
//! different implementation strategy fits the same interface as the
//! REST backends.

use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use droplet_core::Dict;

use crate::error::DplError;
use crate::request::{CopyDirective, RequestState};
use crate::sysmd::{FileType, SysMdMask, SysMetadata};
use crate::vtable::{Backend, BucketEntry, Capabilities, GetOutcome, HeadOutcome, ListEntry, VerbResult};

const XATTR_PREFIX: &str = "user.droplet.";

/// Local filesystem storage: a bucket is a directory, an object a file
/// beneath it, user metadata lives in extended attributes.
pub struct PosixBackend;

impl PosixBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PosixBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn resource_path(req: &RequestState) -> Result<PathBuf, DplError> {
    if req.resource.is_empty() {
        return Err(DplError::Einval);
    }
    let resource = req.resource.trim_start_matches('/');
    match &req.bucket {
        Some(bucket) => Ok(PathBuf::from(bucket).join(resource)),
        None => Ok(PathBuf::from(resource)),
    }
}

fn map_io_err(e: std::io::Error) -> DplError {
    e.into()
}

fn stat_to_sysmd(meta: &std::fs::Metadata) -> SysMetadata {
    let mut sysmd = SysMetadata::new();
    sysmd.set_size(meta.len());
    sysmd.set_mtime(meta.mtime());
    sysmd.set_atime(meta.atime());
    sysmd.ctime = meta.ctime();
    sysmd.mask |= SysMdMask::CTIME;
    sysmd.owner = meta.uid().to_string();
    sysmd.mask |= SysMdMask::OWNER;
    sysmd.group = meta.gid().to_string();
    sysmd.mask |= SysMdMask::GROUP;
    let ftype = if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::Regular
    };
    sysmd.set_ftype(ftype);
    sysmd
}

fn read_user_metadata(path: &Path) -> Result<Dict, DplError> {
    let mut dict = Dict::default();
    let names = match xattr::list(path) {
        Ok(n) => n,
        Err(e) => return Err(map_io_err(e)),
    };
    for name in names {
        let name_str = name.to_string_lossy();
        let Some(key) = name_str.strip_prefix(XATTR_PREFIX) else {
            continue;
        };
        if let Some(value) = xattr::get(path, &name).map_err(map_io_err)? {
            dict.add(key, value, false);
        }
    }
    Ok(dict)
}

fn write_user_metadata(path: &Path, metadata: &Dict) -> Result<(), DplError> {
    for (k, v) in metadata.iter() {
        if let Some(s) = v.as_str() {
            xattr::set(path, format!("{XATTR_PREFIX}{k}"), s.as_bytes()).map_err(map_io_err)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for PosixBackend {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::STREAMING
    }

    async fn put(&self, req: &RequestState) -> Result<VerbResult<()>, DplError> {
        if req.range_enabled {
            // spec.md §9 Open Question: the original's `range_len = start
            // - end` is negative for any well-formed range (start <= end);
            // reject rather than reproduce the bug. Confirmed against
            // dpl_posix_get in addition to dpl_posix_put, so both paths
            // reject here.
            return Err(DplError::Einval);
        }
        let path = resource_path(req)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(map_io_err)?;
            }
        }
        let data = req.data.as_deref().unwrap_or(&[]);
        std::fs::write(&path, data).map_err(map_io_err)?;
        write_user_metadata(&path, &req.metadata)?;
        Ok(VerbResult::Done(()))
    }

    async fn get(&self, req: &RequestState) -> Result<VerbResult<GetOutcome>, DplError> {
        if req.range_enabled {
            return Err(DplError::Einval);
        }
        let path = resource_path(req)?;
        let meta = std::fs::symlink_metadata(&path).map_err(map_io_err)?;
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path).map_err(map_io_err)?;
            return Ok(VerbResult::Redirect(crate::vtable::Redirect {
                location: target.to_string_lossy().to_string(),
            }));
        }
        if meta.is_dir() {
            return Err(DplError::Eisdir);
        }
        let data = std::fs::read(&path).map_err(map_io_err)?;
        let metadata = read_user_metadata(&path)?;
        let sysmd = stat_to_sysmd(&meta);
        Ok(VerbResult::Done(GetOutcome { data, metadata, sysmd }))
    }

    async fn head(&self, req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        self.head_raw(req).await
    }

    async fn head_raw(&self, req: &RequestState) -> Result<VerbResult<HeadOutcome>, DplError> {
        let path = resource_path(req)?;
        let meta = std::fs::metadata(&path).map_err(map_io_err)?;
        let metadata = read_user_metadata(&path)?;
        let sysmd = stat_to_sysmd(&meta);
        Ok(VerbResult::Done(HeadOutcome { metadata, sysmd }))
    }

    async fn deletef(&self, req: &RequestState) -> Result<VerbResult<()>, DplError> {
        let path = resource_path(req)?;
        let meta = std::fs::symlink_metadata(&path).map_err(map_io_err)?;
        if meta.is_dir() {
            std::fs::remove_dir(&path).map_err(map_io_err)?;
        } else {
            std::fs::remove_file(&path).map_err(map_io_err)?;
        }
        Ok(VerbResult::Done(()))
    }

    async fn make_bucket(&self, req: &RequestState) -> Result<VerbResult<()>, DplError> {
        let bucket = req.bucket.as_ref().ok_or(DplError::Einval)?;
        std::fs::create_dir_all(bucket).map_err(map_io_err)?;
        Ok(VerbResult::Done(()))
    }

    async fn delete_bucket(&self, req: &RequestState) -> Result<VerbResult<()>, DplError> {
        let bucket = req.bucket.as_ref().ok_or(DplError::Einval)?;
        std::fs::remove_dir(bucket).map_err(map_io_err)?;
        Ok(VerbResult::Done(()))
    }

    async fn list_all_my_buckets(&self) -> Result<VerbResult<Vec<BucketEntry>>, DplError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(".").map_err(map_io_err)? {
            let entry = entry.map_err(map_io_err)?;
            let meta = entry.metadata().map_err(map_io_err)?;
            if !meta.is_dir() {
                continue;
            }
            let ctime = meta.ctime();
            out.push(BucketEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                creation_date: ctime,
            });
        }
        Ok(VerbResult::Done(out))
    }

    async fn list_bucket(&self, req: &RequestState) -> Result<VerbResult<Vec<ListEntry>>, DplError> {
        // The original only supports the "/" delimiter for directory
        // listings; any other delimiter request is declined up front.
        if let Some(sub) = &req.subresource {
            if sub.contains("delimiter=") && !sub.contains("delimiter=%2F") && !sub.contains("delimiter=/") {
                return Err(DplError::Enotimpl);
            }
        }
        let bucket = req.bucket.as_deref().unwrap_or(".");
        let dir = if req.resource.is_empty() || req.resource == "/" {
            PathBuf::from(bucket)
        } else {
            PathBuf::from(bucket).join(req.resource.trim_start_matches('/'))
        };
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(map_io_err)? {
            let entry = entry.map_err(map_io_err)?;
            let meta = entry.metadata().map_err(map_io_err)?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            out.push(ListEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                size: meta.len(),
                last_modified: mtime,
                etag: String::new(),
            });
        }
        Ok(VerbResult::Done(out))
    }

    async fn copy(&self, req: &RequestState) -> Result<VerbResult<()>, DplError> {
        let src = req.source.as_ref().ok_or(DplError::Einval)?;
        let src_path = match &src.bucket {
            Some(b) => PathBuf::from(b).join(src.resource.trim_start_matches('/')),
            None => PathBuf::from(src.resource.trim_start_matches('/')),
        };
        let dst_path = resource_path(req)?;
        match req.copy_directive {
            Some(CopyDirective::Move) => {
                std::fs::rename(&src_path, &dst_path).map_err(map_io_err)?;
            }
            Some(CopyDirective::MkDent) | Some(CopyDirective::RmDent) | Some(CopyDirective::MvDent) => {
                // spec.md §9 Open Question: these are backend-specific
                // directory-entry directives with no POSIX equivalent.
                return Err(DplError::Enotimpl);
            }
            _ => {
                std::fs::copy(&src_path, &dst_path).map_err(map_io_err)?;
            }
        }
        Ok(VerbResult::Done(()))
    }

    async fn stream_getmd(&self, req: &RequestState) -> Result<HeadOutcome, DplError> {
        match self.head_raw(req).await? {
            VerbResult::Done(outcome) => Ok(outcome),
            VerbResult::Redirect(_) => Err(DplError::Eredirect),
        }
    }

    async fn stream_get(
        &self,
        req: &RequestState,
        status: &serde_json::Value,
        len: usize,
    ) -> Result<(Vec<u8>, serde_json::Value), DplError> {
        let path = resource_path(req)?;
        let offset = status.get("offset").and_then(serde_json::Value::as_u64).unwrap_or(0);
        let mut file = std::fs::File::open(&path).map_err(map_io_err)?;
        file.seek(SeekFrom::Start(offset)).map_err(map_io_err)?;
        let mut buf = vec![0u8; len];
        let n = file.read(&mut buf).map_err(map_io_err)?;
        buf.truncate(n);
        let new_status = serde_json::json!({ "offset": offset + n as u64 });
        Ok((buf, new_status))
    }

    async fn stream_putmd(&self, req: &RequestState) -> Result<(), DplError> {
        let path = resource_path(req)?;
        write_user_metadata(&path, &req.metadata)
    }

    async fn stream_put(&self, req: &RequestState, status: &serde_json::Value, buf: &[u8]) -> Result<serde_json::Value, DplError> {
        let path = resource_path(req)?;
        let offset = status.get("offset").and_then(serde_json::Value::as_u64).unwrap_or(0);
        let mut file = std::fs::OpenOptions::new().write(true).create(true).open(&path).map_err(map_io_err)?;
        file.seek(SeekFrom::Start(offset)).map_err(map_io_err)?;
        file.write_all(buf).map_err(map_io_err)?;
        Ok(serde_json::json!({ "offset": offset + buf.len() as u64 }))
    }

    async fn stream_flush(&self, _req: &RequestState) -> Result<(), DplError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use rstest::rstest;
    use tempfile::TempDir;

    fn req_in(dir: &TempDir, method: Method, resource: &str) -> RequestState {
        RequestState::new(method, None, format!("{}/{resource}", dir.path().to_string_lossy()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_data_and_metadata() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();

        let mut put_req = req_in(&dir, Method::Put, "o");
        put_req.set_data(b"hello world".to_vec());
        put_req.metadata.add("owner", "alice", false);
        let VerbResult::Done(()) = backend.put(&put_req).await.unwrap() else {
            panic!("expected Done");
        };

        let get_req = req_in(&dir, Method::Get, "o");
        let VerbResult::Done(outcome) = backend.get(&get_req).await.unwrap() else {
            panic!("expected Done");
        };
        assert_eq!(outcome.data, b"hello world");
        assert_eq!(outcome.metadata.get("owner").and_then(|v| v.as_str()), Some("alice"));
        assert!(outcome.sysmd.has(SysMdMask::SIZE));
        assert_eq!(outcome.sysmd.size, 11);
    }

    #[rstest]
    #[tokio::test]
    async fn range_enabled_get_is_rejected_as_einval() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();
        let mut req = req_in(&dir, Method::Put, "o");
        req.set_data(b"12345".to_vec());
        backend.put(&req).await.unwrap();

        let mut get_req = req_in(&dir, Method::Get, "o");
        get_req.set_range(0, 2);
        assert_eq!(backend.get(&get_req).await.unwrap_err(), DplError::Einval);
    }

    #[rstest]
    #[tokio::test]
    async fn range_enabled_put_is_rejected_as_einval() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();
        let mut req = req_in(&dir, Method::Put, "o");
        req.set_data(b"12345".to_vec());
        req.set_range(0, 2);
        assert_eq!(backend.put(&req).await.unwrap_err(), DplError::Einval);
    }

    #[tokio::test]
    async fn head_missing_object_is_enoent() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();
        let req = req_in(&dir, Method::Head, "missing");
        assert_eq!(backend.head(&req).await.unwrap_err(), DplError::Enoent);
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();
        let mut put_req = req_in(&dir, Method::Put, "o");
        put_req.set_data(b"x".to_vec());
        backend.put(&put_req).await.unwrap();

        let del_req = req_in(&dir, Method::Delete, "o");
        backend.deletef(&del_req).await.unwrap();
        assert!(!dir.path().join("o").exists());
    }

    #[tokio::test]
    async fn stream_get_advances_offset_across_calls() {
        let dir = TempDir::new().unwrap();
        let backend = PosixBackend::new();
        let mut put_req = req_in(&dir, Method::Put, "o");
        put_req.set_data(b"0123456789".to_vec());
        backend.put(&put_req).await.unwrap();

        let get_req = req_in(&dir, Method::Get, "o");
        let status0 = serde_json::json!({});
        let (chunk0, status1) = backend.stream_get(&get_req, &status0, 4).await.unwrap();
        assert_eq!(chunk0, b"0123");
        assert_eq!(status1["offset"], 4);
        let (chunk1, status2) = backend.stream_get(&get_req, &status1, 4).await.unwrap();
        assert_eq!(chunk1, b"4567");
        assert_eq!(status2["offset"], 8);
    }
}
