//! OpenStack Swift backend: metadata on `X-Object-Meta-*`/
//! `X-Container-Meta-*`, restricted `Content-Type` (spec.md §4.5, "Swift"
//! bullet).

use droplet_core::Dict;
use serde::Deserialize;

use crate::backend::{self, CONTAINER_META_PREFIX, OBJECT_META_PREFIX};
use crate::config::Profile;
use crate::error::DplError;
use crate::request::{Method, RequestState};
use crate::signer::{condition_headers, format_range};
use crate::sysmd::SysMetadata;
use crate::vtable::{BucketEntry, ListEntry};

#[derive(Debug, Deserialize)]
struct SwiftObjectEntry {
    name: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    last_modified: String,
    #[serde(default)]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct SwiftContainerEntry {
    name: String,
}

/// Parses a Swift `?format=json` object listing (spec.md §3 vtable
/// `list_bucket`; Swift has no equivalent of S3's XML listing, it
/// returns JSON by request).
fn parse_object_listing(body: &[u8]) -> Result<Vec<ListEntry>, DplError> {
    let entries: Vec<SwiftObjectEntry> = serde_json::from_slice(body).map_err(|_| DplError::Einval)?;
    Ok(entries
        .into_iter()
        .map(|e| ListEntry {
            name: e.name,
            size: e.bytes,
            last_modified: chrono::DateTime::parse_from_rfc3339(&e.last_modified).map(|d| d.timestamp()).unwrap_or(0),
            etag: e.hash,
        })
        .collect())
}

/// Parses a Swift account-level `?format=json` container listing
/// (spec.md §3 vtable `list_all_my_buckets`). Swift's container listing
/// carries no creation timestamp, unlike S3's `ListAllMyBucketsResult`;
/// `creation_date` is left at 0.
fn parse_container_listing(body: &[u8]) -> Result<Vec<BucketEntry>, DplError> {
    let entries: Vec<SwiftContainerEntry> = serde_json::from_slice(body).map_err(|_| DplError::Einval)?;
    Ok(entries.into_iter().map(|e| BucketEntry { name: e.name, creation_date: 0 }).collect())
}

/// Whether `resource` names a container (bucket) rather than an object:
/// a single path segment with no further `/`.
fn is_container_resource(resource: &str) -> bool {
    resource.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).count() <= 1
}

/// Lowers a request into Swift headers. `Content-Type` is forced to
/// `application/json` for anything other than a plain GET, which Swift
/// accepts as the generic wildcard (spec.md §4.5).
pub fn build_request(req: &RequestState, profile: &Profile, auth_token: &str) -> Result<(Vec<(String, String)>, Option<Vec<u8>>), DplError> {
    let mut headers = vec![("Host".to_string(), profile.host.clone()), ("X-Auth-Token".to_string(), auth_token.to_string())];

    let content_type = if req.method == Method::Get {
        "*/*"
    } else {
        req.content_type.as_deref().unwrap_or("application/json")
    };
    headers.push(("Content-Type".to_string(), content_type.to_string()));

    if req.range_enabled {
        if let Some(range) = req.range {
            headers.push(("Range".to_string(), format_range(range)));
        }
    }
    headers.extend(condition_headers(&req.condition, false));

    let prefix = if is_container_resource(&req.resource) {
        CONTAINER_META_PREFIX
    } else {
        OBJECT_META_PREFIX
    };
    headers.extend(backend::metadata_to_headers(&req.metadata, prefix));

    Ok((headers, req.data.clone()))
}

/// Extracts metadata and system metadata from a Swift reply, reading
/// whichever of `X-Object-Meta-*`/`X-Container-Meta-*` is present
/// (spec.md §4.6).
#[must_use]
pub fn parse_reply(headers: &[(String, String)]) -> (Dict, SysMetadata) {
    let mut metadata = backend::headers_to_metadata(headers, OBJECT_META_PREFIX);
    if metadata.is_empty() {
        metadata = backend::headers_to_metadata(headers, CONTAINER_META_PREFIX);
    }
    let mut sysmd = SysMetadata::new();
    backend::parse_common_system_headers(headers, &mut sysmd);
    (metadata, sysmd)
}

fn check_status(status: u16, headers: &[(String, String)]) -> Result<Option<String>, DplError> {
    if DplError::is_redirect_status(status) {
        let location = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("location")).map(|(_, v)| v.clone()).unwrap_or_default();
        return Ok(Some(location));
    }
    DplError::from_status(status)?;
    Ok(None)
}

/// Wires the Swift request builder/reply parser into the [`Backend`]
/// vtable. Keystone token negotiation is not implemented; the profile's
/// access key is used directly as a pre-obtained `X-Auth-Token`.
pub struct SwiftBackend {
    profile: Profile,
    executor: crate::http::RestExecutor,
}

impl SwiftBackend {
    #[must_use]
    pub fn new(profile: Profile, endpoints: std::sync::Arc<droplet_core::EndpointList>, pool: std::sync::Arc<droplet_network::ConnectionPool>) -> Self {
        let executor = crate::http::RestExecutor::new(profile.clone(), endpoints, pool);
        Self { profile, executor }
    }

    async fn call(&self, req: &RequestState) -> Result<(u16, Vec<(String, String)>, Vec<u8>), DplError> {
        let (headers, body) = build_request(req, &self.profile, &self.profile.access_key)?;
        let reply = self
            .executor
            .call(req.method, &req.resource, req.subresource.as_deref(), &self.profile.host, &headers, body.as_deref())
            .await?;
        Ok((reply.status, reply.headers, reply.body))
    }
}

#[async_trait::async_trait]
impl crate::vtable::Backend for SwiftBackend {
    fn name(&self) -> &'static str {
        "swift"
    }

    async fn put(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let (status, headers, _) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    async fn get(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<crate::vtable::GetOutcome>, DplError> {
        let (status, headers, body) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let (metadata, sysmd) = parse_reply(&headers);
        Ok(crate::vtable::VerbResult::Done(crate::vtable::GetOutcome { data: body, metadata, sysmd }))
    }

    async fn head(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<crate::vtable::HeadOutcome>, DplError> {
        self.head_raw(req).await
    }

    async fn head_raw(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<crate::vtable::HeadOutcome>, DplError> {
        let (status, headers, _) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let (metadata, sysmd) = parse_reply(&headers);
        Ok(crate::vtable::VerbResult::Done(crate::vtable::HeadOutcome { metadata, sysmd }))
    }

    async fn deletef(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let (status, headers, _) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    async fn make_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let mut container_req = req.clone();
        container_req.method = Method::Put;
        let (status, headers, _) = self.call(&container_req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    async fn delete_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let mut container_req = req.clone();
        container_req.method = Method::Delete;
        let (status, headers, _) = self.call(&container_req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    async fn list_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<Vec<ListEntry>>, DplError> {
        let mut container_req = req.clone();
        container_req.method = Method::Get;
        container_req.set_subresource("format=json");
        let (status, headers, body) = self.call(&container_req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let entries = parse_object_listing(&body)?;
        Ok(crate::vtable::VerbResult::Done(entries))
    }

    async fn list_all_my_buckets(&self) -> Result<crate::vtable::VerbResult<Vec<BucketEntry>>, DplError> {
        let mut req = RequestState::new(Method::Get, None, String::new());
        req.set_subresource("format=json");
        let (status, headers, body) = self.call(&req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let buckets = parse_container_listing(&body)?;
        Ok(crate::vtable::VerbResult::Done(buckets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn get_content_type_is_wildcard() {
        let req = RequestState::new(Method::Get, Some("c".to_string()), "/o".to_string());
        let (headers, _) = build_request(&req, &Profile::test_default(), "token").unwrap();
        assert!(headers.contains(&("Content-Type".to_string(), "*/*".to_string())));
    }

    #[rstest]
    fn put_content_type_defaults_to_json() {
        let req = RequestState::new(Method::Put, Some("c".to_string()), "/o".to_string());
        let (headers, _) = build_request(&req, &Profile::test_default(), "token").unwrap();
        assert!(headers.contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[rstest]
    fn container_resource_uses_container_meta_prefix() {
        let mut req = RequestState::new(Method::Put, Some("c".to_string()), "/c".to_string());
        req.metadata.add("quota", "100", false);
        let (headers, _) = build_request(&req, &Profile::test_default(), "token").unwrap();
        assert!(headers.iter().any(|(k, _)| k == "x-container-meta-quota"));
    }

    #[rstest]
    fn object_listing_parses_json_array() {
        let body = br#"[{"name":"o1","bytes":10,"last_modified":"2022-01-01T00:00:00.000000","hash":"abc"}]"#;
        let entries = parse_object_listing(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "o1");
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[0].etag, "abc");
    }

    #[rstest]
    fn container_listing_parses_json_array() {
        let body = br#"[{"name":"c1","count":0,"bytes":0}]"#;
        let buckets = parse_container_listing(body).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "c1");
    }
}
