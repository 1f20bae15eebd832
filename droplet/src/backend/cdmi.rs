//! CDMI backend: native (JSON body) and HTTP-compat (flattened headers)
//! request builders, and the JSON reply parser (spec.md §4.5/§4.6, "CDMI"
//! bullets).

use droplet_core::Dict;
use serde_json::{json, Map, Value as Json};

use crate::backend::{self, OBJECT_META_PREFIX};
use crate::config::Profile;
use crate::error::DplError;
use crate::request::{BehaviorFlags, CopyDirective, RequestState};
use crate::signer::format_range;
use crate::sysmd::{Ace, CannedAcl, FileType, SysMetadata};

const SPEC_VERSION: &str = "1.0.1";

fn content_type_for(ftype: Option<FileType>) -> &'static str {
    match ftype {
        Some(FileType::Regular) => "application/cdmi-object",
        Some(FileType::Directory) => "application/cdmi-container",
        Some(FileType::Capability) => "application/cdmi-capability",
        Some(FileType::Domain) => "application/cdmi-domain",
        Some(FileType::CharDevice) => "application/cdmi-chardevice",
        Some(FileType::BlockDevice) => "application/cdmi-blockdevice",
        Some(FileType::Fifo) => "application/cdmi-fifo",
        Some(FileType::Socket) => "application/cdmi-socket",
        Some(FileType::Symlink) => "application/cdmi-symlink",
        Some(FileType::Any) | Some(FileType::Undefined) | None => "*/*",
    }
}

/// Maps a canned ACL to the CDMI ACE array convention (spec.md §4.5).
#[must_use]
pub fn canned_acl_to_aces(acl: CannedAcl) -> Vec<Ace> {
    // acemask bits follow NFSv4 ACE semantics: READ(1)|WRITE(2) shown
    // here as the minimal set the canned names imply; full NFSv4 bit
    // layout is out of scope for this client (it never interprets the
    // mask itself, only round-trips it).
    const READ: u32 = 0x0002_0089;
    const WRITE: u32 = 0x0002_0116;
    const ALL: u32 = READ | WRITE;
    match acl {
        CannedAcl::Private => vec![Ace {
            identifier: "OWNER@".to_string(),
            acetype: 0,
            aceflags: 0,
            acemask: ALL,
        }],
        CannedAcl::PublicRead => vec![
            Ace { identifier: "OWNER@".to_string(), acetype: 0, aceflags: 0, acemask: ALL },
            Ace { identifier: "EVERYONE@".to_string(), acetype: 0, aceflags: 0, acemask: READ },
        ],
        CannedAcl::PublicReadWrite => vec![
            Ace { identifier: "OWNER@".to_string(), acetype: 0, aceflags: 0, acemask: ALL },
            Ace { identifier: "EVERYONE@".to_string(), acetype: 0, aceflags: 0, acemask: ALL },
        ],
        CannedAcl::AuthenticatedRead => vec![
            Ace { identifier: "OWNER@".to_string(), acetype: 0, aceflags: 0, acemask: ALL },
            Ace { identifier: "AUTHENTICATED@".to_string(), acetype: 0, aceflags: 0, acemask: READ },
        ],
        CannedAcl::BucketOwnerRead => vec![Ace { identifier: "GROUP@".to_string(), acetype: 0, aceflags: 0, acemask: READ }],
        CannedAcl::BucketOwnerFullControl => vec![Ace { identifier: "GROUP@".to_string(), acetype: 0, aceflags: 0, acemask: ALL }],
    }
}

fn basic_auth(profile: &Profile) -> String {
    let raw = format!("{}:{}", profile.access_key, profile.secret_key);
    format!("Basic {}", droplet_crypto::base64_encode(raw.as_bytes()))
}

fn copy_directive_field(directive: CopyDirective) -> &'static str {
    match directive {
        CopyDirective::Copy => "copy",
        CopyDirective::Link => "link",
        CopyDirective::Reference => "reference",
        CopyDirective::Move => "move",
        CopyDirective::MkDent => "mkdent",
        CopyDirective::RmDent => "rmdent",
        CopyDirective::MvDent => "mvdent",
        CopyDirective::Metadata => "copy",
    }
}

fn dict_to_json_object(dict: &Dict) -> Map<String, Json> {
    let mut map = Map::new();
    for (k, v) in dict.iter() {
        if let Some(s) = v.as_str() {
            map.insert(k.to_string(), Json::String(s.to_string()));
        }
    }
    map
}

/// Builds a native-mode CDMI request: a JSON body with `metadata`,
/// optional copy-directive pointer, and base64 `value` for regular-file
/// payloads (spec.md §4.5/§6).
pub fn build_request_native(req: &RequestState, profile: &Profile) -> Result<(Vec<(String, String)>, Option<Vec<u8>>), DplError> {
    let mut headers = Vec::new();
    let content_type = content_type_for(req.sysmd.ftype);
    headers.push(("Content-Type".to_string(), content_type.to_string()));
    headers.push(("Accept".to_string(), content_type.to_string()));
    headers.push(("X-CDMI-Specification-Version".to_string(), SPEC_VERSION.to_string()));
    headers.push(("Authorization".to_string(), basic_auth(profile)));

    let mut body = Map::new();
    if !req.metadata.is_empty() {
        body.insert("metadata".to_string(), Json::Object(dict_to_json_object(&req.metadata)));
    }

    if let (Some(src), Some(directive)) = (&req.source, req.copy_directive) {
        let mut path = format!("/{}", src.bucket.as_deref().unwrap_or_default());
        path.push_str(&src.resource);
        body.insert(copy_directive_field(directive).to_string(), Json::String(path));
    }

    let is_regular = !matches!(req.sysmd.ftype, Some(FileType::Directory) | Some(FileType::Capability) | Some(FileType::Domain));
    if is_regular {
        if let Some(data) = &req.data {
            body.insert("value".to_string(), Json::String(droplet_crypto::base64_encode(data)));
            body.insert("valuetransferencoding".to_string(), Json::String("base64".to_string()));
        }
    }

    let bytes = serde_json::to_vec(&Json::Object(body))?;
    headers.push(("Content-Length".to_string(), bytes.len().to_string()));
    Ok((headers, Some(bytes)))
}

/// Builds an HTTP-compat-mode CDMI request: metadata flattened into
/// `X-Object-Meta-*`/`X-Container-Meta-*` headers, ranges as `Range:`
/// (spec.md §4.5).
pub fn build_request_compat(req: &RequestState, profile: &Profile) -> Result<(Vec<(String, String)>, Option<Vec<u8>>), DplError> {
    let mut headers = Vec::new();
    headers.push(("Authorization".to_string(), basic_auth(profile)));
    if let Some(ct) = &req.content_type {
        headers.push(("Content-Type".to_string(), ct.clone()));
    }
    if req.range_enabled {
        if let Some(range) = req.range {
            headers.push(("Range".to_string(), format_range(range)));
        }
    }
    let prefix = if req.bucket.is_some() && req.resource.matches('/').count() <= 1 {
        backend::CONTAINER_META_PREFIX
    } else {
        OBJECT_META_PREFIX
    };
    headers.extend(backend::metadata_to_headers(&req.metadata, prefix));
    if let Some(acl) = req.canned_acl {
        for (i, ace) in canned_acl_to_aces(acl).iter().enumerate() {
            headers.push((format!("X-CDMI-ACL-{i}-Identifier"), ace.identifier.clone()));
        }
    }
    Ok((headers, req.data.clone()))
}

/// Dispatches to [`build_request_native`] or [`build_request_compat`]
/// based on the `HTTP_COMPAT` behavior gate (spec.md §4.5).
pub fn build_request(req: &RequestState, profile: &Profile, http_compat: bool) -> Result<(Vec<(String, String)>, Option<Vec<u8>>), DplError> {
    if http_compat {
        build_request_compat(req, profile)
    } else {
        build_request_native(req, profile)
    }
}

/// Parses a CDMI JSON reply body into user metadata and system metadata
/// (spec.md §4.6): walks `objectID`/`parentID`/`objectType`/
/// `metadata.{cdmi_size,cdmi_mtime,cdmi_atime}` and copies `metadata`
/// into the user-metadata dictionary.
pub fn parse_reply_body(body: &[u8]) -> Result<(Dict, SysMetadata), DplError> {
    let tree: Json = serde_json::from_slice(body)?;
    let mut metadata = Dict::default();
    let mut sysmd = SysMetadata::new();

    if let Some(id) = tree.get("objectID").and_then(Json::as_str) {
        sysmd.id = id.to_string();
        sysmd.mask |= crate::sysmd::SysMdMask::ID;
    }
    if let Some(parent) = tree.get("parentID").and_then(Json::as_str) {
        sysmd.parent_id = parent.to_string();
        sysmd.mask |= crate::sysmd::SysMdMask::PARENT_ID;
    }

    if let Some(Json::Object(meta)) = tree.get("metadata") {
        for (k, v) in meta {
            match k.as_str() {
                "cdmi_size" => {
                    if let Some(n) = v.as_str().and_then(|s| s.parse::<u64>().ok()).or_else(|| v.as_u64()) {
                        sysmd.set_size(n);
                    }
                }
                "cdmi_mtime" => {
                    if let Some(t) = v.as_str().and_then(backend::parse_http_date) {
                        sysmd.set_mtime(t);
                    }
                }
                "cdmi_atime" => {
                    if let Some(t) = v.as_str().and_then(backend::parse_http_date) {
                        sysmd.set_atime(t);
                    }
                }
                _ => {
                    if let Some(s) = v.as_str() {
                        metadata.add(k, s, false);
                    }
                }
            }
        }
    }

    Ok((metadata, sysmd))
}

/// Parses a CDMI container's `children` array into [`ListEntry`] rows
/// (spec.md §3 vtable `list_bucket`). CDMI containers only advertise
/// child names in this field; size/etag/mtime would need a per-child
/// `head`, which this vtable method does not perform.
pub fn parse_children(body: &[u8]) -> Result<Vec<crate::vtable::ListEntry>, DplError> {
    let tree: Json = serde_json::from_slice(body)?;
    let children = tree.get("children").and_then(Json::as_array).cloned().unwrap_or_default();
    Ok(children
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .map(|name| crate::vtable::ListEntry { name, size: 0, last_modified: 0, etag: String::new() })
        .collect())
}

/// Decodes the base64 `value` field of a native-mode CDMI reply body, if
/// present (spec.md §4.6: the payload travels inside the JSON object,
/// not as a raw HTTP body, in native mode).
#[must_use]
pub fn extract_value_bytes(body: &[u8]) -> Option<Vec<u8>> {
    let tree: Json = serde_json::from_slice(body).ok()?;
    let value = tree.get("value")?.as_str()?;
    droplet_crypto::base64_decode(value).ok()
}

/// Checks a reply status, surfacing 301/302 as a redirect (spec.md
/// §4.7 step 4) and everything else through the canonical mapping.
fn check_status(status: u16, headers: &[(String, String)]) -> Result<Option<String>, DplError> {
    if DplError::is_redirect_status(status) {
        let location = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("location")).map(|(_, v)| v.clone()).unwrap_or_default();
        return Ok(Some(location));
    }
    DplError::from_status(status)?;
    Ok(None)
}

/// Wires the CDMI request builder/reply parser into the [`Backend`]
/// vtable. `http_compat` selects the flattened-header mode over native
/// JSON bodies (spec.md §4.5's `HTTP_COMPAT` behavior gate).
pub struct CdmiBackend {
    profile: Profile,
    executor: crate::http::RestExecutor,
    http_compat: bool,
}

impl CdmiBackend {
    #[must_use]
    pub fn new(
        profile: Profile,
        endpoints: std::sync::Arc<droplet_core::EndpointList>,
        pool: std::sync::Arc<droplet_network::ConnectionPool>,
        http_compat: bool,
    ) -> Self {
        let executor = crate::http::RestExecutor::new(profile.clone(), endpoints, pool);
        Self { profile, executor, http_compat }
    }

    async fn call(&self, req: &RequestState) -> Result<(u16, Vec<(String, String)>, Vec<u8>), DplError> {
        let (headers, body) = build_request(req, &self.profile, self.http_compat)?;
        let reply = self
            .executor
            .call(req.method, &req.resource, req.subresource.as_deref(), &self.profile.host, &headers, body.as_deref())
            .await?;
        Ok((reply.status, reply.headers, reply.body))
    }

    fn parse(&self, headers: &[(String, String)], body: &[u8]) -> Result<(Dict, SysMetadata), DplError> {
        if self.http_compat {
            let metadata = backend::headers_to_metadata(headers, OBJECT_META_PREFIX);
            let mut sysmd = SysMetadata::new();
            backend::parse_common_system_headers(headers, &mut sysmd);
            Ok((metadata, sysmd))
        } else {
            parse_reply_body(body)
        }
    }
}

#[async_trait::async_trait]
impl crate::vtable::Backend for CdmiBackend {
    fn name(&self) -> &'static str {
        "cdmi"
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
        let (metadata, sysmd) = self.parse(&headers, &body)?;
        let data = if self.http_compat { body } else { extract_value_bytes(&body).unwrap_or_default() };
        Ok(crate::vtable::VerbResult::Done(crate::vtable::GetOutcome { data, metadata, sysmd }))
    }

    async fn head(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<crate::vtable::HeadOutcome>, DplError> {
        self.head_raw(req).await
    }

    async fn head_raw(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<crate::vtable::HeadOutcome>, DplError> {
        let (status, headers, body) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let (metadata, sysmd) = self.parse(&headers, &body)?;
        Ok(crate::vtable::VerbResult::Done(crate::vtable::HeadOutcome { metadata, sysmd }))
    }

    async fn deletef(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let (status, headers, _) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    /// Creates a container: a PUT with object type forced to
    /// `Directory` so the request builder emits
    /// `Content-Type: application/cdmi-container` (spec.md §4.5 CDMI
    /// content-type-by-object-type rule).
    async fn make_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let mut container_req = req.clone();
        container_req.sysmd.set_ftype(FileType::Directory);
        let (status, headers, _) = self.call(&container_req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }

    async fn delete_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        self.deletef(req).await
    }

    /// Lists a container's children (spec.md §3 vtable `list_bucket`).
    /// Only meaningful in native mode; HTTP-compat mode has no JSON body
    /// to read a `children` array from.
    async fn list_bucket(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<Vec<crate::vtable::ListEntry>>, DplError> {
        if self.http_compat {
            return Err(DplError::Enotimpl);
        }
        let mut container_req = req.clone();
        container_req.sysmd.set_ftype(FileType::Directory);
        let (status, headers, body) = self.call(&container_req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        let entries = parse_children(&body)?;
        Ok(crate::vtable::VerbResult::Done(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use rstest::rstest;

    #[rstest]
    fn scenario_cdmi_native_put() {
        // spec.md §8 scenario 2.
        let mut req = RequestState::new(Method::Put, Some("c".to_string()), "/x".to_string());
        req.sysmd.set_ftype(FileType::Regular);
        req.set_data(b"hi".to_vec());
        let (headers, body) = build_request_native(&req, &Profile::test_default()).unwrap();

        assert!(headers.contains(&("Content-Type".to_string(), "application/cdmi-object".to_string())));
        assert!(headers.contains(&("X-CDMI-Specification-Version".to_string(), "1.0.1".to_string())));
        assert!(headers.iter().any(|(k, _)| k == "Content-Length"));

        let body_json: Json = serde_json::from_slice(&body.unwrap()).unwrap();
        assert_eq!(body_json["value"], "aGk=");
        assert_eq!(body_json["valuetransferencoding"], "base64");
    }

    #[rstest]
    fn empty_metadata_omits_metadata_key() {
        // spec.md §8 boundary behavior.
        let mut req = RequestState::new(Method::Put, Some("c".to_string()), "/x".to_string());
        req.sysmd.set_ftype(FileType::Directory);
        let (_, body) = build_request_native(&req, &Profile::test_default()).unwrap();
        let body_json: Json = serde_json::from_slice(&body.unwrap()).unwrap();
        assert!(body_json.get("metadata").is_none());
    }

    #[rstest]
    fn reply_body_populates_ids_and_size() {
        let json = r#"{"objectID":"abc","parentID":"def","metadata":{"cdmi_size":"42","owner":"alice"}}"#;
        let (metadata, sysmd) = parse_reply_body(json.as_bytes()).unwrap();
        assert_eq!(sysmd.id, "abc");
        assert_eq!(sysmd.size, 42);
        assert_eq!(metadata.get_str("owner"), Some("alice"));
    }

    #[rstest]
    fn children_array_becomes_list_entries() {
        let json = r#"{"objectID":"abc","children":["o1","o2"]}"#;
        let entries = parse_children(json.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "o1");
        assert_eq!(entries[1].name, "o2");
    }

    #[rstest]
    fn missing_children_is_empty_list() {
        let json = r#"{"objectID":"abc"}"#;
        assert!(parse_children(json.as_bytes()).unwrap().is_empty());
    }
}
