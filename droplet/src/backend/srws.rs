//! Scality SRWS backend: a simplified ntinydb-in-header convention, with
//! `X-Biz-Replica-Policy` selecting lazy vs eager replication semantics
//! (spec.md §4.5, "SRWS" bullet).

use droplet_core::Dict;

use crate::config::Profile;
use crate::error::DplError;
use crate::ntinydb;
use crate::request::RequestState;
use crate::sysmd::SysMetadata;

const USERMD_HEADER: &str = "X-Biz-Usermd";
const REPLICA_POLICY_HEADER: &str = "X-Biz-Replica-Policy";

/// Replication policy selected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaPolicy {
    /// Acknowledge after the write lands on a quorum, replicate the rest
    /// in the background.
    Lazy,
    /// Acknowledge only once every replica has the write.
    Eager,
}

impl ReplicaPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReplicaPolicy::Lazy => "lazy",
            ReplicaPolicy::Eager => "eager",
        }
    }
}

/// Lowers a request into SRWS headers: metadata as the ntinydb blob
/// (same wire format as sproxyd, under a different header name) plus the
/// replica-policy selector.
pub fn build_request(
    req: &RequestState,
    profile: &Profile,
    policy: ReplicaPolicy,
) -> Result<(Vec<(String, String)>, Option<Vec<u8>>), DplError> {
    let mut headers = vec![("Host".to_string(), profile.host.clone())];
    headers.push((REPLICA_POLICY_HEADER.to_string(), policy.as_str().to_string()));
    if !req.metadata.is_empty() {
        let blob = ntinydb::encode(&req.metadata);
        headers.push((USERMD_HEADER.to_string(), droplet_crypto::base64_encode(&blob)));
    }
    Ok((headers, req.data.clone()))
}

/// Extracts metadata (ntinydb blob) and the subset of system metadata
/// SRWS exposes (`Content-Length`/`Last-Modified`/`ETag`).
pub fn parse_reply(headers: &[(String, String)]) -> Result<(Dict, SysMetadata), DplError> {
    let mut metadata = Dict::default();
    let mut sysmd = SysMetadata::new();
    crate::backend::parse_common_system_headers(headers, &mut sysmd);
    for (k, v) in headers {
        if k.eq_ignore_ascii_case(USERMD_HEADER) {
            let blob = droplet_crypto::base64_decode(v).map_err(|_| DplError::Einval)?;
            metadata = ntinydb::decode_into_dict(&blob)?;
        }
    }
    Ok((metadata, sysmd))
}

fn check_status(status: u16, headers: &[(String, String)]) -> Result<Option<String>, DplError> {
    if DplError::is_redirect_status(status) {
        let location = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("location")).map(|(_, v)| v.clone()).unwrap_or_default();
        return Ok(Some(location));
    }
    DplError::from_status(status)?;
    Ok(None)
}

/// Wires the SRWS request builder/reply parser into the [`Backend`]
/// vtable with the default (lazy) replication policy.
pub struct SrwsBackend {
    profile: Profile,
    executor: crate::http::RestExecutor,
}

impl SrwsBackend {
    #[must_use]
    pub fn new(profile: Profile, endpoints: std::sync::Arc<droplet_core::EndpointList>, pool: std::sync::Arc<droplet_network::ConnectionPool>) -> Self {
        let executor = crate::http::RestExecutor::new(profile.clone(), endpoints, pool);
        Self { profile, executor }
    }

    async fn call(&self, req: &RequestState) -> Result<(u16, Vec<(String, String)>, Vec<u8>), DplError> {
        let (headers, body) = build_request(req, &self.profile, ReplicaPolicy::Lazy)?;
        let reply = self
            .executor
            .call(req.method, &req.resource, req.subresource.as_deref(), &self.profile.host, &headers, body.as_deref())
            .await?;
        Ok((reply.status, reply.headers, reply.body))
    }
}

#[async_trait::async_trait]
impl crate::vtable::Backend for SrwsBackend {
    fn name(&self) -> &'static str {
        "srws"
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
        let (metadata, sysmd) = parse_reply(&headers)?;
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
        let (metadata, sysmd) = parse_reply(&headers)?;
        Ok(crate::vtable::VerbResult::Done(crate::vtable::HeadOutcome { metadata, sysmd }))
    }

    async fn deletef(&self, req: &RequestState) -> Result<crate::vtable::VerbResult<()>, DplError> {
        let (status, headers, _) = self.call(req).await?;
        if let Some(location) = check_status(status, &headers)? {
            return Ok(crate::vtable::VerbResult::Redirect(crate::vtable::Redirect { location }));
        }
        Ok(crate::vtable::VerbResult::Done(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use rstest::rstest;

    #[rstest]
    fn replica_policy_header_is_set() {
        let req = RequestState::new(Method::Put, None, "/k".to_string());
        let (headers, _) = build_request(&req, &Profile::test_default(), ReplicaPolicy::Eager).unwrap();
        assert!(headers.contains(&(REPLICA_POLICY_HEADER.to_string(), "eager".to_string())));
    }
}
