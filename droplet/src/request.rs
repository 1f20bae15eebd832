//! Request state (C5): the mutable builder that accumulates every
//! per-call parameter before a backend lowers it into wire bytes or
//! filesystem syscalls (spec.md §3/§4.5). Created fresh per verb
//! invocation, dropped after the call completes — there is no reuse
//! across requests.

use bitflags::bitflags;
use droplet_core::Dict;

use crate::condition::Condition;
use crate::sysmd::{CannedAcl, SysMetadata};

/// HTTP-ish verb a request is built for. `Head` is its own variant
/// (rather than a GET with a body-suppressing flag) because several
/// backends special-case it (e.g. Swift limits `Content-Type` on GET,
/// not HEAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

bitflags! {
    /// Per-request behavior flags (spec.md §3). `KEEP_ALIVE` and
    /// `VIRTUAL_HOSTING` are on by default (spec.md §4.5: "Construction
    /// sets keep-alive and virtual-hosting behaviors by default").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BehaviorFlags: u32 {
        const KEEP_ALIVE        = 1 << 0;
        const VIRTUAL_HOSTING   = 1 << 1;
        const MD5               = 1 << 2;
        const EXPECT_100        = 1 << 3;
        const QUERY_STRING_AUTH = 1 << 4;
        const COPY              = 1 << 5;
    }
}

impl Default for BehaviorFlags {
    fn default() -> Self {
        BehaviorFlags::KEEP_ALIVE | BehaviorFlags::VIRTUAL_HOSTING
    }
}

/// A byte range, inclusive on both ends (like HTTP `Range: bytes=a-b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Backend-specific copy semantics (spec.md §9 Open Question: the set
/// `{MKDENT, RMDENT, MVDENT}` is backend-specific; most backends return
/// not-supported for them and this implementation preserves that rather
/// than inferring shared semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirective {
    Copy,
    Metadata,
    MkDent,
    RmDent,
    MvDent,
    Move,
    Link,
    Reference,
}

/// A copy/rename source locator: `{bucket, resource, subresource}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: Option<String>,
    pub resource: String,
    pub subresource: Option<String>,
}

/// The full per-call builder state (spec.md §3 "Request state").
#[derive(Debug, Clone)]
pub struct RequestState {
    pub method: Method,
    pub bucket: Option<String>,
    pub resource: String,
    pub subresource: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub data: Option<Vec<u8>>,
    pub range: Option<ByteRange>,
    pub range_enabled: bool,
    pub condition: Condition,
    pub metadata: Dict,
    pub sysmd: SysMetadata,
    pub behavior: BehaviorFlags,
    pub expires: Option<i64>,
    pub copy_directive: Option<CopyDirective>,
    pub source: Option<SourceLocation>,
    pub copy_source_condition: Condition,
    pub location_constraint: Option<String>,
    pub canned_acl: Option<CannedAcl>,
    pub storage_class: Option<String>,
}

impl RequestState {
    /// Creates a fresh request state for `method` against `resource`,
    /// already normalized relative to the context's base path (spec.md
    /// §4.5's resource-normalization rule is applied by the caller via
    /// [`normalize_resource`] before constructing this).
    #[must_use]
    pub fn new(method: Method, bucket: Option<String>, resource: String) -> Self {
        Self {
            method,
            bucket,
            resource,
            subresource: None,
            content_type: None,
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            data: None,
            range: None,
            range_enabled: false,
            condition: Condition::new(),
            metadata: Dict::default(),
            sysmd: SysMetadata::new(),
            behavior: BehaviorFlags::default(),
            expires: None,
            copy_directive: None,
            source: None,
            copy_source_condition: Condition::new(),
            location_constraint: None,
            canned_acl: None,
            storage_class: None,
        }
    }

    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.data = Some(data);
        self
    }

    pub fn set_range(&mut self, start: u64, end: u64) -> &mut Self {
        self.range = Some(ByteRange { start, end });
        self.range_enabled = true;
        self
    }

    pub fn set_subresource(&mut self, subresource: impl Into<String>) -> &mut Self {
        self.subresource = Some(subresource.into());
        self
    }

    pub fn enable_md5(&mut self) -> &mut Self {
        self.behavior |= BehaviorFlags::MD5;
        self
    }

    #[must_use]
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

/// Resolves a caller-supplied resource against the context's base path,
/// per spec.md §4.5's exact case table. `preserve_root_path` and `base`
/// come from the context's profile.
#[must_use]
pub fn normalize_resource(base: &str, resource: &str, preserve_root_path: bool) -> String {
    let empty_or_root = resource.is_empty() || resource == "/";
    if empty_or_root {
        return if base == "/" {
            if preserve_root_path {
                resource.to_string()
            } else {
                String::new()
            }
        } else if preserve_root_path {
            format!("{base}{resource}")
        } else {
            base.to_string()
        };
    }
    if base == "/" {
        resource.to_string()
    } else {
        format!("{base}/{resource}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", "", false, "")]
    #[case("/", "/", true, "/")]
    #[case("/b", "", false, "/b")]
    #[case("/b", "/", true, "/b/")]
    #[case("/", "o", false, "o")]
    #[case("/b", "o", false, "/b/o")]
    fn resource_normalization_matches_table(
        #[case] base: &str,
        #[case] resource: &str,
        #[case] preserve: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(normalize_resource(base, resource, preserve), expected);
    }

    #[rstest]
    fn default_behavior_flags_enable_keepalive_and_vhost() {
        let req = RequestState::new(Method::Get, Some("b".into()), "/o".into());
        assert!(req.behavior.contains(BehaviorFlags::KEEP_ALIVE));
        assert!(req.behavior.contains(BehaviorFlags::VIRTUAL_HOSTING));
        assert!(!req.behavior.contains(BehaviorFlags::MD5));
    }

    #[rstest]
    fn set_range_enables_the_range_flag() {
        let mut req = RequestState::new(Method::Get, None, "/o".into());
        req.set_range(10, 20);
        assert!(req.range_enabled);
        assert_eq!(req.range, Some(ByteRange { start: 10, end: 20 }));
    }
}
