//! Signer and header composer (C6): canonical-string construction for
//! S3-style authorization, plus the date/host/condition/range header
//! synthesis shared across backends (spec.md §4.5).

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::condition::{Condition, SubCondition};
use crate::request::ByteRange;

/// Everything except unreserved characters (`A-Za-z0-9-_.~`) is encoded,
/// including `/` — spec.md §8's invariant is that *no* reserved byte
/// survives unencoded except the resource's leading slash, which callers
/// splice back in themselves.
const RESOURCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// URL-encodes a resource path, preserving a single leading `/`
/// unescaped and percent-encoding everything else in the reserved set
/// (spec.md §8).
#[must_use]
pub fn encode_resource(resource: &str) -> String {
    match resource.strip_prefix('/') {
        Some(rest) => format!("/{}", utf8_percent_encode(rest, RESOURCE_ENCODE_SET)),
        None => utf8_percent_encode(resource, RESOURCE_ENCODE_SET).to_string(),
    }
}

/// Formats a unix timestamp as an RFC 1123 GMT date, the format every
/// `Date`/`If-Modified-Since`/`Expires` header in this library uses.
#[must_use]
pub fn rfc1123(unix_secs: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(unix_secs, 0).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the S3-style canonical string (spec.md §4.5), ready for
/// `HMAC-SHA1`. `amz_headers` must already be restricted to keys whose
/// lowercased form starts with `x-amz-` and sorted lexicographically by
/// key — the caller (the S3 header composer) owns that filtering so this
/// function stays a pure string assembler.
#[must_use]
pub fn canonical_string(
    method: &str,
    content_md5: &str,
    content_type: &str,
    date_or_expires: &str,
    amz_headers: &[(String, String)],
    bucket: Option<&str>,
    resource: &str,
    subresource: Option<&str>,
) -> String {
    let mut s = String::new();
    s.push_str(method);
    s.push('\n');
    s.push_str(content_md5);
    s.push('\n');
    s.push_str(content_type);
    s.push('\n');
    s.push_str(date_or_expires);
    s.push('\n');
    for (k, v) in amz_headers {
        s.push_str(k);
        s.push(':');
        s.push_str(v);
        s.push('\n');
    }
    if let Some(b) = bucket {
        s.push('/');
        s.push_str(b);
    }
    s.push_str(&encode_resource(resource));
    if let Some(sub) = subresource {
        s.push('?');
        s.push_str(sub);
    }
    s
}

/// `AWS <access_key>:<base64(HMAC-SHA1(secret, canonical_string))>`.
#[must_use]
pub fn s3_authorization_header(access_key: &str, secret_key: &[u8], canonical: &str) -> String {
    let sig = droplet_crypto::hmac_sha1_base64(secret_key, canonical.as_bytes());
    format!("AWS {access_key}:{sig}")
}

/// Extracts and sorts the `x-amz-*` subset of a header list, lowercasing
/// keys (spec.md §4.5/§5: "the signer depends on this only through the
/// sorted sub-sequence of `x-amz-*` headers").
#[must_use]
pub fn sorted_amz_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut amz: Vec<(String, String)> = headers
        .iter()
        .filter(|(k, _)| k.to_lowercase().starts_with("x-amz-"))
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();
    amz.sort_by(|a, b| a.0.cmp(&b.0));
    amz
}

/// Renders a [`ByteRange`] as `bytes=start-end`.
#[must_use]
pub fn format_range(range: ByteRange) -> String {
    format!("bytes={}-{}", range.start, range.end)
}

/// Maps a [`Condition`] to `If-*` header pairs, or `x-amz-copy-source-
/// if-*` pairs when `copy_source` is set (spec.md §4.5).
#[must_use]
pub fn condition_headers(cond: &Condition, copy_source: bool) -> Vec<(String, String)> {
    let prefix = if copy_source { "x-amz-copy-source-if-" } else { "if-" };
    cond.iter()
        .map(|c| match c {
            SubCondition::IfModifiedSince(t) => (format!("{prefix}modified-since"), rfc1123(*t)),
            SubCondition::IfUnmodifiedSince(t) => (format!("{prefix}unmodified-since"), rfc1123(*t)),
            SubCondition::IfMatch(etag) => (format!("{prefix}match"), etag.clone()),
            SubCondition::IfNoneMatch(etag) => (format!("{prefix}none-match"), etag.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn scenario_s3_signed_url_canonical_string() {
        // spec.md §8 scenario 1: GET, bucket `b`, resource `/o`, no
        // subresource, no Content-MD5/Content-Type/date supplied.
        let canonical = canonical_string("GET", "", "", "", &[], Some("b"), "/o", None);
        assert_eq!(canonical, "GET\n\n\n\n/b/o");

        let auth = s3_authorization_header("AK", b"SK", &canonical);
        assert!(auth.starts_with("AWS AK:"));
        let sig_b64 = auth.strip_prefix("AWS AK:").unwrap();
        let expected = droplet_crypto::hmac_sha1_base64(b"SK", b"GET\n\n\n\n/b/o");
        assert_eq!(sig_b64, expected);
    }

    #[rstest]
    fn leading_slash_preserved_other_bytes_encoded() {
        assert_eq!(encode_resource("/a b/c"), "/a%20b%2Fc");
    }

    #[rstest]
    fn amz_headers_sort_lexicographically_and_lowercase() {
        let headers = vec![
            ("X-Amz-Meta-Zeta".to_string(), "z".to_string()),
            ("x-amz-acl".to_string(), "private".to_string()),
            ("Content-Type".to_string(), "text/plain".to_string()),
        ];
        let amz = sorted_amz_headers(&headers);
        assert_eq!(
            amz,
            vec![
                ("x-amz-acl".to_string(), "private".to_string()),
                ("x-amz-meta-zeta".to_string(), "z".to_string()),
            ]
        );
    }

    #[rstest]
    fn canonical_string_is_deterministic_for_identical_requests() {
        let a = canonical_string("PUT", "md5", "text/plain", "date", &[], Some("b"), "/o", Some("acl"));
        let b = canonical_string("PUT", "md5", "text/plain", "date", &[], Some("b"), "/o", Some("acl"));
        assert_eq!(a, b);
    }
}
