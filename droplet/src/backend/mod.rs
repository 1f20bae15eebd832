//! Per-backend request builders (C7) and reply parsers (C8): the
//! duplicative heart of the pipeline (spec.md §2 gives these the largest
//! line share, 18%+14%, "per-backend logic is duplicative by design").
//! Each submodule implements one backend's header/body composition rules
//! (spec.md §4.5) and reply decoding rules (spec.md §4.6).

pub mod cdmi;
pub mod posix;
pub mod s3_xml;
pub mod sproxyd;
pub mod srws;
pub mod swift;
pub mod s3;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use droplet_core::Dict;

use crate::sysmd::SysMetadata;

/// Metadata header prefix for objects (spec.md §4.6).
pub const OBJECT_META_PREFIX: &str = "x-object-meta-";
/// Metadata header prefix for containers/buckets (spec.md §4.6).
pub const CONTAINER_META_PREFIX: &str = "x-container-meta-";

/// Flattens a user-metadata dictionary into `<prefix><key>: <value>`
/// header pairs, used by S3's `x-amz-meta-*`, CDMI's HTTP-compat mode,
/// and Swift (spec.md §4.5).
#[must_use]
pub fn metadata_to_headers(metadata: &Dict, prefix: &str) -> Vec<(String, String)> {
    metadata
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (format!("{prefix}{k}"), s.to_string())))
        .collect()
}

/// Extracts metadata entries from reply headers whose lowercased key
/// starts with `prefix`, stripping the prefix (spec.md §4.6).
#[must_use]
pub fn headers_to_metadata(headers: &[(String, String)], prefix: &str) -> Dict {
    let mut dict = Dict::default();
    for (k, v) in headers {
        if let Some(suffix) = k.to_lowercase().strip_prefix(prefix) {
            dict.add(suffix, v.clone(), false);
        }
    }
    dict
}

/// Populates the subset of [`SysMetadata`] that every REST backend's
/// reply shares: `Content-Length`, `Last-Modified`, `ETag` (with
/// surrounding quotes stripped, spec.md §4.6).
pub fn parse_common_system_headers(headers: &[(String, String)], sysmd: &mut SysMetadata) {
    for (k, v) in headers {
        match k.to_lowercase().as_str() {
            "content-length" => {
                if let Ok(len) = v.trim().parse::<u64>() {
                    sysmd.set_size(len);
                }
            }
            "last-modified" => {
                if let Some(t) = parse_http_date(v) {
                    sysmd.set_mtime(t);
                }
            }
            "etag" => {
                sysmd.set_etag(v.trim_matches('"'));
            }
            _ => {}
        }
    }
}

/// Parses an RFC 1123 HTTP date into a unix timestamp.
#[must_use]
pub fn parse_http_date(s: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S GMT")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
        .or_else(|| DateTime::parse_from_rfc2822(s).ok().map(|dt| dt.timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplet_core::Value;
    use rstest::rstest;

    #[rstest]
    fn metadata_round_trips_through_headers() {
        let mut dict = Dict::default();
        dict.add("owner", "alice", false);
        let headers = metadata_to_headers(&dict, OBJECT_META_PREFIX);
        assert_eq!(headers, vec![("x-object-meta-owner".to_string(), "alice".to_string())]);
        let back = headers_to_metadata(&headers, OBJECT_META_PREFIX);
        assert_eq!(back.get("owner"), Some(&Value::string("alice")));
    }

    #[rstest]
    fn etag_quotes_are_stripped() {
        let headers = vec![("ETag".to_string(), "\"abc123\"".to_string())];
        let mut sysmd = SysMetadata::new();
        parse_common_system_headers(&headers, &mut sysmd);
        assert_eq!(sysmd.etag, "abc123");
    }
}
