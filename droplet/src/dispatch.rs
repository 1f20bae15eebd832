//! Dispatch front-end (C9, spec.md §4.7): the public per-verb surface.
//! Every function follows the same template — trace entry, invoke the
//! backend's vtable slot, follow one redirect, map the result, trace exit
//! and log an event — and never allocates backend-specific state itself.

use std::future::Future;

use crate::context::Context;
use crate::error::DplError;
use crate::request::RequestState;
use crate::vtable::{BucketEntry, GetOutcome, HeadOutcome, ListEntry, VerbResult};

/// Splits an absolute redirect URI into `(resource, subresource)` relative
/// to the context's base path (spec.md §4.7 step 4). The scheme and
/// authority are discarded; only the path and query matter to a
/// re-invocation against the same backend.
pub fn split_redirect_location(location: &str) -> Result<(String, Option<String>), DplError> {
    let after_scheme = match location.split_once("://") {
        Some((_, rest)) => rest,
        None => location,
    };
    let path_start = after_scheme.find('/').ok_or(DplError::Einval)?;
    let path_and_query = &after_scheme[path_start..];
    match path_and_query.split_once('?') {
        Some((resource, sub)) => Ok((resource.to_string(), Some(sub.to_string()))),
        None => Ok((path_and_query.to_string(), None)),
    }
}

/// Runs one backend call, following a single redirect by re-driving the
/// same call with the split location installed on the request (spec.md
/// §4.7 step 4). A second redirect is a hard failure — `eredirect`, never
/// an infinite loop.
async fn drive_verb<T, F, Fut>(mut req: RequestState, call: F) -> Result<T, DplError>
where
    F: Fn(RequestState) -> Fut,
    Fut: Future<Output = Result<VerbResult<T>, DplError>>,
{
    match call(req.clone()).await? {
        VerbResult::Done(value) => Ok(value),
        VerbResult::Redirect(redirect) => {
            tracing::warn!(target: "droplet::req", location = %redirect.location, "following redirect");
            let (resource, subresource) = split_redirect_location(&redirect.location)?;
            req.resource = resource;
            req.subresource = subresource;
            match call(req).await? {
                VerbResult::Done(value) => Ok(value),
                VerbResult::Redirect(_) => Err(DplError::Eredirect),
            }
        }
    }
}

macro_rules! dispatch_verb {
    ($name:ident, $method:ident, $out:ty, $category:literal, $subcategory:literal) => {
        #[doc = concat!("Dispatches `", stringify!($method), "` (spec.md §4.7).")]
        pub async fn $name(ctx: &Context, req: RequestState) -> Result<$out, DplError> {
            tracing::trace!(target: "droplet::req", verb = stringify!($name), backend = ctx.backend.name(), resource = %req.resource, "dispatch enter");
            let backend = ctx.backend.clone();
            let result = drive_verb(req, move |r| {
                let backend = backend.clone();
                async move { backend.$method(&r).await }
            })
            .await;
            match &result {
                Ok(_) => tracing::debug!(target: "droplet::req", category = $category, subcategory = $subcategory, verb = stringify!($name), "dispatch ok"),
                Err(error) => tracing::warn!(target: "droplet::req", verb = stringify!($name), %error, "dispatch failed"),
            }
            result
        }
    };
}

dispatch_verb!(put, put, (), "DATA", "PUT");
dispatch_verb!(get, get, GetOutcome, "DATA", "GET");
dispatch_verb!(head, head, HeadOutcome, "REQUEST", "IN");
dispatch_verb!(head_raw, head_raw, HeadOutcome, "REQUEST", "IN");
dispatch_verb!(delete, deletef, (), "DATA", "DELETE");
dispatch_verb!(copy, copy, (), "REQUEST", "OUT");
dispatch_verb!(post, post, (), "REQUEST", "OUT");
dispatch_verb!(make_bucket, make_bucket, (), "REQUEST", "OUT");
dispatch_verb!(delete_bucket, delete_bucket, (), "REQUEST", "OUT");
dispatch_verb!(list_bucket, list_bucket, Vec<ListEntry>, "REQUEST", "LIST");
dispatch_verb!(delete_all, delete_all, (), "DATA", "DELETE");
dispatch_verb!(delete_all_id, delete_all_id, (), "DATA", "DELETE");

/// `list_all_my_buckets` carries no per-call request state, so a redirect
/// (which needs a resource to re-target) cannot be retried; it surfaces
/// directly as `eredirect`.
pub async fn list_all_my_buckets(ctx: &Context) -> Result<Vec<BucketEntry>, DplError> {
    tracing::trace!(target: "droplet::req", backend = ctx.backend.name(), "list_all_my_buckets enter");
    match ctx.backend.list_all_my_buckets().await? {
        VerbResult::Done(buckets) => {
            tracing::debug!(target: "droplet::req", category = "REQUEST", subcategory = "LIST", count = buckets.len(), "event");
            Ok(buckets)
        }
        VerbResult::Redirect(_) => Err(DplError::Eredirect),
    }
}

/// Generates a signed URL for `req` against the selected backend. Purely
/// local string construction — never touches the network (spec.md §4.5
/// "query-string signed URLs").
pub fn genurl(ctx: &Context, req: &RequestState) -> Result<String, DplError> {
    ctx.backend.genurl(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://h2/b/o?x=y", "/b/o", Some("x=y"))]
    #[case("http://h2/b/o", "/b/o", None)]
    #[case("/b/o?x=y", "/b/o", Some("x=y"))]
    fn redirect_location_splits_into_resource_and_subresource(#[case] location: &str, #[case] resource: &str, #[case] subresource: Option<&str>) {
        let (r, s) = split_redirect_location(location).unwrap();
        assert_eq!(r, resource);
        assert_eq!(s.as_deref(), subresource);
    }

    #[rstest]
    fn redirect_location_without_path_is_invalid() {
        assert_eq!(split_redirect_location("https://h2"), Err(DplError::Einval));
    }
}
