//! Canonical error taxonomy (spec.md §6/§7): every dispatch call returns
//! `Result<T, DplError>`. System-call and HTTP-status failures are mapped
//! into this enum at the edges; nothing upstream of the mapping sees a
//! raw `std::io::Error` or an HTTP status code.

use thiserror::Error;

/// The canonical error taxonomy. Named after the original's `dpl_status_t`
/// members so the mapping in §7 stays legible against the spec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DplError {
    #[error("generic failure")]
    Failure,
    #[error("no such entity")]
    Enoent,
    #[error("invalid argument")]
    Einval,
    #[error("operation timed out")]
    Etimeout,
    #[error("out of memory")]
    Enomem,
    #[error("system error: {0}")]
    Esys(String),
    #[error("I/O error: {0}")]
    Eio(String),
    #[error("resource limit exceeded")]
    Elimit,
    #[error("name too long")]
    Enametoolong,
    #[error("not a directory")]
    Enotdir,
    #[error("directory not empty")]
    Enotempty,
    #[error("is a directory")]
    Eisdir,
    #[error("already exists")]
    Eexist,
    #[error("not implemented by this backend")]
    Enotimpl,
    #[error("permission denied")]
    Eperm,
    #[error("conflict")]
    Econflict,
    #[error("precondition failed")]
    Eprecond,
    #[error("redirected twice")]
    Eredirect,
    #[error("requested range unavailable")]
    Erangeunavail,
}

impl DplError {
    /// Maps a raw HTTP status code to the canonical taxonomy (spec.md
    /// §4.4). `3xx` codes other than 301/302 fall through to `failure`, as
    /// the original only special-cases the two redirect codes.
    #[must_use]
    pub fn from_status(status: u16) -> Result<(), DplError> {
        match status {
            100 | 200 | 201 | 204 | 206 => Ok(()),
            403 => Err(DplError::Eperm),
            404 => Err(DplError::Enoent),
            409 => Err(DplError::Econflict),
            412 => Err(DplError::Eprecond),
            416 => Err(DplError::Erangeunavail),
            _ => Err(DplError::Failure),
        }
    }

    /// Whether this status signals a redirect that dispatch should
    /// attempt to follow (spec.md §4.7 step 4).
    #[must_use]
    pub fn is_redirect_status(status: u16) -> bool {
        matches!(status, 301 | 302)
    }

    /// Whether a 5xx (or transport failure) should blacklist the endpoint
    /// that served it (spec.md §4.3/§7).
    #[must_use]
    pub fn status_blacklists(status: u16) -> bool {
        (500..600).contains(&status)
    }
}

impl From<std::io::Error> for DplError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => DplError::Enoent,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => DplError::Einval,
            ErrorKind::TimedOut => DplError::Etimeout,
            ErrorKind::AlreadyExists => DplError::Eexist,
            ErrorKind::PermissionDenied => DplError::Eperm,
            _ => DplError::Esys(e.to_string()),
        }
    }
}

impl From<droplet_network::PoolError> for DplError {
    fn from(e: droplet_network::PoolError) -> Self {
        match e {
            droplet_network::PoolError::ConnectTimeout | droplet_network::PoolError::WriteTimeout => DplError::Etimeout,
            other => DplError::Eio(other.to_string()),
        }
    }
}

impl From<droplet_network::ReplyError> for DplError {
    fn from(e: droplet_network::ReplyError) -> Self {
        match e {
            droplet_network::ReplyError::ReadTimeout => DplError::Etimeout,
            other => DplError::Eio(other.to_string()),
        }
    }
}

impl From<droplet_core::EndpointError> for DplError {
    fn from(e: droplet_core::EndpointError) -> Self {
        match e {
            droplet_core::EndpointError::NoneAvailable | droplet_core::EndpointError::NotFound => DplError::Enoent,
            droplet_core::EndpointError::ResolveFailed(_) => DplError::Esys(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for DplError {
    fn from(e: serde_json::Error) -> Self {
        DplError::Eio(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, true)]
    #[case(206, true)]
    #[case(404, false)]
    #[case(503, false)]
    fn status_mapping_success_flag(#[case] status: u16, #[case] ok: bool) {
        assert_eq!(DplError::from_status(status).is_ok(), ok);
    }

    #[rstest]
    fn status_404_maps_to_enoent() {
        assert_eq!(DplError::from_status(404), Err(DplError::Enoent));
    }

    #[rstest]
    fn status_412_maps_to_eprecond() {
        assert_eq!(DplError::from_status(412), Err(DplError::Eprecond));
    }

    #[rstest]
    fn fivehundreds_blacklist() {
        assert!(DplError::status_blacklists(503));
        assert!(!DplError::status_blacklists(404));
    }
}
