//! Context construction (spec.md §6 "Context construction inputs",
//! §9/SPEC_FULL.md §2 "Profile-driven backend selection"): the aggregate
//! that owns a profile, the selected backend's vtable, the endpoint list,
//! and the connection pool, mirroring the original `dpl_ctx_t`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use droplet_core::EndpointList;
use droplet_network::{ConnectionPool, PoolConfig};

use crate::config::Profile;
use crate::error::DplError;
use crate::vtable::Backend;

/// Everything one caller thread needs to drive the dispatch layer against
/// a single profile. Cheaply cloneable — every field is an `Arc` or, for
/// the profile, owned data that is itself cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub profile: Profile,
    pub backend: Arc<dyn Backend>,
    pub endpoints: Arc<EndpointList>,
    pub pool: Arc<ConnectionPool>,
    /// Serializes JSON materialization the way the original re-enters its
    /// context mutex around non-reentrant JSON library calls (spec.md §5).
    /// `serde_json` is reentrant, so nothing in this crate actually needs
    /// the lock; it is kept so callers porting code from the original
    /// still have a place to take it.
    pub json_lock: Arc<Mutex<()>>,
}

impl Context {
    /// Builds a context from an already-resolved profile: creates the
    /// endpoint list and connection pool from the profile's fields and
    /// selects the named backend.
    pub fn new(profile: Profile) -> Result<Self, DplError> {
        let endpoints = EndpointList::new(profile.port.unwrap_or(if profile.use_https { 443 } else { 80 }));
        endpoints.add_from_str(&profile.host)?;
        let endpoints = Arc::new(endpoints);

        let pool = ConnectionPool::new(PoolConfig {
            max_connections: profile.pool_max_connections,
            max_hits: profile.pool_max_hits,
            idle_time: profile.pool_idle_time,
            connect_timeout: profile.connect_timeout,
        });

        let backend = select_backend(&profile, endpoints.clone(), pool.clone())?;

        Ok(Self { profile, backend, endpoints, pool, json_lock: Arc::new(Mutex::new(())) })
    }

    /// Reads `<dir>/<profile_name>.profile` and builds a context from it
    /// (spec.md §6 "Context construction inputs").
    pub fn from_profile_dir(dir: &Path, profile_name: &str) -> Result<Self, DplError> {
        let profile = Profile::read(dir, profile_name)?;
        Self::new(profile)
    }
}

/// Dispatches on `profile.backend` to build the named vtable
/// implementation (spec.md §4.9 "Backend vtable registration").
fn select_backend(profile: &Profile, endpoints: Arc<EndpointList>, pool: Arc<ConnectionPool>) -> Result<Arc<dyn Backend>, DplError> {
    match profile.backend.as_str() {
        "s3" => Ok(Arc::new(crate::backend::s3::S3Backend::new(profile.clone(), endpoints, pool))),
        "cdmi" => Ok(Arc::new(crate::backend::cdmi::CdmiBackend::new(profile.clone(), endpoints, pool, false))),
        "cdmi_http_compat" => Ok(Arc::new(crate::backend::cdmi::CdmiBackend::new(profile.clone(), endpoints, pool, true))),
        "sproxyd" => Ok(Arc::new(crate::backend::sproxyd::SproxydBackend::new(profile.clone(), endpoints, pool))),
        "srws" => Ok(Arc::new(crate::backend::srws::SrwsBackend::new(profile.clone(), endpoints, pool))),
        "swift" => Ok(Arc::new(crate::backend::swift::SwiftBackend::new(profile.clone(), endpoints, pool))),
        "posix" => Ok(Arc::new(crate::backend::posix::PosixBackend::new())),
        _ => Err(DplError::Einval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn unknown_backend_name_is_rejected() {
        let endpoints = Arc::new(EndpointList::new(80));
        let pool = ConnectionPool::new(PoolConfig::default());
        let mut bad = Profile::test_default();
        bad.backend = "nonexistent".to_string();
        assert!(select_backend(&bad, endpoints, pool).is_err());
    }

    #[rstest]
    fn posix_backend_selects_without_network_setup() {
        let mut profile = Profile::test_default();
        profile.backend = "posix".to_string();
        profile.host = "127.0.0.1".to_string();
        let ctx = Context::new(profile).unwrap();
        assert_eq!(ctx.backend.name(), "posix");
    }

    #[rstest]
    fn s3_backend_selects_and_resolves_host() {
        let mut profile = Profile::test_default();
        profile.host = "127.0.0.1".to_string();
        let ctx = Context::new(profile).unwrap();
        assert_eq!(ctx.backend.name(), "s3");
    }
}
