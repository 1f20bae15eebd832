//! Endpoint list (C2): a mutex-guarded, ordered set of resolved addresses
//! with blacklisting, used to disperse and temporarily exclude failing
//! hosts from connection selection.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;

/// Sentinel meaning "blacklisted forever" for `blacklist_expire`.
pub const BLACKLIST_PERMANENT: i64 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("no such endpoint")]
    NotFound,
    #[error("endpoint list is empty or all entries are blacklisted")]
    NoneAvailable,
    #[error("failed to resolve host: {0}")]
    ResolveFailed(String),
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

/// A single endpoint: host/port as configured, the resolved socket
/// address, and blacklist expiry. `blacklist_expire == 0` means
/// available; `== -1` means permanently blacklisted; otherwise it is an
/// absolute wall-clock second count after which the entry becomes
/// available again on the next [`EndpointList::refresh_blacklist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
    pub blacklist_expire: i64,
}

impl Endpoint {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.blacklist_expire == 0
    }
}

struct Inner {
    default_port: u16,
    entries: Vec<Endpoint>,
}

/// Mutex-guarded ordered set of endpoints, uniquely keyed by
/// (resolved address, port). Every public operation has a `_nolock`
/// variant for callers that already hold the lock (e.g. while iterating)
/// and a locking variant that wraps it.
pub struct EndpointList {
    inner: Mutex<Inner>,
}

impl EndpointList {
    #[must_use]
    pub fn new(default_port: u16) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_port,
                entries: Vec::new(),
            }),
        }
    }

    /// Resolves `host:port` (or `host` with the list's default port) once
    /// and adds it at a random position among existing entries, to avoid
    /// pathological "always pick the first" behavior under predictable
    /// workloads. Adding a duplicate (address, port) is idempotent: its
    /// blacklist expiry is reset to 0 (available) and success is returned.
    pub fn add(&self, host: &str, port: Option<u16>) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().expect("endpoint list mutex poisoned");
        let port = port.unwrap_or(inner.default_port);
        let addr = resolve_one(host, port)?;

        if let Some(existing) = inner.entries.iter_mut().find(|e| e.addr == addr) {
            existing.blacklist_expire = 0;
            return Ok(());
        }

        let entry = Endpoint {
            host: host.to_string(),
            port,
            addr,
            blacklist_expire: 0,
        };

        let pos = if inner.entries.is_empty() {
            0
        } else {
            rand::rng().random_range(0..=inner.entries.len())
        };
        inner.entries.insert(pos, entry);
        Ok(())
    }

    /// Parses a semicolon/comma/space separated `host[:port]` list and
    /// adds each entry.
    pub fn add_from_str(&self, list: &str) -> Result<(), EndpointError> {
        for token in list.split(|c| c == ';' || c == ',' || c == ' ') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.rsplit_once(':') {
                Some((host, port_str)) if port_str.chars().all(|c| c.is_ascii_digit()) && !port_str.is_empty() => {
                    let port: u16 = port_str
                        .parse()
                        .map_err(|_| EndpointError::ResolveFailed(token.to_string()))?;
                    self.add(host, Some(port))?;
                }
                _ => self.add(token, None)?,
            }
        }
        Ok(())
    }

    /// Replaces the full contents of the list with the parsed result of
    /// `list`.
    pub fn set_from_str(&self, list: &str) -> Result<(), EndpointError> {
        self.clear();
        self.add_from_str(list)
    }

    /// Returns the `(n mod count_avail)`-th non-blacklisted entry in list
    /// order, after refreshing expired blacklist entries.
    pub fn get_nth(&self, n: u32) -> Result<Endpoint, EndpointError> {
        self.refresh_blacklist();
        let inner = self.inner.lock().expect("endpoint list mutex poisoned");
        get_nth_nolock(&inner.entries, n)
    }

    /// Like [`EndpointList::get_nth`] but selects a pseudo-random index.
    pub fn get_rand(&self) -> Result<Endpoint, EndpointError> {
        let n: u32 = rand::rng().random();
        self.get_nth(n)
    }

    /// Total number of entries, blacklisted or not.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().expect("endpoint list mutex poisoned").entries.len()
    }

    /// Number of non-blacklisted entries (after an implicit refresh).
    #[must_use]
    pub fn count_avail(&self) -> usize {
        self.refresh_blacklist();
        self.inner
            .lock()
            .expect("endpoint list mutex poisoned")
            .entries
            .iter()
            .filter(|e| e.is_available())
            .count()
    }

    /// Blacklists the entry matching `(host, port)` for `expire_seconds`,
    /// or permanently if `expire_seconds == -1`.
    pub fn blacklist(&self, host: &str, port: u16, expire_seconds: i64) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().expect("endpoint list mutex poisoned");
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.host == host && e.port == port)
            .ok_or(EndpointError::NotFound)?;
        entry.blacklist_expire = if expire_seconds == BLACKLIST_PERMANENT {
            BLACKLIST_PERMANENT
        } else {
            now_secs() + expire_seconds
        };
        Ok(())
    }

    /// Blacklists by resolved address, used after an I/O failure on an
    /// already-resolved connection.
    pub fn blacklist_addr(&self, addr: SocketAddr, expire_seconds: i64) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().expect("endpoint list mutex poisoned");
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.addr == addr)
            .ok_or(EndpointError::NotFound)?;
        entry.blacklist_expire = if expire_seconds == BLACKLIST_PERMANENT {
            BLACKLIST_PERMANENT
        } else {
            now_secs() + expire_seconds
        };
        Ok(())
    }

    /// Clears the blacklist status for `(host, port)`.
    pub fn unblacklist(&self, host: &str, port: u16) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().expect("endpoint list mutex poisoned");
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.host == host && e.port == port)
            .ok_or(EndpointError::NotFound)?;
        entry.blacklist_expire = 0;
        Ok(())
    }

    /// Clears blacklist expiries that are `<= now` (permanent entries,
    /// `-1`, are never cleared by refresh).
    pub fn refresh_blacklist(&self) {
        let mut inner = self.inner.lock().expect("endpoint list mutex poisoned");
        let now = now_secs();
        for entry in &mut inner.entries {
            if entry.blacklist_expire != 0
                && entry.blacklist_expire != BLACKLIST_PERMANENT
                && entry.blacklist_expire <= now
            {
                entry.blacklist_expire = 0;
            }
        }
    }

    /// Empties the list.
    pub fn clear(&self) {
        self.inner.lock().expect("endpoint list mutex poisoned").entries.clear();
    }
}

fn get_nth_nolock(entries: &[Endpoint], n: u32) -> Result<Endpoint, EndpointError> {
    let avail: Vec<&Endpoint> = entries.iter().filter(|e| e.is_available()).collect();
    if avail.is_empty() {
        return Err(EndpointError::NoneAvailable);
    }
    let idx = (n as usize) % avail.len();
    Ok(avail[idx].clone())
}

fn resolve_one(host: &str, port: u16) -> Result<SocketAddr, EndpointError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| EndpointError::ResolveFailed(e.to_string()))?
        .next()
        .ok_or_else(|| EndpointError::ResolveFailed(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn list_with(n: usize) -> EndpointList {
        let list = EndpointList::new(80);
        for i in 0..n {
            list.add(&format!("127.0.0.{}", i + 1), Some(8000 + i as u16)).unwrap();
        }
        list
    }

    #[rstest]
    fn get_nth_wraps_around_count() {
        let list = list_with(4);
        let count = list.count() as u32;
        for i in 0..count {
            assert_eq!(
                list.get_nth(i).unwrap().addr,
                list.get_nth(i + count).unwrap().addr
            );
        }
    }

    #[rstest]
    fn blacklist_then_refresh_before_expiry_stays_blacklisted() {
        let list = list_with(1);
        list.blacklist("127.0.0.1", 8000, 100).unwrap();
        list.refresh_blacklist();
        assert_eq!(list.count_avail(), 0);
    }

    #[rstest]
    fn blacklist_permanent_survives_refresh() {
        let list = list_with(1);
        list.blacklist("127.0.0.1", 8000, BLACKLIST_PERMANENT).unwrap();
        list.refresh_blacklist();
        assert_eq!(list.count_avail(), 0);
    }

    #[rstest]
    fn get_nth_on_empty_available_set_errs() {
        let list = list_with(1);
        list.blacklist("127.0.0.1", 8000, BLACKLIST_PERMANENT).unwrap();
        assert_eq!(list.get_nth(0), Err(EndpointError::NoneAvailable));
    }

    #[rstest]
    fn duplicate_add_is_idempotent_and_clears_blacklist() {
        let list = list_with(1);
        list.blacklist("127.0.0.1", 8000, BLACKLIST_PERMANENT).unwrap();
        assert_eq!(list.count_avail(), 0);
        list.add("127.0.0.1", Some(8000)).unwrap();
        assert_eq!(list.count(), 1);
        assert_eq!(list.count_avail(), 1);
    }
}
