//! Shared REST wire transport (spec.md §4.3 wired to §4.5/§4.6): lowers
//! a backend's headers and body into an HTTP/1.1 request, writes it over
//! a pooled connection, and reads the reply through the reply reader.
//! Only the header/body shape differs per backend — that part is built
//! upstream by `backend::*::build_request`/`parse_reply`; this module is
//! the part that is genuinely shared.
//!
//! `SPEC_FULL.md` describes this collaborator as "a thin `HttpClient`
//! wrapping `reqwest`"; this crate instead composes `droplet-network`'s
//! connection pool and reply reader directly, since spec.md §6 pins down
//! the request-line format byte for byte and `reqwest` does not expose
//! that level of control over framing or endpoint blacklisting. See
//! DESIGN.md for the record of this divergence.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use droplet_core::EndpointList;
use droplet_network::{Connector, ConnectionPool, PlaintextConnector, ReplyReader, TlsConnector};

use crate::config::Profile;
use crate::error::DplError;
use crate::request::Method;
use crate::signer::encode_resource;

/// One fully-buffered HTTP reply: status, headers, and body.
#[derive(Debug, Clone)]
pub struct WireReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// `<METHOD> <url-encoded-resource>[?subresource] HTTP/1.1\r\n` (spec.md
/// §6): the leading slash is never percent-encoded, the rest of the
/// resource is.
fn build_request_line(method: Method, resource: &str, subresource: Option<&str>) -> String {
    let mut line = String::new();
    line.push_str(method.as_str());
    line.push(' ');
    line.push_str(&encode_resource(resource));
    if let Some(sub) = subresource {
        line.push('?');
        line.push_str(sub);
    }
    line.push_str(" HTTP/1.1\r\n");
    line
}

/// Performs one full request/reply exchange against `addr`: opens (or
/// reuses) a pooled connection, writes the request line, headers and
/// body, reads the reply head and body, and returns the connection to
/// the pool or terminates it depending on `Connection: close` and
/// transport failures (spec.md §4.3's failure policy).
#[allow(clippy::too_many_arguments)]
async fn exchange(
    pool: &Arc<ConnectionPool>,
    addr: SocketAddr,
    use_tls: bool,
    hostname: &str,
    method: Method,
    resource: &str,
    subresource: Option<&str>,
    headers: &[(String, String)],
    body: Option<&[u8]>,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<WireReply, DplError> {
    let connector: Box<dyn Connector> = if use_tls {
        Box::new(TlsConnector::new(hostname))
    } else {
        Box::new(PlaintextConnector)
    };

    let mut conn = pool.open(addr, connector.as_ref()).await?;

    let request_line = build_request_line(method, resource, subresource);
    let mut wire = Vec::with_capacity(request_line.len() + 256);
    wire.extend_from_slice(request_line.as_bytes());
    for (k, v) in headers {
        wire.extend_from_slice(k.as_bytes());
        wire.extend_from_slice(b": ");
        wire.extend_from_slice(v.as_bytes());
        wire.extend_from_slice(b"\r\n");
    }
    if let Some(b) = body {
        wire.extend_from_slice(format!("Content-Length: {}\r\n", b.len()).as_bytes());
    }
    wire.extend_from_slice(b"\r\n");
    if let Some(b) = body {
        wire.extend_from_slice(b);
    }

    if let Err(e) = conn.writev_all(&[&wire], write_timeout).await {
        pool.terminate(conn);
        return Err(e.into());
    }

    let outcome = {
        let mut reader = ReplyReader::new(&mut conn);
        match reader.read_head(read_timeout).await {
            Ok(head) => {
                // HEAD replies may carry a Content-Length header without an
                // actual body on the wire; reading it would block until the
                // read timeout.
                let body_bytes = if method == Method::Head {
                    Ok(Vec::new())
                } else {
                    reader.read_body_to_end(read_timeout).await
                };
                body_bytes.map(|b| (head, b))
            }
            Err(e) => Err(e),
        }
    };

    match outcome {
        Ok((head, body)) => {
            let keep_alive = head
                .header("connection")
                .map(|v| !v.eq_ignore_ascii_case("close"))
                .unwrap_or(true);
            let status = head.status_code;
            let headers = head.headers.into_iter().map(|h| (h.name, h.value)).collect();
            if keep_alive {
                pool.release(conn);
            } else {
                pool.terminate(conn);
            }
            Ok(WireReply { status, headers, body })
        }
        Err(e) => {
            pool.terminate(conn);
            Err(e.into())
        }
    }
}

/// Binds a profile's endpoint list and connection pool together so
/// per-backend callers only have to supply the already-built headers and
/// body, not re-implement endpoint selection and blacklisting each time.
pub struct RestExecutor {
    profile: Profile,
    endpoints: Arc<EndpointList>,
    pool: Arc<ConnectionPool>,
}

impl RestExecutor {
    #[must_use]
    pub fn new(profile: Profile, endpoints: Arc<EndpointList>, pool: Arc<ConnectionPool>) -> Self {
        Self { profile, endpoints, pool }
    }

    /// Selects an endpoint, performs the exchange, and blacklists the
    /// endpoint on a 5xx status or any transport failure (spec.md §4.3/
    /// §7).
    pub async fn call(
        &self,
        method: Method,
        resource: &str,
        subresource: Option<&str>,
        hostname: &str,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<WireReply, DplError> {
        let endpoint = self.endpoints.get_rand()?;
        let outcome = exchange(
            &self.pool,
            endpoint.addr,
            self.profile.use_https,
            hostname,
            method,
            resource,
            subresource,
            headers,
            body,
            self.profile.read_timeout,
            self.profile.write_timeout,
        )
        .await;

        match outcome {
            Ok(reply) => {
                if DplError::status_blacklists(reply.status) {
                    let _ = self.endpoints.blacklist(&endpoint.host, endpoint.port, 30);
                    tracing::warn!(target: "droplet::http", host = %endpoint.host, status = reply.status, "blacklisting endpoint after 5xx reply");
                }
                Ok(reply)
            }
            Err(e) => {
                let _ = self.endpoints.blacklist(&endpoint.host, endpoint.port, 30);
                tracing::error!(target: "droplet::http", host = %endpoint.host, error = %e, "blacklisting endpoint after transport failure");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_preserves_leading_slash_and_appends_subresource() {
        let line = build_request_line(Method::Get, "/a b", Some("acl"));
        assert_eq!(line, "GET /a%20b?acl HTTP/1.1\r\n");
    }

    #[test]
    fn request_line_has_no_subresource_when_absent() {
        let line = build_request_line(Method::Put, "/o", None);
        assert_eq!(line, "PUT /o HTTP/1.1\r\n");
    }
}
