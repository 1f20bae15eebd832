//! HTTP reply reader (C4): a small state machine that turns a byte stream
//! from a [`crate::pool::Connection`] into a status line, a header dict,
//! and a body delivered either by `Content-Length` or chunked transfer
//! encoding, without buffering the whole response when the caller only
//! wants to stream it.

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::pool::Connection;

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("connection closed before a complete status line was read")]
    TruncatedStatusLine,
    #[error("connection closed before headers were complete")]
    TruncatedHeaders,
    #[error("connection closed before the declared body was complete")]
    TruncatedBody,
    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),
    #[error("malformed chunk size")]
    MalformedChunkSize,
    #[error("header parse error: {0}")]
    Header(String),
    #[error("read timed out")]
    ReadTimeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the body of a reply is delimited, decided from the response
/// headers once they have been fully read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    ContentLength(u64),
    Chunked,
    /// No `Content-Length` and not chunked: body runs until EOF.
    UntilClose,
    /// No body is expected at all (e.g. HEAD, 204, 304).
    Empty,
}

#[derive(Debug, Clone)]
pub struct ReplyHeader {
    pub name: String,
    pub value: String,
}

/// A fully parsed status line and header block. The body is read
/// separately via [`ReplyReader::read_body_chunk`] so large bodies are
/// never forced into memory.
#[derive(Debug, Clone)]
pub struct ReplyHead {
    pub status_code: u16,
    pub reason: String,
    pub headers: Vec<ReplyHeader>,
}

impl ReplyHead {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Reads one HTTP reply off a connection's transport, exposing the head
/// immediately and the body incrementally.
pub struct ReplyReader<'c> {
    conn: &'c mut Connection,
    framing: Option<BodyFraming>,
    remaining: u64,
    chunk_remaining: u64,
    finished: bool,
}

const MAX_HEAD_BYTES: usize = 64 * 1024;
const READ_CHUNK: usize = 8192;

impl<'c> ReplyReader<'c> {
    #[must_use]
    pub fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            framing: None,
            remaining: 0,
            chunk_remaining: 0,
            finished: false,
        }
    }

    async fn fill_until(&mut self, needle: &[u8], read_timeout: Duration) -> Result<usize, ReplyError> {
        loop {
            if let Some(pos) = find_subslice(&self.conn.read_buf[self.conn.read_pos..], needle) {
                return Ok(self.conn.read_pos + pos);
            }
            if self.conn.read_buf.len() - self.conn.read_pos > MAX_HEAD_BYTES {
                return Err(ReplyError::Header("reply head exceeds size limit".into()));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = tokio::time::timeout(read_timeout, self.conn.transport.read(&mut chunk))
                .await
                .map_err(|_| ReplyError::ReadTimeout)??;
            if n == 0 {
                self.conn.eof = true;
                return Err(ReplyError::TruncatedHeaders);
            }
            self.conn.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Reads and parses the status line and headers. Must be called
    /// exactly once, before any [`Self::read_body_chunk`] call.
    pub async fn read_head(&mut self, read_timeout: Duration) -> Result<ReplyHead, ReplyError> {
        let head_end = self.fill_until(b"\r\n\r\n", read_timeout).await?;
        let head_bytes = self.conn.read_buf[self.conn.read_pos..head_end].to_vec();
        self.conn.read_pos = head_end + 4;

        let mut lines = head_bytes.split(|&b| b == b'\n').map(strip_cr);
        let status_line = lines.next().ok_or(ReplyError::TruncatedStatusLine)?;
        let (status_code, reason) = parse_status_line(status_line)?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let text = std::str::from_utf8(line).map_err(|e| ReplyError::Header(e.to_string()))?;
            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| ReplyError::Header(format!("no colon in header line {text:?}")))?;
            headers.push(ReplyHeader {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }

        let head = ReplyHead { status_code, reason, headers };
        self.framing = Some(decide_framing(&head));
        if let Some(BodyFraming::ContentLength(len)) = self.framing {
            self.remaining = len;
        }
        Ok(head)
    }

    /// Reads the next piece of body data, or `None` once the body is
    /// fully consumed. Each call may perform at most one network read.
    pub async fn read_body_chunk(&mut self, read_timeout: Duration) -> Result<Option<Vec<u8>>, ReplyError> {
        match self.framing.expect("read_head must be called first") {
            BodyFraming::Empty => Ok(None),
            BodyFraming::ContentLength(_) => self.read_content_length_chunk(read_timeout).await,
            BodyFraming::Chunked => self.read_chunked_chunk(read_timeout).await,
            BodyFraming::UntilClose => self.read_until_close_chunk(read_timeout).await,
        }
    }

    async fn ensure_buffered(&mut self, read_timeout: Duration) -> Result<bool, ReplyError> {
        if self.conn.read_pos < self.conn.read_buf.len() {
            return Ok(true);
        }
        self.conn.read_buf.clear();
        self.conn.read_pos = 0;
        let mut chunk = vec![0u8; READ_CHUNK];
        let n = tokio::time::timeout(read_timeout, self.conn.transport.read(&mut chunk))
            .await
            .map_err(|_| ReplyError::ReadTimeout)??;
        if n == 0 {
            self.conn.eof = true;
            return Ok(false);
        }
        chunk.truncate(n);
        self.conn.read_buf = chunk;
        Ok(true)
    }

    async fn read_content_length_chunk(&mut self, read_timeout: Duration) -> Result<Option<Vec<u8>>, ReplyError> {
        if self.remaining == 0 || self.finished {
            self.finished = true;
            return Ok(None);
        }
        if !self.ensure_buffered(read_timeout).await? {
            return Err(ReplyError::TruncatedBody);
        }
        let available = self.conn.read_buf.len() - self.conn.read_pos;
        let take = available.min(self.remaining as usize);
        let out = self.conn.read_buf[self.conn.read_pos..self.conn.read_pos + take].to_vec();
        self.conn.read_pos += take;
        self.remaining -= take as u64;
        if self.remaining == 0 {
            self.finished = true;
        }
        Ok(Some(out))
    }

    async fn read_until_close_chunk(&mut self, read_timeout: Duration) -> Result<Option<Vec<u8>>, ReplyError> {
        if self.finished {
            return Ok(None);
        }
        if !self.ensure_buffered(read_timeout).await? {
            self.finished = true;
            return Ok(None);
        }
        let out = self.conn.read_buf[self.conn.read_pos..].to_vec();
        self.conn.read_pos = self.conn.read_buf.len();
        Ok(Some(out))
    }

    async fn read_chunked_chunk(&mut self, read_timeout: Duration) -> Result<Option<Vec<u8>>, ReplyError> {
        if self.finished {
            return Ok(None);
        }
        if self.chunk_remaining == 0 {
            let line_end = self.fill_until(b"\r\n", read_timeout).await?;
            let size_line = self.conn.read_buf[self.conn.read_pos..line_end].to_vec();
            self.conn.read_pos = line_end + 2;
            let size_text = std::str::from_utf8(&size_line).map_err(|_| ReplyError::MalformedChunkSize)?;
            let size_text = size_text.split(';').next().unwrap_or("").trim();
            let size = u64::from_str_radix(size_text, 16).map_err(|_| ReplyError::MalformedChunkSize)?;
            if size == 0 {
                // Trailing headers (if any) then final CRLF; we do not
                // surface trailers, matching the original's behavior.
                let _ = self.fill_until(b"\r\n\r\n", read_timeout).await.or_else(|_| {
                    self.fill_until(b"\r\n", read_timeout).await
                });
                self.finished = true;
                return Ok(None);
            }
            self.chunk_remaining = size;
        }

        if !self.ensure_buffered(read_timeout).await? {
            return Err(ReplyError::TruncatedBody);
        }
        let available = self.conn.read_buf.len() - self.conn.read_pos;
        let take = available.min(self.chunk_remaining as usize);
        let out = self.conn.read_buf[self.conn.read_pos..self.conn.read_pos + take].to_vec();
        self.conn.read_pos += take;
        self.chunk_remaining -= take as u64;

        if self.chunk_remaining == 0 {
            // consume the trailing CRLF after the chunk data
            let _ = self.fill_until(b"\r\n", read_timeout).await;
            if self.conn.read_pos + 2 <= self.conn.read_buf.len() {
                self.conn.read_pos += 2;
            }
        }
        Ok(Some(out))
    }

    /// Reads and discards the whole body, returning it concatenated.
    /// Convenience for backends that need the full buffer (e.g. to parse
    /// an XML or JSON error body).
    pub async fn read_body_to_end(&mut self, read_timeout: Duration) -> Result<Vec<u8>, ReplyError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read_body_chunk(read_timeout).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

fn decide_framing(head: &ReplyHead) -> BodyFraming {
    if matches!(head.status_code, 204 | 304) {
        return BodyFraming::Empty;
    }
    if let Some(te) = head.header("transfer-encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return BodyFraming::Chunked;
        }
    }
    if let Some(cl) = head.header("content-length") {
        if let Ok(len) = cl.trim().parse::<u64>() {
            return BodyFraming::ContentLength(len);
        }
    }
    BodyFraming::UntilClose
}

fn parse_status_line(line: &[u8]) -> Result<(u16, String), ReplyError> {
    let text = std::str::from_utf8(line).map_err(|e| ReplyError::MalformedStatusLine(e.to_string()))?;
    let mut parts = text.splitn(3, ' ');
    let _version = parts.next().ok_or_else(|| ReplyError::MalformedStatusLine(text.to_string()))?;
    let code = parts.next().ok_or_else(|| ReplyError::MalformedStatusLine(text.to_string()))?;
    let reason = parts.next().unwrap_or("").to_string();
    let status_code = code
        .parse::<u16>()
        .map_err(|_| ReplyError::MalformedStatusLine(text.to_string()))?;
    Ok((status_code, reason))
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PlaintextConnector;

    async fn reply_over_loopback(response: &'static [u8]) -> Connection {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            use tokio::io::AsyncWriteExt;
            sock.write_all(response).await.unwrap();
        });
        let pool = crate::pool::ConnectionPool::new(crate::pool::PoolConfig::default());
        pool.open(addr, &PlaintextConnector).await.unwrap()
    }

    #[tokio::test]
    async fn reads_content_length_body() {
        let mut conn = reply_over_loopback(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\nhello",
        )
        .await;
        let mut reader = ReplyReader::new(&mut conn);
        let head = reader.read_head(Duration::from_secs(5)).await.unwrap();
        assert_eq!(head.status_code, 200);
        assert_eq!(head.header("content-type"), Some("text/plain"));
        let body = reader.read_body_to_end(Duration::from_secs(5)).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn reads_chunked_body() {
        let mut conn =
            reply_over_loopback(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n")
                .await;
        let mut reader = ReplyReader::new(&mut conn);
        reader.read_head(Duration::from_secs(5)).await.unwrap();
        let body = reader.read_body_to_end(Duration::from_secs(5)).await.unwrap();
        assert_eq!(body, b"Wikipedia");
    }

    #[tokio::test]
    async fn no_body_status_yields_empty() {
        let mut conn = reply_over_loopback(b"HTTP/1.1 304 Not Modified\r\nETag: \"x\"\r\n\r\n").await;
        let mut reader = ReplyReader::new(&mut conn);
        let head = reader.read_head(Duration::from_secs(5)).await.unwrap();
        assert_eq!(head.status_code, 304);
        let body = reader.read_body_to_end(Duration::from_secs(5)).await.unwrap();
        assert!(body.is_empty());
    }
}
