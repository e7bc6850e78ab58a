//! Loopback channel to the external fingerprinting transport.
//!
//! The transport is a local service that performs the actual TLS handshake and
//! HTTP exchange with the target; this side only frames JSON envelopes over a
//! minimal HTTP/1.1 POST. The client handle has an explicit lifecycle
//! (idle, connected, shut down) instead of living as ambient global state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::transport::envelope::{TransportRequest, TransportReply};

/// Maximum response header size accepted from the transport (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

const STATE_IDLE: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

/// Handle to the loopback fingerprinting transport.
///
/// Cheap to clone; all clones share lifecycle state. The first round-trip
/// moves the handle from idle to connected; [`TransportClient::shutdown`] is
/// idempotent and fails all further round-trips.
#[derive(Debug, Clone)]
pub struct TransportClient {
    addr: Arc<str>,
    state: Arc<AtomicU8>,
}

impl TransportClient {
    /// Create a handle for a transport listening at `addr` (e.g.
    /// `127.0.0.1:39231`). No connection is made until the first round-trip.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: Arc::from(addr.into()),
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_SHUTDOWN
    }

    /// Shut the channel down. Idempotent; in-flight round-trips finish, new
    /// ones fail with a transport error.
    pub fn shutdown(&self) {
        let prev = self.state.swap(STATE_SHUTDOWN, Ordering::AcqRel);
        if prev != STATE_SHUTDOWN {
            tracing::debug!("transport channel to {} shut down", self.addr);
        }
    }

    /// Execute one request envelope against the transport.
    ///
    /// `timeout` bounds the entire round-trip; expiry surfaces as a
    /// client-transport error for this call alone.
    pub async fn round_trip(
        &self,
        envelope: &TransportRequest,
        timeout: Duration,
    ) -> Result<TransportReply> {
        self.ensure_open()?;
        let body = serde_json::to_vec(envelope)?;

        let raw = tokio::time::timeout(timeout, self.post("/request", &body))
            .await
            .map_err(|_| {
                Error::transport(format!("transport round-trip timed out after {timeout:?}"))
            })??;

        let reply: TransportReply = serde_json::from_slice(&raw)
            .map_err(|e| Error::transport(format!("undecodable transport reply: {e}")))?;
        Ok(reply)
    }

    /// Fire-and-forget destroy notification for a session identity.
    ///
    /// Idempotent on the transport side; local failures are logged and
    /// swallowed so cleanup can never fail a call.
    pub async fn destroy_session(&self, session_id: &str) {
        if self.is_shutdown() {
            return;
        }
        let path = format!("/sessions/{session_id}/destroy");
        match self.post(&path, b"{}").await {
            Ok(_) => tracing::debug!(session_id, "destroy notification delivered"),
            Err(e) => tracing::debug!(session_id, "destroy notification failed: {e}"),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_SHUTDOWN => Err(Error::transport("transport channel is shut down")),
            _ => Ok(()),
        }
    }

    /// One HTTP/1.1 POST exchange over a fresh loopback connection.
    async fn post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(&*self.addr)
            .await
            .map_err(|e| Error::transport(format!("transport unreachable at {}: {e}", self.addr)))?;

        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_CONNECTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!("transport channel to {} connected", self.addr);
        }

        let mut request = Vec::with_capacity(256 + body.len());
        request.extend_from_slice(b"POST ");
        request.extend_from_slice(path.as_bytes());
        request.extend_from_slice(b" HTTP/1.1\r\nHost: ");
        request.extend_from_slice(self.addr.as_bytes());
        request.extend_from_slice(b"\r\nContent-Type: application/json\r\nContent-Length: ");
        request.extend_from_slice(body.len().to_string().as_bytes());
        request.extend_from_slice(b"\r\nConnection: close\r\n\r\n");
        request.extend_from_slice(body);

        stream
            .write_all(&request)
            .await
            .map_err(|e| Error::transport(format!("failed to write to transport: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::transport(format!("failed to flush to transport: {e}")))?;

        read_response(&mut stream).await
    }
}

/// Read an HTTP/1.1 response and return its body, honoring Content-Length
/// framing and falling back to read-to-EOF.
async fn read_response(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(8192);
    let header_end = loop {
        if buffer.len() >= MAX_HEADERS_SIZE {
            return Err(Error::transport("transport reply headers too large"));
        }
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        let mut read_buf = [0u8; 8192];
        let n = stream
            .read(&mut read_buf)
            .await
            .map_err(|e| Error::transport(format!("failed to read transport reply: {e}")))?;
        if n == 0 {
            return Err(Error::transport(
                "transport closed connection before reply complete",
            ));
        }
        buffer.extend_from_slice(&read_buf[..n]);
    };

    let head = std::str::from_utf8(&buffer[..header_end])
        .map_err(|_| Error::transport("non-UTF-8 transport reply headers"))?
        .to_string();
    let status = parse_status_line(&head)?;
    let content_length = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());

    let mut body = buffer[header_end..].to_vec();
    match content_length {
        Some(len) => {
            while body.len() < len {
                let mut read_buf = [0u8; 8192];
                let n = stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::transport(format!("failed to read transport body: {e}")))?;
                if n == 0 {
                    return Err(Error::transport(
                        "transport closed connection mid-body",
                    ));
                }
                body.extend_from_slice(&read_buf[..n]);
            }
            body.truncate(len);
        }
        None => {
            // No framing header: the transport closes the connection after the body.
            let mut rest = Vec::new();
            stream
                .read_to_end(&mut rest)
                .await
                .map_err(|e| Error::transport(format!("failed to read transport body: {e}")))?;
            body.extend_from_slice(&rest);
        }
    }

    if !(200..300).contains(&status) {
        let diagnostic = String::from_utf8_lossy(&body);
        return Err(Error::transport(format!(
            "transport replied {status}: {diagnostic}"
        )));
    }
    Ok(body)
}

fn parse_status_line(head: &str) -> Result<u16> {
    let line = head
        .lines()
        .next()
        .ok_or_else(|| Error::transport("empty transport reply"))?;
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| Error::transport(format!("malformed transport status line: {line:?}")))
}

/// Find the end of HTTP headers (after `\r\n\r\n`).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
