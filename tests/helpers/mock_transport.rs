//! A mock fingerprinting transport speaking the loopback protocol over TCP.
//!
//! Replies are scripted per request URL; unknown URLs get a plain 200 hop
//! echoing the URL in the body. Destroy notifications are recorded so tests
//! can assert exactly-once session cleanup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One scripted reply for a request URL.
#[derive(Debug, Clone)]
pub struct Scripted {
    /// JSON body of the transport reply.
    pub reply: Value,
    /// Delay before replying, to control completion order in tests.
    pub delay: Option<Duration>,
    /// HTTP status of the channel reply itself (500 simulates a broken
    /// transport channel).
    pub channel_status: u16,
}

#[derive(Default)]
struct State {
    scripted: Mutex<HashMap<String, Scripted>>,
    /// Session ids from destroy notifications, in arrival order.
    destroyed: Mutex<Vec<String>>,
    /// Captured request envelopes, in arrival order.
    envelopes: Mutex<Vec<Value>>,
}

pub struct MockTransport {
    addr: String,
    state: Arc<State>,
}

impl MockTransport {
    /// Bind to a random loopback port and start serving.
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("wraith=debug")
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(State::default());

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, Arc::clone(&accept_state)));
                    }
                    Err(_) => break,
                }
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Script the reply for a request URL.
    pub fn on(&self, url: &str, reply: Value) {
        self.script(
            url,
            Scripted {
                reply,
                delay: None,
                channel_status: 200,
            },
        );
    }

    /// Script a delayed reply.
    pub fn on_delayed(&self, url: &str, reply: Value, delay: Duration) {
        self.script(
            url,
            Scripted {
                reply,
                delay: Some(delay),
                channel_status: 200,
            },
        );
    }

    /// Script a broken channel (non-2xx reply from the transport itself).
    pub fn on_channel_failure(&self, url: &str, status: u16, diagnostic: &str) {
        self.script(
            url,
            Scripted {
                reply: Value::String(diagnostic.to_string()),
                delay: None,
                channel_status: status,
            },
        );
    }

    fn script(&self, url: &str, scripted: Scripted) {
        self.state
            .scripted
            .lock()
            .unwrap()
            .insert(url.to_string(), scripted);
    }

    /// Session ids that received destroy notifications, in order.
    pub fn destroyed_sessions(&self) -> Vec<String> {
        self.state.destroyed.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.state.destroyed.lock().unwrap().len()
    }

    /// Captured request envelopes, in arrival order.
    pub fn envelopes(&self) -> Vec<Value> {
        self.state.envelopes.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.envelopes.lock().unwrap().len()
    }
}

/// Single 200 hop with a text body.
pub fn hop_reply(url: &str, status: u16, body: &str) -> Value {
    json!({
        "isHistory": false,
        "hop": {
            "status": status,
            "target": url,
            "headers": {"Content-Type": ["text/plain; charset=utf-8"]},
            "body": body,
            "isBase64": false
        }
    })
}

/// Redirect-history reply from (status, location, set-cookie, body) tuples.
pub fn history_reply(hops: &[(u16, Option<&str>, Option<&str>, &str)]) -> Value {
    let raw: Vec<Value> = hops
        .iter()
        .map(|(status, location, set_cookie, body)| {
            let mut headers = serde_json::Map::new();
            if let Some(loc) = location {
                headers.insert("Location".into(), json!([loc]));
            }
            if let Some(cookie) = set_cookie {
                headers.insert("Set-Cookie".into(), json!([cookie]));
            }
            json!({"status": status, "headers": headers, "body": body, "isBase64": false})
        })
        .collect();
    json!({"isHistory": true, "history": raw})
}

/// A status-0 hop carrying transport diagnostic text.
pub fn failure_reply(diagnostic: &str) -> Value {
    json!({
        "isHistory": false,
        "hop": {"status": 0, "headers": {}, "body": diagnostic, "isBase64": false}
    })
}

async fn handle_connection(mut stream: TcpStream, state: Arc<State>) {
    let Some((path, body)) = read_request(&mut stream).await else {
        return;
    };

    if path == "/request" {
        let envelope: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => {
                write_response(&mut stream, 400, b"bad envelope").await;
                return;
            }
        };
        let url = envelope["requestUrl"].as_str().unwrap_or_default().to_string();
        state.envelopes.lock().unwrap().push(envelope);

        let scripted = state.scripted.lock().unwrap().get(&url).cloned();
        match scripted {
            Some(scripted) => {
                if let Some(delay) = scripted.delay {
                    tokio::time::sleep(delay).await;
                }
                if scripted.channel_status != 200 {
                    let diagnostic = scripted.reply.as_str().unwrap_or("channel failure");
                    write_response(&mut stream, scripted.channel_status, diagnostic.as_bytes())
                        .await;
                } else {
                    let body = serde_json::to_vec(&scripted.reply).unwrap();
                    write_response(&mut stream, 200, &body).await;
                }
            }
            None => {
                let body = serde_json::to_vec(&hop_reply(&url, 200, &format!("ok:{url}"))).unwrap();
                write_response(&mut stream, 200, &body).await;
            }
        }
    } else if let Some(rest) = path.strip_prefix("/sessions/") {
        if let Some(session_id) = rest.strip_suffix("/destroy") {
            state.destroyed.lock().unwrap().push(session_id.to_string());
        }
        write_response(&mut stream, 200, b"{}").await;
    } else {
        write_response(&mut stream, 404, b"not found").await;
    }
}

/// Read one HTTP/1.1 request; return (path, body).
async fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buffer = Vec::with_capacity(8192);
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let mut read_buf = [0u8; 8192];
        let n = stream.read(&mut read_buf).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&read_buf[..n]);
    };

    let head = std::str::from_utf8(&buffer[..header_end]).ok()?;
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let path = request_line.split_whitespace().nth(1)?.to_string();
    let content_length: usize = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut read_buf = [0u8; 8192];
        let n = stream.read(&mut read_buf).await.ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&read_buf[..n]);
    }
    body.truncate(content_length);
    Some((path, body))
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &[u8]) {
    let reason = if status == 200 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body).await;
    let _ = stream.flush().await;
}
