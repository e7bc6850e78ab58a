//! Decoded responses and redirect hops.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use encoding_rs::Encoding;
use http::StatusCode;
use url::Url;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::headers::HeaderMap;
use crate::render::RenderOptions;
use crate::session::Session;

/// One request/response exchange in a redirect chain.
#[derive(Debug, Clone)]
pub struct Hop {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Body arrived base64-marked as binary.
    pub binary: bool,
}

/// Immutable view over the final hop of a completed call.
///
/// Text and JSON are derived lazily and computed once. The response keeps a
/// back-reference to the session that produced it so it can be escalated to
/// the rendering subsystem later; if that session was temporary and already
/// destroyed, escalation fails with a session-closed error.
#[derive(Debug)]
pub struct Response {
    url: Url,
    status: u16,
    headers: HeaderMap,
    content: Bytes,
    binary: bool,
    /// Earlier hops of the redirect chain, oldest first. Empty unless the
    /// call asked for history.
    history: Vec<Hop>,
    /// Cookies set during this exact call (every hop included).
    cookies: CookieJar,
    encoding: Option<&'static Encoding>,
    elapsed: Duration,
    session: Option<Session>,
    text_cache: OnceLock<String>,
    json_cache: OnceLock<serde_json::Value>,
}

impl Response {
    /// Build a response from a non-empty hop chain. The last hop becomes the
    /// response; the others become its history.
    pub(crate) fn from_hops(
        mut hops: Vec<Hop>,
        cookies: CookieJar,
        session: Option<Session>,
        elapsed: Duration,
    ) -> Result<Self> {
        let last = hops
            .pop()
            .ok_or_else(|| Error::transport("transport reply contained no hops"))?;
        let encoding = declared_encoding(&last.headers);
        Ok(Self {
            url: last.url,
            status: last.status,
            headers: last.headers,
            content: last.body,
            binary: last.binary,
            history: hops,
            cookies,
            encoding,
            elapsed,
            session,
            text_cache: OnceLock::new(),
            json_cache: OnceLock::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Canonical reason phrase for the status, when one exists.
    pub fn reason(&self) -> Option<&'static str> {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw decoded body bytes.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Earlier redirect hops, oldest first.
    pub fn history(&self) -> &[Hop] {
        &self.history
    }

    /// Cookies set by any hop of this call.
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Declared encoding from the Content-Type charset, if any.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The session this response originated from, while it is still alive.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Body decoded as text via the declared charset, else UTF-8 when the
    /// bytes validate. Computed once and cached.
    pub fn text(&self) -> Result<&str> {
        if let Some(text) = self.text_cache.get() {
            return Ok(text);
        }
        let decoded = match self.encoding {
            Some(encoding) => {
                let (cow, _, _) = encoding.decode(&self.content);
                cow.into_owned()
            }
            None => match std::str::from_utf8(&self.content) {
                Ok(text) => text.to_string(),
                Err(_) => return Err(Error::EncodingUndetermined),
            },
        };
        Ok(self.text_cache.get_or_init(|| decoded))
    }

    /// Body parsed as JSON. Computed once and cached.
    pub fn json(&self) -> Result<&serde_json::Value> {
        if let Some(value) = self.json_cache.get() {
            return Ok(value);
        }
        let parsed: serde_json::Value = serde_json::from_str(self.text()?)?;
        Ok(self.json_cache.get_or_init(|| parsed))
    }

    /// Body deserialized into a caller-supplied type.
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.json()?.clone())?)
    }

    /// Escalate to the rendering subsystem: load this response's URL in a
    /// real browser through the originating session and return the rendered
    /// result. Fails with a session-closed error if the originating session
    /// was temporary and has been destroyed.
    pub async fn render(&self, options: RenderOptions) -> Result<Response> {
        let session = self
            .session
            .as_ref()
            .ok_or(Error::SessionClosed)?;
        session.render(self.url.as_str(), options).await
    }
}

/// Charset parameter of the Content-Type header, resolved to an encoding.
fn declared_encoding(headers: &HeaderMap) -> Option<&'static Encoding> {
    let content_type = headers.get("Content-Type")?;
    let charset = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"'))?;
    Encoding::for_label(charset.as_bytes())
}
