//! Reusable request identities.
//!
//! A [`Session`] binds a fingerprint identity, a header map, and a cookie jar
//! together and issues calls through the transport adapter. Handles are cheap
//! to clone and share state; the jar is mutated in place by whichever call
//! currently holds the session.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::Method;
use url::Url;
use uuid::Uuid;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::{BrowserProfile, CustomTlsProfile, Identity, Os};
use crate::headers::{self, HeaderMap};
use crate::render::{RenderOptions, Renderer};
use crate::request::CallOptions;
use crate::response::{Hop, Response};
use crate::transport::adapter::{self, SessionSnapshot};
use crate::transport::TransportClient;

/// Session-construction options, disjoint from per-call [`CallOptions`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Named browser fingerprint. Mutually exclusive with `custom_tls`.
    pub browser: Option<BrowserProfile>,
    /// Fully custom low-level profile. Mutually exclusive with `browser`.
    pub custom_tls: Option<CustomTlsProfile>,
    pub os: Os,
    /// Explicit headers; when unset a plausible set is generated from the
    /// browser profile and OS.
    pub headers: Option<HeaderMap>,
    pub cookies: Option<CookieJar>,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub verify: bool,
    pub randomize_extension_order: bool,
    pub disable_ipv6: bool,
    pub detect_encoding: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser: None,
            custom_tls: None,
            os: Os::default(),
            headers: None,
            cookies: None,
            proxy: None,
            timeout: Duration::from_secs(30),
            verify: true,
            randomize_extension_order: false,
            disable_ipv6: false,
            detect_encoding: true,
        }
    }
}

impl SessionConfig {
    /// A config impersonating the given browser at its latest known version.
    pub fn browser(browser: crate::fingerprint::Browser) -> Self {
        Self {
            browser: Some(BrowserProfile::latest(browser)),
            ..Default::default()
        }
    }

    fn resolve_identity(&self) -> Result<Identity> {
        match (&self.browser, &self.custom_tls) {
            (Some(_), Some(_)) => Err(Error::conflicting(
                "both a browser profile and a custom TLS profile were supplied",
            )),
            (None, Some(custom)) => Ok(Identity::Custom(custom.clone())),
            (profile, None) => Ok(Identity::Browser {
                profile: profile.unwrap_or_default(),
                randomize_extension_order: self.randomize_extension_order,
            }),
        }
    }
}

struct SessionInner {
    identity: Identity,
    os: Os,
    headers: HeaderMap,
    jar: CookieJar,
    proxy: Option<String>,
    timeout: Duration,
    verify: bool,
    disable_ipv6: bool,
    detect_encoding: bool,
    closed: bool,
}

/// A stateful identity issuing calls through the fingerprinting transport.
///
/// Cloning produces another handle to the same session; the underlying
/// identity is destroyed at most once, by the first [`Session::close`].
#[derive(Clone)]
pub struct Session {
    id: Arc<str>,
    inner: Arc<Mutex<SessionInner>>,
    transport: TransportClient,
    renderer: Option<Arc<dyn Renderer>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session against the given transport.
    ///
    /// A browser identity auto-selects its fingerprint profile and, when no
    /// headers were supplied, generates a plausible header set for the
    /// family/version/OS combination.
    pub fn new(transport: TransportClient, config: SessionConfig) -> Result<Self> {
        let identity = config.resolve_identity()?;
        let headers = match &config.headers {
            Some(explicit) => explicit.clone(),
            None => match identity.browser_profile() {
                Some(profile) => headers::generated(profile, config.os),
                None => HeaderMap::new(),
            },
        };

        let inner = SessionInner {
            identity,
            os: config.os,
            headers,
            jar: config.cookies.clone().unwrap_or_default(),
            proxy: config.proxy.clone(),
            timeout: config.timeout,
            verify: config.verify,
            disable_ipv6: config.disable_ipv6,
            detect_encoding: config.detect_encoding,
            closed: false,
        };
        Ok(Self {
            id: Arc::from(Uuid::new_v4().to_string()),
            inner: Arc::new(Mutex::new(inner)),
            transport,
            renderer: None,
        })
    }

    /// Attach a rendering subsystem for render-escalated calls.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Change the declared OS; headers are regenerated deterministically for
    /// the new OS, discarding any prior manual edits.
    pub fn set_os(&self, os: Os) {
        let mut inner = self.lock();
        inner.os = os;
        if let Some(profile) = inner.identity.browser_profile().copied() {
            inner.headers = headers::generated(&profile, os);
        }
    }

    /// Set one session header.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().headers.insert(name, value);
    }

    /// Current session headers.
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    /// Snapshot of the session cookie jar.
    pub fn cookies(&self) -> CookieJar {
        self.lock().jar.clone()
    }

    /// Store a cookie into the session jar.
    pub fn store_cookie(&self, cookie: crate::cookie::Cookie) {
        self.lock().jar.store(cookie);
    }

    /// Close the session. Idempotent: the destroy notification is sent to
    /// the transport exactly once; later calls fail with a session-closed
    /// error.
    pub async fn close(&self) {
        let first = {
            let mut inner = self.lock();
            if inner.closed {
                false
            } else {
                inner.closed = true;
                true
            }
        };
        if first {
            self.transport.destroy_session(&self.id).await;
        }
    }

    pub async fn get(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn patch(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::PATCH, url, options).await
    }

    pub async fn delete(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::DELETE, url, options).await
    }

    pub async fn head(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::HEAD, url, options).await
    }

    pub async fn options(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(Method::OPTIONS, url, options).await
    }

    /// Execute one call through the transport adapter, or through the
    /// rendering subsystem when the render option is set.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: CallOptions,
    ) -> Result<Response> {
        if let Some(render_options) = options.render.clone() {
            return self.render(url, render_options).await;
        }

        let snapshot = self.snapshot()?;
        let (envelope, timeout) = adapter::build_envelope(&snapshot, &method, url, &options)?;

        let started = Instant::now();
        let reply = self.transport.round_trip(&envelope, timeout).await?;
        let elapsed = started.elapsed();

        let hops = adapter::decode_reply(&envelope.request_url, reply)?;
        let response_jar = {
            let mut inner = self.lock();
            adapter::extract_cookies(&hops, &mut inner.jar)
        };
        Response::from_hops(hops, response_jar, Some(self.clone()), elapsed)
    }

    /// Delegate a call to the rendering subsystem and synthesize a response
    /// from the rendered page.
    ///
    /// The page's cookies are applied into the session jar before the
    /// rendering resource is released, even if the caller discards the
    /// returned response.
    pub async fn render(&self, url: &str, options: RenderOptions) -> Result<Response> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let renderer = self
            .renderer
            .clone()
            .ok_or_else(|| Error::render("no renderer configured for this session"))?;

        let started = Instant::now();
        let page = renderer.render(url, options).await?;

        let content = page.content();
        let final_url = Url::parse(page.final_url()).unwrap_or(Url::parse(url)?);
        let status = page.status();
        let headers = page.headers();
        let page_cookies = page.cookies();

        let mut response_jar = CookieJar::new();
        {
            let mut inner = self.lock();
            for cookie in page_cookies {
                inner.jar.store(cookie.clone());
                response_jar.store(cookie);
            }
        }
        page.release().await;
        let elapsed = started.elapsed();

        let hop = Hop {
            url: final_url,
            status,
            headers,
            body: content,
            binary: false,
        };
        Response::from_hops(vec![hop], response_jar, Some(self.clone()), elapsed)
    }

    fn snapshot(&self) -> Result<SessionSnapshot> {
        let inner = self.lock();
        if inner.closed {
            return Err(Error::SessionClosed);
        }
        Ok(SessionSnapshot {
            id: self.id.to_string(),
            identity: inner.identity.clone(),
            headers: inner.headers.clone(),
            jar: inner.jar.clone(),
            proxy: inner.proxy.clone(),
            timeout: inner.timeout,
            verify: inner.verify,
            disable_ipv6: inner.disable_ipv6,
            detect_encoding: inner.detect_encoding,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session mutex poisoned")
    }
}
