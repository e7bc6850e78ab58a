//! Single-call planning and lifecycle.
//!
//! A [`CallDescriptor`] binds per-call options to either a caller-supplied
//! (borrowed) session or a temporary (owned) one synthesized on demand, and
//! guarantees an owned session is destroyed exactly once whatever the
//! terminal path: success, failure, or abandonment by a scheduler.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

use crate::error::{Error, Result};
use crate::headers::HeaderMap;
use crate::render::{RenderOptions, Renderer};
use crate::response::Response;
use crate::session::{Session, SessionConfig};
use crate::transport::TransportClient;

/// Per-call options, disjoint from session construction.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Extra headers for this call; win over session headers on conflict.
    pub headers: Option<HeaderMap>,
    /// Cookie overrides scoped to this call's URL.
    pub cookies: Vec<(String, String)>,
    /// Query parameters appended to the request URL.
    pub params: Vec<(String, String)>,
    /// Raw body, sent as-is (base64-marked when binary).
    pub data: Option<Bytes>,
    /// JSON payload; serialized, with a default content-type unless one is
    /// already set. Mutually exclusive with `data`.
    pub json: Option<serde_json::Value>,
    /// Follow redirects (default true).
    pub follow_redirects: Option<bool>,
    /// Ask the transport for every hop of the redirect chain.
    pub want_history: bool,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    pub verify: Option<bool>,
    /// Delegate this call to the rendering subsystem.
    pub render: Option<RenderOptions>,
    /// Extra content-decoding hint for the transport.
    pub additional_decode: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name, value);
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn want_history(mut self, want: bool) -> Self {
        self.want_history = want;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn render(mut self, options: RenderOptions) -> Self {
        self.render = Some(options);
        self
    }
}

enum Binding {
    /// No session yet; one is synthesized on the next send.
    Unbound,
    /// Caller-supplied session, never destroyed by this descriptor.
    Borrowed(Session),
}

/// A single planned call with its outcome slot.
pub struct CallDescriptor {
    transport: TransportClient,
    renderer: Option<Arc<dyn Renderer>>,
    method: Method,
    url: String,
    options: CallOptions,
    session_config: Option<SessionConfig>,
    binding: Binding,
    raise_on_error: bool,
    response: Option<Response>,
    error: Option<Error>,
}

impl std::fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("raise_on_error", &self.raise_on_error)
            .field("has_response", &self.response.is_some())
            .field("has_error", &self.error.is_some())
            .finish_non_exhaustive()
    }
}

impl CallDescriptor {
    pub fn new(transport: TransportClient, method: Method, url: impl Into<String>) -> Self {
        Self {
            transport,
            renderer: None,
            method,
            url: url.into(),
            options: CallOptions::default(),
            session_config: None,
            binding: Binding::Unbound,
            raise_on_error: true,
            response: None,
            error: None,
        }
    }

    pub fn get(transport: TransportClient, url: impl Into<String>) -> Self {
        Self::new(transport, Method::GET, url)
    }

    pub fn post(transport: TransportClient, url: impl Into<String>) -> Self {
        Self::new(transport, Method::POST, url)
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Borrow a caller-supplied session. The descriptor will never destroy it.
    pub fn session(mut self, session: Session) -> Self {
        self.binding = Binding::Borrowed(session);
        self
    }

    /// Session-construction options for a temporary (owned) session.
    /// Conflicts with [`CallDescriptor::session`].
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    /// Renderer attached to any synthesized owned session.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Whether failures propagate from [`CallDescriptor::send`] (default) or
    /// are recorded on the descriptor for later inspection. Configuration
    /// errors always propagate regardless.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Execute the call and settle the outcome slot.
    ///
    /// An owned session is created on demand (from the session config, or a
    /// default identity) and destroyed exactly once when this send reaches a
    /// terminal state, including cancellation mid-flight.
    pub async fn send(&mut self) -> Result<()> {
        self.response = None;
        self.error = None;

        let result = self.execute().await;
        match result {
            Ok(response) => {
                self.response = Some(response);
                Ok(())
            }
            Err(e) if e.is_configuration() || self.raise_on_error => Err(e),
            Err(e) => {
                self.error = Some(e);
                Ok(())
            }
        }
    }

    async fn execute(&mut self) -> Result<Response> {
        let (session, owned) = match &self.binding {
            Binding::Borrowed(session) => {
                if self.session_config.is_some() {
                    return Err(Error::conflicting(
                        "a session and session-construction options were both supplied",
                    ));
                }
                (session.clone(), false)
            }
            Binding::Unbound => {
                let config = self.session_config.clone().unwrap_or_default();
                let mut session = Session::new(self.transport.clone(), config)?;
                if let Some(renderer) = &self.renderer {
                    session = session.with_renderer(renderer.clone());
                }
                (session, true)
            }
        };

        // The guard closes the owned session even if this future is dropped
        // mid-await by a scheduler abandoning the call.
        let guard = OwnedSessionGuard {
            session: owned.then(|| session.clone()),
        };
        let result = session
            .request(self.method.clone(), &self.url, self.options.clone())
            .await;
        guard.settle().await;
        result
    }
}

struct OwnedSessionGuard {
    session: Option<Session>,
}

impl OwnedSessionGuard {
    /// Normal completion path: close the owned session in-line.
    async fn settle(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for OwnedSessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            // Abandoned mid-flight; close from a detached task since drop
            // cannot await. Session::close keeps this exactly-once.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { session.close().await });
            } else {
                tracing::warn!(
                    session_id = session.id(),
                    "owned session abandoned outside a runtime; destroy notification skipped"
                );
            }
        }
    }
}

/// A call that begins sending immediately upon construction.
///
/// Failures are always recorded on the descriptor (never thrown from the
/// background task); observe them through [`CallDescriptor::error`] after
/// [`LazyCall::wait`].
pub struct LazyCall {
    handle: tokio::task::JoinHandle<CallDescriptor>,
}

impl LazyCall {
    /// Fire the call now; observe it later.
    pub fn spawn(mut descriptor: CallDescriptor) -> Self {
        let handle = tokio::spawn(async move {
            if let Err(e) = descriptor.send().await {
                descriptor.error = Some(e);
            }
            descriptor
        });
        Self { handle }
    }

    /// Whether the send has already finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Return the completed descriptor, suspending only if the send has not
    /// yet finished.
    pub async fn wait(self) -> CallDescriptor {
        self.handle.await.expect("lazy call task panicked")
    }
}
