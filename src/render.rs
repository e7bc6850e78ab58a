//! Contract consumed from the browser-rendering subsystem.
//!
//! The core only calls [`Renderer::render`], reads the handle's five
//! properties, and releases it; navigation internals belong to the renderer.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use crate::cookie::Cookie;
use crate::error::Result;
use crate::headers::HeaderMap;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options forwarded to the rendering subsystem.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Run the browser headless. Defaults to true.
    pub headless: bool,
    /// Extra settle time after navigation completes.
    pub wait: Option<Duration>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            headless: true,
            wait: None,
        }
    }
}

/// A rendered page handle: current content plus final navigation state.
///
/// Implementations must make `release` safe to call exactly once; the session
/// guarantees cookies are read before release even when the caller discards
/// the synthesized response.
pub trait RenderedPage: Send {
    fn content(&self) -> Bytes;
    fn final_url(&self) -> &str;
    fn status(&self) -> u16;
    fn headers(&self) -> HeaderMap;
    fn cookies(&self) -> Vec<Cookie>;
    /// Release the underlying browser resource.
    fn release(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// The rendering subsystem as seen by sessions.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        url: &str,
        options: RenderOptions,
    ) -> BoxFuture<'_, Result<Box<dyn RenderedPage>>>;
}
