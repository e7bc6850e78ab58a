//! # Wraith
//!
//! HTTP client that impersonates browser TLS/HTTP2 network signatures.
//!
//! The actual handshake and wire exchange are performed by an external
//! fingerprinting transport reachable over a local loopback protocol; this
//! crate turns logical calls into transport envelopes, normalizes replies
//! (redirect chains, cookies, encodings), manages session identities, and
//! schedules many calls concurrently with bounded parallelism. Pages that
//! need JavaScript can be escalated to a browser-rendering subsystem through
//! the [`render::Renderer`] seam.
//!
//! ```no_run
//! use wraith::{CallOptions, Session, SessionConfig, TransportClient};
//! use wraith::fingerprint::Browser;
//!
//! # async fn example() -> wraith::Result<()> {
//! let transport = TransportClient::new("127.0.0.1:39231");
//! let session = Session::new(transport, SessionConfig::browser(Browser::Chrome))?;
//! let response = session.get("https://example.com/", CallOptions::new()).await?;
//! println!("{} {}", response.status(), response.text()?.len());
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cookie;
pub mod error;
pub mod fingerprint;
pub mod headers;
pub mod proxy;
pub mod render;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use cookie::{Cookie, CookieJar};
pub use error::{Error, Result};
pub use headers::HeaderMap;
pub use proxy::Proxy;
pub use request::{CallDescriptor, CallOptions, LazyCall};
pub use response::{Hop, Response};
pub use scheduler::{imap, imap_enum, map, FailedCall, FailureHandler, Outcome};
pub use session::{Session, SessionConfig};
pub use transport::TransportClient;
