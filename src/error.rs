//! Error types for the wraith crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while issuing fingerprinted HTTP calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Proxy string failed local validation. Never reaches the transport.
    #[error("Malformed proxy: {0}")]
    MalformedProxy(String),

    /// Transport unreachable, non-success channel reply, or a status-0 hop.
    /// Always carries the transport's raw diagnostic text.
    #[error("Transport error: {0}")]
    ClientTransport(String),

    /// Caller supplied both a Session and session-construction options.
    #[error("Conflicting configuration: {0}")]
    ConflictingConfiguration(String),

    /// Call attempted on a closed session.
    #[error("Session is closed")]
    SessionClosed,

    /// Jar lookup without qualifiers matched more than one cookie.
    #[error("Cookie {name:?} is ambiguous: {count} cookies match")]
    CookieAmbiguous { name: String, count: usize },

    /// Jar lookup matched no cookie.
    #[error("Cookie {name:?} not found")]
    CookieAbsent { name: String },

    /// Text was requested but no encoding could be established.
    #[error("Could not determine response encoding")]
    EncodingUndetermined,

    /// Browser rendering failed or no renderer is configured.
    #[error("Render error: {0}")]
    Render(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a transport error with diagnostic text.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::ClientTransport(message.into())
    }

    /// Create a malformed-proxy error.
    pub fn malformed_proxy(message: impl Into<String>) -> Self {
        Self::MalformedProxy(message.into())
    }

    /// Create a conflicting-configuration error.
    pub fn conflicting(message: impl Into<String>) -> Self {
        Self::ConflictingConfiguration(message.into())
    }

    /// Create a render error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Configuration errors indicate a programming mistake and propagate
    /// regardless of a descriptor's raise/record flag.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MalformedProxy(_) | Self::ConflictingConfiguration(_)
        )
    }
}
