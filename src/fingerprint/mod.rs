//! Browser fingerprint identities.

pub mod custom;
pub mod profiles;

pub use custom::CustomTlsProfile;
pub use profiles::{Browser, BrowserProfile, Os};

/// The handshake identity presented to the fingerprinting transport.
///
/// A named browser profile and a fully custom low-level profile are mutually
/// exclusive per request; the enum makes the exclusion structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// A named browser family/version, resolved by the transport.
    Browser {
        profile: BrowserProfile,
        /// Ask the transport to randomize TLS extension order, matching
        /// Chrome's behavior since v110.
        randomize_extension_order: bool,
    },
    /// Explicit low-level TLS/HTTP2 parameters.
    Custom(CustomTlsProfile),
}

impl Default for Identity {
    fn default() -> Self {
        Self::Browser {
            profile: BrowserProfile::default(),
            randomize_extension_order: false,
        }
    }
}

impl Identity {
    /// The browser profile, when this is a named identity.
    pub fn browser_profile(&self) -> Option<&BrowserProfile> {
        match self {
            Self::Browser { profile, .. } => Some(profile),
            Self::Custom(_) => None,
        }
    }
}
