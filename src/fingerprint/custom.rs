//! Fully custom low-level TLS/HTTP2 fingerprint profiles.
//!
//! For callers that need exact control beyond the named browser profiles: the
//! record is passed verbatim to the transport as its `customTlsClient` object.

use serde::{Deserialize, Serialize};

/// Explicit TLS/HTTP2 handshake parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTlsProfile {
    /// JA3 string: version,ciphers,extensions,curves,point-formats.
    pub ja3_string: String,
    /// HTTP/2 SETTINGS values by name (e.g. `HEADER_TABLE_SIZE`).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub h2_settings: Vec<H2Setting>,
    /// Order in which SETTINGS are emitted.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub h2_settings_order: Vec<String>,
    /// Pseudo-header order, e.g. `[":method", ":authority", ":scheme", ":path"]`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub pseudo_header_order: Vec<String>,
    /// Supported TLS versions, newest first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub supported_versions: Vec<String>,
    /// Supported signature algorithms.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub supported_signature_algorithms: Vec<String>,
    /// Key share curves offered in the ClientHello.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub key_share_curves: Vec<String>,
    /// Certificate compression algorithm (e.g. `brotli`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cert_compression_algo: Option<String>,
}

/// A single named HTTP/2 setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct H2Setting {
    pub name: String,
    pub value: u32,
}

impl CustomTlsProfile {
    /// A profile is unusable without at least a JA3 string.
    pub fn is_empty(&self) -> bool {
        self.ja3_string.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case_and_skips_empty() {
        let profile = CustomTlsProfile {
            ja3_string: "771,4865-4866,0-23-65281,29-23,0".to_string(),
            pseudo_header_order: vec![":method".into(), ":authority".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["ja3String"], "771,4865-4866,0-23-65281,29-23,0");
        assert_eq!(json["pseudoHeaderOrder"][0], ":method");
        assert!(json.get("h2Settings").is_none());
        assert!(json.get("certCompressionAlgo").is_none());
    }
}
