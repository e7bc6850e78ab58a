//! Wire types for the loopback fingerprinting transport protocol.
//!
//! The transport speaks JSON with camelCase keys. Requests carry either a
//! named `tlsClientIdentifier` or a full `customTlsClient` record, never both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fingerprint::CustomTlsProfile;

/// A request envelope for one transport round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub session_id: String,
    pub request_url: String,
    pub request_method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_body: Option<String>,
    /// True when `request_body` is base64-encoded binary.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_byte_request: bool,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub header_order: Vec<String>,
    pub timeout_milliseconds: u64,
    pub follow_redirects: bool,
    pub want_history: bool,
    pub insecure_skip_verify: bool,
    #[serde(rename = "disableIPv6")]
    pub disable_ipv6: bool,
    pub detect_encoding: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub additional_decode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub request_cookies: Vec<WireCookie>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tls_client_identifier: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub with_random_tls_extension_order: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub custom_tls_client: Option<CustomTlsProfile>,
}

/// One cookie handed to the transport as a discrete record, so the transport
/// can apply its own domain/path matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
}

/// The transport's reply: a single hop or a full redirect history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportReply {
    pub is_history: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hop: Option<RawHop>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub history: Option<Vec<RawHop>>,
}

/// One request/response exchange as reported by the transport.
///
/// `status == 0` signals a transport-level failure; `body` then carries the
/// diagnostic text instead of response bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHop {
    pub status: u16,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64: bool,
}
