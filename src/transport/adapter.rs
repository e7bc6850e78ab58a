//! Translation between (session, call) pairs and transport envelopes.
//!
//! The adapter owns the two lossy boundaries of the system: flattening session
//! state plus per-call options into one request envelope, and rebuilding an
//! ordered hop chain from the transport's reply. Hop URLs in a redirect
//! history are reconstructed from each previous hop's `Location` header
//! because the transport does not echo per-hop request URLs.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use http::Method;
use url::Url;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::Identity;
use crate::headers::HeaderMap;
use crate::proxy::Proxy;
use crate::request::CallOptions;
use crate::response::Hop;
use crate::transport::envelope::{RawHop, TransportReply, TransportRequest, WireCookie};

/// Immutable view of the session state needed to build one envelope.
///
/// Taken under the session lock and released before any network activity, so
/// concurrent calls on a shared session only contend on jar writes.
#[derive(Debug, Clone)]
pub(crate) struct SessionSnapshot {
    pub id: String,
    pub identity: Identity,
    pub headers: HeaderMap,
    pub jar: CookieJar,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub verify: bool,
    pub disable_ipv6: bool,
    pub detect_encoding: bool,
}

/// Build the transport envelope for one call.
///
/// Returns the envelope and the effective round-trip timeout. All local
/// validation (absolute URL, positive timeout, proxy shape) happens here,
/// before any network activity.
pub(crate) fn build_envelope(
    snapshot: &SessionSnapshot,
    method: &Method,
    url: &str,
    options: &CallOptions,
) -> Result<(TransportRequest, Duration)> {
    let mut parsed_url = Url::parse(url)?;
    if !options.params.is_empty() {
        parsed_url
            .query_pairs_mut()
            .extend_pairs(options.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let timeout = options.timeout.unwrap_or(snapshot.timeout);
    if timeout.is_zero() {
        return Err(Error::conflicting("timeout must be a positive duration"));
    }

    let proxy_url = match options.proxy.as_deref().or(snapshot.proxy.as_deref()) {
        Some(raw) => Some(Proxy::parse(raw)?.to_proxy_url()),
        None => None,
    };

    // Session headers first, per-call headers win on conflict.
    let mut headers = snapshot.headers.clone();
    if let Some(extra) = &options.headers {
        headers.merge(extra);
    }

    let (request_body, is_byte_request) = match (&options.data, &options.json) {
        (Some(_), Some(_)) => {
            return Err(Error::conflicting(
                "both raw data and a JSON payload were supplied",
            ));
        }
        (None, None) => (None, false),
        (Some(data), None) => encode_body(data),
        (None, Some(json)) => {
            if !headers.contains("Content-Type") {
                headers.insert("Content-Type", "application/json");
            }
            (Some(serde_json::to_string(json)?), false)
        }
    };

    // The whole jar goes out (minus expired cookies), each record carrying its
    // domain/path: the transport owns domain/path matching, including against
    // hosts reached only via redirect hops. Per-call overrides are scoped to
    // this call's URL.
    let mut request_cookies: Vec<WireCookie> = snapshot
        .jar
        .iter()
        .filter(|c| !c.is_expired())
        .map(|c| WireCookie {
            name: c.name.clone(),
            value: c.value.clone(),
            domain: Some(c.domain.clone()),
            path: Some(c.path.clone()),
        })
        .collect();
    for (name, value) in &options.cookies {
        request_cookies.retain(|c| &c.name != name);
        request_cookies.push(WireCookie {
            name: name.clone(),
            value: value.clone(),
            domain: None,
            path: None,
        });
    }

    let (tls_client_identifier, with_random_tls_extension_order, custom_tls_client) =
        match &snapshot.identity {
            Identity::Browser {
                profile,
                randomize_extension_order,
            } => (
                Some(profile.transport_identifier()),
                *randomize_extension_order,
                None,
            ),
            Identity::Custom(profile) => (None, false, Some(profile.clone())),
        };

    let header_order = headers.names();
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let envelope = TransportRequest {
        session_id: snapshot.id.clone(),
        request_url: parsed_url.into(),
        request_method: method.as_str().to_string(),
        request_body,
        is_byte_request,
        headers: header_map,
        header_order,
        timeout_milliseconds: timeout.as_millis() as u64,
        follow_redirects: options.follow_redirects.unwrap_or(true),
        want_history: options.want_history,
        insecure_skip_verify: !options.verify.unwrap_or(snapshot.verify),
        disable_ipv6: snapshot.disable_ipv6,
        detect_encoding: snapshot.detect_encoding,
        additional_decode: options.additional_decode.clone(),
        proxy_url,
        request_cookies,
        tls_client_identifier,
        with_random_tls_extension_order,
        custom_tls_client,
    };
    Ok((envelope, timeout))
}

fn encode_body(data: &Bytes) -> (Option<String>, bool) {
    match std::str::from_utf8(data) {
        Ok(text) => (Some(text.to_string()), false),
        Err(_) => (Some(BASE64.encode(data)), true),
    }
}

/// Decode a transport reply into an ordered hop chain, oldest first.
///
/// A hop with status 0 is a transport-level failure and aborts decoding with
/// its diagnostic text; it is never surfaced as an HTTP status.
pub(crate) fn decode_reply(request_url: &str, reply: TransportReply) -> Result<Vec<Hop>> {
    let raw_hops: Vec<RawHop> = if reply.is_history {
        reply
            .history
            .ok_or_else(|| Error::transport("history reply without history array"))?
    } else {
        vec![reply
            .hop
            .ok_or_else(|| Error::transport("single-hop reply without hop object"))?]
    };

    let origin = Url::parse(request_url)?;
    let mut hops: Vec<Hop> = Vec::with_capacity(raw_hops.len());

    for (index, raw) in raw_hops.iter().enumerate() {
        if raw.status == 0 {
            return Err(Error::transport(raw.body.clone()));
        }

        let url = match hops.last() {
            None => {
                if !reply.is_history && !raw.target.is_empty() {
                    match Url::parse(&raw.target) {
                        Ok(target) => target,
                        Err(e) => {
                            tracing::warn!(
                                target = %raw.target,
                                "unparseable hop target, falling back to request URL: {e}"
                            );
                            origin.clone()
                        }
                    }
                } else {
                    origin.clone()
                }
            }
            Some(prev) => reconstruct_hop_url(prev, index),
        };

        let mut headers = HeaderMap::new();
        for (name, values) in &raw.headers {
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }

        let body = if raw.is_base64 {
            Bytes::from(BASE64.decode(raw.body.as_bytes()).map_err(|e| {
                Error::transport(format!("invalid base64 hop body: {e}"))
            })?)
        } else {
            Bytes::from(raw.body.clone().into_bytes())
        };

        hops.push(Hop {
            url,
            status: raw.status,
            headers,
            body,
            binary: raw.is_base64,
        });
    }
    Ok(hops)
}

/// Reconstruct hop `index`'s URL from the previous hop's `Location` header.
///
/// The transport omits per-hop request URLs; a missing or unparseable
/// `Location` falls back to the previous hop's URL, which loses information,
/// so the fallback is logged rather than silent.
fn reconstruct_hop_url(previous: &Hop, index: usize) -> Url {
    match previous.headers.get("Location") {
        Some(location) => match previous.url.join(location) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    hop = index,
                    location,
                    "unparseable Location header, falling back to previous hop URL: {e}"
                );
                previous.url.clone()
            }
        },
        None => {
            tracing::warn!(
                hop = index,
                status = previous.status,
                "redirect hop without Location header, falling back to previous hop URL"
            );
            previous.url.clone()
        }
    }
}

/// Extract cookies from every hop in chain order.
///
/// Writes into the session jar and into a response-scoped jar holding only
/// the cookies set during this exact call. Intermediate hops are included;
/// Set-Cookie headers on redirects must not be lost.
pub(crate) fn extract_cookies(hops: &[Hop], session_jar: &mut CookieJar) -> CookieJar {
    let mut response_jar = CookieJar::new();
    for hop in hops {
        for value in hop.headers.get_all("Set-Cookie") {
            match crate::cookie::Cookie::from_set_cookie_header(value, hop.url.as_str()) {
                Ok(cookie) => {
                    session_jar.store(cookie.clone());
                    response_jar.store(cookie);
                }
                Err(e) => {
                    tracing::debug!(url = %hop.url, "skipping unparseable Set-Cookie: {e}");
                }
            }
        }
    }
    response_jar
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            id: "sid".to_string(),
            identity: Identity::default(),
            headers: HeaderMap::from_pairs([("Accept", "*/*"), ("X-Session", "s")]),
            jar: CookieJar::new(),
            proxy: None,
            timeout: Duration::from_secs(30),
            verify: true,
            disable_ipv6: false,
            detect_encoding: true,
        }
    }

    fn raw_hop(status: u16, location: Option<&str>, body: &str) -> RawHop {
        let mut headers = BTreeMap::new();
        if let Some(loc) = location {
            headers.insert("Location".to_string(), vec![loc.to_string()]);
        }
        RawHop {
            status,
            target: String::new(),
            headers,
            body: body.to_string(),
            is_base64: false,
        }
    }

    #[test]
    fn per_call_headers_win() {
        let mut options = CallOptions::default();
        options.headers = Some(HeaderMap::from_pairs([("accept", "application/json")]));
        let (envelope, _) =
            build_envelope(&snapshot(), &Method::GET, "https://example.com/", &options).unwrap();
        assert_eq!(envelope.headers["Accept"], "application/json");
        assert_eq!(envelope.headers["X-Session"], "s");
    }

    #[test]
    fn json_body_sets_default_content_type_only_when_unset() {
        let mut options = CallOptions::default();
        options.json = Some(serde_json::json!({"k": "v"}));
        let (envelope, _) =
            build_envelope(&snapshot(), &Method::POST, "https://example.com/", &options).unwrap();
        assert_eq!(envelope.headers["Content-Type"], "application/json");
        assert_eq!(envelope.request_body.as_deref(), Some(r#"{"k":"v"}"#));

        let mut options = CallOptions::default();
        options.json = Some(serde_json::json!({"k": "v"}));
        options.headers = Some(HeaderMap::from_pairs([("Content-Type", "text/custom")]));
        let (envelope, _) =
            build_envelope(&snapshot(), &Method::POST, "https://example.com/", &options).unwrap();
        assert_eq!(envelope.headers["Content-Type"], "text/custom");
    }

    #[test]
    fn binary_body_is_base64_marked() {
        let mut options = CallOptions::default();
        options.data = Some(Bytes::from_static(&[0xff, 0xfe, 0x00, 0x01]));
        let (envelope, _) =
            build_envelope(&snapshot(), &Method::POST, "https://example.com/", &options).unwrap();
        assert!(envelope.is_byte_request);
        assert_eq!(envelope.request_body.as_deref(), Some("//4AAQ=="));
    }

    #[test]
    fn data_and_json_together_conflict() {
        let mut options = CallOptions::default();
        options.data = Some(Bytes::from_static(b"x"));
        options.json = Some(serde_json::json!(1));
        let err = build_envelope(&snapshot(), &Method::POST, "https://example.com/", &options)
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingConfiguration(_)));
    }

    #[test]
    fn malformed_proxy_fails_preflight() {
        let mut options = CallOptions::default();
        options.proxy = Some("socks6://x".to_string());
        let err =
            build_envelope(&snapshot(), &Method::GET, "https://example.com/", &options).unwrap_err();
        assert!(matches!(err, Error::MalformedProxy(_)));
    }

    #[test]
    fn jar_cookies_are_discrete_and_per_call_overrides_win() {
        let mut snap = snapshot();
        snap.jar.store(Cookie::new("a", "jar", "example.com"));
        snap.jar.store(Cookie::new("b", "keep", "example.com"));
        let mut options = CallOptions::default();
        options.cookies.push(("a".to_string(), "call".to_string()));

        let (envelope, _) =
            build_envelope(&snap, &Method::GET, "https://example.com/", &options).unwrap();
        assert_eq!(envelope.request_cookies.len(), 2);
        let a = envelope
            .request_cookies
            .iter()
            .find(|c| c.name == "a")
            .unwrap();
        assert_eq!(a.value, "call");
        assert!(a.domain.is_none());
        let b = envelope
            .request_cookies
            .iter()
            .find(|c| c.name == "b")
            .unwrap();
        assert_eq!(b.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn whole_jar_is_sent_for_transport_side_matching() {
        let mut snap = snapshot();
        snap.jar.store(Cookie::new("auth", "token", "other.test"));
        let mut stale = Cookie::new("stale", "x", "example.com");
        stale.expires = Some(chrono::Utc::now() - chrono::Duration::hours(1));
        snap.jar.store(stale);

        let (envelope, _) = build_envelope(
            &snap,
            &Method::GET,
            "https://example.com/",
            &CallOptions::default(),
        )
        .unwrap();

        // Cookies for hosts this call only reaches via redirects still go out;
        // the transport does the domain/path matching.
        let auth = envelope
            .request_cookies
            .iter()
            .find(|c| c.name == "auth")
            .unwrap();
        assert_eq!(auth.domain.as_deref(), Some("other.test"));
        assert!(!envelope.request_cookies.iter().any(|c| c.name == "stale"));
    }

    #[test]
    fn params_extend_the_request_url_query() {
        let options = CallOptions::new().param("q", "rust lang").param("page", "2");
        let (envelope, _) = build_envelope(
            &snapshot(),
            &Method::GET,
            "https://example.com/search?sort=asc",
            &options,
        )
        .unwrap();
        assert_eq!(
            envelope.request_url,
            "https://example.com/search?sort=asc&q=rust+lang&page=2"
        );
    }

    #[test]
    fn unparseable_single_hop_target_falls_back_to_request_url() {
        let mut hop = raw_hop(200, None, "ok");
        hop.target = "not a url".to_string();
        let reply = TransportReply {
            is_history: false,
            hop: Some(hop),
            history: None,
        };
        let hops = decode_reply("https://example.com/start", reply).unwrap();
        assert_eq!(hops[0].url.as_str(), "https://example.com/start");
    }

    #[test]
    fn identity_modes_are_exclusive_on_the_wire() {
        let (envelope, _) = build_envelope(
            &snapshot(),
            &Method::GET,
            "https://example.com/",
            &CallOptions::default(),
        )
        .unwrap();
        assert!(envelope.tls_client_identifier.is_some());
        assert!(envelope.custom_tls_client.is_none());

        let mut snap = snapshot();
        snap.identity = Identity::Custom(crate::fingerprint::CustomTlsProfile {
            ja3_string: "771,1-2,0,29,0".to_string(),
            ..Default::default()
        });
        let (envelope, _) = build_envelope(
            &snap,
            &Method::GET,
            "https://example.com/",
            &CallOptions::default(),
        )
        .unwrap();
        assert!(envelope.tls_client_identifier.is_none());
        assert!(envelope.custom_tls_client.is_some());
    }

    #[test]
    fn decode_reconstructs_history_urls_from_location() {
        let reply = TransportReply {
            is_history: true,
            hop: None,
            history: Some(vec![
                raw_hop(301, Some("https://example.com/step2"), ""),
                raw_hop(302, Some("/step3?x=1"), ""),
                raw_hop(200, None, "done"),
            ]),
        };
        let hops = decode_reply("https://example.com/start", reply).unwrap();
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[0].url.as_str(), "https://example.com/start");
        assert_eq!(hops[1].url.as_str(), "https://example.com/step2");
        assert_eq!(hops[2].url.as_str(), "https://example.com/step3?x=1");
        assert_eq!(hops[2].body, Bytes::from_static(b"done"));
    }

    #[test]
    fn missing_location_falls_back_to_previous_url() {
        let reply = TransportReply {
            is_history: true,
            hop: None,
            history: Some(vec![raw_hop(302, None, ""), raw_hop(200, None, "ok")]),
        };
        let hops = decode_reply("https://example.com/a", reply).unwrap();
        assert_eq!(hops[1].url.as_str(), "https://example.com/a");
    }

    #[test]
    fn status_zero_hop_is_a_transport_error() {
        let reply = TransportReply {
            is_history: false,
            hop: Some(raw_hop(0, None, "dial tcp: connection refused")),
            history: None,
        };
        let err = decode_reply("https://example.com/", reply).unwrap_err();
        match err {
            Error::ClientTransport(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn base64_marker_is_honored_exactly() {
        let mut hop = raw_hop(200, None, "aGVsbG8=");
        hop.is_base64 = true;
        let reply = TransportReply {
            is_history: false,
            hop: Some(hop),
            history: None,
        };
        let hops = decode_reply("https://example.com/", reply).unwrap();
        assert_eq!(hops[0].body, Bytes::from_static(b"hello"));
        assert!(hops[0].binary);

        // Plain text that merely looks like base64 is left alone.
        let reply = TransportReply {
            is_history: false,
            hop: Some(raw_hop(200, None, "aGVsbG8=")),
            history: None,
        };
        let hops = decode_reply("https://example.com/", reply).unwrap();
        assert_eq!(hops[0].body, Bytes::from_static(b"aGVsbG8="));
    }

    #[test]
    fn cookies_extracted_from_every_hop() {
        let mut first = raw_hop(302, Some("https://example.com/next"), "");
        first
            .headers
            .insert("Set-Cookie".to_string(), vec!["mid=1; Path=/".to_string()]);
        let mut last = raw_hop(200, None, "ok");
        last.headers.insert(
            "Set-Cookie".to_string(),
            vec!["fin=2".to_string(), "mid=override".to_string()],
        );
        let reply = TransportReply {
            is_history: true,
            hop: None,
            history: Some(vec![first, last]),
        };

        let hops = decode_reply("https://example.com/", reply).unwrap();
        let mut session_jar = CookieJar::new();
        let response_jar = extract_cookies(&hops, &mut session_jar);

        assert_eq!(session_jar.get("mid").unwrap().value, "override");
        assert_eq!(session_jar.get("fin").unwrap().value, "2");
        assert_eq!(response_jar.len(), 2);
    }
}
