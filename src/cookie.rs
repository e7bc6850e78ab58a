//! RFC 6265 compliant cookie handling.
//!
//! Cookies are stored manually in a [`CookieJar`] keyed by (name, domain, path);
//! the transport applies its own domain/path matching, so outgoing cookies are
//! handed over as a discrete list rather than a single header string.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::error::{Error, Result};

/// RFC 6265 compliant cookie representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
        }
    }

    /// Parse a `Set-Cookie` header value against the URL it arrived from.
    pub fn from_set_cookie_header(header: &str, request_url: &str) -> Result<Self> {
        let parsed_url =
            Url::parse(request_url).map_err(|e| Error::transport(format!("cookie URL: {e}")))?;
        let request_domain = parsed_url
            .host_str()
            .ok_or_else(|| Error::transport("cookie URL has no host"))?;

        let parts: Vec<&str> = header.split(';').map(str::trim).collect();
        let (name, value) = match parts[0].split_once('=') {
            Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
            None => return Err(Error::transport("Set-Cookie without '='")),
        };
        if name.is_empty() {
            return Err(Error::transport("Set-Cookie with empty name"));
        }

        let mut cookie = Cookie::new(name, value, request_domain);
        for attr in parts.iter().skip(1) {
            let attr_lower = attr.to_lowercase();
            if attr_lower == "secure" {
                cookie.secure = true;
            } else if attr_lower == "httponly" {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                match key.trim().to_lowercase().as_str() {
                    "domain" => cookie.domain = normalize_domain(val.trim()),
                    "path" => cookie.path = val.trim().to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val.trim()),
                    "max-age" => cookie.max_age = val.trim().parse().ok(),
                    "samesite" => cookie.same_site = Some(val.trim().to_string()),
                    _ => {}
                }
            }
        }
        Ok(cookie)
    }

    /// Whether this cookie should be sent for the given URL.
    pub fn matches_url(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        let request_domain = match parsed.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };

        if self.secure && parsed.scheme() != "https" {
            return false;
        }
        if self.is_expired() {
            return false;
        }

        let cookie_domain = self.domain.to_lowercase();
        if request_domain != cookie_domain
            && !request_domain.ends_with(&format!(".{cookie_domain}"))
        {
            return false;
        }

        let request_path = parsed.path();
        request_path == self.path
            || request_path.starts_with(&format!("{}/", self.path.trim_end_matches('/')))
    }

    /// Whether this cookie's expiry time has passed.
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires < Utc::now())
    }

    /// The (name, domain, path) identity of this cookie within a jar.
    fn key(&self) -> (&str, &str, &str) {
        (&self.name, &self.domain, &self.path)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Cookie jar unique by (name, domain, path), preserving insertion order.
///
/// Unqualified lookup distinguishes an absent cookie from an ambiguous one:
/// [`CookieJar::get`] fails with [`Error::CookieAbsent`] on zero matches and
/// [`Error::CookieAmbiguous`] when more than one cookie shares the name.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any existing cookie with the same
    /// (name, domain, path). Replacement keeps the original position.
    pub fn store(&mut self, cookie: Cookie) {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.key() == cookie.key()) {
            *existing = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    /// Parse and store a `Set-Cookie` header value.
    pub fn store_from_header(&mut self, header_value: &str, request_url: &str) -> Result<()> {
        let cookie = Cookie::from_set_cookie_header(header_value, request_url)?;
        self.store(cookie);
        Ok(())
    }

    /// Upsert every cookie from `other`, in its order.
    pub fn merge(&mut self, other: &CookieJar) {
        for cookie in &other.cookies {
            self.store(cookie.clone());
        }
    }

    /// Unqualified lookup by name.
    pub fn get(&self, name: &str) -> Result<&Cookie> {
        let mut matches = self.cookies.iter().filter(|c| c.name == name);
        let first = matches.next().ok_or_else(|| Error::CookieAbsent {
            name: name.to_string(),
        })?;
        let extra = matches.count();
        if extra > 0 {
            return Err(Error::CookieAmbiguous {
                name: name.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// Unqualified lookup that falls back to a default value when absent.
    /// Ambiguity is still an error.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            Ok(cookie) => Ok(&cookie.value),
            Err(Error::CookieAbsent { .. }) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Lookup narrowed by optional domain and path qualifiers.
    pub fn get_qualified(
        &self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<&Cookie> {
        let domain = domain.map(normalize_domain);
        let mut matches = self.cookies.iter().filter(|c| {
            c.name == name
                && domain.as_deref().map_or(true, |d| c.domain == d)
                && path.map_or(true, |p| c.path == p)
        });
        let first = matches.next().ok_or_else(|| Error::CookieAbsent {
            name: name.to_string(),
        })?;
        let extra = matches.count();
        if extra > 0 {
            return Err(Error::CookieAmbiguous {
                name: name.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// All cookies that should be sent for the given URL, in insertion order.
    pub fn cookies_for_url(&self, url: &str) -> Vec<&Cookie> {
        self.cookies.iter().filter(|c| c.matches_url(url)).collect()
    }

    pub fn remove(&mut self, name: &str, domain: &str, path: &str) -> Option<Cookie> {
        let domain = normalize_domain(domain);
        let idx = self
            .cookies
            .iter()
            .position(|c| c.name == name && c.domain == domain && c.path == path)?;
        Some(self.cookies.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_lowercase()
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%y %H:%M:%S GMT",
        "%Y-%m-%dT%H:%M:%SZ",
    ] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
