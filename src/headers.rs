//! Case-insensitive header map and browser header generation.

use std::fmt;

use crate::fingerprint::{BrowserProfile, Os};

/// Case-insensitive mapping from header name to value.
///
/// The first-seen casing of a name is preserved: inserting `content-type` after
/// `Content-Type` replaces the value but keeps the original spelling on the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    /// Insert a header, replacing the value of an existing name (compared
    /// case-insensitively) while preserving its first-seen casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some((_, existing)) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            *existing = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Append a header without replacing existing values with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for the given name, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove all values for the given name.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Overlay `other` onto this map; `other` wins on name conflicts.
    pub fn merge(&mut self, other: &HeaderMap) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Header names in insertion order, for explicit wire ordering.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// Generate a plausible navigation header set for a browser profile on an OS.
///
/// Deterministic: the same (family, version, os) triple always produces the
/// same headers, so regenerating after an OS change is reproducible.
pub fn generated(profile: &BrowserProfile, os: Os) -> HeaderMap {
    use crate::fingerprint::Browser;

    let user_agent = profile.user_agent(os);
    match profile.browser {
        Browser::Chrome => {
            let v = profile.version;
            HeaderMap::from_pairs([
                ("User-Agent".to_string(), user_agent),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8".to_string(),
                ),
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                (
                    "Accept-Encoding".to_string(),
                    "gzip, deflate, br, zstd".to_string(),
                ),
                (
                    "Sec-Ch-Ua".to_string(),
                    format!(
                        "\"Chromium\";v=\"{v}\", \"Google Chrome\";v=\"{v}\", \"Not_A Brand\";v=\"24\""
                    ),
                ),
                ("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string()),
                (
                    "Sec-Ch-Ua-Platform".to_string(),
                    format!("\"{}\"", os.client_hint_platform()),
                ),
                ("Sec-Fetch-Dest".to_string(), "document".to_string()),
                ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
                ("Sec-Fetch-Site".to_string(), "none".to_string()),
                ("Sec-Fetch-User".to_string(), "?1".to_string()),
                (
                    "Upgrade-Insecure-Requests".to_string(),
                    "1".to_string(),
                ),
            ])
        }
        Browser::Firefox => HeaderMap::from_pairs([
            ("User-Agent".to_string(), user_agent),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string(),
            ),
            ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
            (
                "Accept-Encoding".to_string(),
                "gzip, deflate, br, zstd".to_string(),
            ),
            ("Sec-Fetch-Dest".to_string(), "document".to_string()),
            ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
            ("Sec-Fetch-Site".to_string(), "none".to_string()),
            ("Sec-Fetch-User".to_string(), "?1".to_string()),
            ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ]),
    }
}
