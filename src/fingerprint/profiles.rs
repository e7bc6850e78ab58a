//! Named browser fingerprint profiles.

/// Browser family to impersonate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    /// Latest version the transport ships a fingerprint for.
    pub fn latest_version(&self) -> u16 {
        match self {
            Self::Chrome => 133,
            Self::Firefox => 135,
        }
    }

    fn identifier_stem(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
        }
    }
}

/// Operating system declared in generated headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Os {
    #[default]
    MacOs,
    Windows,
    Linux,
}

impl Os {
    /// Platform token for the `Sec-Ch-Ua-Platform` client hint.
    pub fn client_hint_platform(&self) -> &'static str {
        match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
        }
    }

    fn ua_platform(&self) -> &'static str {
        match self {
            Self::MacOs => "Macintosh; Intel Mac OS X 10_15_7",
            Self::Windows => "Windows NT 10.0; Win64; x64",
            Self::Linux => "X11; Linux x86_64",
        }
    }
}

/// A named browser family + version fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserProfile {
    pub browser: Browser,
    pub version: u16,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self::latest(Browser::default())
    }
}

impl BrowserProfile {
    pub fn new(browser: Browser, version: u16) -> Self {
        Self { browser, version }
    }

    /// The latest profile the transport supports for a family.
    pub fn latest(browser: Browser) -> Self {
        Self::new(browser, browser.latest_version())
    }

    /// The transport's named fingerprint identifier, e.g. `chrome_133`.
    pub fn transport_identifier(&self) -> String {
        format!("{}_{}", self.browser.identifier_stem(), self.version)
    }

    /// User-Agent string for this profile on the given OS.
    pub fn user_agent(&self, os: Os) -> String {
        match self.browser {
            Browser::Chrome => format!(
                "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
                os.ua_platform(),
                self.version
            ),
            Browser::Firefox => format!(
                "Mozilla/5.0 ({}; rv:{ver}.0) Gecko/20100101 Firefox/{ver}.0",
                os.ua_platform(),
                ver = self.version
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_identifier_format() {
        assert_eq!(
            BrowserProfile::new(Browser::Chrome, 133).transport_identifier(),
            "chrome_133"
        );
        assert_eq!(
            BrowserProfile::new(Browser::Firefox, 135).transport_identifier(),
            "firefox_135"
        );
    }

    #[test]
    fn user_agent_reflects_os_and_version() {
        let profile = BrowserProfile::new(Browser::Chrome, 133);
        let ua = profile.user_agent(Os::Linux);
        assert!(ua.contains("Chrome/133.0.0.0"));
        assert!(ua.contains("X11; Linux"));

        let ff = BrowserProfile::new(Browser::Firefox, 135).user_agent(Os::Windows);
        assert!(ff.contains("Firefox/135.0"));
        assert!(ff.contains("Windows NT"));
    }
}
