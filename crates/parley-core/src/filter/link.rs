//! Link extraction and classification.

use regex::Regex;
use std::fmt;
use url::{Host, Url};

/// Hosts of well-known URL shorteners. Subdomains match as well.
pub const SHORTENER_HOSTS: &[&str] = &[
    "bit.ly",
    "bit.do",
    "tinyurl.com",
    "goo.gl",
    "t.co",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "adf.ly",
    "cutt.ly",
    "rebrand.ly",
    "shorturl.at",
    "tiny.cc",
    "rb.gy",
];

/// Fragments that show up in phishing hostnames.
pub const PHISHING_FRAGMENTS: &[&str] = &[
    "paypal-secure",
    "paypal-verify",
    "apple-verify",
    "appleid-support",
    "amazon-security",
    "microsoft-alert",
    "secure-login",
    "login-verify",
    "account-verify",
    "wallet-connect",
    "banking-alert",
];

/// Why a URL was considered suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlThreat {
    Shortener,
    PhishingDomain,
    DirectIp,
    NonStandardPort,
    InvalidFormat,
}

impl UrlThreat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlThreat::Shortener => "shortener",
            UrlThreat::PhishingDomain => "phishing domain",
            UrlThreat::DirectIp => "direct IP",
            UrlThreat::NonStandardPort => "non-standard port",
            UrlThreat::InvalidFormat => "invalid format",
        }
    }
}

impl fmt::Display for UrlThreat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct UrlClassifier {
    shorteners: Vec<String>,
    phishing: Vec<String>,
    extractor: Regex,
}

impl UrlClassifier {
    pub(crate) fn new(
        extra_shorteners: &[String],
        extra_phishing: &[String],
    ) -> Result<Self, regex::Error> {
        let shorteners = merge_lists(SHORTENER_HOSTS, extra_shorteners);
        let phishing = merge_lists(PHISHING_FRAGMENTS, extra_phishing);

        // Explicit http(s) links, or bare links on a known shortener host.
        let bare_hosts = shorteners
            .iter()
            .map(|h| regex::escape(h))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r#"(?i)https?://[^\s<>"'\[\]]+|\b(?:{})\b(?:/[^\s<>"'\[\]]*)?"#,
            bare_hosts
        );

        Ok(Self {
            shorteners,
            phishing,
            extractor: Regex::new(&pattern)?,
        })
    }

    pub(crate) fn extractor(&self) -> &Regex {
        &self.extractor
    }

    /// Classify a single URL. `None` means the URL looks clean.
    pub(crate) fn classify(&self, raw: &str) -> Option<UrlThreat> {
        let candidate = raw.trim();
        let parsed = if candidate.contains("://") {
            Url::parse(candidate)
        } else {
            Url::parse(&format!("http://{}", candidate))
        };

        let Ok(url) = parsed else {
            return Some(UrlThreat::InvalidFormat);
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(Host::Ipv4(_)) => return Some(UrlThreat::DirectIp),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Some(UrlThreat::InvalidFormat),
        };

        if self
            .shorteners
            .iter()
            .any(|s| host == *s || host.ends_with(&format!(".{}", s)))
        {
            return Some(UrlThreat::Shortener);
        }

        if self.phishing.iter().any(|p| host.contains(p.as_str())) {
            return Some(UrlThreat::PhishingDomain);
        }

        // `port()` is `None` when the port is absent or the scheme default.
        match url.port() {
            Some(port) if port != 80 && port != 443 => Some(UrlThreat::NonStandardPort),
            _ => None,
        }
    }
}

fn merge_lists(builtin: &[&str], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = builtin.iter().map(|s| s.to_string()).collect();
    for item in extra {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !merged.contains(&item) {
            merged.push(item);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::new(&[], &[]).unwrap()
    }

    #[test]
    fn test_classify_in_order() {
        let c = classifier();

        assert_eq!(c.classify("https://bit.ly/abc"), Some(UrlThreat::Shortener));
        assert_eq!(c.classify("http://www.TinyURL.com/x"), Some(UrlThreat::Shortener));
        assert_eq!(
            c.classify("https://paypal-secure.example.net/login"),
            Some(UrlThreat::PhishingDomain)
        );
        assert_eq!(c.classify("http://192.168.1.10/admin"), Some(UrlThreat::DirectIp));
        assert_eq!(
            c.classify("http://example.com:8080/"),
            Some(UrlThreat::NonStandardPort)
        );
        assert_eq!(c.classify("https://example.com/page"), None);
    }

    #[test]
    fn test_standard_ports_are_clean() {
        let c = classifier();
        assert_eq!(c.classify("http://example.com:80/"), None);
        assert_eq!(c.classify("http://example.com:443/"), None);
        assert_eq!(c.classify("https://example.com:443/"), None);
    }

    #[test]
    fn test_shortener_requires_host_boundary() {
        let c = classifier();
        assert_eq!(c.classify("https://chat.com/"), None);
        assert_eq!(c.classify("https://notbit.ly/"), None);
        assert_eq!(c.classify("https://go.bit.ly/x"), Some(UrlThreat::Shortener));
    }

    #[test]
    fn test_invalid_and_bare_urls() {
        let c = classifier();
        assert_eq!(c.classify("http://"), Some(UrlThreat::InvalidFormat));
        assert_eq!(c.classify("https://exa mple.com"), Some(UrlThreat::InvalidFormat));
        assert_eq!(c.classify("bit.ly/xyz"), Some(UrlThreat::Shortener));
    }

    #[test]
    fn test_extra_lists() {
        let c = UrlClassifier::new(&["Short.Example".to_string()], &["evil-bank".to_string()])
            .unwrap();
        assert_eq!(c.classify("https://short.example/a"), Some(UrlThreat::Shortener));
        assert_eq!(
            c.classify("https://my-evil-bank.com/"),
            Some(UrlThreat::PhishingDomain)
        );
    }

    #[test]
    fn test_extractor() {
        let c = classifier();
        let text = "see https://example.com/a, bit.ly/xyz and http://1.2.3.4:81/x";
        let found: Vec<&str> = c.extractor().find_iter(text).map(|m| m.as_str()).collect();

        assert_eq!(
            found,
            vec!["https://example.com/a,", "bit.ly/xyz", "http://1.2.3.4:81/x"]
        );
        assert!(c.extractor().find("nothing to see at chat.com").is_none());
    }
}
