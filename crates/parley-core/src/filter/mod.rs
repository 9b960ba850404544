//! Content security filter.
//!
//! A pure, stateless classifier for message content: it flags suspicious URLs
//! and attachments, masks profanity, and decides when a message must be
//! rejected outright. The filter owns only immutable compiled patterns and is
//! shared between all connections behind an `Arc`.
//!
//! The hard gate ([`ContentFilter::should_block_entirely`]) runs on the raw
//! text before anything else; only content that passes it is sanitized.

pub mod file;
pub mod link;
pub mod profanity;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use file::{attachment_file_name, classify_file, is_safe_for_upload, FileThreat, UploadRejection};
pub use link::UrlThreat;
pub use profanity::ProfanityReport;

use link::UrlClassifier;
use profanity::ProfanityMatcher;

/// More distinct profane words than this blocks a message.
pub const MAX_PROFANE_WORDS: usize = 3;

/// More suspicious links than this blocks a message.
pub const MAX_SUSPICIOUS_LINKS: usize = 2;

/// Filter construction errors.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A configured word or host produced an invalid pattern.
    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Additions to the built-in filter lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Extra words to treat as profanity.
    pub extra_profanity: Vec<String>,
    /// Extra URL shortener hosts.
    pub extra_shorteners: Vec<String>,
    /// Extra phishing hostname fragments.
    pub extra_phishing_domains: Vec<String>,
}

/// Output of [`ContentFilter::sanitize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeResult {
    pub sanitized_text: String,
    pub has_suspicious_content: bool,
    pub warnings: Vec<String>,
}

/// Why a message was rejected outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    ExcessiveProfanity { words: usize },
    SuspiciousAttachment(FileThreat),
    MultipleSuspiciousLinks { links: usize },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ExcessiveProfanity { .. } => f.write_str("excessive profanity"),
            BlockReason::SuspiciousAttachment(threat) => {
                write!(f, "suspicious attachment ({})", threat)
            }
            BlockReason::MultipleSuspiciousLinks { .. } => {
                f.write_str("multiple suspicious links")
            }
        }
    }
}

/// The content security filter.
#[derive(Debug)]
pub struct ContentFilter {
    profanity: ProfanityMatcher,
    urls: UrlClassifier,
}

impl ContentFilter {
    /// Build a filter from the built-in lists plus the configured additions.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new(config: &FilterConfig) -> Result<Self, FilterError> {
        Ok(Self {
            profanity: ProfanityMatcher::new(&config.extra_profanity)?,
            urls: UrlClassifier::new(&config.extra_shorteners, &config.extra_phishing_domains)?,
        })
    }

    /// Classify a URL. `None` means it looks clean.
    #[must_use]
    pub fn classify_url(&self, url: &str) -> Option<UrlThreat> {
        self.urls.classify(url)
    }

    /// Classify a file name. `None` means it looks harmless.
    #[must_use]
    pub fn classify_file(&self, filename: &str) -> Option<FileThreat> {
        file::classify_file(filename)
    }

    /// Check a file against the upload allowlist and size ceiling.
    ///
    /// # Errors
    ///
    /// Returns the reason the upload is refused.
    pub fn is_safe_for_upload(&self, filename: &str, size_bytes: u64) -> Result<(), UploadRejection> {
        file::is_safe_for_upload(filename, size_bytes)
    }

    /// Find the distinct profane words in a text.
    #[must_use]
    pub fn detect_profanity(&self, text: &str) -> ProfanityReport {
        self.profanity.detect(text)
    }

    /// Threats of every suspicious link in a text, in order of appearance.
    #[must_use]
    pub fn suspicious_links(&self, text: &str) -> Vec<UrlThreat> {
        self.urls
            .extractor()
            .find_iter(text)
            .filter_map(|m| self.urls.classify(m.as_str()))
            .collect()
    }

    /// Mask profanity and defuse suspicious links.
    ///
    /// Infallible, and idempotent: sanitizing the output again yields the
    /// same text.
    #[must_use]
    pub fn sanitize(&self, text: &str) -> SanitizeResult {
        let mut warnings = Vec::new();

        let profanity = self.profanity.detect(text);
        let masked = if profanity.found() {
            warnings.push(format!(
                "Inappropriate language filtered ({} word{})",
                profanity.words.len(),
                if profanity.words.len() == 1 { "" } else { "s" }
            ));
            self.profanity.mask(text).into_owned()
        } else {
            text.to_string()
        };

        let mut flagged = Vec::new();
        let sanitized_text = self
            .urls
            .extractor()
            .replace_all(&masked, |caps: &regex::Captures<'_>| {
                let token = &caps[0];
                match self.urls.classify(token) {
                    Some(threat) => {
                        flagged.push(threat);
                        format!("[suspicious link removed: {}]", threat)
                    }
                    None => token.to_string(),
                }
            })
            .into_owned();

        for threat in &flagged {
            warnings.push(format!("Suspicious link removed ({})", threat));
        }

        SanitizeResult {
            sanitized_text,
            has_suspicious_content: profanity.found() || !flagged.is_empty(),
            warnings,
        }
    }

    /// Decide whether a message must be rejected without being stored.
    ///
    /// `None` means the message may proceed to sanitizing.
    #[must_use]
    pub fn should_block_entirely(&self, text: &str, filename: Option<&str>) -> Option<BlockReason> {
        let profanity = self.profanity.detect(text);
        if profanity.words.len() > MAX_PROFANE_WORDS {
            return Some(BlockReason::ExcessiveProfanity {
                words: profanity.words.len(),
            });
        }

        if let Some(threat) = filename.and_then(file::classify_file) {
            return Some(BlockReason::SuspiciousAttachment(threat));
        }

        let links = self.suspicious_links(text).len();
        if links > MAX_SUSPICIOUS_LINKS {
            return Some(BlockReason::MultipleSuspiciousLinks { links });
        }

        None
    }
}
