//! Evidence items gathered by investigator agents

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Shared, read-only handle to an evidence item.
///
/// Evidence is never owned by a single agent; arguments, conflicts and
/// resolutions all hold references to the same allocation.
pub type EvidenceRef = Arc<Evidence>;

/// Category of the source an evidence item was retrieved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Academic,
    Government,
    News,
    Financial,
    Social,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        Self::Academic,
        Self::Government,
        Self::News,
        Self::Financial,
        Self::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Government => "government",
            Self::News => "news",
            Self::Financial => "financial",
            Self::Social => "social",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Where the evidence was retrieved from
    pub source_url: String,
    /// Source category
    pub source_type: SourceType,
    /// Raw content excerpt
    pub content: String,
    /// Publication date, when known
    pub publish_date: Option<DateTime<Utc>>,
    /// Credibility score (0 - 100)
    pub credibility_score: f64,
    /// Relevance to the claim (0 - 100)
    pub relevance_score: f64,
    /// Set by the retrieval collaborator when the item came from a validated,
    /// non-synthetic source
    #[serde(default)]
    pub verified_real_data: bool,
}

impl Evidence {
    /// Create a new evidence item with neutral scores
    pub fn new(source_url: &str, source_type: SourceType, content: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            source_type,
            content: content.to_string(),
            publish_date: None,
            credibility_score: 50.0,
            relevance_score: 50.0,
            verified_real_data: false,
        }
    }

    pub fn with_scores(mut self, credibility: f64, relevance: f64) -> Self {
        self.credibility_score = credibility.clamp(0.0, 100.0);
        self.relevance_score = relevance.clamp(0.0, 100.0);
        self
    }

    pub fn published(mut self, date: DateTime<Utc>) -> Self {
        self.publish_date = Some(date);
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified_real_data = verified;
        self
    }

    /// Wrap into a shared reference
    pub fn shared(self) -> EvidenceRef {
        Arc::new(self)
    }

    /// Stable identity of an evidence item: SHA-256 over url and content
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_url.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Host part of the source URL, lowercased and without a `www.` prefix
    pub fn domain(&self) -> Option<String> {
        let rest = self
            .source_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.source_url);
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('@')
            .next()
            .unwrap_or_default()
            .split(':')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// Calendar quarter of the publication date as `(year, 1..=4)`
    pub fn quarter(&self) -> Option<(i32, u32)> {
        self.publish_date
            .map(|d| (d.year(), (d.month() - 1) / 3 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_domain_extraction() {
        let e = Evidence::new("https://www.Example.org/a/b?x=1", SourceType::News, "x");
        assert_eq!(e.domain().as_deref(), Some("example.org"));

        let e = Evidence::new("data.gov:8080/report", SourceType::Government, "x");
        assert_eq!(e.domain().as_deref(), Some("data.gov"));

        let e = Evidence::new("", SourceType::Social, "x");
        assert_eq!(e.domain(), None);
    }

    #[test]
    fn test_fingerprint_identity() {
        let a = Evidence::new("https://a.org", SourceType::News, "one");
        let b = Evidence::new("https://a.org", SourceType::Academic, "one").with_scores(90.0, 90.0);
        let c = Evidence::new("https://a.org", SourceType::News, "two");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_quarter() {
        let e = Evidence::new("https://a.org", SourceType::News, "x")
            .published(Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap());
        assert_eq!(e.quarter(), Some((2024, 2)));
    }

    #[test]
    fn test_scores_are_clamped() {
        let e = Evidence::new("https://a.org", SourceType::News, "x").with_scores(140.0, -3.0);
        assert_eq!(e.credibility_score, 100.0);
        assert_eq!(e.relevance_score, 0.0);
    }
}
