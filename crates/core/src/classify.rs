//! Indicator classification.
//!
//! Turns a raw query string into a [`Detection`] describing what kind of
//! indicator it looks like. Classification is deterministic and never fails:
//! anything unrecognizable comes back as [`IndicatorKind::Unknown`] with
//! confidence 0.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Semantic indicator type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Ip,
    Domain,
    Email,
    Hash,
    Url,
    Username,
    Unknown,
}

impl IndicatorKind {
    /// Stable label, used for metrics and logging.
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::Ip => "ip",
            IndicatorKind::Domain => "domain",
            IndicatorKind::Email => "email",
            IndicatorKind::Hash => "hash",
            IndicatorKind::Url => "url",
            IndicatorKind::Username => "username",
            IndicatorKind::Unknown => "unknown",
        }
    }
}

/// Hash digest subtype, derived from the hex digest length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

/// Result of classifying a query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Indicator type. Always present; `unknown` when nothing matched.
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    /// Digest subtype when `kind` is `hash`.
    #[serde(rename = "subtype", default, skip_serializing_if = "Option::is_none")]
    pub hash_algo: Option<HashAlgo>,
    /// The trimmed value that was classified.
    pub value: String,
    /// 1.0 for structurally unambiguous matches, lower for heuristics.
    pub confidence: f32,
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}$").unwrap()
});

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}$").unwrap()
});

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Classify a raw query string.
///
/// Rules are applied in priority order; the first structural match wins, so
/// a hex digest is never misread as a domain and an IP literal is never
/// misread as a username.
pub fn classify(raw: &str) -> Detection {
    let value = raw.trim();

    if value.parse::<IpAddr>().is_ok() {
        return detection(IndicatorKind::Ip, None, value, 1.0);
    }

    if let Some(algo) = hash_algo_for(value) {
        return detection(IndicatorKind::Hash, Some(algo), value, 1.0);
    }

    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return detection(IndicatorKind::Url, None, value, 1.0);
    }

    if EMAIL_RE.is_match(value) {
        return detection(IndicatorKind::Email, None, value, 0.9);
    }

    if DOMAIN_RE.is_match(value) {
        return detection(IndicatorKind::Domain, None, value, 0.8);
    }

    if USERNAME_RE.is_match(value) {
        return detection(IndicatorKind::Username, None, value, 0.6);
    }

    detection(IndicatorKind::Unknown, None, value, 0.0)
}

fn detection(kind: IndicatorKind, hash_algo: Option<HashAlgo>, value: &str, conf: f32) -> Detection {
    Detection {
        kind,
        hash_algo,
        value: value.to_string(),
        confidence: conf,
    }
}

fn hash_algo_for(value: &str) -> Option<HashAlgo> {
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match value.len() {
        32 => Some(HashAlgo::Md5),
        40 => Some(HashAlgo::Sha1),
        64 => Some(HashAlgo::Sha256),
        128 => Some(HashAlgo::Sha512),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ipv4() {
        let d = classify("8.8.8.8");
        assert_eq!(d.kind, IndicatorKind::Ip);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.value, "8.8.8.8");
    }

    #[test]
    fn test_classify_ipv6() {
        let d = classify("2001:4860:4860::8888");
        assert_eq!(d.kind, IndicatorKind::Ip);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_classify_md5() {
        let d = classify("d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(d.kind, IndicatorKind::Hash);
        assert_eq!(d.hash_algo, Some(HashAlgo::Md5));
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_classify_sha1() {
        let d = classify("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(d.hash_algo, Some(HashAlgo::Sha1));
    }

    #[test]
    fn test_classify_sha256() {
        let d = classify(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
        assert_eq!(d.hash_algo, Some(HashAlgo::Sha256));
    }

    #[test]
    fn test_classify_sha512() {
        let d = classify(&"ab".repeat(64));
        assert_eq!(d.kind, IndicatorKind::Hash);
        assert_eq!(d.hash_algo, Some(HashAlgo::Sha512));
    }

    #[test]
    fn test_hash_wins_over_domain_shapes() {
        // All-hex, 32 chars: must be a hash even though it is also a valid
        // handle-shaped token.
        let d = classify("abcdefabcdefabcdefabcdefabcdefab");
        assert_eq!(d.kind, IndicatorKind::Hash);
    }

    #[test]
    fn test_classify_url() {
        let d = classify("https://example.com/malware.exe");
        assert_eq!(d.kind, IndicatorKind::Url);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_classify_email() {
        let d = classify("test@example.com");
        assert_eq!(d.kind, IndicatorKind::Email);
        assert!(d.confidence < 1.0);
    }

    #[test]
    fn test_classify_domain() {
        let d = classify("example.com");
        assert_eq!(d.kind, IndicatorKind::Domain);
        assert!(d.confidence < 1.0);
    }

    #[test]
    fn test_classify_subdomain() {
        let d = classify("mail.internal.example.co.uk");
        assert_eq!(d.kind, IndicatorKind::Domain);
    }

    #[test]
    fn test_classify_username() {
        let d = classify("jane_doe-42");
        assert_eq!(d.kind, IndicatorKind::Username);
    }

    #[test]
    fn test_classify_unknown() {
        let d = classify("not a valid indicator !!");
        assert_eq!(d.kind, IndicatorKind::Unknown);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn test_classify_empty_is_unknown() {
        let d = classify("   ");
        assert_eq!(d.kind, IndicatorKind::Unknown);
    }

    #[test]
    fn test_classify_trims_input() {
        let d = classify("  8.8.8.8  ");
        assert_eq!(d.kind, IndicatorKind::Ip);
        assert_eq!(d.value, "8.8.8.8");
    }

    #[test]
    fn test_detection_serialization() {
        let d = classify("d41d8cd98f00b204e9800998ecf8427e");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "hash");
        assert_eq!(json["subtype"], "md5");

        let d = classify("8.8.8.8");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "ip");
        assert!(json.get("subtype").is_none());
    }
}
