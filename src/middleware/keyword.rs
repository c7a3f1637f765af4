//! Regex-free keyword detector. Substring, case-insensitive, over the
//! JSON-serialized function result.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::severity::Severity;

/// The default flat keyword list, searched independently of category.
fn default_keywords() -> &'static [&'static str] {
    &[
        "confidential",
        "classified",
        "top secret",
        "restricted",
        "sensitive",
        "for internal use only",
        "do not distribute",
        "need-to-know",
        "proprietary",
        "trade secret",
        "internal use only",
        "do not share",
        "confidential business information",
        "password reset",
        "account verification",
        "urgent action required",
        "click here",
        "verify now",
        "immediate action needed",
        "your account will be closed",
        "suspicious activity detected",
        "wire transfer",
        "payment required",
        "refund processing",
        "account suspended",
        "payment failed",
        "ssn",
        "social security number",
        "credit card",
        "date of birth",
        "mother's maiden name",
    ]
}

/// Category assignment patterns, checked in this fixed order — first match
/// wins, so a keyword belongs to at most one category. These are narrower
/// substrings than the keyword list itself (e.g. `"internal use only"` is a
/// keyword but `"internal use only"` also satisfies the security pattern
/// before the business one ever gets a look).
fn category_patterns() -> [(&'static str, &'static [&'static str]); 5] {
    [
        (
            "security",
            &[
                "confidential",
                "classified",
                "top secret",
                "restricted",
                "sensitive",
                "internal use only",
                "do not distribute",
                "need-to-know",
            ],
        ),
        (
            "business",
            &["proprietary", "trade secret", "do not share", "confidential business"],
        ),
        (
            "action",
            &[
                "password reset",
                "account verification",
                "urgent action",
                "click here",
                "verify now",
                "immediate action",
                "account will be closed",
                "suspicious activity",
            ],
        ),
        (
            "financial",
            &["wire transfer", "payment required", "refund", "account suspended", "payment failed"],
        ),
        (
            "pii",
            &["ssn", "social security", "credit card", "date of birth", "mother's maiden name"],
        ),
    ]
}

/// First matching category for an already-detected keyword, or `None` if it
/// falls outside all five patterns.
fn categorize(keyword: &str) -> Option<&'static str> {
    let keyword_lower = keyword.to_lowercase();
    category_patterns()
        .into_iter()
        .find(|(_, patterns)| patterns.iter().any(|p| keyword_lower.contains(p)))
        .map(|(category, _)| category)
}

#[derive(Debug, Clone, Default)]
pub struct KeywordDetectionResult {
    pub detected: Vec<String>,
    pub occurrences: HashMap<String, usize>,
    pub categories: HashMap<String, Vec<String>>,
    pub risk_score: f32,
    pub severity: Severity,
}

/// `keywords`, when given, is matched flat (no category structure, so no
/// category multiplier bump applies) — a custom list is assumed to already
/// be risk-homogeneous. Otherwise the default flat keyword list is searched,
/// and each hit is separately classified into at most one category.
pub fn detect_keywords(result: &Value, keywords: Option<&[String]>) -> KeywordDetectionResult {
    let haystack = serde_json::to_string(result).unwrap_or_default().to_lowercase();

    let mut out = KeywordDetectionResult::default();

    match keywords {
        Some(custom) => {
            for kw in custom {
                let needle = kw.to_lowercase();
                let count = count_occurrences(&haystack, &needle);
                if count > 0 {
                    out.detected.push(kw.clone());
                    *out.occurrences.entry(kw.clone()).or_insert(0) += count;
                }
            }
        }
        None => {
            for kw in default_keywords() {
                let needle = kw.to_lowercase();
                let count = count_occurrences(&haystack, &needle);
                if count > 0 {
                    out.detected.push(kw.to_string());
                    *out.occurrences.entry(kw.to_string()).or_insert(0) += count;
                }
            }
            for kw in &out.detected {
                if let Some(category) = categorize(kw) {
                    out.categories
                        .entry(category.to_string())
                        .or_default()
                        .push(kw.clone());
                }
            }
        }
    }

    let base = (0.1 * out.detected.len() as f32).min(0.7);

    let mut multiplier: f32 = 1.0;
    if out.categories.contains_key("security") {
        multiplier = multiplier.max(1.2);
    }
    if out.categories.contains_key("action") {
        multiplier = multiplier.max(1.3);
    }
    if out.categories.contains_key("financial") {
        multiplier = multiplier.max(1.2);
    }
    if out.categories.contains_key("pii") {
        multiplier = multiplier.max(1.3);
    }

    out.risk_score = (base * multiplier).min(0.95);
    out.severity = if out.risk_score >= 0.7 {
        Severity::High
    } else if out.risk_score >= 0.4 {
        Severity::Medium
    } else if out.risk_score >= 0.2 {
        Severity::Low
    } else {
        Severity::Safe
    };

    out
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}
