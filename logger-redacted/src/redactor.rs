use base64::{engine::general_purpose, Engine as _};
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::error::LoggerResult;

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
// Australian numbers (+61 / leading 0) and North American numbers
const PHONE_PATTERN: &str = r"(?:\+?61[\s-]?|\b0)[2-478](?:[\s-]?\d){8}\b|\b(?:\+1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b";
// 10 digit card number with optional 11th individual reference digit
const MEDICARE_PATTERN: &str = r"\b\d{4}[\s-]?\d{5}[\s-]?\d(?:[\s-]?\d)?\b";
const MRN_PATTERN: &str = r"(?i)\bMRN[:#\s-]*[A-Z0-9]{4,}\b";
const DOB_PATTERN: &str = r"(?i)\b(?:DOB|D\.O\.B\.|date of birth)[:\s]*\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}\b";

/// PHI redaction configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_medicare: bool,
    pub redact_mrn: bool,
    pub redact_dates_of_birth: bool,
    /// Replace values with a short hash so the same value can be correlated
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(String, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_medicare: true,
            redact_mrn: true,
            redact_dates_of_birth: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Pass text through untouched
    pub fn disabled() -> Self {
        Self {
            redact_emails: false,
            redact_phones: false,
            redact_medicare: false,
            redact_mrn: false,
            redact_dates_of_birth: false,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }

    pub fn with_custom_pattern(mut self, pattern: &str, replacement: &str) -> Self {
        self.custom_patterns
            .push((pattern.to_string(), replacement.to_string()));
        self
    }
}

struct Rule {
    label: &'static str,
    mask: &'static str,
    regex: Regex,
}

/// Masks patient identifiers before text reaches a log line
pub struct PhiRedactor {
    rules: Vec<Rule>,
    custom: Vec<(Regex, String)>,
    hash_for_correlation: bool,
}

impl PhiRedactor {
    pub fn new(config: RedactionConfig) -> LoggerResult<Self> {
        // Medicare runs before phone so card numbers are not half-matched as phones
        let candidates = [
            (config.redact_emails, "EMAIL", "***@***", EMAIL_PATTERN),
            (config.redact_dates_of_birth, "DOB", "DOB **/**/****", DOB_PATTERN),
            (config.redact_mrn, "MRN", "MRN******", MRN_PATTERN),
            (config.redact_medicare, "MEDICARE", "**** ***** *", MEDICARE_PATTERN),
            (config.redact_phones, "PHONE", "(***) ***-****", PHONE_PATTERN),
        ];

        let mut rules = Vec::new();
        for (enabled, label, mask, pattern) in candidates {
            if enabled {
                rules.push(Rule {
                    label,
                    mask,
                    regex: Regex::new(pattern)?,
                });
            }
        }

        let mut custom = Vec::with_capacity(config.custom_patterns.len());
        for (pattern, replacement) in &config.custom_patterns {
            custom.push((Regex::new(pattern)?, replacement.clone()));
        }

        Ok(Self {
            rules,
            custom,
            hash_for_correlation: config.hash_for_correlation,
        })
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        for rule in &self.rules {
            result = rule
                .regex
                .replace_all(&result, |caps: &Captures| {
                    let value = caps.get(0).map_or("", |m| m.as_str());
                    if self.hash_for_correlation {
                        format!("{}[{}]", rule.label, hash_value(value))
                    } else {
                        rule.mask.to_string()
                    }
                })
                .into_owned();
        }

        for (pattern, replacement) in &self.custom {
            result = pattern.replace_all(&result, replacement.as_str()).into_owned();
        }

        result
    }

    /// Redacted text cut to at most `max_chars` characters
    pub fn preview(&self, text: &str, max_chars: usize) -> String {
        let redacted = self.redact(text);
        if redacted.chars().count() <= max_chars {
            return redacted;
        }
        let mut cut: String = redacted.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    // first 8 bytes keep the tag short
    general_purpose::STANDARD.encode(digest.get(..8).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masking() -> PhiRedactor {
        PhiRedactor::new(RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_email_redaction() {
        let redacted = masking().redact("Send results to jane.citizen@example.com today");
        assert!(redacted.contains("***@***"));
        assert!(!redacted.contains("jane.citizen"));
    }

    #[test]
    fn test_phone_redaction() {
        let redactor = masking();
        assert!(!redactor.redact("Call me on 0412 345 678").contains("345"));
        assert!(redactor.redact("Call me at (555) 123-4567").contains("(***) ***-****"));
    }

    #[test]
    fn test_medicare_and_mrn_redaction() {
        let redacted = masking().redact("Medicare 2123 45670 1, MRN: 00123456");
        assert!(!redacted.contains("45670"));
        assert!(!redacted.contains("00123456"));
        assert!(redacted.contains("MRN******"));
    }

    #[test]
    fn test_date_of_birth_redaction() {
        let redacted = masking().redact("Patient DOB: 03/07/1985, presents with cough");
        assert!(!redacted.contains("1985"));
        assert!(redacted.contains("presents with cough"));
    }

    #[test]
    fn test_hash_is_stable_for_correlation() {
        let redactor = PhiRedactor::new(RedactionConfig::default()).unwrap();
        let a = redactor.redact("jane@example.com");
        let b = redactor.redact("jane@example.com");
        assert!(a.starts_with("EMAIL["));
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_pattern_and_bad_pattern() {
        let config = RedactionConfig::default().with_custom_pattern(r"\bBed \d+\b", "Bed [REDACTED]");
        let redactor = PhiRedactor::new(config).unwrap();
        assert_eq!(redactor.redact("moved to Bed 12"), "moved to Bed [REDACTED]");

        let broken = RedactionConfig::default().with_custom_pattern("(", "x");
        assert!(PhiRedactor::new(broken).is_err());
    }

    #[test]
    fn test_preview_truncates_after_redaction() {
        let preview = masking().preview("abcdefghij", 4);
        assert_eq!(preview, "abcd…");
        assert_eq!(masking().preview("short", 10), "short");
    }
}
