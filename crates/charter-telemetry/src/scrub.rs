//! PII scrubbing
//!
//! Applies an ordered list of redaction patterns to event payloads before
//! they leave the process. Scrubbing is mandatory and ordered before
//! transport; a scrub failure drops the event rather than forwarding it raw
//! (fail-closed for privacy).

use charter_core::{Error, Result};
use regex::Regex;
use serde_json::Value;

struct ScrubPattern {
    label: &'static str,
    regex: Regex,
}

/// Ordered PII scrubber over JSON payloads
pub struct PiiScrubber {
    patterns: Vec<ScrubPattern>,
}

impl PiiScrubber {
    /// Create a scrubber with the standard pattern set: email, SSN,
    /// credit card, IPv4 address, phone number
    pub fn new() -> Result<Self> {
        let specs: [(&'static str, &'static str); 5] = [
            ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b"),
            ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
            ("credit_card", r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"),
            ("ip", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
            ("phone", r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (label, pattern) in specs {
            let regex = Regex::new(pattern)
                .map_err(|e| Error::scrub(format!("failed to compile {} pattern: {}", label, e)))?;
            patterns.push(ScrubPattern { label, regex });
        }

        Ok(Self { patterns })
    }

    /// Scrub every string in the payload, in pattern order.
    ///
    /// Returns the rewritten payload; callers drop the event on error.
    pub fn scrub(&self, payload: &Value) -> Result<Value> {
        let mut scrubbed = payload.clone();
        self.scrub_in_place(&mut scrubbed);
        Ok(scrubbed)
    }

    /// Whether the text still contains anything the pattern set matches
    pub fn contains_pii(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(text))
    }

    fn scrub_in_place(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if let Some(clean) = self.scrub_str(s) {
                    *s = clean;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.scrub_in_place(item);
                }
            }
            Value::Object(map) => {
                for (_, v) in map.iter_mut() {
                    self.scrub_in_place(v);
                }
            }
            _ => {}
        }
    }

    fn scrub_str(&self, text: &str) -> Option<String> {
        let mut current = std::borrow::Cow::Borrowed(text);
        for pattern in &self.patterns {
            if pattern.regex.is_match(&current) {
                let replacement = format!("[REDACTED:{}]", pattern.label);
                current = std::borrow::Cow::Owned(
                    pattern
                        .regex
                        .replace_all(&current, replacement.as_str())
                        .into_owned(),
                );
            }
        }
        match current {
            std::borrow::Cow::Borrowed(_) => None,
            std::borrow::Cow::Owned(s) => Some(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_redacted() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({"text": "Contact me at john@example.com today"});

        let scrubbed = scrubber.scrub(&payload).unwrap();
        let text = scrubbed["text"].as_str().unwrap();
        assert!(text.contains("[REDACTED:email]"));
        assert!(!text.contains("john@example.com"));
    }

    #[test]
    fn test_ssn_and_phone_distinguished() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({"text": "SSN 123-45-6789, call 555-123-4567"});

        let scrubbed = scrubber.scrub(&payload).unwrap();
        let text = scrubbed["text"].as_str().unwrap();
        assert!(text.contains("[REDACTED:ssn]"));
        assert!(text.contains("[REDACTED:phone]"));
    }

    #[test]
    fn test_credit_card_redacted() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({"text": "card 4111-1111-1111-1111 on file"});

        let scrubbed = scrubber.scrub(&payload).unwrap();
        assert!(!scrubbed["text"].as_str().unwrap().contains("4111"));
    }

    #[test]
    fn test_ip_redacted() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({"source": "login from 192.168.1.50"});

        let scrubbed = scrubber.scrub(&payload).unwrap();
        assert_eq!(
            scrubbed["source"].as_str().unwrap(),
            "login from [REDACTED:ip]"
        );
    }

    #[test]
    fn test_nested_structures_scrubbed() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({
            "user": {"contact": "a@b.io"},
            "history": ["ok", "mail bob@corp.example"],
            "count": 3,
        });

        let scrubbed = scrubber.scrub(&payload).unwrap();
        assert!(scrubbed["user"]["contact"]
            .as_str()
            .unwrap()
            .contains("[REDACTED:email]"));
        assert!(scrubbed["history"][1]
            .as_str()
            .unwrap()
            .contains("[REDACTED:email]"));
        assert_eq!(scrubbed["count"], 3);
    }

    #[test]
    fn test_clean_payload_unchanged() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({"text": "no sensitive content here"});
        assert_eq!(scrubber.scrub(&payload).unwrap(), payload);
    }

    #[test]
    fn test_scrubbed_output_never_matches_patterns() {
        let scrubber = PiiScrubber::new().unwrap();
        let payload = json!({
            "a": "john@example.com",
            "b": "123-45-6789",
            "c": "4111 1111 1111 1111",
            "d": "10.0.0.1",
            "e": "555.123.4567",
        });

        let scrubbed = scrubber.scrub(&payload).unwrap();
        for (_, v) in scrubbed.as_object().unwrap() {
            assert!(!scrubber.contains_pii(v.as_str().unwrap()));
        }
    }
}
