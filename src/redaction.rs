//! PII scrubbing for audit records.
//!
//! Replaces email addresses, North-American phone numbers, and IPv4
//! addresses with fixed markers before text is stored in the audit log.
//! The markers contain no digits or `@`, so scrubbing is idempotent.

use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap()
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?\d{1,3}[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})\b").unwrap()
});

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap()
});

/// Result of a scrub pass: the substituted text and how many matches
/// were replaced across all three patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubResult {
    pub text: String,
    pub count: usize,
}

/// Redact email, phone, and IPv4 shapes from the given text.
///
/// Patterns are applied in a fixed order; the order only affects the
/// count since the markers cannot themselves match a later pattern.
pub fn scrub(input: &str) -> ScrubResult {
    let mut count = 0;
    let text = apply(&EMAIL_RE, "[REDACTED_EMAIL]", input, &mut count);
    let text = apply(&PHONE_RE, "[REDACTED_PHONE]", &text, &mut count);
    let text = apply(&IPV4_RE, "[REDACTED_IP]", &text, &mut count);
    ScrubResult { text, count }
}

fn apply(re: &Regex, marker: &str, text: &str, count: &mut usize) -> String {
    let matches = re.find_iter(text).count();
    if matches == 0 {
        return text.to_owned();
    }
    *count += matches;
    re.replace_all(text, marker).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_email_phone_and_ip() {
        let input = "Contact john@example.com or +1 (555) 123-4567 from 10.0.0.2";
        let res = scrub(input);
        assert!(res.count >= 3, "expected at least 3 redactions, got {}", res.count);
        assert_ne!(res.text, input);
        assert!(res.text.contains("[REDACTED_EMAIL]"));
        assert!(res.text.contains("[REDACTED_PHONE]"));
        assert!(res.text.contains("[REDACTED_IP]"));
    }

    #[test]
    fn email_matching_is_case_insensitive() {
        let res = scrub("Mail John.Doe@Example.COM today");
        assert!(res.text.contains("[REDACTED_EMAIL]"));
        assert_eq!(res.count, 1);
    }

    #[test]
    fn untouched_text_passes_through() {
        let input = "No personal data in this sentence.";
        let res = scrub(input);
        assert_eq!(res.text, input);
        assert_eq!(res.count, 0);
    }

    #[test]
    fn empty_input() {
        let res = scrub("");
        assert_eq!(res.text, "");
        assert_eq!(res.count, 0);
    }

    #[test]
    fn scrub_is_idempotent() {
        let input = "Investigate user john@example.com from IP 10.1.1.1, callback 555-123-4567";
        let once = scrub(input);
        let twice = scrub(&once.text);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.count, 0);
    }

    #[test]
    fn counts_every_match() {
        let res = scrub("a@b.io and c@d.io met at 192.168.0.1");
        assert_eq!(res.count, 3);
    }
}
