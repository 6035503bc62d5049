//! Text content moderation: local rule sets plus a remote classifier.
//!
//! All checks always run so the violation set is complete; the remote
//! classifier fails open (adds no violation) when it is unavailable.

use std::{path::Path, sync::Arc, sync::OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::scanner::extract_urls;

/// Violation-kind tags, in the order checks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    Profanity,
    AdultContent,
    Copyright,
    Spam,
    AiFlagged,
}

impl Violation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Violation::Profanity => "profanity",
            Violation::AdultContent => "adult_content",
            Violation::Copyright => "copyright",
            Violation::Spam => "spam",
            Violation::AiFlagged => "ai_flagged",
        }
    }
}

/// One verdict per inbound text payload.
///
/// Invariant: `is_safe == violations.is_empty()`, and `cleaned_text` equals
/// the input when safe.
#[derive(Clone, Debug)]
pub struct ModerationVerdict {
    pub is_safe: bool,
    pub violations: Vec<Violation>,
    pub cleaned_text: String,
}

impl ModerationVerdict {
    pub fn violation_names(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.as_str()).collect()
    }
}

/// Structured verdict from the remote classifier.
///
/// An explicit boolean replaces the original free-text signal sniffing; the
/// adapter owns the parsing and maps any call/parse failure to `unavailable`.
#[derive(Clone, Debug)]
pub struct ClassifierVerdict {
    pub is_safe: bool,
    pub reason: String,
}

impl ClassifierVerdict {
    pub fn safe(reason: impl Into<String>) -> Self {
        Self {
            is_safe: true,
            reason: reason.into(),
        }
    }

    pub fn flagged(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
        }
    }

    /// Fail-open verdict for classifier outages.
    pub fn unavailable() -> Self {
        Self::safe("moderation unavailable")
    }
}

/// Port for the remote text-classification service.
///
/// Infallible by contract: outages are modeled as `unavailable` verdicts,
/// never surfaced as errors to the moderation path.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> ClassifierVerdict;
}

/// Result of the coarse image check (dimension heuristic, not a content
/// classifier).
#[derive(Clone, Debug)]
pub struct ImageCheck {
    pub is_safe: bool,
    pub reason: String,
}

const ADULT_KEYWORDS: &[&str] = &[
    "xxx", "porn", "sex", "nude", "naked", "adult", "nsfw", "erotic", "sexual", "explicit",
    "mature",
];

const COPYRIGHT_KEYWORDS: &[&str] = &[
    "pirated",
    "cracked",
    "leaked",
    "bootleg",
    "unauthorized",
    "copyright",
    "©",
    "all rights reserved",
    "proprietary",
];

const SPAM_PHRASES: &[&str] = &["buy now", "click here", "limited time", "act now"];

/// Censored word list. Deliberately small; extend via deployment config if
/// the community needs a stricter dictionary.
const PROFANITY_WORDS: &[&str] = &[
    "ass", "asshole", "bastard", "bitch", "bollocks", "crap", "cunt", "damn", "dick", "fuck",
    "fucking", "piss", "prick", "shit", "slut", "twat", "wanker", "whore",
];

pub struct ContentModerator {
    classifier: Arc<dyn TextClassifier>,
}

impl ContentModerator {
    pub fn new(classifier: Arc<dyn TextClassifier>) -> Self {
        Self { classifier }
    }

    /// Evaluate free text against all checks; violations union.
    pub async fn evaluate(&self, text: &str) -> ModerationVerdict {
        let mut violations = Vec::new();

        if contains_profanity(text) {
            violations.push(Violation::Profanity);
        }

        let lower = text.to_lowercase();
        if ADULT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            violations.push(Violation::AdultContent);
        }
        if COPYRIGHT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            violations.push(Violation::Copyright);
        }

        let ai = self.classifier.classify(text).await;
        if !ai.is_safe {
            violations.push(Violation::AiFlagged);
        }

        let cleaned_text = if violations.is_empty() {
            text.to_string()
        } else {
            censor(text)
        };

        ModerationVerdict {
            is_safe: violations.is_empty(),
            violations,
            cleaned_text,
        }
    }

    /// Coarse image screening: reject suspiciously small images, pass
    /// anything unreadable (fail-open).
    pub fn check_image(&self, path: &Path) -> ImageCheck {
        match image::image_dimensions(path) {
            Ok((width, height)) => {
                if width < 100 || height < 100 {
                    ImageCheck {
                        is_safe: false,
                        reason: "Suspicious image dimensions".to_string(),
                    }
                } else {
                    ImageCheck {
                        is_safe: true,
                        reason: "Image passed basic checks".to_string(),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "image check skipped");
                ImageCheck {
                    is_safe: true,
                    reason: "Could not process image".to_string(),
                }
            }
        }
    }
}

fn word_in_list(word: &str, list: &[&str]) -> bool {
    list.iter().any(|w| word.eq_ignore_ascii_case(w))
}

/// True when any whole word matches the censored dictionary.
pub fn contains_profanity(text: &str) -> bool {
    words(text).any(|w| word_in_list(w, PROFANITY_WORDS))
}

/// Replace each censored word with `****`, leaving everything else intact.
pub fn censor(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let start = match rest.find(|c: char| c.is_alphanumeric()) {
            Some(i) => i,
            None => {
                out.push_str(rest);
                break;
            }
        };
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let end = rest
            .find(|c: char| !c.is_alphanumeric())
            .unwrap_or(rest.len());
        let word = &rest[..end];
        if word_in_list(word, PROFANITY_WORDS) {
            out.push_str("****");
        } else {
            out.push_str(word);
        }
        rest = &rest[end..];
    }

    out
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Spam heuristic, separate from the main verdict: 3+ URLs, shouting runs,
/// repeated characters, or a known promotional phrase.
pub fn is_spam_like(text: &str) -> bool {
    if extract_urls(text).len() >= 3 {
        return true;
    }

    static CAPS_RE: OnceLock<Regex> = OnceLock::new();
    let caps = CAPS_RE.get_or_init(|| Regex::new(r"[A-Z]{5,}").expect("valid regex"));
    if caps.is_match(text) {
        return true;
    }

    if has_repeated_char(text, 5) {
        return true;
    }

    let lower = text.to_lowercase();
    SPAM_PHRASES.iter().any(|p| lower.contains(p))
}

fn has_repeated_char(text: &str, run: usize) -> bool {
    let mut prev = None;
    let mut count = 0;
    for c in text.chars() {
        if Some(c) == prev {
            count += 1;
            if count >= run {
                return true;
            }
        } else {
            prev = Some(c);
            count = 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier(ClassifierVerdict);

    #[async_trait]
    impl TextClassifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> ClassifierVerdict {
            self.0.clone()
        }
    }

    fn moderator_with(verdict: ClassifierVerdict) -> ContentModerator {
        ContentModerator::new(Arc::new(FixedClassifier(verdict)))
    }

    fn moderator() -> ContentModerator {
        moderator_with(ClassifierVerdict::safe("ok"))
    }

    #[tokio::test]
    async fn clean_text_is_safe_and_unmodified() {
        let v = moderator().evaluate("hello, how are you today?").await;
        assert!(v.is_safe);
        assert!(v.violations.is_empty());
        assert_eq!(v.cleaned_text, "hello, how are you today?");
    }

    #[tokio::test]
    async fn adult_keyword_flags_and_censors() {
        let v = moderator().evaluate("visit xxx content now").await;
        assert!(!v.is_safe);
        assert_eq!(v.violations, vec![Violation::AdultContent]);
        // "xxx" is a keyword, not a censored word: redaction only touches
        // the profanity dictionary.
        assert_eq!(v.cleaned_text, "visit xxx content now");
    }

    #[tokio::test]
    async fn profanity_is_flagged_and_redacted() {
        let v = moderator().evaluate("what the fuck is this").await;
        assert!(!v.is_safe);
        assert_eq!(v.violations, vec![Violation::Profanity]);
        assert_eq!(v.cleaned_text, "what the **** is this");
    }

    #[tokio::test]
    async fn copyright_keyword_is_flagged() {
        let v = moderator().evaluate("get the cracked version here").await;
        assert_eq!(v.violations, vec![Violation::Copyright]);
    }

    #[tokio::test]
    async fn ai_flag_joins_the_union() {
        let v = moderator_with(ClassifierVerdict::flagged("bad"))
            .evaluate("pirated movie, damn good")
            .await;
        assert_eq!(
            v.violations,
            vec![Violation::Profanity, Violation::Copyright, Violation::AiFlagged]
        );
        assert!(!v.is_safe);
    }

    #[tokio::test]
    async fn is_safe_iff_violations_empty() {
        // Property over keyword combinations: the invariant must hold for
        // every generated verdict.
        let fragments = ["hello", "xxx", "pirated", "fuck", "nice weather"];
        for mask in 0..(1u32 << fragments.len()) {
            let text = fragments
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect::<Vec<_>>()
                .join(" ");
            let v = moderator().evaluate(&text).await;
            assert_eq!(v.is_safe, v.violations.is_empty(), "text: {text:?}");
            if v.is_safe {
                assert_eq!(v.cleaned_text, text);
            }
        }
    }

    #[test]
    fn censor_preserves_non_matching_text() {
        assert_eq!(censor("no bad words"), "no bad words");
        assert_eq!(censor("Shit happens."), "**** happens.");
    }

    #[test]
    fn profanity_matches_whole_words_only() {
        // "class" contains "ass" but must not match.
        assert!(!contains_profanity("classic assignment"));
        assert!(contains_profanity("you ass"));
    }

    #[test]
    fn spam_heuristics() {
        assert!(is_spam_like(
            "http://a.com http://b.com http://c.com free stuff"
        ));
        assert!(is_spam_like("HELLO everyone"));
        assert!(is_spam_like("soooooo cool"));
        assert!(is_spam_like("Buy now while supplies last"));
        assert!(!is_spam_like("a normal sentence with one http://link.com"));
    }

    #[test]
    fn image_check_rejects_small_and_passes_unreadable() {
        let dir = std::env::temp_dir();
        let pid = std::process::id();

        let small = dir.join(format!("mrb-mod-small-{pid}.png"));
        image::RgbImage::new(50, 50).save(&small).unwrap();
        let big = dir.join(format!("mrb-mod-big-{pid}.png"));
        image::RgbImage::new(200, 150).save(&big).unwrap();
        let bogus = dir.join(format!("mrb-mod-bogus-{pid}.png"));
        std::fs::write(&bogus, b"not an image").unwrap();

        let m = moderator();
        assert!(!m.check_image(&small).is_safe);
        assert!(m.check_image(&big).is_safe);
        assert!(m.check_image(&bogus).is_safe);

        for p in [small, big, bogus] {
            let _ = std::fs::remove_file(p);
        }
    }
}
