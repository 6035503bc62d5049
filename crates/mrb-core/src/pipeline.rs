//! Per-message ingestion pipeline: URL screening, then text moderation,
//! resolving to exactly one terminal action.

use std::{path::Path, sync::Arc};

use crate::{
    moderation::{ContentModerator, Violation},
    scanner::{extract_urls, ScanVerdict, UrlScanner},
};

/// Terminal state of a screened message. Each variant triggers exactly one
/// user-visible side effect in the transport handler.
#[derive(Clone, Debug)]
pub enum Action {
    /// Forward the (unmodified) text downstream.
    Allow { text: String },
    /// A scanned URL came back high/medium risk; delete and warn. Text
    /// moderation never ran.
    RejectUrl { url: String, verdict: ScanVerdict },
    /// Text moderation flagged the message; delete and warn with the
    /// violated categories.
    RejectContent {
        violations: Vec<Violation>,
        cleaned_text: String,
    },
}

impl Action {
    pub fn is_reject(&self) -> bool {
        !matches!(self, Action::Allow { .. })
    }
}

pub struct IngestionPipeline {
    scanner: Arc<UrlScanner>,
    moderator: Arc<ContentModerator>,
}

impl IngestionPipeline {
    pub fn new(scanner: Arc<UrlScanner>, moderator: Arc<ContentModerator>) -> Self {
        Self { scanner, moderator }
    }

    /// Screen inbound text: scan URLs in order of appearance, letting the
    /// first blocking verdict short-circuit (remaining URLs unscanned and
    /// moderation skipped); otherwise run the full moderation union.
    pub async fn screen_text(&self, text: &str) -> Action {
        for url in extract_urls(text) {
            let verdict = self.scanner.scan(&url).await;
            if verdict.is_blocking() {
                return Action::RejectUrl { url, verdict };
            }
        }

        let verdict = self.moderator.evaluate(text).await;
        if !verdict.is_safe {
            return Action::RejectContent {
                violations: verdict.violations,
                cleaned_text: verdict.cleaned_text,
            };
        }

        Action::Allow {
            text: text.to_string(),
        }
    }

    /// Coarse pre-intake check for image attachments; `Some(reason)` means
    /// reject before intake runs.
    pub fn screen_image(&self, path: &Path) -> Option<String> {
        let check = self.moderator.check_image(path);
        if check.is_safe {
            None
        } else {
            Some(check.reason)
        }
    }
}

/// Warning shown when a message is removed for a dangerous URL.
pub fn url_warning(url: &str, verdict: &ScanVerdict) -> String {
    format!(
        "Dangerous URL detected!\n\nURL: {url}\nRisk: {}\nReason: {}\n\nMessage has been removed for safety.",
        verdict.risk_level.as_str().to_uppercase(),
        verdict.message,
    )
}

/// Consolidated warning naming the violated categories.
pub fn content_warning(violations: &[Violation]) -> String {
    let names = violations
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Message removed due to: {names}\nPlease follow community guidelines!")
}

/// Split a long downstream reply into ordered, ceiling-sized chunks
/// (measured in characters, split on char boundaries).
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    // Zero makes no sense as a ceiling; deliver the text whole rather
    // than panic on a misconfigured limit.
    if limit == 0 {
        if text.is_empty() {
            return Vec::new();
        }
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ClassifierVerdict, TextClassifier};
    use crate::scanner::{RiskLevel, ScanReport, ScanService};
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct ScriptedScanService {
        // url -> score
        scores: Vec<(&'static str, i64)>,
        submissions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScanService for ScriptedScanService {
        async fn submit(&self, url: &str) -> Result<String> {
            self.submissions.lock().unwrap().push(url.to_string());
            Ok(url.to_string())
        }

        async fn fetch_result(&self, scan_id: &str) -> Result<ScanReport> {
            let score = self
                .scores
                .iter()
                .find(|(u, _)| *u == scan_id)
                .map(|(_, s)| *s)
                .unwrap_or(0);
            Ok(ScanReport {
                score: Some(score),
                categories: vec![],
                task_id: None,
            })
        }
    }

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextClassifier for CountingClassifier {
        async fn classify(&self, _text: &str) -> ClassifierVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ClassifierVerdict::safe("ok")
        }
    }

    fn pipeline(
        scores: Vec<(&'static str, i64)>,
    ) -> (
        IngestionPipeline,
        Arc<ScriptedScanService>,
        Arc<CountingClassifier>,
    ) {
        let service = Arc::new(ScriptedScanService {
            scores,
            submissions: Mutex::new(Vec::new()),
        });
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
        });
        let scanner = Arc::new(UrlScanner::new(
            service.clone(),
            Duration::from_secs(10),
            CancellationToken::new(),
        ));
        let moderator = Arc::new(ContentModerator::new(classifier.clone()));
        (
            IngestionPipeline::new(scanner, moderator),
            service,
            classifier,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn clean_text_without_urls_is_allowed_unmodified() {
        let (p, service, _) = pipeline(vec![]);
        let action = p.screen_text("just a friendly message").await;
        match action {
            Action::Allow { text } => assert_eq!(text, "just a friendly message"),
            other => panic!("expected Allow, got {other:?}"),
        }
        assert!(service.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn high_risk_url_short_circuits() {
        let (p, service, classifier) = pipeline(vec![
            ("http://evil.com", 85),
            ("http://later.com", 0),
        ]);

        // Profane text after the URL must not matter: the first blocking
        // verdict pre-empts moderation and the remaining URL.
        let action = p
            .screen_text("fuck this, see http://evil.com and http://later.com")
            .await;

        match &action {
            Action::RejectUrl { url, verdict } => {
                assert_eq!(url, "http://evil.com");
                assert_eq!(verdict.risk_level, RiskLevel::High);
            }
            other => panic!("expected RejectUrl, got {other:?}"),
        }
        assert_eq!(
            *service.submissions.lock().unwrap(),
            vec!["http://evil.com".to_string()]
        );
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn safe_urls_fall_through_to_moderation() {
        let (p, _, classifier) = pipeline(vec![("http://fine.com", 10)]);
        let action = p.screen_text("look at http://fine.com").await;
        assert!(matches!(action, Action::Allow { .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_high_score_url_is_rejected_with_high_in_warning() {
        let (p, _, _) = pipeline(vec![("http://example.com", 85)]);
        let action = p.screen_text("Check out http://example.com now!!!").await;
        let Action::RejectUrl { url, verdict } = &action else {
            panic!("expected RejectUrl");
        };
        let warning = url_warning(url, verdict);
        assert!(warning.contains("HIGH"));
        assert!(warning.contains("http://example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_adult_content_without_urls() {
        let (p, _, _) = pipeline(vec![]);
        let action = p.screen_text("visit xxx content now").await;
        let Action::RejectContent { violations, .. } = &action else {
            panic!("expected RejectContent");
        };
        assert_eq!(violations.iter().map(|v| v.as_str()).collect::<Vec<_>>(), vec!["adult_content"]);
        let warning = content_warning(violations);
        assert!(warning.contains("adult_content"));
    }

    #[test]
    fn split_reply_preserves_order_and_content() {
        let text = "a".repeat(4000) + &"b".repeat(4000) + "c";
        let chunks = split_reply(&text, 4000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "a".repeat(4000));
        assert_eq!(chunks[1], "b".repeat(4000));
        assert_eq!(chunks[2], "c");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_reply_short_text_is_one_chunk() {
        assert_eq!(split_reply("hi", 4000), vec!["hi".to_string()]);
    }

    #[test]
    fn split_reply_zero_limit_delivers_whole_text() {
        assert_eq!(split_reply("hi", 0), vec!["hi".to_string()]);
        assert!(split_reply("", 0).is_empty());
    }

    #[test]
    fn split_reply_handles_multibyte_chars() {
        let text = "é".repeat(10);
        let chunks = split_reply(&text, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }
}
