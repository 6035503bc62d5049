//! URL threat scanning (urlscan.io-shaped service behind a port).
//!
//! Scanning is fail-open by policy: a scanner outage must never block
//! legitimate traffic, so every internal failure degrades to an `Unknown`
//! verdict instead of an error.

use std::{sync::Arc, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Risk classification of a scanned URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    /// Scanner unavailable or result unusable; treated as safe (fail-open).
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Immutable per-scan verdict.
#[derive(Clone, Debug)]
pub struct ScanVerdict {
    pub target: String,
    pub risk_level: RiskLevel,
    pub score: Option<u8>,
    pub is_safe: bool,
    pub message: String,
    pub report_url: Option<String>,
}

impl ScanVerdict {
    fn unavailable(target: &str, message: &str) -> Self {
        Self {
            target: target.to_string(),
            risk_level: RiskLevel::Unknown,
            score: None,
            is_safe: true,
            message: message.to_string(),
            report_url: None,
        }
    }

    /// High/medium risk blocks the message upstream.
    pub fn is_blocking(&self) -> bool {
        matches!(self.risk_level, RiskLevel::High | RiskLevel::Medium)
    }
}

/// Raw result payload from the scan service.
#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    pub score: Option<i64>,
    pub categories: Vec<String>,
    pub task_id: Option<String>,
}

/// Port for the remote URL-scanning service.
///
/// Results are produced asynchronously server-side: `submit` returns an
/// opaque scan id and `fetch_result` is only meaningful after a settling
/// interval.
#[async_trait]
pub trait ScanService: Send + Sync {
    async fn submit(&self, url: &str) -> Result<String>;
    async fn fetch_result(&self, scan_id: &str) -> Result<ScanReport>;
}

pub struct UrlScanner {
    service: Arc<dyn ScanService>,
    settle: Duration,
    shutdown: CancellationToken,
}

impl UrlScanner {
    pub fn new(service: Arc<dyn ScanService>, settle: Duration, shutdown: CancellationToken) -> Self {
        Self {
            service,
            settle,
            shutdown,
        }
    }

    /// Scan a URL. Never fails: submit/fetch errors, shutdown during the
    /// settling wait, and malformed payloads all yield fail-open verdicts.
    pub async fn scan(&self, url: &str) -> ScanVerdict {
        let scan_id = match self.service.submit(url).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(url, error = %e, "URL scan submission failed");
                return ScanVerdict::unavailable(url, "Failed to submit URL for scanning");
            }
        };

        // Results are not available synchronously; give the service time
        // to process before fetching. Abort the wait on shutdown.
        tokio::select! {
            _ = tokio::time::sleep(self.settle) => {}
            _ = self.shutdown.cancelled() => {
                return ScanVerdict::unavailable(url, "Scanner temporarily unavailable");
            }
        }

        match self.service.fetch_result(&scan_id).await {
            Ok(report) => classify_report(url, &report),
            Err(e) => {
                tracing::warn!(url, error = %e, "URL scan result fetch failed");
                ScanVerdict::unavailable(url, "Scan results not available yet")
            }
        }
    }
}

/// Map the service's numeric malice score onto a risk level.
///
/// Thresholds: >=80 high, >=40 medium, >=20 low, else safe. Only high and
/// medium are unsafe.
fn classify_report(url: &str, report: &ScanReport) -> ScanVerdict {
    let score = report.score.unwrap_or(0);

    let (risk_level, is_safe, message) = if score >= 80 {
        (
            RiskLevel::High,
            false,
            "High risk URL detected! This link may be dangerous.",
        )
    } else if score >= 40 {
        (RiskLevel::Medium, false, "Medium risk URL. Exercise caution.")
    } else if score >= 20 {
        (RiskLevel::Low, true, "Low risk detected. Proceed with caution.")
    } else {
        (RiskLevel::Safe, true, "URL appears to be safe.")
    };

    ScanVerdict {
        target: url.to_string(),
        risk_level,
        score: Some(score.clamp(0, 100) as u8),
        is_safe,
        message: message.to_string(),
        report_url: report
            .task_id
            .as_deref()
            .map(|id| format!("https://urlscan.io/result/{id}")),
    }
}

/// Extract URLs from raw text, in order of appearance, without dedup.
///
/// Pure and idempotent: re-extracting from the joined result yields the
/// same URLs unmangled.
pub fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(
            r"(?i)https?://(?:[-\w.])+(?::\d+)?(?:/(?:[\w/_.])*(?:\?(?:[\w&=%.])*)?(?:#(?:[\w.])*)?)?",
        )
        .expect("valid regex")
    });
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::sync::Mutex;

    struct FakeScanService {
        score: Option<i64>,
        fail_submit: bool,
        fail_fetch: bool,
        submissions: Mutex<Vec<String>>,
    }

    impl FakeScanService {
        fn with_score(score: i64) -> Self {
            Self {
                score: Some(score),
                fail_submit: false,
                fail_fetch: false,
                submissions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScanService for FakeScanService {
        async fn submit(&self, url: &str) -> Result<String> {
            if self.fail_submit {
                return Err(Error::External("submit failed".to_string()));
            }
            self.submissions.lock().unwrap().push(url.to_string());
            Ok("scan-1".to_string())
        }

        async fn fetch_result(&self, _scan_id: &str) -> Result<ScanReport> {
            if self.fail_fetch {
                return Err(Error::External("fetch failed".to_string()));
            }
            Ok(ScanReport {
                score: self.score,
                categories: vec![],
                task_id: Some("task-1".to_string()),
            })
        }
    }

    fn scanner(service: FakeScanService) -> UrlScanner {
        UrlScanner::new(
            Arc::new(service),
            Duration::from_secs(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn score_thresholds_map_to_risk_levels() {
        for (score, level, safe) in [
            (85, RiskLevel::High, false),
            (80, RiskLevel::High, false),
            (40, RiskLevel::Medium, false),
            (20, RiskLevel::Low, true),
            (0, RiskLevel::Safe, true),
        ] {
            let v = scanner(FakeScanService::with_score(score))
                .scan("http://example.com")
                .await;
            assert_eq!(v.risk_level, level, "score {score}");
            assert_eq!(v.is_safe, safe, "score {score}");
            assert_eq!(v.score, Some(score as u8));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submit_failure_fails_open() {
        let mut svc = FakeScanService::with_score(99);
        svc.fail_submit = true;
        let v = scanner(svc).scan("http://example.com").await;
        assert_eq!(v.risk_level, RiskLevel::Unknown);
        assert!(v.is_safe);
        assert!(!v.is_blocking());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_fails_open() {
        let mut svc = FakeScanService::with_score(99);
        svc.fail_fetch = true;
        let v = scanner(svc).scan("http://example.com").await;
        assert_eq!(v.risk_level, RiskLevel::Unknown);
        assert!(v.is_safe);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_settle_fails_open() {
        let token = CancellationToken::new();
        let scanner = UrlScanner::new(
            Arc::new(FakeScanService::with_score(99)),
            Duration::from_secs(10),
            token.clone(),
        );
        token.cancel();
        let v = scanner.scan("http://example.com").await;
        assert_eq!(v.risk_level, RiskLevel::Unknown);
        assert!(v.is_safe);
    }

    #[test]
    fn report_url_points_at_task() {
        let report = ScanReport {
            score: Some(90),
            categories: vec![],
            task_id: Some("abc".to_string()),
        };
        let v = classify_report("http://x.com", &report);
        assert_eq!(v.report_url.as_deref(), Some("https://urlscan.io/result/abc"));
    }

    #[test]
    fn extract_urls_preserves_order_and_duplicates() {
        let urls = extract_urls("see http://a.com then https://b.com/path?q=1 and http://a.com");
        assert_eq!(
            urls,
            vec!["http://a.com", "https://b.com/path?q=1", "http://a.com"]
        );
    }

    #[test]
    fn extract_urls_is_idempotent() {
        let text = "Check http://example.com/a_b.html and HTTPS://CAPS.example.org:8080/x#frag";
        let first = extract_urls(text);
        let rejoined = first.join(" ");
        assert_eq!(extract_urls(&rejoined), first);
    }

    #[test]
    fn extract_urls_empty_on_plain_text() {
        assert!(extract_urls("no links here").is_empty());
    }
}
