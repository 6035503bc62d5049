//! urlscan.io adapter.
//!
//! Implements the `ScanService` port: submit-then-fetch against the
//! urlscan.io REST API. A missing API key is a configuration degradation:
//! calls error out here and the scanner upstream fails open.

use async_trait::async_trait;

use mrb_core::{
    errors::Error,
    scanner::{ScanReport, ScanService},
    Result,
};

const DEFAULT_BASE_URL: &str = "https://urlscan.io/api/v1";

#[derive(Clone, Debug)]
pub struct UrlscanClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl UrlscanClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("reqwest client build");
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Config("URLSCAN_API_KEY not configured".to_string()))
    }
}

#[async_trait]
impl ScanService for UrlscanClient {
    async fn submit(&self, url: &str) -> Result<String> {
        let key = self.key()?;

        let resp = self
            .http
            .post(format!("{}/scan/", self.base_url))
            .header("API-Key", key)
            .json(&serde_json::json!({
                "url": url,
                "visibility": "private",
            }))
            .send()
            .await
            .map_err(|e| Error::External(format!("urlscan submit error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "urlscan submit failed: {}",
                resp.status()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("urlscan submit json error: {e}")))?;

        v.get("uuid")
            .and_then(|u| u.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::External("urlscan submit response missing uuid".to_string()))
    }

    async fn fetch_result(&self, scan_id: &str) -> Result<ScanReport> {
        let key = self.key()?;

        let resp = self
            .http
            .get(format!("{}/result/{scan_id}/", self.base_url))
            .header("API-Key", key)
            .send()
            .await
            .map_err(|e| Error::External(format!("urlscan result error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "urlscan result not available: {}",
                resp.status()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("urlscan result json error: {e}")))?;

        Ok(parse_report(&v))
    }
}

fn parse_report(v: &serde_json::Value) -> ScanReport {
    let overall = &v["verdicts"]["overall"];

    ScanReport {
        score: overall.get("score").and_then(|s| s.as_i64()),
        categories: overall
            .get("categories")
            .and_then(|c| c.as_array())
            .map(|xs| {
                xs.iter()
                    .filter_map(|x| x.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        task_id: v["task"]["uuid"].as_str().map(|s| s.to_string()),
    }
}
