//! Gemini adapter: AI responder and remote moderation classifier.
//!
//! Both ports are infallible by contract. The responder degrades to a
//! fixed apology, the classifier to a fail-open "unavailable" verdict, so
//! a Gemini outage (or a missing API key) never blocks message handling.

use async_trait::async_trait;

use mrb_core::{
    errors::Error,
    moderation::{ClassifierVerdict, TextClassifier},
    responder::Responder,
    Result,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-1.5-flash";

const APOLOGY: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again.";

#[derive(Clone, Debug)]
pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
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

    async fn generate(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not configured".to_string()))?;

        let url = format!(
            "{}/models/{MODEL}:generateContent?key={key}",
            self.base_url
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("gemini request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "gemini call failed: {}",
                resp.status()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("gemini json error: {e}")))?;

        let text = v["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();

        if text.trim().is_empty() {
            return Err(Error::External("gemini returned empty text".to_string()));
        }

        Ok(text)
    }
}

#[async_trait]
impl Responder for GeminiClient {
    async fn respond(&self, prompt: &str, context: Option<&str>) -> String {
        let full_prompt = match context {
            Some(ctx) => {
                format!("Context: {ctx}\n\nUser: {prompt}\n\nPlease provide a helpful response:")
            }
            None => prompt.to_string(),
        };

        match self.generate(&full_prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "gemini response failed");
                APOLOGY.to_string()
            }
        }
    }
}

#[async_trait]
impl TextClassifier for GeminiClient {
    async fn classify(&self, text: &str) -> ClassifierVerdict {
        let prompt = moderation_prompt(text);

        match self.generate(&prompt).await {
            Ok(reply) => parse_classifier_reply(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "gemini moderation failed; failing open");
                ClassifierVerdict::unavailable()
            }
        }
    }
}

fn moderation_prompt(text: &str) -> String {
    format!(
        r#"Analyze this content for:
1. Adult/explicit content
2. Hate speech or harassment
3. Copyright violations (obvious copied content)
4. Spam or promotional content
5. Harmful or dangerous content

Content: "{text}"

Respond with ONLY a JSON object, no prose:
{{"is_safe": true or false, "reason": "short explanation"}}"#
    )
}

/// Parse the structured verdict, requiring an explicit `is_safe` boolean;
/// anything unparseable fails open.
fn parse_classifier_reply(reply: &str) -> ClassifierVerdict {
    let json_text = strip_code_fence(reply);

    let Ok(v) = serde_json::from_str::<serde_json::Value>(json_text) else {
        return ClassifierVerdict::unavailable();
    };
    let Some(is_safe) = v.get("is_safe").and_then(|b| b.as_bool()) else {
        return ClassifierVerdict::unavailable();
    };

    let reason = v
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("no reason given")
        .to_string();

    if is_safe {
        ClassifierVerdict::safe(reason)
    } else {
        ClassifierVerdict::flagged(reason)
    }
}

/// Models often wrap JSON answers in ```json fences; peel them off.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
