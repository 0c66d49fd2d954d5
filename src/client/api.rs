//! Wire types for the model catalog and content generation endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const GENERATE_CONTENT: &str = "generateContent";
pub const CATALOG_PAGE_SIZE: u32 = 1000;
const PROBE_TEXT: &str = "Hi";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<RemoteModel>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One catalog entry as the API reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteModel {
    /// Format: `models/gemini-2.5-pro`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_token_limit: Option<u64>,
    #[serde(default)]
    pub output_token_limit: Option<u64>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl RemoteModel {
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig { max_output_tokens },
        }
    }

    /// Smallest request that proves a model accepts generation calls.
    pub fn probe() -> Self {
        Self::new(PROBE_TEXT, 1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Build a crate error from a non-success HTTP response.
///
/// `retry_after_header` is the raw `Retry-After` value, if any. A
/// `RetryInfo.retryDelay` in the error details is used when the header is
/// absent.
pub fn error_from_response(status: u16, retry_after_header: Option<&str>, body: &str) -> Error {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let message = match envelope {
        Some(ref e) if !e.error.message.is_empty() => e.error.message.clone(),
        _ if body.trim().is_empty() => format!("HTTP {}", status),
        _ => body.trim().to_string(),
    };
    let api_status = envelope.as_ref().and_then(|e| e.error.status.clone());

    if status == 429 {
        let retry_after = retry_after_header.and_then(parse_retry_after).or_else(|| {
            envelope
                .as_ref()
                .and_then(|e| retry_delay_from_details(&e.error.details))
        });
        return Error::RateLimit {
            message,
            retry_after,
        };
    }

    Error::Api {
        message,
        status: Some(status),
        api_status,
    }
}

/// Ceiling for server-provided retry hints.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(24 * 60 * 60);

fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds).min(MAX_RETRY_HINT))
}

fn retry_delay_from_details(details: &[serde_json::Value]) -> Option<Duration> {
    details.iter().find_map(|detail| {
        let is_retry_info = detail
            .get("@type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t.ends_with("RetryInfo"));
        if !is_retry_info {
            return None;
        }
        let delay = detail.get("retryDelay")?.as_str()?;
        let seconds: f64 = delay.trim_end_matches('s').parse().ok()?;
        if seconds.is_nan() || seconds < 0.0 {
            return None;
        }
        let delay = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_HINT);
        Some(delay.min(MAX_RETRY_HINT))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_probe_body_shape() {
        let json = serde_json::to_value(GenerateRequest::probe()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "Hi"}]}],
                "generationConfig": {"maxOutputTokens": 1}
            })
        );
    }

    #[test]
    fn test_catalog_parsing() {
        let body = r#"{
            "models": [
                {"name": "models/gemini-2.5-flash", "displayName": "Gemini 2.5 Flash",
                 "inputTokenLimit": 1048576, "outputTokenLimit": 65536,
                 "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/text-embedding-004",
                 "supportedGenerationMethods": ["embedContent"]}
            ],
            "nextPageToken": "abc"
        }"#;
        let page: ListModelsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.models.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        assert_eq!(page.models[0].id(), "gemini-2.5-flash");
        assert!(page.models[0].supports_generation());
        assert!(!page.models[1].supports_generation());
    }

    #[test]
    fn test_response_text() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]},"finishReason":"STOP"}],"modelVersion":"gemini-2.5-flash"}"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "Hello");
        assert_eq!(GenerateResponse::default().text(), "");
    }

    #[test]
    fn test_error_envelope() {
        let body = r#"{"error":{"code":403,"message":"Permission denied on resource","status":"PERMISSION_DENIED"}}"#;
        let err = error_from_response(403, None, body);
        match &err {
            Error::Api {
                message,
                status,
                api_status,
            } => {
                assert_eq!(message, "Permission denied on resource");
                assert_eq!(*status, Some(403));
                assert_eq!(api_status.as_deref(), Some("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_rate_limit_retry_hints() {
        let err = error_from_response(429, Some("7"), "");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED",
            "details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"12s"}]}}"#;
        let err = error_from_response(429, None, body);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let body = r#"{"error":{"message":"You exceeded your current quota"}}"#;
        assert_eq!(error_from_response(429, None, body).kind(), ErrorKind::QuotaExhausted);
    }

    #[test]
    fn test_oversized_retry_hints_are_capped() {
        let err = error_from_response(429, Some("18446744073709551615"), "");
        assert_eq!(err.retry_after(), Some(MAX_RETRY_HINT));

        for delay in ["1e30s", "infs", "NaNs", "-3s"] {
            let body = format!(
                r#"{{"error":{{"message":"slow down","details":[{{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"{delay}"}}]}}}}"#
            );
            let hint = error_from_response(429, None, &body).retry_after();
            match delay {
                "1e30s" | "infs" => assert_eq!(hint, Some(MAX_RETRY_HINT)),
                _ => assert_eq!(hint, None),
            }
        }
    }
}
