use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::state::ReferenceImage;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

pub const NO_IMAGE_MESSAGE: &str =
    "The API response did not contain an image. This might be due to the safety policy.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API Key is not set. Please configure it first.")]
    MissingCredential,
    #[error("Your API key is not valid. Please check it and try again. ({0})")]
    InvalidCredential(String),
    #[error("{}{}", NO_IMAGE_MESSAGE, reason_suffix(.reason))]
    NoImage { reason: Option<String> },
    #[error("Gemini request failed with status {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("Gemini request failed: {0}")]
    Transport(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(" (reason: {reason})"))
        .unwrap_or_default()
}

impl GenerationError {
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, GenerationError::InvalidCredential(_))
    }
}

/// An image returned inline by the API, still base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        credential: &str,
        instruction: &str,
        references: &[ReferenceImage],
    ) -> Result<InlineImage, GenerationError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

fn redact_credential(text: &str, credential: &str) -> String {
    let key = credential.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                        json!({ "text": truncate_for_log(text, 200) })
                    } else if let Some(inline_data) = part.get("inlineData") {
                        let mime_type = inline_data
                            .get("mimeType")
                            .and_then(|value| value.as_str())
                            .unwrap_or("unknown");
                        let data_len = inline_data
                            .get("data")
                            .and_then(|value| value.as_str())
                            .map(|value| value.len())
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut summary = Map::new();
    summary.insert("parts".to_string(), Value::Array(parts));
    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }
    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
                GeminiPart::Other(_) => {}
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "blockReason": response.prompt_feedback.as_ref().and_then(|feedback| feedback.block_reason.clone()),
    })
}

/// Extracts the error message and, when present, the machine reason
/// (`error.details[].reason`) from an API error body.
fn summarize_error_body(body: &str) -> (Option<String>, Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        let reason = value
            .pointer("/error/details")
            .and_then(|v| v.as_array())
            .and_then(|details| {
                details
                    .iter()
                    .find_map(|detail| detail.get("reason").and_then(|v| v.as_str()))
            })
            .map(|v| v.to_string());
        return (message, reason, truncate_for_log(&value.to_string(), 2000));
    }

    (None, None, truncate_for_log(trimmed, 2000))
}

fn is_invalid_credential(status: StatusCode, message: Option<&str>, reason: Option<&str>) -> bool {
    let auth_status = status == StatusCode::BAD_REQUEST
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN;
    auth_status
        && (reason == Some("API_KEY_INVALID")
            || message.is_some_and(|message| message.contains("API key not valid")))
}

fn build_image_parts(instruction: &str, references: &[ReferenceImage]) -> Vec<Value> {
    let mut parts: Vec<Value> = references
        .iter()
        .map(|image| {
            json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data
                }
            })
        })
        .collect();
    parts.push(json!({ "text": instruction }));
    parts
}

fn build_generation_payload(instruction: &str, references: &[ReferenceImage]) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": build_image_parts(instruction, references) }],
        "generationConfig": {
            "responseModalities": ["IMAGE"]
        },
    })
}

fn extract_first_image(response: GeminiResponse) -> Result<InlineImage, GenerationError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let mut candidates = response.candidates.unwrap_or_default().into_iter();
    let Some(candidate) = candidates.next() else {
        return Err(GenerationError::NoImage {
            reason: block_reason,
        });
    };

    let finish_reason = candidate.finish_reason;
    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();
    for part in parts {
        if let GeminiPart::InlineData { inline_data } = part {
            return Ok(InlineImage {
                data: inline_data.data,
                mime_type: inline_data.mime_type,
            });
        }
    }

    Err(GenerationError::NoImage {
        reason: block_reason.or(finish_reason.filter(|reason| reason != "STOP")),
    })
}

fn is_malformed_credential(credential: &str) -> bool {
    !credential.bytes().all(|byte| byte.is_ascii_graphic())
}

#[derive(Debug, Clone)]
pub struct GeminiImageClient {
    api_base: String,
    model: String,
    timeout: Duration,
}

impl GeminiImageClient {
    pub fn new(api_base: &str, model: &str, timeout: Duration) -> Self {
        GeminiImageClient {
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        GeminiImageClient::new(
            &config.gemini_api_base,
            &config.gemini_image_model,
            config.gemini_request_timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_gemini_api(
        &self,
        credential: &str,
        payload: Value,
    ) -> Result<GeminiResponse, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = %self.model, payload = %payload_summary);
        }

        let response = match get_http_client()
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", credential)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_credential(&err.to_string(), credential);
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                return Err(GenerationError::Transport(err_text));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, reason, body_summary) = summarize_error_body(&body);
            warn!(
                "Gemini API error: status={}, body={}",
                status,
                redact_credential(&body_summary, credential)
            );
            if is_invalid_credential(status, message.as_deref(), reason.as_deref()) {
                return Err(GenerationError::InvalidCredential(
                    message.unwrap_or_else(|| "API key not valid".to_string()),
                ));
            }
            let detail = redact_credential(&message.unwrap_or(body_summary), credential);
            return Err(GenerationError::Api {
                status,
                message: detail,
            });
        }

        let value = response.json::<GeminiResponse>().await.map_err(|err| {
            GenerationError::Transport(redact_credential(&err.to_string(), credential))
        })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.model, response = %response_summary);
        }
        Ok(value)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate(
        &self,
        credential: &str,
        instruction: &str,
        references: &[ReferenceImage],
    ) -> Result<InlineImage, GenerationError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        if is_malformed_credential(credential) {
            return Err(GenerationError::InvalidCredential(
                "API key contains characters that cannot be sent".to_string(),
            ));
        }

        let payload = build_generation_payload(instruction, references);
        let metadata = json!({ "referenceImages": references.len() });

        log_llm_timing("gemini", &self.model, "generate_image", Some(metadata), || async {
            let response = self.call_gemini_api(credential, payload).await?;
            extract_first_image(response)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const MODEL: &str = "gemini-2.5-flash-image";

    fn reference(id: &str) -> ReferenceImage {
        ReferenceImage {
            id: id.to_string(),
            data: "iVBORw0KGgo=".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    fn client_for(server: &mockito::Server) -> GeminiImageClient {
        GeminiImageClient::new(&server.url(), MODEL, Duration::from_secs(5))
    }

    fn endpoint() -> String {
        format!("/models/{MODEL}:generateContent")
    }

    #[tokio::test]
    async fn returns_first_inline_image_and_sends_image_only_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", endpoint().as_str())
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                        { "text": "draw kael92" }
                    ]
                }],
                "generationConfig": { "responseModalities": ["IMAGE"] }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": { "parts": [
                            { "text": "here you go" },
                            { "thoughtSignature": "c2ln" },
                            { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                            { "inlineData": { "mimeType": "image/png", "data": "BBBB" } }
                        ]},
                        "finishReason": "STOP"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let image = client_for(&server)
            .generate("test-key", "draw kael92", &[reference("a")])
            .await
            .unwrap();

        assert_eq!(
            image,
            InlineImage {
                data: "AAAA".to_string(),
                mime_type: "image/png".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn response_without_image_is_a_safety_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", endpoint().as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "I can't help with that." }] },
                        "finishReason": "IMAGE_SAFETY"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .generate("test-key", "x", &[reference("a")])
            .await
            .unwrap_err();

        match &err {
            GenerationError::NoImage { reason } => {
                assert_eq!(reason.as_deref(), Some("IMAGE_SAFETY"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with(NO_IMAGE_MESSAGE));
    }

    #[tokio::test]
    async fn blocked_prompt_without_candidates_reports_block_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", endpoint().as_str())
            .with_status(200)
            .with_body(json!({ "promptFeedback": { "blockReason": "SAFETY" } }).to_string())
            .create_async()
            .await;

        let err = client_for(&server)
            .generate("test-key", "x", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoImage { reason: Some(ref r) } if r == "SAFETY"));
    }

    #[tokio::test]
    async fn invalid_key_is_reported_as_credential_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", endpoint().as_str())
            .with_status(400)
            .with_body(
                json!({
                    "error": {
                        "code": 400,
                        "message": "API key not valid. Please pass a valid API key.",
                        "status": "INVALID_ARGUMENT",
                        "details": [{ "reason": "API_KEY_INVALID" }]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .generate("bad-key", "x", &[reference("a")])
            .await
            .unwrap_err();
        assert!(err.is_credential_rejection());
    }

    #[tokio::test]
    async fn server_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", endpoint().as_str())
            .with_status(503)
            .with_body(json!({ "error": { "message": "overloaded" } }).to_string())
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .generate("test-key", "x", &[reference("a")])
            .await
            .unwrap_err();
        match err {
            GenerationError::Api { status, message } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blank_credential_fails_without_a_request() {
        let client = GeminiImageClient::new("http://127.0.0.1:9", MODEL, Duration::from_secs(1));
        let err = client.generate("   ", "x", &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential));

        let err = client.generate("bad key", "x", &[]).await.unwrap_err();
        assert!(err.is_credential_rejection());
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error_without_the_key() {
        let client = GeminiImageClient::new("http://127.0.0.1:9", MODEL, Duration::from_secs(2));
        let err = client
            .generate("AIzaSecretKey123", "x", &[reference("a")])
            .await
            .unwrap_err();

        match &err {
            GenerationError::Transport(message) => {
                assert!(!message.contains("AIzaSecretKey123"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.to_string().contains("AIzaSecretKey123"));
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", endpoint().as_str())
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server)
            .generate("test-key", "x", &[reference("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert!(!err.to_string().contains("test-key"));
    }

    #[test]
    fn credential_is_redacted_from_error_text() {
        assert_eq!(
            redact_credential("https://host/?key=abc123 failed", "abc123"),
            "https://host/?key=[redacted] failed"
        );
    }

    #[test]
    fn forbidden_without_key_message_is_not_a_credential_rejection() {
        assert!(!is_invalid_credential(
            StatusCode::FORBIDDEN,
            Some("Permission denied on resource project"),
            None
        ));
        assert!(is_invalid_credential(
            StatusCode::BAD_REQUEST,
            None,
            Some("API_KEY_INVALID")
        ));
    }
}
