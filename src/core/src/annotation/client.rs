use std::env;

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};

use super::prompts::threat_prompt;
use super::types::{AnnotationRequest, Annotator};
use crate::configuration::AnnotationSettings;
use crate::error_handling::types::AnnotationError;

/// Client of the Generative Language `generateContent` REST endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new<E, M, K>(endpoint: E, model: M, api_key: K) -> Result<Self, AnnotationError>
    where
        E: Into<String>,
        M: Into<String>,
        K: Into<String>,
    {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AnnotationError::MissingApiKey);
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    /// Builds a client from configuration, reading the key from the
    /// environment variable named by `api_key_env`.
    pub fn from_settings(settings: &AnnotationSettings) -> Result<Self, AnnotationError> {
        let api_key = env::var(&settings.api_key_env).map_err(|_| AnnotationError::MissingApiKey)?;
        let client = Self::new(&settings.endpoint, &settings.model, api_key)?;
        info!("Annotation client ready (model {})", client.model);
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate_content(&self, prompt: &str) -> Result<String, AnnotationError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        debug!("POST {} ({} prompt bytes)", self.url(), prompt.len());

        let response = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnnotationError::BadStatus(status.as_u16()));
        }
        let payload: Value = response.json().await?;
        extract_text(&payload)
    }
}

#[async_trait]
impl Annotator for GeminiClient {
    async fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError> {
        self.generate_content(&threat_prompt(request)).await
    }

    async fn generate(&self, prompt: &str) -> Result<String, AnnotationError> {
        self.generate_content(prompt).await
    }
}

/// Stand-in used when no API key is configured: every call fails, so
/// selections end in the `Failed` state instead of hanging.
pub struct DisabledAnnotator;

#[async_trait]
impl Annotator for DisabledAnnotator {
    async fn annotate(&self, _request: &AnnotationRequest) -> Result<String, AnnotationError> {
        Err(AnnotationError::MissingApiKey)
    }

    async fn generate(&self, _prompt: &str) -> Result<String, AnnotationError> {
        Err(AnnotationError::MissingApiKey)
    }
}

/// Concatenates the text parts of the first candidate.
pub(crate) fn extract_text(payload: &Value) -> Result<String, AnnotationError> {
    let text: String = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(AnnotationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn extracts_and_joins_text_parts() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Benign " }, { "text": "handshake." }] }
            }]
        });
        assert_eq!(extract_text(&payload).unwrap(), "Benign handshake.");
    }

    #[test]
    fn missing_or_blank_text_is_empty_response() {
        let no_candidates = json!({ "candidates": [] });
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(extract_text(&no_candidates), Err(AnnotationError::EmptyResponse)));
        assert!(matches!(extract_text(&blank), Err(AnnotationError::EmptyResponse)));
    }

    #[test]
    fn blank_key_is_rejected() {
        let result = GeminiClient::new("https://example.invalid/v1beta", "m", " ");
        assert!(matches!(result, Err(AnnotationError::MissingApiKey)));
    }

    #[test]
    fn url_strips_trailing_slash() {
        let client = GeminiClient::new("https://example.invalid/v1beta/", "gemini-x", "k").unwrap();
        assert_eq!(
            client.url(),
            "https://example.invalid/v1beta/models/gemini-x:generateContent"
        );
    }

    #[test]
    #[serial]
    fn from_settings_reads_key_from_environment() {
        let settings = AnnotationSettings {
            api_key_env: "RAMPART_TEST_API_KEY".to_string(),
            ..Default::default()
        };

        env::remove_var("RAMPART_TEST_API_KEY");
        assert!(matches!(
            GeminiClient::from_settings(&settings),
            Err(AnnotationError::MissingApiKey)
        ));

        env::set_var("RAMPART_TEST_API_KEY", "secret");
        let client = GeminiClient::from_settings(&settings).unwrap();
        assert_eq!(client.model(), "gemini-3-flash-preview");
        env::remove_var("RAMPART_TEST_API_KEY");
    }

    #[tokio::test]
    async fn disabled_annotator_always_reports_missing_key() {
        let request = AnnotationRequest::new("x", "y", Default::default());
        assert!(matches!(
            DisabledAnnotator.annotate(&request).await,
            Err(AnnotationError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_http_error() {
        let client = GeminiClient::new("http://127.0.0.1:9/v1beta", "m", "k").unwrap();
        let request = AnnotationRequest::new("x", "y", Default::default());
        assert!(matches!(
            client.annotate(&request).await,
            Err(AnnotationError::HttpError(_))
        ));
    }
}
