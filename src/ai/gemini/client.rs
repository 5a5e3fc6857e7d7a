use super::types::{error_message_from_body, GenerateContentRequest};
use crate::ai::{ByteStream, StreamingService};
use crate::models::{Config, DEFAULT_BASE_URL};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

/// Gemini REST client for the SSE flavour of `streamGenerateContent`.
pub struct GeminiStreamClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiStreamClient {
    /// Build a client whose connect and read deadlines come from `config`.
    ///
    /// No total request timeout is set; a multi-image answer can keep the
    /// stream open for several minutes.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        Ok(Self::new_with_client(
            config.api_key.clone(),
            config.model.clone(),
            client,
        )
        .with_base_url(config.base_url.clone()))
    }

    /// `model` may be given with or without the `models/` prefix.
    pub fn new_with_client(api_key: String, model: String, client: Client) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl StreamingService for GeminiStreamClient {
    async fn stream_generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ByteStream> {
        tracing::debug!(
            "Sending streamGenerateContent request with {} turn(s) to {}",
            request.contents.len(),
            self.model
        );

        let response = self
            .client
            .post(self.stream_url())
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                Error::from_transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message_from_body(status.as_u16(), &error_text),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from_transport));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::types::Part;
    use crate::models::{GenerationConfig, Role, SafetySetting, Turn};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

    fn make_client(server: &MockServer, model: &str) -> GeminiStreamClient {
        GeminiStreamClient::new_with_client("test-key".to_string(), model.to_string(), Client::new())
            .with_base_url(server.uri())
    }

    fn request(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Turn::new(Role::User, vec![Part::text(prompt)])],
            generation_config: GenerationConfig::default(),
            safety_settings: vec![SafetySetting::new(
                "HARM_CATEGORY_HARASSMENT",
                "BLOCK_NONE",
            )],
        }
    }

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        body
    }

    #[tokio::test]
    async fn test_stream_posts_sse_request_and_returns_body() {
        let server = MockServer::start().await;
        let sse = "data: {\"candidates\":[]}\n\ndata: [DONE]\n";

        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{}:streamGenerateContent",
                DEFAULT_MODEL
            )))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }],
                "generationConfig": { "topK": 40, "responseModalities": ["TEXT", "IMAGE"] },
                "safety_settings": [{ "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE" }]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, DEFAULT_MODEL);
        let stream = client
            .stream_generate_content(&request("hello"))
            .await
            .unwrap();

        assert_eq!(collect(stream).await, sse.as_bytes());
    }

    #[test]
    fn test_default_and_trimmed_base_url() {
        let client = GeminiStreamClient::new_with_client(
            "key".to_string(),
            "gemini-pro".to_string(),
            Client::new(),
        );
        assert_eq!(
            client.stream_url(),
            format!("{}/v1beta/models/gemini-pro:streamGenerateContent", DEFAULT_BASE_URL)
        );

        let client = client.with_base_url("http://localhost:8080/".to_string());
        assert_eq!(
            client.stream_url(),
            "http://localhost:8080/v1beta/models/gemini-pro:streamGenerateContent"
        );
    }

    #[tokio::test]
    async fn test_strips_models_prefix_from_model_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, "models/gemini-pro");
        assert_eq!(client.model(), "gemini-pro");
        client.stream_generate_content(&request("x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_extracts_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "rate limited", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let client = make_client(&server, DEFAULT_MODEL);
        let err = client
            .stream_generate_content(&request("x"))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::Api { status: 429, .. }));
        assert_eq!(err.to_string(), "rate limited");
    }

    #[tokio::test]
    async fn test_error_status_without_json_body_uses_generic_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = make_client(&server, DEFAULT_MODEL);
        let err = client
            .stream_generate_content(&request("x"))
            .await
            .err()
            .unwrap();

        assert_eq!(err.to_string(), "HTTP status 502");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = GeminiStreamClient::new_with_client(
            "k".to_string(),
            DEFAULT_MODEL.to_string(),
            Client::new(),
        )
        .with_base_url("http://127.0.0.1:1".to_string());
        let err = client
            .stream_generate_content(&request("x"))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::Transport(_)));
    }
}
