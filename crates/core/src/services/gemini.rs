use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::generation::{ChatMessage, ChatRole, Generator};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
pub const EMBEDDING_001_DIMENSIONS: usize = 768;

const BACKEND: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.4,
        }
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn method_url(base_url: &str, model: &str, method: &str) -> Result<Url, ServiceError> {
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(&format!("{}:{method}", model_path(model)))?)
}

async fn post_json(
    client: &Client,
    endpoint: Url,
    api_key: &str,
    body: &Value,
) -> Result<Value, ServiceError> {
    let response = client
        .post(endpoint)
        .header("x-goog-api-key", api_key)
        .json(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let details = response.text().await.unwrap_or_default();
        return Err(ServiceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {}", details.trim()),
        });
    }

    Ok(response.json().await?)
}

pub struct GeminiEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(config: &GeminiConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::new(),
            endpoint: method_url(&config.base_url, &config.embedding_model, "embedContent")?,
            model: model_path(&config.embedding_model),
            api_key: config.api_key.clone(),
            dimensions: EMBEDDING_001_DIMENSIONS,
        })
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let body = json!({
            "model": self.model,
            "content": { "parts": [{ "text": text }] },
        });
        let parsed = post_json(&self.client, self.endpoint.clone(), &self.api_key, &body).await?;
        parse_embedding(&parsed)
    }
}

pub struct GeminiGenerator {
    client: Client,
    endpoint: Url,
    api_key: String,
    temperature: f32,
}

impl GeminiGenerator {
    pub fn new(config: &GeminiConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::new(),
            endpoint: method_url(&config.base_url, &config.chat_model, "generateContent")?,
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let body = generation_payload(messages, self.temperature);
        let parsed = post_json(&self.client, self.endpoint.clone(), &self.api_key, &body).await?;
        parse_generation(&parsed)
    }
}

/// System messages become the system instruction; the rest become turns.
fn generation_payload(messages: &[ChatMessage], temperature: f32) -> Value {
    let system = messages
        .iter()
        .filter(|message| message.role == ChatRole::System)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let contents = messages
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                ChatRole::System => return None,
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            Some(json!({ "role": role, "parts": [{ "text": message.content }] }))
        })
        .collect::<Vec<_>>();

    let mut payload = json!({
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    });
    if !system.is_empty() {
        payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    payload
}

fn parse_embedding(payload: &Value) -> Result<Vec<f32>, ServiceError> {
    let values = payload
        .pointer("/embedding/values")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "response has no embedding values".to_string(),
        })?;

    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| ServiceError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: format!("non-numeric embedding value: {value}"),
                })
        })
        .collect()
}

fn parse_generation(payload: &Value) -> Result<String, ServiceError> {
    let text = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .map(|reason| format!("{BACKEND} (blocked: {reason})"))
            .unwrap_or_else(|| BACKEND.to_string());
        return Err(ServiceError::EmptyResponse(reason));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_urls_accept_bare_and_prefixed_models() {
        let url = method_url(DEFAULT_BASE_URL, "gemini-2.0-flash", "generateContent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let url = method_url(
            "https://generativelanguage.googleapis.com/v1beta",
            "models/embedding-001",
            "embedContent",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent"
        );
    }

    #[test]
    fn embedder_reports_the_configured_dimensions() {
        let config = GeminiConfig::new("test-key");
        let embedder = GeminiEmbedder::new(&config).unwrap();
        assert_eq!(embedder.dimensions(), EMBEDDING_001_DIMENSIONS);

        let embedder = GeminiEmbedder::new(&config).unwrap().with_dimensions(3072);
        assert_eq!(embedder.dimensions(), 3072);
    }

    #[test]
    fn payload_splits_system_instruction_from_turns() {
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there"),
            ChatMessage::user("What is RAG?"),
        ];

        let payload = generation_payload(&messages, 0.4);

        assert_eq!(
            payload.pointer("/systemInstruction/parts/0/text").and_then(Value::as_str),
            Some("You are a helpful assistant.")
        );
        let contents = payload["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "What is RAG?");
    }

    #[test]
    fn payload_without_system_messages_has_no_instruction() {
        let payload = generation_payload(&[ChatMessage::user("Hello")], 0.0);
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn embedding_values_are_parsed() {
        let payload = json!({ "embedding": { "values": [0.25, -1.0, 0.5] } });
        assert_eq!(parse_embedding(&payload).unwrap(), vec![0.25, -1.0, 0.5]);
    }

    #[test]
    fn missing_embedding_is_a_backend_error() {
        let payload = json!({ "error": { "message": "quota" } });
        assert!(matches!(
            parse_embedding(&payload),
            Err(ServiceError::BackendResponse { .. })
        ));
    }

    #[test]
    fn generation_text_parts_are_joined() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "A fox" }, { "text": " is mentioned." }] } }]
        });
        assert_eq!(parse_generation(&payload).unwrap(), "A fox is mentioned.");
    }

    #[test]
    fn blocked_generation_is_an_empty_response() {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let error = parse_generation(&payload).unwrap_err();
        assert!(error.to_string().contains("SAFETY"));
    }
}
