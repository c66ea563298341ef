use crate::error::InferenceError;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Completion through an Ollama instance (`POST /api/generate`, non-streaming).
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, InferenceError> {
        let endpoint = Url::parse(base_url)?.join("api/generate")?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        non_empty(parsed)
    }
}

fn non_empty(parsed: GenerateResponse) -> Result<String, InferenceError> {
    let text = parsed.response.trim();
    if text.is_empty() {
        return Err(InferenceError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_text_is_trimmed() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3.2","response":"  Olá!\n","done":true}"#)
                .unwrap();
        assert_eq!(non_empty(parsed).unwrap(), "Olá!");
    }

    #[test]
    fn blank_generation_is_an_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(matches!(non_empty(parsed), Err(InferenceError::EmptyResponse)));
    }
}
