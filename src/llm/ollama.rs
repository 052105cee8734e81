use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, error };
use reqwest::{ Client as HttpClient, Response };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ ChatClient, ChunkStream, CompletionResponse, LlmConfig };
use crate::error::RelayError;
use crate::models::relay::GenerationRequest;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());
        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| format!("Failed to build Ollama HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_generate(
        &self,
        model: &str,
        prompt: &str,
        stream: bool
    ) -> Result<Response, RelayError> {
        let url = format!("{}/api/generate", self.base_url);
        let req = GenerateRequest { model, prompt, stream };
        debug!("POST {} (model: {}, stream: {})", url, model, stream);

        let resp = self.http.post(&url).json(&req).send().await.map_err(|e| {
            error!("Failed to reach Ollama at {}: {}", url, e);
            RelayError::from_upstream(e)
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        error!("Ollama returned {} for model '{}': {}", status, model, message);
        Err(RelayError::Upstream(format!("HTTP {}: {}", status, message)))
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str
    ) -> Result<CompletionResponse, RelayError> {
        let resp = self.post_generate(model, prompt, false).await?;
        let data = resp.json::<CompletionResponse>().await.map_err(RelayError::from_upstream)?;
        Ok(data)
    }

    async fn stream_chunks(
        &self,
        request: &GenerationRequest
    ) -> Result<ChunkStream, RelayError> {
        let resp = self.post_generate(&request.model, &request.prompt, true).await?;
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::Upstream(e.to_string())));
        Ok(Box::pin(stream))
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = OllamaClient::new(Some("http://localhost:11434/".into()));
        assert_eq!(client.get_base_url(), "http://localhost:11434");
    }

    #[test]
    fn default_base_url() {
        let client = OllamaClient::new(None);
        assert_eq!(client.get_base_url(), "http://localhost:11434");
    }

    #[test]
    fn from_config_applies_base_url() {
        let config = LlmConfig { base_url: "http://gpu-box:11434/".into(), timeout: None };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.get_base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn from_config_with_timeout_builds() {
        let config = LlmConfig {
            base_url: "http://localhost:11434".into(),
            timeout: Some(Duration::from_secs(5)),
        };
        let client: Result<OllamaClient, Box<dyn StdError + Send + Sync>> = OllamaClient::from_config(&config);
        assert!(client.is_ok());
    }
}
