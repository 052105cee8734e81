pub mod ollama;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;

use crate::error::RelayError;
use crate::models::relay::GenerationRequest;

/// Raw body chunks from the model server, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            timeout: None,
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Single-shot generation; the whole answer arrives in one response.
    async fn complete(
        &self,
        model: &str,
        prompt: &str
    ) -> Result<CompletionResponse, RelayError>;

    /// Starts a streaming generation and hands back the undecoded body.
    async fn stream_chunks(
        &self,
        request: &GenerationRequest
    ) -> Result<ChunkStream, RelayError>;

    fn get_base_url(&self) -> String;
}
