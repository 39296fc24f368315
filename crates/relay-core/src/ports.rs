use async_trait::async_trait;

use crate::Result;

/// Parameters for one completion call.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Hexagonal port for the hosted language-model service.
///
/// Implementations report retryable failures as `Error::Timeout` /
/// `Error::Unavailable` so the retry decorator can tell them apart.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Speech to text for an OGG/Opus voice note.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String>;

    async fn complete(&self, req: CompletionRequest) -> Result<String>;
}

/// Hexagonal port for fetching files hosted by the chat transport.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}
