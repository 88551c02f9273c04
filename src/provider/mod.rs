pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::config::{ProviderConfig, Vendor};
use crate::error::ProviderError;
use crate::stream::StreamChunk;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation being sent upstream.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A tool the model may invoke, described by JSON Schema.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A provider-agnostic streaming chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDef>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A configured upstream provider, ready to issue streaming requests.
pub enum Provider {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Gemini(GeminiProvider),
}

impl Provider {
    /// Construct the vendor-specific variant for a provider config entry.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] when the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        match config.vendor {
            Vendor::OpenAi => Ok(Provider::OpenAi(OpenAiProvider::from_config(config)?)),
            Vendor::Anthropic => Ok(Provider::Anthropic(AnthropicProvider::from_config(config)?)),
            Vendor::Gemini => Ok(Provider::Gemini(GeminiProvider::from_config(config)?)),
        }
    }

    /// Issue a streaming chat request and return the normalized chunk
    /// receiver. The decode loop runs on its own task and owns the
    /// response body until the stream terminates.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] on request failure and
    /// [`ProviderError::Upstream`] when the upstream rejects the request.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        match self {
            Provider::OpenAi(provider) => provider.chat_stream(request, cancel).await,
            Provider::Anthropic(provider) => provider.chat_stream(request, cancel).await,
            Provider::Gemini(provider) => provider.chat_stream(request, cancel).await,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAi(provider) => provider.model(),
            Provider::Anthropic(provider) => provider.model(),
            Provider::Gemini(provider) => provider.model(),
        }
    }
}

/// Read the provider's API key from its configured environment variable,
/// falling back to the vendor's conventional one. A missing variable is
/// not an error here: the request simply goes out unauthenticated and the
/// upstream rejects it.
pub(crate) fn resolve_api_key(config: &ProviderConfig, default_env: &str) -> String {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(var).unwrap_or_default()
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().build()?)
}

/// Send the prepared request and require a successful status before
/// handing the body to the decode loop.
pub(crate) async fn send_expect_stream(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
