/// OpenAI-compatible provider: chat-completions over SSE.
///
/// Also serves any OpenAI-dialect upstream (vLLM, Ollama's compatible
/// endpoint, gateways): the wire shape, not the brand, is what matters.
use crate::config::{GenerationDefaults, ProviderConfig};
use crate::cost::Pricing;
use crate::error::ProviderError;
use crate::protocol::openai::{
    OpenAiChatRequest, OpenAiFunctionDef, OpenAiMessage, OpenAiStreamOptions, OpenAiTool,
};
use crate::protocol::VendorKind;
use crate::provider::{
    build_http_client, resolve_api_key, send_expect_stream, ChatRequest,
};
use crate::scan::line_event_stream;
use crate::stream::{StreamAssembler, StreamChunk};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    defaults: GenerationDefaults,
    pricing: Option<Pricing>,
}

impl OpenAiProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: resolve_api_key(config, DEFAULT_KEY_ENV),
            model: config.model.clone(),
            defaults: config.defaults,
            pricing: config.pricing,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAiChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for message in &request.messages {
            messages.push(OpenAiMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|tool| OpenAiTool {
                        type_: "function".to_string(),
                        function: OpenAiFunctionDef {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAiChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            temperature: request.temperature.or(self.defaults.temperature),
            top_p: request.top_p.or(self.defaults.top_p),
            max_tokens: request.max_tokens.or(self.defaults.max_tokens),
            stream: true,
            stream_options: Some(OpenAiStreamOptions {
                include_usage: true,
            }),
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.base_url);
        let response = send_expect_stream(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&body),
        )
        .await?;
        debug!(model = %self.model, "openai stream opened");

        let events = line_event_stream(response.bytes_stream());
        let assembler = StreamAssembler::new(VendorKind::OpenAi, &self.model, self.pricing);
        Ok(assembler.spawn(events, cancel))
    }
}
