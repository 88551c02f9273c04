/// Anthropic provider: the Messages API over SSE, or the same event JSON
/// over Bedrock's binary event-stream transport.
use crate::config::{GenerationDefaults, ProviderConfig};
use crate::cost::Pricing;
use crate::error::ProviderError;
use crate::protocol::anthropic::{AnthropicMessage, AnthropicRequest, AnthropicTool};
use crate::protocol::VendorKind;
use crate::provider::{
    build_http_client, resolve_api_key, send_expect_stream, ChatRequest, Role,
};
use crate::scan::{binary_event_stream, line_event_stream};
use crate::stream::{StreamAssembler, StreamChunk};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";
// Bedrock carries the version inside the request body instead.
const BEDROCK_API_VERSION: &str = "bedrock-2023-05-31";
// The Messages API requires max_tokens; applied when neither the request
// nor the config defaults set one.
const FALLBACK_MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    bedrock: bool,
    defaults: GenerationDefaults,
    pricing: Option<Pricing>,
}

impl AnthropicProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: resolve_api_key(config, DEFAULT_KEY_ENV),
            model: config.model.clone(),
            bedrock: config.is_bedrock(),
            defaults: config.defaults,
            pricing: config.pricing,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        if self.bedrock {
            format!(
                "{}/model/{}/invoke-with-response-stream",
                self.base_url, self.model
            )
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }

    fn build_request(&self, request: &ChatRequest) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|message| AnthropicMessage {
                // The Messages API has no system role inside the list.
                role: match message.role {
                    Role::Assistant => "assistant".to_string(),
                    Role::System | Role::User => "user".to_string(),
                },
                content: message.content.clone(),
            })
            .collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|tool| AnthropicTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.input_schema.clone(),
                    })
                    .collect(),
            )
        };

        AnthropicRequest {
            model: (!self.bedrock).then(|| self.model.clone()),
            max_tokens: request
                .max_tokens
                .or(self.defaults.max_tokens)
                .unwrap_or(FALLBACK_MAX_TOKENS),
            system: request.system.clone(),
            messages,
            tools,
            temperature: request.temperature.or(self.defaults.temperature),
            top_p: request.top_p.or(self.defaults.top_p),
            stream: (!self.bedrock).then_some(true),
            anthropic_version: self.bedrock.then(|| BEDROCK_API_VERSION.to_string()),
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_request(request);
        let http = if self.bedrock {
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .header(
                    reqwest::header::ACCEPT,
                    "application/vnd.amazon.eventstream",
                )
                .json(&body)
        } else {
            self.client
                .post(self.endpoint())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&body)
        };
        let response = send_expect_stream(http).await?;
        debug!(model = %self.model, bedrock = self.bedrock, "anthropic stream opened");

        let events = if self.bedrock {
            binary_event_stream(response.bytes_stream())
        } else {
            line_event_stream(response.bytes_stream())
        };
        let assembler = StreamAssembler::new(VendorKind::Anthropic, &self.model, self.pricing);
        Ok(assembler.spawn(events, cancel))
    }
}
