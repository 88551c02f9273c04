/// Gemini provider: streamGenerateContent with `alt=sse`.
use crate::config::{GenerationDefaults, ProviderConfig};
use crate::cost::Pricing;
use crate::error::ProviderError;
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionDecl, GeminiGenerationConfig, GeminiPart, GeminiRequest,
    GeminiToolDecl,
};
use crate::protocol::VendorKind;
use crate::provider::{build_http_client, resolve_api_key, send_expect_stream, ChatRequest, Role};
use crate::scan::line_event_stream;
use crate::stream::{StreamAssembler, StreamChunk};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_KEY_ENV: &str = "GEMINI_API_KEY";

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    defaults: GenerationDefaults,
    pricing: Option<Pricing>,
}

impl GeminiProvider {
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

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url, self.model
        )
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .map(|message| GeminiContent {
                role: Some(match message.role {
                    Role::Assistant => "model".to_string(),
                    Role::System | Role::User => "user".to_string(),
                }),
                parts: vec![GeminiPart {
                    text: Some(message.content.clone()),
                    function_call: None,
                }],
            })
            .collect();

        let system_instruction = request.system.as_ref().map(|system| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(system.clone()),
                function_call: None,
            }],
        });

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiToolDecl {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|tool| GeminiFunctionDecl {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    })
                    .collect(),
            }])
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature.or(self.defaults.temperature),
                top_p: request.top_p.or(self.defaults.top_p),
                max_output_tokens: request.max_tokens.or(self.defaults.max_tokens),
            },
            tools,
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_request(request);
        let response = send_expect_stream(
            self.client
                .post(self.endpoint())
                .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
                .json(&body),
        )
        .await?;
        debug!(model = %self.model, "gemini stream opened");

        let events = line_event_stream(response.bytes_stream());
        let assembler = StreamAssembler::new(VendorKind::Gemini, &self.model, self.pricing);
        Ok(assembler.spawn(events, cancel))
    }
}
