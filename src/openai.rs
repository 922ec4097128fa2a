use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ModelEndpoint;
use crate::extract::{
    dish_image_prompt, extract_image_url, parse_menu, AiError, DishImageGenerator, MenuExtractor,
    EXTRACTION_INSTRUCTION, EXTRACTION_SYSTEM_PROMPT,
};
use crate::models::Menu;
use crate::upload::ImageKind;

const USER_AGENT: &str = concat!("menu-analyzer-api/", env!("CARGO_PKG_VERSION"));

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: ModelEndpoint,
}

impl OpenAiClient {
    pub fn new(endpoint: ModelEndpoint, timeout: Duration) -> Result<Self, AiError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AiError::Request(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!(url = %endpoint.base_url, model = %endpoint.model, "initialized model client");
        Ok(Self { client, endpoint })
    }

    pub fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        response_format: Option<Value>,
    ) -> Result<String, AiError> {
        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.as_str().trim_end_matches('/')
        );
        let request = ChatCompletionRequest {
            model: self.endpoint.model.clone(),
            messages,
            response_format,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.endpoint.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Request(format!("TimeoutError: {}", e))
            } else if e.is_connect() {
                AiError::Request(format!("ConnectError: {}", e))
            } else {
                AiError::Request(format!("RequestError: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::Request(format!("failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)?;

        tracing::debug!(model = %self.endpoint.model, len = content.len(), "chat completion done");
        Ok(content)
    }
}

#[async_trait]
impl MenuExtractor for OpenAiClient {
    async fn extract_menu(&self, image: &Path, kind: ImageKind) -> Result<Menu, AiError> {
        let bytes = tokio::fs::read(image).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let messages = vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(EXTRACTION_SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: EXTRACTION_INSTRUCTION.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", kind.mime(), encoded),
                        },
                    },
                ]),
            },
        ];
        let response_format = json!({
            "type": "json_schema",
            "json_schema": {"name": "Menu", "schema": Menu::json_schema()},
        });

        let content = self.chat(messages, Some(response_format)).await?;
        parse_menu(&content)
    }
}

#[async_trait]
impl DishImageGenerator for OpenAiClient {
    async fn generate_dish_image(&self, name: &str, description: &str) -> Result<String, AiError> {
        let messages = vec![ChatMessage {
            role: "user",
            content: MessageContent::Text(dish_image_prompt(name, description)),
        }];
        let content = self.chat(messages, None).await?;
        Ok(extract_image_url(&content))
    }
}
