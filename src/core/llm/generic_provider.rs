use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::registry::{ApiFormat, AuthType, ProviderDef};
use super::{ChatMessage, LlmError, LlmProvider, classify_http_failure};

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAiResponseFormat>,
}

#[derive(Serialize)]
struct OpenAiResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    #[serde(default)]
    content: Option<String>,
}

// ── Gemini request/response ──

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResContent,
}

#[derive(Deserialize)]
struct GeminiResContent {
    #[serde(default)]
    parts: Vec<GeminiResPart>,
}

#[derive(Deserialize)]
struct GeminiResPart {
    #[serde(default)]
    text: String,
}

// ── Anthropic request/response ──

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "is_blank")]
    system: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

// ── Generic Provider ──

/// Completion client driven by a `ProviderDef` from the registry. One
/// instance is bound to one model.
pub struct GenericProvider {
    provider_def: ProviderDef,
    model_id: String,
    api_key: String,
    client: Client,
}

impl GenericProvider {
    pub fn new(provider_def: ProviderDef, model_id: String, api_key: String) -> Self {
        Self {
            provider_def,
            model_id,
            api_key,
            client: Client::new(),
        }
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request = match self.provider_def.auth.auth_type {
            AuthType::Bearer => request.header("Authorization", format!("Bearer {}", self.api_key)),
            AuthType::Header => {
                let name = self
                    .provider_def
                    .auth
                    .header_name
                    .as_deref()
                    .unwrap_or("Authorization");
                request.header(name, &self.api_key)
            }
            // Key travels in the URL, see `endpoint`.
            AuthType::QueryParam => request,
        };
        for (k, v) in &self.provider_def.extra_headers {
            request = request.header(k, v);
        }
        request
    }

    fn endpoint(&self) -> String {
        let base = self.provider_def.base_url.replace("{model}", &self.model_id);
        match self.provider_def.auth.auth_type {
            AuthType::QueryParam => {
                let param_name = self
                    .provider_def
                    .auth
                    .param_name
                    .as_deref()
                    .unwrap_or("key");
                format!("{}?{}={}", base, param_name, self.api_key)
            }
            _ => base,
        }
    }

    async fn send<T: Serialize + ?Sized>(&self, body: &T) -> Result<reqwest::Response, LlmError> {
        let request = self.authorize(self.client.post(self.endpoint()).json(body));
        let res = request
            .send()
            .await
            .map_err(|e| {
                // Query-param auth puts the key in the URL.
                LlmError::Unavailable(format!("{}: {}", self.provider_def.name, e.without_url()))
            })?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(classify_http_failure(&self.provider_def.name, status, &body));
        }
        Ok(res)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        res: reqwest::Response,
    ) -> Result<T, LlmError> {
        res.json::<T>().await.map_err(|e| {
            LlmError::Unavailable(format!(
                "{}: unreadable response envelope: {}",
                self.provider_def.name,
                e.without_url()
            ))
        })
    }

    async fn complete_openai(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let req = OpenAiRequest {
            model: &self.model_id,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            response_format: self
                .provider_def
                .supports_json_mode
                .then_some(OpenAiResponseFormat {
                    format_type: "json_object",
                }),
        };
        let parsed: OpenAiResponse = self.decode(self.send(&req).await?).await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn complete_gemini(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut system_instruction: Option<GeminiContent> = None;
        let mut contents = Vec::new();
        for m in messages {
            if m.role == "system" {
                system_instruction = Some(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                });
            } else {
                let role = if m.role == "assistant" { "model" } else { "user" };
                contents.push(GeminiContent {
                    role: role.to_string(),
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                });
            }
        }

        let req = GeminiRequest {
            system_instruction,
            contents,
            generation_config: self
                .provider_def
                .supports_json_mode
                .then_some(GeminiGenerationConfig {
                    response_mime_type: "application/json",
                }),
        };
        let parsed: GeminiResponse = self.decode(self.send(&req).await?).await?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }

    async fn complete_anthropic(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let req = AnthropicRequest {
            model: &self.model_id,
            max_tokens: 8192,
            system,
            messages: messages
                .iter()
                .filter(|m| m.role != "system")
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
        };
        let parsed: AnthropicResponse = self.decode(self.send(&req).await?).await?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn provider_id(&self) -> &str {
        &self.provider_def.id
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
        debug!(
            provider = %self.provider_def.id,
            model = %self.model_id,
            prompt_chars = user_prompt.len(),
            "Sending completion request"
        );
        match self.provider_def.api_format {
            ApiFormat::Openai => self.complete_openai(&messages).await,
            ApiFormat::Gemini => self.complete_gemini(&messages).await,
            ApiFormat::Anthropic => self.complete_anthropic(&messages).await,
        }
    }
}
