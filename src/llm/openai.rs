use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::llm::{http_client, models::{ChatOptions, ChatResponse, Message, Usage}, status_error, LlmError, LlmProvider};

/// OpenAI Chat Completions backend.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
        }
    }
}

/// Pulls the first choice out of a Chat Completions body. A blank answer counts as
/// malformed.
fn parse_completion(json: &Value, requested_model: &str) -> Result<ChatResponse, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))?
        .to_string();

    let usage = json.get("usage").map(|u| Usage {
        input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        content,
        model: json["model"].as_str().unwrap_or(requested_model).to_string(),
        usage,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let mut body = json!({
            "model": self.default_model,
            "messages": messages,
            "n": 1,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, &text));
        }

        let json: Value = response.json().await?;
        parse_completion(&json, &self.default_model)
    }
}
