use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::llm::{http_client, models::{ChatOptions, ChatResponse, Message, Usage}, status_error, LlmError, LlmProvider};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, default_model: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
        }
    }
}

fn parse_completion(json: &Value, model: &str) -> Result<ChatResponse, LlmError> {
    let content = json["message"]["content"]
        .as_str()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("missing message.content".into()))?
        .to_string();

    // Ollama reports token counts as prompt_eval_count / eval_count
    let usage = match (json["prompt_eval_count"].as_u64(), json["eval_count"].as_u64()) {
        (Some(input), Some(output)) => Some(Usage {
            input_tokens: input as u32,
            output_tokens: output as u32,
        }),
        _ => None,
    };

    Ok(ChatResponse {
        content,
        model: json["model"].as_str().unwrap_or(model).to_string(),
        usage,
    })
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let mut model_options = json!({});
        if let Some(max_tokens) = options.max_tokens {
            model_options["num_predict"] = json!(max_tokens);
        }

        let body = json!({
            "model": self.default_model,
            "messages": messages,
            "stream": false,
            "options": model_options,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, &text));
        }

        let json: Value = response.json().await?;
        parse_completion(&json, &self.default_model)
    }
}
