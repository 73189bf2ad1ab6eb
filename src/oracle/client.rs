use super::Oracle;
use crate::util::clip;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// OpenRouter direct API URL (BYOK mode)
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a senior Python engineer. You answer with source code only.";

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions oracle speaking the OpenRouter (OpenAI-compatible) API.
#[derive(Clone)]
pub struct OpenRouterOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenRouterOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: OPENROUTER_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 8192,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn call(&self, prompt: &str, temperature: f32) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature,
            stream: false,
        };

        let mut retry_count = 0;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .header("X-Title", "lintloop")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to parse OpenRouter response: {}\n{}",
                        e,
                        clip(&text, 200)
                    )
                })?;

                return Ok(parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default());
            }

            // Check if we should retry (rate limits)
            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let retry_after = parse_retry_after(&text).unwrap_or_else(|| {
                    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count - 1)) / 1000
                });
                warn!(
                    retry_after_secs = retry_after,
                    attempt = retry_count,
                    max = MAX_RETRIES,
                    "OpenRouter rate limited, backing off"
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(retry_after)).await;
                continue;
            }

            let error_msg = match status.as_u16() {
                401 => "Invalid API key. Set OPENROUTER_API_KEY or store one in the keychain."
                    .to_string(),
                429 => format!(
                    "Rate limited by OpenRouter after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "OpenRouter server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, clip(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", error_msg));
        }
    }
}

impl Oracle for OpenRouterOracle {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(self.call(prompt, temperature))
    }
}

/// Extract retry-after hint from OpenRouter response (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds" or "wait X seconds"
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    let after_retry = &text_lower[pos..];
    for word in after_retry.split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word
            .trim_matches(|c: char| !c.is_numeric())
            .parse::<u64>()
        {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_reads_seconds_hint() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("Retry in 999 seconds"), None);
        assert_eq!(parse_retry_after("slow down"), None);
    }

    #[test]
    fn request_carries_temperature() {
        let request = ChatRequest {
            model: "m",
            messages: vec![Message {
                role: "user",
                content: "hi",
            }],
            max_tokens: 10,
            temperature: 0.6,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!((json["temperature"].as_f64().unwrap() - 0.6).abs() < 1e-6);
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn response_without_content_is_empty() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        assert_eq!(content, "");
    }
}
