use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{error, info};

/// A generative text service: one prompt in, one response text out.
///
/// Implementations make a single attempt; retries belong to the caller.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn send_prompt(&self, system_message: Option<&str>, prompt: &str) -> Result<String>;

    fn provider_name(&self) -> &str;
}

/// Common message structure for LLM requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Enum-based LLM provider implementation
#[derive(Debug, Clone)]
pub enum LLMProvider {
    OpenAI(OpenAIProvider),
    Gemini(GeminiProvider),
    Ollama(OllamaProvider),
}

impl LLMProvider {
    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        match self {
            LLMProvider::OpenAI(provider) => &provider.model,
            LLMProvider::Gemini(provider) => &provider.model,
            LLMProvider::Ollama(provider) => &provider.model,
        }
    }
}

#[async_trait]
impl PromptService for LLMProvider {
    async fn send_prompt(&self, system_message: Option<&str>, prompt: &str) -> Result<String> {
        match self {
            LLMProvider::OpenAI(provider) => provider.make_request(system_message, prompt).await,
            LLMProvider::Gemini(provider) => provider.make_request(system_message, prompt).await,
            LLMProvider::Ollama(provider) => provider.make_request(system_message, prompt).await,
        }
    }

    fn provider_name(&self) -> &str {
        match self {
            LLMProvider::OpenAI(_) => "OpenAI",
            LLMProvider::Gemini(_) => "Gemini",
            LLMProvider::Ollama(_) => "Ollama",
        }
    }
}

/// OpenAI-compatible chat completions provider
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<LLMMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }

    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            messages.push(LLMMessage {
                role: "system".to_string(),
                content: sys_msg.to_string(),
            });
        }

        messages.push(LLMMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages,
        };

        info!(
            provider = "OpenAI",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "OpenAI",
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow::anyhow!("OpenAI API request failed: {}", error_text));
        }

        let openai_response: OpenAIResponse = response.json().await?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices in OpenAI response"))?;

        Ok(choice.message.content)
    }
}

/// Gemini provider implementation
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
        }
    }

    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str) -> Result<String> {
        let full_prompt = match system_message {
            Some(sys_msg) => format!("{}\n\n{}", sys_msg, prompt),
            None => prompt.to_string(),
        };

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: 4096,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        info!(
            provider = "Gemini",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self.client.post(&url).json(&request_body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "Gemini",
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow::anyhow!("Gemini API request failed: {}", error_text));
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let part = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .ok_or_else(|| anyhow::anyhow!("No content in Gemini response"))?;

        Ok(part.text)
    }
}

/// Local model served by Ollama; the on-device option
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    format: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3.2:3b".to_string()),
        }
    }

    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str) -> Result<String> {
        let request_body = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: system_message.map(str::to_string),
            stream: false,
            format: "json",
        };

        info!(
            provider = "Ollama",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "Ollama",
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow::anyhow!("Ollama request failed: {}", error_text));
        }

        let body: OllamaGenerateResponse = response.json().await?;
        Ok(body.response)
    }
}

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*json[ \t]*\r?\n?(.*?)```").expect("valid regex"));
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\r?\n?(.*?)```").expect("valid regex"));

/// Pulls a JSON object out of model output that may wrap it in prose or code fences
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    /// Candidate JSON texts in the order they should be tried: fenced blocks
    /// tagged `json`, then any fenced block, then the first balanced
    /// top-level `{...}` substring.
    pub fn extraction_candidates(content: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        candidates.extend(
            JSON_FENCE
                .captures_iter(content)
                .map(|caps| caps[1].trim().to_string()),
        );
        candidates.extend(
            ANY_FENCE
                .captures_iter(content)
                .map(|caps| caps[1].trim().to_string()),
        );
        if let Some(object) = first_brace_object(content) {
            candidates.push(object.to_string());
        }

        candidates.retain(|candidate| !candidate.is_empty());
        candidates
    }

    /// Parse the first candidate that deserializes into `T`
    pub fn parse_json_response<T>(&self, content: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let candidates = Self::extraction_candidates(content);
        if candidates.is_empty() {
            return Err(anyhow::anyhow!("No JSON object found in response"));
        }

        let mut last_error = None;
        for candidate in &candidates {
            match serde_json::from_str::<T>(candidate) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }
        }

        Err(anyhow::anyhow!(
            "Failed to parse JSON response after {} attempts: {}",
            candidates.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

// Scans for the first `{` and its matching `}`, skipping braces inside strings.
fn first_brace_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProviderType {
    OpenAI,
    Gemini,
    Ollama,
}

impl LLMProviderType {
    /// Map a user-facing provider label; unknown labels use the local provider
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(LLMProviderType::Gemini),
            "openai" | "chatgpt" | "gpt" => Some(LLMProviderType::OpenAI),
            "ollama" | "local" => Some(LLMProviderType::Ollama),
            _ => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProviderType::Ollama)
    }
}

impl LLMProviderFactory {
    /// Create a new LLM provider instance based on provider type
    pub fn create_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> LLMProvider {
        match provider_type {
            LLMProviderType::OpenAI => LLMProvider::OpenAI(OpenAIProvider::new(api_key, base_url, model)),
            LLMProviderType::Gemini => LLMProvider::Gemini(GeminiProvider::new(api_key, base_url, model)),
            LLMProviderType::Ollama => LLMProvider::Ollama(OllamaProvider::new(base_url, model)),
        }
    }
}
