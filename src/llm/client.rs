// src/llm/client.rs

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::llm::prompt::LlmPrompt;
use crate::llm::{ServiceError, TextService};

const PROMPT_ABI_VERSION: &str = "v1-harnessgen";
const MAX_TOKENS: u32 = 4096;
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct LlmRunResult {
    pub text: String,
    pub prompt_hash: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            provider: Provider::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

impl ProviderConfig {
    /// Saved config, or defaults, with the key filled from the environment
    /// when none was saved.
    pub fn load() -> Self {
        let mut cfg = load_saved().unwrap_or_default();

        if let Ok(model) = env::var("HARNESSGEN_MODEL") {
            cfg.model = model;
        }

        if cfg.api_key.trim().is_empty() {
            let var = match cfg.provider {
                Provider::OpenAI => Some("OPENAI_API_KEY"),
                Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
                Provider::Ollama => None,
            };
            if let Some(key) = var.and_then(|v| env::var(v).ok()) {
                cfg.api_key = key;
            }
        }

        cfg
    }
}

/// Validates and persists a provider selection to `<config_dir>/harnessgen/llm.json`.
pub fn configure(
    provider_name: &str,
    model: String,
    api_key: String,
    base_url: Option<String>,
) -> Result<ProviderConfig, String> {
    let provider = match provider_name {
        "openai" => Provider::OpenAI,
        "anthropic" => Provider::Anthropic,
        "ollama" => Provider::Ollama,
        _ => return Err(format!("Unknown provider: {provider_name}")),
    };

    if provider != Provider::Ollama && api_key.trim().is_empty() {
        return Err("API key cannot be empty".into());
    }

    let cfg = ProviderConfig {
        provider,
        model,
        api_key,
        base_url,
    };

    save_config(&cfg).map_err(|e| e.to_string())?;
    Ok(cfg)
}

#[derive(Clone)]
pub struct LlmClient {
    cfg: ProviderConfig,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(cfg: ProviderConfig, timeout: Duration) -> Result<Self, ServiceError> {
        if cfg.provider != Provider::Ollama && cfg.api_key.trim().is_empty() {
            return Err(ServiceError::NotConfigured(
                "no API key; run `harnessgen configure` or set the provider's key variable"
                    .into(),
            ));
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self { cfg, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }

    /// Execute LLM request
    pub fn run(&self, prompt: &LlmPrompt) -> Result<LlmRunResult, ServiceError> {
        let prompt_hash = hash_prompt(prompt);
        let (url, headers, body) = build_request(&self.cfg, prompt);

        let mut req = self.http.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send()?;
        let status = resp.status();
        let raw = resp.text()?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &raw));
        }

        let json: Value =
            serde_json::from_str(&raw).map_err(|e| ServiceError::Parse(e.to_string()))?;
        let text = extract_text(&self.cfg.provider, &json)?;

        Ok(LlmRunResult { text, prompt_hash })
    }
}

impl TextService for LlmClient {
    fn complete(&self, prompt: &LlmPrompt) -> Result<LlmRunResult, ServiceError> {
        self.run(prompt)
    }
}

pub(crate) fn hash_prompt(prompt: &LlmPrompt) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.system.as_bytes());
    h.update(prompt.user.as_bytes());
    hex::encode(h.finalize())
}

fn status_error(status: u16, body: &str) -> ServiceError {
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    match status {
        401 | 403 => ServiceError::Auth(excerpt),
        402 => ServiceError::Quota(excerpt),
        429 if body.contains("insufficient_quota") => ServiceError::Quota(excerpt),
        429 => ServiceError::RateLimited,
        _ => ServiceError::Http {
            status,
            body: excerpt,
        },
    }
}

fn build_request(
    cfg: &ProviderConfig,
    prompt: &LlmPrompt,
) -> (String, Vec<(&'static str, String)>, Value) {
    match cfg.provider {
        // OpenAI-compatible chat completions; base_url lets compatible vendors in.
        Provider::OpenAI => {
            let base = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            let url = format!("{}/chat/completions", base.trim_end_matches('/'));

            let body = serde_json::json!({
                "model": cfg.model,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user }
                ],
                "temperature": 0.7,
                "max_tokens": MAX_TOKENS
            });

            (
                url,
                vec![("Authorization", format!("Bearer {}", cfg.api_key))],
                body,
            )
        }

        Provider::Ollama => {
            let base = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".into());
            let url = format!("{}/api/generate", base.trim_end_matches('/'));

            let body = serde_json::json!({
                "model": cfg.model,
                "system": prompt.system,
                "prompt": prompt.user,
                "stream": false
            });

            (url, Vec::new(), body)
        }

        Provider::Anthropic => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".into());

            let body = serde_json::json!({
                "model": cfg.model,
                "max_tokens": MAX_TOKENS,
                "system": prompt.system,
                "messages": [
                    { "role": "user", "content": prompt.user }
                ]
            });

            (
                url,
                vec![
                    ("x-api-key", cfg.api_key.clone()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body,
            )
        }
    }
}

fn extract_text(provider: &Provider, v: &Value) -> Result<String, ServiceError> {
    match provider {
        Provider::OpenAI => v
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ServiceError::Parse("chat completion has no message content".into())),

        Provider::Anthropic => v
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ServiceError::Parse("Anthropic response has no text block".into())),

        Provider::Ollama => v
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ServiceError::Parse("Ollama response has no text".into())),
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harnessgen/llm.json")
}

fn load_saved() -> Option<ProviderConfig> {
    fs::read_to_string(config_path())
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
}

fn save_config(cfg: &ProviderConfig) -> std::io::Result<()> {
    let path = config_path();
    if let Some(p) = path.parent() {
        fs::create_dir_all(p)?;
    }
    let text = serde_json::to_string_pretty(cfg)?;
    fs::write(path, text)
}
