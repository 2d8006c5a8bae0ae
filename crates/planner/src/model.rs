//! Reasoning-model clients used to turn a command into a plan.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    pilot_config::{PlannerConfig, PlannerProvider},
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tracing::{debug, trace, warn},
};

/// A model that answers one system + user prompt with text.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Anthropic Messages API.
pub struct AnthropicModel {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(
        api_key: Secret<String>,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ReasoningModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": prompt }],
        });
        debug!(model = %self.model, "anthropic plan request");

        let http_resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body_text, "anthropic API error");
            anyhow::bail!("Anthropic API error HTTP {status}: {body_text}");
        }

        let resp = http_resp.json::<Value>().await?;
        trace!(response = %resp, "anthropic raw response");

        let text = resp["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .collect::<String>();
        if text.is_empty() {
            anyhow::bail!("Anthropic response contained no text");
        }
        Ok(text)
    }
}

/// OpenAI-compatible chat completions.
pub struct OpenAiModel {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(
        api_key: Secret<String>,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ReasoningModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });
        debug!(model = %self.model, "openai plan request");

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body_text, "openai API error");
            anyhow::bail!("OpenAI API error HTTP {status}: {body_text}");
        }

        let resp = http_resp.json::<Value>().await?;
        trace!(response = %resp, "openai raw response");

        match resp["choices"][0]["message"]["content"].as_str() {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => anyhow::bail!("OpenAI response contained no message content"),
        }
    }
}

/// Build the configured model, or `None` when the planner is disabled or
/// has no API key.
pub fn build_model(cfg: &PlannerConfig) -> Option<Arc<dyn ReasoningModel>> {
    if !cfg.enabled {
        return None;
    }
    let key = cfg
        .api_key
        .as_ref()
        .filter(|k| !k.expose_secret().trim().is_empty())?;
    let timeout = Duration::from_millis(cfg.timeout_ms);
    let base_url = cfg.resolved_base_url();

    let model: Arc<dyn ReasoningModel> = match cfg.provider {
        PlannerProvider::Anthropic => Arc::new(AnthropicModel::new(
            key.clone(),
            cfg.model.clone(),
            base_url,
            cfg.max_tokens,
            timeout,
        )),
        PlannerProvider::Openai => Arc::new(OpenAiModel::new(
            key.clone(),
            cfg.model.clone(),
            base_url,
            cfg.max_tokens,
            timeout,
        )),
    };
    Some(model)
}
