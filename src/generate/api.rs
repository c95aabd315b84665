//! Remote API passthrough backend.
//!
//! Forwards prompts to another endpoint speaking the same
//! `POST /api/generate` contract and relays its responses.

use crate::config::GenerateConfig;
use crate::error::{MallowError, Result};
use crate::generate::GenerateBackend;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct UpstreamResponse {
    response: String,
}

pub struct ApiEngine {
    client: reqwest::Client,
    model_name: String,
    url: String,
}

impl ApiEngine {
    pub fn new(model_name: &str, config: &GenerateConfig) -> Result<Self> {
        let url = config.api_url.clone().ok_or_else(|| {
            MallowError::Config(
                "generate.api_url must be set when generate.backend = \"api\"".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MallowError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            url,
        })
    }
}

#[async_trait]
impl GenerateBackend for ApiEngine {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| MallowError::Engine(format!("Upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MallowError::Engine(format!(
                "Upstream returned HTTP {status}"
            )));
        }

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| MallowError::Engine(format!("Unreadable upstream response: {e}")))?;

        Ok(body.response)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn backend_name(&self) -> &str {
        "api"
    }
}
