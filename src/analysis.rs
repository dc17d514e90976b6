//! Question forwarding to the external analysis service.
//!
//! `POST /chat` and `POST /analyze` accept `{"question": "..."}` and pass it
//! unchanged to `{analysis.url}/chat` or `{analysis.url}/analyze`. The
//! service's JSON response is relayed verbatim.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::config::AnalysisConfig;

#[derive(Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    /// Returns `Ok(None)` when `[analysis].url` is not configured.
    pub fn from_config(config: &AnalysisConfig) -> Result<Option<Self>> {
        let base_url = match config.url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => return Ok(None),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Some(Self { client, base_url }))
    }

    /// Forwards `question` to `/{endpoint}` and returns the response body.
    pub async fn ask(&self, endpoint: &str, question: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "question": question }))
            .send()
            .await
            .with_context(|| format!("analysis request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("analysis service returned {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}
