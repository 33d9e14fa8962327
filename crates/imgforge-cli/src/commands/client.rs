//! Thin HTTP client for the build API.

use anyhow::{Context, Result, bail};
use imgforge_core::{BuildRequest, BuildResult, StatusReport};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn submit(&self, request: &BuildRequest) -> Result<BuildResult> {
        let url = format!("{}/api/v1/build", self.base_url);
        debug!(url = %url, "Submitting build");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        decode(response).await
    }

    pub async fn status(&self, image_name: &str) -> Result<StatusReport> {
        let url = format!(
            "{}/api/v1/status/{}",
            self.base_url,
            urlencoding::encode(image_name)
        );
        debug!(url = %url, "Fetching build status");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("invalid response body");
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    match body.get("error").and_then(Value::as_str) {
        Some(message) => bail!("{}: {}", status, message),
        None => bail!("request failed with {}", status),
    }
}
