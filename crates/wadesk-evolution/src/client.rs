//! Evolution API (WhatsApp gateway) HTTP client.
//!
//! Every endpoint is `POST {base_url}/{route}/{instance}` authenticated with
//! the `apikey` header.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use wadesk_core::config::EvolutionConfig;

use crate::error::EvolutionError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct EvolutionClient {
    http: reqwest::Client,
    config: EvolutionConfig,
}

impl EvolutionClient {
    pub fn new(config: EvolutionConfig) -> Result<Self, EvolutionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// POST `body` to `route` and return the decoded JSON response.
    ///
    /// Non-2xx responses become [`EvolutionError::Api`] carrying the API's
    /// own error message when it sends one.
    pub(crate) async fn post(
        &self,
        api: &EvolutionConfig,
        route: &str,
        body: &Value,
    ) -> Result<Value, EvolutionError> {
        if !api.has_credentials() {
            return Err(EvolutionError::NoCredentials);
        }
        let url = endpoint(api, route);
        debug!(%url, "evolution request");

        let resp = self
            .http
            .post(&url)
            .header("apikey", api.api_key.trim())
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EvolutionError::Api {
                status,
                message: error_message(&text),
            });
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| EvolutionError::Parse(e.to_string()))
    }
}

pub(crate) fn endpoint(api: &EvolutionConfig, route: &str) -> String {
    format!(
        "{}/{}/{}",
        api.base_url.trim().trim_end_matches('/'),
        route.trim_matches('/'),
        api.instance.trim()
    )
}

/// Pull a readable message out of an error body.
///
/// Evolution nests it as `response.message`, sometimes as an array.
fn error_message(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return body.trim().chars().take(200).collect();
    };
    let msg = v
        .pointer("/response/message")
        .or_else(|| v.get("message"))
        .or_else(|| v.get("error"));
    match msg {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| match i {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}
