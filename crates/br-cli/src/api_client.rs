//! HTTP client for a running Beeper Relay service.

use anyhow::{Context, Result};
use br_api::dto::{HealthResponse, WebhookAcceptedResponse};
use br_api::{compute_signature, ErrorResponse};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// API client for the relay service.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a new API client.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches `/health`.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        self.handle_response(response).await
    }

    /// Posts `body` to `/webhook` with the headers Sentry would send,
    /// signing it when a secret is given.
    pub async fn send_webhook(
        &self,
        resource: &str,
        body: Vec<u8>,
        secret: Option<&str>,
    ) -> Result<WebhookAcceptedResponse> {
        let url = format!("{}/webhook", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("sentry-hook-resource", resource)
            .header("sentry-hook-timestamp", Utc::now().timestamp().to_string())
            .header("request-id", Uuid::new_v4().to_string());

        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            request = request.header("sentry-hook-signature", compute_signature(&body, secret));
        }

        let response = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .context("Failed to parse response body")
        } else {
            let error: ErrorResponse = response.json().await.unwrap_or_else(|_| ErrorResponse {
                error: "Unknown".to_string(),
                message: "Unknown error".to_string(),
                details: None,
                request_id: None,
            });

            match error.details {
                Some(details) => anyhow::bail!(
                    "API error ({}): {} - {} {}",
                    status,
                    error.error,
                    error.message,
                    details
                ),
                None => anyhow::bail!("API error ({}): {} - {}", status, error.error, error.message),
            }
        }
    }
}
