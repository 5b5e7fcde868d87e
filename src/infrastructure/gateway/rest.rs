//! REST channel to the prediction service.
//!
//! Used for health checks and as an administrative fallback; the binary
//! RPC channel carries all pipeline traffic.

use crate::domain::errors::GatewayError;
use crate::domain::ports::HealthStatus;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

pub struct RestChannel {
    http: ClientWithMiddleware,
    base_url: String,
}

impl RestChannel {
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        Self {
            http: build_http_client(request_timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, GatewayError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable {
                addr: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Service(format!(
                "Health check returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))
    }
}

/// HTTP client with exponential-backoff retry middleware
fn build_http_client(request_timeout: Duration) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

    let client = Client::builder()
        .pool_max_idle_per_host(5)
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}
