// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HausBridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{GatewayError, GatewayResult};
use crate::gateway::GatewayApi;
use crate::types::{Metric, PluginStatus, SensorRegistration, SensorValue};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Gateway REST API client
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    base_url: String,
    token: Option<String>,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

impl HttpGatewayClient {
    /// Create a new gateway client
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Health check - ping the gateway API
    pub async fn ping(&self) -> bool {
        let url = format!("{}/api/", self.base_url);
        match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if !is_ok {
                    warn!("Gateway health check failed: status {}", response.status());
                }
                is_ok
            }
            Err(e) => {
                warn!("Gateway health check failed: {}", e);
                false
            }
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<T: serde::Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> GatewayResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("   POST {}", url);
        let response = self
            .retry_request(|| async {
                self.authorized(self.client.post(&url)).json(body).send().await
            })
            .await?;
        check_status(response, path).await
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> GatewayResult<Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(GatewayError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

async fn check_status(response: Response, what: &str) -> GatewayResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => {
            error!("❌ [GATEWAY] Not found: {}", what);
            Err(GatewayError::NotFound(what.to_owned()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!("❌ [GATEWAY] Authentication failed for: {}", what);
            Err(GatewayError::AuthenticationFailed)
        }
        status => {
            let message = response.text().await.unwrap_or_default();
            error!("❌ [GATEWAY] Status {} for {}: {}", status, what, message);
            Err(GatewayError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl GatewayApi for HttpGatewayClient {
    async fn set_output(&self, output_id: u32, on: bool) -> GatewayResult<()> {
        debug!("🔌 [GATEWAY] Output {} -> {}", output_id, if on { "ON" } else { "OFF" });
        self.post_json(
            &format!("/api/outputs/{output_id}"),
            &serde_json::json!({ "on": on }),
        )
        .await?;
        Ok(())
    }

    async fn register_sensor(&self, registration: &SensorRegistration) -> GatewayResult<u32> {
        let response = self.post_json("/api/sensors", registration).await?;
        let body: RegisterResponse = response.json().await.map_err(|e| {
            GatewayError::InvalidResponse(format!(
                "sensor registration for '{}' returned no id: {e}",
                registration.name
            ))
        })?;
        info!(
            "✅ [GATEWAY] Registered sensor '{}' as #{}",
            registration.name, body.id
        );
        Ok(body.id)
    }

    async fn set_sensor_values(&self, values: &[SensorValue]) -> GatewayResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        debug!("📊 [GATEWAY] Pushing {} sensor values", values.len());
        self.post_json("/api/sensors/values", values).await?;
        Ok(())
    }

    async fn report_status(&self, status: &PluginStatus) -> GatewayResult<()> {
        debug!(
            "📣 [GATEWAY] Status {}/{} = {}",
            status.plugin, status.device, status.status
        );
        self.post_json("/api/status", status).await?;
        Ok(())
    }

    async fn send_metrics(&self, metrics: &[Metric]) -> GatewayResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        debug!("📈 [GATEWAY] Sending {} metrics", metrics.len());
        self.post_json("/api/metrics", metrics).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_set_output_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/outputs/12")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({ "on": true })))
            .with_status(200)
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), Some("test_token".to_owned())).unwrap();
        client.set_output(12, true).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_output_unauthorized() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/outputs/1")
            .with_status(401)
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), Some("bad".to_owned())).unwrap();
        let result = client.set_output(1, false).await;

        assert!(matches!(result, Err(GatewayError::AuthenticationFailed)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_output_unknown_output() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/outputs/99")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), None).unwrap();
        let result = client.set_output(99, true).await;

        assert!(matches!(result, Err(GatewayError::NotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_sensor_returns_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/sensors")
            .match_body(Matcher::PartialJson(json!({
                "name": "grid_power",
                "physical_quantity": "power"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "id": 7 }).to_string())
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), None).unwrap();
        let id = client
            .register_sensor(&SensorRegistration {
                name: "grid_power".to_owned(),
                physical_quantity: "power".to_owned(),
                unit: "watt".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(id, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_sensor_without_id() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/sensors")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), None).unwrap();
        let result = client
            .register_sensor(&SensorRegistration {
                name: "x".to_owned(),
                physical_quantity: "power".to_owned(),
                unit: "watt".to_owned(),
            })
            .await;

        assert!(matches!(result, Err(GatewayError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_api_error_carries_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/status")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = HttpGatewayClient::new(server.url(), None).unwrap();
        let result = client
            .report_status(&PluginStatus::new("ventilation", "boost", "normal"))
            .await;

        match result {
            Err(GatewayError::ApiError { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_batches_skip_request() {
        // No server: an actual request would fail to connect
        let client = HttpGatewayClient::new("http://127.0.0.1:9", None)
            .unwrap()
            .with_retry_config(1, Duration::from_millis(1));

        assert!(client.set_sensor_values(&[]).await.is_ok());
        assert!(client.send_metrics(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_after_retries() {
        let client = HttpGatewayClient::new("http://127.0.0.1:9", None)
            .unwrap()
            .with_retry_config(2, Duration::from_millis(1));

        let result = client.set_output(1, true).await;
        assert!(matches!(result, Err(GatewayError::HttpError(_))));
    }

    #[tokio::test]
    async fn test_ping() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .with_status(200)
            .create_async()
            .await;

        let client = HttpGatewayClient::new(format!("{}/", server.url()), None).unwrap();
        assert!(client.ping().await);
        mock.assert_async().await;
    }
}
