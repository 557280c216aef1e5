use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{ActuatorGateway, Delivery, ExecuteRequest};

/// Posts commands as JSON to an HTTP actuator gateway.
pub struct HttpGateway {
    http_client: Client,
    url: String,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, request: &ExecuteRequest) -> Result<Delivery, String> {
        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(Delivery::Accepted),
            status if status.is_success() => Ok(Delivery::Completed),
            status => Err(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )),
        }
    }
}

impl ActuatorGateway for HttpGateway {
    fn execute<'a>(&'a self, request: &'a ExecuteRequest) -> BoxFuture<'a, Result<Delivery, String>> {
        self.post(request).boxed()
    }
}

/// Gateway used when no actuator endpoint is configured: logs and succeeds.
#[derive(Debug, Default)]
pub struct LogGateway;

impl ActuatorGateway for LogGateway {
    fn execute<'a>(&'a self, request: &'a ExecuteRequest) -> BoxFuture<'a, Result<Delivery, String>> {
        async move {
            tracing::info!(
                command_id = %request.command_id,
                actuator_id = %request.actuator_id,
                command = %request.command,
                args = ?request.args,
                "actuator_command_logged"
            );
            Ok(Delivery::Completed)
        }
        .boxed()
    }
}
