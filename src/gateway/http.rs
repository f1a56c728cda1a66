//! HTTP implementation of [`InstrumentGateway`].
//!
//! Every call is a single request with no retry; the scheduler's next poll tick
//! is the retry. Requests are bounded by the configured timeout.

use super::{
    CommandRequest, InstrumentGateway, InstrumentStatus, ManualCommand, ABORT_ENDPOINT,
    COMMAND_ENDPOINT, STATE_ENDPOINT,
};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Talks to the AISH service over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGateway {
    /// Gateway for the service at `config.base_url`.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let timeout = config.request_timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Full URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                GatewayError::Unreachable {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            } else if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::Transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<Value, GatewayError> {
        let mut request = self.client.post(self.url(endpoint));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = self.send(endpoint, request).await?;
        let text = response.text().await?;
        // Some endpoints answer with an empty body.
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl InstrumentGateway for HttpGateway {
    async fn fetch_status(&self) -> Result<InstrumentStatus, GatewayError> {
        let request = self.client.get(self.url(STATE_ENDPOINT));
        let response = self.send(STATE_ENDPOINT, request).await?;
        response
            .json::<InstrumentStatus>()
            .await
            .map_err(|e| GatewayError::Decode {
                endpoint: STATE_ENDPOINT.to_string(),
                reason: e.to_string(),
            })
    }

    async fn submit(&self, request: &CommandRequest) -> Result<Value, GatewayError> {
        let body = serde_json::to_value(request).map_err(|e| GatewayError::Decode {
            endpoint: COMMAND_ENDPOINT.to_string(),
            reason: e.to_string(),
        })?;
        let response = self.post(COMMAND_ENDPOINT, Some(body)).await?;
        tracing::info!(sample = request.sample_num, response = %response, "command response");
        Ok(response)
    }

    async fn abort(&self) -> Result<(), GatewayError> {
        let response = self.post(ABORT_ENDPOINT, None).await?;
        tracing::info!(response = %response, "abort response");
        Ok(())
    }

    async fn send_manual(&self, command: ManualCommand) -> Result<Value, GatewayError> {
        tracing::debug!(?command, path = command.path(), "manual command");
        self.post(command.path(), command.body()).await
    }
}
