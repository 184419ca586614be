//! HTTP implementation of [`Backend`] over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::models::{
    ActionRequest, ActionResult, ActivityEntry, ComplianceStatus, ConfigUpdateRequest,
    DashboardMetrics, Insight, Notification,
};
use super::Backend;
use crate::error::{ErrorCode, ErrorContext, Result, VigilError};
use crate::settings::ApiSettings;

/// REST client for the dashboard backend.
///
/// Responses may be wrapped in the `{success, data, error}` envelope or be
/// the bare payload; both are accepted.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .with_error_code(ErrorCode::ConfigurationError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        Self::new(&settings.base_url, settings.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request::<()>(Method::GET, path, None).await?;
        unwrap_envelope(body)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let body = self.request(Method::POST, path, Some(body)).await?;
        unwrap_envelope(body)
    }

    /// Send a request and return the JSON body (`Null` when empty).
    async fn request<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(method = %method, url = %url, status = status.as_u16(), "Backend response");

        if !status.is_success() {
            let code = if status == StatusCode::SERVICE_UNAVAILABLE {
                ErrorCode::BackendUnavailable
            } else {
                ErrorCode::BackendError
            };
            return Err(VigilError::with_internal(
                code,
                "Backend returned an error status",
                format!("{} {} -> {}: {}", method, url, status, text),
            )
            .with_context("status", status.as_u16()));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Strip the `{success, data, error}` envelope if present.
fn unwrap_envelope<T: DeserializeOwned>(body: Value) -> Result<T> {
    let is_envelope = body
        .as_object()
        .map_or(false, |o| o.get("success").map_or(false, Value::is_boolean)
            && (o.contains_key("data") || o.contains_key("error")));

    if !is_envelope {
        return Ok(serde_json::from_value(body)?);
    }

    let success = body["success"].as_bool().unwrap_or(false);
    if success {
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        return Ok(serde_json::from_value(data)?);
    }

    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    let mut err = VigilError::with_internal(ErrorCode::BackendError, "Backend reported an error", message);
    if let Some(code) = body.get("error_code").and_then(Value::as_str) {
        err = err.with_context("error_code", code);
    }
    Err(err)
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_status(&self) -> Result<ComplianceStatus> {
        self.get("/status").await
    }

    #[instrument(skip(self))]
    async fn fetch_metrics(&self) -> Result<DashboardMetrics> {
        self.get("/metrics").await
    }

    #[instrument(skip(self))]
    async fn fetch_events(&self) -> Result<Vec<ActivityEntry>> {
        self.get("/events").await
    }

    #[instrument(skip(self))]
    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        self.get("/notifications").await
    }

    #[instrument(skip(self))]
    async fn fetch_insights(&self) -> Result<Vec<Insight>> {
        self.get("/insights").await
    }

    #[instrument(skip(self, params))]
    async fn execute_action(&self, action: &str, params: &Value) -> Result<ActionResult> {
        let request = ActionRequest {
            action: action.to_string(),
            params: params.clone(),
        };
        let body = self.post("/actions", &request).await?;
        match body {
            Value::Object(_) => Ok(serde_json::from_value(body)?),
            other => Ok(ActionResult {
                message: None,
                data: other,
            }),
        }
    }

    #[instrument(skip(self, updates))]
    async fn update_config(&self, updates: &Value) -> Result<()> {
        let request = ConfigUpdateRequest {
            updates: updates.clone(),
        };
        self.post("/config", &request).await?;
        Ok(())
    }
}
