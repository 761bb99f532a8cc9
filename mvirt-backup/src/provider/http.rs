//! REST backup provider.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET  /policies`                      -> `[{"id": "...", "name": "..."}]`
//! - `GET  /policies/{id}`                 -> 200 if the policy exists, 404 otherwise
//! - `POST /policies/{id}/assignments`     -> `{"workload_id": "..."}`, 2xx on success,
//!   404/409/422 when the provider rejects the binding

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BackupProvider, ProviderError, Result};
use crate::policy::BackupPolicy;

#[derive(Debug, Deserialize)]
struct RemotePolicy {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct AssignmentRequest<'a> {
    workload_id: &'a str,
}

/// Backup provider reached over HTTP/JSON.
pub struct HttpProvider {
    name: String,
    description: String,
    endpoint: Url,
    token: Option<String>,
    client: Client,
}

impl HttpProvider {
    /// Create a provider for `endpoint`. No request timeout unless one is given.
    pub fn new(
        name: &str,
        description: Option<String>,
        endpoint: &str,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            ProviderError::Protocol(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(ProviderError::Protocol(format!(
                "endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProviderError::Unavailable(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            name: name.to_string(),
            description: description
                .unwrap_or_else(|| format!("REST backup provider at {}", endpoint)),
            endpoint,
            token,
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            warn!(provider = %self.name, error = %e, "Backup provider request failed");
            ProviderError::Unavailable(format!("{}: {}", self.endpoint, e))
        })?;

        if response.status().is_server_error() {
            return Err(ProviderError::Unavailable(format!(
                "{} returned {}",
                response.url(),
                response.status()
            )));
        }
        Ok(response)
    }
}

fn unexpected_status(response: &Response) -> ProviderError {
    ProviderError::Protocol(format!(
        "unexpected status {} from {}",
        response.status(),
        response.url()
    ))
}

#[async_trait]
impl BackupProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn list_policies(&self) -> Result<Vec<BackupPolicy>> {
        let response = self.send(self.client.get(self.url(&["policies"]))).await?;
        if !response.status().is_success() {
            return Err(unexpected_status(&response));
        }

        let policies: Vec<RemotePolicy> = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed policy list: {}", e)))?;

        debug!(provider = %self.name, count = policies.len(), "Listed provider policies");

        Ok(policies
            .into_iter()
            .map(|p| BackupPolicy::external(p.id, p.name))
            .collect())
    }

    async fn is_policy(&self, policy_id: &str) -> Result<bool> {
        let response = self
            .send(self.client.get(self.url(&["policies", policy_id])))
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected_status(&response)),
        }
    }

    async fn assign_workload_to_policy(&self, workload_id: &str, policy_id: &str) -> Result<bool> {
        let request = self
            .client
            .post(self.url(&["policies", policy_id, "assignments"]))
            .json(&AssignmentRequest { workload_id });
        let response = self.send(request).await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(
                    provider = %self.name,
                    workload_id,
                    policy_id,
                    status = %response.status(),
                    "Provider rejected assignment"
                );
                Ok(false)
            }
            _ => Err(unexpected_status(&response)),
        }
    }
}
