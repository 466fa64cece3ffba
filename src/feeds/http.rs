//! HTTP implementation of [`DashboardApi`] against the patrol backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::DashboardApi;
use crate::error::{SyncError, SyncResult};
use crate::model::SourceKind;
use crate::session::CredentialProvider;

pub struct HttpDashboardApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    check_in_limit: usize,
    incident_feed_limit: usize,
}

impl HttpDashboardApi {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("patrol_sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            check_in_limit: 20,
            incident_feed_limit: 50,
        })
    }

    pub fn with_limits(mut self, check_in_limit: usize, incident_feed_limit: usize) -> Self {
        self.check_in_limit = check_in_limit;
        self.incident_feed_limit = incident_feed_limit;
        self
    }

    pub fn endpoint(&self, source: SourceKind) -> String {
        let path = match source {
            SourceKind::Patrols => "/patrols/active".to_string(),
            SourceKind::IncidentStats => "/incidents/stats".to_string(),
            SourceKind::RiskZones => "/risk-zones".to_string(),
            SourceKind::CheckIns => format!("/check-ins/recent?limit={}", self.check_in_limit),
            SourceKind::Incidents => format!("/incidents/feed?limit={}", self.incident_feed_limit),
        };
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn fetch(&self, source: SourceKind) -> SyncResult<Value> {
        let url = self.endpoint(source);
        debug!(source = %source, url = %url, "Fetching source");

        let mut request = self.client.get(&url);
        if let Some(token) = self.credentials.current_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status { endpoint: url, status: status.as_u16() });
        }
        Ok(response.json::<Value>().await?)
    }
}
