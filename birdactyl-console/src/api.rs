//! Panel REST client
//!
//! The console uses a handful of endpoints: power actions, the server
//! record, the caller's permissions on it, and the current status. Every
//! response is wrapped in an [`ApiEnvelope`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use birdactyl_protocol::{
    permissions, ApiEnvelope, PowerAction, Server, ServerId, StatusResponse, API_PREFIX,
};
use birdactyl_utils::{ConsoleError, Result};

/// Connect timeout for REST calls; overall deadlines are set by callers
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the console needs from the panel
#[async_trait]
pub trait PanelApi: Send + Sync {
    /// `POST /servers/{id}/{action}`
    async fn power(&self, server_id: ServerId, action: PowerAction) -> Result<()>;

    async fn get_server(&self, server_id: ServerId) -> Result<Server>;

    /// Permission names granted to the caller on this server
    async fn get_permissions(&self, server_id: ServerId) -> Result<Vec<String>>;

    async fn get_status(&self, server_id: ServerId) -> Result<StatusResponse>;
}

/// `can(permission)` check for the current user
pub trait PermissionOracle: Send + Sync {
    fn can(&self, permission: &str) -> bool;
}

/// Permission list as returned by the panel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(Vec<String>);

impl PermissionSet {
    pub fn new(granted: Vec<String>) -> Self {
        Self(granted)
    }

    /// Grants everything
    pub fn admin() -> Self {
        Self(vec![permissions::ADMIN.to_string()])
    }

    pub fn granted(&self) -> &[String] {
        &self.0
    }
}

impl PermissionOracle for PermissionSet {
    fn can(&self, permission: &str) -> bool {
        permissions::has_permission(&self.0, permission)
    }
}

/// [`PanelApi`] over HTTP with a bearer token
pub struct HttpPanelApi {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpPanelApi {
    pub fn new(base_url: Url, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConsoleError::http(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// `{base}/api/v1/servers/{id}{suffix}`
    fn server_url(&self, server_id: ServerId, suffix: &str) -> String {
        format!(
            "{}{}/servers/{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            API_PREFIX,
            server_id,
            suffix
        )
    }

    /// Send a request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ConsoleError::http(e.to_string()))?;
        let status = resp.status();

        let envelope = match resp.json::<ApiEnvelope<T>>().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(ConsoleError::protocol(format!("malformed panel response: {}", e)))
            }
            Err(_) => {
                return Err(ConsoleError::Api {
                    status: status.as_u16(),
                    message: status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string(),
                })
            }
        };

        envelope.into_result().map_err(|message| ConsoleError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, server_id: ServerId, suffix: &str) -> Result<T> {
        let url = self.server_url(server_id, suffix);
        tracing::debug!(%url, "GET");
        self.call(self.http.get(url))
            .await?
            .ok_or_else(|| ConsoleError::protocol("panel response carried no data"))
    }
}

#[async_trait]
impl PanelApi for HttpPanelApi {
    async fn power(&self, server_id: ServerId, action: PowerAction) -> Result<()> {
        let url = self.server_url(server_id, &format!("/{}", action.as_str()));
        tracing::debug!(%url, "POST");
        self.call::<serde_json::Value>(self.http.post(url))
            .await
            .map(|_| ())
    }

    async fn get_server(&self, server_id: ServerId) -> Result<Server> {
        self.fetch(server_id, "").await
    }

    async fn get_permissions(&self, server_id: ServerId) -> Result<Vec<String>> {
        self.fetch(server_id, "/permissions").await
    }

    async fn get_status(&self, server_id: ServerId) -> Result<StatusResponse> {
        self.fetch(server_id, "/status").await
    }
}
