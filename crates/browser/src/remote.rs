//! REST client for the remote session-provisioning API.

use std::time::Duration;

use {
    async_trait::async_trait,
    pilot_config::RemoteBrowserConfig,
    reqwest::{Method, RequestBuilder, StatusCode},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::error::BrowserError;

const API_KEY_HEADER: &str = "X-BB-API-Key";

/// Session record as reported by the provisioning API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// Only guaranteed on the create response.
    #[serde(default)]
    pub connect_url: Option<String>,
}

/// Result of a delete; a session that no longer exists counts as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugUrls {
    #[serde(default)]
    debugger_fullscreen_url: Option<String>,
    #[serde(default)]
    debugger_url: Option<String>,
}

/// Provisioning operations used by the session manager and executor.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self) -> Result<RemoteSession, BrowserError>;

    async fn get_session(&self, id: &str) -> Result<RemoteSession, BrowserError>;

    async fn delete_session(&self, id: &str) -> Result<DeleteOutcome, BrowserError>;

    /// Human-viewable live URL for the session, if the API exposes one.
    async fn live_view_url(&self, id: &str) -> Result<Option<String>, BrowserError>;

    /// PNG screenshot rendered by the provider.
    async fn screenshot(&self, id: &str) -> Result<Vec<u8>, BrowserError>;
}

/// Browser settings sent when a session is created.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub keep_alive: bool,
    pub timeout_secs: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub args: Vec<String>,
}

impl From<&RemoteBrowserConfig> for CreateSessionParams {
    fn from(cfg: &RemoteBrowserConfig) -> Self {
        Self {
            keep_alive: cfg.keep_alive,
            timeout_secs: cfg.session_timeout_secs,
            viewport_width: cfg.viewport_width,
            viewport_height: cfg.viewport_height,
            args: cfg.stealth_args.clone(),
        }
    }
}

/// reqwest implementation of [`SessionApi`].
///
/// Credentials are checked per call so a process started without them still
/// serves requests and reports a clear error for browser commands.
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<Secret<String>>,
    project_id: Option<String>,
    params: CreateSessionParams,
}

impl HttpSessionApi {
    pub fn new(cfg: &RemoteBrowserConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            project_id: cfg.project_id.clone(),
            params: CreateSessionParams::from(cfg),
        }
    }

    fn api_key(&self) -> Result<&str, BrowserError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BrowserError::NotConfigured("BROWSERBASE_API_KEY is not set".into()))
    }

    fn project_id(&self) -> Result<&str, BrowserError> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                BrowserError::NotConfigured("BROWSERBASE_PROJECT_ID is not set".into())
            })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BrowserError> {
        let key = self.api_key()?;
        Ok(self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, key))
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, BrowserError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "session API error");
        Err(BrowserError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(&self) -> Result<RemoteSession, BrowserError> {
        let project_id = self.project_id()?;
        let body = serde_json::json!({
            "projectId": project_id,
            "keepAlive": self.params.keep_alive,
            "timeout": self.params.timeout_secs,
            "browserSettings": {
                "viewport": {
                    "width": self.params.viewport_width,
                    "height": self.params.viewport_height,
                },
                "args": self.params.args,
            },
        });

        let resp = Self::send(self.request(Method::POST, "/sessions")?.json(&body)).await?;
        let session: RemoteSession = resp
            .json()
            .await
            .map_err(|e| BrowserError::Http(format!("invalid create-session response: {e}")))?;
        debug!(session_id = %session.id, status = %session.status, "remote session created");
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<RemoteSession, BrowserError> {
        let resp = Self::send(self.request(Method::GET, &format!("/sessions/{id}"))?).await?;
        resp.json()
            .await
            .map_err(|e| BrowserError::Http(format!("invalid session response: {e}")))
    }

    async fn delete_session(&self, id: &str) -> Result<DeleteOutcome, BrowserError> {
        let resp = self
            .request(Method::DELETE, &format!("/sessions/{id}"))?
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(session_id = id, "remote session already gone");
            return Ok(DeleteOutcome::AlreadyGone);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrowserError::Api {
                status: status.as_u16(),
                body,
            });
        }
        debug!(session_id = id, "remote session deleted");
        Ok(DeleteOutcome::Deleted)
    }

    async fn live_view_url(&self, id: &str) -> Result<Option<String>, BrowserError> {
        let resp =
            Self::send(self.request(Method::GET, &format!("/sessions/{id}/debug"))?).await?;
        let urls: DebugUrls = resp
            .json()
            .await
            .map_err(|e| BrowserError::Http(format!("invalid debug response: {e}")))?;
        Ok(urls.debugger_fullscreen_url.or(urls.debugger_url))
    }

    async fn screenshot(&self, id: &str) -> Result<Vec<u8>, BrowserError> {
        let resp =
            Self::send(self.request(Method::GET, &format!("/sessions/{id}/screenshot"))?).await?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(BrowserError::ScreenshotFailed(
                "provider returned an empty screenshot".into(),
            ));
        }
        Ok(bytes.to_vec())
    }
}
