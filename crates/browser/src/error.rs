//! Browser error types.

use thiserror::Error;

/// Errors that can occur while provisioning, controlling, or driving a
/// remote browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("remote browser not configured: {0}")]
    NotConfigured(String),

    #[error("session API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("session API request failed: {0}")]
    Http(String),

    #[error("session {id} did not start: {reason}")]
    SessionStart { id: String, reason: String },

    #[error("failed to attach to remote browser: {0}")]
    AttachFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("cancelled")]
    Cancelled,

    #[error("session was closed while it was being created")]
    Superseded,

    #[error("{0}")]
    Shared(String),
}

impl BrowserError {
    /// Whether another attempt of the same action could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NavigationFailed(_)
                | Self::ElementNotFound(_)
                | Self::JsEvalFailed(_)
                | Self::ScreenshotFailed(_)
                | Self::Timeout(_)
                | Self::Cdp(_)
        )
    }

    /// The control connection is gone; the session cannot be used further.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionClosed(_) => true,
            Self::Cdp(msg) => msg.contains("AlreadyClosed") || msg.contains("ConnectionClosed"),
            _ => false,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let msg = err.to_string();
        if msg.contains("AlreadyClosed") || msg.contains("ConnectionClosed") {
            BrowserError::ConnectionClosed(msg)
        } else {
            BrowserError::Cdp(msg)
        }
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserError::Timeout(err.to_string())
        } else {
            BrowserError::Http(err.to_string())
        }
    }
}
