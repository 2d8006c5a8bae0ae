//! Control connection to a provisioned browser over CDP.
//!
//! The executor talks to the page only through [`PageDriver`], which keeps
//! the DOM strategies testable against a fake page.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    chromiumoxide::{
        Browser, Page,
        cdp::browser_protocol::{
            input::{
                DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
                DispatchMouseEventType, MouseButton,
            },
            page::CaptureScreenshotFormat,
        },
        handler::{HandlerConfig, viewport::Viewport},
        page::ScreenshotParams,
    },
    futures::StreamExt,
    pilot_config::RemoteBrowserConfig,
    tokio::task::JoinHandle,
    tracing::{debug, info},
};

use crate::error::BrowserError;

/// Page-level operations the executor needs.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Start a navigation and wait for it to commit.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait for the current navigation's load event.
    async fn wait_for_load(&self) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<Option<String>, BrowserError>;

    /// Evaluate a script and return its JSON value (`Null` for undefined).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// Left click at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError>;

    /// Send `text` as key events to the focused element.
    async fn type_text(&self, text: &str) -> Result<(), BrowserError>;

    async fn press_enter(&self) -> Result<(), BrowserError>;

    /// Viewport PNG.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Drop the control connection. The remote browser keeps running.
    async fn disconnect(&self) -> Result<(), BrowserError>;
}

/// Opens a control connection for a session's `connect_url`.
#[async_trait]
pub trait BrowserConnector: Send + Sync {
    async fn attach(&self, connect_url: &str) -> Result<Arc<dyn PageDriver>, BrowserError>;
}

/// chromiumoxide-backed connector.
#[derive(Debug, Clone)]
pub struct CdpConnector {
    request_timeout: Duration,
    viewport_width: u32,
    viewport_height: u32,
}

impl From<&RemoteBrowserConfig> for CdpConnector {
    fn from(cfg: &RemoteBrowserConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
            viewport_width: cfg.viewport_width,
            viewport_height: cfg.viewport_height,
        }
    }
}

#[async_trait]
impl BrowserConnector for CdpConnector {
    async fn attach(&self, connect_url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let handler_config = HandlerConfig {
            request_timeout: self.request_timeout,
            viewport: Some(Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            }),
            ..Default::default()
        };

        let (mut browser, mut handler) = Browser::connect_with_config(connect_url, handler_config)
            .await
            .map_err(|e| BrowserError::AttachFailed(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = Arc::clone(&closed);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "remote browser handler error");
                }
            }
            closed_flag.store(true, Ordering::SeqCst);
            debug!("remote browser event handler exited (connection closed)");
        });

        let page = match open_page(&mut browser).await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e);
            },
        };

        info!(connect_url = %redact_connect_url(connect_url), "attached to remote browser");
        Ok(Arc::new(CdpPage {
            _browser: browser,
            page,
            handler_task,
            closed,
        }))
    }
}

/// Reuse the session's first page, otherwise open a blank one.
async fn open_page(browser: &mut Browser) -> Result<Page, BrowserError> {
    browser
        .fetch_targets()
        .await
        .map_err(|e| BrowserError::AttachFailed(format!("failed to list targets: {e}")))?;
    // Targets attach asynchronously after the fetch.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let pages = browser
        .pages()
        .await
        .map_err(|e| BrowserError::AttachFailed(e.to_string()))?;
    if let Some(page) = pages.into_iter().next() {
        debug!("reusing existing remote page");
        return Ok(page);
    }
    browser
        .new_page("about:blank")
        .await
        .map_err(|e| BrowserError::AttachFailed(format!("failed to open page: {e}")))
}

/// Connect URLs carry a signing token in the query string.
fn redact_connect_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}

struct CdpPage {
    _browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl CdpPage {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::ConnectionClosed(
                "control connection dropped".into(),
            ));
        }
        Ok(())
    }

    /// Map a CDP failure, preferring `ConnectionClosed` once the handler died.
    fn map_err(&self, err: chromiumoxide::error::CdpError) -> BrowserError {
        if self.closed.load(Ordering::SeqCst) {
            return BrowserError::ConnectionClosed(err.to_string());
        }
        BrowserError::from(err)
    }

    async fn key_event(
        &self,
        kind: DispatchKeyEventType,
        key: Option<&str>,
        text: Option<String>,
    ) -> Result<(), BrowserError> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind);
        if let Some(key) = key {
            builder = builder.key(key).code(key).windows_virtual_key_code(13);
        }
        if let Some(text) = text {
            builder = builder.text(text);
        }
        let cmd = builder.build().map_err(BrowserError::Cdp)?;
        self.page.execute(cmd).await.map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn mouse_event(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> Result<(), BrowserError> {
        let cmd = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(BrowserError::Cdp)?;
        self.page.execute(cmd).await.map_err(|e| self.map_err(e))?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.page.goto(url).await.map_err(|e| match self.map_err(e) {
            BrowserError::Cdp(msg) => BrowserError::NavigationFailed(msg),
            other => other,
        })?;
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        self.ensure_open()?;
        self.page.url().await.map_err(|e| self.map_err(e))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| match self.map_err(e) {
                BrowserError::Cdp(msg) => BrowserError::JsEvalFailed(msg),
                other => other,
            })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.mouse_event(DispatchMouseEventType::MouseMoved, x, y)
            .await?;
        self.mouse_event(DispatchMouseEventType::MousePressed, x, y)
            .await?;
        self.mouse_event(DispatchMouseEventType::MouseReleased, x, y)
            .await
    }

    async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        for c in text.chars() {
            self.key_event(DispatchKeyEventType::KeyDown, None, Some(c.to_string()))
                .await?;
            self.key_event(DispatchKeyEventType::KeyUp, None, None)
                .await?;
        }
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.key_event(
            DispatchKeyEventType::KeyDown,
            Some("Enter"),
            Some("\r".to_string()),
        )
        .await?;
        self.key_event(DispatchKeyEventType::KeyUp, Some("Enter"), None)
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.ensure_open()?;
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .map_err(|e| match self.map_err(e) {
                BrowserError::Cdp(msg) => BrowserError::ScreenshotFailed(msg),
                other => other,
            })
    }

    async fn disconnect(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        self.handler_task.abort();
        debug!("control connection dropped");
        Ok(())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_url_token_is_redacted() {
        assert_eq!(
            redact_connect_url("wss://connect.example.com?signingKey=abc"),
            "wss://connect.example.com?…"
        );
        assert_eq!(redact_connect_url("ws://127.0.0.1:9222"), "ws://127.0.0.1:9222");
    }

    #[test]
    fn connector_takes_remote_settings() {
        let cfg = RemoteBrowserConfig {
            request_timeout_ms: 1500,
            viewport_width: 1024,
            ..Default::default()
        };
        let connector = CdpConnector::from(&cfg);
        assert_eq!(connector.request_timeout, Duration::from_millis(1500));
        assert_eq!(connector.viewport_width, 1024);
        assert_eq!(connector.viewport_height, 800);
    }

    #[tokio::test]
    async fn attach_to_unreachable_endpoint_fails() {
        let connector = CdpConnector::from(&RemoteBrowserConfig::default());
        let result = connector.attach("ws://127.0.0.1:1/devtools/browser/x").await;
        assert!(matches!(result, Err(BrowserError::AttachFailed(_))));
    }
}
