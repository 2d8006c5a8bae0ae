//! In-memory fakes for the provisioning API and the page driver.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, serde_json::json};

use crate::{
    cdp::{BrowserConnector, PageDriver},
    error::BrowserError,
    remote::{DeleteOutcome, RemoteSession, SessionApi},
};

#[derive(Default)]
pub(crate) struct FakeApi {
    pub creates: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub create_delay: Duration,
    /// Status of newly created sessions; empty means "RUNNING".
    pub initial_status: String,
    /// Statuses returned by successive `get_session` calls.
    pub poll_statuses: Mutex<VecDeque<String>>,
    pub fail_create: bool,
    pub live_view: Option<String>,
    pub screenshot: Option<Vec<u8>>,
}

impl FakeApi {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn create_session(&self) -> Result<RemoteSession, BrowserError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create {
            return Err(BrowserError::Api {
                status: 500,
                body: "provisioning failed".into(),
            });
        }
        let id = format!("sess-{n}");
        let status = if self.initial_status.is_empty() {
            "RUNNING".to_string()
        } else {
            self.initial_status.clone()
        };
        Ok(RemoteSession {
            connect_url: Some(format!("ws://fake/{id}")),
            id,
            status,
        })
    }

    async fn get_session(&self, id: &str) -> Result<RemoteSession, BrowserError> {
        let status = self
            .poll_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "RUNNING".into());
        Ok(RemoteSession {
            id: id.to_string(),
            status,
            connect_url: None,
        })
    }

    async fn delete_session(&self, id: &str) -> Result<DeleteOutcome, BrowserError> {
        let mut deleted = self.deleted.lock().unwrap();
        let outcome = if deleted.iter().any(|d| d == id) {
            DeleteOutcome::AlreadyGone
        } else {
            DeleteOutcome::Deleted
        };
        deleted.push(id.to_string());
        Ok(outcome)
    }

    async fn live_view_url(&self, _id: &str) -> Result<Option<String>, BrowserError> {
        match &self.live_view {
            Some(url) => Ok(Some(url.clone())),
            None => Err(BrowserError::Api {
                status: 404,
                body: "no debug url".into(),
            }),
        }
    }

    async fn screenshot(&self, _id: &str) -> Result<Vec<u8>, BrowserError> {
        self.screenshot
            .clone()
            .ok_or_else(|| BrowserError::ScreenshotFailed("no screenshot".into()))
    }
}

type EvalFn = dyn Fn(&str) -> Result<serde_json::Value, BrowserError> + Send + Sync;

/// Scriptable page. Scripts are recognized by their leading marker comment.
pub(crate) struct FakeDriver {
    pub url: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    pub disconnects: AtomicUsize,
    pub screenshot_fails: bool,
    pub goto_delay: Duration,
    pub eval: Box<EvalFn>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            url: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            screenshot_fails: false,
            goto_delay: Duration::ZERO,
            eval: Box::new(default_eval),
        }
    }
}

pub(crate) fn default_eval(script: &str) -> Result<serde_json::Value, BrowserError> {
    let value = if script.starts_with("/* pilot:resolve */") {
        json!({ "found": true, "index": 0, "x": 10.0, "y": 20.0 })
    } else if script.starts_with("/* pilot:inputs */") {
        json!([])
    } else if script.starts_with("/* pilot:active-editable */") {
        json!(true)
    } else if script.starts_with("/* pilot:network */") {
        json!({ "readyState": "complete", "resources": 3 })
    } else if script.starts_with("/* pilot:title */") {
        json!("Fake Page")
    } else {
        serde_json::Value::Null
    };
    Ok(value)
}

impl FakeDriver {
    pub fn with_eval(
        eval: impl Fn(&str) -> Result<serde_json::Value, BrowserError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            eval: Box::new(eval),
            ..Default::default()
        }
    }

    pub fn at(url: &str) -> Self {
        let driver = Self::default();
        *driver.url.lock().unwrap() = Some(url.to_string());
        driver
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::ConnectionClosed("fake socket closed".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("goto:{url}"))?;
        if !self.goto_delay.is_zero() {
            tokio::time::sleep(self.goto_delay).await;
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), BrowserError> {
        self.record("load".into())
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::ConnectionClosed("fake socket closed".into()));
        }
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let marker = script
            .strip_prefix("/* ")
            .and_then(|s| s.split_once(" */"))
            .map(|(m, _)| m.to_string())
            .unwrap_or_else(|| "script".into());
        self.record(format!("eval:{marker}"))?;
        (self.eval)(script)
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.record(format!("click:{x},{y}"))
    }

    async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        self.record(format!("type:{text}"))
    }

    async fn press_enter(&self) -> Result<(), BrowserError> {
        self.record("enter".into())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.record("screenshot".into())?;
        if self.screenshot_fails {
            return Err(BrowserError::ScreenshotFailed("capture failed".into()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn disconnect(&self) -> Result<(), BrowserError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same driver for every attach.
pub(crate) struct FakeConnector {
    pub driver: Arc<FakeDriver>,
    pub attaches: AtomicUsize,
    pub fail: bool,
}

impl FakeConnector {
    pub fn new(driver: Arc<FakeDriver>) -> Self {
        Self {
            driver,
            attaches: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn attach(&self, _connect_url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BrowserError::AttachFailed("websocket handshake failed".into()));
        }
        self.driver.closed.store(false, Ordering::SeqCst);
        Ok(Arc::clone(&self.driver) as Arc<dyn PageDriver>)
    }
}
