//! Shared fixtures: a mockito provisioning API and an in-memory page.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    pilot_browser::{BrowserConnector, BrowserError, HttpSessionApi, PageDriver, SessionApi},
    pilot_config::PilotConfig,
    pilot_gateway::{BrowserServices, GatewayState, build_gateway_app},
    pilot_planner::CommandParser,
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::net::TcpListener,
};

/// Page that records calls and answers every probe script with a plausible
/// value.
#[derive(Default)]
pub struct FakePage {
    pub url: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    pub goto_delay: Duration,
}

impl FakePage {
    pub fn slow(goto_delay: Duration) -> Self {
        Self {
            goto_delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::ConnectionClosed("test socket closed".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakePage {
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
            return Err(BrowserError::ConnectionClosed("test socket closed".into()));
        }
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.record("eval".into())?;
        let value = if script.starts_with("/* pilot:resolve */") {
            json!({ "found": true, "index": 0, "x": 5.0, "y": 5.0 })
        } else if script.starts_with("/* pilot:network */") {
            json!({ "readyState": "complete", "resources": 1 })
        } else if script.starts_with("/* pilot:title */") {
            json!("Test Page")
        } else if script.starts_with("/* pilot:inputs */") {
            json!([])
        } else {
            Value::Null
        };
        Ok(value)
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
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn disconnect(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeConnector {
    pub page: Arc<FakePage>,
    pub attaches: AtomicUsize,
}

impl FakeConnector {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            page,
            attaches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn attach(&self, _connect_url: &str) -> Result<Arc<dyn PageDriver>, BrowserError> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.page.closed.store(false, Ordering::SeqCst);
        Ok(Arc::clone(&self.page) as Arc<dyn PageDriver>)
    }
}

/// Config pointing the provisioning API at `api_url`, with no planner model
/// and no settle delays.
pub fn test_config(api_url: &str, with_key: bool) -> PilotConfig {
    let mut cfg = PilotConfig::default();
    cfg.remote.api_url = api_url.to_string();
    cfg.remote.project_id = Some("proj-test".into());
    cfg.remote.api_key = with_key.then(|| Secret::new("bb-test".to_string()));
    cfg.remote.start_poll_interval_ms = 10;
    cfg.planner.enabled = false;
    cfg.executor.settle_delay_ms = 0;
    cfg.executor.load_timeout_ms = 200;
    cfg.executor.network_idle_timeout_ms = 200;
    cfg.executor.network_quiet_ms = 10;
    cfg.executor.fallback_delay_ms = 10;
    cfg
}

pub fn services(cfg: &PilotConfig, page: Arc<FakePage>) -> Arc<BrowserServices> {
    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(&cfg.remote));
    let connector: Arc<dyn BrowserConnector> = FakeConnector::new(page);
    Arc::new(BrowserServices::with_collaborators(
        cfg,
        api,
        connector,
        CommandParser::fallback_only(),
    ))
}

/// Mock `POST /sessions` returning a running session `id`.
pub async fn mock_create(server: &mut mockito::ServerGuard, id: &str) -> mockito::Mock {
    server
        .mock("POST", "/sessions")
        .match_header("x-bb-api-key", "bb-test")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "id": id, "status": "RUNNING", "connectUrl": format!("wss://connect/{id}") })
                .to_string(),
        )
        .create_async()
        .await
}

pub async fn mock_debug(server: &mut mockito::ServerGuard, id: &str) -> mockito::Mock {
    server
        .mock("GET", format!("/sessions/{id}/debug").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "debuggerFullscreenUrl": format!("https://live/{id}") }).to_string())
        .create_async()
        .await
}

pub async fn mock_delete(
    server: &mut mockito::ServerGuard,
    id: &str,
    status: usize,
) -> mockito::Mock {
    server
        .mock("DELETE", format!("/sessions/{id}").as_str())
        .with_status(status)
        .create_async()
        .await
}

/// Serve the gateway on an ephemeral port.
pub async fn start_server(services: Arc<BrowserServices>) -> (SocketAddr, Arc<GatewayState>) {
    let state = GatewayState::new(services);
    let app = build_gateway_app(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// Wait up to two seconds for `mock` to be hit.
pub async fn wait_until_matched(mock: &mockito::Mock) -> bool {
    for _ in 0..100 {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
