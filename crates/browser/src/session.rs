//! Lifecycle of the single remote browser session owned by an orchestrator.

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    pilot_config::RemoteBrowserConfig,
    tokio::{
        sync::{Mutex, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    cdp::{BrowserConnector, PageDriver},
    error::BrowserError,
    remote::{DeleteOutcome, SessionApi},
    types::{Session, SessionStatus},
};

/// Polling bounds for a session that is still starting.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RemoteBrowserConfig::default())
    }
}

impl From<&RemoteBrowserConfig> for SessionSettings {
    fn from(cfg: &RemoteBrowserConfig) -> Self {
        Self {
            poll_attempts: cfg.start_poll_attempts,
            poll_interval: Duration::from_millis(cfg.start_poll_interval_ms),
        }
    }
}

/// Shared reference to a live session and its control connection.
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    state: Arc<RwLock<Session>>,
    driver: Arc<dyn PageDriver>,
}

impl SessionHandle {
    fn new(session: Session, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            id: Arc::from(session.id.as_str()),
            state: Arc::new(RwLock::new(session)),
            driver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.status != SessionStatus::Terminated
    }

    /// Record a successful action.
    pub async fn touch(&self) {
        self.state.write().await.last_activity_at = Utc::now();
    }

    pub async fn set_current_url(&self, url: Option<String>) {
        if url.is_some() {
            self.state.write().await.current_url = url;
        }
    }

    pub async fn set_live_view_url(&self, url: String) {
        self.state.write().await.live_view_url = Some(url);
    }

    /// Mark the session unusable. The manager releases it on next access.
    pub async fn terminate(&self) {
        self.state.write().await.status = SessionStatus::Terminated;
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

type CreateFuture = Shared<BoxFuture<'static, Result<SessionHandle, Arc<BrowserError>>>>;

#[derive(Default)]
struct Inner {
    active: Option<SessionHandle>,
    inflight: Option<CreateFuture>,
    /// Bumped by every close so a creation racing it can tell it lost.
    generation: u64,
}

/// Owns at most one remote session: creates it on demand (single-flight),
/// reuses it across commands, and tears it down idempotently.
pub struct SessionManager {
    api: Arc<dyn SessionApi>,
    connector: Arc<dyn BrowserConnector>,
    settings: SessionSettings,
    inner: Arc<Mutex<Inner>>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn SessionApi>,
        connector: Arc<dyn BrowserConnector>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            api,
            connector,
            settings,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn api(&self) -> &Arc<dyn SessionApi> {
        &self.api
    }

    /// Return the live session, creating one if needed.
    ///
    /// Concurrent callers share one creation; a failed creation is reported
    /// to all of them and the next call starts over.
    pub async fn ensure_active(&self) -> Result<SessionHandle, BrowserError> {
        let creation = {
            let mut inner = self.inner.lock().await;
            if let Some(handle) = inner.active.clone() {
                if handle.is_active().await {
                    return Ok(handle);
                }
                inner.active = None;
                debug!(session_id = handle.id(), "discarding terminated session");
                spawn_release(Arc::clone(&self.api), handle);
            }
            match &inner.inflight {
                Some(creation) => creation.clone(),
                None => {
                    let creation = self.spawn_create(inner.generation);
                    inner.inflight = Some(creation.clone());
                    creation
                },
            }
        };

        creation.await.map_err(|e| match e.as_ref() {
            BrowserError::Superseded => BrowserError::Superseded,
            other => BrowserError::Shared(other.to_string()),
        })
    }

    fn spawn_create(&self, generation: u64) -> CreateFuture {
        let api = Arc::clone(&self.api);
        let connector = Arc::clone(&self.connector);
        let settings = self.settings.clone();
        let inner = Arc::clone(&self.inner);

        // Spawned so a cancelled waiter never abandons a half-created session.
        let task = tokio::spawn(async move {
            let result = provision(api.as_ref(), connector.as_ref(), &settings).await;
            let mut guard = inner.lock().await;
            if guard.generation != generation {
                drop(guard);
                if let Ok(handle) = result {
                    info!(
                        session_id = handle.id(),
                        "session closed during creation, releasing"
                    );
                    spawn_release(api, handle);
                }
                return Err(Arc::new(BrowserError::Superseded));
            }
            guard.inflight = None;
            match result {
                Ok(handle) => {
                    guard.active = Some(handle.clone());
                    Ok(handle)
                },
                Err(e) => Err(Arc::new(e)),
            }
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(Arc::new(BrowserError::Shared(format!(
                    "session creation task failed: {e}"
                ))))
            })
        }
        .boxed()
        .shared()
    }

    /// Tear down the current session. Idempotent; errors are logged only.
    /// Returns the id of the session that was closed, if any.
    pub async fn close(&self) -> Option<String> {
        let handle = self.take_active().await?;
        let id = handle.id().to_string();
        release(self.api.as_ref(), handle).await;
        Some(id)
    }

    /// Start a teardown without waiting for it.
    pub async fn begin_release(&self) -> Option<JoinHandle<()>> {
        let handle = self.take_active().await?;
        Some(spawn_release(Arc::clone(&self.api), handle))
    }

    /// Delete a session by id. Closes it locally when it is ours.
    pub async fn close_remote(&self, session_id: &str) -> Result<DeleteOutcome, BrowserError> {
        let owned = {
            let inner = self.inner.lock().await;
            inner
                .active
                .as_ref()
                .is_some_and(|handle| handle.id() == session_id)
        };
        if owned {
            self.close().await;
            return Ok(DeleteOutcome::Deleted);
        }
        self.api.delete_session(session_id).await
    }

    /// Tear down `session_id` after its control connection was lost.
    pub async fn invalidate(&self, session_id: &str) {
        let handle = {
            let mut inner = self.inner.lock().await;
            match &inner.active {
                Some(handle) if handle.id() == session_id => inner.active.take(),
                _ => None,
            }
        };
        if let Some(handle) = handle {
            warn!(session_id, "control connection lost, invalidating session");
            release(self.api.as_ref(), handle).await;
        }
    }

    pub async fn status(&self) -> Option<Session> {
        let handle = self.inner.lock().await.active.clone()?;
        Some(handle.snapshot().await)
    }

    pub async fn has_session(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }

    async fn take_active(&self) -> Option<SessionHandle> {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.inflight = None;
        inner.active.take()
    }
}

/// Create, await startup, and attach. Any failure after creation deletes the
/// remote session so nothing is left half-open.
async fn provision(
    api: &dyn SessionApi,
    connector: &dyn BrowserConnector,
    settings: &SessionSettings,
) -> Result<SessionHandle, BrowserError> {
    let created = api.create_session().await?;
    let id = created.id.clone();
    let mut connect_url = created.connect_url;
    let mut status = if created.status.is_empty() {
        SessionStatus::Starting
    } else {
        SessionStatus::from_remote(&created.status)
    };
    info!(session_id = %id, status = %status, "remote session created");

    let mut polls = 0;
    while status == SessionStatus::Starting {
        if polls >= settings.poll_attempts {
            delete_quietly(api, &id).await;
            return Err(BrowserError::SessionStart {
                id,
                reason: format!("still starting after {polls} status checks"),
            });
        }
        tokio::time::sleep(settings.poll_interval).await;
        polls += 1;
        match api.get_session(&id).await {
            Ok(remote) => {
                status = SessionStatus::from_remote(&remote.status);
                connect_url = connect_url.or(remote.connect_url);
                debug!(session_id = %id, status = %status, poll = polls, "polled session status");
            },
            Err(e) => {
                delete_quietly(api, &id).await;
                return Err(e);
            },
        }
    }

    if !status.is_live() {
        delete_quietly(api, &id).await;
        return Err(BrowserError::SessionStart {
            id,
            reason: format!("remote session is {status}"),
        });
    }

    let Some(connect_url) = connect_url.filter(|u| !u.is_empty()) else {
        delete_quietly(api, &id).await;
        return Err(BrowserError::SessionStart {
            id,
            reason: "no connect URL in session response".into(),
        });
    };

    let driver = match connector.attach(&connect_url).await {
        Ok(driver) => driver,
        Err(e) => {
            warn!(session_id = %id, error = %e, "attach failed, deleting remote session");
            delete_quietly(api, &id).await;
            return Err(e);
        },
    };

    let live_view_url = match api.live_view_url(&id).await {
        Ok(url) => url,
        Err(e) => {
            warn!(session_id = %id, error = %e, "failed to fetch live view URL");
            None
        },
    };

    let now = Utc::now();
    info!(session_id = %id, "browser session ready");
    Ok(SessionHandle::new(
        Session {
            id,
            status,
            connect_url,
            live_view_url,
            current_url: None,
            created_at: now,
            last_activity_at: now,
        },
        driver,
    ))
}

/// Terminate, disconnect, delete. Local state is already detached by the
/// caller; nothing here can fail.
async fn release(api: &dyn SessionApi, handle: SessionHandle) {
    handle.terminate().await;
    if let Err(e) = handle.driver().disconnect().await {
        warn!(session_id = handle.id(), error = %e, "failed to disconnect control connection");
    }
    delete_quietly(api, handle.id()).await;
}

fn spawn_release(api: Arc<dyn SessionApi>, handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move { release(api.as_ref(), handle).await })
}

async fn delete_quietly(api: &dyn SessionApi, id: &str) {
    match api.delete_session(id).await {
        Ok(DeleteOutcome::Deleted) => info!(session_id = id, "remote session released"),
        Ok(DeleteOutcome::AlreadyGone) => debug!(session_id = id, "remote session already gone"),
        Err(e) => warn!(session_id = id, error = %e, "failed to delete remote session"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeApi, FakeConnector, FakeDriver},
        std::sync::atomic::Ordering,
    };

    fn manager(api: FakeApi) -> (SessionManager, Arc<FakeApi>, Arc<FakeConnector>) {
        manager_with(api, FakeConnector::new(Arc::new(FakeDriver::default())))
    }

    fn manager_with(
        api: FakeApi,
        connector: FakeConnector,
    ) -> (SessionManager, Arc<FakeApi>, Arc<FakeConnector>) {
        let api = Arc::new(api);
        let connector = Arc::new(connector);
        let settings = SessionSettings {
            poll_attempts: 3,
            poll_interval: Duration::from_millis(10),
        };
        let mgr = SessionManager::new(
            Arc::clone(&api) as Arc<dyn SessionApi>,
            Arc::clone(&connector) as Arc<dyn BrowserConnector>,
            settings,
        );
        (mgr, api, connector)
    }

    #[tokio::test]
    async fn ensure_active_reuses_session() {
        let (mgr, api, _) = manager(FakeApi {
            live_view: Some("https://live/1".into()),
            ..Default::default()
        });
        let first = mgr.ensure_active().await.unwrap();
        let second = mgr.ensure_active().await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);

        let session = mgr.status().await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.live_view_url.as_deref(), Some("https://live/1"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_creation() {
        let (mgr, api, connector) = manager(FakeApi {
            create_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let mgr = Arc::new(mgr);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            tasks.push(tokio::spawn(async move { mgr.ensure_active().await }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id().to_string());
        }
        assert!(ids.iter().all(|id| id == "sess-1"));
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);
        assert_eq!(connector.attaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mgr, api, connector) = manager(FakeApi::default());
        mgr.ensure_active().await.unwrap();

        assert_eq!(mgr.close().await.as_deref(), Some("sess-1"));
        assert_eq!(mgr.close().await, None);
        assert!(mgr.status().await.is_none());
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
        assert_eq!(connector.driver.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminated_session_is_never_reused() {
        let (mgr, api, _) = manager(FakeApi::default());
        let first = mgr.ensure_active().await.unwrap();
        first.terminate().await;

        let second = mgr.ensure_active().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn attach_failure_deletes_remote_session() {
        let mut connector = FakeConnector::new(Arc::new(FakeDriver::default()));
        connector.fail = true;
        let (mgr, api, _) = manager_with(FakeApi::default(), connector);

        let err = mgr.ensure_active().await.unwrap_err();
        assert!(err.to_string().contains("attach"));
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
        assert!(mgr.status().await.is_none());
    }

    #[tokio::test]
    async fn failed_creation_allows_retry() {
        let (mgr, api, _) = manager(FakeApi {
            fail_create: true,
            ..Default::default()
        });
        let err = mgr.ensure_active().await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(mgr.ensure_active().await.is_err());
        assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn starting_session_is_polled_until_running() {
        let (mgr, _, _) = manager(FakeApi {
            initial_status: "PENDING".into(),
            poll_statuses: std::sync::Mutex::new(
                ["PENDING", "RUNNING"].map(String::from).into(),
            ),
            ..Default::default()
        });
        let handle = mgr.ensure_active().await.unwrap();
        assert!(handle.is_active().await);
    }

    #[tokio::test]
    async fn session_that_never_starts_is_deleted() {
        let (mgr, api, _) = manager(FakeApi {
            initial_status: "PENDING".into(),
            poll_statuses: std::sync::Mutex::new(["PENDING"; 5].map(String::from).into()),
            ..Default::default()
        });
        let err = mgr.ensure_active().await.unwrap_err();
        assert!(err.to_string().contains("still starting"));
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
    }

    #[tokio::test]
    async fn close_during_creation_releases_new_session() {
        let (mgr, api, _) = manager(FakeApi {
            create_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let mgr = Arc::new(mgr);
        let pending = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.ensure_active().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mgr.close().await, None);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(BrowserError::Superseded)));
        // Background release runs after the creation completes.
        for _ in 0..50 {
            if !api.deleted().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
        assert!(mgr.status().await.is_none());
    }

    #[tokio::test]
    async fn close_remote_for_foreign_session_calls_api() {
        let (mgr, api, _) = manager(FakeApi::default());
        assert_eq!(
            mgr.close_remote("other").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            mgr.close_remote("other").await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
        assert_eq!(api.deleted().len(), 2);
    }

    #[tokio::test]
    async fn invalidate_only_touches_matching_session() {
        let (mgr, api, _) = manager(FakeApi::default());
        mgr.ensure_active().await.unwrap();
        mgr.invalidate("unrelated").await;
        assert!(mgr.has_session().await);
        mgr.invalidate("sess-1").await;
        assert!(!mgr.has_session().await);
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
    }

    #[tokio::test]
    async fn begin_release_returns_join_handle() {
        let (mgr, api, _) = manager(FakeApi::default());
        assert!(mgr.begin_release().await.is_none());
        mgr.ensure_active().await.unwrap();
        mgr.begin_release().await.unwrap().await.unwrap();
        assert_eq!(api.deleted(), vec!["sess-1".to_string()]);
    }
}
