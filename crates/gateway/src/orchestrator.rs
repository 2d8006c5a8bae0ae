//! One orchestrator per conversation: detector → parser → session →
//! executor → aggregator.

use std::sync::Arc;

use {
    pilot_browser::{
        ActionExecutor, BrowserConnector, BrowserError, CdpConnector, CommandResponse,
        DeleteOutcome, ExecutorSettings, HttpSessionApi, Session, SessionApi, SessionManager,
        SessionSettings, aggregate,
    },
    pilot_config::PilotConfig,
    pilot_planner::{CommandParser, Intent, IntentDetector},
    tokio::{sync::Mutex, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

/// Collaborators shared by every orchestrator in the process.
pub struct BrowserServices {
    pub detector: IntentDetector,
    pub parser: CommandParser,
    pub api: Arc<dyn SessionApi>,
    pub connector: Arc<dyn BrowserConnector>,
    pub session_settings: SessionSettings,
    pub executor: ActionExecutor,
}

impl BrowserServices {
    /// Production wiring: HTTP provisioning API, CDP attach, configured model.
    pub fn from_config(cfg: &PilotConfig) -> Self {
        let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(&cfg.remote));
        let connector: Arc<dyn BrowserConnector> = Arc::new(CdpConnector::from(&cfg.remote));
        Self::with_collaborators(cfg, api, connector, CommandParser::from_config(&cfg.planner))
    }

    pub fn with_collaborators(
        cfg: &PilotConfig,
        api: Arc<dyn SessionApi>,
        connector: Arc<dyn BrowserConnector>,
        parser: CommandParser,
    ) -> Self {
        Self {
            detector: IntentDetector::from(&cfg.intent),
            parser,
            executor: ActionExecutor::new(
                ExecutorSettings::from(&cfg.executor),
                Arc::clone(&api),
            ),
            session_settings: SessionSettings::from(&cfg.remote),
            api,
            connector,
        }
    }
}

struct Running {
    seq: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct CommandSlot {
    next_seq: u64,
    running: Option<Running>,
}

/// Drives one remote browser session for one chat.
pub struct Orchestrator {
    chat_id: String,
    services: Arc<BrowserServices>,
    sessions: SessionManager,
    slot: Mutex<CommandSlot>,
}

impl Orchestrator {
    pub fn new(chat_id: impl Into<String>, services: Arc<BrowserServices>) -> Self {
        let sessions = SessionManager::new(
            Arc::clone(&services.api),
            Arc::clone(&services.connector),
            services.session_settings.clone(),
        );
        Self {
            chat_id: chat_id.into(),
            services,
            sessions,
            slot: Mutex::new(CommandSlot::default()),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn detect(&self, message: &str) -> Intent {
        self.services.detector.detect(message)
    }

    /// Handle a chat message. With `require_intent`, messages the detector
    /// does not classify as commands are rejected without touching the
    /// browser; otherwise only an explicit prefix is stripped.
    pub async fn handle_message(&self, message: &str, require_intent: bool) -> CommandResponse {
        let intent = self.detect(message);
        info!(
            chat_id = %self.chat_id,
            is_command = intent.is_command,
            confidence = intent.confidence,
            "intent detected"
        );
        if require_intent && !intent.is_command {
            return CommandResponse::rejected(
                format!(
                    "Not a browser command (confidence {:.2})",
                    intent.confidence
                ),
                Vec::new(),
            );
        }
        self.run_command(&intent.command).await
    }

    /// Plan and execute `command`. A newer command or [`Self::stop`] cancels
    /// this one; remaining actions are then recorded as cancelled.
    pub async fn run_command(&self, command: &str) -> CommandResponse {
        let (seq, cancel) = self.begin_command().await;
        let response = self.run_with(command, &cancel).await;
        self.finish_command(seq).await;
        response
    }

    async fn run_with(&self, command: &str, cancel: &CancellationToken) -> CommandResponse {
        let plan = tokio::select! {
            _ = cancel.cancelled() => return CommandResponse::rejected("Command cancelled", Vec::new()),
            plan = self.services.parser.parse(command) => plan,
        };
        info!(
            chat_id = %self.chat_id,
            source = ?plan.source,
            actions = ?plan.describe_actions(),
            "plan ready"
        );
        if plan.actions.is_empty() {
            return CommandResponse::rejected("No actions to execute", Vec::new());
        }

        let session = tokio::select! {
            _ = cancel.cancelled() => {
                return CommandResponse::rejected("Command cancelled", plan.describe_actions());
            },
            session = self.sessions.ensure_active() => session,
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "could not start browser session");
                return CommandResponse::rejected(
                    format!("Failed to start browser session: {e}"),
                    plan.describe_actions(),
                );
            },
        };

        let results = self
            .services
            .executor
            .execute(&session, &plan, cancel)
            .await;
        let response = aggregate(&plan, results, &session, self.services.api.as_ref()).await;

        if !session.is_active().await {
            self.sessions.invalidate(session.id()).await;
        }
        response
    }

    async fn begin_command(&self) -> (u64, CancellationToken) {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.running.take() {
            info!(chat_id = %self.chat_id, "new command supersedes the running one");
            previous.token.cancel();
        }
        slot.next_seq += 1;
        let token = CancellationToken::new();
        slot.running = Some(Running {
            seq: slot.next_seq,
            token: token.clone(),
        });
        (slot.next_seq, token)
    }

    async fn finish_command(&self, seq: u64) {
        let mut slot = self.slot.lock().await;
        if slot.running.as_ref().is_some_and(|r| r.seq == seq) {
            slot.running = None;
        }
    }

    /// Cancel the running command, if any.
    pub async fn stop(&self) -> bool {
        match self.slot.lock().await.running.take() {
            Some(running) => {
                running.token.cancel();
                info!(chat_id = %self.chat_id, "command stopped");
                true
            },
            None => false,
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.sessions.status().await
    }

    pub async fn owns_session(&self, session_id: &str) -> bool {
        self.session().await.is_some_and(|s| s.id == session_id)
    }

    pub async fn close_session(&self, session_id: &str) -> Result<DeleteOutcome, BrowserError> {
        self.stop().await;
        self.sessions.close_remote(session_id).await
    }

    /// Stop work and close the session, waiting for teardown.
    pub async fn close(&self) -> Option<String> {
        self.stop().await;
        self.sessions.close().await
    }

    /// Stop work and start closing the session without waiting.
    pub async fn release(&self) -> Option<JoinHandle<()>> {
        self.stop().await;
        self.sessions.begin_release().await
    }
}
