//! Runs an action plan against a live session, one action at a time.
//!
//! Each action is validated, retried per its policy, bounded by the action
//! timeout (waits excepted), and raced against the command's cancellation
//! token. A failed action never aborts the plan; a lost connection or a
//! cancellation fails the remaining actions without touching the page.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    pilot_config::ExecutorConfig,
    serde_json::{Value, json},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    cdp::PageDriver,
    error::BrowserError,
    locate::{
        ACTIVE_EDITABLE_SCRIPT, INPUT_INVENTORY_SCRIPT, InputInfo, Locator, NETWORK_PROBE_SCRIPT,
        ResolveMode, Resolved, SEARCH_INPUT_SELECTORS, TITLE_SCRIPT, click_locators,
        looks_like_selector, resolve_script, search_input_locators,
    },
    remote::SessionApi,
    retry::{RetryPolicy, Retryable},
    session::SessionHandle,
    types::{Action, ActionPlan, ActionResult, ScrollDirection},
};

const NETWORK_POLL: Duration = Duration::from_millis(50);
const SCROLL_SETTLE: Duration = Duration::from_millis(100);

/// Timing and retry settings for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub settle_delay: Duration,
    pub default_wait: Duration,
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    pub network_idle_timeout: Duration,
    pub network_quiet: Duration,
    pub load_timeout: Duration,
    pub fallback_delay: Duration,
    pub search_home: String,
    pub retry: RetryPolicy,
    pub retry_overrides: HashMap<String, RetryPolicy>,
}

impl ExecutorSettings {
    pub fn retry_for(&self, action: &str) -> &RetryPolicy {
        self.retry_overrides.get(action).unwrap_or(&self.retry)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for ExecutorSettings {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            default_wait: Duration::from_millis(cfg.default_wait_ms),
            action_timeout: Duration::from_millis(cfg.action_timeout_ms),
            navigation_timeout: Duration::from_millis(cfg.navigation_timeout_ms),
            network_idle_timeout: Duration::from_millis(cfg.network_idle_timeout_ms),
            network_quiet: Duration::from_millis(cfg.network_quiet_ms),
            load_timeout: Duration::from_millis(cfg.load_timeout_ms),
            fallback_delay: Duration::from_millis(cfg.fallback_delay_ms),
            search_home: cfg.search_home.clone(),
            retry: RetryPolicy::from(&cfg.retry),
            retry_overrides: cfg
                .retry_overrides
                .iter()
                .map(|(name, retry)| (name.clone(), RetryPolicy::from(retry)))
                .collect(),
        }
    }
}

/// A failed attempt, optionally with structured diagnostics.
#[derive(Debug)]
struct ActionError {
    error: BrowserError,
    data: Option<Value>,
}

impl From<BrowserError> for ActionError {
    fn from(error: BrowserError) -> Self {
        Self { error, data: None }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl Retryable for ActionError {
    fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

/// Why the rest of a plan is skipped.
enum Halt {
    Cancelled,
    ConnectionLost(String),
}

impl Halt {
    fn reason(&self) -> String {
        match self {
            Self::Cancelled => "cancelled".into(),
            Self::ConnectionLost(e) => format!("skipped: browser connection lost ({e})"),
        }
    }
}

pub struct ActionExecutor {
    settings: ExecutorSettings,
    api: Arc<dyn SessionApi>,
}

impl ActionExecutor {
    /// `api` backs the provider-side screenshot fallback for `extract`.
    pub fn new(settings: ExecutorSettings, api: Arc<dyn SessionApi>) -> Self {
        Self { settings, api }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Execute every action in order. Always returns one result per action.
    pub async fn execute(
        &self,
        session: &SessionHandle,
        plan: &ActionPlan,
        cancel: &CancellationToken,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(plan.actions.len());
        let mut halt: Option<Halt> = None;

        for (index, action) in plan.actions.iter().enumerate() {
            if halt.is_none() && cancel.is_cancelled() {
                halt = Some(Halt::Cancelled);
            }
            if halt.is_none() && index > 0 && !self.settings.settle_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => halt = Some(Halt::Cancelled),
                    _ = tokio::time::sleep(self.settings.settle_delay) => {},
                }
            }
            if let Some(halt) = &halt {
                results.push(ActionResult::failure(failure_description(action), halt.reason()));
                continue;
            }

            let (result, stop) = self.run_action(session, index, action, cancel).await;
            results.push(result);
            halt = stop;
        }

        results
    }

    async fn run_action(
        &self,
        session: &SessionHandle,
        index: usize,
        action: &Action,
        cancel: &CancellationToken,
    ) -> (ActionResult, Option<Halt>) {
        let started = Instant::now();
        if let Err(e) = action.validate() {
            warn!(session_id = session.id(), index, action = %action, error = %e, "invalid action");
            return (
                ActionResult::failure(failure_description(action), e.to_string()),
                None,
            );
        }

        info!(session_id = session.id(), index, action = %action, "executing action");
        let attempts = AtomicU32::new(0);
        let policy = self.settings.retry_for(action.name());
        let attempt_loop = policy.run(action.name(), |attempt| {
            attempts.store(attempt, Ordering::SeqCst);
            self.perform(session, action)
        });

        // A wait sleeps for as long as it was asked to; only cancellation cuts it short.
        let limit = match action {
            Action::Wait { .. } => None,
            _ => Some(self.settings.action_timeout),
        };
        let bounded = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, attempt_loop).await {
                    Ok((result, _)) => result,
                    Err(_) => Err(ActionError::from(BrowserError::Timeout(format!(
                        "{} exceeded {}ms",
                        action.name(),
                        limit.as_millis()
                    )))),
                },
                None => attempt_loop.await.0,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ActionError::from(BrowserError::Cancelled)),
            result = bounded => result,
        };

        let elapsed = started.elapsed().as_millis() as u64;
        let attempts = attempts.load(Ordering::SeqCst).max(1);
        match outcome {
            Ok(result) => {
                session.touch().await;
                if let Ok(url) = session.driver().current_url().await {
                    session.set_current_url(url).await;
                }
                debug!(session_id = session.id(), index, elapsed_ms = elapsed, attempts, "action succeeded");
                (result.with_timing(elapsed, attempts), None)
            },
            Err(ActionError { error, data }) => {
                warn!(session_id = session.id(), index, action = %action, attempts, error = %error, "action failed");
                let halt = match &error {
                    BrowserError::Cancelled => Some(Halt::Cancelled),
                    e if e.is_connection_lost() => {
                        session.terminate().await;
                        Some(Halt::ConnectionLost(e.to_string()))
                    },
                    _ => None,
                };
                let mut result = ActionResult::failure(failure_description(action), error.to_string())
                    .with_timing(elapsed, attempts);
                result.data = data;
                (result, halt)
            },
        }
    }

    async fn perform(
        &self,
        session: &SessionHandle,
        action: &Action,
    ) -> Result<ActionResult, ActionError> {
        let driver = session.driver();
        match action {
            Action::Navigate { url } => self.navigate(driver, url).await,
            Action::Search { query } => self.search(driver, query).await,
            Action::Click { target } => self.click(driver, target).await,
            Action::Type { text, selector } => self.type_text(driver, text, selector.as_deref()).await,
            Action::Extract {} => self.extract(session).await,
            Action::Scroll { direction } => self.scroll(driver, *direction).await,
            Action::Wait { duration_ms } => {
                let duration = duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.settings.default_wait);
                tokio::time::sleep(duration).await;
                Ok(ActionResult::success(format!("Waited {}ms", duration.as_millis())))
            },
            Action::Unsupported { kind, reason } => Err(BrowserError::InvalidAction(format!(
                "unsupported action '{kind}': {reason}"
            ))
            .into()),
        }
    }

    async fn goto(&self, driver: &Arc<dyn PageDriver>, url: &str) -> Result<(), BrowserError> {
        tokio::time::timeout(self.settings.navigation_timeout, driver.goto(url))
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "navigation to {url} exceeded {}ms",
                    self.settings.navigation_timeout.as_millis()
                ))
            })??;
        match tokio::time::timeout(self.settings.load_timeout, driver.wait_for_load()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) if e.is_connection_lost() => return Err(e),
            Ok(Err(e)) => debug!(url, error = %e, "load wait failed"),
            Err(_) => debug!(url, "load event not seen before timeout"),
        }
        Ok(())
    }

    async fn navigate(
        &self,
        driver: &Arc<dyn PageDriver>,
        url: &str,
    ) -> Result<ActionResult, ActionError> {
        self.goto(driver, url).await?;
        let final_url = driver
            .current_url()
            .await?
            .unwrap_or_else(|| url.to_string());
        Ok(ActionResult::success(format!("Navigated to {url}"))
            .with_url(url)
            .with_data(json!({ "finalUrl": final_url })))
    }

    async fn search(
        &self,
        driver: &Arc<dyn PageDriver>,
        query: &str,
    ) -> Result<ActionResult, ActionError> {
        let current = driver.current_url().await?;
        if is_blank_page(current.as_deref()) {
            debug!(home = %self.settings.search_home, "blank page, loading search home");
            self.goto(driver, &self.settings.search_home).await?;
        }

        let locators = search_input_locators();
        let Some((strategy, _)) = resolve(driver, &locators, ResolveMode::FocusClear).await? else {
            return Err(self.search_input_missing(driver).await);
        };

        driver.type_text(query).await?;
        driver.press_enter().await?;
        let settled = self.settle(driver).await;
        let url = driver.current_url().await?;

        let mut result = ActionResult::success(format!("Searched for \"{query}\"")).with_data(json!({
            "query": query,
            "selector": strategy,
            "settled": settled,
        }));
        if let Some(url) = url {
            result = result.with_url(url);
        }
        Ok(result)
    }

    /// Diagnostic failure listing every strategy tried and every input on
    /// the page.
    async fn search_input_missing(&self, driver: &Arc<dyn PageDriver>) -> ActionError {
        let inputs: Vec<InputInfo> = match driver.evaluate(INPUT_INVENTORY_SCRIPT).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(e) if e.is_connection_lost() => return e.into(),
            Err(e) => {
                debug!(error = %e, "input inventory failed");
                Vec::new()
            },
        };

        let inventory = if inputs.is_empty() {
            "none".to_string()
        } else {
            inputs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        let message = format!(
            "no usable search input found. Tried selectors: {}. Inputs on page: {inventory}",
            SEARCH_INPUT_SELECTORS.join(", ")
        );
        ActionError {
            error: BrowserError::ElementNotFound(message),
            data: Some(json!({
                "attemptedSelectors": SEARCH_INPUT_SELECTORS,
                "inputs": inputs,
            })),
        }
    }

    /// Network idle, then load event, then a fixed delay. Returns the stage
    /// that ended the wait.
    async fn settle(&self, driver: &Arc<dyn PageDriver>) -> &'static str {
        if self.wait_network_idle(driver).await {
            return "network-idle";
        }
        if let Ok(Ok(())) =
            tokio::time::timeout(self.settings.load_timeout, driver.wait_for_load()).await
        {
            return "load";
        }
        tokio::time::sleep(self.settings.fallback_delay).await;
        "delay"
    }

    /// Poll until the document is complete and its resource count has been
    /// stable for the quiet window.
    async fn wait_network_idle(&self, driver: &Arc<dyn PageDriver>) -> bool {
        let deadline = Instant::now() + self.settings.network_idle_timeout;
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let probe = match driver.evaluate(NETWORK_PROBE_SCRIPT).await {
                Ok(probe) => probe,
                Err(e) => {
                    debug!(error = %e, "network probe failed");
                    return false;
                },
            };
            let complete = probe["readyState"].as_str() == Some("complete");
            let count = probe["resources"].as_u64();
            if count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if complete && count.is_some() && quiet_since.elapsed() >= self.settings.network_quiet
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(NETWORK_POLL).await;
        }
    }

    async fn click(
        &self,
        driver: &Arc<dyn PageDriver>,
        target: &str,
    ) -> Result<ActionResult, ActionError> {
        let locators = click_locators(target);
        let Some((strategy, point)) = resolve(driver, &locators, ResolveMode::Click).await? else {
            return Err(BrowserError::ElementNotFound(format!(
                "no visible element matched {target:?} ({} strategies tried)",
                locators.len()
            ))
            .into());
        };

        tokio::time::sleep(SCROLL_SETTLE).await;
        driver.click_at(point.x, point.y).await?;
        debug!(target, strategy = %strategy, x = point.x, y = point.y, "clicked element");

        Ok(ActionResult::success(format!("Clicked {target}")).with_data(json!({
            "strategy": strategy,
            "x": point.x,
            "y": point.y,
        })))
    }

    async fn type_text(
        &self,
        driver: &Arc<dyn PageDriver>,
        text: &str,
        selector: Option<&str>,
    ) -> Result<ActionResult, ActionError> {
        let description = match selector {
            Some(selector) => {
                let mut locators = Vec::new();
                if looks_like_selector(selector) {
                    locators.push(Locator::css(selector));
                }
                locators.push(Locator::AriaLabel {
                    label: selector.to_string(),
                });
                if resolve(driver, &locators, ResolveMode::Focus)
                    .await?
                    .is_none()
                {
                    return Err(BrowserError::ElementNotFound(format!(
                        "no editable element matched {selector:?}"
                    ))
                    .into());
                }
                format!("Typed {} characters into {selector}", text.chars().count())
            },
            None => {
                let editable = driver.evaluate(ACTIVE_EDITABLE_SCRIPT).await?;
                if editable != Value::Bool(true) {
                    return Err(BrowserError::ElementNotFound(
                        "no focused editable element to type into".into(),
                    )
                    .into());
                }
                format!("Typed {} characters", text.chars().count())
            },
        };

        driver.type_text(text).await?;
        Ok(ActionResult::success(description))
    }

    async fn scroll(
        &self,
        driver: &Arc<dyn PageDriver>,
        direction: ScrollDirection,
    ) -> Result<ActionResult, ActionError> {
        let position = driver.evaluate(&scroll_script(direction)).await?;
        Ok(ActionResult::success(format!("Scrolled {direction}"))
            .with_data(json!({ "scrollY": position })))
    }

    async fn extract(&self, session: &SessionHandle) -> Result<ActionResult, ActionError> {
        let driver = session.driver();
        let png = match driver.screenshot().await {
            Ok(png) => png,
            Err(e) if e.is_connection_lost() => return Err(e.into()),
            Err(e) => {
                warn!(session_id = session.id(), error = %e, "CDP screenshot failed, using provider screenshot");
                self.api.screenshot(session.id()).await.map_err(|api_err| {
                    BrowserError::ScreenshotFailed(format!("{e}; provider fallback: {api_err}"))
                })?
            },
        };

        let title = match driver.evaluate(TITLE_SCRIPT).await {
            Ok(Value::String(title)) => title,
            _ => String::new(),
        };
        let url = driver.current_url().await.ok().flatten();

        let mut result = ActionResult::success("Captured page screenshot")
            .with_data(json!({
                "title": title,
                "url": url,
                "bytes": png.len(),
            }))
            .with_screenshot(BASE64.encode(&png));
        if let Some(url) = url {
            result = result.with_url(url);
        }
        Ok(result)
    }
}

/// Run the resolve script and return the winning strategy and point.
async fn resolve(
    driver: &Arc<dyn PageDriver>,
    locators: &[Locator],
    mode: ResolveMode,
) -> Result<Option<(String, Resolved)>, BrowserError> {
    let value = driver.evaluate(&resolve_script(locators, mode)).await?;
    let resolved: Resolved = serde_json::from_value(value)
        .map_err(|e| BrowserError::JsEvalFailed(format!("unexpected resolver output: {e}")))?;
    if !resolved.found {
        return Ok(None);
    }
    let strategy = resolved
        .index
        .and_then(|i| locators.get(i))
        .map(ToString::to_string)
        .unwrap_or_default();
    Ok(Some((strategy, resolved)))
}

fn is_blank_page(url: Option<&str>) -> bool {
    match url {
        None => true,
        Some(url) => {
            let url = url.trim();
            url.is_empty() || url == "about:blank" || url.starts_with("chrome://newtab")
        },
    }
}

fn scroll_script(direction: ScrollDirection) -> String {
    let statement = match direction {
        ScrollDirection::Top => "window.scrollTo(0, 0)",
        ScrollDirection::Bottom => "window.scrollTo(0, document.body.scrollHeight)",
        ScrollDirection::Up => "window.scrollBy(0, -window.innerHeight)",
        ScrollDirection::Down => "window.scrollBy(0, window.innerHeight)",
    };
    format!("/* pilot:scroll */ (() => {{ {statement}; return window.scrollY; }})()")
}

fn failure_description(action: &Action) -> String {
    match action {
        Action::Navigate { url } => format!("Failed to navigate to {url}"),
        Action::Search { query } => format!("Failed to search for \"{query}\""),
        Action::Click { target } => format!("Failed to click {target}"),
        Action::Type { .. } => "Failed to type text".into(),
        Action::Extract {} => "Failed to capture page".into(),
        Action::Scroll { direction } => format!("Failed to scroll {direction}"),
        Action::Wait { .. } => "Wait interrupted".into(),
        Action::Unsupported { kind, .. } => format!("Skipped unsupported action {kind}"),
    }
}
