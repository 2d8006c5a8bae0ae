//! Remote browser sessions driven over CDP.
//!
//! Used by the orchestrator to provision a cloud browser, run action plans
//! against it, and summarize the outcome.
//!
//! # Components
//!
//! - **remote**: REST client for the session-provisioning API
//! - **cdp**: control connection and page operations
//! - **session**: single-flight creation, reuse, and idempotent teardown
//! - **locate**: element resolution strategies for search boxes and clicks
//! - **executor**: runs a plan action by action with retries and cancellation
//! - **aggregate**: builds the response envelope
//!
//! # Example
//!
//! ```ignore
//! use pilot_browser::{ActionExecutor, CdpConnector, HttpSessionApi, SessionManager};
//!
//! let api = Arc::new(HttpSessionApi::new(&config.remote));
//! let manager = SessionManager::new(api.clone(), Arc::new(CdpConnector::from(&config.remote)), (&config.remote).into());
//! let session = manager.ensure_active().await?;
//! let results = ActionExecutor::new((&config.executor).into(), api.clone())
//!     .execute(&session, &plan, &CancellationToken::new())
//!     .await;
//! ```

pub mod aggregate;
pub mod cdp;
pub mod error;
pub mod executor;
pub mod locate;
pub mod remote;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use {
    aggregate::{aggregate, summarize},
    cdp::{BrowserConnector, CdpConnector, PageDriver},
    error::BrowserError,
    executor::{ActionExecutor, ExecutorSettings},
    remote::{DeleteOutcome, HttpSessionApi, RemoteSession, SessionApi},
    retry::RetryPolicy,
    session::{SessionHandle, SessionManager, SessionSettings},
    types::{
        Action, ActionPlan, ActionResult, CommandResponse, PlanSource, ScrollDirection, Session,
        SessionStatus,
    },
};
