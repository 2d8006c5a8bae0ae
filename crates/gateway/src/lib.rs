//! Gateway: HTTP surface over the browser orchestrator.
//!
//! Lifecycle:
//! 1. Load + validate config (diagnostics are logged, never fatal)
//! 2. Wire the provisioning API, CDP connector, and planner
//! 3. Serve `/api/browser/*` and `/health`
//! 4. On SIGINT/SIGTERM stop accepting requests and release sessions
//!
//! Each chat id gets its own [`Orchestrator`], which owns exactly one remote
//! browser session.

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    error::GatewayError,
    orchestrator::{BrowserServices, Orchestrator},
    registry::OrchestratorRegistry,
    server::{build_gateway_app, release_sessions, serve, start_gateway},
    state::GatewayState,
};
