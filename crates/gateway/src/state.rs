use std::{sync::Arc, time::Instant};

use crate::{orchestrator::BrowserServices, registry::OrchestratorRegistry};

/// Shared gateway state handed to every handler.
pub struct GatewayState {
    pub version: String,
    pub started_at: Instant,
    pub registry: OrchestratorRegistry,
}

impl GatewayState {
    pub fn new(services: Arc<BrowserServices>) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            registry: OrchestratorRegistry::new(services),
        })
    }
}
