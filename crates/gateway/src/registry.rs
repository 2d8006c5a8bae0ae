//! Chat id → orchestrator map.

use std::sync::Arc;

use {dashmap::DashMap, tokio::task::JoinHandle, tracing::info};

use crate::orchestrator::{BrowserServices, Orchestrator};

pub struct OrchestratorRegistry {
    services: Arc<BrowserServices>,
    chats: DashMap<String, Arc<Orchestrator>>,
}

impl OrchestratorRegistry {
    pub fn new(services: Arc<BrowserServices>) -> Self {
        Self {
            services,
            chats: DashMap::new(),
        }
    }

    pub fn services(&self) -> &Arc<BrowserServices> {
        &self.services
    }

    pub fn get_or_create(&self, chat_id: &str) -> Arc<Orchestrator> {
        let entry = self.chats.entry(chat_id.to_string()).or_insert_with(|| {
            info!(chat_id, "new conversation");
            Arc::new(Orchestrator::new(chat_id, Arc::clone(&self.services)))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, chat_id: &str) -> Option<Arc<Orchestrator>> {
        self.chats.get(chat_id).map(|e| Arc::clone(e.value()))
    }

    pub fn remove(&self, chat_id: &str) -> Option<Arc<Orchestrator>> {
        self.chats.remove(chat_id).map(|(_, orchestrator)| orchestrator)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Orchestrator>> {
        self.chats.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// The orchestrator currently holding `session_id`.
    pub async fn find_by_session(&self, session_id: &str) -> Option<Arc<Orchestrator>> {
        for orchestrator in self.snapshot() {
            if orchestrator.owns_session(session_id).await {
                return Some(orchestrator);
            }
        }
        None
    }

    /// Start releasing every session; the caller decides how long to wait.
    pub async fn release_all(&self) -> Vec<JoinHandle<()>> {
        let mut pending = Vec::new();
        for orchestrator in self.snapshot() {
            if let Some(handle) = orchestrator.release().await {
                pending.push(handle);
            }
        }
        if !pending.is_empty() {
            info!(sessions = pending.len(), "releasing browser sessions");
        }
        pending
    }
}
