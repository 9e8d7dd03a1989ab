//! Directory of live tool endpoints (C2).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Notify;
use tooldesk_domain::Endpoint;
use tracing::{debug, info};

/// Process-wide map of tool name → endpoint.
///
/// Only the router writes to it: on `register`, and when a dial fails.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Endpoint>>,
    registered: Notify,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tool_name` listening on `port`, replacing any previous entry.
    pub fn register(&self, tool_name: &str, port: u16) -> Option<Endpoint> {
        let previous = self
            .endpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool_name.to_string(), Endpoint::new(tool_name, port));
        info!(tool = tool_name, port, "Tool registered");
        self.registered.notify_waiters();
        previous
    }

    pub fn get(&self, tool_name: &str) -> Option<Endpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool_name)
            .filter(|ep| ep.alive)
            .cloned()
    }

    pub fn remove(&self, tool_name: &str) -> Option<Endpoint> {
        self.endpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tool_name)
    }

    /// Drop `endpoint` after a failed dial, unless the tool has re-registered
    /// on another port in the meantime.
    pub fn mark_unreachable(&self, endpoint: &Endpoint) {
        let mut map = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        if map
            .get(&endpoint.tool_name)
            .is_some_and(|current| current.port == endpoint.port)
        {
            map.remove(&endpoint.tool_name);
            debug!(tool = %endpoint.tool_name, port = endpoint.port, "Endpoint dropped");
        }
    }

    /// Every live endpoint, sorted by tool name.
    pub fn list(&self) -> Vec<Endpoint> {
        let mut all: Vec<Endpoint> = self
            .endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|ep| ep.alive)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        all
    }

    /// Wait until `tool_name` registers, or `timeout` elapses.
    pub async fn wait_for(&self, tool_name: &str, timeout: Duration) -> Option<Endpoint> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.registered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ep) = self.get(tool_name) {
                return Some(ep);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get(tool_name);
            }
        }
    }
}
