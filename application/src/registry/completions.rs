//! Registry of completion sessions, keyed by caller-chosen uid.
//!
//! The UI polls a running completion with `llm_find` and aborts it with
//! `llm_stop`. An entry lives as long as its [`CompletionTicket`]; the
//! router drops the ticket only after the final reply was written, so a
//! finished completion stays visible until its originator has the result.

use super::RegistryError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tooldesk_domain::CompletionSnapshot;

struct Entry {
    snapshot: CompletionSnapshot,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct CompletionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CompletionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a running completion under `uid`.
    pub fn begin(self: &Arc<Self>, uid: &str) -> Result<CompletionTicket, RegistryError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(uid).is_some_and(|e| e.snapshot.running) {
            return Err(RegistryError::CompletionRunning(uid.to_string()));
        }
        let cancel = CancellationToken::new();
        entries.insert(
            uid.to_string(),
            Entry {
                snapshot: CompletionSnapshot {
                    uid: uid.to_string(),
                    running: true,
                    ..CompletionSnapshot::default()
                },
                cancel: cancel.clone(),
            },
        );
        Ok(CompletionTicket {
            registry: Arc::clone(self),
            uid: uid.to_string(),
            cancel,
        })
    }

    pub fn find(&self, uid: &str) -> Option<CompletionSnapshot> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(uid)
            .map(|e| e.snapshot.clone())
    }

    /// Cancel the completion registered under `uid`.
    pub fn stop(&self, uid: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get_mut(uid)
            .ok_or_else(|| RegistryError::CompletionNotFound(uid.to_string()))?;
        entry.snapshot.cancelled = true;
        entry.cancel.cancel();
        Ok(())
    }

    fn update(&self, uid: &str, f: impl FnOnce(&mut CompletionSnapshot)) {
        if let Some(entry) = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(uid)
        {
            f(&mut entry.snapshot);
        }
    }

    fn remove(&self, uid: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(uid);
    }
}

/// Ownership of one registered completion.
pub struct CompletionTicket {
    registry: Arc<CompletionRegistry>,
    uid: String,
    cancel: CancellationToken,
}

impl CompletionTicket {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publish a new snapshot for `llm_find`.
    pub fn publish(&self, f: impl FnOnce(&mut CompletionSnapshot)) {
        self.registry.update(&self.uid, f);
    }

    /// Mark the completion finished; the entry stays until the ticket drops.
    pub fn finish(&self, error: Option<String>) {
        self.registry.update(&self.uid, |s| {
            s.running = false;
            s.error = error.unwrap_or_default();
        });
    }
}

impl Drop for CompletionTicket {
    fn drop(&mut self) {
        self.registry.remove(&self.uid);
    }
}
