//! Registry of in-flight request sessions (C3).
//!
//! Every request that can take time gets a [`SessionGuard`]. The guard owns
//! the session's lifetime: dropping it removes the session, so a request
//! that ends on any path (reply, error, panic unwinding) never leaks an
//! entry in the progress tray.
//!
//! Sessions opened on behalf of another session (tool sub-calls, the
//! completion engine) record their parent. Cancelling a session therefore
//! cancels its whole subtree: [`SessionRegistry::progress`] walks the
//! parent chain.

use super::RegistryError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tooldesk_domain::{Command, MsgId, MsgInfo};
use tracing::{debug, trace};

struct SessionState {
    info: MsgInfo,
    commands: Vec<Command>,
}

type SharedSession = Arc<Mutex<SessionState>>;

/// Map of live sessions keyed by [`MsgId`].
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<MsgId, SharedSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a session for work executing in `tool`.
    pub fn open(self: &Arc<Self>, tool: &str, parent: Option<MsgId>) -> SessionGuard {
        let id = MsgId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = MsgInfo {
            id,
            tool: tool.to_string(),
            name: String::new(),
            start_time: now_secs(),
            progress: 0.0,
            progress_label: String::new(),
            cancelled: false,
            parent: parent.filter(|p| !p.is_none()),
        };
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                Arc::new(Mutex::new(SessionState {
                    info,
                    commands: Vec::new(),
                })),
            );
        debug!(msg_id = %id, tool, "Session opened");
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    fn close(&self, id: MsgId) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        debug!(msg_id = %id, "Session closed");
    }

    fn session(&self, id: MsgId) -> Result<SharedSession, RegistryError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(RegistryError::SessionNotFound(id))
    }

    fn with_session<T>(
        &self,
        id: MsgId,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, RegistryError> {
        let session = self.session(id)?;
        let mut state = session.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(&mut state))
    }

    /// True when `id` or any of its ancestors was cancelled.
    ///
    /// Unknown ids are not cancelled: their requests already ended.
    pub fn is_cancelled(&self, id: MsgId) -> bool {
        let mut current = Some(id);
        // Parent links always point at older sessions, so the walk ends.
        while let Some(cur) = current {
            let Ok((cancelled, parent)) =
                self.with_session(cur, |s| (s.info.cancelled, s.info.parent))
            else {
                return false;
            };
            if cancelled {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Record progress and report whether the caller should stop.
    pub fn progress(&self, id: MsgId, done: f64, label: &str) -> bool {
        let updated = self.with_session(id, |s| {
            s.info.progress = done.clamp(0.0, 1.0);
            s.info.progress_label = label.to_string();
        });
        if updated.is_err() {
            trace!(msg_id = %id, "Progress for unknown session");
            return false;
        }
        self.is_cancelled(id)
    }

    /// Flag `id` as cancelled.
    pub fn stop(&self, id: MsgId) -> Result<(), RegistryError> {
        self.with_session(id, |s| s.info.cancelled = true)?;
        debug!(msg_id = %id, "Session stop requested");
        Ok(())
    }

    /// Stop by display name, falling back to every session of the tool with
    /// that name. Returns the ids that were flagged.
    pub fn stop_by_name(&self, name: &str) -> Result<Vec<MsgId>, RegistryError> {
        let sessions: Vec<SharedSession> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut by_name = Vec::new();
        let mut by_tool = Vec::new();
        for session in &sessions {
            let state = session.lock().unwrap_or_else(|e| e.into_inner());
            if state.info.name == name {
                by_name.push(Arc::clone(session));
            } else if state.info.tool == name {
                by_tool.push(Arc::clone(session));
            }
        }

        let targets = if by_name.is_empty() { by_tool } else { by_name };
        if targets.is_empty() {
            return Err(RegistryError::NameNotFound(name.to_string()));
        }
        let mut ids = Vec::with_capacity(targets.len());
        for session in targets {
            let mut state = session.lock().unwrap_or_else(|e| e.into_inner());
            state.info.cancelled = true;
            ids.push(state.info.id);
        }
        ids.sort();
        debug!(name, count = ids.len(), "Sessions stop requested by name");
        Ok(ids)
    }

    /// `stop_msg_name` semantics: a decimal id, else a name.
    pub fn stop_id_or_name(&self, target: &str) -> Result<Vec<MsgId>, RegistryError> {
        if let Ok(id) = target.parse::<MsgId>()
            && self.stop(id).is_ok()
        {
            return Ok(vec![id]);
        }
        self.stop_by_name(target)
    }

    pub fn set_name(&self, id: MsgId, name: &str) -> Result<(), RegistryError> {
        self.with_session(id, |s| s.info.name = name.to_string())
    }

    /// Oldest live session carrying display name `name`.
    pub fn find_name(&self, name: &str) -> Option<MsgInfo> {
        self.snapshot().into_iter().find(|info| info.name == name)
    }

    pub fn get(&self, id: MsgId) -> Option<MsgInfo> {
        self.with_session(id, |s| s.info.clone()).ok()
    }

    /// Append commands to the session buffer, in order, under its lock.
    pub fn add_cmds(&self, id: MsgId, commands: Vec<Command>) -> Result<(), RegistryError> {
        if commands.is_empty() {
            return Ok(());
        }
        self.with_session(id, |s| s.commands.extend(commands))
    }

    /// Drain the session's command buffer.
    pub fn take_cmds(&self, id: MsgId) -> Vec<Command> {
        self.with_session(id, |s| std::mem::take(&mut s.commands))
            .unwrap_or_default()
    }

    /// Every live session, ordered by id.
    pub fn snapshot(&self) -> Vec<MsgInfo> {
        let sessions: Vec<SharedSession> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut infos: Vec<MsgInfo> = sessions
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).info.clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner of one session. Dropping it closes the session.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: MsgId,
}

impl SessionGuard {
    pub fn id(&self) -> MsgId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(self.id)
    }

    pub fn take_cmds(&self) -> Vec<Command> {
        self.registry.take_cmds(self.id)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.close(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tooldesk_domain::Uid;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let reg = SessionRegistry::new();
        let guards: Vec<SessionGuard> = (0..100).map(|_| reg.open("Tool", None)).collect();
        let ids: HashSet<MsgId> = guards.iter().map(|g| g.id()).collect();
        assert_eq!(ids.len(), 100);
        assert!(!ids.contains(&MsgId::NONE));
    }

    #[tokio::test]
    async fn concurrent_opens_get_distinct_ids() {
        let reg = SessionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                (0..50)
                    .map(|_| {
                        let g = reg.open("Tool", None);
                        g.id()
                    })
                    .collect::<Vec<_>>()
            }));
        }
        let mut all = HashSet::new();
        for h in handles {
            for id in h.await.unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 16 * 50);
    }

    #[test]
    fn guard_drop_removes_session() {
        let reg = SessionRegistry::new();
        let guard = reg.open("Tool", None);
        let id = guard.id();
        assert!(reg.get(id).is_some());
        drop(guard);
        assert!(reg.get(id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn stop_makes_next_progress_return_stop() {
        let reg = SessionRegistry::new();
        let guard = reg.open("Tool", None);
        assert!(!reg.progress(guard.id(), 0.1, "loop"));
        reg.stop(guard.id()).unwrap();
        assert!(reg.progress(guard.id(), 0.2, "loop"));
        let info = reg.get(guard.id()).unwrap();
        assert_eq!(info.progress_label, "loop");
        assert!(info.cancelled);
    }

    #[test]
    fn cancelling_parent_stops_children() {
        let reg = SessionRegistry::new();
        let parent = reg.open("Chat", None);
        let child = reg.open("Activities", Some(parent.id()));
        let grandchild = reg.open("Map", Some(child.id()));
        assert!(!reg.progress(grandchild.id(), 0.5, ""));
        reg.stop(parent.id()).unwrap();
        assert!(reg.progress(grandchild.id(), 0.5, ""));
    }

    #[test]
    fn name_lookup_follows_session_lifetime() {
        let reg = SessionRegistry::new();
        let guard = reg.open("Recorder", None);
        reg.set_name(guard.id(), "mic:42").unwrap();
        assert_eq!(reg.find_name("mic:42").unwrap().id, guard.id());
        drop(guard);
        assert!(reg.find_name("mic:42").is_none());
    }

    #[test]
    fn stop_by_name_falls_back_to_tool() {
        let reg = SessionRegistry::new();
        let a = reg.open("Activities", None);
        let b = reg.open("Activities", None);
        let other = reg.open("Map", None);
        let stopped = reg.stop_id_or_name("Activities").unwrap();
        assert_eq!(stopped, vec![a.id(), b.id()]);
        assert!(!reg.is_cancelled(other.id()));
        assert!(matches!(
            reg.stop_by_name("Nope"),
            Err(RegistryError::NameNotFound(_))
        ));
    }

    #[test]
    fn stop_by_decimal_id() {
        let reg = SessionRegistry::new();
        let guard = reg.open("Tool", None);
        let stopped = reg.stop_id_or_name(&guard.id().to_string()).unwrap();
        assert_eq!(stopped, vec![guard.id()]);
        assert!(guard.is_cancelled());
    }

    #[test]
    fn commands_keep_append_order() {
        let reg = SessionRegistry::new();
        let guard = reg.open("Tool", None);
        reg.add_cmds(guard.id(), vec![Command::open_centered(Uid(1))])
            .unwrap();
        reg.add_cmds(
            guard.id(),
            vec![
                Command::open_centered(Uid(2)),
                Command::open_centered(Uid(3)),
            ],
        )
        .unwrap();
        let cmds = guard.take_cmds();
        assert_eq!(
            cmds,
            vec![
                Command::open_centered(Uid(1)),
                Command::open_centered(Uid(2)),
                Command::open_centered(Uid(3)),
            ]
        );
        assert!(guard.take_cmds().is_empty());
    }

    #[test]
    fn unknown_session_errors() {
        let reg = SessionRegistry::new();
        assert!(matches!(
            reg.add_cmds(MsgId(99), vec![Command::open_centered(Uid(1))]),
            Err(RegistryError::SessionNotFound(MsgId(99)))
        ));
        assert!(!reg.progress(MsgId(99), 0.5, ""));
    }

    #[test]
    fn snapshot_is_sorted() {
        let reg = SessionRegistry::new();
        let _a = reg.open("A", None);
        let _b = reg.open("B", None);
        let ids: Vec<MsgId> = reg.snapshot().into_iter().map(|i| i.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
