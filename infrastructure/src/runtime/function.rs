//! Tool functions, the dispatch table, and cached UI roots.

use super::context::ToolContext;
use super::error::{Result, ToolError};
use super::layout::{NodeId, UiLayout};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tooldesk_domain::{ChangeEvent, DomainError, Uid};
use tracing::debug;

/// A function a tool exposes to the host, to other tools and to the LLM.
///
/// The implementing type is the parameter record: it is deserialized from
/// the caller's JSON, `run` fills its `Out_*` fields and builds the UI, and
/// the record is serialized back into the reply.
pub trait ToolFunction: Serialize + DeserializeOwned + Default + Send + 'static {
    fn run(&mut self, ctx: &mut ToolContext, ui: &mut UiLayout<Self>) -> Result<()>;
}

/// Parameter record and layout kept alive for `change` / `update`.
pub(crate) trait LiveRoot: Send {
    fn function(&self) -> &str;

    fn params_json(&self) -> Result<String>;

    /// Replay `event` against the widget it targets.
    fn change(&mut self, ctx: &mut ToolContext, event: &ChangeEvent) -> Result<()>;

    /// Re-run the update hook of `sub_uid` and return the sub-tree JSON.
    fn update(&mut self, ctx: &mut ToolContext, sub_uid: Uid) -> Result<String>;
}

struct Root<P> {
    function: String,
    params: P,
    layout: UiLayout<P>,
}

impl<P: ToolFunction> LiveRoot for Root<P> {
    fn function(&self) -> &str {
        &self.function
    }

    fn params_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.params)?)
    }

    fn change(&mut self, ctx: &mut ToolContext, event: &ChangeEvent) -> Result<()> {
        let uid = event.target_uid;
        let node = self
            .layout
            .find(uid)
            .ok_or(DomainError::UidNotFound(uid.as_u64()))?;
        let value = node.widget.value_from_event(event)?;
        if !node.widget.is_action() && node.widget.current_value() == value {
            return Ok(());
        }

        if let Some(node) = self.layout.node_mut(NodeId(uid)) {
            node.widget.set_value(&value);
        }
        let Some(binding) = self.layout.binding_mut(uid) else {
            return Ok(());
        };
        if let Some(writer) = &binding.writer {
            writer(&mut self.params, &value);
        }
        if let Some(callback) = binding.callback.as_mut() {
            callback(&mut self.params, ctx, &value)?;
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut ToolContext, sub_uid: Uid) -> Result<String> {
        let mut hook = self
            .layout
            .binding_mut(sub_uid)
            .and_then(|binding| binding.update.take())
            .ok_or(DomainError::UidNotFound(sub_uid.as_u64()))?;
        let node = NodeId(sub_uid);
        self.layout.clear_children(node);
        let result = hook(&mut self.params, ctx, &mut self.layout, node);
        if let Some(binding) = self.layout.binding_mut(sub_uid) {
            binding.update = Some(hook);
        }
        result?;

        let sub_tree = self
            .layout
            .find(sub_uid)
            .ok_or(DomainError::UidNotFound(sub_uid.as_u64()))?;
        Ok(serde_json::to_string(sub_tree)?)
    }
}

/// Result of one `build`.
pub(crate) struct Built {
    pub root: Box<dyn LiveRoot>,
    pub params_json: String,
    pub ui_json: String,
}

type BuildFn = fn(&mut ToolContext, &str, Uid, &str) -> Result<Built>;

fn build_root<P: ToolFunction>(
    ctx: &mut ToolContext,
    function: &str,
    ui_uid: Uid,
    params_json: &str,
) -> Result<Built> {
    let mut params: P = if params_json.trim().is_empty() {
        P::default()
    } else {
        serde_json::from_str(params_json)?
    };
    let mut layout = UiLayout::new(ui_uid);
    params.run(ctx, &mut layout)?;
    let params_json = serde_json::to_string(&params)?;
    let ui_json = layout.to_json()?;
    Ok(Built {
        root: Box::new(Root {
            function: function.to_string(),
            params,
            layout,
        }),
        params_json,
        ui_json,
    })
}

/// Static dispatch table of a tool process.
#[derive(Default, Clone)]
pub struct ToolSet {
    functions: HashMap<String, BuildFn>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `P` under `name`.
    pub fn register<P: ToolFunction>(mut self, name: &str) -> Self {
        self.functions.insert(name.to_string(), build_root::<P>);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn build(
        &self,
        ctx: &mut ToolContext,
        function: &str,
        ui_uid: Uid,
        params_json: &str,
    ) -> Result<Built> {
        let build = self
            .functions
            .get(function)
            .ok_or_else(|| ToolError::msg(format!("Function not found: {}", function)))?;
        build(ctx, function, ui_uid, params_json)
    }
}

pub(crate) type SharedRoot = Arc<Mutex<Box<dyn LiveRoot>>>;

/// Roots kept per tool process before the least recently used is evicted.
pub(crate) const MAX_ROOTS: usize = 256;

/// UI roots by `ui_uid`. Each root has its own lock so changes on one root
/// serialize while different roots proceed in parallel.
///
/// Bounded: inserting past capacity evicts the root least recently built
/// or touched. A request already holding an evicted root finishes on it.
pub(crate) struct UiRegistry {
    roots: Mutex<HashMap<Uid, (SharedRoot, u64)>>,
    clock: std::sync::atomic::AtomicU64,
    capacity: usize,
}

impl Default for UiRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_ROOTS)
    }
}

impl UiRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
            clock: std::sync::atomic::AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    pub fn insert(&self, ui_uid: Uid, root: Box<dyn LiveRoot>) {
        let used = self.tick();
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.insert(ui_uid, (Arc::new(Mutex::new(root)), used));
        if roots.len() > self.capacity
            && let Some(oldest) = roots
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(uid, _)| *uid)
        {
            roots.remove(&oldest);
            debug!(ui_uid = %oldest, "UI root evicted");
        }
    }

    pub fn get(&self, ui_uid: Uid) -> Option<SharedRoot> {
        let used = self.tick();
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        let (root, last_used) = roots.get_mut(&ui_uid)?;
        *last_used = used;
        Some(Arc::clone(root))
    }

    pub fn len(&self) -> usize {
        self.roots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
