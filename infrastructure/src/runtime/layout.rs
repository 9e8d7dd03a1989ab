//! UI builder used by tool functions.
//!
//! A tool's `run` adds widgets to a [`UiLayout`]. Each widget that accepts
//! input is bound to a field of the parameter record through a lens
//! (`|p| &mut p.field`) and may carry a callback. The layout keeps these
//! bindings keyed by uid so a later change event can be replayed: locate
//! the node, write the value through the lens, then run the callback.

use super::context::ToolContext;
use super::error::Result;
use std::collections::HashMap;
use tooldesk_domain::{
    GridCoord, GridSize, MapView, PaintCommand, Rgba, UiNode, Uid, Widget, WidgetValue,
};
use tracing::debug;

pub(crate) type Writer<P> = Box<dyn Fn(&mut P, &WidgetValue) + Send>;
pub(crate) type Callback<P> =
    Box<dyn FnMut(&mut P, &mut ToolContext, &WidgetValue) -> Result<()> + Send>;
pub(crate) type UpdateHook<P> =
    Box<dyn FnMut(&mut P, &mut ToolContext, &mut UiLayout<P>, NodeId) -> Result<()> + Send>;

pub(crate) struct Binding<P> {
    pub(crate) writer: Option<Writer<P>>,
    pub(crate) callback: Option<Callback<P>>,
    pub(crate) update: Option<UpdateHook<P>>,
}

impl<P> Default for Binding<P> {
    fn default() -> Self {
        Self {
            writer: None,
            callback: None,
            update: None,
        }
    }
}

/// Handle to a node added to a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) Uid);

impl NodeId {
    pub fn uid(&self) -> Uid {
        self.0
    }
}

fn text_of(value: &WidgetValue) -> Option<String> {
    match value {
        WidgetValue::Text(t) => Some(t.clone()),
        _ => None,
    }
}

fn float_of(value: &WidgetValue) -> Option<f64> {
    match value {
        WidgetValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn int_of(value: &WidgetValue) -> Option<i64> {
    match value {
        WidgetValue::Int(i) => Some(*i),
        _ => None,
    }
}

fn bool_of(value: &WidgetValue) -> Option<bool> {
    match value {
        WidgetValue::Bool(b) => Some(*b),
        _ => None,
    }
}

fn color_of(value: &WidgetValue) -> Option<Rgba> {
    match value {
        WidgetValue::Color(c) => Some(*c),
        _ => None,
    }
}

fn map_of(value: &WidgetValue) -> Option<MapView> {
    match value {
        WidgetValue::Map(m) => Some(*m),
        _ => None,
    }
}

fn bytes_of(value: &WidgetValue) -> Option<Vec<u8>> {
    match value {
        WidgetValue::Bytes(b) => Some(b.clone()),
        _ => None,
    }
}

/// Step from a node to one of its children (`false`) or dialogs (`true`).
type Slot = (bool, usize);

/// Declarative widget tree under construction, plus its bindings.
pub struct UiLayout<P> {
    root: UiNode,
    bindings: HashMap<Uid, Binding<P>>,
    /// Path from the root to every node, so lookups cost the tree depth.
    index: HashMap<Uid, Vec<Slot>>,
}

impl<P: 'static> UiLayout<P> {
    pub(crate) fn new(root_uid: Uid) -> Self {
        Self {
            root: UiNode::new(root_uid, "", GridCoord::default(), Widget::Layout),
            bindings: HashMap::new(),
            index: HashMap::from([(root_uid, Vec::new())]),
        }
    }

    fn node_at(&self, uid: Uid) -> Option<&UiNode> {
        let mut node = &self.root;
        for &(dialog, pos) in self.index.get(&uid)? {
            node = if dialog { node.dialogs.get(pos)? } else { node.children.get(pos)? };
        }
        Some(node)
    }

    fn node_at_mut(&mut self, uid: Uid) -> Option<&mut UiNode> {
        let mut node = &mut self.root;
        for &(dialog, pos) in self.index.get(&uid)? {
            node = if dialog {
                node.dialogs.get_mut(pos)?
            } else {
                node.children.get_mut(pos)?
            };
        }
        Some(node)
    }

    pub fn root(&self) -> NodeId {
        NodeId(self.root.uid)
    }

    pub fn document(&self) -> &UiNode {
        &self.root
    }

    pub fn find(&self, uid: Uid) -> Option<&UiNode> {
        self.node_at(uid)
    }

    /// Direct access for attributes without a dedicated adder (tooltip,
    /// enabled, grid sizes, multiline).
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut UiNode> {
        self.node_at_mut(node.0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.root)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        widget: Widget,
        dialog: bool,
    ) -> NodeId {
        let uid = parent.0.child(name, &grid);
        let node = UiNode::new(uid, name, grid, widget);
        let parent_uid = if self.index.contains_key(&parent.0) {
            parent.0
        } else {
            debug!(%uid, parent = %parent.0, "unknown parent, attaching to root");
            self.root.uid
        };
        let Some(target) = self.node_at_mut(parent_uid) else {
            return NodeId(uid);
        };
        let slot = if dialog {
            target.dialogs.push(node);
            (true, target.dialogs.len() - 1)
        } else {
            target.children.push(node);
            (false, target.children.len() - 1)
        };
        let mut path = self.index.get(&parent_uid).cloned().unwrap_or_default();
        path.push(slot);
        // A repeated name and grid under one parent resolves to the first.
        self.index.entry(uid).or_insert(path);
        NodeId(uid)
    }

    fn binding(&mut self, node: NodeId) -> &mut Binding<P> {
        self.bindings.entry(node.0).or_default()
    }

    fn bind<T, L>(&mut self, node: NodeId, lens: L, extract: fn(&WidgetValue) -> Option<T>)
    where
        T: 'static,
        L: Fn(&mut P) -> &mut T + Send + 'static,
    {
        self.binding(node).writer = Some(Box::new(move |params: &mut P, value: &WidgetValue| {
            if let Some(v) = extract(value) {
                *lens(params) = v;
            }
        }));
    }

    /// Run `callback` after the node's value has been written.
    ///
    /// Replaces any callback the node already had.
    pub fn on_change<F>(&mut self, node: NodeId, mut callback: F) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext) -> Result<()> + Send + 'static,
    {
        self.binding(node).callback = Some(Box::new(
            move |params: &mut P, ctx: &mut ToolContext, _: &WidgetValue| callback(params, ctx),
        ));
        node
    }

    /// Register a partial-refresh hook. On `update(node)` the node's
    /// children are cleared and the hook re-adds them.
    pub fn on_update<F>(&mut self, node: NodeId, hook: F) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext, &mut UiLayout<P>, NodeId) -> Result<()>
            + Send
            + 'static,
    {
        if let Some(n) = self.node_at_mut(node.0) {
            n.updatable = true;
        }
        self.binding(node).update = Some(Box::new(hook));
        node
    }

    pub fn layout(&mut self, parent: NodeId, name: &str, grid: GridCoord) -> NodeId {
        self.insert(parent, name, grid, Widget::Layout, false)
    }

    /// Layout with explicit column and row sizes.
    pub fn grid(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        cols: Vec<GridSize>,
        rows: Vec<GridSize>,
    ) -> NodeId {
        let node = self.layout(parent, name, grid);
        if let Some(n) = self.node_at_mut(node.0) {
            n.cols = cols;
            n.rows = rows;
        }
        node
    }

    /// Dialog attached to `parent`, opened later with
    /// [`ToolContext::open_centered`] or [`ToolContext::open_relative`].
    pub fn dialog(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.insert(parent, name, GridCoord::default(), Widget::Layout, true)
    }

    pub fn text(&mut self, parent: NodeId, name: &str, grid: GridCoord, label: &str) -> NodeId {
        let widget = Widget::Text {
            label: label.to_string(),
            drop_target: false,
        };
        self.insert(parent, name, grid, widget, false)
    }

    /// Text that accepts dropped text.
    pub fn text_drop<F>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        label: &str,
        mut on_drop: F,
    ) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext, String) -> Result<()> + Send + 'static,
    {
        let widget = Widget::Text {
            label: label.to_string(),
            drop_target: true,
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.binding(node).callback = Some(Box::new(
            move |params: &mut P, ctx: &mut ToolContext, value: &WidgetValue| {
                on_drop(params, ctx, text_of(value).unwrap_or_default())
            },
        ));
        node
    }

    pub fn button<F>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        label: &str,
        on_click: F,
    ) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext) -> Result<()> + Send + 'static,
    {
        let widget = Widget::Button {
            label: label.to_string(),
            icon: String::new(),
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.on_change(node, on_click)
    }

    pub fn editbox<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: &str,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut String + Send + 'static,
    {
        let widget = Widget::Editbox {
            value: value.to_string(),
            multiline: false,
            name: name.to_string(),
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, text_of);
        node
    }

    #[allow(clippy::too_many_arguments)]
    pub fn slider<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: f64,
        range: (f64, f64),
        step: f64,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut f64 + Send + 'static,
    {
        let widget = Widget::Slider {
            value,
            min: range.0,
            max: range.1,
            step,
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, float_of);
        node
    }

    /// `options` pairs a label with the value stored when it is picked.
    pub fn dropdown<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: &str,
        options: &[(&str, &str)],
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut String + Send + 'static,
    {
        let widget = Widget::Dropdown {
            value: value.to_string(),
            labels: options.iter().map(|(label, _)| label.to_string()).collect(),
            values: options.iter().map(|(_, v)| v.to_string()).collect(),
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, text_of);
        node
    }

    pub fn switch<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        label: &str,
        value: bool,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut bool + Send + 'static,
    {
        let widget = Widget::Switch {
            value,
            label: label.to_string(),
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, bool_of);
        node
    }

    pub fn checkbox<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        label: &str,
        value: bool,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut bool + Send + 'static,
    {
        let widget = Widget::Checkbox {
            value,
            label: label.to_string(),
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, bool_of);
        node
    }

    pub fn file_picker<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        path: &str,
        select_file: bool,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut String + Send + 'static,
    {
        let widget = Widget::FilePicker {
            path: path.to_string(),
            select_file,
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, text_of);
        node
    }

    /// `value` is unix seconds.
    pub fn date_picker<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: i64,
        show_time: bool,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut i64 + Send + 'static,
    {
        let widget = Widget::DatePicker { value, show_time };
        let node = self.insert(parent, name, grid, widget, false);
        self.bind(node, lens, int_of);
        node
    }

    pub fn color_picker<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: Rgba,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut Rgba + Send + 'static,
    {
        let node = self.insert(parent, name, grid, Widget::ColorPicker { value }, false);
        self.bind(node, lens, color_of);
        node
    }

    pub fn map<L>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        value: MapView,
        lens: L,
    ) -> NodeId
    where
        L: Fn(&mut P) -> &mut MapView + Send + 'static,
    {
        let node = self.insert(parent, name, grid, Widget::Map { value }, false);
        self.bind(node, lens, map_of);
        node
    }

    /// Microphone button. The host records through `start_microphone` /
    /// `stop_microphone` and delivers the audio (or transcript) as bytes.
    pub fn microphone<F>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        mic_uid: &str,
        format: &str,
        mut on_audio: F,
    ) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext, Vec<u8>) -> Result<()> + Send + 'static,
    {
        let widget = Widget::Microphone {
            mic_uid: mic_uid.to_string(),
            format: format.to_string(),
            transcribe: false,
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.binding(node).callback = Some(Box::new(
            move |params: &mut P, ctx: &mut ToolContext, value: &WidgetValue| {
                on_audio(params, ctx, bytes_of(value).unwrap_or_default())
            },
        ));
        node
    }

    /// Draggable button; `on_move` receives the position it was dropped on.
    #[allow(clippy::too_many_arguments)]
    pub fn button_drop_move<F>(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        label: &str,
        group: &str,
        pos: i64,
        mut on_move: F,
    ) -> NodeId
    where
        F: FnMut(&mut P, &mut ToolContext, i64) -> Result<()> + Send + 'static,
    {
        let widget = Widget::ButtonDropMove {
            label: label.to_string(),
            group: group.to_string(),
            pos,
        };
        let node = self.insert(parent, name, grid, widget, false);
        self.binding(node).callback = Some(Box::new(
            move |params: &mut P, ctx: &mut ToolContext, value: &WidgetValue| {
                on_move(params, ctx, int_of(value).unwrap_or(pos))
            },
        ));
        node
    }

    pub fn canvas(
        &mut self,
        parent: NodeId,
        name: &str,
        grid: GridCoord,
        paint: Vec<PaintCommand>,
    ) -> NodeId {
        self.insert(parent, name, grid, Widget::Canvas { paint }, false)
    }

    /// Remove the children and dialogs of `node` together with their
    /// bindings. The node's own binding stays.
    pub(crate) fn clear_children(&mut self, node: NodeId) {
        let Some(n) = self.node_at_mut(node.0) else {
            return;
        };
        let removed: Vec<Uid> = n
            .children
            .iter()
            .chain(n.dialogs.iter())
            .flat_map(UiNode::uids)
            .collect();
        n.children.clear();
        n.dialogs.clear();
        for uid in removed {
            self.bindings.remove(&uid);
            self.index.remove(&uid);
        }
    }

    pub(crate) fn binding_mut(&mut self, uid: Uid) -> Option<&mut Binding<P>> {
        self.bindings.get_mut(&uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Form {
        title: String,
        volume: f64,
    }

    fn build(layout: &mut UiLayout<Form>, form: &Form) -> NodeId {
        let root = layout.root();
        let body = layout.layout(root, "body", GridCoord::new(0, 0, 1, 1));
        layout.editbox(body, "title", GridCoord::new(0, 0, 2, 1), &form.title, |f| {
            &mut f.title
        });
        layout.slider(
            body,
            "volume",
            GridCoord::new(0, 1, 1, 1),
            form.volume,
            (0.0, 1.0),
            0.1,
            |f| &mut f.volume,
        );
        layout.dialog(root, "confirm")
    }

    #[test]
    fn identical_builds_yield_identical_uids() {
        let form = Form::default();
        let mut a = UiLayout::new(Uid(10));
        let mut b = UiLayout::new(Uid(10));
        build(&mut a, &form);
        build(&mut b, &form);
        assert_eq!(a.document().uids(), b.document().uids());
        assert_eq!(a.document().uids().len(), 5);
    }

    #[test]
    fn moving_a_widget_changes_its_uid() {
        let mut layout: UiLayout<Form> = UiLayout::new(Uid(1));
        let root = layout.root();
        let here = layout.text(root, "label", GridCoord::new(0, 0, 1, 1), "Hi");
        let there = layout.text(root, "label", GridCoord::new(0, 1, 1, 1), "Hi");
        assert_ne!(here, there);
    }

    #[test]
    fn dialogs_are_kept_apart_from_children() {
        let mut layout = UiLayout::new(Uid(3));
        let dialog = build(&mut layout, &Form::default());
        let root = layout.document();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.dialogs.len(), 1);
        assert_eq!(root.dialogs[0].uid, dialog.uid());
    }

    #[test]
    fn lens_writes_into_the_record() {
        let mut layout = UiLayout::new(Uid(4));
        build(&mut layout, &Form::default());
        let title_uid = layout.document().children[0].children[0].uid;

        let mut form = Form::default();
        let binding = layout.binding_mut(title_uid).unwrap();
        let writer = binding.writer.as_ref().unwrap();
        writer(&mut form, &WidgetValue::Text("Groceries".to_string()));
        writer(&mut form, &WidgetValue::Float(3.0));
        assert_eq!(form.title, "Groceries");
    }

    #[test]
    fn clearing_children_drops_their_bindings() {
        let mut layout = UiLayout::new(Uid(5));
        build(&mut layout, &Form::default());
        let body = NodeId(layout.document().children[0].uid);
        let title_uid = layout.document().children[0].children[0].uid;

        layout.clear_children(body);
        assert!(layout.find(title_uid).is_none());
        assert!(layout.binding_mut(title_uid).is_none());
        assert!(layout.find(body.uid()).is_some());
    }

    #[test]
    fn index_follows_clear_and_rebuild() {
        let mut layout = UiLayout::new(Uid(7));
        build(&mut layout, &Form::default());
        let body = NodeId(layout.document().children[0].uid);
        layout.clear_children(body);
        let row = layout.layout(body, "row", GridCoord::new(0, 0, 1, 1));
        let label = layout.text(row, "label", GridCoord::new(0, 0, 1, 1), "Hi");
        let note = layout.dialog(row, "note");

        for uid in layout.document().uids() {
            let indexed = layout.find(uid).unwrap();
            assert_eq!(Some(indexed), layout.document().find(uid));
        }
        assert_eq!(layout.find(label.uid()).unwrap().name, "label");
        assert_eq!(layout.find(note.uid()).unwrap().name, "note");
        assert!(layout.node_mut(row).is_some());
    }

    #[test]
    fn serialized_document_names_widget_kinds() {
        let mut layout = UiLayout::new(Uid(6));
        build(&mut layout, &Form::default());
        let json: serde_json::Value = serde_json::from_str(&layout.to_json().unwrap()).unwrap();
        assert_eq!(json["Children"][0]["Children"][0]["Widget"]["Kind"], "Editbox");
    }
}
