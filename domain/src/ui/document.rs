//! Serialized UI document exchanged between tools and the host.

use super::uid::{GridCoord, Uid};
use super::widget::Widget;
use serde::{Deserialize, Serialize};

/// Column or row sizing of a layout grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GridSize {
    pub pos: i32,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub resizable: bool,
}

/// One node of the UI tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UiNode {
    pub uid: Uid,
    pub name: String,
    pub grid: GridCoord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cols: Vec<GridSize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<GridSize>,
    pub widget: Widget,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tooltip: String,
    /// Set when the node has an `update` hook for partial refreshes.
    #[serde(default)]
    pub updatable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialogs: Vec<UiNode>,
}

fn default_enabled() -> bool {
    true
}

impl UiNode {
    pub fn new(uid: Uid, name: impl Into<String>, grid: GridCoord, widget: Widget) -> Self {
        Self {
            uid,
            name: name.into(),
            grid,
            cols: Vec::new(),
            rows: Vec::new(),
            widget,
            enabled: true,
            tooltip: String::new(),
            updatable: false,
            children: Vec::new(),
            dialogs: Vec::new(),
        }
    }

    /// Depth-first search (children before dialogs) for `uid`.
    pub fn find(&self, uid: Uid) -> Option<&UiNode> {
        if self.uid == uid {
            return Some(self);
        }
        self.children
            .iter()
            .chain(self.dialogs.iter())
            .find_map(|child| child.find(uid))
    }

    pub fn find_mut(&mut self, uid: Uid) -> Option<&mut UiNode> {
        if self.uid == uid {
            return Some(self);
        }
        self.children
            .iter_mut()
            .chain(self.dialogs.iter_mut())
            .find_map(|child| child.find_mut(uid))
    }

    /// All uids in depth-first order.
    pub fn uids(&self) -> Vec<Uid> {
        let mut out = Vec::new();
        self.collect_uids(&mut out);
        out
    }

    fn collect_uids(&self, out: &mut Vec<Uid>) {
        out.push(self.uid);
        for child in self.children.iter().chain(self.dialogs.iter()) {
            child.collect_uids(out);
        }
    }

    /// True when the tree carries no widgets beyond an empty root layout.
    pub fn is_empty(&self) -> bool {
        matches!(self.widget, Widget::Layout) && self.children.is_empty() && self.dialogs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UiNode {
        let root_uid = Uid(1);
        let mut root = UiNode::new(root_uid, "root", GridCoord::default(), Widget::Layout);
        let g = GridCoord::new(0, 0, 1, 1);
        let mut list = UiNode::new(root_uid.child("list", &g), "list", g, Widget::Layout);
        let g2 = GridCoord::new(0, 1, 1, 1);
        list.children.push(UiNode::new(
            list.uid.child("ok", &g2),
            "ok",
            g2,
            Widget::Button {
                label: "OK".to_string(),
                icon: String::new(),
            },
        ));
        root.children.push(list);
        root.dialogs.push(UiNode::new(
            root_uid.child("dialog", &g),
            "dialog",
            g,
            Widget::Layout,
        ));
        root
    }

    #[test]
    fn find_descends_into_children_and_dialogs() {
        let root = sample();
        for uid in root.uids() {
            assert_eq!(root.find(uid).map(|n| n.uid), Some(uid));
        }
        assert!(root.find(Uid(999)).is_none());
    }

    #[test]
    fn uids_are_unique() {
        let uids = sample().uids();
        let mut dedup = uids.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(uids.len(), dedup.len());
    }

    #[test]
    fn empty_root_is_detected() {
        let root = UiNode::new(Uid(1), "root", GridCoord::default(), Widget::Layout);
        assert!(root.is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let root = sample();
        let json = serde_json::to_string(&root).unwrap();
        let back: UiNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, root);
    }
}
