//! UI document domain.
//!
//! A tool produces a tree of [`document::UiNode`]s during `build`. Each node
//! has a [`uid::Uid`] derived from its position, so the host can replay a
//! [`change::ChangeEvent`] recorded against an older tree.

pub mod change;
pub mod document;
pub mod uid;
pub mod widget;
