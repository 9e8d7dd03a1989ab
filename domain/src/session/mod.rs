//! Request session domain.
//!
//! - [`entities::MsgId`]: host-assigned id of one in-flight request
//! - [`entities::MsgInfo`]: snapshot rendered by the progress tray

pub mod entities;
