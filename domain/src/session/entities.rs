//! Session domain entities

use serde::{Deserialize, Serialize};

/// Host-assigned handle for one in-flight request.
///
/// Values are assigned from a monotonic counter and are unique within one
/// router lifetime. `0` is reserved for "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(pub u64);

impl MsgId {
    /// The reserved "no session" id.
    pub const NONE: MsgId = MsgId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MsgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MsgId {
    fn from(value: u64) -> Self {
        MsgId(value)
    }
}

impl std::str::FromStr for MsgId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(MsgId)
    }
}

/// Snapshot of one session, as broadcast by `get_msgs` and returned by
/// `find_msg_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsgInfo {
    pub id: MsgId,
    /// Tool (app) the session is executing in.
    pub tool: String,
    /// Optional display name set with `set_msg_name`.
    #[serde(default)]
    pub name: String,
    /// Unix seconds when the session was opened.
    pub start_time: f64,
    /// Progress fraction in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub progress_label: String,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub parent: Option<MsgId>,
}

impl MsgInfo {
    /// Progress as a whole percentage, clamped to `0..=100`.
    pub fn percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// Seconds since the session started, relative to `now` (unix seconds).
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.start_time).max(0.0)
    }
}

/// Convert the wire progress value (`done * 10000`) into a fraction.
pub fn progress_from_wire(done: u64) -> f64 {
    (done as f64 / 10000.0).clamp(0.0, 1.0)
}

/// Convert a progress fraction into the wire value (`done * 10000`).
pub fn progress_to_wire(done: f64) -> u64 {
    (done.clamp(0.0, 1.0) * 10000.0).round() as u64
}
