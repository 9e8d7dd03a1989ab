//! Frame codec shared by the router and the tool runtime.
//!
//! One TCP connection carries exactly one request and its reply. The
//! request starts with the command name as a byte-array frame.

mod error;
mod frame;

pub use error::{Result, WireError};
pub use frame::{FrameConn, MAX_FRAME_LEN};
