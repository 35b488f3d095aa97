//! `execute()` chaining between StreamSheets.
//!
//! A caller halts on its `execute()` cell until the callee has run the
//! requested repetitions. The machine drives frames (see
//! `machine::chain`); this module holds the data.

mod bridge;
mod frame;

pub use bridge::{ExecuteBridge, PendingCall};
pub use frame::{ExecuteCall, ExecuteFrame, FrameWait, Pace, TurnKind};
