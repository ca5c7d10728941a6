//! Process Runner: bounded external subprocess execution with live
//! line-by-line progress delivery and guaranteed kill-on-cancel.

mod group;
mod registry;
mod runner;

pub use group::ProcessGroup;
pub use registry::ActiveProcessRegistry;
pub use runner::{CancelToken, ProcessRunner, RunOutcome};
