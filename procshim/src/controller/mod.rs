//! Helper-based process launching.
//!
//! This module provides the `ExecRunner` which launches processes by
//! spawning `procshim-helper` detached from the caller. The helper outlives
//! the caller, so a restarted daemon can `attach` to what it left behind.

mod log_stream;
mod pre_exec;
mod runner;
mod spawn;

pub use log_stream::LogForwarder;
pub use runner::{ExecRunner, helper_args};
pub use spawn::{DetachedRunner, HelperCommand, HelperRunner, Reaper};
