//! Runner configuration and constants.

pub mod constants;
pub mod options;

pub use options::ExecRunnerOptions;
