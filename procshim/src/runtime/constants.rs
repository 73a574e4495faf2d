//! Constants for the procshim supervisor
//!
//! Centralized location for hardcoded values and paths.

// Re-export shared protocol constants
pub use procshim_shared::constants::{envs, fds, helper, runtime, status};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for procshim data under the home directory
    pub const PROCSHIM_DIR: &str = ".procshim";

    /// Subdirectory holding one directory per supervised process
    pub const PROCESSES_DIR: &str = "processes";
}

/// Permissions applied to created objects
pub mod modes {
    /// Process directories are private to the supervising user
    pub const PROCESS_DIR: u32 = 0o700;
}

/// Tracing targets
pub mod targets {
    /// Records forwarded from the helper and the low-level runtime
    pub const RUNTIME_LOG: &str = "procshim::runtime";
}

/// Thread names
pub mod threads {
    pub const REAPER_PREFIX: &str = "procshim-reaper";
    pub const LOG_FORWARDER: &str = "procshim-runtime-log";
}
