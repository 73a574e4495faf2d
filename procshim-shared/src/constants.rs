//! Protocol constants shared between the supervisor and the helper
//!
//! These values must be identical on both sides of the helper boundary.

/// File descriptors inherited by the helper.
pub mod fds {
    /// Write end of the launch status pipe.
    pub const STATUS: i32 = 3;

    /// Write end of the log pipe.
    pub const LOG: i32 = 4;
}

/// Launch status byte values written on [`fds::STATUS`].
pub mod status {
    /// The low-level runtime started the process.
    pub const STARTED: u8 = 0;

    /// Generic failure when no more specific code is available.
    pub const FAILED: u8 = 1;
}

/// Helper command line.
pub mod helper {
    /// Default helper binary name.
    pub const BINARY: &str = "procshim-helper";

    /// Subcommand that executes a process through the runtime.
    pub const EXEC: &str = "exec";

    pub const FLAG_TTY: &str = "--tty";
    pub const FLAG_ROWS: &str = "--rows";
    pub const FLAG_COLS: &str = "--cols";
    pub const FLAG_UID: &str = "--uid";
    pub const FLAG_GID: &str = "--gid";
}

/// Low-level runtime command line used by the helper.
pub mod runtime {
    /// Log destination for the runtime: the helper's inherited log pipe.
    pub const LOG_PATH: &str = "/proc/self/fd/4";

    /// Log format requested from the runtime.
    pub const LOG_FORMAT: &str = "json";

    /// Exit code reported when the runtime could not exec the process.
    pub const EXEC_FAILED_CODE: i32 = 127;

    /// Offset added to a signal number to form an exit code.
    pub const SIGNAL_EXIT_BASE: i32 = 128;
}

/// Environment variables.
pub mod envs {
    pub const HELPER: &str = "PROCSHIM_HELPER";
    pub const RUNTIME: &str = "PROCSHIM_RUNTIME";
    pub const PROCESSES_DIR: &str = "PROCSHIM_PROCESSES_DIR";
    pub const RUNTIME_DIR: &str = "PROCSHIM_RUNTIME_DIR";
}
