//! Process directory layout shared between supervisor and helper.
//!
//! ```text
//! {processes}/{process-id}/
//! ├── stdin        # FIFO: bytes for the process's standard input
//! ├── stdout       # FIFO: standard output
//! ├── stderr       # FIFO: standard error
//! ├── winsz        # FIFO: JSON window-size updates (TTY only)
//! ├── exit         # FIFO: one byte once the process has exited
//! ├── exitcode     # file: decimal exit code, written before `exit`
//! └── pidfile      # file: decimal pid, written once the process runs
//! ```

use std::path::{Path, PathBuf};

/// Object names inside a process directory.
pub mod names {
    pub const STDIN: &str = "stdin";
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
    pub const WINSZ: &str = "winsz";
    pub const EXIT: &str = "exit";
    pub const EXIT_CODE: &str = "exitcode";
    pub const PID_FILE: &str = "pidfile";
}

/// Paths of the protocol objects of one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessLayout {
    root: PathBuf,
}

impl ProcessLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for `id` under a processes root.
    pub fn under(processes_dir: &Path, id: &str) -> Self {
        Self::new(processes_dir.join(id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stdin(&self) -> PathBuf {
        self.root.join(names::STDIN)
    }

    pub fn stdout(&self) -> PathBuf {
        self.root.join(names::STDOUT)
    }

    pub fn stderr(&self) -> PathBuf {
        self.root.join(names::STDERR)
    }

    pub fn winsz(&self) -> PathBuf {
        self.root.join(names::WINSZ)
    }

    pub fn exit(&self) -> PathBuf {
        self.root.join(names::EXIT)
    }

    pub fn exit_code(&self) -> PathBuf {
        self.root.join(names::EXIT_CODE)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(names::PID_FILE)
    }

    /// Every FIFO of the layout, in creation order.
    pub fn fifos(&self) -> [PathBuf; 5] {
        [
            self.stdin(),
            self.stdout(),
            self.stderr(),
            self.winsz(),
            self.exit(),
        ]
    }

    /// The three stdio FIFOs in the order both sides open them.
    pub fn stdio(&self) -> [PathBuf; 3] {
        [self.stdin(), self.stdout(), self.stderr()]
    }
}
