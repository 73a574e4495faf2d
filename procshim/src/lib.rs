//! procshim - detached process supervision over process directories
//!
//! A process is launched through a short-lived helper that executes a
//! low-level OCI runtime. Everything needed to reach the process afterwards
//! lives in its process directory: stdio FIFOs, a resize FIFO, an exit FIFO,
//! the exit code file and the pid file. Any process that knows the directory
//! can attach, wait and signal, so supervision survives restarts of the
//! daemon that called `run`.
//!
//! ```ignore
//! let runner = ExecRunner::new(ExecRunnerOptions::from_env()?)?;
//! let process = runner
//!     .run(&spec, &id, runner.processes_dir(), "my-container", None, io)
//!     .await?;
//! let code = process.wait().await?;
//! ```

pub mod controller;
pub mod process;
pub mod runtime;
pub mod util;

pub use controller::{DetachedRunner, ExecRunner, HelperCommand, HelperRunner, Reaper};
pub use process::{
    PidFileResolver, PidResolver, Process, ProcessDir, ProcessId, ProcessIo, Signal,
};
pub use runtime::ExecRunnerOptions;

pub use procshim_shared::errors::{ShimError, ShimResult, SupervisorError};
pub use procshim_shared::spec::{PreparedSpec, ProcessSpec, TtySpec, User, WindowSize};
