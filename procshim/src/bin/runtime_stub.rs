//! Minimal stand-in for a low-level OCI runtime.
//!
//! Implements only the `exec` invocation the helper makes:
//!
//! ```text
//! procshim-runtime-stub --log <path> --log-format json \
//!     exec --pid-file <path> --process <process.json> <handle>
//! ```
//!
//! The process runs directly on the host (no namespaces) with the stub's
//! stdio. Exits with the process's exit code.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use procshim::runtime::constants::{fds, runtime};
use procshim::util;
use procshim_shared::spec::ProcessSpec;
use thiserror::Error;

/// procshim runtime stub - runs a process.json on the host
#[derive(Parser, Debug)]
#[command(author, version, about = "procshim runtime stub - runs a process.json on the host")]
struct StubArgs {
    /// Where to write JSON log records
    #[arg(long)]
    log: Option<PathBuf>,

    /// Log format; only json is supported
    #[arg(long, default_value = runtime::LOG_FORMAT)]
    log_format: String,

    #[command(subcommand)]
    command: StubCommand,
}

#[derive(Subcommand, Debug)]
enum StubCommand {
    /// Execute a process
    Exec {
        #[arg(long)]
        pid_file: PathBuf,
        #[arg(long)]
        process: PathBuf,
        /// Container handle (unused)
        handle: String,
    },
}

#[derive(Debug, Error)]
enum StubError {
    #[error("read process file {path}: {source}")]
    ProcessFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decode process file: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("process args are empty")]
    NoArgs,

    #[error("exec: {program:?}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("write pid file: {0}")]
    PidFile(#[source] io::Error),

    #[error("wait: {0}")]
    Wait(#[source] io::Error),
}

fn init_logging(log: Option<&Path>) {
    let env_filter = util::default_env_filter();
    let file = log.and_then(|path| OpenOptions::new().append(true).create(true).open(path).ok());
    match file {
        Some(file) => {
            if log == Some(Path::new(runtime::LOG_PATH)) {
                // The process must not keep the log pipe open.
                // SAFETY: fd 4 is open (the path above resolved through it)
                // and stays open for this call.
                let log_fd = unsafe { BorrowedFd::borrow_raw(fds::LOG) };
                let _ = fcntl(log_fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
            }
            util::register_json_to_tracing(Mutex::new(file), env_filter);
        }
        None => util::register_json_to_tracing(io::stderr, env_filter),
    }
}

fn exec(pid_file: &Path, process: &Path) -> Result<i32, StubError> {
    let raw = std::fs::read(process).map_err(|source| StubError::ProcessFile {
        path: process.to_path_buf(),
        source,
    })?;
    let spec: ProcessSpec = serde_json::from_slice(&raw)?;
    let (program, args) = spec.args.split_first().ok_or(StubError::NoArgs)?;

    let mut cmd = Command::new(program);
    cmd.args(args).env_clear().envs(spec.env_pairs());
    if !spec.cwd.is_empty() {
        cmd.current_dir(&spec.cwd);
    }

    let mut child = cmd.spawn().map_err(|source| StubError::Exec {
        program: program.clone(),
        source,
    })?;
    tracing::debug!(pid = child.id(), "Process started");

    write_pid_file(pid_file, child.id()).map_err(StubError::PidFile)?;

    let status = child.wait().map_err(StubError::Wait)?;
    Ok(status
        .code()
        .unwrap_or_else(|| runtime::SIGNAL_EXIT_BASE + status.signal().unwrap_or_default()))
}

/// Write the pid file so readers never see it partially written.
fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::fs::write(tmp.path(), pid.to_string())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn main() {
    let args = StubArgs::parse();
    init_logging(args.log.as_deref());
    if args.log_format != runtime::LOG_FORMAT {
        tracing::warn!(format = %args.log_format, "Unsupported log format, using json");
    }

    let StubCommand::Exec {
        pid_file,
        process,
        handle,
    } = args.command;
    tracing::debug!(%handle, "exec");

    let code = match exec(&pid_file, &process) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            runtime::EXEC_FAILED_CODE
        }
    };
    std::process::exit(code);
}
