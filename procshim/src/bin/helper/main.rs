//! procshim helper - runs one process through a low-level runtime.
//!
//! Launched detached by `ExecRunner::run`. Reads the process spec on stdin,
//! connects to the process directory's FIFOs, executes the runtime and
//! reports through:
//! - fd 3: one launch status byte (0 = started)
//! - fd 4: JSON log records (shared with the runtime)
//! - `exitcode` + `exit`: the process's exit code once it is gone

mod error;
mod exec;
mod tty;

use std::fs::File;
use std::io::Write;
use std::os::fd::{BorrowedFd, FromRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use procshim::runtime::constants::{fds, status};
use procshim::util;

/// procshim helper - supervises one runtime exec
#[derive(Parser, Debug)]
#[command(author, version, about = "procshim helper - supervises one runtime exec")]
struct HelperArgs {
    /// Allocate a pty for the process
    #[arg(long)]
    tty: bool,

    /// Initial pty rows
    #[arg(long, default_value_t = 0)]
    rows: u16,

    /// Initial pty columns
    #[arg(long, default_value_t = 0)]
    cols: u16,

    /// Owner of the pty slave
    #[arg(long, default_value_t = 0)]
    uid: u32,

    /// Group of the pty slave
    #[arg(long, default_value_t = 0)]
    gid: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a process in an existing container
    Exec {
        /// Low-level OCI runtime binary
        runtime: PathBuf,
        /// Process directory
        dir: PathBuf,
        /// Container handle
        handle: String,
    },
}

/// Write end of the launch status pipe. Reports at most once.
pub(crate) struct StatusPipe(Option<File>);

impl StatusPipe {
    fn inherit() -> Self {
        // The runtime must not inherit the status pipe.
        match take_fd(fds::STATUS, true) {
            Some(file) => Self(Some(file)),
            None => {
                tracing::warn!("No status pipe on fd {}", fds::STATUS);
                Self(None)
            }
        }
    }

    pub(crate) fn report(&mut self, byte: u8) {
        if let Some(mut pipe) = self.0.take()
            && let Err(e) = pipe.write_all(&[byte])
        {
            tracing::warn!(error = %e, "Failed to write launch status");
        }
    }
}

/// Adopt an inherited descriptor if it is open.
fn take_fd(fd: RawFd, cloexec: bool) -> Option<File> {
    // SAFETY: borrowed only for the flag lookup; `fd` is not closed meanwhile.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    fcntl(borrowed, FcntlArg::F_GETFD).ok()?;
    // SAFETY: the descriptor is open, was handed to us by the parent and
    // nothing else in this process owns it.
    let file = unsafe { File::from_raw_fd(fd) };
    if cloexec && let Err(e) = fcntl(&file, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
        tracing::warn!(fd, error = %e, "Failed to mark descriptor close-on-exec");
    }
    Some(file)
}

/// Log JSON to fd 4 (inherited by the runtime, so not close-on-exec).
fn init_logging() {
    let env_filter = util::default_env_filter();
    match take_fd(fds::LOG, false) {
        Some(log) => util::register_json_to_tracing(Mutex::new(log), env_filter),
        None => util::register_json_to_tracing(std::io::stderr, env_filter),
    }
}

fn main() {
    let args = HelperArgs::parse();
    init_logging();
    let mut status_pipe = StatusPipe::inherit();

    let Command::Exec {
        runtime,
        dir,
        handle,
    } = args.command;
    let tty = args.tty.then_some(tty::TtyConfig {
        rows: args.rows,
        cols: args.cols,
        uid: args.uid,
        gid: args.gid,
    });

    tracing::info!(runtime = %runtime.display(), dir = %dir.display(), %handle, tty = tty.is_some(), "Helper starting");

    let request = exec::ExecRequest {
        runtime,
        dir,
        handle,
        tty,
    };
    match exec::run(request, &mut status_pipe) {
        Ok(code) => {
            tracing::info!(exit_code = code, "Process exited");
        }
        // The runtime has logged its own reason; keep that as the last error.
        Err(e @ error::HelperError::RuntimeExited(_)) => {
            tracing::warn!("{}", e);
            status_pipe.report(e.status_byte());
            std::process::exit(i32::from(status::FAILED));
        }
        Err(e) => {
            tracing::error!("{}", e);
            status_pipe.report(e.status_byte());
            std::process::exit(i32::from(status::FAILED));
        }
    }
}
