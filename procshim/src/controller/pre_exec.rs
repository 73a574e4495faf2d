//! Pre-execution hook for the helper.
//!
//! Runs after `fork()` and before `exec()` in the helper's process:
//!
//! 1. **Remap the launch pipes** - the status and log write ends land on
//!    fds 3 and 4, which is where the helper expects them
//! 2. **New session** - `setsid()` detaches the helper from the caller's
//!    process group and controlling terminal
//!
//! # Safety
//!
//! Only async-signal-safe syscalls (`fcntl`, `dup2`, `close`, `setsid`).
//! No allocation, no locks, no logging.

use crate::runtime::constants::fds;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Temporary descriptors are placed at or above this number so they cannot
/// collide with the remap targets.
const SCRATCH_FD_BASE: RawFd = 10;

/// Add the helper's pre-execution hook to `cmd`.
///
/// `status_fd` and `log_fd` are the parent's close-on-exec write ends; the
/// hook duplicates them onto [`fds::STATUS`] and [`fds::LOG`] without the
/// close-on-exec flag.
pub(super) fn add_pre_exec_hook(cmd: &mut Command, status_fd: RawFd, log_fd: RawFd) {
    // SAFETY: the hook only uses async-signal-safe syscalls.
    unsafe {
        cmd.pre_exec(move || {
            remap_raw(status_fd, log_fd).map_err(io::Error::from_raw_os_error)?;
            if libc::setsid() < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Move `status_fd` and `log_fd` onto fds 3 and 4 (async-signal-safe).
///
/// Both sources are first copied above [`SCRATCH_FD_BASE`], so a source
/// that already sits on 3 or 4 is not clobbered by the first `dup2`.
fn remap_raw(status_fd: RawFd, log_fd: RawFd) -> Result<(), i32> {
    // SAFETY: plain fd syscalls on descriptors owned by this process.
    unsafe {
        let status_tmp = libc::fcntl(status_fd, libc::F_DUPFD_CLOEXEC, SCRATCH_FD_BASE);
        if status_tmp < 0 {
            return Err(get_errno());
        }
        let log_tmp = libc::fcntl(log_fd, libc::F_DUPFD_CLOEXEC, SCRATCH_FD_BASE);
        if log_tmp < 0 {
            return Err(get_errno());
        }

        // dup2 clears FD_CLOEXEC on the target.
        if libc::dup2(status_tmp, fds::STATUS) < 0 {
            return Err(get_errno());
        }
        if libc::dup2(log_tmp, fds::LOG) < 0 {
            return Err(get_errno());
        }

        libc::close(status_tmp);
        libc::close(log_tmp);
    }
    Ok(())
}

#[inline]
fn get_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}
