//! Helper spawning and reaping.

use std::{
    ffi::OsString,
    io::{PipeWriter, Write},
    os::fd::AsRawFd,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
};

use crate::runtime::constants::threads;
use procshim_shared::errors::{ShimError, ShimResult};

use super::pre_exec::add_pre_exec_hook;

/// Everything needed to start one helper.
#[derive(Debug)]
pub struct HelperCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Extra environment on top of the caller's.
    pub envs: Vec<(OsString, OsString)>,
    /// Encoded process spec, fed on the helper's stdin.
    pub stdin: Vec<u8>,
    /// Write end of the status pipe; becomes fd 3.
    pub status: PipeWriter,
    /// Write end of the log pipe; becomes fd 4.
    pub log: PipeWriter,
}

/// Starts helpers.
///
/// Implementations must hand the write ends in [`HelperCommand`] to the
/// helper only, so the status pipe reports end-of-file once the helper (and
/// its descendants) are gone.
pub trait HelperRunner: Send + Sync {
    fn spawn_and_reap(&self, command: HelperCommand) -> ShimResult<Reaper>;
}

/// Spawns the helper as a detached session leader with null stdout/stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedRunner;

impl HelperRunner for DetachedRunner {
    fn spawn_and_reap(&self, command: HelperCommand) -> ShimResult<Reaper> {
        let HelperCommand {
            program,
            args,
            envs,
            stdin,
            status,
            log,
        } = command;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        add_pre_exec_hook(&mut cmd, status.as_raw_fd(), log.as_raw_fd());

        let mut child = cmd.spawn().map_err(|e| {
            ShimError::Launch(format!(
                "Failed to spawn helper at {}: {}",
                program.display(),
                e
            ))
        })?;

        // The helper holds the only remaining write ends.
        drop(status);
        drop(log);

        let pid = child.id();
        let input = child.stdin.take();
        Reaper::spawn(pid, move || {
            // Dropping `input` closes the helper's stdin.
            if let Some(mut input) = input
                && let Err(e) = input.write_all(&stdin)
            {
                tracing::debug!(pid, error = %e, "Helper did not consume its spec");
            }
            match child.wait() {
                Ok(status) => {
                    tracing::debug!(pid, %status, "Helper reaped");
                    Some(status)
                }
                Err(e) => {
                    tracing::warn!(pid, error = %e, "Failed to reap helper");
                    None
                }
            }
        })
    }
}

/// Owner of a helper's child handle.
///
/// A named thread feeds the helper its stdin, closes it, and waits for the
/// helper so it never lingers as a zombie. Nothing else depends on it.
#[derive(Debug)]
pub struct Reaper {
    pid: u32,
    thread: JoinHandle<Option<ExitStatus>>,
}

impl Reaper {
    /// Run `reap` on a dedicated thread.
    pub fn spawn<F>(pid: u32, reap: F) -> ShimResult<Self>
    where
        F: FnOnce() -> Option<ExitStatus> + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name(format!("{}-{}", threads::REAPER_PREFIX, pid))
            .spawn(reap)
            .map_err(|e| ShimError::Launch(format!("Failed to spawn reaper thread: {}", e)))?;
        Ok(Self { pid, thread })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the helper has been reaped.
    pub fn join(self) -> Option<ExitStatus> {
        self.thread.join().ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn command(program: &str, args: &[&str], stdin: &[u8]) -> (HelperCommand, std::io::PipeReader) {
        let (status_reader, status) = std::io::pipe().unwrap();
        let (_log_reader, log) = std::io::pipe().unwrap();
        let command = HelperCommand {
            program: PathBuf::from(program),
            args: args.iter().map(OsString::from).collect(),
            envs: vec![("PROCSHIM_TEST".into(), "1".into())],
            stdin: stdin.to_vec(),
            status,
            log,
        };
        (command, status_reader)
    }

    #[test]
    fn test_detached_runner_feeds_stdin_and_reaps() {
        let (cmd, mut status_reader) = command(
            "/bin/sh",
            &["-c", "read line; test \"$line\" = spec && test \"$PROCSHIM_TEST\" = 1 && printf ok >&3"],
            b"spec\n",
        );
        let reaper = DetachedRunner.spawn_and_reap(cmd).unwrap();
        assert!(reaper.pid() > 0);

        let mut status = String::new();
        status_reader.read_to_string(&mut status).unwrap();
        assert_eq!(status, "ok");

        let exit = reaper.join().unwrap();
        assert!(exit.success());
    }

    #[test]
    fn test_detached_runner_runs_in_new_session() {
        let (cmd, mut status_reader) = command(
            "/bin/sh",
            &["-c", "cut -d' ' -f6 /proc/$$/stat >&3"],
            b"",
        );
        let reaper = DetachedRunner.spawn_and_reap(cmd).unwrap();
        let pid = reaper.pid();
        let mut out = String::new();
        status_reader.read_to_string(&mut out).unwrap();
        reaper.join();
        assert_eq!(out.trim(), pid.to_string());
    }

    #[test]
    fn test_missing_helper_is_launch_error() {
        let (cmd, _status_reader) = command("/nonexistent/procshim-helper", &[], b"");
        let err = DetachedRunner.spawn_and_reap(cmd).unwrap_err();
        assert!(matches!(err, ShimError::Launch(_)));
    }

    #[test]
    fn test_reaper_thread_result() {
        use std::os::unix::process::ExitStatusExt;
        let reaper = Reaper::spawn(42, || Some(ExitStatus::from_raw(0))).unwrap();
        assert_eq!(reaper.pid(), 42);
        assert!(reaper.join().unwrap().success());
    }
}
