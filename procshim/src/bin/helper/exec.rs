//! The exec flow: connect FIFOs, start the runtime, hand-shake, report exit.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use procshim::runtime::constants::{runtime, status};
use procshim_shared::layout::{ProcessLayout, names};
use procshim_shared::spec::ProcessSpec;

use crate::StatusPipe;
use crate::error::HelperError;
use crate::tty::{Pty, TtyConfig};

/// How often the pid file is polled while the runtime starts the process.
const PID_FILE_POLL: Duration = Duration::from_millis(5);

const PROCESS_FILE: &str = "process.json";

pub(crate) struct ExecRequest {
    pub(crate) runtime: PathBuf,
    pub(crate) dir: PathBuf,
    pub(crate) handle: String,
    pub(crate) tty: Option<TtyConfig>,
}

/// Stdio connection of the runtime.
enum Wiring {
    /// FIFO ends handed straight to the runtime.
    Fifos { stdin: File, stdout: File, stderr: File },
    /// A pty in between; the FIFOs are relayed by the helper.
    Tty {
        pty: Pty,
        stdin: File,
        stdout: File,
        winsz: File,
    },
}

/// Run the process and return its exit code.
pub(crate) fn run(request: ExecRequest, status_pipe: &mut StatusPipe) -> Result<i32, HelperError> {
    let mut spec: ProcessSpec =
        serde_json::from_reader(io::stdin().lock()).map_err(HelperError::Spec)?;
    let layout = ProcessLayout::new(&request.dir);

    // Held read-write so a late `wait` can still open it.
    let mut exit = open_rw(&layout.exit(), names::EXIT)?;

    // Same order as the supervisor.
    let stdin = File::open(layout.stdin()).map_err(|source| HelperError::Fifo {
        name: names::STDIN,
        source,
    })?;
    let stdout = open_rw(&layout.stdout(), names::STDOUT)?;

    let wiring = match &request.tty {
        Some(config) => {
            // The pty is ours; the runtime must not allocate another.
            spec.terminal = false;
            spec.console_size = None;
            // The pty merges both streams onto stdout; the supervisor does
            // not connect stderr for terminal launches.
            Wiring::Tty {
                pty: Pty::open(config)?,
                stdin,
                stdout,
                winsz: open_rw(&layout.winsz(), names::WINSZ)?,
            }
        }
        None => Wiring::Fifos {
            stdin,
            stdout,
            stderr: open_rw(&layout.stderr(), names::STDERR)?,
        },
    };
    tracing::debug!("Connected stdio fifos");

    let workdir = tempfile::Builder::new()
        .prefix("procshim-helper")
        .tempdir()
        .map_err(HelperError::ProcessFile)?;
    let process_file = workdir.path().join(PROCESS_FILE);
    let encoded = serde_json::to_vec(&spec).map_err(|e| HelperError::ProcessFile(e.into()))?;
    std::fs::write(&process_file, encoded).map_err(HelperError::ProcessFile)?;

    let mut cmd = Command::new(&request.runtime);
    cmd.arg("--log")
        .arg(runtime::LOG_PATH)
        .arg("--log-format")
        .arg(runtime::LOG_FORMAT)
        .arg("exec")
        .arg("--pid-file")
        .arg(layout.pid_file())
        .arg("--process")
        .arg(&process_file)
        .arg(&request.handle);

    let (mut child, output_relay) = match wiring {
        Wiring::Fifos {
            stdin,
            stdout,
            stderr,
        } => {
            cmd.stdin(Stdio::from(stdin))
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr));
            let child = spawn_runtime(&mut cmd, &request.runtime)?;
            (child, None)
        }
        Wiring::Tty {
            pty,
            stdin,
            stdout,
            winsz,
        } => {
            pty.attach(&mut cmd)?;
            let child = spawn_runtime(&mut cmd, &request.runtime)?;
            let relay = pty.relay(stdin, stdout, winsz)?;
            (child, Some(relay))
        }
    };
    // Drops the parent's copies of the runtime's stdio.
    drop(cmd);
    tracing::debug!(runtime_pid = child.id(), "Runtime started");

    await_start(&mut child, &layout.pid_file())?;
    status_pipe.report(status::STARTED);
    tracing::info!("Process started");

    let exit_status = child.wait().map_err(HelperError::Wait)?;
    let code = exit_code(exit_status);
    tracing::debug!(%exit_status, code, "Runtime exited");

    if let Some(relay) = output_relay
        && relay.join().is_err()
    {
        tracing::warn!("pty output relay panicked");
    }

    std::fs::write(layout.exit_code(), code.to_string()).map_err(HelperError::Exit)?;
    exit.write_all(&[0]).map_err(HelperError::Exit)?;
    Ok(code)
}

fn open_rw(path: &Path, name: &'static str) -> Result<File, HelperError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| HelperError::Fifo { name, source })
}

fn spawn_runtime(cmd: &mut Command, path: &Path) -> Result<Child, HelperError> {
    cmd.spawn().map_err(|source| HelperError::RuntimeSpawn {
        path: path.to_path_buf(),
        source,
    })
}

/// Wait until the runtime has written the pid file, or has exited without
/// doing so.
fn await_start(child: &mut Child, pid_file: &Path) -> Result<(), HelperError> {
    loop {
        if pid_file.exists() {
            return Ok(());
        }
        if let Some(exit_status) = child.try_wait().map_err(HelperError::Wait)? {
            // The process may have come and gone already.
            if pid_file.exists() {
                return Ok(());
            }
            return Err(HelperError::RuntimeExited(exit_code(exit_status)));
        }
        thread::sleep(PID_FILE_POLL);
    }
}

fn exit_code(exit_status: ExitStatus) -> i32 {
    exit_status.code().unwrap_or_else(|| {
        runtime::SIGNAL_EXIT_BASE + exit_status.signal().unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(ExitStatus::from_raw(12 << 8)), 12);
        assert_eq!(exit_code(ExitStatus::from_raw(libc::SIGKILL)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(libc::SIGTERM)), 143);
    }

    #[test]
    fn test_await_start_runtime_exit_without_pid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut child = Command::new("/bin/sh").args(["-c", "exit 7"]).spawn().unwrap();
        let err = await_start(&mut child, &dir.path().join("pidfile")).unwrap_err();
        assert!(matches!(err, HelperError::RuntimeExited(7)));
        assert_eq!(err.status_byte(), 7);
    }

    #[test]
    fn test_await_start_sees_pid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pidfile");
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("echo $$ > {}; sleep 1", pid_file.display()))
            .spawn()
            .unwrap();
        await_start(&mut child, &pid_file).unwrap();
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
