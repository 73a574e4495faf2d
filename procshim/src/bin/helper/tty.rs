//! Pty allocation and relaying for `--tty`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use nix::pty::{OpenptyResult, Winsize, openpty};
use procshim_shared::spec::WindowSize;

use crate::error::HelperError;

/// Pty geometry and ownership from the command line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TtyConfig {
    pub(crate) rows: u16,
    pub(crate) cols: u16,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

pub(crate) struct Pty {
    master: File,
    slave: OwnedFd,
}

impl Pty {
    pub(crate) fn open(config: &TtyConfig) -> Result<Self, HelperError> {
        let winsize = Winsize {
            ws_row: config.rows,
            ws_col: config.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(Some(&winsize), None)
            .map_err(|e| HelperError::Pty(format!("openpty: {}", e)))?;

        if let Err(e) = std::os::unix::fs::fchown(&slave, Some(config.uid), Some(config.gid)) {
            tracing::warn!(uid = config.uid, gid = config.gid, error = %e, "Failed to chown pty slave");
        }

        Ok(Self {
            master: File::from(master),
            slave,
        })
    }

    /// Make the slave the stdio and controlling terminal of `cmd`.
    pub(crate) fn attach(&self, cmd: &mut Command) -> Result<(), HelperError> {
        let clone = || {
            self.slave
                .try_clone()
                .map(Stdio::from)
                .map_err(|e| HelperError::Pty(format!("dup pty slave: {}", e)))
        };
        cmd.stdin(clone()?).stdout(clone()?).stderr(clone()?);

        // SAFETY: setsid and ioctl are async-signal-safe.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                // stdin is the slave by now.
                if libc::ioctl(0, libc::TIOCSCTTY, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        Ok(())
    }

    /// Start relaying once the runtime holds the slave.
    ///
    /// `stdin` is copied into the master and `winsz` updates are applied on
    /// background threads that end with the helper. The returned thread
    /// copies the master into `stdout` until the last slave is closed.
    pub(crate) fn relay(
        self,
        mut stdin: File,
        mut stdout: File,
        winsz: File,
    ) -> Result<JoinHandle<()>, HelperError> {
        let Pty { master, slave } = self;
        // Otherwise the master never sees the slave side close.
        drop(slave);

        let dup = |what: &str| {
            master
                .try_clone()
                .map_err(|e| HelperError::Pty(format!("dup pty master for {}: {}", what, e)))
        };
        let mut master_in = dup("stdin")?;
        let resize = dup("winsz")?;
        let mut master_out = master;

        spawn("procshim-tty-in", move || {
            if let Err(e) = io::copy(&mut stdin, &mut master_in) {
                tracing::debug!(error = %e, "stdin relay stopped");
            }
        })?;

        spawn("procshim-winsz", move || {
            for line in BufReader::new(winsz).lines() {
                let Ok(line) = line else { break };
                match serde_json::from_str::<WindowSize>(&line) {
                    Ok(size) => {
                        if let Err(e) = set_window_size(&resize, size) {
                            tracing::warn!(error = %e, "Failed to resize pty");
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed window size"),
                }
            }
        })?;

        spawn("procshim-tty-out", move || {
            match io::copy(&mut master_out, &mut stdout) {
                Ok(_) => {}
                // Linux reports EIO once every slave is closed.
                Err(e) if e.raw_os_error() == Some(libc::EIO) => {}
                Err(e) => tracing::debug!(error = %e, "pty output relay stopped"),
            }
        })
    }
}

fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>, HelperError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| HelperError::Pty(format!("spawn {}: {}", name, e)))
}

fn set_window_size(master: &File, size: WindowSize) -> io::Result<()> {
    let winsize = Winsize {
        ws_row: size.rows,
        ws_col: size.columns,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCSWINSZ reads a winsize struct that outlives the call.
    if unsafe { libc::ioctl(master.as_raw_fd(), libc::TIOCSWINSZ, &winsize as *const Winsize) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
