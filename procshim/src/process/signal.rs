//! Pid resolution and signal delivery.

use crate::util::read_pid_file;
use nix::sys::signal::{self as nix_signal, Signal as OsSignal};
use nix::unistd::Pid;
use procshim_shared::errors::{ShimError, ShimResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Signals a caller may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL).
    Kill,
}

impl Signal {
    pub fn os_signal(self) -> OsSignal {
        match self {
            Signal::Terminate => OsSignal::SIGTERM,
            Signal::Kill => OsSignal::SIGKILL,
        }
    }
}

/// Resolves the pid of a supervised process.
pub trait PidResolver: Send + Sync {
    fn resolve_pid(&self, pid_file: &Path) -> ShimResult<u32>;
}

/// Reads the pid from the `pidfile` written by the runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct PidFileResolver;

impl PidResolver for PidFileResolver {
    fn resolve_pid(&self, pid_file: &Path) -> ShimResult<u32> {
        read_pid_file(pid_file).map_err(|e| ShimError::PidUnavailable(e.to_string()))
    }
}

#[derive(Clone)]
pub(crate) struct Signaller {
    pid_file: PathBuf,
    resolver: Arc<dyn PidResolver>,
}

impl Signaller {
    pub(crate) fn new(pid_file: PathBuf, resolver: Arc<dyn PidResolver>) -> Self {
        Self { pid_file, resolver }
    }

    pub(crate) fn pid(&self) -> ShimResult<u32> {
        self.resolver.resolve_pid(&self.pid_file)
    }

    pub(crate) fn signal(&self, signal: Signal) -> ShimResult<()> {
        let pid = self.pid()?;
        // 0 would address our own process group.
        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return Err(ShimError::PidUnavailable(format!("invalid pid {}", pid))),
        };

        nix_signal::kill(Pid::from_raw(raw), signal.os_signal()).map_err(|errno| {
            ShimError::SignalDelivery(format!(
                "{} to pid {}: {}",
                signal.os_signal(),
                pid,
                errno
            ))
        })?;

        tracing::debug!(pid, signal = %signal.os_signal(), "Delivered signal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    struct FixedPid(u32);

    impl PidResolver for FixedPid {
        fn resolve_pid(&self, _pid_file: &Path) -> ShimResult<u32> {
            Ok(self.0)
        }
    }

    fn fixed(pid: u32) -> Signaller {
        Signaller::new(PathBuf::from("/unused"), Arc::new(FixedPid(pid)))
    }

    #[test]
    fn test_signal_mapping() {
        assert_eq!(Signal::Terminate.os_signal(), OsSignal::SIGTERM);
        assert_eq!(Signal::Kill.os_signal(), OsSignal::SIGKILL);
    }

    #[test]
    fn test_missing_pid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let signaller =
            Signaller::new(dir.path().join("pidfile"), Arc::new(PidFileResolver));
        let err = signaller.signal(Signal::Terminate).unwrap_err();
        assert!(matches!(err, ShimError::PidUnavailable(_)));
    }

    #[test]
    fn test_zero_pid_rejected() {
        let err = fixed(0).signal(Signal::Kill).unwrap_err();
        assert!(matches!(err, ShimError::PidUnavailable(_)));
    }

    #[test]
    fn test_delivery_to_missing_pid() {
        let err = fixed(999_999_999).signal(Signal::Terminate).unwrap_err();
        assert!(err.is_signal_delivery());
    }

    #[test]
    fn test_kill_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        fixed(child.id()).signal(Signal::Kill).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn test_terminate_child_via_pid_file() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pidfile");
        std::fs::write(&pid_file, format!("{}\n", child.id())).unwrap();

        Signaller::new(pid_file, Arc::new(PidFileResolver))
            .signal(Signal::Terminate)
            .unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
