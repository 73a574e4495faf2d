//! The user-facing process handle.

use super::bridge::Relays;
use super::dir::ProcessDir;
use super::signal::{Signal, Signaller};
use super::{ProcessId, exit, fifo};
use crate::controller::{LogForwarder, Reaper};
use procshim_shared::errors::{ShimError, ShimResult};
use procshim_shared::spec::TtySpec;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::{Mutex, OnceCell};
use tracing::Instrument;

/// A process running under a helper, bound to its process directory.
///
/// Created by [`ExecRunner::run`](crate::ExecRunner::run) or
/// [`ExecRunner::attach`](crate::ExecRunner::attach). Dropping the handle
/// without waiting stops relaying I/O but leaves the process running and the
/// directory in place for a later `attach`.
pub struct Process {
    id: ProcessId,
    dir: ProcessDir,
    signaller: Signaller,
    relays: Mutex<Relays>,
    exit_code: OnceCell<i32>,
    reaper: Option<Reaper>,
    log_forwarder: Option<LogForwarder>,
    span: tracing::Span,
}

impl Process {
    pub(crate) fn new(id: ProcessId, dir: ProcessDir, signaller: Signaller, relays: Relays) -> Self {
        let span = tracing::info_span!("process", process_id = %id);
        Self {
            id,
            dir,
            signaller,
            relays: Mutex::new(relays),
            exit_code: OnceCell::new(),
            reaper: None,
            log_forwarder: None,
            span,
        }
    }

    /// Attach the launch-time helper resources (builder pattern).
    pub(crate) fn with_helper(mut self, reaper: Reaper, log_forwarder: LogForwarder) -> Self {
        self.reaper = Some(reaper);
        self.log_forwarder = Some(log_forwarder);
        self
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    /// Path of the process directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Pid of the helper, for handles created by `run`.
    pub fn helper_pid(&self) -> Option<u32> {
        self.reaper.as_ref().map(Reaper::pid)
    }

    /// Pid of the supervised process, as recorded in its pid file.
    pub fn pid(&self) -> ShimResult<u32> {
        self.signaller.pid()
    }

    /// Wait for the process to exit and return its exit code.
    ///
    /// Returns only after all relayed output has reached the caller's sinks.
    /// The process directory is removed afterwards. Repeated and concurrent
    /// calls share one result.
    pub async fn wait(&self) -> ShimResult<i32> {
        self.exit_code
            .get_or_try_init(|| self.observe_exit().instrument(self.span.clone()))
            .await
            .copied()
    }

    async fn observe_exit(&self) -> ShimResult<i32> {
        let exit_path = self.dir.layout().exit();
        tokio::task::spawn_blocking(move || exit::await_exit_signal(&exit_path))
            .await
            .map_err(|e| ShimError::Internal(format!("exit wait task failed: {}", e)))?
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ShimError::NotFound(format!("process directory {}", self.dir().display()))
                }
                _ => ShimError::Storage(format!("failed to read exit fifo: {}", e)),
            })?;
        tracing::debug!("Exit signalled");

        self.relays.lock().await.drain().await;

        let code = exit::read_exit_code(&self.dir.layout().exit_code())?;
        tracing::info!(exit_code = code, "Process exited");

        if let Err(e) = ProcessDir::remove(self.dir()) {
            tracing::warn!(error = %e, "Failed to clean up process directory");
        }
        Ok(code)
    }

    /// Deliver `signal` to the supervised process.
    pub fn signal(&self, signal: Signal) -> ShimResult<()> {
        let _enter = self.span.enter();
        self.signaller.signal(signal).inspect_err(|e| {
            if e.is_signal_delivery() {
                tracing::debug!(error = %e, "Signal not delivered, process may have exited");
            }
        })
    }

    /// Send a window-size update to the process's terminal.
    ///
    /// Does nothing when no geometry is given or the process can no longer
    /// receive updates (exited, directory gone, no TTY reader).
    pub fn set_tty(&self, tty: &TtySpec) -> ShimResult<()> {
        let _enter = self.span.enter();
        let Some(size) = tty.window_size else {
            return Ok(());
        };
        if self.exit_code.initialized() {
            tracing::debug!("Process already exited, dropping window size");
            return Ok(());
        }

        let winsz = self.dir.layout().winsz();
        let mut fifo = match fifo::try_open_writer(&winsz) {
            Ok(Some(fifo)) => fifo,
            Ok(None) => {
                tracing::debug!("No reader on winsz, dropping window size");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("winsz is gone, dropping window size");
                return Ok(());
            }
            Err(e) => {
                return Err(ShimError::Storage(format!("failed to open winsz: {}", e)));
            }
        };

        let mut line = serde_json::to_vec(&size)
            .map_err(|e| ShimError::Internal(format!("encode window size: {}", e)))?;
        line.push(b'\n');
        match fifo.write_all(&line) {
            Ok(()) => {
                tracing::debug!(rows = size.rows, columns = size.columns, "Sent window size");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::WouldBlock
                ) =>
            {
                tracing::debug!(error = %e, "Window size dropped");
                Ok(())
            }
            Err(e) => Err(ShimError::Storage(format!("failed to write winsz: {}", e))),
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if let Ok(mut relays) = self.relays.try_lock() {
            relays.abort();
        }
        if let Some(reaper) = &self.reaper {
            tracing::trace!(helper_pid = reaper.pid(), finished = reaper.is_finished(), "Dropping process handle");
        }
        if let Some(forwarder) = &self.log_forwarder {
            tracing::trace!(finished = forwarder.is_finished(), "Runtime log forwarder");
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("dir", &self.dir())
            .field("helper_pid", &self.helper_pid())
            .finish()
    }
}
