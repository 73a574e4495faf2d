//! ExecRunner - launches processes through the helper and reattaches to them.

use std::{
    ffi::OsString,
    io::{self, PipeReader, Read},
    path::Path,
    sync::Arc,
};

use tracing::Instrument;

use crate::process::{
    IoBridge, PeerPresence, PidFileResolver, PidResolver, Process, ProcessDir, ProcessId,
    ProcessIo, Relays, Signaller,
};
use crate::runtime::constants::{helper, status};
use crate::runtime::options::ExecRunnerOptions;
use procshim_shared::errors::{ShimError, ShimResult};
use procshim_shared::spec::{PreparedSpec, TtySpec};

use super::log_stream::{self, LogForwarder};
use super::spawn::{DetachedRunner, HelperCommand, HelperRunner};

/// Runs processes under a detached helper.
///
/// `run` creates the process directory, starts the helper and waits for its
/// launch status. `attach` reconnects to a directory left by an earlier
/// `run`, possibly from another process.
pub struct ExecRunner {
    options: ExecRunnerOptions,
    runner: Arc<dyn HelperRunner>,
    resolver: Arc<dyn PidResolver>,
}

impl ExecRunner {
    /// Create a runner that spawns the configured helper binary.
    ///
    /// # Returns
    /// * `Ok(ExecRunner)` - Options are valid
    /// * `Err(Config)` - The helper binary does not exist
    pub fn new(options: ExecRunnerOptions) -> ShimResult<Self> {
        options.validate()?;
        Ok(Self::with_capabilities(
            options,
            Arc::new(DetachedRunner),
            Arc::new(PidFileResolver),
        ))
    }

    /// Create a runner with custom helper spawning and pid resolution.
    pub fn with_capabilities(
        options: ExecRunnerOptions,
        runner: Arc<dyn HelperRunner>,
        resolver: Arc<dyn PidResolver>,
    ) -> Self {
        Self {
            options,
            runner,
            resolver,
        }
    }

    pub fn options(&self) -> &ExecRunnerOptions {
        &self.options
    }

    /// Default processes root from the options.
    pub fn processes_dir(&self) -> &Path {
        &self.options.processes_dir
    }

    /// Launch `spec` inside the container `handle`.
    ///
    /// Returns once the runtime has started the process; I/O is relayed in
    /// the background from then on.
    ///
    /// # Errors
    /// * `DirectoryCreate` / `Setup` - nothing was started
    /// * `Launch` - the helper could not be spawned
    /// * `LaunchFailed` - the runtime did not start the process; `message`
    ///   carries the reason it logged. The directory is kept.
    pub async fn run(
        &self,
        spec: &PreparedSpec,
        id: &ProcessId,
        processes_dir: &Path,
        handle: &str,
        tty: Option<&TtySpec>,
        io: ProcessIo,
    ) -> ShimResult<Process> {
        let span = tracing::info_span!("execrunner", process_id = %id, handle);
        async move {
            tracing::info!("start");
            let process = self
                .launch(spec, id, processes_dir, handle, tty, io)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "run failed"))?;
            tracing::info!("done");
            Ok(process)
        }
        .instrument(span)
        .await
    }

    async fn launch(
        &self,
        spec: &PreparedSpec,
        id: &ProcessId,
        processes_dir: &Path,
        handle: &str,
        tty: Option<&TtySpec>,
        io: ProcessIo,
    ) -> ShimResult<Process> {
        let dir = ProcessDir::create(processes_dir, id)?;

        let (command, status_reader, log_reader) =
            match self.helper_command(spec, &dir, handle, tty) {
                Ok(parts) => parts,
                Err(e) => {
                    if let Err(cleanup) = ProcessDir::remove(dir.path()) {
                        tracing::warn!(error = %cleanup, "Failed to clean up process directory");
                    }
                    return Err(e);
                }
            };

        // Connect stdio before the handshake so early output is not lost.
        let bridge = IoBridge::start(dir.layout(), io, PeerPresence::Arriving, tty.is_some());

        let reaper = match self.runner.spawn_and_reap(command) {
            Ok(reaper) => reaper,
            Err(e) => {
                bridge.abandon().await;
                return Err(e);
            }
        };
        tracing::debug!(helper_pid = reaper.pid(), "Spawned helper");

        let launch_status = match read_status(status_reader).await {
            Ok(launch_status) => launch_status,
            Err(e) => {
                bridge.abandon().await;
                return Err(e);
            }
        };
        tracing::info!(status = ?launch_status, "Read launch status");

        if launch_status != Some(status::STARTED) {
            bridge.abandon().await;
            let message = log_stream::drain_failure_message(log_reader);
            let cause = match launch_status {
                Some(code) => format!("exit status {}", code),
                None => "helper exited without reporting launch status".to_string(),
            };
            return Err(ShimError::LaunchFailed { cause, message });
        }

        let relays = bridge.established().await?;
        let log_forwarder = LogForwarder::spawn(log_reader)?;
        let signaller = Signaller::new(dir.layout().pid_file(), self.resolver.clone());
        Ok(Process::new(id.clone(), dir, signaller, relays).with_helper(reaper, log_forwarder))
    }

    fn helper_command(
        &self,
        spec: &PreparedSpec,
        dir: &ProcessDir,
        handle: &str,
        tty: Option<&TtySpec>,
    ) -> ShimResult<(HelperCommand, PipeReader, PipeReader)> {
        let stdin = serde_json::to_vec(&spec.process)
            .map_err(|e| ShimError::Setup(format!("Failed to encode process spec: {}", e)))?;
        let (status_reader, status_writer) = io::pipe()
            .map_err(|e| ShimError::Setup(format!("Failed to create status pipe: {}", e)))?;
        let (log_reader, log_writer) = io::pipe()
            .map_err(|e| ShimError::Setup(format!("Failed to create log pipe: {}", e)))?;

        let mut envs = Vec::new();
        // Pass RUST_LOG to the helper if set
        if self.options.forward_rust_log
            && let Some(rust_log) = std::env::var_os("RUST_LOG")
        {
            envs.push((OsString::from("RUST_LOG"), rust_log));
        }

        let command = HelperCommand {
            program: self.options.helper_path.clone(),
            args: helper_args(&self.options.runtime_path, dir.path(), handle, tty, spec),
            envs,
            stdin,
            status: status_writer,
            log: log_writer,
        };
        Ok((command, status_reader, log_reader))
    }

    /// Reconnect to the process `id` under `processes_dir`.
    ///
    /// No helper is started. If the process has already exited, the stdio
    /// FIFOs are left alone and `wait` returns the persisted code.
    ///
    /// # Errors
    /// * `NotFound` - there is no such process directory
    pub async fn attach(
        &self,
        id: &ProcessId,
        processes_dir: &Path,
        io: ProcessIo,
    ) -> ShimResult<Process> {
        let span = tracing::info_span!("execrunner", process_id = %id);
        async move {
            tracing::info!("attach");
            let dir = ProcessDir::open(processes_dir, id)?;

            let relays = if dir.has_exit_code() {
                tracing::debug!("Process already exited, not connecting stdio");
                Relays::default()
            } else {
                IoBridge::start(dir.layout(), io, PeerPresence::Present, false)
                    .established()
                    .await?
            };

            let signaller = Signaller::new(dir.layout().pid_file(), self.resolver.clone());
            Ok(Process::new(id.clone(), dir, signaller, relays))
        }
        .instrument(span)
        .await
    }
}

/// Helper command line: `[tty flags] exec <runtime> <dir> <handle>`.
pub fn helper_args(
    runtime: &Path,
    dir: &Path,
    handle: &str,
    tty: Option<&TtySpec>,
    spec: &PreparedSpec,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if let Some(tty) = tty {
        let size = tty.window_size.unwrap_or_default();
        args.push(helper::FLAG_TTY.into());
        args.push(helper::FLAG_ROWS.into());
        args.push(size.rows.to_string().into());
        args.push(helper::FLAG_COLS.into());
        args.push(size.columns.to_string().into());
        args.push(helper::FLAG_UID.into());
        args.push(spec.host_uid.to_string().into());
        args.push(helper::FLAG_GID.into());
        args.push(spec.host_gid.to_string().into());
    }
    args.push(helper::EXEC.into());
    args.push(runtime.into());
    args.push(dir.into());
    args.push(handle.into());
    args
}

/// Read the one-byte launch status. `None` means end-of-file.
async fn read_status(mut reader: PipeReader) -> ShimResult<Option<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    })
    .await
    .map_err(|e| ShimError::Internal(format!("status read task failed: {}", e)))?
    .map_err(|e| ShimError::Launch(format!("Failed to read launch status: {}", e)))
}
