//! Shared fixtures for procshim integration tests.
//!
//! The binaries under test are only known to the test crate
//! (`CARGO_BIN_EXE_*`), so callers pass their paths in.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use procshim::{
    ExecRunner, ExecRunnerOptions, PreparedSpec, Process, ProcessId, ProcessIo, ProcessSpec,
    ShimResult, TtySpec,
};
use tempfile::TempDir;
use tokio::io::AsyncWrite;

/// PATH handed to test processes; the runtime stub clears the environment.
pub const TEST_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Isolated processes root with a runner pointed at it.
pub struct TestContext {
    pub runner: ExecRunner,
    pub processes_dir: PathBuf,
    _temp_dir: TempDir, // Dropped after test
}

impl TestContext {
    pub fn new(helper: impl AsRef<Path>, runtime: impl AsRef<Path>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let processes_dir = temp_dir.path().join("processes");
        let options = ExecRunnerOptions::new(helper.as_ref(), runtime.as_ref())
            .with_processes_dir(&processes_dir);
        let runner = ExecRunner::new(options).expect("Failed to create runner");
        Self {
            runner,
            processes_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn process_dir(&self, id: &str) -> PathBuf {
        self.processes_dir.join(id)
    }

    pub async fn run(&self, id: &str, spec: PreparedSpec, io: ProcessIo) -> ShimResult<Process> {
        self.run_with_tty(id, spec, None, io).await
    }

    pub async fn run_with_tty(
        &self,
        id: &str,
        spec: PreparedSpec,
        tty: Option<&TtySpec>,
        io: ProcessIo,
    ) -> ShimResult<Process> {
        let id = ProcessId::new(id)?;
        self.runner
            .run(&spec, &id, &self.processes_dir, "test-container", tty, io)
            .await
    }

    pub async fn attach(&self, id: &str, io: ProcessIo) -> ShimResult<Process> {
        let id = ProcessId::new(id)?;
        self.runner.attach(&id, &self.processes_dir, io).await
    }
}

/// `/bin/sh -c <script>` with a usable PATH.
pub fn sh(script: &str) -> PreparedSpec {
    PreparedSpec::new(
        ProcessSpec::new("/bin/sh")
            .args(["-c", script])
            .env("PATH", TEST_PATH),
    )
}

/// An `AsyncWrite` sink whose contents can be read while it is in use.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
