//! I/O bridge between caller streams and the stdio FIFOs.
//!
//! One task connects the FIFOs in order (`stdin`, `stdout`, `stderr`) and
//! starts a copy task for each direction as soon as its end is connected.
//! The output copies are joined by `wait` so no output is lost; the stdin
//! copy runs until its source ends or the handle is dropped.
//!
//! Connected ends are reactor-driven [`pipe`] halves, so aborting a copy
//! closes its FIFO end at once and leaves unread output for the next reader.

use super::fifo::{self, PeerHold};
use procshim_shared::errors::{ShimError, ShimResult};
use procshim_shared::layout::ProcessLayout;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller-side stdio of a process.
///
/// Absent streams are not relayed. A missing stdin means end-of-input on
/// `run` and "leave stdin alone" on `attach`.
#[derive(Default)]
pub struct ProcessIo {
    pub stdin: Option<BoxedReader>,
    pub stdout: Option<BoxedWriter>,
    pub stderr: Option<BoxedWriter>,
}

impl ProcessIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, stdin: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(stdin));
        self
    }

    pub fn stdout(mut self, stdout: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(stdout));
        self
    }

    pub fn stderr(mut self, stderr: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(stderr));
        self
    }
}

impl fmt::Debug for ProcessIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessIo")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Whether the FIFO peer (the helper) is still starting or already running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PeerPresence {
    /// `run`: open blocking and meet the helper.
    Arriving,
    /// `attach`: the helper must already hold its ends.
    Present,
}

/// Running copy tasks of one handle.
#[derive(Debug, Default)]
pub(crate) struct Relays {
    stdin: Option<JoinHandle<()>>,
    outputs: Vec<JoinHandle<()>>,
}

impl Relays {
    /// Wait for every output copy to reach end-of-file.
    pub(crate) async fn drain(&mut self) {
        let results = futures::future::join_all(self.outputs.drain(..)).await;
        if results.iter().any(|r| matches!(r, Err(e) if e.is_panic())) {
            tracing::warn!("output relay panicked");
        }
    }

    pub(crate) fn abort(&mut self) {
        if let Some(stdin) = self.stdin.take() {
            stdin.abort();
        }
        for task in self.outputs.drain(..) {
            task.abort();
        }
    }
}

/// The connecting phase of a bridge.
pub(crate) struct IoBridge {
    stdio: [PathBuf; 3],
    connecting: JoinHandle<ShimResult<Relays>>,
}

impl IoBridge {
    /// Start connecting in the background.
    ///
    /// A `terminal` process writes everything to stdout, so its stderr FIFO
    /// is not connected.
    pub(crate) fn start(
        layout: &ProcessLayout,
        io: ProcessIo,
        peer: PeerPresence,
        terminal: bool,
    ) -> Self {
        let stdio = layout.stdio();
        let connecting = tokio::spawn(connect(stdio.clone(), io, peer, terminal));
        Self { stdio, connecting }
    }

    /// Wait until every FIFO end is connected.
    pub(crate) async fn established(self) -> ShimResult<Relays> {
        self.connecting
            .await
            .map_err(|e| ShimError::Internal(format!("io bridge task failed: {}", e)))?
    }

    /// Give up on a peer that will never arrive.
    ///
    /// Holding both ends of each stdio FIFO completes any open still pending
    /// in the connect task, after which everything is torn down.
    pub(crate) async fn abandon(self) {
        let hold = PeerHold::open(&self.stdio);
        match self.connecting.await {
            Ok(Ok(mut relays)) => relays.abort(),
            Ok(Err(e)) => tracing::debug!(error = %e, "io bridge did not connect"),
            Err(e) => tracing::debug!(error = %e, "io bridge task failed"),
        }
        drop(hold);
    }
}

async fn connect(
    stdio: [PathBuf; 3],
    io: ProcessIo,
    peer: PeerPresence,
    terminal: bool,
) -> ShimResult<Relays> {
    let ProcessIo {
        stdin,
        stdout,
        stderr,
    } = io;
    let [stdin_path, stdout_path, stderr_path] = stdio;
    let mut relays = Relays::default();

    match (peer, stdin) {
        (PeerPresence::Arriving, stdin) => {
            let file = open_blocking(stdin_path.clone(), fifo::open_writer).await?;
            match stdin {
                Some(source) => {
                    let fifo = pipe::Sender::from_file(file)
                        .map_err(|e| fifo_error(&stdin_path, e))?;
                    relays.stdin = Some(spawn_stdin(source, fifo));
                }
                // Closing right away delivers end-of-input.
                None => drop(file),
            }
        }
        (PeerPresence::Present, Some(source)) => {
            match pipe::OpenOptions::new().open_sender(&stdin_path) {
                Ok(fifo) => relays.stdin = Some(spawn_stdin(source, fifo)),
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    tracing::debug!("stdin has no reader, not relaying");
                }
                Err(e) => return Err(fifo_error(&stdin_path, e)),
            }
        }
        (PeerPresence::Present, None) => {}
    }

    let mut outputs = vec![("stdout", stdout_path, stdout)];
    if terminal {
        tracing::debug!("Terminal output arrives on stdout, not connecting stderr");
    } else {
        outputs.push(("stderr", stderr_path, stderr));
    }

    for (name, path, sink) in outputs {
        let fifo = match peer {
            PeerPresence::Arriving => {
                let file = open_blocking(path.clone(), fifo::open_reader).await?;
                pipe::Receiver::from_file(file)
            }
            PeerPresence::Present => pipe::OpenOptions::new().open_receiver(&path),
        }
        .map_err(|e| fifo_error(&path, e))?;
        if let Some(sink) = sink {
            relays.outputs.push(spawn_output(name, fifo, sink));
        }
    }

    Ok(relays)
}

/// Run a blocking open on the blocking pool. Only [`IoBridge::abandon`]
/// can release an open whose peer never arrives.
async fn open_blocking(path: PathBuf, open: fn(&Path) -> io::Result<File>) -> ShimResult<File> {
    let shown = path.clone();
    tokio::task::spawn_blocking(move || open(&path))
        .await
        .map_err(|e| ShimError::Internal(format!("fifo open task failed: {}", e)))?
        .map_err(|e| fifo_error(&shown, e))
}

fn fifo_error(path: &Path, e: io::Error) -> ShimError {
    match e.kind() {
        io::ErrorKind::NotFound => ShimError::NotFound(format!("fifo {}", path.display())),
        _ => ShimError::Storage(format!("failed to open fifo {}: {}", path.display(), e)),
    }
}

fn spawn_stdin(mut source: BoxedReader, mut fifo: pipe::Sender) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::io::copy(&mut source, &mut fifo).await {
            Ok(bytes) => tracing::trace!(bytes, "stdin source ended"),
            Err(e) => tracing::debug!(error = %e, "stdin relay stopped"),
        }
    })
}

fn spawn_output(name: &'static str, mut fifo: pipe::Receiver, mut sink: BoxedWriter) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::io::copy(&mut fifo, &mut sink).await {
            Ok(bytes) => tracing::trace!(stream = name, bytes, "output relay finished"),
            Err(e) => tracing::debug!(stream = name, error = %e, "output relay stopped"),
        }
        let _ = sink.flush().await;
    })
}
