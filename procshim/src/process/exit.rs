//! Exit protocol: the `exit` FIFO and the `exitcode` file.

use super::fifo;
use procshim_shared::errors::{ShimError, ShimResult, SupervisorError};
use std::io::{self, Read};
use std::path::Path;

/// Block until the `exit` FIFO is signalled.
///
/// The FIFO is opened non-blocking so the open itself never hangs, then
/// switched to blocking for the read. A byte and end-of-file both mean the
/// helper is done: once the helper has gone, no writer is left.
pub(crate) fn await_exit_signal(path: &Path) -> io::Result<()> {
    let mut exit = fifo::open_present_reader(path)?;
    let mut buf = [0u8; 1];
    loop {
        match exit.read(&mut buf) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Read the persisted exit code. Only valid after the exit signal.
pub(crate) fn read_exit_code(path: &Path) -> ShimResult<i32> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_exit_code(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(SupervisorError::MissingExitCode.into())
        }
        Err(e) => Err(ShimError::Storage(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

pub(crate) fn parse_exit_code(bytes: &[u8]) -> Result<i32, SupervisorError> {
    if bytes.is_empty() {
        return Err(SupervisorError::EmptyExitCode);
    }
    let text = String::from_utf8_lossy(bytes);
    text.trim()
        .parse::<i32>()
        .map_err(|_| SupervisorError::UnparseableExitCode(text.into_owned()))
}
