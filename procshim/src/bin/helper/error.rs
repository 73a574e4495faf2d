//! Helper failures and the status byte each one reports.

use std::io;
use std::path::PathBuf;

use procshim::runtime::constants::{runtime, status};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
    /// The spec on stdin could not be decoded.
    #[error("read process spec: {0}")]
    Spec(#[source] serde_json::Error),

    /// A protocol object in the process directory could not be opened.
    #[error("open {name}: {source}")]
    Fifo {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The temporary `process.json` could not be written.
    #[error("write process.json: {0}")]
    ProcessFile(#[source] io::Error),

    #[error("allocate pty: {0}")]
    Pty(String),

    /// The runtime binary could not be started at all.
    #[error("start runtime {path}: {source}")]
    RuntimeSpawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The runtime exited without the process ever starting.
    #[error("runtime exited with code {0} before starting the process")]
    RuntimeExited(i32),

    #[error("wait for runtime: {0}")]
    Wait(#[source] io::Error),

    /// The exit protocol could not be completed.
    #[error("report exit: {0}")]
    Exit(#[source] io::Error),
}

impl HelperError {
    /// Launch status byte for this failure; never [`status::STARTED`].
    pub fn status_byte(&self) -> u8 {
        match self {
            HelperError::RuntimeExited(code) => (*code).clamp(1, 255) as u8,
            HelperError::RuntimeSpawn { .. } => runtime::EXEC_FAILED_CODE as u8,
            _ => status::FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte_is_never_started() {
        assert_eq!(HelperError::RuntimeExited(0).status_byte(), 1);
        assert_eq!(HelperError::RuntimeExited(127).status_byte(), 127);
        assert_eq!(HelperError::RuntimeExited(300).status_byte(), 255);
        assert_eq!(HelperError::Pty("no pty".into()).status_byte(), status::FAILED);
    }
}
