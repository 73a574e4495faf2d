//! Error types shared by the supervisor and the helper.
//!
//! Errors are categorized by who has to act on them:
//! - setup and launch errors: returned to the caller of `run`
//! - [`SupervisorError`]: the helper broke the exit protocol
//! - signal delivery errors: usually a benign race with process exit

use thiserror::Error;

/// Result alias used across the procshim crates.
pub type ShimResult<T> = Result<T, ShimError>;

/// Errors raised while launching, supervising or signalling a process.
#[derive(Debug, Error)]
pub enum ShimError {
    /// The process directory or one of its FIFOs could not be created.
    #[error("failed to create process directory: {0}")]
    DirectoryCreate(String),

    /// Anything else that must be ready before the helper starts
    /// (spec encoding, id validation, pipe allocation).
    #[error("setup: {0}")]
    Setup(String),

    /// The helper binary itself could not be started.
    #[error("failed to launch helper: {0}")]
    Launch(String),

    /// The helper started but reported (or implied, via EOF) that the
    /// low-level runtime did not start the process.
    #[error("runtime exec: {cause}: {message}")]
    LaunchFailed { cause: String, message: String },

    /// The exit protocol was violated by the helper.
    #[error("supervisor: {0}")]
    Supervisor(#[from] SupervisorError),

    /// The pid file is missing or unreadable.
    #[error("pid unavailable: {0}")]
    PidUnavailable(String),

    /// A signal could not be delivered to a resolved pid.
    #[error("signal delivery: {0}")]
    SignalDelivery(String),

    /// The process directory (or an object inside it) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem failure outside of the protocol objects.
    #[error("storage: {0}")]
    Storage(String),

    /// Invalid or incomplete configuration.
    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Violations of the `exit` / `exitcode` contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("missing exit code")]
    MissingExitCode,

    #[error("empty exit code")]
    EmptyExitCode,

    #[error("unparseable exit code: {0:?}")]
    UnparseableExitCode(String),
}

impl ShimError {
    /// True when the supervision mechanism failed, as opposed to the
    /// supervised program.
    pub fn is_supervisor_error(&self) -> bool {
        matches!(self, ShimError::Supervisor(_))
    }

    /// True for delivery failures, which are expected when signalling
    /// races with the process exiting.
    pub fn is_signal_delivery(&self) -> bool {
        matches!(self, ShimError::SignalDelivery(_))
    }
}
