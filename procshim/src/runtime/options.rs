//! Configuration for the exec runner.

use crate::runtime::constants::{dirs as const_dirs, envs, helper};
use crate::util::find_binary;
use procshim_shared::errors::{ShimError, ShimResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for [`ExecRunner`](crate::ExecRunner).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecRunnerOptions {
    /// Helper binary launched for every `run`.
    pub helper_path: PathBuf,

    /// Low-level OCI runtime the helper executes.
    pub runtime_path: PathBuf,

    /// Root under which process directories are created.
    ///
    /// Default: ~/.procshim/processes
    #[serde(default = "default_processes_dir")]
    pub processes_dir: PathBuf,

    /// Pass the caller's `RUST_LOG` to the helper.
    ///
    /// Default: true
    #[serde(default = "default_forward_rust_log")]
    pub forward_rust_log: bool,
}

fn default_processes_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    home.join(const_dirs::PROCSHIM_DIR).join(const_dirs::PROCESSES_DIR)
}

fn default_forward_rust_log() -> bool {
    true
}

impl ExecRunnerOptions {
    pub fn new(helper_path: impl Into<PathBuf>, runtime_path: impl Into<PathBuf>) -> Self {
        Self {
            helper_path: helper_path.into(),
            runtime_path: runtime_path.into(),
            processes_dir: default_processes_dir(),
            forward_rust_log: default_forward_rust_log(),
        }
    }

    /// Set the processes root (builder pattern).
    pub fn with_processes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processes_dir = dir.into();
        self
    }

    /// Build options from the environment.
    ///
    /// * `PROCSHIM_HELPER` - helper path (otherwise searched with
    ///   [`find_binary`])
    /// * `PROCSHIM_RUNTIME` - runtime path (required)
    /// * `PROCSHIM_PROCESSES_DIR` - processes root (optional)
    pub fn from_env() -> ShimResult<Self> {
        let helper_path = match std::env::var_os(envs::HELPER) {
            Some(path) => PathBuf::from(path),
            None => find_binary(helper::BINARY)?,
        };

        let runtime_path = std::env::var_os(envs::RUNTIME)
            .map(PathBuf::from)
            .ok_or_else(|| ShimError::Config(format!("{} is not set", envs::RUNTIME)))?;

        let mut options = Self::new(helper_path, runtime_path);
        if let Some(dir) = std::env::var_os(envs::PROCESSES_DIR) {
            options.processes_dir = PathBuf::from(dir);
        }
        Ok(options)
    }

    /// Check that the configured binaries exist.
    pub fn validate(&self) -> ShimResult<()> {
        if !self.helper_path.is_file() {
            return Err(ShimError::Config(format!(
                "helper binary not found: {}",
                self.helper_path.display()
            )));
        }
        if self.runtime_path.as_os_str().is_empty() {
            return Err(ShimError::Config("runtime path is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let options: ExecRunnerOptions =
            serde_json::from_str(r#"{"helper_path":"/bin/helper","runtime_path":"/bin/runc"}"#)
                .unwrap();
        assert_eq!(options.helper_path, PathBuf::from("/bin/helper"));
        assert!(options.forward_rust_log);
        assert!(options.processes_dir.ends_with(".procshim/processes"));
    }

    #[test]
    fn test_validate_missing_helper() {
        let options = ExecRunnerOptions::new("/nonexistent/procshim-helper", "/usr/bin/runc");
        let err = options.validate().unwrap_err();
        assert!(matches!(err, ShimError::Config(_)));
    }

    #[test]
    fn test_validate_empty_runtime() {
        let helper = tempfile::NamedTempFile::new().unwrap();
        let options = ExecRunnerOptions::new(helper.path(), "");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_with_processes_dir() {
        let options = ExecRunnerOptions::new("/h", "/r").with_processes_dir("/run/procs");
        assert_eq!(options.processes_dir, PathBuf::from("/run/procs"));
    }
}
