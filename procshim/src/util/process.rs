//! Pid file utilities.

use procshim_shared::errors::{ShimError, ShimResult};
use std::path::Path;

/// Read PID from file.
///
/// The file is written by the runtime once the supervised process exists.
/// It contains a PID as a decimal string, optionally with a trailing newline.
///
/// # Returns
/// * `Ok(pid)` - The PID read from the file
/// * `Err(NotFound)` - The file does not exist (yet)
/// * `Err(Storage)` - The file cannot be read or parsed
pub fn read_pid_file(path: &Path) -> ShimResult<u32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ShimError::NotFound(format!("PID file {}", path.display()))
        } else {
            ShimError::Storage(format!("Failed to read PID file {}: {}", path.display(), e))
        }
    })?;

    content.trim().parse::<u32>().map_err(|e| {
        ShimError::Storage(format!(
            "Invalid PID in file {}: '{}' - {}",
            path.display(),
            content.trim(),
            e
        ))
    })
}

/// Check if a process with the given PID exists.
///
/// Sends the null signal, which performs the permission and existence
/// checks without delivering anything.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_is_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn test_read_pid_file_valid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "12345").unwrap();

        let pid = read_pid_file(file.path()).expect("Should parse valid PID");
        assert_eq!(pid, 12345);
    }

    #[test]
    fn test_read_pid_file_no_newline() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "67890").unwrap();

        assert_eq!(read_pid_file(file.path()).unwrap(), 67890);
    }

    #[test]
    fn test_read_pid_file_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not-a-pid").unwrap();

        let err = read_pid_file(file.path()).unwrap_err();
        assert!(matches!(err, ShimError::Storage(_)));
    }

    #[test]
    fn test_read_pid_file_missing() {
        let err = read_pid_file(Path::new("/nonexistent/path/to/pidfile")).unwrap_err();
        assert!(matches!(err, ShimError::NotFound(_)));
    }
}
