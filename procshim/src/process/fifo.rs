//! Named pipe primitives.
//!
//! Every FIFO end this crate touches goes through the functions here, so the
//! open-order rules live in one place:
//!
//! - A blocking open of a read end waits for a writer, and a blocking open of
//!   a write end waits for a reader. When the peer is a process that is still
//!   starting (`run`), both sides open the stdio FIFOs in the same order
//!   (`stdin`, `stdout`, `stderr`) and block until they meet.
//! - When the peer should already be there (`attach`, `wait`), ends are
//!   opened non-blocking and then switched to blocking. A read end opened
//!   this way never hangs in `open`; a write end fails with `ENXIO` when
//!   nobody reads, which is reported as `None`.
//!
//! One end moves through `closed -> opening -> connected -> closed`; the
//! connected state is the returned [`File`], and dropping it closes the end.

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Permissions of created FIFOs.
const FIFO_MODE: u32 = 0o600;

/// Create a FIFO at `path`.
pub(crate) fn create(path: &Path) -> io::Result<()> {
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(FIFO_MODE)).map_err(io::Error::from)
}

/// Open the read end, blocking until a writer opens the FIFO.
pub(crate) fn open_reader(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open the write end, blocking until a reader opens the FIFO.
pub(crate) fn open_writer(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(path)
}

/// Open the read end without waiting for a writer, then make it blocking.
///
/// Reads block while a writer is connected and return end-of-file once no
/// writer is left.
pub(crate) fn open_present_reader(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;
    set_blocking(&file)?;
    Ok(file)
}

/// Open the write end only if a reader is connected; the end stays
/// non-blocking.
pub(crate) fn try_open_writer(path: &Path) -> io::Result<Option<File>> {
    match OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.raw_os_error() == Some(libc::ENXIO) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Clear `O_NONBLOCK` on an open descriptor.
pub(crate) fn set_blocking(fd: &impl AsFd) -> io::Result<()> {
    set_nonblocking(fd, false)
}

/// Set or clear `O_NONBLOCK` on an open descriptor.
pub(crate) fn set_nonblocking(fd: &impl AsFd, nonblocking: bool) -> io::Result<()> {
    let mut flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    flags.set(OFlag::O_NONBLOCK, nonblocking);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Both ends of a set of FIFOs, held open by this process.
///
/// While held, any blocking open of either end of those FIFOs completes
/// immediately. Used to release opens whose real peer will never arrive.
#[derive(Debug)]
pub(crate) struct PeerHold {
    _ends: Vec<File>,
}

impl PeerHold {
    pub(crate) fn open(paths: &[PathBuf]) -> Self {
        let ends = paths
            .iter()
            .filter_map(|path| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .custom_flags(libc::O_NONBLOCK)
                    .open(path)
                    .inspect_err(|e| {
                        tracing::debug!(fifo = %path.display(), error = %e, "cannot hold fifo");
                    })
                    .ok()
            })
            .collect();
        Self { _ends: ends }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::fs::FileTypeExt;
    use std::thread;
    use tempfile::TempDir;

    fn fifo_in(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        create(&path).unwrap();
        path
    }

    #[test]
    fn test_create_makes_fifo() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn test_create_fails_when_exists() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        let err = create(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_try_open_writer_without_reader() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        assert!(try_open_writer(&path).unwrap().is_none());
    }

    #[test]
    fn test_present_reader_sees_eof_without_writer() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        let mut reader = open_present_reader(&path).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_blocking_pair_meets() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut w = open_writer(&writer_path).unwrap();
            w.write_all(b"ping").unwrap();
        });

        let mut reader = open_reader(&path).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        writer.join().unwrap();
        assert_eq!(out, "ping");
    }

    #[test]
    fn test_peer_hold_releases_blocking_open() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        let hold = PeerHold::open(std::slice::from_ref(&path));

        // Would block forever without the hold.
        let writer = open_writer(&path).unwrap();
        drop(writer);
        drop(hold);

        // Released: nobody reads any more.
        assert!(try_open_writer(&path).unwrap().is_none());
    }

    #[test]
    fn test_set_nonblocking_toggles_flag() {
        let dir = TempDir::new().unwrap();
        let path = fifo_in(&dir, "f");
        let reader = open_present_reader(&path).unwrap();
        let flags = || OFlag::from_bits_truncate(fcntl(&reader, FcntlArg::F_GETFL).unwrap());
        assert!(!flags().contains(OFlag::O_NONBLOCK));

        set_nonblocking(&reader, true).unwrap();
        assert!(flags().contains(OFlag::O_NONBLOCK));
        set_blocking(&reader).unwrap();
        assert!(!flags().contains(OFlag::O_NONBLOCK));
    }
}
