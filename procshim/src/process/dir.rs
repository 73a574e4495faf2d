//! Process directory lifecycle.

use super::ProcessId;
use super::fifo;
use crate::runtime::constants::modes;
use procshim_shared::errors::{ShimError, ShimResult};
use procshim_shared::layout::ProcessLayout;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// On-disk handle of one supervised process.
#[derive(Clone, Debug)]
pub struct ProcessDir {
    layout: ProcessLayout,
}

impl ProcessDir {
    /// Create `processes_dir/<id>` with every FIFO of the layout.
    ///
    /// Fails if the directory already exists. A partially created directory
    /// is removed before returning the error.
    pub fn create(processes_dir: &Path, id: &ProcessId) -> ShimResult<Self> {
        std::fs::create_dir_all(processes_dir).map_err(|e| {
            ShimError::DirectoryCreate(format!("{}: {}", processes_dir.display(), e))
        })?;

        let layout = ProcessLayout::under(processes_dir, id.as_str());
        DirBuilder::new()
            .mode(modes::PROCESS_DIR)
            .create(layout.root())
            .map_err(|e| {
                ShimError::DirectoryCreate(format!("{}: {}", layout.root().display(), e))
            })?;

        for path in layout.fifos() {
            if let Err(e) = fifo::create(&path) {
                let _ = Self::remove(layout.root());
                return Err(ShimError::DirectoryCreate(format!(
                    "mkfifo {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        tracing::debug!(dir = %layout.root().display(), "Created process directory");
        Ok(Self { layout })
    }

    /// Bind to an existing directory.
    pub fn open(processes_dir: &Path, id: &ProcessId) -> ShimResult<Self> {
        let layout = ProcessLayout::under(processes_dir, id.as_str());
        if !layout.root().is_dir() {
            return Err(ShimError::NotFound(format!(
                "process directory {}",
                layout.root().display()
            )));
        }
        Ok(Self { layout })
    }

    /// Delete the directory tree at `root`. Removing a missing tree succeeds.
    pub fn remove(root: &Path) -> ShimResult<()> {
        match std::fs::remove_dir_all(root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShimError::Storage(format!(
                "failed to remove {}: {}",
                root.display(),
                e
            ))),
        }
    }

    pub fn layout(&self) -> &ProcessLayout {
        &self.layout
    }

    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    /// True once the helper has persisted an exit code.
    pub fn has_exit_code(&self) -> bool {
        self.layout.exit_code().exists()
    }
}
