//! File-backed checkpoint store.
//!
//! Layout: a single `master.info` file inside the data directory containing
//! `<segment>:<offset>`, e.g. `mysql-bin.000007:4523`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use binsync_core::LogPosition;
use tempfile::NamedTempFile;
use tracing::{debug, error};

use super::{CheckpointError, CheckpointStore};

/// File name of the checkpoint record inside the data directory.
pub const CHECKPOINT_FILE_NAME: &str = "master.info";

/// Checkpoint store writing a small text record into a data directory.
///
/// Saves go to a temporary file in the same directory which is fsynced and then
/// renamed over the record, so a crash mid-save leaves the old record intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(CHECKPOINT_FILE_NAME);
        Self { dir, path }
    }

    /// Full path of the checkpoint record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        // Make the rename itself durable.
        #[cfg(unix)]
        fs::File::open(&self.dir)?.sync_all()?;

        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<LogPosition>, CheckpointError> {
        fs::create_dir_all(&self.dir)?;

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let position = raw.parse::<LogPosition>().map_err(|source| CheckpointError::Parse {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(position))
    }

    fn save(&self, position: &LogPosition) -> Result<(), CheckpointError> {
        self.write_atomic(position.to_string().as_bytes())
            .map_err(|e| {
                error!(path = %self.path.display(), %position, error = %e, "failed to save checkpoint");
                CheckpointError::Io(e)
            })
    }
}
