use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// A replacement for `target` staged in a uniquely named temporary file in the
/// same directory.
///
/// Nothing is visible at `target` until [`AtomicFile::commit`]: the staged
/// bytes are flushed, fsynced and renamed over it in one step. Dropping the
/// guard without committing deletes the temporary file and leaves `target`
/// exactly as it was.
#[derive(Debug)]
pub struct AtomicFile {
    target: PathBuf,
    staged: NamedTempFile,
}

impl AtomicFile {
    pub fn create(target: &Path) -> Result<Self> {
        let dir = parent_dir(target);
        let file_name = target
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("staged");

        let staged = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|err| PipelineError::storage("staging", target, err))?;

        if let Ok(meta) = fs::metadata(target) {
            fs::set_permissions(staged.path(), meta.permissions())
                .map_err(|err| PipelineError::storage("copying permissions for", target, err))?;
        }

        Ok(Self {
            target: target.to_path_buf(),
            staged,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staged_path(&self) -> &Path {
        self.staged.path()
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.staged
            .write_all(bytes)
            .map_err(|err| PipelineError::storage("writing staged copy of", &self.target, err))
    }

    /// Direct access for writers that stream (csv, polars).
    pub fn file_mut(&mut self) -> &mut File {
        self.staged.as_file_mut()
    }

    pub fn commit(mut self) -> Result<()> {
        self.staged
            .flush()
            .map_err(|err| PipelineError::storage("flushing", &self.target, err))?;
        self.staged
            .as_file()
            .sync_all()
            .map_err(|err| PipelineError::storage("syncing", &self.target, err))?;

        let target = self.target;
        self.staged
            .persist(&target)
            .map_err(|err| PipelineError::storage("replacing", &target, err.error))?;

        debug!(path = %target.display(), "atomically replaced file");
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staged.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.staged.flush()
    }
}

/// Writes `bytes` to `target` via [`AtomicFile`].
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(target)?;
    file.write_all(bytes)?;
    file.commit()
}

/// Best-effort fsync of a directory so a completed rename survives a crash.
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .map_err(|err| PipelineError::storage("syncing directory", dir, err))?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.csv");
        fs::write(&target, b"old\n").expect("seed");

        write_atomic(&target, b"new\n").expect("atomic write");
        assert_eq!(fs::read(&target).expect("read"), b"new\n");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn dropping_uncommitted_write_keeps_prior_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.csv");
        fs::write(&target, b"old\n").expect("seed");

        {
            let mut staged = AtomicFile::create(&target).expect("stage");
            staged.write_all(b"half a li").expect("partial write");
            assert!(staged.staged_path().exists());
        }

        assert_eq!(fs::read(&target).expect("read"), b"old\n");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn replacement_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.csv");
        fs::write(&target, b"old\n").expect("seed");
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).expect("chmod");

        write_atomic(&target, b"new\n").expect("atomic write");
        let mode = fs::metadata(&target).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn missing_directory_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("absent/out.csv");
        let err = write_atomic(&target, b"x").expect_err("no parent dir");
        assert!(matches!(err, PipelineError::Storage { .. }));
    }
}
