//! Completion targets.
//!
//! A [`Target`] answers "is this unit of work already done?" by looking at
//! the backing store on every call. Nothing is cached between calls, which
//! is what makes an interrupted build resumable.

use crate::error::{Result, ResultExt};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// A writer whose output becomes visible only on [`TargetWriter::commit`].
pub trait TargetWriter: Write {
    /// Flush and publish the written artifact.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// A persisted artifact with a completion predicate.
pub trait Target: Send + Sync + fmt::Debug {
    /// Whether the artifact exists. Checked against the store on every call.
    fn exists(&self) -> Result<bool>;

    /// Open a writer for the artifact.
    fn open_for_write(&self) -> Result<Box<dyn TargetWriter>>;

    /// Locator handed to downstream consumers.
    fn reference(&self) -> String;

    /// When the artifact was last written, if it exists and the store
    /// records it. A dependent whose target is older than one of its
    /// dependencies' targets is rebuilt.
    fn modified(&self) -> Result<Option<SystemTime>> {
        Ok(None)
    }
}

/// A target backed by a file on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an atomic writer without boxing it.
    pub fn writer(&self) -> Result<AtomicFileWriter> {
        AtomicFileWriter::create(&self.path)
    }

    /// Write the whole artifact in one go.
    pub fn write_all(&self, contents: &[u8]) -> Result<()> {
        let mut writer = self.writer()?;
        writer
            .write_all(contents)
            .context(format!("Writing {}", self.path.display()))?;
        writer.finish()
    }
}

impl Target for FileTarget {
    fn exists(&self) -> Result<bool> {
        self.path
            .try_exists()
            .context(format!("Checking {}", self.path.display()))
    }

    fn open_for_write(&self) -> Result<Box<dyn TargetWriter>> {
        Ok(Box::new(self.writer()?))
    }

    fn reference(&self) -> String {
        self.path.display().to_string()
    }

    fn modified(&self) -> Result<Option<SystemTime>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Reading metadata of {}", self.path.display())),
        }
    }
}

/// Writes to a temporary sibling file and renames it into place on commit.
///
/// Dropping the writer without committing removes the temporary file, so a
/// failed task never leaves a partial artifact behind that would pass
/// [`Target::exists`].
#[derive(Debug)]
pub struct AtomicFileWriter {
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<BufWriter<File>>,
    committed: bool,
}

impl AtomicFileWriter {
    fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context(format!("Creating {}", parent.display()))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());
        let temp_path = path.with_file_name(format!(".{}.partial", file_name));
        let file = File::create(&temp_path).context(format!("Creating {}", temp_path.display()))?;

        Ok(Self {
            final_path: path.to_path_buf(),
            temp_path,
            file: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    /// Flush, sync and rename into place.
    pub fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.file.take() {
            let file = writer
                .into_inner()
                .map_err(|e| e.into_error())
                .context(format!("Flushing {}", self.temp_path.display()))?;
            file.sync_all()
                .context(format!("Syncing {}", self.temp_path.display()))?;
        }
        fs::rename(&self.temp_path, &self.final_path)
            .context(format!("Publishing {}", self.final_path.display()))?;
        self.committed = true;
        Ok(())
    }

    fn inner(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("writer already finished"))
    }
}

impl Write for AtomicFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl TargetWriter for AtomicFileWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        (*self).finish()
    }
}

impl Drop for AtomicFileWriter {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.committed
            && let Err(e) = fs::remove_file(&self.temp_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", self.temp_path.display(), e);
        }
    }
}
