//! Background traversal of the source tree.
//!
//! The walker is the producer side of the pipeline: it recursively lists the
//! content root and pushes every regular file and symbolic link onto the file
//! queue, blocking whenever the consumer falls behind. Directory listings are
//! sorted by file name so the entry stream is reproducible across runs.
//!
//! ## Classification
//!
//! | Kind | Action |
//! |------|--------|
//! | Regular file, symlink | queued (symlinks are validated by the consumer) |
//! | Directory | recursed into |
//! | Block/character device, named pipe, socket | logged and skipped |
//! | Unknown from the listing | re-checked with a `stat`, else skipped |
//!
//! Failing to open the root is fatal for the build; an unreadable
//! subdirectory is logged and skipped.

use crate::queue::{QueueClosed, QueueProducer};
use std::fs::{self, FileType};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("unable to open directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file queue closed before the walk finished")]
    QueueClosed(#[from] QueueClosed),
    #[error("unable to start directory walker: {0}")]
    Spawn(#[source] io::Error),
    #[error("directory walker thread panicked")]
    Panicked,
}

/// Counters for a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub files: u64,
    pub directories: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    File,
    Directory,
    Unsupported(&'static str),
    Unknown,
}

fn classify(file_type: &FileType) -> NodeKind {
    if file_type.is_file() || file_type.is_symlink() {
        return NodeKind::File;
    }
    if file_type.is_dir() {
        return NodeKind::Directory;
    }
    classify_special(file_type)
}

#[cfg(unix)]
fn classify_special(file_type: &FileType) -> NodeKind {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_block_device() {
        NodeKind::Unsupported("this is a block device")
    } else if file_type.is_char_device() {
        NodeKind::Unsupported("this is a character device")
    } else if file_type.is_fifo() {
        NodeKind::Unsupported("this is a named pipe")
    } else if file_type.is_socket() {
        NodeKind::Unsupported("this is a UNIX domain socket")
    } else {
        NodeKind::Unknown
    }
}

#[cfg(not(unix))]
fn classify_special(_file_type: &FileType) -> NodeKind {
    NodeKind::Unknown
}

/// Fallback for entries the directory listing could not type.
fn reclassify(path: &Path) -> NodeKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => NodeKind::File,
        Ok(meta) if meta.is_dir() => NodeKind::Directory,
        Ok(_) => NodeKind::Unsupported("no clue what kind of file it is"),
        Err(_) => NodeKind::Unsupported("unable to stat"),
    }
}

/// Recursive producer of file paths under a content root.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk the whole tree on the current thread.
    pub fn run(&self, queue: &QueueProducer<PathBuf>) -> Result<WalkStats, WalkError> {
        let mut stats = WalkStats::default();
        self.visit(&self.root, queue, &mut stats)?;
        debug!(
            files = stats.files,
            directories = stats.directories,
            skipped = stats.skipped,
            "quitting directory walker"
        );
        Ok(stats)
    }

    /// Walk on a background thread. The queue's producer half moves into the
    /// thread and is dropped when the walk ends, which tells the consumer no
    /// more paths are coming.
    pub fn spawn(self, queue: QueueProducer<PathBuf>) -> WalkHandle {
        let handle = thread::Builder::new()
            .name("directory-walker".into())
            .spawn(move || self.run(&queue));
        WalkHandle { handle }
    }

    fn visit(
        &self,
        dir: &Path,
        queue: &QueueProducer<PathBuf>,
        stats: &mut WalkStats,
    ) -> Result<(), WalkError> {
        debug!(path = %dir.display(), "visiting directory");

        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(source) if dir == self.root => {
                return Err(WalkError::RootUnreadable {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "unable to open directory, skipping");
                stats.skipped += 1;
                return Ok(());
            }
        };
        stats.directories += 1;

        let mut entries = Vec::new();
        for entry in listing {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "unreadable directory entry");
                    stats.skipped += 1;
                }
            }
        }
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let kind = match entry.file_type().map(|t| classify(&t)) {
                Ok(NodeKind::Unknown) | Err(_) => reclassify(&path),
                Ok(known) => known,
            };

            match kind {
                NodeKind::File => {
                    queue.push(path)?;
                    stats.files += 1;
                }
                NodeKind::Directory => self.visit(&path, queue, stats)?,
                NodeKind::Unsupported(reason) => {
                    warn!("unable to deal with {} ({reason})", path.display());
                    stats.skipped += 1;
                }
                NodeKind::Unknown => {
                    warn!(
                        "unable to deal with {} (no clue what kind of file it is)",
                        path.display()
                    );
                    stats.skipped += 1;
                }
            }
        }

        Ok(())
    }
}

/// Joinable handle to a walker running in the background.
#[derive(Debug)]
pub struct WalkHandle {
    handle: io::Result<JoinHandle<Result<WalkStats, WalkError>>>,
}

impl WalkHandle {
    /// Wait for the walk to finish and return its outcome.
    pub fn join(self) -> Result<WalkStats, WalkError> {
        let handle = self.handle.map_err(WalkError::Spawn)?;
        handle.join().map_err(|_| WalkError::Panicked)?
    }
}
