//! Reference storage engine.
//!
//! The pipeline only produces entries and payloads; turning them into a
//! container file is the job of a [`StorageEngine`]. [`PackedArchiveWriter`]
//! is a simple one used by the command line tool and the tests.
//!
//! ## Write order
//!
//! The writer drains the whole entry stream before asking for any payload.
//! Payloads such as `M/Counter` and pages containing template links depend
//! on every file entry having been seen, so this order is required, not
//! incidental.
//!
//! ## File layout
//!
//! ```text
//! ┌────────────────────────────┐
//! │ magic "SITEARK\0", u32 ver │  header
//! ├────────────────────────────┤
//! │ cluster 0: blob blob ...   │  payloads, concatenated; a cluster is
//! │ cluster 1: blob ...        │  closed once it holds min_chunk_size bytes
//! ├────────────────────────────┤
//! │ directory (JSON)           │  entries, clusters, main page
//! ├────────────────────────────┤
//! │ u64 directory offset (LE)  │  trailer
//! │ SHA-256 of all bytes above │
//! └────────────────────────────┘
//! ```

use crate::entry::Entry;
use crate::namespace::ArchiveUrl;
use crate::source::{EntrySource, SourceError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const MAGIC: &[u8; 8] = b"SITEARK\0";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4;
const TRAILER_LEN: usize = 8 + 32;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("directory encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt archive: {0}")]
    Corrupt(String),
}

/// The pull interface a storage engine drives.
pub trait EntryStream {
    fn main_page(&self) -> ArchiveUrl;
    fn next_entry(&mut self) -> Result<Option<Entry>, SourceError>;
    fn payload(&self, entry: &Entry) -> Result<Vec<u8>, SourceError>;
}

impl EntryStream for EntrySource {
    fn main_page(&self) -> ArchiveUrl {
        EntrySource::main_page(self)
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, SourceError> {
        self.get_next_entry()
    }

    fn payload(&self, entry: &Entry) -> Result<Vec<u8>, SourceError> {
        self.get_payload(entry)
    }
}

/// Serializes an entry stream into a container file.
pub trait StorageEngine {
    fn create(
        &self,
        stream: &mut dyn EntryStream,
        output: &Path,
    ) -> Result<ArchiveStats, ArchiveError>;
}

/// Summary of a written archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Entry count per namespace.
    pub namespaces: BTreeMap<char, u64>,
    pub redirects: u64,
    pub clusters: u64,
    pub payload_bytes: u64,
    pub archive_bytes: u64,
}

impl ArchiveStats {
    pub fn entries(&self) -> u64 {
        self.namespaces.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub namespace: char,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// `/<ns>/<url>` of the target, for redirects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// `(cluster, blob)` holding the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Absolute file offset of the first blob.
    pub offset: u64,
    pub blob_sizes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub version: u32,
    pub main_page: String,
    pub entries: Vec<DirectoryEntry>,
    pub clusters: Vec<ClusterInfo>,
}

/// Writes `header | clusters | directory | trailer` archives.
#[derive(Debug, Clone)]
pub struct PackedArchiveWriter {
    min_chunk_size: usize,
}

impl PackedArchiveWriter {
    pub fn new(min_chunk_size: usize) -> Self {
        Self { min_chunk_size }
    }
}

impl StorageEngine for PackedArchiveWriter {
    fn create(
        &self,
        stream: &mut dyn EntryStream,
        output: &Path,
    ) -> Result<ArchiveStats, ArchiveError> {
        let main_page = stream.main_page();
        let mut entries = Vec::new();
        while let Some(entry) = stream.next_entry()? {
            entries.push(entry);
        }
        info!(entries = entries.len(), "entry stream drained, writing payloads");

        let mut out = HashingWriter::new(BufWriter::new(File::create(output)?));
        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;

        let mut stats = ArchiveStats::default();
        let mut records = Vec::with_capacity(entries.len());
        let mut clusters: Vec<ClusterInfo> = Vec::new();
        let mut open: Option<(ClusterInfo, u64)> = None;

        for entry in &entries {
            *stats.namespaces.entry(entry.namespace()).or_default() += 1;
            let mut record = DirectoryEntry {
                namespace: entry.namespace(),
                url: entry.url.url.clone(),
                title: entry.title.clone(),
                mime_type: entry.mime_type.clone(),
                redirect: None,
                blob: None,
            };

            if let Some(target) = entry.redirect_target() {
                stats.redirects += 1;
                record.redirect = Some(target.full());
                records.push(record);
                continue;
            }

            let payload = stream.payload(entry)?;
            let (cluster, filled) = open.get_or_insert_with(|| {
                (
                    ClusterInfo {
                        offset: out.written,
                        blob_sizes: Vec::new(),
                    },
                    0,
                )
            });
            out.write_all(&payload)?;
            record.blob = Some((clusters.len(), cluster.blob_sizes.len()));
            cluster.blob_sizes.push(payload.len() as u64);
            *filled += payload.len() as u64;
            stats.payload_bytes += payload.len() as u64;
            records.push(record);

            if *filled >= self.min_chunk_size as u64
                && let Some((cluster, size)) = open.take()
            {
                debug!(cluster = clusters.len(), size, "closing cluster");
                clusters.push(cluster);
            }
        }
        if let Some((cluster, _)) = open.take() {
            clusters.push(cluster);
        }
        stats.clusters = clusters.len() as u64;

        let directory = Directory {
            version: FORMAT_VERSION,
            main_page: main_page.full(),
            entries: records,
            clusters,
        };
        let directory_offset = out.written;
        serde_json::to_writer(&mut out, &directory)?;

        out.write_all(&directory_offset.to_le_bytes())?;
        let checksum = out.hasher.clone().finalize();
        out.inner.write_all(&checksum)?;
        out.written += checksum.len() as u64;
        out.inner.flush()?;

        stats.archive_bytes = out.written;
        info!(
            path = %output.display(),
            bytes = stats.archive_bytes,
            clusters = stats.clusters,
            "archive written"
        );
        Ok(stats)
    }
}

/// Counts and hashes everything written through it.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A whole archive loaded into memory, checksum verified.
#[derive(Debug)]
pub struct PackedArchive {
    bytes: Vec<u8>,
    pub directory: Directory,
}

impl PackedArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        if bytes.len() < HEADER_LEN + TRAILER_LEN || !bytes.starts_with(MAGIC) {
            return Err(ArchiveError::Corrupt("bad header".into()));
        }
        let trailer = bytes.len() - TRAILER_LEN;
        let (body, stored) = bytes.split_at(trailer + 8);
        if Sha256::digest(body).as_slice() != stored {
            return Err(ArchiveError::Corrupt("checksum mismatch".into()));
        }

        let mut offset = [0; 8];
        offset.copy_from_slice(&bytes[trailer..trailer + 8]);
        let offset = usize::try_from(u64::from_le_bytes(offset))
            .ok()
            .filter(|&o| (HEADER_LEN..=trailer).contains(&o))
            .ok_or_else(|| ArchiveError::Corrupt("directory offset out of range".into()))?;

        let directory = serde_json::from_slice(&bytes[offset..trailer])?;
        Ok(Self { bytes, directory })
    }

    pub fn entry(&self, namespace: char, url: &str) -> Option<&DirectoryEntry> {
        self.directory
            .entries
            .iter()
            .find(|e| e.namespace == namespace && e.url == url)
    }

    /// Stored payload of an entry; `None` for redirects and unknown URLs.
    pub fn payload(&self, namespace: char, url: &str) -> Option<&[u8]> {
        let (cluster, blob) = self.entry(namespace, url)?.blob?;
        let cluster = self.directory.clusters.get(cluster)?;
        let start = cluster.offset + cluster.blob_sizes.get(..blob)?.iter().sum::<u64>();
        let len = *cluster.blob_sizes.get(blob)?;
        let start = usize::try_from(start).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.bytes.get(start..end)
    }
}
