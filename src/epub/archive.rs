//! Zip container access with stored entry order preserved.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use tracing::warn;
use zip::result::ZipError;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::util::normalize_path;

/// One physical member of the container, in stored order.
///
/// The bytes themselves stay inside the archive buffer; an entry that is not
/// substituted is raw-copied from there without recompression.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Position in the central directory.
    pub index: usize,
    /// Name exactly as stored.
    pub name: String,
    /// Normalized path used for matching.
    pub path: String,
    pub compression: CompressionMethod,
    pub size: u64,
    pub compressed_size: u64,
    pub last_modified: Option<DateTime>,
    pub is_dir: bool,
}

/// A zip container held in memory.
pub struct EpubArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<ArchiveEntry>,
    /// Normalized path -> position in `entries`.
    by_path: HashMap<String, usize>,
}

impl EpubArchive {
    /// Read a container from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::ArchiveOpen(ZipError::Io(e)))?;
        Self::from_bytes(data)
    }

    /// Parse a container from an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(Error::ArchiveOpen)?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut by_path = HashMap::with_capacity(archive.len());

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(Error::ArchiveOpen)?;
            let name = file.name().to_string();
            let path = normalize_path(&name);

            if by_path.contains_key(&path) {
                warn!(entry = %name, "duplicate entry path, later copy is not addressable");
            } else {
                by_path.insert(path.clone(), entries.len());
            }

            entries.push(ArchiveEntry {
                index,
                name,
                path,
                compression: file.compression(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                last_modified: file.last_modified(),
                is_dir: file.is_dir(),
            });
        }

        Ok(Self {
            archive,
            entries,
            by_path,
        })
    }

    /// All entries in stored order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by exact normalized path.
    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Read and decompress an entry by exact normalized path.
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let index = self
            .entry(path)
            .map(|e| e.index)
            .ok_or(Error::ArchiveOpen(ZipError::FileNotFound))?;

        let mut file = self.archive.by_index(index).map_err(Error::ArchiveOpen)?;
        let mut contents = Vec::with_capacity(read_capacity(file.size()));
        file.read_to_end(&mut contents)
            .map_err(|e| Error::ArchiveOpen(ZipError::Io(e)))?;
        Ok(contents)
    }

    /// Copy the stored bytes of entry `index` into `writer` unchanged.
    pub(crate) fn copy_raw<W: Write + Seek>(
        &mut self,
        index: usize,
        writer: &mut ZipWriter<W>,
    ) -> Result<()> {
        let file = self.archive.by_index_raw(index).map_err(Error::ArchiveOpen)?;
        writer.raw_copy_file(file).map_err(Error::ArchiveWrite)
    }
}

/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Initial buffer size for an entry declaring `size` bytes. The declared
/// size is untrusted; larger entries grow the buffer while reading.
fn read_capacity(size: u64) -> usize {
    size.min(MAX_PREALLOC) as usize
}
