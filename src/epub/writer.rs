use std::io::{Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::archive::{ArchiveEntry, EpubArchive};
use crate::error::{Error, Result};

/// Emits a new container entry by entry.
///
/// Untouched entries are raw-copied from the source archive; substituted and
/// created entries are written fresh.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
        }
    }

    /// Copy `entry` from `archive` without recompressing it.
    pub fn copy_entry(&mut self, archive: &mut EpubArchive, entry: &ArchiveEntry) -> Result<()> {
        archive.copy_raw(entry.index, &mut self.zip)
    }

    /// Write `bytes` under `name`. Stored entries stay stored, everything
    /// else is deflated.
    pub fn write_entry(
        &mut self,
        name: &str,
        bytes: &[u8],
        compression: CompressionMethod,
        last_modified: Option<DateTime>,
    ) -> Result<()> {
        let method = match compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let mut options = SimpleFileOptions::default().compression_method(method);
        if let Some(time) = last_modified {
            options = options.last_modified_time(time);
        }

        self.zip
            .start_file(name.to_string(), options)
            .map_err(Error::ArchiveWrite)?;
        self.zip.write_all(bytes).map_err(Error::write_io)
    }

    /// Write the central directory and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.zip.finish().map_err(Error::ArchiveWrite)
    }
}
