//! Error types for epubimg operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, rewriting or replacing an archive.
///
/// Every variant except [`Error::Directory`] is scoped to a single archive:
/// the batch driver records it and moves on to the next file.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open archive: {0}")]
    ArchiveOpen(#[source] zip::result::ZipError),

    #[error("malformed package: {0}")]
    MalformedPackage(String),

    #[error("failed to write archive: {0}")]
    ArchiveWrite(#[source] zip::result::ZipError),

    #[error("manifest sync failed: {0}")]
    ManifestSync(String),

    #[error("invalid target {}: {reason}", path.display())]
    Directory { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to replace original file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl Error {
    /// Wrap an I/O failure that happened while emitting the new container.
    pub(crate) fn write_io(err: std::io::Error) -> Self {
        Error::ArchiveWrite(zip::result::ZipError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
