//! EPUB container plumbing: zip access, package document parsing and the
//! manifest model.

pub mod archive;
pub mod manifest;
pub mod parser;
mod writer;

pub use archive::{ArchiveEntry, EpubArchive};
pub use manifest::PackageManifest;
pub use parser::ManifestItem;
pub use writer::ArchiveWriter;
