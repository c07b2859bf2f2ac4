//! # epubimg
//!
//! Batch image fixups for EPUB archives.
//!
//! ## Features
//!
//! - Replace `<figure class="illust"><svg><image .../></svg></figure>`
//!   wrappers with plain `<img>` tags
//! - Strip fixed image sizes and add a responsive-image CSS rule, creating and
//!   registering a stylesheet when the book has none
//! - Every untouched entry is copied byte for byte, in stored order
//! - Originals are replaced atomically, and only when the rewrite succeeded
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::Cursor;
//! use epubimg::{EpubArchive, Rewriter};
//!
//! let mut archive = EpubArchive::open("book.epub")?;
//! let mut output = Cursor::new(Vec::new());
//! let summary = Rewriter::default().rewrite(&mut archive, &mut output)?;
//! println!("{} parts replaced", summary.replaced.len());
//! # Ok::<(), epubimg::Error>(())
//! ```
//!
//! Rewriting files in place, a directory at a time:
//!
//! ```no_run
//! use std::path::Path;
//! use epubimg::{Rewriter, batch};
//!
//! let report = batch::run(Path::new("library/"), &Rewriter::default())?;
//! assert!(report.is_success());
//! # Ok::<(), epubimg::Error>(())
//! ```

pub mod batch;
pub mod engine;
pub mod epub;
pub mod error;
pub mod package;
pub mod transform;
pub(crate) mod util;

pub use batch::{BatchReport, Outcome};
pub use engine::{Mode, RewriteOptions, RewriteStrategy, RewriteSummary, Rewriter};
pub use epub::{EpubArchive, PackageManifest};
pub use error::{Error, Result};
pub use package::{NewResource, Package, PackagePart, PartKind};
pub use transform::{
    LinkPolicy, MarkerToken, PartParseWarning, ResponsiveImages, Transform, TransformResult,
    VectorToRaster,
};
