//! Content transforms applied to package parts
//!
//! - svg: replace decorative SVG image wrappers with plain `<img>` tags
//! - responsive: strip fixed image sizes and add an auto-scaling class
//!
//! A transform sees one part at a time and returns the whole new content or
//! [`TransformResult::Unchanged`]. It never touches the archive directly.

mod css;
mod markup;
mod responsive;
mod svg;

use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::package::{NewResource, Package, PackagePart};

pub use responsive::{LinkPolicy, ResponsiveImages};
pub use svg::VectorToRaster;

/// Outcome of running a transform over one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    Unchanged,
    Replaced(String),
}

/// A part's content could not be parsed. The part is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {reason}")]
pub struct PartParseWarning {
    pub path: String,
    pub reason: String,
}

impl PartParseWarning {
    pub fn new(part: &PackagePart, reason: impl fmt::Display) -> Self {
        Self {
            path: part.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// CSS class name generated once per archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerToken(String);

impl MarkerToken {
    const PREFIX: &'static str = "fit-";
    const SUFFIX_LEN: usize = 6;

    /// A fresh `fit-xxxxxx` class name.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..Self::SUFFIX_LEN)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        Self(format!("{}{suffix}", Self::PREFIX))
    }

    /// Use a fixed class name.
    pub fn new(class: impl Into<String>) -> Self {
        Self(class.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a transform may look at besides the part itself.
pub struct TransformContext<'a> {
    pub marker: &'a MarkerToken,
    pub package: &'a Package,
}

/// A pluggable content edit.
pub trait Transform {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Called once per archive before any part is visited.
    fn new_resource(&self, _package: &Package, _marker: &MarkerToken) -> Option<NewResource> {
        None
    }

    /// Edit one part. Parse failures are reported as warnings, never panics.
    fn apply(
        &self,
        part: &PackagePart,
        ctx: &TransformContext<'_>,
    ) -> Result<TransformResult, PartParseWarning>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_shape() {
        let marker = MarkerToken::generate();
        let s = marker.as_str();
        assert!(s.starts_with("fit-"));
        assert_eq!(s.len(), 10);
        assert!(s[4..].chars().all(|c| c.is_ascii_lowercase()));
    }
}
