//! The archive rewrite engine.
//!
//! A rewrite runs in two steps. [`Rewriter::prepare`] loads the package,
//! adds new resources and runs every transform over the parts.
//! [`PreparedRewrite::write_to`] then emits the new container: original
//! entries in stored order, replaced parts substituted by exact path, new
//! resources appended, and the package document regenerated when the
//! manifest has to change.

use std::collections::{HashMap, HashSet};
use std::io::{Seek, Write};

use serde::Serialize;
use tracing::{debug, info, warn};
use zip::CompressionMethod;

use crate::epub::{ArchiveWriter, EpubArchive};
use crate::error::{Error, Result};
use crate::package::{NewResource, Package, PackagePart, PartOrigin};
use crate::transform::{
    LinkPolicy, MarkerToken, PartParseWarning, ResponsiveImages, Transform, TransformContext,
    TransformResult, VectorToRaster,
};

/// How the package document is treated when the archive is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStrategy {
    /// The package document is copied like any other untouched entry.
    DirectRewrite,
    /// The manifest is rebuilt from the model and the package document
    /// re-serialized.
    FullManifestRegeneration,
}

impl RewriteStrategy {
    /// Regenerate exactly when some new resource must be listed.
    pub fn for_resources(resources: &[NewResource]) -> Self {
        if resources.iter().any(|r| r.register) {
            RewriteStrategy::FullManifestRegeneration
        } else {
            RewriteStrategy::DirectRewrite
        }
    }
}

/// Which transforms to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Vector-to-raster normalization only.
    Svg,
    /// Responsive image styling only.
    Resize,
    /// Both, vector-to-raster first.
    #[default]
    All,
}

/// Everything that configures a [`Rewriter`].
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    pub mode: Mode,
    pub link_policy: LinkPolicy,
    /// Tag of the element wrapping decorative SVG images.
    pub container: String,
    /// Class the wrapper must carry; `None` accepts any.
    pub container_class: Option<String>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        let svg = VectorToRaster::default();
        Self {
            mode: Mode::default(),
            link_policy: LinkPolicy::default(),
            container: svg.container,
            container_class: svg.container_class,
        }
    }
}

/// What one rewrite did.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteSummary {
    pub marker: String,
    pub strategy: RewriteStrategy,
    /// Paths of original entries whose content was substituted.
    pub replaced: Vec<String>,
    /// Paths of entries added to the archive.
    pub created: Vec<String>,
    /// Parts left unchanged because they could not be parsed.
    pub warnings: Vec<String>,
}

impl RewriteSummary {
    pub fn is_noop(&self) -> bool {
        self.replaced.is_empty() && self.created.is_empty()
    }
}

/// An ordered list of transforms applied to one archive at a time.
pub struct Rewriter {
    transforms: Vec<Box<dyn Transform>>,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::from_options(&RewriteOptions::default())
    }
}

impl Rewriter {
    /// A rewriter with no transforms.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Append a transform; transforms run in insertion order.
    pub fn with(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn from_options(options: &RewriteOptions) -> Self {
        let mut rewriter = Self::new();
        if matches!(options.mode, Mode::Svg | Mode::All) {
            rewriter = rewriter.with(VectorToRaster::new(
                options.container.clone(),
                options.container_class.clone(),
            ));
        }
        if matches!(options.mode, Mode::Resize | Mode::All) {
            rewriter = rewriter.with(ResponsiveImages::new(options.link_policy));
        }
        rewriter
    }

    /// Names of the configured transforms, in order.
    pub fn transform_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Load the package and run every transform over it.
    pub fn prepare(&self, archive: &mut EpubArchive, marker: MarkerToken) -> Result<PreparedRewrite> {
        let mut package = Package::load(archive)?;

        for transform in &self.transforms {
            if let Some(resource) = transform.new_resource(&package, &marker) {
                debug!(transform = transform.name(), path = %resource.path, "new resource");
                package.add_resource(resource)?;
            }
        }

        let mut warnings = Vec::new();
        for transform in &self.transforms {
            let edits = {
                let ctx = TransformContext {
                    marker: &marker,
                    package: &package,
                };
                collect_edits(transform.as_ref(), package.parts(), &ctx, &mut warnings)
            };
            for (index, content) in edits {
                package.parts_mut()[index].replace(content);
            }
        }

        let strategy = RewriteStrategy::for_resources(package.new_resources());
        Ok(PreparedRewrite {
            package,
            marker,
            strategy,
            warnings,
        })
    }

    /// Rewrite `archive` into `output` with a freshly generated marker.
    pub fn rewrite<W: Write + Seek>(
        &self,
        archive: &mut EpubArchive,
        output: W,
    ) -> Result<RewriteSummary> {
        let prepared = self.prepare(archive, MarkerToken::generate())?;
        prepared.write_to(archive, output)
    }
}

fn collect_edits(
    transform: &dyn Transform,
    parts: &[PackagePart],
    ctx: &TransformContext<'_>,
    warnings: &mut Vec<PartParseWarning>,
) -> Vec<(usize, String)> {
    let mut edits = Vec::new();
    for (index, part) in parts.iter().enumerate() {
        match transform.apply(part, ctx) {
            Ok(TransformResult::Replaced(content)) => edits.push((index, content)),
            Ok(TransformResult::Unchanged) => {}
            Err(warning) => {
                warn!(transform = transform.name(), %warning, "part left unchanged");
                warnings.push(warning);
            }
        }
    }
    edits
}

/// A transformed package waiting to be written.
pub struct PreparedRewrite {
    package: Package,
    marker: MarkerToken,
    strategy: RewriteStrategy,
    warnings: Vec<PartParseWarning>,
}

impl PreparedRewrite {
    pub fn strategy(&self) -> RewriteStrategy {
        self.strategy
    }

    pub fn warnings(&self) -> &[PartParseWarning] {
        &self.warnings
    }

    /// True when writing would reproduce the source archive.
    pub fn is_noop(&self) -> bool {
        self.package.new_resources().is_empty() && self.package.replaced_paths().is_empty()
    }

    /// Emit the rewritten container into `output`.
    pub fn write_to<W: Write + Seek>(
        mut self,
        archive: &mut EpubArchive,
        output: W,
    ) -> Result<RewriteSummary> {
        let descriptor = match self.strategy {
            RewriteStrategy::FullManifestRegeneration => Some(self.sync_manifest()?),
            RewriteStrategy::DirectRewrite => None,
        };
        let descriptor_path = self.package.manifest().descriptor_path().to_string();

        let replaced: HashMap<&str, &PackagePart> = self
            .package
            .parts()
            .iter()
            .filter(|p| p.is_replaced())
            .map(|p| (p.path.as_str(), p))
            .collect();

        let mut writer = ArchiveWriter::new(output);
        let mut emitted = HashSet::new();
        let mut substituted = Vec::new();

        for entry in archive.entries().to_vec() {
            if !emitted.insert(entry.path.clone()) {
                warn!(entry = %entry.name, "skipping repeated entry path");
                continue;
            }

            let new_bytes = if entry.is_dir {
                None
            } else if entry.path == descriptor_path {
                descriptor.clone()
            } else {
                replaced.get(entry.path.as_str()).map(|part| part.encoded())
            };

            match new_bytes {
                Some(bytes) => {
                    debug!(path = %entry.path, "substituting entry");
                    writer.write_entry(&entry.name, &bytes, entry.compression, entry.last_modified)?;
                    substituted.push(entry.path.clone());
                }
                None => writer.copy_entry(archive, &entry)?,
            }
        }

        let mut created = Vec::new();
        for resource in self.package.new_resources() {
            let bytes = self.package.new_resource_bytes(resource);
            debug!(path = %resource.path, "adding entry");
            writer.write_entry(&resource.path, &bytes, CompressionMethod::Deflated, None)?;
            created.push(resource.path.clone());
        }

        let mut output = writer.finish()?;
        output.flush().map_err(Error::write_io)?;

        info!(
            strategy = ?self.strategy,
            replaced = substituted.len(),
            created = created.len(),
            warnings = self.warnings.len(),
            "archive rewritten"
        );

        Ok(RewriteSummary {
            marker: self.marker.to_string(),
            strategy: self.strategy,
            replaced: substituted,
            created,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        })
    }

    /// Bring the manifest in line with what will be written and serialize
    /// the package document.
    fn sync_manifest(&mut self) -> Result<Vec<u8>> {
        let to_register: Vec<(String, String, String)> = self
            .package
            .new_resources()
            .iter()
            .filter(|r| r.register)
            .map(|r| (r.path.clone(), r.media_type.clone(), r.id_hint.clone()))
            .chain(
                self.package
                    .parts()
                    .iter()
                    .filter(|p| {
                        p.origin() == PartOrigin::Archive
                            && self.package.manifest().item_by_path(&p.path).is_none()
                    })
                    .map(|p| (p.path.clone(), p.media_type.clone(), p.id.clone())),
            )
            .collect();

        let mut present: HashSet<String> = self.package.entry_paths().clone();
        present.extend(self.package.new_resources().iter().map(|r| r.path.clone()));

        let manifest = self.package.manifest_mut();
        for (path, media_type, id_hint) in to_register {
            if manifest.item_by_path(&path).is_some() {
                continue;
            }
            let item = manifest.register(&path, &media_type, &id_hint)?;
            debug!(id = %item.id, href = %item.href, "registered manifest item");
        }
        manifest.deduplicate()?;

        let present: HashSet<&str> = present.iter().map(String::as_str).collect();
        for item in manifest.retain_present(&present) {
            warn!(id = %item.id, path = %item.path, "dropping manifest item with no entry");
        }

        self.package.descriptor_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_follows_registration() {
        assert_eq!(RewriteStrategy::for_resources(&[]), RewriteStrategy::DirectRewrite);

        let mut resource = NewResource::stylesheet("OEBPS/Styles/style.css", "");
        assert_eq!(
            RewriteStrategy::for_resources(std::slice::from_ref(&resource)),
            RewriteStrategy::FullManifestRegeneration
        );

        resource.register = false;
        assert_eq!(
            RewriteStrategy::for_resources(&[resource]),
            RewriteStrategy::DirectRewrite
        );
    }

    #[test]
    fn test_options_select_transforms() {
        let all = Rewriter::default();
        assert_eq!(all.transform_names(), ["vector-to-raster", "responsive-images"]);

        let options = RewriteOptions {
            mode: Mode::Resize,
            ..RewriteOptions::default()
        };
        assert_eq!(
            Rewriter::from_options(&options).transform_names(),
            ["responsive-images"]
        );
    }
}
