//! Logical view of an EPUB: the manifest plus the text parts transforms edit.

use std::collections::{HashMap, HashSet};

use encoding_rs::Encoding;
use tracing::debug;

use crate::epub::parser::{parse_container_xml, strip_bom};
use crate::epub::{EpubArchive, PackageManifest};
use crate::error::{Error, Result};
use crate::util::{decode_text, encode_text, file_name, href_to_id, normalize_path, xml_encoding_hint};

const CONTAINER_PATH: &str = "META-INF/container.xml";

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const CSS_MEDIA_TYPE: &str = "text/css";

/// The kinds of parts transforms may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Document,
    Stylesheet,
}

impl PartKind {
    /// Classify by manifest media type when known, by suffix otherwise.
    pub fn classify(path: &str, media_type: Option<&str>) -> Option<Self> {
        match media_type {
            Some("application/xhtml+xml" | "text/html") => return Some(PartKind::Document),
            Some("text/css") => return Some(PartKind::Stylesheet),
            Some(_) => return None,
            None => {}
        }

        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm") {
            Some(PartKind::Document)
        } else if lower.ends_with(".css") {
            Some(PartKind::Stylesheet)
        } else {
            None
        }
    }

    pub fn default_media_type(self) -> &'static str {
        match self {
            PartKind::Document => XHTML_MEDIA_TYPE,
            PartKind::Stylesheet => CSS_MEDIA_TYPE,
        }
    }
}

/// Where a part came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOrigin {
    /// Decoded from the archive entry with the same path.
    Archive,
    /// Introduced during this run.
    Created,
}

/// A document or stylesheet exposed to transforms.
#[derive(Debug, Clone)]
pub struct PackagePart {
    pub id: String,
    /// Normalized archive path.
    pub path: String,
    pub media_type: String,
    pub kind: PartKind,
    content: String,
    encoding: &'static Encoding,
    origin: PartOrigin,
    replaced: bool,
}

impl PackagePart {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn origin(&self) -> PartOrigin {
        self.origin
    }

    /// True once a transform replaced the content of an archive part.
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    /// Content encoded the way the original entry was.
    pub fn encoded(&self) -> Vec<u8> {
        encode_text(&self.content, self.encoding)
    }

    pub(crate) fn replace(&mut self, content: String) {
        self.content = content;
        if self.origin == PartOrigin::Archive {
            self.replaced = true;
        }
    }
}

/// A part that did not exist in the source archive.
#[derive(Debug, Clone)]
pub struct NewResource {
    /// Normalized archive path to create.
    pub path: String,
    pub media_type: String,
    pub content: String,
    /// Preferred manifest id; made unique on registration.
    pub id_hint: String,
    /// Whether the part must be listed in the manifest.
    pub register: bool,
}

impl NewResource {
    /// A stylesheet that must be listed in the manifest.
    pub fn stylesheet(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            media_type: CSS_MEDIA_TYPE.to_string(),
            content: content.into(),
            id_hint: "style".to_string(),
            register: true,
        }
    }
}

/// Manifest and editable parts of one archive.
#[derive(Debug)]
pub struct Package {
    manifest: PackageManifest,
    descriptor_encoding: &'static Encoding,
    parts: Vec<PackagePart>,
    by_path: HashMap<String, usize>,
    /// Every non-directory entry path in the source archive.
    entry_paths: HashSet<String>,
    new_resources: Vec<NewResource>,
}

impl Package {
    /// Build the package model from an opened archive.
    ///
    /// Fails with [`Error::MalformedPackage`] when container.xml or the
    /// package document is missing or unparsable.
    pub fn load(archive: &mut EpubArchive) -> Result<Self> {
        if !archive.contains(CONTAINER_PATH) {
            return Err(Error::MalformedPackage(format!("missing {CONTAINER_PATH}")));
        }
        let container = archive.read(CONTAINER_PATH)?;
        let opf_path = normalize_path(&parse_container_xml(&container)?);
        if !archive.contains(&opf_path) {
            return Err(Error::MalformedPackage(format!(
                "package document {opf_path} is not in the archive"
            )));
        }

        let opf_bytes = archive.read(&opf_path)?;
        let (descriptor, descriptor_encoding) =
            decode_text(strip_bom(&opf_bytes), xml_encoding_hint(&opf_bytes));
        let manifest = PackageManifest::parse(&opf_path, descriptor.into_owned())?;

        let candidates: Vec<String> = archive
            .entries()
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path.clone())
            .collect();
        let entry_paths: HashSet<String> = candidates.iter().cloned().collect();

        let mut package = Self {
            manifest,
            descriptor_encoding,
            parts: Vec::new(),
            by_path: HashMap::new(),
            entry_paths,
            new_resources: Vec::new(),
        };

        for path in candidates {
            if path == opf_path || package.by_path.contains_key(&path) {
                continue;
            }
            let listed = package.manifest.item_by_path(&path);
            let Some(kind) = PartKind::classify(&path, listed.map(|i| i.media_type.as_str()))
            else {
                continue;
            };
            let (id, media_type) = match listed {
                Some(item) => (item.id.clone(), item.media_type.clone()),
                None => (href_to_id(&path), kind.default_media_type().to_string()),
            };

            let bytes = archive.read(&path)?;
            let (content, encoding) = decode_text(&bytes, xml_encoding_hint(&bytes));
            debug!(%path, ?kind, encoding = encoding.name(), "loaded part");

            package.push_part(PackagePart {
                id,
                path,
                media_type,
                kind,
                content: content.into_owned(),
                encoding,
                origin: PartOrigin::Archive,
                replaced: false,
            });
        }

        Ok(package)
    }

    fn push_part(&mut self, part: PackagePart) {
        self.by_path.insert(part.path.clone(), self.parts.len());
        self.parts.push(part);
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    pub(crate) fn manifest_mut(&mut self) -> &mut PackageManifest {
        &mut self.manifest
    }

    /// The package document with a manifest regenerated from the model,
    /// encoded like the original.
    pub(crate) fn descriptor_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode_text(&self.manifest.serialize()?, self.descriptor_encoding))
    }

    /// Parts in stored order, followed by parts created during this run.
    pub fn parts(&self) -> &[PackagePart] {
        &self.parts
    }

    pub(crate) fn parts_mut(&mut self) -> &mut [PackagePart] {
        &mut self.parts
    }

    /// Look up a part by exact normalized path.
    pub fn part(&self, path: &str) -> Option<&PackagePart> {
        self.by_path.get(path).map(|&i| &self.parts[i])
    }

    pub fn documents(&self) -> impl Iterator<Item = &PackagePart> {
        self.parts.iter().filter(|p| p.kind == PartKind::Document)
    }

    pub fn stylesheets(&self) -> impl Iterator<Item = &PackagePart> {
        self.parts.iter().filter(|p| p.kind == PartKind::Stylesheet)
    }

    /// True if `path` names an archive entry or a part created in this run.
    pub fn contains_path(&self, path: &str) -> bool {
        self.entry_paths.contains(path) || self.by_path.contains_key(path)
    }

    /// Every non-directory entry path of the source archive.
    pub fn entry_paths(&self) -> &HashSet<String> {
        &self.entry_paths
    }

    /// Add a part that did not exist before. Its path must be free.
    pub fn add_resource(&mut self, resource: NewResource) -> Result<()> {
        let path = normalize_path(&resource.path);
        if path.is_empty() || self.contains_path(&path) {
            return Err(Error::ManifestSync(format!(
                "new resource {path:?} collides with an existing entry"
            )));
        }

        if let Some(kind) = PartKind::classify(&path, Some(resource.media_type.as_str())) {
            self.push_part(PackagePart {
                id: href_to_id(&resource.id_hint),
                path: path.clone(),
                media_type: resource.media_type.clone(),
                kind,
                content: resource.content.clone(),
                encoding: encoding_rs::UTF_8,
                origin: PartOrigin::Created,
                replaced: false,
            });
        }

        self.new_resources.push(NewResource { path, ..resource });
        Ok(())
    }

    /// Resources added during this run, in insertion order.
    pub fn new_resources(&self) -> &[NewResource] {
        &self.new_resources
    }

    /// Current bytes of a new resource: the part content when transforms
    /// edited it, the original content otherwise.
    pub fn new_resource_bytes(&self, resource: &NewResource) -> Vec<u8> {
        match self.part(&resource.path) {
            Some(part) => part.encoded(),
            None => resource.content.as_bytes().to_vec(),
        }
    }

    /// Paths of archive parts whose content was replaced.
    pub fn replaced_paths(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter(|p| p.is_replaced())
            .map(|p| p.path.clone())
            .collect()
    }
}
