//! The package manifest: the authoritative list of parts and media types.

use std::collections::HashSet;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::warn;

use crate::epub::parser::{self, ManifestItem, local_name};
use crate::error::{Error, Result};
use crate::util::{href_to_id, parent_dir, relative_href};

/// Manifest and spine of one package document, plus the descriptor text they
/// came from.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    descriptor_path: String,
    descriptor: String,
    items: Vec<ManifestItem>,
    spine: Vec<String>,
}

impl PackageManifest {
    /// Parse the package document stored at `descriptor_path`.
    pub fn parse(descriptor_path: &str, descriptor: String) -> Result<Self> {
        let opf = parser::parse_opf(&descriptor, descriptor_path)?;
        Ok(Self {
            descriptor_path: descriptor_path.to_string(),
            descriptor,
            items: opf.items,
            spine: opf.spine_ids,
        })
    }

    /// Archive path of the package document.
    pub fn descriptor_path(&self) -> &str {
        &self.descriptor_path
    }

    /// Directory hrefs are relative to ("" or "OEBPS/").
    pub fn base_dir(&self) -> &str {
        parent_dir(&self.descriptor_path)
    }

    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    /// Spine idrefs in reading order.
    pub fn spine(&self) -> &[String] {
        &self.spine
    }

    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.path == path)
    }

    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// List a part that is not yet in the manifest.
    ///
    /// The id is derived from `id_hint` and made unique; the href is written
    /// relative to the package document.
    pub fn register(&mut self, path: &str, media_type: &str, id_hint: &str) -> Result<&ManifestItem> {
        if path == self.descriptor_path {
            return Err(Error::ManifestSync(format!(
                "{path} is the package document itself"
            )));
        }
        if self.item_by_path(path).is_some() {
            return Err(Error::ManifestSync(format!("{path} is already listed")));
        }

        let id = self.unique_id(id_hint);
        self.items.push(ManifestItem {
            id,
            href: relative_href(&self.descriptor_path, path),
            path: path.to_string(),
            media_type: media_type.to_string(),
            extra: Vec::new(),
        });
        Ok(&self.items[self.items.len() - 1])
    }

    fn unique_id(&self, hint: &str) -> String {
        let base = if hint.is_empty() {
            "item".to_string()
        } else {
            href_to_id(hint)
        };
        if self.item_by_id(&base).is_none() {
            return base;
        }
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| self.item_by_id(candidate).is_none())
            .unwrap_or(base)
    }

    /// Check id uniqueness and drop repeated listings of the same path.
    pub fn deduplicate(&mut self) -> Result<()> {
        let mut seen_paths = HashSet::new();
        self.items.retain(|item| {
            let first = seen_paths.insert(item.path.clone());
            if !first {
                warn!(id = %item.id, path = %item.path, "dropping repeated manifest listing");
            }
            first
        });

        let mut seen_ids = HashSet::new();
        for item in &self.items {
            if !seen_ids.insert(item.id.as_str()) {
                return Err(Error::ManifestSync(format!(
                    "manifest id {} is used by more than one part",
                    item.id
                )));
            }
        }
        Ok(())
    }

    /// Remove items whose path is not in `present`. Remote resources are
    /// kept. Returns the removed items.
    pub fn retain_present(&mut self, present: &HashSet<&str>) -> Vec<ManifestItem> {
        let mut removed = Vec::new();
        self.items.retain(|item| {
            let remote = item.href.contains("://");
            let keep = remote || present.contains(item.path.as_str());
            if !keep {
                removed.push(item.clone());
            }
            keep
        });
        let listed: HashSet<&str> = self.items.iter().map(|i| i.id.as_str()).collect();
        self.spine.retain(|idref| listed.contains(idref.as_str()));
        removed
    }

    /// Re-serialize the package document with a manifest generated from this
    /// model.
    ///
    /// Everything outside `<manifest>` is streamed through unchanged, except
    /// spine references to ids that are no longer listed.
    pub fn serialize(&self) -> Result<String> {
        let mut reader = Reader::from_str(&self.descriptor);
        let mut writer = Writer::new(Vec::with_capacity(self.descriptor.len() + 256));
        let listed: HashSet<&str> = self.items.iter().map(|i| i.id.as_str()).collect();

        let mut in_manifest = false;
        let mut wrote_manifest = false;

        loop {
            let event = reader.read_event()?;
            match event {
                Event::Eof => break,
                Event::Start(e) if !in_manifest && local_name(e.name().as_ref()) == b"manifest" => {
                    let prefix = element_prefix(&e);
                    writer.write_event(Event::Start(e))?;
                    self.write_items(&mut writer, &prefix)?;
                    in_manifest = true;
                    wrote_manifest = true;
                }
                Event::Empty(e) if !in_manifest && local_name(e.name().as_ref()) == b"manifest" => {
                    let prefix = element_prefix(&e);
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e))?;
                    self.write_items(&mut writer, &prefix)?;
                    writer.write_event(Event::Text(BytesText::from_escaped("\n  ")))?;
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                    wrote_manifest = true;
                }
                Event::End(e) if in_manifest && local_name(e.name().as_ref()) == b"manifest" => {
                    writer.write_event(Event::Text(BytesText::from_escaped("\n  ")))?;
                    writer.write_event(Event::End(e))?;
                    in_manifest = false;
                }
                // Original items are replaced by the model
                _ if in_manifest => {}
                Event::Empty(e) if local_name(e.name().as_ref()) == b"itemref" => {
                    let idref = parser::attribute(&e, b"idref")?;
                    if idref.as_deref().is_none_or(|id| listed.contains(id)) {
                        writer.write_event(Event::Empty(e))?;
                    }
                }
                other => writer.write_event(other)?,
            }
        }

        if !wrote_manifest {
            return Err(Error::ManifestSync(
                "package document has no <manifest> element".into(),
            ));
        }

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::ManifestSync(format!("serialized package is not UTF-8: {e}")))
    }

    fn write_items(&self, writer: &mut Writer<Vec<u8>>, prefix: &str) -> Result<()> {
        let tag = format!("{prefix}item");
        for item in &self.items {
            let mut element = BytesStart::new(tag.as_str());
            element.push_attribute(("id", item.id.as_str()));
            element.push_attribute(("href", item.href.as_str()));
            element.push_attribute(("media-type", item.media_type.as_str()));
            for (key, value) in &item.extra {
                element.push_attribute((key.as_str(), value.as_str()));
            }
            writer.write_event(Event::Text(BytesText::from_escaped("\n    ")))?;
            writer.write_event(Event::Empty(element))?;
        }
        Ok(())
    }
}

/// Namespace prefix of an element including the colon ("opf:"), or "".
fn element_prefix(e: &BytesStart<'_>) -> String {
    let name = e.name();
    let raw = name.as_ref();
    match raw.iter().rposition(|&b| b == b':') {
        Some(i) => String::from_utf8_lossy(&raw[..=i]).into_owned(),
        None => String::new(),
    }
}
