//! EPUB parsing utilities (container.xml, OPF manifest and spine)

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::resolve_href;

/// A manifest `<item>` as found in the package document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// href as written, relative to the package document.
    pub href: String,
    /// Normalized archive path the href resolves to.
    pub path: String,
    pub media_type: String,
    /// Remaining attributes (`properties`, `fallback`, ...), unescaped.
    pub extra: Vec<(String, String)>,
}

/// Parsed OPF package data.
pub struct OpfData {
    pub items: Vec<ManifestItem>,
    pub spine_ids: Vec<String>,
}

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = std::str::from_utf8(strip_bom(bytes))
        .map_err(|e| Error::MalformedPackage(format!("container.xml is not UTF-8: {e}")))?;

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                if let Some(path) = attribute(&e, b"full-path")?
                    && !path.is_empty()
                {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::MalformedPackage(format!(
                    "container.xml is not well-formed: {e}"
                )));
            }
            _ => {}
        }
    }

    Err(Error::MalformedPackage(
        "No rootfile found in container.xml".into(),
    ))
}

/// Parse the manifest and spine of an OPF package document.
///
/// `opf_path` is the archive path of the document; item hrefs are resolved
/// against it.
pub fn parse_opf(content: &str, opf_path: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut items: Vec<ManifestItem> = Vec::new();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut saw_package = false;
    let mut in_manifest = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::MalformedPackage(format!("package document: {e}")))?;

        match event {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"package" => {
                saw_package = true;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"manifest" => {
                in_manifest = true;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"manifest" => {
                in_manifest = false;
            }
            Event::Start(e) | Event::Empty(e)
                if in_manifest && local_name(e.name().as_ref()) == b"item" =>
            {
                if let Some(item) = parse_item(&e, opf_path)? {
                    items.push(item);
                }
            }
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"itemref" => {
                if let Some(idref) = attribute(&e, b"idref")? {
                    spine_ids.push(idref);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_package {
        return Err(Error::MalformedPackage(
            "package document has no <package> element".into(),
        ));
    }

    Ok(OpfData { items, spine_ids })
}

fn parse_item(e: &BytesStart<'_>, opf_path: &str) -> Result<Option<ManifestItem>> {
    let mut id = String::new();
    let mut href = String::new();
    let mut media_type = String::new();
    let mut extra = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::MalformedPackage(format!("manifest item: {err}")))?;
        let value = attribute_value(&attr)?;
        match attr.key.as_ref() {
            b"id" => id = value,
            b"href" => href = value,
            b"media-type" => media_type = value,
            key => extra.push((String::from_utf8_lossy(key).into_owned(), value)),
        }
    }

    if id.is_empty() || href.is_empty() {
        return Ok(None);
    }

    // Remote resources have no archive path; keep them keyed by href
    let path = resolve_href(opf_path, &href).unwrap_or_else(|| href.clone());

    Ok(Some(ManifestItem {
        id,
        href,
        path,
        media_type,
        extra,
    }))
}

/// Read one attribute of an element, unescaped.
pub(crate) fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            return attribute_value(&attr).map(Some);
        }
    }
    Ok(None)
}

fn attribute_value(attr: &Attribute<'_>) -> Result<String> {
    let raw = std::str::from_utf8(&attr.value)
        .map_err(|e| Error::MalformedPackage(format!("attribute is not UTF-8: {e}")))?;
    let value = quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw));
    Ok(value.into_owned())
}

/// Strip UTF-8 BOM (byte order mark) if present
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract local name from namespaced XML name (e.g., "opf:item" -> "item").
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}
