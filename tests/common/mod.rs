//! In-memory EPUB fixtures shared by the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Builds a zip container entry by entry, `mimetype` first and stored.
pub struct EpubBuilder {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl EpubBuilder {
    /// A container with `mimetype` and `META-INF/container.xml` already in
    /// place, pointing at `OEBPS/content.opf`.
    pub fn new() -> Self {
        Self::bare()
            .stored("mimetype", "application/epub+zip")
            .entry("META-INF/container.xml", CONTAINER_XML)
    }

    /// A container with no entries at all.
    pub fn bare() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entry(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.with_method(name, content, CompressionMethod::Deflated)
    }

    pub fn stored(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.with_method(name, content, CompressionMethod::Stored)
    }

    fn with_method(mut self, name: &str, content: impl AsRef<[u8]>, method: CompressionMethod) -> Self {
        self.entries
            .push((name.to_string(), content.as_ref().to_vec(), method));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content, method) in &self.entries {
            let options = SimpleFileOptions::default().compression_method(*method);
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

/// A package document listing `items` as (id, href, media-type) and a spine
/// of `spine` idrefs.
pub fn opf(items: &[(&str, &str, &str)], spine: &[&str]) -> String {
    let mut manifest = String::new();
    for (id, href, media_type) in items {
        manifest.push_str(&format!(
            "    <item id=\"{id}\" href=\"{href}\" media-type=\"{media_type}\"/>\n"
        ));
    }
    let mut itemrefs = String::new();
    for idref in spine {
        itemrefs.push_str(&format!("    <itemref idref=\"{idref}\"/>\n"));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:test</dc:identifier>
    <dc:title>Figures &amp; Plates</dc:title>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{itemrefs}  </spine>
</package>"#
    )
}

/// An XHTML document with `body` inside `<body>`.
pub fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xlink="http://www.w3.org/1999/xlink">
<head>
<title>{title}</title>
</head>
<body>
{body}
</body>
</html>"#
    )
}

pub const SVG_FIGURE: &str = r#"<figure class="illust"><svg xmlns="http://www.w3.org/2000/svg" version="1.1" viewBox="0 0 600 800"><image width="600" height="800" xlink:href="images/fig1.svg"/></svg></figure>"#;

pub const FIG1_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="600" height="800"><rect width="600" height="800"/></svg>"#;

/// A book with two chapters, one SVG figure, and no stylesheet.
pub fn figure_book() -> EpubBuilder {
    EpubBuilder::new()
        .entry(
            "OEBPS/content.opf",
            opf(
                &[
                    ("ch1", "ch1.xhtml", "application/xhtml+xml"),
                    ("ch2", "ch2.xhtml", "application/xhtml+xml"),
                    ("fig1", "images/fig1.svg", "image/svg+xml"),
                    ("cover", "images/cover.png", "image/png"),
                ],
                &["ch1", "ch2"],
            ),
        )
        .entry(
            "OEBPS/ch1.xhtml",
            chapter("One", &format!("<p>Before&nbsp;the figure.</p>\n{SVG_FIGURE}\n<p>After.</p>")),
        )
        .entry(
            "OEBPS/ch2.xhtml",
            chapter("Two", r#"<p><img src="images/cover.png" width="300" height="400" alt="cover"/></p>"#),
        )
        .entry("OEBPS/images/fig1.svg", FIG1_SVG)
        .stored("OEBPS/images/cover.png", [0x89, b'P', b'N', b'G', 0, 1, 2, 3])
}

/// Every entry as (name, compression, decompressed bytes), in stored order.
pub fn read_entries(bytes: &[u8]) -> Vec<(String, CompressionMethod, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), file.compression(), content)
        })
        .collect()
}

/// Decompressed content of `name` as a string.
pub fn read_text(bytes: &[u8], name: &str) -> String {
    read_entries(bytes)
        .into_iter()
        .find(|(n, _, _)| n == name)
        .map(|(_, _, content)| String::from_utf8(content).unwrap())
        .unwrap_or_else(|| panic!("no entry {name}"))
}
