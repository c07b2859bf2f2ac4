//! Text decoding and archive path helpers.

use std::borrow::Cow;

use encoding_rs::Encoding;
use memchr::memmem;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Characters escaped when a path segment is written into an href.
const HREF_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
///
/// Returns the decoded text together with the encoding that produced it, so
/// an edited part can be written back the way it was stored.
pub fn decode_text<'a>(
    bytes: &'a [u8],
    hint_encoding: Option<&str>,
) -> (Cow<'a, str>, &'static Encoding) {
    // Try UTF-8 first (handles BOM automatically)
    let (result, encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return (result, encoding);
    }

    // If UTF-8 failed, try the hint encoding
    if let Some(name) = hint_encoding
        && let Some(encoding) = Encoding::for_label(name.as_bytes())
    {
        let (result, encoding, _) = encoding.decode(bytes);
        return (result, encoding);
    }

    // Fallback: Windows-1252 (common in old ebooks, superset of ISO-8859-1)
    let (result, encoding, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    (result, encoding)
}

/// Encode text back into `encoding`.
///
/// encoding_rs only decodes UTF-16 (its encoder emits UTF-8 for those
/// labels), so UTF-16 output is produced here, led by a byte order mark.
pub fn encode_text(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let to_bytes: fn(u16) -> [u8; 2] = if encoding == encoding_rs::UTF_16LE {
        u16::to_le_bytes
    } else if encoding == encoding_rs::UTF_16BE {
        u16::to_be_bytes
    } else {
        let (bytes, _, _) = encoding.encode(text);
        return bytes.into_owned();
    };

    let mut bytes = Vec::with_capacity(2 + text.len() * 2);
    bytes.extend_from_slice(&to_bytes(0xFEFF));
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&to_bytes(unit));
    }
    bytes
}

/// Read the `encoding="..."` pseudo-attribute of a leading XML declaration.
pub fn xml_encoding_hint(bytes: &[u8]) -> Option<&str> {
    let head = &bytes[..bytes.len().min(256)];
    if memmem::find(head, b"<?xml").is_none() {
        return None;
    }
    let decl_end = memmem::find(head, b"?>")?;
    let decl = &head[..decl_end];
    let at = memmem::find(decl, b"encoding")?;
    let rest = &decl[at + b"encoding".len()..];
    let quote_at = rest.iter().position(|&b| b == b'"' || b == b'\'')?;
    let quote = rest[quote_at];
    let value = &rest[quote_at + 1..];
    let end = value.iter().position(|&b| b == quote)?;
    std::str::from_utf8(&value[..end]).ok()
}

// ============================================================================
// Archive Paths
// ============================================================================

/// Normalize an archive path: forward slashes, no empty or `.` segments,
/// `..` resolved. Case is preserved; comparison stays case-sensitive.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of an archive path, with a trailing slash unless it is the
/// archive root (e.g. "OEBPS/content.opf" -> "OEBPS/").
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// Last segment of an archive path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve an href found in `from_file` to a normalized archive path.
///
/// Fragments and queries are dropped and percent-escapes decoded. Returns
/// `None` for external references (schemes, absolute URLs, fragment-only).
pub fn resolve_href(from_file: &str, href: &str) -> Option<String> {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    if href.is_empty() || href.starts_with('/') || href.contains("://") || href.starts_with("data:")
    {
        return None;
    }
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    Some(normalize_path(&format!("{}{}", parent_dir(from_file), decoded)))
}

/// Build the href that points from `from_file` to `to_path`, both archive
/// paths. Segments are percent-encoded where needed.
pub fn relative_href(from_file: &str, to_path: &str) -> String {
    let from_dir: Vec<&str> = parent_dir(from_file)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let target: Vec<&str> = to_path.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count()
        // The file name itself never counts as a shared directory
        .min(target.len().saturating_sub(1));

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_dir.len() {
        parts.push("..".to_string());
    }
    for segment in &target[common..] {
        parts.push(utf8_percent_encode(segment, HREF_SEGMENT).to_string());
    }
    parts.join("/")
}

/// Derive an XML id from an href.
pub fn href_to_id(href: &str) -> String {
    let id = href.replace(['/', '.', ' ', '-', '\\'], "_");
    match id.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => id,
        _ => format!("_{id}"),
    }
}
