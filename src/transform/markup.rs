//! Event-level (X)HTML editing with quick-xml.
//!
//! Documents are streamed event by event; untouched events are written back
//! as read, so only the edited elements change on output.

use std::borrow::Cow;
use std::string::FromUtf8Error;

use quick_xml::events::attributes::{AttrError, Attribute};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

pub(crate) use crate::epub::parser::local_name;

/// Why a document could not be edited.
#[derive(Error, Debug)]
pub(crate) enum MarkupError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed attribute: {0}")]
    Attr(#[from] AttrError),

    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),

    #[error("unclosed <{0}> at end of document")]
    Unclosed(String),
}

pub(crate) type MarkupResult<T> = Result<T, MarkupError>;

/// Reader over a whole document. Mismatched end tags are errors.
pub(crate) fn reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().check_end_names = true;
    reader
}

/// Output side of a rewrite pass; remembers whether anything was edited.
pub(crate) struct EventSink {
    writer: Writer<Vec<u8>>,
    changed: bool,
}

impl EventSink {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            writer: Writer::new(Vec::with_capacity(capacity)),
            changed: false,
        }
    }

    pub(crate) fn write(&mut self, event: Event<'_>) -> MarkupResult<()> {
        self.writer.write_event(event)?;
        Ok(())
    }

    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// The rewritten document, or `None` when nothing was edited.
    pub(crate) fn finish(self) -> MarkupResult<Option<String>> {
        if !self.changed {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(self.writer.into_inner())?))
    }
}

/// Case-insensitive local-name match (HTML tag names are not case-sensitive).
pub(crate) fn is_element(e: &BytesStart<'_>, name: &str) -> bool {
    local_name(e.name().as_ref()).eq_ignore_ascii_case(name.as_bytes())
}

/// Full element name as written, prefix included.
pub(crate) fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Value of the first attribute whose key matches one of `keys`, unescaped.
pub(crate) fn attribute(e: &BytesStart<'_>, keys: &[&str]) -> MarkupResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if keys.iter().any(|k| k.as_bytes() == attr.key.as_ref()) {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&raw)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| raw.clone().into_owned());
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Whether the element's `class` attribute lists `class`.
pub(crate) fn has_class(e: &BytesStart<'_>, class: &str) -> MarkupResult<bool> {
    Ok(attribute(e, &["class"])?
        .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class)))
}

/// Copy an attribute as read. Values taken from single-quoted attributes may
/// hold a bare `"`, which would end the double-quoted value on output.
pub(crate) fn copy_attribute<'a>(attr: &Attribute<'a>) -> Attribute<'a> {
    if attr.value.contains(&b'"') {
        let escaped: Vec<u8> = attr
            .value
            .iter()
            .flat_map(|&b| {
                if b == b'"' {
                    b"&quot;".to_vec()
                } else {
                    vec![b]
                }
            })
            .collect();
        Attribute {
            key: attr.key,
            value: Cow::Owned(escaped),
        }
    } else {
        attr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_start(xml: &str) -> BytesStart<'static> {
        let mut reader = reader(xml);
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => return e.into_owned(),
                Event::Eof => panic!("no element"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_attribute_lookup() {
        let e = first_start(r#"<image xlink:href="a&amp;b.png" width="10"/>"#);
        assert_eq!(
            attribute(&e, &["xlink:href", "href"]).unwrap().as_deref(),
            Some("a&b.png")
        );
        assert_eq!(attribute(&e, &["height"]).unwrap(), None);
    }

    #[test]
    fn test_has_class() {
        let e = first_start(r#"<figure class="wide illust">"#);
        assert!(has_class(&e, "illust").unwrap());
        assert!(!has_class(&e, "ill").unwrap());
    }

    #[test]
    fn test_is_element_ignores_case_and_prefix() {
        assert!(is_element(&first_start("<IMG/>"), "img"));
        assert!(is_element(&first_start("<svg:image/>"), "image"));
    }

    #[test]
    fn test_errors_convert_and_describe() {
        let e = first_start(r#"<img src="a" src="b"/>"#);
        let err = attribute(&e, &["alt"]).unwrap_err();
        assert!(matches!(err, MarkupError::Attr(_)));
        assert!(err.to_string().starts_with("malformed attribute: "));

        let err = MarkupError::Unclosed("figure".into());
        assert_eq!(err.to_string(), "unclosed <figure> at end of document");
    }

    #[test]
    fn test_unchanged_sink_yields_none() {
        let mut sink = EventSink::new(16);
        sink.write(Event::Comment(quick_xml::events::BytesText::from_escaped("x")))
            .unwrap();
        assert!(sink.finish().unwrap().is_none());
    }
}
