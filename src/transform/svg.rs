//! Replace decorative SVG image wrappers with plain `<img>` tags.
//!
//! Some converters wrap every illustration as
//! `<figure class="illust"><svg ...><image xlink:href="x.jpg"/></svg></figure>`,
//! which many readers refuse to scale. The whole container is swapped for
//! `<img src="x.jpg" alt=""/>`.

use memchr::memmem;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use super::markup::{self, EventSink, MarkupResult};
use super::{PartParseWarning, Transform, TransformContext, TransformResult};
use crate::package::{PackagePart, PartKind};

/// The vector-to-raster normalization.
#[derive(Debug, Clone)]
pub struct VectorToRaster {
    /// Local name of the wrapping element.
    pub container: String,
    /// Class the container must carry; `None` matches any container.
    pub container_class: Option<String>,
}

impl Default for VectorToRaster {
    fn default() -> Self {
        Self {
            container: "figure".to_string(),
            container_class: Some("illust".to_string()),
        }
    }
}

impl VectorToRaster {
    pub fn new(container: impl Into<String>, container_class: Option<String>) -> Self {
        Self {
            container: container.into(),
            container_class,
        }
    }

    fn is_container(&self, e: &BytesStart<'_>) -> MarkupResult<bool> {
        if !markup::is_element(e, &self.container) {
            return Ok(false);
        }
        match &self.container_class {
            Some(class) => markup::has_class(e, class),
            None => Ok(true),
        }
    }

    /// Rewrite one document. `None` means no container qualified.
    pub(crate) fn unwrap_svg_images(&self, content: &str) -> MarkupResult<Option<String>> {
        let mut reader = markup::reader(content);
        let mut sink = EventSink::new(content.len());
        let mut pending: Option<Container<'_>> = None;

        loop {
            let event = reader.read_event()?;
            if matches!(event, Event::Eof) {
                break;
            }

            if let Some(container) = pending.as_mut() {
                if container.push(event)?
                    && let Some(done) = pending.take()
                {
                    match done.image_href {
                        Some(href) => {
                            let mut img = BytesStart::new("img");
                            img.push_attribute(("src", href.as_str()));
                            img.push_attribute(("alt", ""));
                            sink.write(Event::Empty(img))?;
                            sink.mark_changed();
                        }
                        None => {
                            for event in done.events {
                                sink.write(event)?;
                            }
                        }
                    }
                }
                continue;
            }

            match event {
                Event::Start(e) if self.is_container(&e)? => {
                    pending = Some(Container::new(Event::Start(e)));
                }
                other => sink.write(other)?,
            }
        }

        if pending.is_some() {
            return Err(markup::MarkupError::Unclosed(self.container.clone()));
        }
        sink.finish()
    }
}

/// Events of one candidate container, buffered until its end tag.
struct Container<'a> {
    events: Vec<Event<'a>>,
    depth: usize,
    svg_depth: usize,
    image_href: Option<String>,
}

impl<'a> Container<'a> {
    fn new(start: Event<'a>) -> Self {
        Self {
            events: vec![start],
            depth: 1,
            svg_depth: 0,
            image_href: None,
        }
    }

    /// Buffer one event; returns true once the container is closed.
    fn push(&mut self, event: Event<'a>) -> MarkupResult<bool> {
        match &event {
            Event::Start(e) => {
                self.depth += 1;
                if markup::is_element(e, "svg") {
                    self.svg_depth += 1;
                } else {
                    self.note_image(e)?;
                }
            }
            Event::Empty(e) => self.note_image(e)?,
            Event::End(e) => {
                self.depth -= 1;
                let name = e.name();
                if self.svg_depth > 0 && markup::local_name(name.as_ref()).eq_ignore_ascii_case(b"svg") {
                    self.svg_depth -= 1;
                }
            }
            _ => {}
        }
        self.events.push(event);
        Ok(self.depth == 0)
    }

    fn note_image(&mut self, e: &BytesStart<'_>) -> MarkupResult<()> {
        if self.svg_depth > 0 && self.image_href.is_none() && markup::is_element(e, "image") {
            self.image_href = markup::attribute(e, &["xlink:href", "href"])?;
        }
        Ok(())
    }
}

impl Transform for VectorToRaster {
    fn name(&self) -> &'static str {
        "vector-to-raster"
    }

    fn apply(
        &self,
        part: &PackagePart,
        _ctx: &TransformContext<'_>,
    ) -> Result<TransformResult, PartParseWarning> {
        if part.kind != PartKind::Document {
            return Ok(TransformResult::Unchanged);
        }
        if memmem::find(part.content().as_bytes(), b"<svg").is_none()
            && memmem::find(part.content().as_bytes(), b":svg").is_none()
        {
            return Ok(TransformResult::Unchanged);
        }

        match self.unwrap_svg_images(part.content()) {
            Ok(Some(content)) => {
                debug!(path = %part.path, "unwrapped svg images");
                Ok(TransformResult::Replaced(content))
            }
            Ok(None) => Ok(TransformResult::Unchanged),
            Err(e) => Err(PartParseWarning::new(part, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xlink="http://www.w3.org/1999/xlink">
<head><title>One</title></head>
<body>
<p>Before&nbsp;it.</p>
<figure class="illust"><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 800"><image width="600" height="800" xlink:href="../Images/fig1.jpg"/></svg></figure>
<p>After.</p>
</body>
</html>"#;

    fn unwrap(content: &str) -> Option<String> {
        VectorToRaster::default().unwrap_svg_images(content).unwrap()
    }

    #[test]
    fn test_replaces_wrapped_svg_image() {
        let out = unwrap(CHAPTER).expect("document should change");
        assert!(out.contains(r#"<img src="../Images/fig1.jpg" alt=""/>"#));
        assert!(!out.contains("<figure"));
        assert!(!out.contains("<svg"));
        assert!(out.contains("<p>Before&nbsp;it.</p>"));
        assert!(out.contains("<p>After.</p>"));
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(out.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn test_other_figures_are_kept() {
        let doc = r#"<html><body><figure class="photo"><svg><image xlink:href="a.png"/></svg></figure></body></html>"#;
        assert_eq!(unwrap(doc), None);
    }

    #[test]
    fn test_container_without_image_is_kept() {
        let doc = r#"<html><body><figure class="illust"><svg><rect width="1"/></svg><figcaption>x</figcaption></figure></body></html>"#;
        assert_eq!(unwrap(doc), None);
    }

    #[test]
    fn test_plain_href_and_multiple_figures() {
        let doc = r#"<html><body><figure class="illust"><svg><image href="a.png"/></svg></figure><figure class="illust big"><svg><image xlink:href="b.png"></image></svg></figure></body></html>"#;
        let out = unwrap(doc).unwrap();
        assert_eq!(
            out,
            r#"<html><body><img src="a.png" alt=""/><img src="b.png" alt=""/></body></html>"#
        );
    }

    #[test]
    fn test_image_outside_svg_does_not_count() {
        let doc = r#"<html><body><figure class="illust"><image xlink:href="a.png"/></figure></body></html>"#;
        assert_eq!(unwrap(doc), None);
    }

    #[test]
    fn test_custom_container() {
        let transform = VectorToRaster::new("div", None);
        let doc = r#"<body><div><svg><image xlink:href="c.png"/></svg></div></body>"#;
        let out = transform.unwrap_svg_images(doc).unwrap().unwrap();
        assert_eq!(out, r#"<body><img src="c.png" alt=""/></body>"#);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let doc = r#"<html><body><figure class="illust"><svg></figure></body></html>"#;
        assert!(VectorToRaster::default().unwrap_svg_images(doc).is_err());
    }
}
