//! Responsive image styling.
//!
//! Fixed `width`/`height` attributes are stripped from every `<img>`, a
//! per-archive marker class is added, and one stylesheet carries the rule that
//! bounds marked images by their container.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::debug;

use super::css::{append_rule, has_class_rule, responsive_rule};
use super::markup::{self, EventSink, MarkupResult};
use super::{MarkerToken, PartParseWarning, Transform, TransformContext, TransformResult};
use crate::package::{NewResource, Package, PackagePart, PartKind, PartOrigin};
use crate::util::relative_href;

/// Which documents link a stylesheet created during the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Every document part.
    #[default]
    AllDocuments,
    /// Only documents whose content is edited anyway.
    ModifiedDocuments,
}

/// The responsive-image transform.
#[derive(Debug, Clone, Default)]
pub struct ResponsiveImages {
    pub link_policy: LinkPolicy,
}

impl ResponsiveImages {
    pub fn new(link_policy: LinkPolicy) -> Self {
        Self { link_policy }
    }
}

/// Stylesheet that receives the marker rule: the first `style.css`, else the
/// first stylesheet.
pub(crate) fn target_stylesheet(package: &Package) -> Option<&PackagePart> {
    package
        .stylesheets()
        .find(|p| p.file_name().eq_ignore_ascii_case("style.css"))
        .or_else(|| package.stylesheets().next())
}

/// Strip sizes from every `<img>` and add `marker` to its classes.
pub(crate) fn restyle_images(content: &str, marker: &str) -> MarkupResult<Option<String>> {
    let mut reader = markup::reader(content);
    let mut sink = EventSink::new(content.len() + 64);

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Empty(e) if markup::is_element(&e, "img") => match restyle(&e, marker)? {
                Some(img) => {
                    sink.write(Event::Empty(img))?;
                    sink.mark_changed();
                }
                None => sink.write(Event::Empty(e))?,
            },
            Event::Start(e) if markup::is_element(&e, "img") => match restyle(&e, marker)? {
                Some(img) => {
                    sink.write(Event::Start(img))?;
                    sink.mark_changed();
                }
                None => sink.write(Event::Start(e))?,
            },
            other => sink.write(other)?,
        }
    }

    sink.finish()
}

/// Rebuilt `<img>` start tag, or `None` when it already conforms.
fn restyle(e: &BytesStart<'_>, marker: &str) -> MarkupResult<Option<BytesStart<'static>>> {
    let mut img = BytesStart::new(markup::element_name(e));
    let mut changed = false;
    let mut has_class = false;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key.eq_ignore_ascii_case(b"width") || key.eq_ignore_ascii_case(b"height") {
            changed = true;
            continue;
        }
        if key == b"class" {
            has_class = true;
            let raw = String::from_utf8_lossy(&attr.value);
            if raw.split_ascii_whitespace().any(|c| c == marker) {
                img.push_attribute(markup::copy_attribute(&attr));
            } else {
                let classes = format!("{} {marker}", raw.trim()).trim_start().to_string();
                let merged = Attribute {
                    key: attr.key,
                    value: Cow::Owned(classes.into_bytes()),
                };
                img.push_attribute(markup::copy_attribute(&merged));
                changed = true;
            }
            continue;
        }
        img.push_attribute(markup::copy_attribute(&attr));
    }

    if !has_class {
        img.push_attribute(("class", marker));
        changed = true;
    }

    Ok(changed.then_some(img))
}

/// Link `href` from `<head>`, unless an identical link is already there.
pub(crate) fn insert_stylesheet_link(content: &str, href: &str) -> MarkupResult<Option<String>> {
    let mut reader = markup::reader(content);
    let mut sink = EventSink::new(content.len() + 96);
    let mut in_head = false;
    let mut linked = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if markup::is_element(&e, "head") => {
                in_head = true;
                sink.write(Event::Start(e))?;
            }
            Event::Empty(e) if in_head && markup::is_element(&e, "link") => {
                linked |= markup::attribute(&e, &["href"])?.as_deref() == Some(href);
                sink.write(Event::Empty(e))?;
            }
            Event::Start(e) if in_head && markup::is_element(&e, "link") => {
                linked |= markup::attribute(&e, &["href"])?.as_deref() == Some(href);
                sink.write(Event::Start(e))?;
            }
            Event::End(e) if in_head && is_end_of(&e, "head") => {
                in_head = false;
                if !linked {
                    sink.write(Event::Empty(stylesheet_link(href)))?;
                    sink.mark_changed();
                    linked = true;
                }
                sink.write(Event::End(e))?;
            }
            Event::Empty(e) if !linked && markup::is_element(&e, "head") => {
                let name = markup::element_name(&e);
                sink.write(Event::Start(e))?;
                sink.write(Event::Empty(stylesheet_link(href)))?;
                sink.write(Event::End(BytesEnd::new(name)))?;
                sink.mark_changed();
                linked = true;
            }
            other => sink.write(other)?,
        }
    }

    sink.finish()
}

fn is_end_of(e: &BytesEnd<'_>, name: &str) -> bool {
    markup::local_name(e.name().as_ref()).eq_ignore_ascii_case(name.as_bytes())
}

fn stylesheet_link(href: &str) -> BytesStart<'static> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("href", href));
    link.push_attribute(("rel", "stylesheet"));
    link.push_attribute(("type", "text/css"));
    link
}

impl ResponsiveImages {
    fn apply_document(
        &self,
        part: &PackagePart,
        ctx: &TransformContext<'_>,
    ) -> MarkupResult<Option<String>> {
        let restyled = restyle_images(part.content(), ctx.marker.as_str())?;

        let created = ctx
            .package
            .stylesheets()
            .find(|p| p.origin() == PartOrigin::Created);
        let wants_link = match self.link_policy {
            LinkPolicy::AllDocuments => true,
            LinkPolicy::ModifiedDocuments => restyled.is_some() || part.is_replaced(),
        };

        let Some(stylesheet) = created.filter(|_| wants_link) else {
            return Ok(restyled);
        };
        let href = relative_href(&part.path, &stylesheet.path);
        let current = restyled.as_deref().unwrap_or(part.content());
        match insert_stylesheet_link(current, &href)? {
            Some(linked) => Ok(Some(linked)),
            None => Ok(restyled),
        }
    }
}

impl Transform for ResponsiveImages {
    fn name(&self) -> &'static str {
        "responsive-images"
    }

    fn new_resource(&self, package: &Package, marker: &MarkerToken) -> Option<NewResource> {
        if package.stylesheets().next().is_some() {
            return None;
        }
        let base = package.manifest().base_dir();
        let mut path = format!("{base}Styles/style.css");
        if package.contains_path(&path) {
            path = format!("{base}Styles/style-{marker}.css");
        }
        let mut content = responsive_rule(marker.as_str());
        content.push('\n');
        Some(NewResource::stylesheet(path, content))
    }

    fn apply(
        &self,
        part: &PackagePart,
        ctx: &TransformContext<'_>,
    ) -> Result<TransformResult, PartParseWarning> {
        match part.kind {
            PartKind::Document => match self.apply_document(part, ctx) {
                Ok(Some(content)) => {
                    debug!(path = %part.path, "restyled images");
                    Ok(TransformResult::Replaced(content))
                }
                Ok(None) => Ok(TransformResult::Unchanged),
                Err(e) => Err(PartParseWarning::new(part, e)),
            },
            PartKind::Stylesheet => {
                let is_target = target_stylesheet(ctx.package).is_some_and(|t| t.path == part.path);
                let marker = ctx.marker.as_str();
                if !is_target || has_class_rule(part.content(), marker) {
                    return Ok(TransformResult::Unchanged);
                }
                debug!(path = %part.path, %marker, "appending responsive rule");
                Ok(TransformResult::Replaced(append_rule(
                    part.content(),
                    &responsive_rule(marker),
                )))
            }
        }
    }
}
