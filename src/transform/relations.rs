// Relationships target
//
// Emits the complete `.rels` file for the body or for a header/footer. The ids
// generated here are the ones the body stages reference.

use super::{param, Params, StageOutput, Stylesheet, StylesheetId};
use crate::error::TransformError;
use crate::html::{sanitize_href, xml_escape_text, Node};
use crate::images::{self, media_filename, BODY_PREFIX};
use crate::part::Section;

pub const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub struct RelationsPart;

// Template parts the body points at: (id, type, target under `word/`).
const TEMPLATE_PARTS: [(&str, &str, &str); 7] = [
    ("rIdStyles", "styles", "styles.xml"),
    ("rIdSettings", "settings", "settings.xml"),
    ("rIdWebSettings", "webSettings", "webSettings.xml"),
    ("rIdFontTable", "fontTable", "fontTable.xml"),
    ("rIdTheme", "theme", "theme/theme1.xml"),
    ("rIdFootnotes", "footnotes", "footnotes.xml"),
    ("rIdEndnotes", "endnotes", "endnotes.xml"),
];

/// A hyperlink target as the body renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    External(String),
    Anchor(String),
}

pub fn link_target(href: &str) -> Option<LinkTarget> {
    let href = sanitize_href(href)?;
    match href.strip_prefix('#') {
        Some("") => None,
        Some(anchor) => Some(LinkTarget::Anchor(anchor.to_string())),
        None => Some(LinkTarget::External(href)),
    }
}

/// Distinct external link targets in order of first appearance.
pub fn external_links(root: &Node) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    root.for_each_element(&mut |e| {
        if !e.is("a") {
            return;
        }
        if let Some(LinkTarget::External(href)) = e.attr("href").and_then(link_target) {
            if !out.contains(&href) {
                out.push(href);
            }
        }
    });
    out
}

pub fn link_rid(index: usize) -> String {
    format!("rIdLink{}", index + 1)
}

pub fn image_rid(ordinal: usize) -> String {
    format!("rIdImage{ordinal}")
}

pub fn section_rid(section: Section) -> &'static str {
    match section {
        Section::Header => "rIdHeader",
        Section::Footer => "rIdFooter",
    }
}

fn relationship(out: &mut String, id: &str, kind: &str, target: &str, external: bool) {
    out.push_str(&format!(
        r#"<Relationship Id="{id}" Type="{REL_BASE}/{kind}" Target="{target}"{mode}/>"#,
        target = xml_escape_text(target),
        mode = if external { r#" TargetMode="External""# } else { "" },
    ));
}

impl Stylesheet for RelationsPart {
    fn id(&self) -> StylesheetId {
        StylesheetId::Relations
    }

    fn apply(&self, source: &Node, params: &Params) -> Result<StageOutput, TransformError> {
        let section_prefix = params.string(param::DOCUMENT_IMAGE).filter(|p| !p.is_empty());
        let prefix = section_prefix.unwrap_or(BODY_PREFIX);
        let missing_ext = params
            .string(param::IMAGE_FALLBACK_EXTENSION)
            .unwrap_or(images::FALLBACK_EXTENSION);

        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push_str(&format!(r#"<Relationships xmlns="{NS_RELS}">"#));

        // header/footer relations only carry their own links and images
        if section_prefix.is_none() {
            // without a part list only styles are assumed
            let present: Option<Vec<&str>> = params
                .string(param::TEMPLATE_PARTS)
                .map(|parts| parts.split_whitespace().collect());
            for (id, kind, target) in TEMPLATE_PARTS {
                let wanted = match &present {
                    Some(parts) => parts.contains(&target),
                    None => kind == "styles",
                };
                if wanted {
                    relationship(&mut out, id, kind, target, false);
                }
            }
            relationship(&mut out, "rIdNumbering", "numbering", "numbering.xml", false);
            for section in [Section::Header, Section::Footer] {
                if params.flag(section.marker()) {
                    let target = format!("{}.xml", section.name());
                    relationship(&mut out, section_rid(section), section.name(), &target, false);
                }
            }
        }

        for (i, href) in external_links(source).iter().enumerate() {
            relationship(&mut out, &link_rid(i), "hyperlink", href, true);
        }

        let mut ordinal = 0;
        source.for_each_element(&mut |e| {
            if e.is("img") {
                ordinal += 1;
                let ext = images::media_extension(e, missing_ext);
                let target = format!("media/{}", media_filename(prefix, ordinal, &ext));
                relationship(&mut out, &image_rid(ordinal), "image", &target, false);
            }
        });

        out.push_str("</Relationships>");
        Ok(StageOutput::Xml(out))
    }
}
