// Numbering target
//
// One abstract definition and one instance per planned list, so every list
// restarts its own counter. numIds match the ones the body stage emits.

use super::lists::{self, ListKind, MAX_LEVELS};
use super::{Params, StageOutput, Stylesheet, StylesheetId};
use crate::error::TransformError;
use crate::html::Node;

pub const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

pub struct NumberingPart;

fn level_xml(out: &mut String, ilvl: usize, kind: ListKind) {
    let (fmt, text) = match kind {
        ListKind::Bullet => ("bullet", "•".to_string()),
        ListKind::Decimal => ("decimal", format!("%{}.", ilvl + 1)),
    };
    let left = 720 * (ilvl + 1);
    out.push_str(&format!(
        r#"<w:lvl w:ilvl="{ilvl}"><w:start w:val="1"/><w:numFmt w:val="{fmt}"/><w:lvlText w:val="{text}"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{left}" w:hanging="360"/></w:pPr></w:lvl>"#
    ));
}

impl Stylesheet for NumberingPart {
    fn id(&self) -> StylesheetId {
        StylesheetId::Numbering
    }

    fn apply(&self, source: &Node, _params: &Params) -> Result<StageOutput, TransformError> {
        let defs = lists::plan(source);

        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push_str(&format!(r#"<w:numbering xmlns:w="{NS_W}">"#));
        for def in &defs {
            out.push_str(&format!(r#"<w:abstractNum w:abstractNumId="{}">"#, def.num_id));
            out.push_str(r#"<w:multiLevelType w:val="hybridMultilevel"/>"#);
            for (ilvl, kind) in def.levels.iter().enumerate().take(MAX_LEVELS) {
                level_xml(&mut out, ilvl, *kind);
            }
            out.push_str("</w:abstractNum>");
        }
        // instances must follow every abstract definition
        for def in &defs {
            out.push_str(&format!(
                r#"<w:num w:numId="{id}"><w:abstractNumId w:val="{id}"/></w:num>"#,
                id = def.num_id
            ));
        }
        out.push_str("</w:numbering>");
        Ok(StageOutput::Xml(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;
    use crate::transform::{Pipeline, Stylesheets};

    fn render(input: &str) -> String {
        Pipeline::body(StylesheetId::Numbering)
            .run(&Stylesheets::builtin(), &html::parse(input), &Params::new())
            .unwrap()
    }

    #[test]
    fn empty_document_has_an_empty_numbering_part() {
        let xml = render("<p>x</p>");
        assert!(xml.ends_with(r#"<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"></w:numbering>"#));
    }

    #[test]
    fn each_list_gets_an_instance() {
        let xml = render("<ol><li>a</li></ol><ul><li>b</li></ul>");
        assert_eq!(xml.matches("<w:abstractNum ").count(), 2);
        assert!(xml.contains(r#"<w:num w:numId="1"><w:abstractNumId w:val="1"/></w:num>"#));
        assert!(xml.contains(r#"<w:num w:numId="2"><w:abstractNumId w:val="2"/></w:num>"#));
        assert!(xml.contains(r#"<w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/>"#));
        assert!(xml.contains(r#"<w:numFmt w:val="bullet"/><w:lvlText w:val="•"/>"#));
        let last_abstract = xml.rfind("</w:abstractNum>").unwrap();
        let first_num = xml.find("<w:num ").unwrap();
        assert!(last_abstract < first_num);
    }

    #[test]
    fn nested_levels_follow_the_nested_list_kind() {
        let xml = render("<ul><li>a<ol><li>b</li></ol></li></ul>");
        assert!(xml.contains(r#"<w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%2."/>"#));
        assert_eq!(xml.matches("<w:lvl ").count(), MAX_LEVELS);
    }
}
