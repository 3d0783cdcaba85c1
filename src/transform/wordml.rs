// Document / header / footer targets
//
// Walks the normalized tree into blocks (paragraphs and tables) and renders
// them as a WordprocessingML fragment without prolog, to be spliced under
// `w:body`, `w:hdr` or `w:ftr`.

use super::lists::MAX_LEVELS;
use super::relations::{external_links, image_rid, link_rid, link_target, section_rid, LinkTarget};
use super::{param, Params, StageOutput, Stylesheet, StylesheetId};
use crate::error::TransformError;
use crate::html::{xml_escape_text, Element, Node};
use crate::images::{self, media_filename, BODY_PREFIX};
use crate::part::Section;
use std::collections::BTreeMap;

const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

const EMU_PER_PX: u64 = 9525;
const DEFAULT_IMAGE_PX: (u64, u64) = (300, 200);

const DEFAULT_PAGE: &str = concat!(
    "<w:pgSz w:w=\"12240\" w:h=\"15840\"/>",
    "<w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"708\" w:footer=\"708\" w:gutter=\"0\"/>",
    "<w:cols w:space=\"708\"/>",
    "<w:docGrid w:linePitch=\"360\"/>",
);

pub struct WordprocessingPart {
    id: StylesheetId,
    section: Option<Section>,
}

impl WordprocessingPart {
    pub fn document() -> Self {
        Self {
            id: StylesheetId::Document,
            section: None,
        }
    }

    pub fn header() -> Self {
        Self {
            id: StylesheetId::Header,
            section: Some(Section::Header),
        }
    }

    pub fn footer() -> Self {
        Self {
            id: StylesheetId::Footer,
            section: Some(Section::Footer),
        }
    }
}

impl Stylesheet for WordprocessingPart {
    fn id(&self) -> StylesheetId {
        self.id
    }

    fn apply(&self, source: &Node, params: &Params) -> Result<StageOutput, TransformError> {
        if source.element().is_none() {
            return Err(TransformError::Failed(format!("{} expects an element root", self.id)));
        }

        let prefix = params
            .string(param::DOCUMENT_IMAGE)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.section.map_or(BODY_PREFIX, Section::name).to_string());
        let missing_ext = params
            .string(param::IMAGE_FALLBACK_EXTENSION)
            .unwrap_or(images::FALLBACK_EXTENSION)
            .to_string();
        let links: BTreeMap<String, String> = external_links(source)
            .into_iter()
            .enumerate()
            .map(|(i, href)| (href, link_rid(i)))
            .collect();

        let mut builder = Builder {
            ctx: BuildCtx::new(),
            extras: params.flag(param::EXTRAS),
            prefix,
            missing_ext,
            doc_pr_base: match self.section {
                None => 0,
                Some(Section::Header) => 1000,
                Some(Section::Footer) => 2000,
            },
            image_count: 0,
            list_count: 0,
        };
        let blocks = builder.build_blocks(source.children());

        let mut out = String::new();
        for b in &blocks {
            block_xml(&mut out, b, &links);
        }
        match self.section {
            None => out.push_str(&section_properties(params)),
            Some(_) if blocks.is_empty() => out.push_str("<w:p/>"),
            Some(_) => {}
        }
        Ok(StageOutput::Xml(out))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    code: bool,
    superscript: bool,
    subscript: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct ImageRun {
    rid: String,
    doc_pr_id: u32,
    name: String,
    descr: String,
    cx: u64,
    cy: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text { text: String, style: RunStyle },
    Link { text: String, style: RunStyle, target: LinkTarget },
    Break,
    Image(ImageRun),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ListInfo {
    num_id: u32,
    ilvl: u32,
}

#[derive(Debug, Clone, Default)]
struct Paragraph {
    style: Option<String>,
    align: Option<&'static str>,
    list: Option<ListInfo>,
    rule: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct TableCell {
    blocks: Vec<Block>,
    header: bool,
}

#[derive(Debug, Clone)]
struct TableRow {
    cells: Vec<TableCell>,
}

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<TableRow>,
}

#[derive(Debug, Clone)]
enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Clone, Default)]
struct BuildCtx {
    bold_depth: u32,
    italic_depth: u32,
    underline_depth: u32,
    strike_depth: u32,
    code_depth: u32,
    sup_depth: u32,
    sub_depth: u32,
    pre_depth: u32,
    quote_depth: u32,
    link_stack: Vec<Option<LinkTarget>>,
    list_stack: Vec<u32>,
    current_num: u32,
    li_list_stack: Vec<Option<ListInfo>>,
}

impl BuildCtx {
    fn new() -> Self {
        Self::default()
    }

    fn current_link(&self) -> Option<&LinkTarget> {
        self.link_stack.last().and_then(|x| x.as_ref())
    }

    // Only the first paragraph of a list item carries the number.
    fn take_list(&mut self) -> Option<ListInfo> {
        self.li_list_stack.last_mut().and_then(|x| x.take())
    }

    fn run_style(&self) -> RunStyle {
        RunStyle {
            bold: self.bold_depth > 0,
            italic: self.italic_depth > 0,
            underline: self.underline_depth > 0,
            strike: self.strike_depth > 0,
            code: self.code_depth > 0 || self.pre_depth > 0,
            superscript: self.sup_depth > 0,
            subscript: self.sub_depth > 0 && self.sup_depth == 0,
        }
    }
}

struct Builder {
    ctx: BuildCtx,
    extras: bool,
    prefix: String,
    missing_ext: String,
    doc_pr_base: u32,
    image_count: usize,
    list_count: u32,
}

fn paragraph_has_content(p: &Paragraph) -> bool {
    p.rule
        || p.segments.iter().any(|s| match s {
            Segment::Text { text, .. } | Segment::Link { text, .. } => !text.trim().is_empty(),
            Segment::Break | Segment::Image(_) => true,
        })
}

fn flush_paragraph(blocks: &mut Vec<Block>, current: &mut Paragraph) {
    let p = std::mem::take(current);
    if paragraph_has_content(&p) {
        blocks.push(Block::Paragraph(p));
    }
}

fn push_segment(current: &mut Paragraph, text: String, style: RunStyle, link: Option<&LinkTarget>) {
    current.segments.push(match link {
        Some(target) => Segment::Link {
            text,
            style,
            target: target.clone(),
        },
        None => Segment::Text { text, style },
    });
}

fn heading_style(tag: &str) -> Option<&'static str> {
    match tag {
        "h1" => Some("Heading1"),
        "h2" => Some("Heading2"),
        "h3" => Some("Heading3"),
        "h4" => Some("Heading4"),
        "h5" => Some("Heading5"),
        "h6" => Some("Heading6"),
        _ => None,
    }
}

fn is_paragraph_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "nav" | "aside" | "figure"
            | "figcaption" | "caption" | "address" | "center" | "dl" | "dt" | "dd"
    )
}

fn style_property<'a>(el: &'a Element, name: &str) -> Option<&'a str> {
    el.attr("style")?.split(';').find_map(|decl| {
        let (k, v) = decl.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn alignment(el: &Element) -> Option<&'static str> {
    let value = style_property(el, "text-align").or_else(|| el.attr("align"))?;
    match value.to_ascii_lowercase().as_str() {
        "left" | "start" => Some("left"),
        "center" => Some("center"),
        "right" | "end" => Some("right"),
        "justify" => Some("both"),
        _ => None,
    }
}

fn pixels(value: &str) -> Option<u64> {
    let v = value.trim().trim_end_matches("px").trim();
    v.parse::<f64>().ok().filter(|n| *n > 0.0).map(|n| n.round() as u64)
}

fn image_size(el: &Element) -> (u64, u64) {
    let w = style_property(el, "width").or_else(|| el.attr("width")).and_then(pixels);
    let h = style_property(el, "height").or_else(|| el.attr("height")).and_then(pixels);
    match (w, h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w),
        (None, Some(h)) => (h, h),
        (None, None) => DEFAULT_IMAGE_PX,
    }
}

impl Builder {
    fn build_blocks(&mut self, nodes: &[Node]) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut current = Paragraph::default();
        for n in nodes {
            self.walk(n, &mut blocks, &mut current);
        }
        flush_paragraph(&mut blocks, &mut current);
        blocks
    }

    fn start_paragraph(&mut self, blocks: &mut Vec<Block>, current: &mut Paragraph, el: &Element) {
        flush_paragraph(blocks, current);
        let mut style = heading_style(&el.tag).map(str::to_string);
        if el.is("pre") {
            style = Some("CodeBlock".to_string());
        }
        if self.extras {
            if let Some(class) = el.attr("class").and_then(|c| c.split_whitespace().next()) {
                style = Some(class.to_string());
            }
        }
        if style.is_none() && self.ctx.quote_depth > 0 {
            style = Some("Quote".to_string());
        }
        current.style = style;
        current.align = if self.extras { alignment(el) } else { None };
        current.list = self.ctx.take_list();
    }

    fn emit_text(&mut self, current: &mut Paragraph, raw: &str) {
        if raw.is_empty() {
            return;
        }
        if current.list.is_none() && current.segments.is_empty() {
            // inline content directly under a list item still gets its number
            if let Some(list) = self.ctx.take_list() {
                current.list = Some(list);
            }
        }
        let preserve_space = self.ctx.pre_depth > 0;
        let mut text = raw.to_string();
        if !preserve_space && current.segments.is_empty() {
            text = text.trim_start().to_string();
        }
        let style = self.ctx.run_style();

        if preserve_space && text.contains('\n') {
            let mut first = true;
            for line in text.split('\n') {
                if !first {
                    current.segments.push(Segment::Break);
                }
                first = false;
                if !line.is_empty() {
                    push_segment(current, line.to_string(), style, self.ctx.current_link());
                }
            }
            return;
        }
        if !text.is_empty() {
            push_segment(current, text, style, self.ctx.current_link());
        }
    }

    fn emit_image(&mut self, current: &mut Paragraph, el: &Element) {
        self.image_count += 1;
        let ordinal = self.image_count;
        let ext = images::media_extension(el, &self.missing_ext);
        let (w, h) = image_size(el);
        current.segments.push(Segment::Image(ImageRun {
            rid: image_rid(ordinal),
            doc_pr_id: self.doc_pr_base + ordinal as u32,
            name: media_filename(&self.prefix, ordinal, &ext),
            descr: el.attr("alt").unwrap_or_default().to_string(),
            cx: w * EMU_PER_PX,
            cy: h * EMU_PER_PX,
        }));
    }

    // Captions become paragraphs before the table, or after it when they follow
    // rows, so every element is still visited in document order.
    fn build_table(&mut self, table: &Element, blocks: &mut Vec<Block>) {
        let mut rows = Vec::new();
        let mut after = Vec::new();
        self.table_section(table, &mut rows, blocks, &mut after);
        if !rows.is_empty() {
            blocks.push(Block::Table(Table { rows }));
        }
        blocks.append(&mut after);
    }

    fn table_section(
        &mut self,
        el: &Element,
        rows: &mut Vec<TableRow>,
        before: &mut Vec<Block>,
        after: &mut Vec<Block>,
    ) {
        for c in &el.children {
            let Node::Element(e) = c else { continue };
            match e.tag.as_str() {
                "tr" => rows.extend(self.build_row(e)),
                "thead" | "tbody" | "tfoot" => self.table_section(e, rows, before, after),
                "caption" => {
                    let target = if rows.is_empty() { &mut *before } else { &mut *after };
                    let mut current = Paragraph::default();
                    self.walk(c, target, &mut current);
                    flush_paragraph(target, &mut current);
                }
                _ => {}
            }
        }
    }

    fn build_row(&mut self, tr: &Element) -> Option<TableRow> {
        // cells start from a clean formatting context
        let saved = std::mem::take(&mut self.ctx);
        let mut cells = Vec::new();
        for c in &tr.children {
            let Node::Element(cell) = c else { continue };
            if !cell.is("td") && !cell.is("th") {
                continue;
            }
            self.ctx = BuildCtx::new();
            let blocks = self.build_blocks(&cell.children);
            cells.push(TableCell {
                blocks,
                header: cell.is("th"),
            });
        }
        self.ctx = saved;
        (!cells.is_empty()).then(|| TableRow { cells })
    }

    fn walk(&mut self, node: &Node, blocks: &mut Vec<Block>, current: &mut Paragraph) {
        let el = match node {
            Node::Text(t) => {
                self.emit_text(current, t);
                return;
            }
            Node::Comment(_) => return,
            Node::Element(el) => el,
        };
        let tag = el.tag.as_str();

        match tag {
            "table" => {
                flush_paragraph(blocks, current);
                self.build_table(el, blocks);
                return;
            }
            "img" => {
                self.emit_image(current, el);
                return;
            }
            "br" => {
                current.segments.push(Segment::Break);
                return;
            }
            "hr" => {
                flush_paragraph(blocks, current);
                blocks.push(Block::Paragraph(Paragraph {
                    rule: true,
                    ..Paragraph::default()
                }));
                return;
            }
            _ => {}
        }

        match tag {
            "pre" => {
                self.ctx.pre_depth += 1;
                self.start_paragraph(blocks, current, el);
            }
            "blockquote" => {
                flush_paragraph(blocks, current);
                self.ctx.quote_depth += 1;
            }
            "ul" | "ol" => {
                flush_paragraph(blocks, current);
                if self.ctx.list_stack.is_empty() {
                    self.list_count += 1;
                    self.ctx.current_num = self.list_count;
                }
                self.ctx.list_stack.push(self.ctx.current_num);
            }
            "li" => {
                flush_paragraph(blocks, current);
                let info = (!self.ctx.list_stack.is_empty()).then(|| ListInfo {
                    num_id: self.ctx.current_num,
                    ilvl: (self.ctx.list_stack.len() - 1).min(MAX_LEVELS - 1) as u32,
                });
                self.ctx.li_list_stack.push(info);
            }
            "a" => {
                let target = el.attr("href").and_then(link_target);
                self.ctx.link_stack.push(target);
            }
            "code" | "kbd" | "samp" | "tt" => self.ctx.code_depth += 1,
            "b" => self.ctx.bold_depth += 1,
            "i" | "cite" | "var" => self.ctx.italic_depth += 1,
            "u" => self.ctx.underline_depth += 1,
            "s" => self.ctx.strike_depth += 1,
            "sup" => self.ctx.sup_depth += 1,
            "sub" => self.ctx.sub_depth += 1,
            t if heading_style(t).is_some() || is_paragraph_tag(t) => {
                self.start_paragraph(blocks, current, el);
            }
            _ => {}
        }

        for c in &el.children {
            self.walk(c, blocks, current);
        }

        match tag {
            "pre" => {
                flush_paragraph(blocks, current);
                self.ctx.pre_depth = self.ctx.pre_depth.saturating_sub(1);
            }
            "blockquote" => {
                flush_paragraph(blocks, current);
                self.ctx.quote_depth = self.ctx.quote_depth.saturating_sub(1);
            }
            "ul" | "ol" => {
                flush_paragraph(blocks, current);
                let _ = self.ctx.list_stack.pop();
            }
            "li" => {
                flush_paragraph(blocks, current);
                let _ = self.ctx.li_list_stack.pop();
            }
            "a" => {
                let _ = self.ctx.link_stack.pop();
            }
            "code" | "kbd" | "samp" | "tt" => self.ctx.code_depth = self.ctx.code_depth.saturating_sub(1),
            "b" => self.ctx.bold_depth = self.ctx.bold_depth.saturating_sub(1),
            "i" | "cite" | "var" => self.ctx.italic_depth = self.ctx.italic_depth.saturating_sub(1),
            "u" => self.ctx.underline_depth = self.ctx.underline_depth.saturating_sub(1),
            "s" => self.ctx.strike_depth = self.ctx.strike_depth.saturating_sub(1),
            "sup" => self.ctx.sup_depth = self.ctx.sup_depth.saturating_sub(1),
            "sub" => self.ctx.sub_depth = self.ctx.sub_depth.saturating_sub(1),
            t if heading_style(t).is_some() || is_paragraph_tag(t) => flush_paragraph(blocks, current),
            _ => {}
        }
    }
}

fn run_properties(out: &mut String, style: RunStyle, hyperlink: bool) {
    let mut props = String::new();
    if hyperlink {
        props.push_str("<w:rStyle w:val=\"Hyperlink\"/>");
    }
    if style.code {
        props.push_str("<w:rFonts w:ascii=\"Consolas\" w:hAnsi=\"Consolas\" w:cs=\"Consolas\"/>");
    }
    if style.bold {
        props.push_str("<w:b/>");
    }
    if style.italic {
        props.push_str("<w:i/>");
    }
    if style.strike {
        props.push_str("<w:strike/>");
    }
    if hyperlink {
        props.push_str("<w:color w:val=\"0563C1\"/>");
    }
    if style.underline || hyperlink {
        props.push_str("<w:u w:val=\"single\"/>");
    }
    if style.superscript {
        props.push_str("<w:vertAlign w:val=\"superscript\"/>");
    } else if style.subscript {
        props.push_str("<w:vertAlign w:val=\"subscript\"/>");
    }
    if !props.is_empty() {
        out.push_str("<w:rPr>");
        out.push_str(&props);
        out.push_str("</w:rPr>");
    }
}

fn run_xml(out: &mut String, text: &str, style: RunStyle, hyperlink: bool) {
    if text.is_empty() {
        return;
    }
    out.push_str("<w:r>");
    run_properties(out, style, hyperlink);
    out.push_str("<w:t xml:space=\"preserve\">");
    out.push_str(&xml_escape_text(text));
    out.push_str("</w:t></w:r>");
}

fn image_xml(out: &mut String, img: &ImageRun) {
    let name = xml_escape_text(&img.name);
    out.push_str(&format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline xmlns:wp="{wp}" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="{name}" descr="{descr}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{a}" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="{a}"><a:graphicData uri="{pic}">"#,
            r#"<pic:pic xmlns:pic="{pic}"><pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="{r}" r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ),
        wp = NS_WP,
        a = NS_A,
        pic = NS_PIC,
        r = NS_R,
        cx = img.cx,
        cy = img.cy,
        id = img.doc_pr_id,
        name = name,
        descr = xml_escape_text(&img.descr),
        rid = img.rid,
    ));
}

fn close_hyperlink(out: &mut String, open: &mut Option<&LinkTarget>) {
    if open.take().is_some() {
        out.push_str("</w:hyperlink>");
    }
}

fn paragraph_xml(out: &mut String, p: &Paragraph, links: &BTreeMap<String, String>) {
    out.push_str("<w:p>");

    if p.style.is_some() || p.list.is_some() || p.rule || p.align.is_some() {
        out.push_str("<w:pPr>");
        if let Some(style) = &p.style {
            out.push_str(&format!("<w:pStyle w:val=\"{}\"/>", xml_escape_text(style)));
        }
        if let Some(li) = p.list {
            out.push_str("<w:numPr>");
            out.push_str(&format!("<w:ilvl w:val=\"{}\"/>", li.ilvl));
            out.push_str(&format!("<w:numId w:val=\"{}\"/>", li.num_id));
            out.push_str("</w:numPr>");
        }
        if p.rule {
            out.push_str("<w:pBdr><w:bottom w:val=\"single\" w:sz=\"6\" w:space=\"1\" w:color=\"auto\"/></w:pBdr>");
        }
        if let Some(jc) = p.align {
            out.push_str(&format!("<w:jc w:val=\"{jc}\"/>"));
        }
        out.push_str("</w:pPr>");
    }

    // consecutive runs with the same target share one w:hyperlink
    let mut open_link: Option<&LinkTarget> = None;

    for seg in &p.segments {
        match seg {
            Segment::Link { text, style, target } => {
                if open_link != Some(target) {
                    close_hyperlink(out, &mut open_link);
                    let opening = match target {
                        LinkTarget::External(href) => links
                            .get(href)
                            .map(|rid| format!("<w:hyperlink xmlns:r=\"{NS_R}\" r:id=\"{rid}\" w:history=\"1\">")),
                        LinkTarget::Anchor(name) => Some(format!(
                            "<w:hyperlink w:anchor=\"{}\" w:history=\"1\">",
                            xml_escape_text(name)
                        )),
                    };
                    match opening {
                        Some(tag) => {
                            out.push_str(&tag);
                            open_link = Some(target);
                        }
                        None => {
                            run_xml(out, text, *style, false);
                            continue;
                        }
                    }
                }
                run_xml(out, text, *style, true);
            }
            Segment::Text { text, style } => {
                close_hyperlink(out, &mut open_link);
                run_xml(out, text, *style, false);
            }
            Segment::Break => {
                close_hyperlink(out, &mut open_link);
                out.push_str("<w:r><w:br/></w:r>");
            }
            Segment::Image(img) => {
                close_hyperlink(out, &mut open_link);
                image_xml(out, img);
            }
        }
    }
    close_hyperlink(out, &mut open_link);

    out.push_str("</w:p>");
}

fn table_xml(out: &mut String, t: &Table, links: &BTreeMap<String, String>) {
    out.push_str("<w:tbl>");
    out.push_str("<w:tblPr>");
    out.push_str("<w:tblW w:w=\"0\" w:type=\"auto\"/>");
    out.push_str(concat!(
        "<w:tblBorders>",
        "<w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "<w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "<w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "<w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "<w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "<w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"D9D9D9\"/>",
        "</w:tblBorders>",
    ));
    out.push_str("</w:tblPr>");

    let columns = t.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    out.push_str("<w:tblGrid>");
    for _ in 0..columns {
        out.push_str("<w:gridCol/>");
    }
    out.push_str("</w:tblGrid>");

    for row in &t.rows {
        out.push_str("<w:tr>");
        if row.cells.iter().all(|c| c.header) {
            out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
        }
        for cell in &row.cells {
            out.push_str("<w:tc>");
            out.push_str("<w:tcPr><w:tcW w:w=\"0\" w:type=\"auto\"/></w:tcPr>");
            for b in &cell.blocks {
                block_xml(out, b, links);
            }
            // a cell must end with a paragraph
            if !matches!(cell.blocks.last(), Some(Block::Paragraph(_))) {
                out.push_str("<w:p/>");
            }
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }

    out.push_str("</w:tbl>");
}

fn block_xml(out: &mut String, b: &Block, links: &BTreeMap<String, String>) {
    match b {
        Block::Paragraph(p) => paragraph_xml(out, p, links),
        Block::Table(t) => table_xml(out, t, links),
    }
}

fn section_properties(params: &Params) -> String {
    let mut out = String::from("<w:sectPr>");
    for (section, reference) in [(Section::Header, "headerReference"), (Section::Footer, "footerReference")] {
        if params.flag(section.marker()) {
            out.push_str(&format!(
                "<w:{reference} xmlns:r=\"{NS_R}\" w:type=\"default\" r:id=\"{}\"/>",
                section_rid(section)
            ));
        }
    }
    // the template's page setup wins over US Letter
    match params.string(param::SECTION_PROPERTIES).filter(|p| !p.is_empty()) {
        Some(page) => out.push_str(page),
        None => out.push_str(DEFAULT_PAGE),
    }
    out.push_str("</w:sectPr>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;
    use crate::transform::{Pipeline, Stylesheets};
    use pretty_assertions::assert_eq;

    fn render(id: StylesheetId, input: &str, params: &Params) -> String {
        Pipeline::body(id)
            .run(&Stylesheets::builtin(), &html::parse(input), params)
            .unwrap()
    }

    fn body(input: &str) -> String {
        render(StylesheetId::Document, input, &Params::new())
    }

    #[test]
    fn single_paragraph() {
        let xml = body("<p>Hello</p>");
        assert!(xml.starts_with(r#"<w:p><w:r><w:t xml:space="preserve">Hello</w:t></w:r></w:p><w:sectPr>"#));
        assert_eq!(xml.matches("<w:p>").count(), 1);
    }

    #[test]
    fn empty_body_has_only_section_properties() {
        let xml = body("");
        assert!(xml.starts_with("<w:sectPr>"));
        assert!(!xml.contains("<w:p"));
    }

    #[test]
    fn formatting_runs() {
        let xml = body("<p>a <strong>b</strong> <em>c</em><sup>2</sup><code>x</code></p>");
        assert!(xml.contains(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">b</w:t></w:r>"#));
        assert!(xml.contains("<w:i/>"));
        assert!(xml.contains(r#"<w:vertAlign w:val="superscript"/>"#));
        assert!(xml.contains("Consolas"));
    }

    #[test]
    fn headings_and_quotes_get_styles() {
        let xml = body("<h2>Title</h2><blockquote><p>said</p></blockquote>");
        assert!(xml.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(xml.contains(r#"<w:pStyle w:val="Quote"/>"#));
    }

    #[test]
    fn lists_use_planned_num_ids() {
        let xml = body("<ol><li>a<ul><li>b</li></ul></li></ol><ul><li>c</li></ul>");
        assert!(xml.contains(r#"<w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr>"#));
        assert!(xml.contains(r#"<w:numPr><w:ilvl w:val="1"/><w:numId w:val="1"/></w:numPr>"#));
        assert!(xml.contains(r#"<w:numPr><w:ilvl w:val="0"/><w:numId w:val="2"/></w:numPr>"#));
    }

    #[test]
    fn second_paragraph_of_a_list_item_is_not_numbered() {
        let xml = body("<ul><li><p>first</p><p>second</p></li></ul>");
        assert_eq!(xml.matches("<w:numPr>").count(), 1);
    }

    #[test]
    fn links_reference_relationship_ids() {
        let xml = body(r##"<p><a href="https://a">one</a> and <a href="#sec">local</a></p>"##);
        assert!(xml.contains(r#"r:id="rIdLink1""#));
        assert!(xml.contains(r#"<w:hyperlink w:anchor="sec" w:history="1">"#));
        assert!(xml.contains(r#"<w:rStyle w:val="Hyperlink"/>"#));
    }

    #[test]
    fn images_become_drawings() {
        let xml = body(r#"<p><img src="https://x/a.png" width="100" height="50" alt="A"></p><img src="b.jpg">"#);
        assert!(xml.contains(r#"r:embed="rIdImage1""#));
        assert!(xml.contains(r#"r:embed="rIdImage2""#));
        assert!(xml.contains(r#"<wp:extent cx="952500" cy="476250"/>"#));
        assert!(xml.contains(r#"name="image2.jpg""#));
        assert!(xml.contains(r#"descr="A""#));
    }

    #[test]
    fn tables_keep_cells() {
        let xml = body("<table><tr><th>h</th></tr><tr><td>1</td><td><table><tr><td>n</td></tr></table></td></tr></table>");
        assert_eq!(xml.matches("<w:tbl>").count(), 2);
        assert!(xml.contains("<w:tblHeader/>"));
        assert!(xml.contains("</w:tbl><w:p/></w:tc>"));
    }

    #[test]
    fn table_captions_render_before_the_table_and_keep_image_order() {
        let xml = body(concat!(
            r#"<table><caption>Fig <img src="cap.png"></caption>"#,
            r#"<tr><td><img src="cell.jpg"></td></tr></table>"#,
        ));
        let caption = xml.find("Fig").unwrap();
        assert!(caption < xml.find("<w:tbl>").unwrap());
        assert!(xml.contains(r#"name="image1.png""#));
        assert!(xml.contains(r#"r:embed="rIdImage2""#));
        assert!(xml.contains(r#"<wp:docPr id="2" name="image2.jpg""#));
    }

    #[test]
    fn extras_map_classes_and_alignment() {
        let input = r#"<p class="Lead intro" style="text-align: center">x</p>"#;
        let plain = body(input);
        assert!(!plain.contains("Lead"));
        let xml = render(StylesheetId::Document, input, &Params::new().with("extras", "1"));
        assert!(xml.contains(r#"<w:pStyle w:val="Lead"/><w:jc w:val="center"/>"#));
    }

    #[test]
    fn section_references_follow_markers() {
        let params = Params::new().with("document-footer", "1");
        let xml = render(StylesheetId::Document, "<p>x</p>", &params);
        assert!(xml.contains(r#"w:type="default" r:id="rIdFooter""#));
        assert!(!xml.contains("headerReference"));
    }

    #[test]
    fn template_page_setup_replaces_the_default() {
        let a4 = r#"<w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1134"/>"#;
        let params = Params::new().with("section-properties", a4).with("document-header", "1");
        let xml = render(StylesheetId::Document, "<p>x</p>", &params);
        assert!(xml.contains(&format!(r#"r:id="rIdHeader"/>{a4}</w:sectPr>"#)));
        assert!(!xml.contains("12240"));
    }

    #[test]
    fn header_has_no_section_properties_and_uses_its_prefix() {
        let xml = render(StylesheetId::Header, r#"<img src="logo.png"> Company"#, &Params::new());
        assert!(!xml.contains("sectPr"));
        assert!(xml.contains(r#"name="header1.png""#));
        assert!(xml.contains("Company"));
    }

    #[test]
    fn empty_footer_still_has_a_paragraph() {
        assert_eq!(render(StylesheetId::Footer, "", &Params::new()), "<w:p/>");
    }

    #[test]
    fn pre_keeps_line_breaks() {
        let xml = body("<pre>a\nb</pre>");
        assert!(xml.contains(r#"<w:pStyle w:val="CodeBlock"/>"#));
        assert!(xml.contains("<w:r><w:br/></w:r>"));
    }
}
