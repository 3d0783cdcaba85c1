// Lenient HTML parsing into an owned tree the stylesheet stages can rewrite

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

lazy_static! {
    static ref INTER_TAG_WS: Regex = Regex::new(r">\s+<").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: &str, children: Vec<Node>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        attr_get(&self.attrs, name)
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }
}

impl Node {
    pub fn element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.element().map(|e| e.tag.as_str())
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(e) => &e.children,
            _ => &[],
        }
    }

    /// Depth-first, document-order visit of every element (including `self`).
    pub fn for_each_element<'a>(&'a self, f: &mut dyn FnMut(&'a Element)) {
        if let Node::Element(e) = self {
            f(e);
            for c in &e.children {
                c.for_each_element(f);
            }
        }
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        fn walk(node: &Node, out: &mut String) {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.children.iter().for_each(|c| walk(c, out)),
                Node::Comment(_) => {}
            }
        }
        walk(self, &mut out);
        out
    }
}

/// Collapse whitespace between tags, the same way template XML is normalized.
pub fn squeeze_inter_tag_ws(input: &str) -> String {
    INTER_TAG_WS.replace_all(input, "><").into_owned()
}

fn html5_parse(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

/// Parse an HTML fragment or document and return its `body` element.
///
/// Empty input yields an empty body; malformed markup is repaired the way a browser would.
pub fn parse(input: &str) -> Node {
    let input = if input.trim().is_empty() { "<body></body>" } else { input };
    let dom = html5_parse(&squeeze_inter_tag_ws(input));

    fn find_body(node: &Handle) -> Option<Handle> {
        if let Some(tag) = tag_lower(node) {
            if tag == "body" {
                return Some(node.clone());
            }
        }
        for c in node.children.borrow().iter() {
            if let Some(body) = find_body(c) {
                return Some(body);
            }
        }
        None
    }

    match find_body(&dom.document) {
        Some(body) => convert(&body).unwrap_or_else(|| Node::Element(Element::new("body"))),
        None => {
            let children = dom.document.children.borrow().iter().filter_map(convert).collect();
            Node::Element(Element::with_children("body", children))
        }
    }
}

fn convert(handle: &Handle) -> Option<Node> {
    match &handle.data {
        NodeData::Text { contents } => Some(Node::Text(contents.borrow().to_string())),
        NodeData::Comment { contents } => Some(Node::Comment(contents.to_string())),
        NodeData::Element { .. } => {
            let tag = tag_lower(handle)?;
            let children = handle.children.borrow().iter().filter_map(convert).collect();
            Some(Node::Element(Element {
                tag,
                attrs: attrs_vec(handle),
                children,
            }))
        }
        _ => None,
    }
}

fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

fn attrs_vec(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| (a.name.local.to_string(), a.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn attr_get<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

pub fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}
