// Stage 2: inline-element normalization
//
// After this stage every run of inline content sits inside a paragraph-level
// element, and no inline element wraps a block.

use super::cleanup::is_block;
use super::{Params, StageOutput, Stylesheet, StylesheetId};
use crate::error::TransformError;
use crate::html::{Element, Node};

pub struct InlineElements;

impl Stylesheet for InlineElements {
    fn id(&self) -> StylesheetId {
        StylesheetId::InlineElements
    }

    fn apply(&self, source: &Node, _params: &Params) -> Result<StageOutput, TransformError> {
        let Node::Element(root) = source else {
            return Err(TransformError::Failed("inline normalization expects an element root".into()));
        };
        Ok(StageOutput::Tree(Node::Element(normalize_container(root))))
    }
}

// Elements whose direct inline children must be grouped into paragraphs.
fn is_container(tag: &str) -> bool {
    matches!(
        tag,
        "body"
            | "div"
            | "li"
            | "td"
            | "th"
            | "blockquote"
            | "section"
            | "article"
            | "aside"
            | "header"
            | "footer"
            | "main"
            | "nav"
            | "figure"
            | "center"
            | "dd"
            | "address"
    )
}

// Elements that already hold inline content directly.
fn is_paragraph_like(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "pre" | "dt" | "figcaption"
    )
}

fn is_inline_node(node: &Node) -> bool {
    match node {
        Node::Element(e) => !is_block(&e.tag),
        Node::Text(_) => true,
        Node::Comment(_) => false,
    }
}

fn normalize_container(el: &Element) -> Element {
    let hoisted = hoist_blocks(&el.children);
    let mut children = Vec::with_capacity(hoisted.len());
    let mut pending: Vec<Node> = Vec::new();

    let flush = |pending: &mut Vec<Node>, children: &mut Vec<Node>| {
        if pending.is_empty() {
            return;
        }
        let only_blank = pending
            .iter()
            .all(|n| matches!(n, Node::Text(t) if t.trim().is_empty()));
        if !only_blank {
            children.push(Node::Element(Element::with_children("p", std::mem::take(pending))));
        }
        pending.clear();
    };

    let wrap = is_container(&el.tag);
    for child in hoisted {
        if wrap && is_inline_node(&child) {
            pending.push(child);
            continue;
        }
        flush(&mut pending, &mut children);
        children.push(normalize_node(child));
    }
    flush(&mut pending, &mut children);

    Element {
        tag: el.tag.clone(),
        attrs: el.attrs.clone(),
        children,
    }
}

fn normalize_node(node: Node) -> Node {
    match node {
        Node::Element(e) if is_paragraph_like(&e.tag) => Node::Element(Element {
            children: hoist_blocks(&e.children)
                .into_iter()
                .map(flatten_in_paragraph)
                .collect(),
            ..e
        }),
        Node::Element(e) => Node::Element(normalize_container(&e)),
        other => other,
    }
}

// A block nested in a paragraph-like element cannot be expressed; keep its content inline.
fn flatten_in_paragraph(node: Node) -> Node {
    match node {
        Node::Element(e) if is_block(&e.tag) && e.tag != "table" => Node::Element(Element {
            tag: "span".to_string(),
            attrs: Vec::new(),
            children: e.children.into_iter().map(flatten_in_paragraph).collect(),
        }),
        other => other,
    }
}

/// Push inline wrappers down into any blocks they contain:
/// `<b><p>x</p>y</b>` becomes `<p><b>x</b></p><b>y</b>`.
fn hoist_blocks(children: &[Node]) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Node::Element(e) if !is_block(&e.tag) && contains_block(e) => {
                for part in hoist_blocks(&e.children) {
                    out.push(distribute(e, part));
                }
            }
            other => out.push(other.clone()),
        }
    }
    out
}

fn distribute(wrapper: &Element, part: Node) -> Node {
    let shell = |children: Vec<Node>| {
        Node::Element(Element {
            tag: wrapper.tag.clone(),
            attrs: wrapper.attrs.clone(),
            children,
        })
    };
    match part {
        Node::Element(block) if is_block(&block.tag) => {
            if block.tag == "table" || block.tag == "hr" || block.tag == "ul" || block.tag == "ol" {
                return Node::Element(block);
            }
            let children = block.children.into_iter().map(|c| distribute(wrapper, c)).collect();
            Node::Element(Element { children, ..block })
        }
        inline => shell(vec![inline]),
    }
}

fn contains_block(el: &Element) -> bool {
    el.children.iter().any(|c| match c {
        Node::Element(e) => is_block(&e.tag) || (!is_block(&e.tag) && contains_block(e)),
        _ => false,
    })
}
