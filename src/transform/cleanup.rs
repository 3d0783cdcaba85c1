// Stage 1: structural cleanup
//
// Drops markup that never reaches the document, folds synonym tags onto one
// spelling and normalizes whitespace outside `pre`.

use super::{Params, StageOutput, Stylesheet, StylesheetId};
use crate::error::TransformError;
use crate::html::{collapse_ws, Element, Node};

pub struct Cleanup;

impl Stylesheet for Cleanup {
    fn id(&self) -> StylesheetId {
        StylesheetId::Cleanup
    }

    fn apply(&self, source: &Node, _params: &Params) -> Result<StageOutput, TransformError> {
        let Node::Element(root) = source else {
            return Err(TransformError::Failed("cleanup expects an element root".into()));
        };
        let children = clean_children(&root.children, false);
        Ok(StageOutput::Tree(Node::Element(Element {
            tag: root.tag.clone(),
            attrs: root.attrs.clone(),
            children,
        })))
    }
}

fn is_dropped(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "template" | "link" | "meta" | "title" | "noscript" | "head"
    )
}

fn canonical_tag(tag: &str) -> &str {
    match tag {
        "strong" => "b",
        "em" => "i",
        "strike" | "del" => "s",
        "ins" => "u",
        _ => tag,
    }
}

pub(crate) fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "body"
            | "center"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "figcaption"
            | "figure"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "tbody"
            | "td"
            | "tfoot"
            | "th"
            | "thead"
            | "tr"
            | "ul"
    )
}

fn clean_children(children: &[Node], in_pre: bool) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Node::Comment(_) => {}
            Node::Text(t) => {
                if in_pre {
                    out.push(Node::Text(t.replace("\r\n", "\n").replace('\r', "\n")));
                } else {
                    let collapsed = collapse_ws(t);
                    if !collapsed.is_empty() {
                        out.push(Node::Text(collapsed));
                    }
                }
            }
            Node::Element(e) => {
                if is_dropped(&e.tag) {
                    continue;
                }
                let tag = canonical_tag(&e.tag);
                let children = clean_children(&e.children, in_pre || tag == "pre");
                if (tag == "span" || tag == "font") && e.attrs.is_empty() {
                    out.extend(children);
                    continue;
                }
                out.push(Node::Element(Element {
                    tag: tag.to_string(),
                    attrs: e.attrs.clone(),
                    children,
                }));
            }
        }
    }
    if !in_pre {
        drop_block_gaps(&mut out);
    }
    out
}

// Whitespace-only text next to a block element carries no meaning.
fn drop_block_gaps(nodes: &mut Vec<Node>) {
    let block_at = |nodes: &[Node], i: Option<usize>| {
        i.and_then(|i| nodes.get(i))
            .and_then(Node::tag)
            .map(is_block)
            .unwrap_or(true)
    };
    let mut i = 0;
    while i < nodes.len() {
        let blank = matches!(&nodes[i], Node::Text(t) if t.trim().is_empty());
        if blank && (block_at(nodes, i.checked_sub(1)) || block_at(nodes, Some(i + 1))) {
            nodes.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;

    fn clean(input: &str) -> Node {
        match Cleanup.apply(&html::parse(input), &Params::new()).unwrap() {
            StageOutput::Tree(t) => t,
            StageOutput::Xml(_) => panic!("cleanup must produce a tree"),
        }
    }

    #[test]
    fn drops_scripts_styles_and_comments() {
        let body = clean("<p>a<!-- note --></p><script>var x = 1;</script><style>p{}</style>");
        assert_eq!(body.children().len(), 1);
        assert_eq!(body.children()[0].children(), &[Node::Text("a".into())]);
    }

    #[test]
    fn folds_synonym_tags() {
        let body = clean("<p><strong>a</strong><em>b</em><del>c</del><ins>d</ins></p>");
        let tags: Vec<_> = body.children()[0].children().iter().filter_map(Node::tag).collect();
        assert_eq!(tags, vec!["b", "i", "s", "u"]);
    }

    #[test]
    fn unwraps_bare_spans() {
        let body = clean(r#"<p><span>plain</span><span class="k">kept</span></p>"#);
        let p = &body.children()[0];
        assert_eq!(p.children()[0], Node::Text("plain".into()));
        assert_eq!(p.children()[1].tag(), Some("span"));
    }

    #[test]
    fn collapses_whitespace_but_not_in_pre() {
        let body = clean("<p>a \n\t b</p><pre>x\n   y</pre>");
        assert_eq!(body.children()[0].text(), "a b");
        assert_eq!(body.children()[1].text(), "x\n   y");
    }

    #[test]
    fn keeps_spaces_between_inline_elements() {
        let body = clean("<p><b>a</b> and <i>b</i></p>");
        assert_eq!(body.children()[0].text(), "a and b");
    }

    #[test]
    fn keeps_images() {
        let body = clean(r#"<p><img src="a.png"></p><script><img src="b.png"></script>"#);
        let mut count = 0;
        body.for_each_element(&mut |e| {
            if e.is("img") {
                count += 1;
            }
        });
        assert_eq!(count, 1);
    }
}
