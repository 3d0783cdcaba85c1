// Deterministic list numbering shared by the numbering part and the body.
//
// Every outermost `ul`/`ol` gets its own numbering instance (numId = position
// in document order, starting at 1) so ordered lists restart. Nested lists
// become deeper levels of the same instance.

use crate::html::Node;

pub const MAX_LEVELS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Decimal,
}

impl ListKind {
    pub fn from_tag(tag: &str) -> Option<ListKind> {
        match tag {
            "ul" => Some(ListKind::Bullet),
            "ol" => Some(ListKind::Decimal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDef {
    pub num_id: u32,
    pub levels: [ListKind; MAX_LEVELS],
}

/// Collect one definition per outermost list, in document order.
pub fn plan(root: &Node) -> Vec<ListDef> {
    let mut defs = Vec::new();
    let mut seen: Vec<[Option<ListKind>; MAX_LEVELS]> = Vec::new();

    fn walk(node: &Node, depth: usize, seen: &mut Vec<[Option<ListKind>; MAX_LEVELS]>) {
        let Node::Element(e) = node else { return };
        // Table cells start a fresh list context.
        let mut depth = if e.is("td") || e.is("th") { 0 } else { depth };
        if let Some(kind) = ListKind::from_tag(&e.tag) {
            if depth == 0 {
                seen.push([None; MAX_LEVELS]);
            }
            let level = depth.min(MAX_LEVELS - 1);
            if let Some(levels) = seen.last_mut() {
                if levels[level].is_none() {
                    levels[level] = Some(kind);
                }
            }
            depth += 1;
        }
        for c in &e.children {
            walk(c, depth, seen);
        }
    }
    walk(root, 0, &mut seen);

    for (i, levels) in seen.into_iter().enumerate() {
        let top = levels[0].unwrap_or(ListKind::Bullet);
        let mut resolved = [top; MAX_LEVELS];
        let mut last = top;
        for (slot, kind) in resolved.iter_mut().zip(levels) {
            last = kind.unwrap_or(last);
            *slot = last;
        }
        defs.push(ListDef {
            num_id: i as u32 + 1,
            levels: resolved,
        });
    }
    defs
}
