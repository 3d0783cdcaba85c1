// The closed set of package parts this crate regenerates

use crate::transform::StylesheetId;
use std::collections::BTreeMap;

pub const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";
pub const MEDIA_DIR: &str = "word/media";

/// Entries every template must carry.
pub const REQUIRED_ENTRIES: [&str; 4] = [
    "word/document.xml",
    "word/numbering.xml",
    "word/_rels/document.xml.rels",
    CONTENT_TYPES_ENTRY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartKind {
    Document,
    Header,
    Footer,
    Numbering,
    DocumentRels,
    HeaderRels,
    FooterRels,
}

struct PartInfo {
    entry: &'static str,
    anchor: Option<&'static [&'static str]>,
    strip_namespaces: bool,
    stylesheet: StylesheetId,
}

const fn info(kind: PartKind) -> PartInfo {
    match kind {
        PartKind::Document => PartInfo {
            entry: "word/document.xml",
            anchor: Some(&["w:document", "w:body"]),
            strip_namespaces: false,
            stylesheet: StylesheetId::Document,
        },
        PartKind::Header => PartInfo {
            entry: "word/header.xml",
            anchor: Some(&["w:hdr"]),
            strip_namespaces: false,
            stylesheet: StylesheetId::Header,
        },
        PartKind::Footer => PartInfo {
            entry: "word/footer.xml",
            anchor: Some(&["w:ftr"]),
            strip_namespaces: false,
            stylesheet: StylesheetId::Footer,
        },
        PartKind::Numbering => PartInfo {
            entry: "word/numbering.xml",
            anchor: None,
            strip_namespaces: false,
            stylesheet: StylesheetId::Numbering,
        },
        PartKind::DocumentRels => PartInfo {
            entry: "word/_rels/document.xml.rels",
            anchor: None,
            strip_namespaces: true,
            stylesheet: StylesheetId::Relations,
        },
        PartKind::HeaderRels => PartInfo {
            entry: "word/_rels/header.xml.rels",
            anchor: None,
            strip_namespaces: true,
            stylesheet: StylesheetId::Relations,
        },
        PartKind::FooterRels => PartInfo {
            entry: "word/_rels/footer.xml.rels",
            anchor: None,
            strip_namespaces: true,
            stylesheet: StylesheetId::Relations,
        },
    }
}

impl PartKind {
    pub const ALL: [PartKind; 7] = [
        PartKind::Document,
        PartKind::Header,
        PartKind::Footer,
        PartKind::Numbering,
        PartKind::DocumentRels,
        PartKind::HeaderRels,
        PartKind::FooterRels,
    ];

    pub fn entry_name(self) -> &'static str {
        info(self).entry
    }

    /// Element path (qualified names from the root) whose children get replaced.
    /// `None` means the whole entry is replaced.
    pub fn anchor(self) -> Option<&'static [&'static str]> {
        info(self).anchor
    }

    pub fn strip_namespaces(self) -> bool {
        info(self).strip_namespaces
    }

    pub fn stylesheet(self) -> StylesheetId {
        info(self).stylesheet
    }

    pub fn from_entry_name(name: &str) -> Option<PartKind> {
        Self::ALL.into_iter().find(|k| k.entry_name() == name)
    }
}

/// Optional sections rendered from their own HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Header,
    Footer,
}

impl Section {
    pub fn part(self) -> PartKind {
        match self {
            Section::Header => PartKind::Header,
            Section::Footer => PartKind::Footer,
        }
    }

    pub fn rels_part(self) -> PartKind {
        match self {
            Section::Header => PartKind::HeaderRels,
            Section::Footer => PartKind::FooterRels,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Section::Header => "header",
            Section::Footer => "footer",
        }
    }

    /// Marker token telling the body relations which sections are active.
    pub fn marker(self) -> &'static str {
        match self {
            Section::Header => "document-header",
            Section::Footer => "document-footer",
        }
    }
}

/// Generated content keyed by the part it replaces. Last write wins.
#[derive(Debug, Default, Clone)]
pub struct Replacements {
    parts: BTreeMap<PartKind, String>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: PartKind, content: String) {
        self.parts.insert(kind, content);
    }

    pub fn get(&self, kind: PartKind) -> Option<&str> {
        self.parts.get(&kind).map(String::as_str)
    }

    pub fn by_entry_name(&self, name: &str) -> Option<(PartKind, &str)> {
        let kind = PartKind::from_entry_name(name)?;
        self.get(kind).map(|content| (kind, content))
    }

    pub fn contains(&self, kind: PartKind) -> bool {
        self.parts.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartKind, &str)> {
        self.parts.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_round_trip() {
        for kind in PartKind::ALL {
            assert_eq!(PartKind::from_entry_name(kind.entry_name()), Some(kind));
        }
        assert_eq!(PartKind::from_entry_name("word/styles.xml"), None);
    }

    #[test]
    fn only_xml_parts_have_anchors() {
        assert_eq!(PartKind::Document.anchor(), Some(&["w:document", "w:body"][..]));
        assert_eq!(PartKind::Header.anchor(), Some(&["w:hdr"][..]));
        assert_eq!(PartKind::Footer.anchor(), Some(&["w:ftr"][..]));
        assert!(PartKind::Numbering.anchor().is_none());
        assert!(PartKind::DocumentRels.anchor().is_none());
    }

    #[test]
    fn namespaces_are_never_stripped_from_xml_parts() {
        for kind in PartKind::ALL {
            if kind.anchor().is_some() {
                assert!(!kind.strip_namespaces(), "{kind:?}");
            }
        }
    }

    #[test]
    fn last_write_wins() {
        let mut map = Replacements::new();
        map.insert(PartKind::Numbering, "a".into());
        map.insert(PartKind::Numbering, "b".into());
        assert_eq!(map.len(), 1);
        assert_eq!(map.by_entry_name("word/numbering.xml"), Some((PartKind::Numbering, "b")));
    }
}
