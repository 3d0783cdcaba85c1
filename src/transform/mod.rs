// HTML -> WordprocessingML transformation pipeline
//
// A part is produced by running the parsed HTML through an ordered list of
// stylesheet stages. Every stage but the last rewrites the tree; the last one
// renders the XML for the target part.

mod cleanup;
mod inline;
pub mod lists;
pub mod numbering;
pub mod relations;
mod wordml;

pub use cleanup::Cleanup;
pub use inline::InlineElements;
pub use numbering::NumberingPart;
pub use relations::RelationsPart;
pub use wordml::WordprocessingPart;

use crate::error::TransformError;
use crate::html::Node;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref NS_DECL: Regex = Regex::new(r#"\s*xmlns:(\w+)="(.*?)\s*""#).unwrap();
}

/// Parameter names understood by the built-in stages.
pub mod param {
    pub const EXTRAS: &str = "extras";
    pub const DOCUMENT_IMAGE: &str = "document-image";
    pub const IMAGE_FALLBACK_EXTENSION: &str = "image-fallback-extension";
    /// Space separated entry names under `word/` present in the template.
    pub const TEMPLATE_PARTS: &str = "template-parts";
    /// Children of the template body's `w:sectPr`, header/footer references removed.
    pub const SECTION_PROPERTIES: &str = "section-properties";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StylesheetId {
    Cleanup,
    InlineElements,
    Document,
    Header,
    Footer,
    Numbering,
    Relations,
}

impl StylesheetId {
    pub fn name(self) -> &'static str {
        match self {
            StylesheetId::Cleanup => "cleanup",
            StylesheetId::InlineElements => "inline_elements",
            StylesheetId::Document => "document",
            StylesheetId::Header => "header",
            StylesheetId::Footer => "footer",
            StylesheetId::Numbering => "numbering",
            StylesheetId::Relations => "relations",
        }
    }
}

impl fmt::Display for StylesheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named stylesheet parameters. Stages pick out the names they care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat `[name, value, name, value, ...]` list.
    pub fn from_positional<S: AsRef<str>>(list: &[S]) -> Result<Self, TransformError> {
        if list.len() % 2 != 0 {
            return Err(TransformError::ParamCount(list.len()));
        }
        let mut params = Self::new();
        for pair in list.chunks(2) {
            params.set(pair[0].as_ref(), pair[1].as_ref());
        }
        Ok(params)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// `1`, `true` and `yes` count as set; quoted values (`'1'`) are unquoted first.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name).map(unquote), Some("1" | "true" | "yes"))
    }

    /// String value with surrounding quotes removed.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).map(unquote)
    }

    pub fn extend(&mut self, other: &Params) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }
}

fn unquote(v: &str) -> &str {
    let v = v.trim();
    v.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(v)
}

/// Ordered record of which optional sections were activated, kept as the flat
/// `[token, value, token, value, ...]` list the stages are given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers {
    list: Vec<String>,
}

impl Markers {
    pub fn push(&mut self, token: &str, value: &str) {
        self.list.push(token.to_string());
        self.list.push(value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.list.chunks(2).filter_map(|pair| match pair {
            [token, value] => Some((token.as_str(), value.as_str())),
            _ => None,
        })
    }

    pub fn as_positional(&self) -> &[String] {
        &self.list
    }

    pub fn to_params(&self) -> Result<Params, TransformError> {
        Params::from_positional(self.list.as_slice())
    }
}

pub enum StageOutput {
    Tree(Node),
    Xml(String),
}

impl StageOutput {
    fn kind(&self) -> &'static str {
        match self {
            StageOutput::Tree(_) => "a tree",
            StageOutput::Xml(_) => "xml",
        }
    }
}

pub trait Stylesheet: Send + Sync {
    fn id(&self) -> StylesheetId;

    fn apply(&self, source: &Node, params: &Params) -> Result<StageOutput, TransformError>;
}

/// Registry of stages by id. Starts with the built-in rule set.
pub struct Stylesheets {
    stages: BTreeMap<StylesheetId, Box<dyn Stylesheet>>,
}

impl Default for Stylesheets {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Stylesheets {
    pub fn empty() -> Self {
        Self { stages: BTreeMap::new() }
    }

    pub fn builtin() -> Self {
        let mut s = Self::empty();
        s.insert(Box::new(Cleanup));
        s.insert(Box::new(InlineElements));
        s.insert(Box::new(WordprocessingPart::document()));
        s.insert(Box::new(WordprocessingPart::header()));
        s.insert(Box::new(WordprocessingPart::footer()));
        s.insert(Box::new(NumberingPart));
        s.insert(Box::new(RelationsPart));
        s
    }

    /// Register a stage, replacing any stage with the same id.
    pub fn insert(&mut self, stage: Box<dyn Stylesheet>) {
        self.stages.insert(stage.id(), stage);
    }

    pub fn get(&self, id: StylesheetId) -> Result<&dyn Stylesheet, TransformError> {
        self.stages
            .get(&id)
            .map(|s| s.as_ref())
            .ok_or(TransformError::MissingStage(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<StylesheetId>,
}

impl Pipeline {
    /// Cleanup, inline normalization, then the target.
    pub fn body(target: StylesheetId) -> Self {
        Self {
            stages: vec![StylesheetId::Cleanup, StylesheetId::InlineElements, target],
        }
    }

    pub fn single(target: StylesheetId) -> Self {
        Self { stages: vec![target] }
    }

    pub fn stages(&self) -> &[StylesheetId] {
        &self.stages
    }

    fn run_intermediate(
        &self,
        stylesheets: &Stylesheets,
        source: &Node,
    ) -> Result<Option<Node>, (StylesheetId, TransformError)> {
        let intermediate = self.stages.split_last().map_or(&[][..], |(_, rest)| rest);
        let empty = Params::new();
        let mut current: Option<Node> = None;
        for &id in intermediate {
            let stage = stylesheets.get(id).map_err(|e| (id, e))?;
            let input = current.as_ref().unwrap_or(source);
            match stage.apply(input, &empty).map_err(|e| (id, e))? {
                StageOutput::Tree(tree) => current = Some(tree),
                other => {
                    return Err((
                        id,
                        TransformError::StageOrder {
                            stage: id,
                            expected: "a tree",
                            found: other.kind(),
                        },
                    ))
                }
            }
        }
        Ok(current)
    }

    /// The tree the target stage would receive.
    pub fn prepare(&self, stylesheets: &Stylesheets, source: &Node) -> Result<Node, (StylesheetId, TransformError)> {
        Ok(self
            .run_intermediate(stylesheets, source)?
            .unwrap_or_else(|| source.clone()))
    }

    /// Run every stage; params go to the target stage only.
    pub fn run(
        &self,
        stylesheets: &Stylesheets,
        source: &Node,
        params: &Params,
    ) -> Result<String, (StylesheetId, TransformError)> {
        let Some(&target) = self.stages.last() else {
            return Err((StylesheetId::Document, TransformError::EmptyPipeline));
        };

        let prepared = self.run_intermediate(stylesheets, source)?;
        let stage = stylesheets.get(target).map_err(|e| (target, e))?;
        let input = prepared.as_ref().unwrap_or(source);
        match stage.apply(input, params).map_err(|e| (target, e))? {
            StageOutput::Xml(xml) => Ok(xml),
            other => Err((
                target,
                TransformError::StageOrder {
                    stage: target,
                    expected: "xml",
                    found: other.kind(),
                },
            )),
        }
    }
}

/// Drop prefixed namespace declarations (`xmlns:foo="..."`).
pub fn remove_namespaces(xml: &str) -> String {
    NS_DECL.replace_all(xml, "").into_owned()
}
