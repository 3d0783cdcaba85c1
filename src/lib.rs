// Assembles .docx packages from HTML
//
// HTML is parsed, run through the stylesheet pipeline into WordprocessingML
// parts, and spliced into a template archive together with the images it
// references.

pub mod config;
pub mod content_types;
pub mod document;
pub mod error;
pub mod fetch;
pub mod html;
pub mod images;
pub mod package;
pub mod part;
pub mod templates;
pub mod transform;

pub use config::Config;
pub use document::{Generator, HeaderFooter};
pub use error::{Error, FetchError, Result, TransformError};
pub use fetch::{DefaultFetcher, ImageFetcher};
pub use images::ImageDescriptor;
pub use part::{PartKind, Replacements, Section};
pub use transform::{Params, Pipeline, Stylesheet, StylesheetId, Stylesheets};

/// MIME type of the generated packages.
pub const DOCX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
