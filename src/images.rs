// Image registrar
//
// Finds every <img> in document order and decides where its bytes come from
// and which media entry they land in. The naming rules here are shared with
// the body and relations stages so drawing ids, relationship targets and
// media entries always agree.

use crate::html::{Element, Node};
use crate::part::MEDIA_DIR;
use std::path::Path;

pub const BODY_PREFIX: &str = "image";

/// Used when neither the override filename nor the source has an extension.
pub const FALLBACK_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// `{prefix}{ordinal}.{extension}`
    pub filename: String,
    /// Local path or URL the bytes are fetched from.
    pub locator: String,
    pub extension: String,
}

impl ImageDescriptor {
    pub fn media_path(&self) -> String {
        format!("{MEDIA_DIR}/{}", self.filename)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageContext<'a> {
    pub asset_root: &'a Path,
    pub no_image: &'a Path,
}

enum Source<'a> {
    // server-local asset path from `data-src`
    Asset(&'a str),
    Url(&'a str),
    Missing,
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|v| !v.is_empty())
}

fn source(img: &Element) -> Source<'_> {
    if let Some(data_src) = non_empty(img.attr("data-src")) {
        if data_src.starts_with("//") || is_url(data_src) {
            return Source::Url(data_src);
        }
        return Source::Asset(data_src);
    }
    match non_empty(img.attr("src")) {
        Some(src) => Source::Url(src),
        None => Source::Missing,
    }
}

fn is_url(s: &str) -> bool {
    let low = s.to_ascii_lowercase();
    low.starts_with("http://") || low.starts_with("https://") || low.starts_with("file://")
}

fn last_segment(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Lower-cased extension without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let name = last_segment(name);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The name the media entry's extension is taken from, if the element has one.
fn source_name(img: &Element) -> Option<&str> {
    if let Some(name) = non_empty(img.attr("data-filename")) {
        return Some(name);
    }
    match source(img) {
        Source::Asset(p) | Source::Url(p) => Some(last_segment(p)),
        Source::Missing => None,
    }
}

/// Extension of the media entry generated for `img`.
///
/// `missing_ext` applies to images without any source (they embed the no-image placeholder).
pub fn media_extension(img: &Element, missing_ext: &str) -> String {
    match source_name(img) {
        Some(name) => extension_of(name).unwrap_or_else(|| FALLBACK_EXTENSION.to_string()),
        None => missing_ext.to_string(),
    }
}

pub fn media_filename(prefix: &str, ordinal: usize, extension: &str) -> String {
    format!("{prefix}{ordinal}.{extension}")
}

/// Extension of the placeholder embedded for images without a source.
pub fn placeholder_extension(no_image: &Path) -> String {
    no_image
        .to_str()
        .and_then(extension_of)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn locator(img: &Element, ctx: &ImageContext<'_>) -> String {
    match source(img) {
        Source::Url(url) => url.to_string(),
        Source::Asset(path) => {
            let relative = path.strip_prefix('/').unwrap_or(path);
            ctx.asset_root.join(relative).to_string_lossy().into_owned()
        }
        Source::Missing => ctx.no_image.to_string_lossy().into_owned(),
    }
}

/// All images under `root`, in document order, named `{prefix}{n}.{ext}`.
pub fn scan(root: &Node, prefix: &str, ctx: &ImageContext<'_>) -> Vec<ImageDescriptor> {
    let missing_ext = placeholder_extension(ctx.no_image);
    let mut out = Vec::new();
    root.for_each_element(&mut |e| {
        if !e.is("img") {
            return;
        }
        let extension = media_extension(e, &missing_ext);
        out.push(ImageDescriptor {
            filename: media_filename(prefix, out.len() + 1, &extension),
            locator: locator(e, ctx),
            extension,
        });
    });
    out
}
