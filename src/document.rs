// Document orchestration
//
// One `create*` call = one `Assembly`: optional header/footer first, then the
// body parts, then the package rewrite. The parsed HTML is normalized once per
// section and every target stage and the image scan read that same tree, so
// relationship ids, drawing ids and media entries line up.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{DefaultFetcher, ImageFetcher};
use crate::html::{self, Node};
use crate::images::{self, ImageContext, ImageDescriptor, BODY_PREFIX};
use crate::package::{self, TemplateInfo};
use crate::part::{PartKind, Replacements, Section};
use crate::templates;
use crate::transform::{param, remove_namespaces, Markers, Params, Pipeline, StylesheetId, Stylesheets};
use log::info;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

/// HTML for the optional header and footer sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFooter {
    sections: BTreeMap<Section, String>,
}

impl HeaderFooter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(self, html: impl Into<String>) -> Self {
        self.with(Section::Header, html)
    }

    pub fn footer(self, html: impl Into<String>) -> Self {
        self.with(Section::Footer, html)
    }

    pub fn with(mut self, section: Section, html: impl Into<String>) -> Self {
        self.sections.insert(section, html.into());
        self
    }

    pub fn get(&self, section: Section) -> Option<&str> {
        self.sections.get(&section).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Header before footer.
    pub fn iter(&self) -> impl Iterator<Item = (Section, &str)> {
        self.sections.iter().map(|(s, html)| (*s, html.as_str()))
    }
}

pub struct Generator {
    config: Config,
    fetcher: Box<dyn ImageFetcher>,
    stylesheets: Stylesheets,
}

impl Generator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: Box::new(DefaultFetcher::new()),
            stylesheets: Stylesheets::builtin(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl ImageFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_stylesheets(mut self, stylesheets: Stylesheets) -> Self {
        self.stylesheets = stylesheets;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a package from `html` using the named template (or the default one).
    pub fn create(
        &self,
        html: &str,
        template: Option<&str>,
        extras: bool,
        header_footer: &HeaderFooter,
    ) -> Result<Vec<u8>> {
        let bytes = templates::load(&self.config, template)?;
        self.create_from_archive(Cursor::new(bytes), html, extras, header_footer)
    }

    /// Build a package from an explicitly named template, body only.
    pub fn create_with_template(&self, template: &str, html: &str, extras: bool) -> Result<Vec<u8>> {
        let bytes = templates::load(&self.config, Some(template))?;
        self.create_from_archive(Cursor::new(bytes), html, extras, &HeaderFooter::new())
    }

    pub fn create_from_archive<R: Read + Seek>(
        &self,
        mut template: R,
        html: &str,
        extras: bool,
        header_footer: &HeaderFooter,
    ) -> Result<Vec<u8>> {
        let info = package::inspect(&mut template)?;
        let mut assembly = Assembly::new(self, info);
        for (section, content) in header_footer.iter() {
            assembly.prepare_section(section, content)?;
        }
        assembly.prepare_body(html, extras)?;

        let out = package::rewrite(template, &assembly.replacements, &assembly.manifest, self.fetcher.as_ref())?;
        info!(
            "generated {} bytes: {} parts replaced, {} images embedded",
            out.len(),
            assembly.replacements.len(),
            assembly.manifest.len()
        );
        Ok(out)
    }
}

struct Assembly<'g> {
    generator: &'g Generator,
    replacements: Replacements,
    manifest: Vec<ImageDescriptor>,
    markers: Markers,
    missing_ext: String,
    template: TemplateInfo,
}

impl<'g> Assembly<'g> {
    fn new(generator: &'g Generator, template: TemplateInfo) -> Self {
        Self {
            generator,
            replacements: Replacements::new(),
            manifest: Vec::new(),
            markers: Markers::default(),
            missing_ext: images::placeholder_extension(&generator.config.no_image_path),
            template,
        }
    }

    fn base_params(&self) -> Params {
        Params::new().with(param::IMAGE_FALLBACK_EXTENSION, self.missing_ext.as_str())
    }

    fn normalize(&self, kind: PartKind, source: &Node) -> Result<Node> {
        Pipeline::body(kind.stylesheet())
            .prepare(&self.generator.stylesheets, source)
            .map_err(|(stage, e)| Error::transform(kind.entry_name(), stage, e))
    }

    fn render(&mut self, kind: PartKind, stage: StylesheetId, tree: &Node, params: &Params) -> Result<()> {
        let xml = Pipeline::single(stage)
            .run(&self.generator.stylesheets, tree, params)
            .map_err(|(stage, e)| Error::transform(kind.entry_name(), stage, e))?;
        let xml = if kind.strip_namespaces() { remove_namespaces(&xml) } else { xml };
        self.replacements.insert(kind, xml);
        Ok(())
    }

    fn scan_images(&mut self, tree: &Node, prefix: &str) {
        let config = &self.generator.config;
        let ctx = ImageContext {
            asset_root: &config.asset_root,
            no_image: &config.no_image_path,
        };
        self.manifest.extend(images::scan(tree, prefix, &ctx));
    }

    fn prepare_section(&mut self, section: Section, content: &str) -> Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        let tree = self.normalize(section.part(), &html::parse(content))?;

        let rels_params = self
            .base_params()
            .with(param::DOCUMENT_IMAGE, format!("'{}'", section.name()));
        self.render(section.rels_part(), StylesheetId::Relations, &tree, &rels_params)?;
        self.render(section.part(), section.part().stylesheet(), &tree, &self.base_params())?;
        self.scan_images(&tree, section.name());
        self.markers.push(section.marker(), "1");
        Ok(())
    }

    fn prepare_body(&mut self, content: &str, extras: bool) -> Result<()> {
        let tree = self.normalize(PartKind::Document, &html::parse(content))?;

        let markers = self
            .markers
            .to_params()
            .map_err(|e| Error::transform(PartKind::DocumentRels.entry_name(), StylesheetId::Relations, e))?;
        let mut marked = self.base_params();
        marked.extend(&markers);
        self.render(PartKind::Numbering, StylesheetId::Numbering, &tree, &self.base_params())?;

        let parts = self.template.word_parts().collect::<Vec<_>>().join(" ");
        let rels_params = marked.clone().with(param::TEMPLATE_PARTS, parts);
        self.render(PartKind::DocumentRels, StylesheetId::Relations, &tree, &rels_params)?;

        let mut doc_params = marked;
        if let Some(page) = &self.template.section_properties {
            doc_params.set(param::SECTION_PROPERTIES, page.as_str());
        }
        if extras {
            doc_params.set(param::EXTRAS, "1");
        }
        self.render(PartKind::Document, StylesheetId::Document, &tree, &doc_params)?;
        self.scan_images(&tree, BODY_PREFIX);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use zip::ZipArchive;

    struct Echo;

    impl ImageFetcher for Echo {
        fn fetch(&self, locator: &str) -> std::result::Result<Vec<u8>, FetchError> {
            Ok(locator.as_bytes().to_vec())
        }
    }

    fn assemble(generator: &Generator, html: &str, hf: &HeaderFooter) -> (Replacements, Vec<ImageDescriptor>) {
        let template = templates::builtin_template().unwrap();
        let info = package::inspect(Cursor::new(template)).unwrap();
        let mut assembly = Assembly::new(generator, info);
        for (section, content) in hf.iter() {
            assembly.prepare_section(section, content).unwrap();
        }
        assembly.prepare_body(html, false).unwrap();
        (assembly.replacements, assembly.manifest)
    }

    #[test]
    fn body_only_replaces_three_parts() {
        let generator = Generator::new(Config::default());
        let (parts, manifest) = assemble(&generator, "<p>Hello</p>", &HeaderFooter::new());
        let kinds: Vec<_> = parts.iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![PartKind::Document, PartKind::Numbering, PartKind::DocumentRels]);
        assert!(manifest.is_empty());
        assert!(!parts.get(PartKind::DocumentRels).unwrap().contains("header.xml"));
    }

    #[test]
    fn empty_sections_are_skipped() {
        let generator = Generator::new(Config::default());
        let hf = HeaderFooter::new().header("").footer("<p>page</p>");
        let (parts, _) = assemble(&generator, "", &hf);
        assert!(!parts.contains(PartKind::Header));
        assert!(parts.contains(PartKind::Footer));
        assert!(parts.contains(PartKind::FooterRels));
        let rels = parts.get(PartKind::DocumentRels).unwrap();
        assert!(rels.contains(r#"Target="footer.xml""#));
        assert!(!rels.contains("header.xml"));
        assert!(parts.get(PartKind::Document).unwrap().contains("footerReference"));
    }

    #[test]
    fn manifest_lists_header_then_footer_then_body() {
        let generator = Generator::new(Config::default());
        let hf = HeaderFooter::new()
            .footer(r#"<img src="https://x/f.gif">"#)
            .header(r#"<img src="https://x/h.png">"#);
        let (parts, manifest) = assemble(&generator, r#"<img src="https://x/b.jpg">"#, &hf);
        let names: Vec<_> = manifest.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["header1.png", "footer1.gif", "image1.jpg"]);
        assert!(parts.get(PartKind::HeaderRels).unwrap().contains("media/header1.png"));
        assert!(parts.get(PartKind::DocumentRels).unwrap().contains("media/image1.jpg"));
    }

    #[test]
    fn sourceless_images_use_the_placeholder_extension() {
        let generator = Generator::new(Config::default());
        let (parts, manifest) = assemble(&generator, "<p><img alt=x></p>", &HeaderFooter::new());
        assert_eq!(manifest[0].filename, "image1.emf");
        assert!(parts.get(PartKind::DocumentRels).unwrap().contains("media/image1.emf"));
        assert!(parts.get(PartKind::Document).unwrap().contains(r#"name="image1.emf""#));
    }

    #[test]
    fn embeds_fetched_bytes_under_their_media_names() {
        let generator = Generator::new(Config::default()).with_fetcher(Echo);
        let template = templates::builtin_template().unwrap();
        let html = r#"<p><img src="https://x/a.png"><img src="https://x/b.png"></p>"#;
        let out = generator
            .create_from_archive(Cursor::new(template), html, false, &HeaderFooter::new())
            .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(out)).unwrap();
        let mut second = String::new();
        archive
            .by_name("word/media/image2.png")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert_eq!(second, "https://x/b.png");
    }

    #[test]
    fn failing_stage_names_the_part() {
        let mut sheets = Stylesheets::builtin();
        struct Broken;
        impl crate::transform::Stylesheet for Broken {
            fn id(&self) -> StylesheetId {
                StylesheetId::Numbering
            }
            fn apply(
                &self,
                _: &Node,
                _: &Params,
            ) -> std::result::Result<crate::transform::StageOutput, crate::error::TransformError> {
                Err(crate::error::TransformError::Failed("boom".into()))
            }
        }
        sheets.insert(Box::new(Broken));
        let generator = Generator::new(Config::default()).with_stylesheets(sheets);
        let template = templates::builtin_template().unwrap();
        let err = generator
            .create_from_archive(Cursor::new(template), "<p>x</p>", false, &HeaderFooter::new())
            .unwrap_err();
        assert!(
            matches!(err, Error::Transform { ref part, ref stage, .. } if part == "word/numbering.xml" && stage == "numbering")
        );
    }
}
