// Zip passthrough / rewrite engine
//
// Streams a template archive into a new one. Entries we regenerate are
// rewritten, everything else is raw-copied so its compressed bytes, CRC and
// metadata stay exactly as they were in the template.

use crate::content_types;
use crate::error::{xml_err, Error, Result, TransformError};
use crate::fetch::ImageFetcher;
use crate::html::squeeze_inter_tag_ws;
use crate::images::ImageDescriptor;
use crate::part::{PartKind, Replacements, CONTENT_TYPES_ENTRY, REQUIRED_ENTRIES};
use log::{debug, warn};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const SPLICE_STAGE: &str = "splice";
const INSPECT_STAGE: &str = "inspect";

fn zip_err(entry: &str) -> impl Fn(zip::result::ZipError) -> Error + '_ {
    move |e| Error::archive(entry, e)
}

/// Replace every child of the first element at `anchor` (a path of qualified
/// names from the root) with `fragment`, which is inserted unescaped.
pub fn splice(xml: &str, anchor: &[&str], fragment: &str) -> std::result::Result<String, TransformError> {
    enum State {
        Searching,
        Skipping(usize),
        Done,
    }

    let squeezed = squeeze_inter_tag_ws(xml);
    let mut reader = Reader::from_str(&squeezed);
    let mut writer = Writer::new(Vec::with_capacity(squeezed.len() + fragment.len()));
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut state = State::Searching;

    let at_anchor = |path: &[Vec<u8>]| {
        path.len() == anchor.len() && path.iter().zip(anchor).all(|(a, b)| a.as_slice() == b.as_bytes())
    };

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        if let State::Skipping(depth) = state {
            match event {
                Event::Start(_) => state = State::Skipping(depth + 1),
                Event::End(e) if depth == 0 => {
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(fragment)))
                        .map_err(xml_err)?;
                    writer.write_event(Event::End(e)).map_err(xml_err)?;
                    let _ = path.pop();
                    state = State::Done;
                }
                Event::End(_) => state = State::Skipping(depth - 1),
                Event::Eof => return Err(xml_err("unexpected end of document")),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                path.push(e.name().as_ref().to_vec());
                let hit = matches!(state, State::Searching) && at_anchor(&path);
                writer.write_event(Event::Start(e)).map_err(xml_err)?;
                if hit {
                    state = State::Skipping(0);
                }
            }
            Event::Empty(e) => {
                path.push(e.name().as_ref().to_vec());
                if matches!(state, State::Searching) && at_anchor(&path) {
                    let end = e.to_end().into_owned();
                    writer.write_event(Event::Start(e)).map_err(xml_err)?;
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(fragment)))
                        .map_err(xml_err)?;
                    writer.write_event(Event::End(end)).map_err(xml_err)?;
                    state = State::Done;
                } else {
                    writer.write_event(Event::Empty(e)).map_err(xml_err)?;
                }
                let _ = path.pop();
            }
            Event::End(e) => {
                let _ = path.pop();
                writer.write_event(Event::End(e)).map_err(xml_err)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }

    if !matches!(state, State::Done) {
        return Err(TransformError::MissingAnchor(format!("/{}", anchor.join("/"))));
    }
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

/// What the stages need to know about a template before rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateInfo {
    pub entries: BTreeSet<String>,
    /// Children of the body's `w:sectPr`, header/footer references removed.
    pub section_properties: Option<String>,
}

impl TemplateInfo {
    /// Entries under `word/`, relative to it.
    pub fn word_parts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.strip_prefix("word/"))
    }
}

fn is_section_reference(local: &[u8]) -> bool {
    local == b"headerReference" || local == b"footerReference"
}

// Copies the rest of the current `sectPr` element, leaving out its references.
fn section_children(reader: &mut Reader<&[u8]>) -> std::result::Result<String, TransformError> {
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut skip: Option<usize> = None;
    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match &event {
            Event::Start(e) => {
                if skip.is_none() && is_section_reference(e.local_name().as_ref()) {
                    skip = Some(depth);
                }
                depth += 1;
            }
            Event::End(_) if depth == 0 => break,
            Event::End(_) => {
                depth -= 1;
                if skip == Some(depth) {
                    skip = None;
                    continue;
                }
            }
            Event::Empty(e) if is_section_reference(e.local_name().as_ref()) => continue,
            Event::Eof => return Err(xml_err("unexpected end of document")),
            _ => {}
        }
        if skip.is_none() {
            writer.write_event(event).map_err(xml_err)?;
        }
    }
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

/// Page setup of the document body: the children of its last `w:sectPr`.
pub fn body_section_properties(xml: &str) -> std::result::Result<Option<String>, TransformError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut found = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"sectPr" && path.last().is_some_and(|p| p == b"body") {
                    found = Some(section_children(&mut reader)?);
                    continue;
                }
                path.push(local);
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"sectPr" && path.last().is_some_and(|p| p == b"body") {
                    found = Some(String::new());
                }
            }
            Event::End(_) => {
                let _ = path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

/// List the template's entries and read the body's page setup.
pub fn inspect<R: Read + Seek>(template: R) -> Result<TemplateInfo> {
    let mut archive = ZipArchive::new(template).map_err(zip_err("<archive>"))?;
    let entries: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
    let document = PartKind::Document.entry_name();
    let section_properties = match archive.index_for_name(document) {
        Some(index) => {
            let xml = read_text(&mut archive, index, document)?;
            body_section_properties(&xml).map_err(|e| Error::transform(document, INSPECT_STAGE, e))?
        }
        None => None,
    };
    Ok(TemplateInfo {
        entries,
        section_properties,
    })
}

fn fetch_all(manifest: &[ImageDescriptor], fetcher: &dyn ImageFetcher) -> Result<Vec<Vec<u8>>> {
    manifest
        .par_iter()
        .map(|image| {
            fetcher.fetch(&image.locator).map_err(|source| Error::ImageFetch {
                locator: image.locator.clone(),
                entry: image.media_path(),
                source,
            })
        })
        .collect()
}

// Rewritten entries keep their method when we can write it.
fn rewrite_options(method: CompressionMethod) -> SimpleFileOptions {
    let method = match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    SimpleFileOptions::default().compression_method(method)
}

fn read_text<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize, name: &str) -> Result<String> {
    let mut file = archive.by_index(index).map_err(zip_err(name))?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| Error::archive(name, format!("not valid UTF-8 text: {e}")))?;
    Ok(text)
}

fn read_bytes<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_index(index).map_err(zip_err(name))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    options: SimpleFileOptions,
    bytes: &[u8],
) -> Result<()> {
    writer.start_file(name, options).map_err(zip_err(name))?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Produce a new package from `template` with `replacements` applied and the
/// images in `manifest` appended under `word/media/`.
pub fn rewrite<R: Read + Seek>(
    template: R,
    replacements: &Replacements,
    manifest: &[ImageDescriptor],
    fetcher: &dyn ImageFetcher,
) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(template).map_err(zip_err("<archive>"))?;
    let names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();

    for required in REQUIRED_ENTRIES {
        if !names.contains(required) {
            return Err(Error::archive(required, "required entry missing from template"));
        }
    }
    for (kind, _) in replacements.iter() {
        if kind.anchor().is_some() && !names.contains(kind.entry_name()) {
            return Err(Error::archive(kind.entry_name(), "no such part in template to splice into"));
        }
    }

    // fetch before writing anything so a bad image fails fast
    let images = fetch_all(manifest, fetcher)?;
    let media: BTreeSet<String> = manifest.iter().map(ImageDescriptor::media_path).collect();
    let mut extensions: Vec<&str> = Vec::new();
    for image in manifest {
        if !extensions.contains(&image.extension.as_str()) {
            extensions.push(&image.extension);
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut written: BTreeSet<PartKind> = BTreeSet::new();

    for index in 0..archive.len() {
        let (name, is_dir, method) = {
            let entry = archive.by_index_raw(index).map_err(zip_err("<archive>"))?;
            (entry.name().to_string(), entry.is_dir(), entry.compression())
        };
        if is_dir {
            continue;
        }

        if let Some((kind, content)) = replacements.by_entry_name(&name) {
            let bytes = match kind.anchor() {
                Some(anchor) => {
                    let xml = read_text(&mut archive, index, &name)?;
                    splice(&xml, anchor, content).map_err(|e| Error::transform(name.as_str(), SPLICE_STAGE, e))?
                }
                None => content.to_string(),
            };
            write_entry(&mut writer, &name, rewrite_options(method), bytes.as_bytes())?;
            written.insert(kind);
            debug!("rewrote {name} ({} bytes)", bytes.len());
            continue;
        }

        if name == CONTENT_TYPES_ENTRY && !extensions.is_empty() {
            let raw = read_bytes(&mut archive, index, &name)?;
            let patched = content_types::patch(&raw, &extensions)?;
            write_entry(&mut writer, &name, rewrite_options(method), &patched)?;
            debug!("patched {name} for {}", extensions.join(", "));
            continue;
        }

        if media.contains(&name) {
            warn!("template entry {name} is replaced by a generated image");
            continue;
        }

        let entry = archive.by_index_raw(index).map_err(zip_err(&name))?;
        writer.raw_copy_file(entry).map_err(zip_err(&name))?;
        debug!("copied {name}");
    }

    for (kind, content) in replacements.iter() {
        if written.contains(&kind) {
            continue;
        }
        let name = kind.entry_name();
        write_entry(&mut writer, name, rewrite_options(CompressionMethod::Deflated), content.as_bytes())?;
        debug!("added {name}");
    }

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (image, bytes) in manifest.iter().zip(&images) {
        let name = image.media_path();
        write_entry(&mut writer, &name, stored, bytes)?;
        debug!("added {name} from {} ({} bytes)", image.locator, bytes.len());
    }

    let out = writer.finish().map_err(zip_err("<archive>"))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const DOCUMENT: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        "\n",
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        "\n  <w:body>\n    <w:p><w:r><w:t>old</w:t></w:r></w:p>\n  </w:body>\n</w:document>",
    );
    const CONTENT_TYPES: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="xml" ContentType="application/xml"/></Types>"#,
    );

    struct MapFetcher(BTreeMap<String, Vec<u8>>);

    impl ImageFetcher for MapFetcher {
        fn fetch(&self, locator: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.0
                .get(locator)
                .cloned()
                .ok_or_else(|| FetchError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, locator.to_string())))
        }
    }

    fn no_images() -> MapFetcher {
        MapFetcher(BTreeMap::new())
    }

    fn build(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory("word/", SimpleFileOptions::default()).unwrap();
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn template() -> Vec<u8> {
        build(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("word/document.xml", DOCUMENT),
            ("word/numbering.xml", "<w:numbering/>"),
            ("word/_rels/document.xml.rels", "<Relationships/>"),
            ("word/styles.xml", "<w:styles>keep me</w:styles>"),
            ("word/media/image1.png", "template image"),
        ])
    }

    fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    fn text(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut s = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    fn raw(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> (Vec<u8>, u32) {
        let index = archive.index_for_name(name).unwrap();
        let mut file = archive.by_index_raw(index).unwrap();
        let crc = file.crc32();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        (bytes, crc)
    }

    #[test]
    fn splices_into_the_anchor() {
        let out = splice(DOCUMENT, &["w:document", "w:body"], "<w:p>new</w:p>").unwrap();
        assert!(out.ends_with("<w:body><w:p>new</w:p></w:body></w:document>"));
        assert!(!out.contains("old"));
    }

    #[test]
    fn expands_an_empty_anchor() {
        let xml = r#"<w:hdr xmlns:w="urn:w"/>"#;
        assert_eq!(splice(xml, &["w:hdr"], "<w:p/>").unwrap(), r#"<w:hdr xmlns:w="urn:w"><w:p/></w:hdr>"#);
    }

    #[test]
    fn nested_elements_with_the_anchor_name_are_skipped_whole() {
        let xml = "<a><b><b>x</b></b><c/></a>";
        assert_eq!(splice(xml, &["a", "b"], "y").unwrap(), "<a><b>y</b><c/></a>");
    }

    #[test]
    fn missing_anchor_is_reported() {
        let err = splice("<w:ftr/>", &["w:hdr"], "x").unwrap_err();
        assert!(matches!(err, TransformError::MissingAnchor(ref a) if a == "/w:hdr"));
    }

    #[test]
    fn untouched_entries_are_byte_identical() {
        let input = template();
        let out = rewrite(Cursor::new(input.clone()), &Replacements::new(), &[], &no_images()).unwrap();

        let mut before = open(input);
        let mut after = open(out);
        for name in ["[Content_Types].xml", "word/document.xml", "word/styles.xml", "word/media/image1.png"] {
            assert_eq!(raw(&mut before, name), raw(&mut after, name), "{name}");
        }
        assert!(after.index_for_name("word/").is_none());
    }

    #[test]
    fn replaces_parts_and_appends_missing_whole_files() {
        let mut replacements = Replacements::new();
        replacements.insert(PartKind::Document, "<w:p>fresh</w:p>".into());
        replacements.insert(PartKind::Numbering, "<w:numbering>n</w:numbering>".into());
        replacements.insert(PartKind::HeaderRels, "<Relationships>h</Relationships>".into());

        let out = rewrite(Cursor::new(template()), &replacements, &[], &no_images()).unwrap();
        let mut archive = open(out);
        assert!(text(&mut archive, "word/document.xml").contains("<w:body><w:p>fresh</w:p></w:body>"));
        assert_eq!(text(&mut archive, "word/numbering.xml"), "<w:numbering>n</w:numbering>");
        assert_eq!(text(&mut archive, "word/_rels/header.xml.rels"), "<Relationships>h</Relationships>");
        assert_eq!(text(&mut archive, "word/styles.xml"), "<w:styles>keep me</w:styles>");
    }

    #[test]
    fn splicing_into_an_absent_part_fails() {
        let mut replacements = Replacements::new();
        replacements.insert(PartKind::Header, "<w:p/>".into());
        let err = rewrite(Cursor::new(template()), &replacements, &[], &no_images()).unwrap_err();
        assert!(matches!(err, Error::ArchiveIntegrity { ref entry, .. } if entry == "word/header.xml"));
    }

    #[test]
    fn missing_required_entry_fails() {
        let input = build(&[("[Content_Types].xml", CONTENT_TYPES), ("word/document.xml", DOCUMENT)]);
        let err = rewrite(Cursor::new(input), &Replacements::new(), &[], &no_images()).unwrap_err();
        assert!(matches!(err, Error::ArchiveIntegrity { ref entry, .. } if entry == "word/numbering.xml"));
    }

    #[test]
    fn appends_images_in_manifest_order_and_patches_content_types() {
        let manifest = vec![
            ImageDescriptor {
                filename: "image1.png".into(),
                locator: "a".into(),
                extension: "png".into(),
            },
            ImageDescriptor {
                filename: "image2.jpg".into(),
                locator: "b".into(),
                extension: "jpg".into(),
            },
        ];
        let fetcher = MapFetcher(BTreeMap::from([
            ("a".to_string(), b"AAA".to_vec()),
            ("b".to_string(), b"BBB".to_vec()),
        ]));

        let out = rewrite(Cursor::new(template()), &Replacements::new(), &manifest, &fetcher).unwrap();
        let mut archive = open(out);
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.iter().filter(|n| n.as_str() == "word/media/image1.png").count(), 1);

        let png = archive.by_name("word/media/image1.png").unwrap();
        assert_eq!(png.compression(), CompressionMethod::Stored);
        drop(png);
        assert_eq!(text(&mut archive, "word/media/image1.png"), "AAA");
        assert_eq!(text(&mut archive, "word/media/image2.jpg"), "BBB");

        let types = text(&mut archive, "[Content_Types].xml");
        assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
        assert!(types.contains(r#"<Default Extension="jpg" ContentType="image/jpeg"/>"#));
    }

    #[test]
    fn failed_fetch_aborts() {
        let manifest = vec![ImageDescriptor {
            filename: "image1.gif".into(),
            locator: "missing".into(),
            extension: "gif".into(),
        }];
        let err = rewrite(Cursor::new(template()), &Replacements::new(), &manifest, &no_images()).unwrap_err();
        assert!(
            matches!(err, Error::ImageFetch { ref locator, ref entry, .. } if locator == "missing" && entry == "word/media/image1.gif")
        );
    }

    #[test]
    fn reads_the_body_page_setup_without_references() {
        let xml = concat!(
            r#"<w:document xmlns:w="urn:w" xmlns:r="urn:r"><w:body><w:p/>"#,
            r#"<w:sectPr w:rsidR="1"><w:headerReference w:type="default" r:id="rId7"/>"#,
            r#"<w:pgSz w:w="11906" w:h="16838"/><w:footerReference r:id="rId8"></w:footerReference>"#,
            r#"<w:cols w:space="708"/></w:sectPr></w:body></w:document>"#,
        );
        assert_eq!(
            body_section_properties(xml).unwrap().as_deref(),
            Some(r#"<w:pgSz w:w="11906" w:h="16838"/><w:cols w:space="708"/>"#)
        );
    }

    #[test]
    fn paragraph_section_breaks_are_not_the_page_setup() {
        let xml = concat!(
            r#"<w:document xmlns:w="urn:w"><w:body><w:p><w:pPr>"#,
            r#"<w:sectPr><w:pgSz w:w="1"/></w:sectPr></w:pPr></w:p></w:body></w:document>"#,
        );
        assert_eq!(body_section_properties(xml).unwrap(), None);
    }

    #[test]
    fn inspect_lists_entries() {
        let info = inspect(Cursor::new(template())).unwrap();
        assert!(info.entries.contains("word/styles.xml"));
        assert!(info.word_parts().any(|p| p == "media/image1.png"));
        assert_eq!(info.section_properties, None);
    }
}
