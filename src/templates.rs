// Template lookup and the built-in default template
//
// Named templates are `.docx` files searched in the custom directory first,
// then the stock one. Without a name we fall back to `default.docx`, and when
// that does not exist either, to a minimal package generated here.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::part::CONTENT_TYPES_ENTRY;
use crate::transform::numbering::NS_W;
use crate::transform::relations::NS_RELS;
use log::debug;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const EXTENSION: &str = ".docx";
pub const DEFAULT_TEMPLATE: &str = "default";

const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WML_CT: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml";

/// `name` with the `.docx` extension appended when it is missing.
pub fn file_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{EXTENSION}")
    }
}

/// Path of the named template, custom directory first.
pub fn resolve(config: &Config, name: &str) -> Result<PathBuf> {
    let file = file_name(name);
    let mut searched = Vec::new();
    for dir in config.template_dirs() {
        let candidate = dir.join(&file);
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }
    Err(Error::TemplateNotFound {
        name: file,
        searched,
    })
}

/// Template bytes for `name`, or the default template when `name` is `None`.
pub fn load(config: &Config, name: Option<&str>) -> Result<Vec<u8>> {
    match name {
        Some(name) => {
            let path = resolve(config, name)?;
            debug!("using template {}", path.display());
            Ok(std::fs::read(path)?)
        }
        None => match resolve(config, DEFAULT_TEMPLATE) {
            Ok(path) => {
                debug!("using default template {}", path.display());
                Ok(std::fs::read(path)?)
            }
            Err(Error::TemplateNotFound { .. }) => {
                debug!("no default template on disk, using the built-in one");
                builtin_template()
            }
            Err(e) => Err(e),
        },
    }
}

fn content_types_xml() -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push('\n');
    out.push_str(
        r#"  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    out.push('\n');
    out.push_str(r#"  <Default Extension="xml" ContentType="application/xml"/>"#);
    out.push('\n');
    for (part, kind) in [
        ("document", "document.main"),
        ("styles", "styles"),
        ("numbering", "numbering"),
        ("header", "header"),
        ("footer", "footer"),
    ] {
        out.push_str(&format!(
            r#"  <Override PartName="/word/{part}.xml" ContentType="{WML_CT}.{kind}+xml"/>"#
        ));
        out.push('\n');
    }
    out.push_str("</Types>");
    out
}

fn package_rels_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{NS_RELS}">
  <Relationship Id="rId1" Type="{NS_R}/officeDocument" Target="word/document.xml"/>
</Relationships>"#
    )
}

fn document_rels_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{NS_RELS}">
  <Relationship Id="rIdStyles" Type="{NS_R}/styles" Target="styles.xml"/>
  <Relationship Id="rIdNumbering" Type="{NS_R}/numbering" Target="numbering.xml"/>
</Relationships>"#
    )
}

fn document_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{NS_W}" xmlns:r="{NS_R}">
  <w:body/>
</w:document>"#
    )
}

fn section_xml(root: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:{root} xmlns:w="{NS_W}" xmlns:r="{NS_R}"/>"#
    )
}

fn numbering_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="{NS_W}"/>"#
    )
}

fn heading_style(level: u32) -> String {
    // half-points
    let size = match level {
        1 => 32,
        2 => 28,
        3 => 26,
        4 => 24,
        _ => 22,
    };
    let before = if level == 1 { 360 } else { 240 };
    format!(
        r#"
  <w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="{before}" w:after="120"/>
      <w:outlineLvl w:val="{outline}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="{size}"/>
    </w:rPr>
  </w:style>"#,
        outline = level - 1,
    )
}

fn styles_xml() -> String {
    let mut out = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{NS_W}">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>"#
    );
    for level in 1..=6 {
        out.push_str(&heading_style(level));
    }
    out.push_str(
        r#"
  <w:style w:type="paragraph" w:styleId="CodeBlock">
    <w:name w:val="Code Block"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="99"/>
    <w:qFormat/>
    <w:pPr>
      <w:spacing w:before="120" w:after="120"/>
    </w:pPr>
    <w:rPr>
      <w:rFonts w:ascii="Consolas" w:hAnsi="Consolas" w:cs="Consolas"/>
      <w:sz w:val="20"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Quote">
    <w:name w:val="Quote"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="29"/>
    <w:qFormat/>
    <w:pPr>
      <w:ind w:left="720" w:right="720"/>
    </w:pPr>
    <w:rPr>
      <w:i/>
      <w:color w:val="404040"/>
    </w:rPr>
  </w:style>
  <w:style w:type="character" w:styleId="Hyperlink">
    <w:name w:val="Hyperlink"/>
    <w:uiPriority w:val="99"/>
    <w:rPr>
      <w:color w:val="0563C1"/>
      <w:u w:val="single"/>
    </w:rPr>
  </w:style>
</w:styles>"#,
    );
    out
}

/// A minimal but complete package with empty body, header and footer parts.
pub fn builtin_template() -> Result<Vec<u8>> {
    let entries = [
        (CONTENT_TYPES_ENTRY, content_types_xml()),
        ("_rels/.rels", package_rels_xml()),
        ("word/document.xml", document_xml()),
        ("word/styles.xml", styles_xml()),
        ("word/numbering.xml", numbering_xml()),
        ("word/header.xml", section_xml("hdr")),
        ("word/footer.xml", section_xml("ftr")),
        ("word/_rels/document.xml.rels", document_rels_xml()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    for (name, body) in &entries {
        zip.start_file(*name, opts).map_err(|e| Error::archive(*name, e))?;
        zip.write_all(body.as_bytes())?;
    }
    let out = zip.finish().map_err(|e| Error::archive("<builtin>", e))?;
    Ok(out.into_inner())
}
