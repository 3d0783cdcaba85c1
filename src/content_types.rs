// [Content_Types].xml patching
//
// Adds a `Default` declaration for every media extension the package gains.
// Existing declarations (matched case-insensitively) are left alone.

use crate::error::{Error, Result};
use crate::part::CONTENT_TYPES_ENTRY;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeSet;

/// MIME type declared for an image extension.
pub fn content_type_for(extension: &str) -> String {
    let ext = extension.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" => "image/jpeg".to_string(),
        _ => format!("image/{ext}"),
    }
}

fn malformed(e: impl ToString) -> Error {
    Error::archive(CONTENT_TYPES_ENTRY, e)
}

fn is_default(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == b"Default"
}

fn is_types(name: &[u8]) -> bool {
    name == b"Types" || name.ends_with(b":Types")
}

fn existing_extensions(raw: &[u8]) -> Result<BTreeSet<String>> {
    let mut reader = Reader::from_reader(raw);
    let mut found = BTreeSet::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if is_default(&e) => {
                for attr in e.attributes() {
                    let attr = attr.map_err(malformed)?;
                    if attr.key.as_ref() == b"Extension" {
                        let value = attr.unescape_value().map_err(malformed)?;
                        found.insert(value.to_ascii_lowercase());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

fn write_defaults<W: std::io::Write>(writer: &mut Writer<W>, missing: &[String]) -> Result<()> {
    for ext in missing {
        let content_type = content_type_for(ext);
        let decl = BytesStart::new("Default")
            .with_attributes([("Extension", ext.as_str()), ("ContentType", content_type.as_str())]);
        writer.write_event(Event::Empty(decl)).map_err(malformed)?;
    }
    Ok(())
}

/// Declare every extension in `required` that the content types part lacks.
pub fn patch(raw: &[u8], required: &[&str]) -> Result<Vec<u8>> {
    if required.is_empty() {
        return Ok(raw.to_vec());
    }

    let existing = existing_extensions(raw)?;
    let mut missing: Vec<String> = Vec::new();
    for ext in required {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !existing.contains(&ext) && !missing.contains(&ext) {
            missing.push(ext);
        }
    }
    if missing.is_empty() {
        return Ok(raw.to_vec());
    }

    let mut reader = Reader::from_reader(raw);
    let mut writer = Writer::new(Vec::with_capacity(raw.len() + missing.len() * 80));
    let mut patched = false;
    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Empty(e) if !patched && is_types(e.name().as_ref()) => {
                let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                writer.write_event(Event::Start(e)).map_err(malformed)?;
                write_defaults(&mut writer, &missing)?;
                writer.write_event(Event::End(end)).map_err(malformed)?;
                patched = true;
            }
            Event::End(e) if !patched && is_types(e.name().as_ref()) => {
                write_defaults(&mut writer, &missing)?;
                writer.write_event(Event::End(e)).map_err(malformed)?;
                patched = true;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(malformed)?,
        }
    }
    if !patched {
        return Err(malformed("missing <Types> root"));
    }
    Ok(writer.into_inner())
}
