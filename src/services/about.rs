//! About document (`About.xml`) parsing and rewriting.
//!
//! The document has a single `ModMetadata` root whose direct children carry the mod's
//! metadata (`Name`, `Author`, `Version`, `Description`, `Tags`, `WorkshopHandle`, ...).
//! Rewrites stream the original events through `quick_xml::Writer` and only replace the
//! content of the mirrored elements, so everything else (declaration, namespaces, comments,
//! sibling elements and their whitespace) is written back byte for byte.
//!
//! Files are written as UTF-8 with a byte-order mark; a leading BOM is ignored on read.

use crate::models::{ExportSettings, MirroredField, MirroredFields};
use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::io;
use thiserror::Error;

/// Required root element of the About document
pub const ABOUT_ROOT: &str = "ModMetadata";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Error, Debug)]
pub enum AboutError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed metadata document: {0}")]
    Malformed(String),

    #[error("Unexpected root element <{found}>, expected <ModMetadata>")]
    UnexpectedRoot { found: String },
}

/// A parsed About document that still holds its original text
#[derive(Debug, Clone)]
pub struct AboutDocument {
    text: String,
    children: Vec<(String, String)>,
}

impl AboutDocument {
    /// Parse document text, validating well-formedness and the root element
    pub fn parse(text: &str) -> Result<Self, AboutError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let children = scan_children(text)?;

        Ok(Self {
            text: text.to_string(),
            children,
        })
    }

    /// Read and parse the document at `path`; `Ok(None)` when the file does not exist
    pub fn load(path: &Utf8Path) -> Result<Option<Self>, AboutError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AboutError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AboutError::Malformed(format!("{} is not valid UTF-8: {}", path, e)))?;

        Self::parse(text).map(Some)
    }

    /// Write document text as UTF-8 with a byte-order mark
    pub fn write(path: &Utf8Path, text: &str) -> Result<(), AboutError> {
        let write_error = |source| AboutError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut bytes = Vec::with_capacity(UTF8_BOM.len() + text.len());
        bytes.extend_from_slice(UTF8_BOM);
        bytes.extend_from_slice(text.as_bytes());
        fs::write(path, bytes).map_err(write_error)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Concatenated text of the first direct child of the root named `name`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, value)| value.as_str())
    }

    /// Mirrored field values as written in the document, untrimmed; missing elements read as empty
    pub fn mirrored_fields(&self) -> MirroredFields {
        let mut fields = MirroredFields::default();
        for field in MirroredField::ALL {
            if let Some(value) = self.child_text(field.element_name()) {
                fields.set(field, value);
            }
        }
        fields
    }

    /// Render the document with the mirrored elements set to `fields`
    ///
    /// Existing elements keep their attributes and position; missing ones are appended
    /// at the end of the root. Nothing else in the document changes.
    pub fn render_with(&self, fields: &MirroredFields) -> Result<String, AboutError> {
        let mut reader = Reader::from_str(&self.text);
        let mut writer = Writer::new(Vec::with_capacity(self.text.len() + 64));
        let mut depth = 0usize;
        let mut replacing = false;
        let mut written: Vec<MirroredField> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed_at(reader.buffer_position(), e))?;

            if replacing {
                match event {
                    Event::Start(_) => depth += 1,
                    Event::End(end) => {
                        depth -= 1;
                        if depth == 1 {
                            replacing = false;
                            emit(&mut writer, Event::End(end))?;
                        }
                    }
                    Event::Eof => break,
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(start) if depth == 1 => {
                    depth += 1;
                    let target = unwritten_field(&start, &written);
                    emit(&mut writer, Event::Start(start))?;
                    if let Some(field) = target {
                        written.push(field);
                        emit(&mut writer, Event::Text(BytesText::new(fields.get(field))))?;
                        replacing = true;
                    }
                }
                Event::Start(start) => {
                    depth += 1;
                    emit(&mut writer, Event::Start(start))?;
                }
                Event::Empty(empty) if depth == 0 => {
                    // Self-closing root: open it so the mirrored elements fit inside
                    let end_name = qualified_name(&empty);
                    emit(&mut writer, Event::Start(empty))?;
                    emit(&mut writer, Event::Text(BytesText::new("\n")))?;
                    append_missing(&mut writer, fields, &written)?;
                    emit(&mut writer, Event::End(BytesEnd::new(end_name)))?;
                }
                Event::Empty(empty) if depth == 1 => match unwritten_field(&empty, &written) {
                    Some(field) => {
                        written.push(field);
                        let end_name = qualified_name(&empty);
                        emit(&mut writer, Event::Start(empty))?;
                        emit(&mut writer, Event::Text(BytesText::new(fields.get(field))))?;
                        emit(&mut writer, Event::End(BytesEnd::new(end_name)))?;
                    }
                    None => emit(&mut writer, Event::Empty(empty))?,
                },
                Event::End(end) => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        AboutError::Malformed("unbalanced closing element".to_string())
                    })?;
                    if depth == 0 {
                        append_missing(&mut writer, fields, &written)?;
                        written.extend(MirroredField::ALL);
                    }
                    emit(&mut writer, Event::End(end))?;
                }
                Event::Eof => break,
                other => emit(&mut writer, other)?,
            }
        }

        if replacing || depth != 0 {
            return Err(AboutError::Malformed(
                "document ended inside an element".to_string(),
            ));
        }

        String::from_utf8(writer.into_inner())
            .map_err(|e| AboutError::Malformed(format!("rewritten document is not UTF-8: {}", e)))
    }
}

/// Text of a fresh About document for `settings`
pub fn default_document(settings: &ExportSettings) -> String {
    let description = if settings.description.trim().is_empty() {
        "Stationeers mod"
    } else {
        settings.description.as_str()
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ModMetadata xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Name>{}</Name>
  <Author>{}</Author>
  <Version>{}</Version>
  <Description>{}</Description>
  <WorkshopHandle>0</WorkshopHandle>
  <Tags>
    <Tag>LaunchPad</Tag>
  </Tags>
</ModMetadata>
"#,
        escape(settings.name.as_str()),
        escape(settings.author.as_str()),
        escape(settings.version.as_str()),
        escape(description),
    )
}

/// Create the About document at `path` unless one already exists
///
/// Returns true when a new document was written.
pub fn create_default(path: &Utf8Path, settings: &ExportSettings) -> Result<bool, AboutError> {
    if path.exists() {
        tracing::debug!("About document already exists at {}", path);
        return Ok(false);
    }

    AboutDocument::write(path, &default_document(settings))?;
    tracing::info!("Created default About document at {}", path);
    Ok(true)
}

/// Collect `(name, text)` of the root's direct children, checking structure on the way
fn scan_children(text: &str) -> Result<Vec<(String, String)>, AboutError> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut current: Option<(String, String)> = None;
    let mut children = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed_at(reader.buffer_position(), e))?;

        match event {
            Event::Start(start) => {
                let name = local_name(&start);
                match depth {
                    0 => check_root(&name, &mut root_seen)?,
                    1 => current = Some((name, String::new())),
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(empty) => {
                let name = local_name(&empty);
                match depth {
                    0 => check_root(&name, &mut root_seen)?,
                    1 => children.push((name, String::new())),
                    _ => {}
                }
            }
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    AboutError::Malformed("unbalanced closing element".to_string())
                })?;
                if depth == 1 {
                    if let Some(child) = current.take() {
                        children.push(child);
                    }
                }
            }
            Event::Text(text) if depth >= 2 => {
                let value = text
                    .unescape()
                    .map_err(|e| malformed_at(reader.buffer_position(), e))?;
                if let Some((_, buffer)) = current.as_mut() {
                    buffer.push_str(&value);
                }
            }
            Event::CData(data) if depth >= 2 => {
                if let Some((_, buffer)) = current.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(AboutError::Malformed(
            "document ended inside an element".to_string(),
        ));
    }
    if !root_seen {
        return Err(AboutError::Malformed(
            "document has no root element".to_string(),
        ));
    }

    Ok(children)
}

fn check_root(name: &str, root_seen: &mut bool) -> Result<(), AboutError> {
    if *root_seen {
        return Err(AboutError::Malformed(
            "document has more than one root element".to_string(),
        ));
    }
    if name != ABOUT_ROOT {
        return Err(AboutError::UnexpectedRoot {
            found: name.to_string(),
        });
    }
    *root_seen = true;
    Ok(())
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn qualified_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn unwritten_field(start: &BytesStart<'_>, written: &[MirroredField]) -> Option<MirroredField> {
    let name = start.local_name();
    MirroredField::ALL
        .into_iter()
        .find(|field| field.element_name().as_bytes() == name.as_ref())
        .filter(|field| !written.contains(field))
}

fn append_missing(
    writer: &mut Writer<Vec<u8>>,
    fields: &MirroredFields,
    written: &[MirroredField],
) -> Result<(), AboutError> {
    for field in MirroredField::ALL {
        if written.contains(&field) {
            continue;
        }
        let name = field.element_name();
        emit(writer, Event::Text(BytesText::new("  ")))?;
        emit(writer, Event::Start(BytesStart::new(name)))?;
        emit(writer, Event::Text(BytesText::new(fields.get(field))))?;
        emit(writer, Event::End(BytesEnd::new(name)))?;
        emit(writer, Event::Text(BytesText::new("\n")))?;
    }
    Ok(())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), AboutError> {
    writer
        .write_event(event)
        .map_err(|e| AboutError::Malformed(format!("failed to write event: {}", e)))
}

fn malformed_at(position: impl std::fmt::Display, error: impl std::fmt::Display) -> AboutError {
    AboutError::Malformed(format!("{} (at byte {})", error, position))
}
