//! Session descriptor parsing.
//!
//! A descriptor is a small XML document naming the session and the ordered
//! entries that make it up:
//!
//! ```xml
//! <Session id="session001">
//!   <Entry order="1" type="Sightings" file="a.dat"/>
//!   <Entry order="2" type="Elements" file="session001.txt" name="Elements.txt"/>
//! </Session>
//! ```
//!
//! Parsing is strict: a missing `id`, `order`, `type` or `file` is an error,
//! never a default. Unknown elements and attributes are ignored.
//!
//! Devices also leave their own `Info.xml`-style documents behind. With
//! [`ParseOptions::implicit`] set, a document whose root is not `Session` is
//! read as the device layout: `<stem>.txt` (Elements) followed by
//! `<stem>.dat` (Sightings).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SessionError;
use crate::locator::naming::{self, is_bare_file_name};
use crate::locator::{Located, PayloadFile, SessionFiles};

/// Root element of a descriptor.
pub const ROOT_ELEMENT: &str = "Session";
/// Entry element, a direct child of the root.
pub const ENTRY_ELEMENT: &str = "Entry";

/// Entry type written by devices for the element list.
pub const ELEMENTS_TYPE: &str = "Elements";
/// Entry type written by devices for the sightings database.
pub const SIGHTINGS_TYPE: &str = "Sightings";

/// Parser switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Interpret foreign XML documents by the device naming convention.
    pub implicit: bool,
}

/// One payload unit declared by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Declared position; entries are sorted by it.
    pub order: u32,
    /// Type tag, written into the container.
    pub tag: String,
    /// Source file name, resolved against the backup folder.
    pub file: String,
    /// Archive member name, if the descriptor gives one.
    pub name: Option<String>,
}

impl Entry {
    /// Name this entry takes inside a cabinet.
    #[must_use]
    pub fn member_name(&self) -> &str {
        if let Some(name) = &self.name {
            return name;
        }
        match self.tag.as_str() {
            ELEMENTS_TYPE => "Elements.txt",
            SIGHTINGS_TYPE => "Sightings.DAT",
            _ => &self.file,
        }
    }
}

/// A parsed descriptor.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier; names the output file.
    pub id: String,
    /// Path of the descriptor this was parsed from.
    pub descriptor_path: PathBuf,
    /// Raw descriptor bytes (packed into cabinets as `Info.xml`).
    pub descriptor: Vec<u8>,
    /// Entries in declared order.
    pub entries: Vec<Entry>,
}

/// An entry matched to a file in the backup folder.
#[derive(Debug, Clone)]
pub struct ResolvedEntry<'a> {
    pub entry: &'a Entry,
    pub file: &'a PayloadFile,
}

impl Session {
    /// Read and parse a descriptor file.
    pub fn from_file(path: &Path, options: ParseOptions) -> Result<Self, SessionError> {
        let bytes = fs::read(path)
            .map_err(|e| SessionError::malformed(path, format!("cannot read descriptor: {e}")))?;
        Self::parse(path, bytes, options)
    }

    /// Parse descriptor bytes. `path` supplies the expected session key and is
    /// used in error messages.
    pub fn parse(path: &Path, bytes: Vec<u8>, options: ParseOptions) -> Result<Self, SessionError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| SessionError::malformed(path, "descriptor has no file name"))?;

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| SessionError::malformed(path, format!("not valid UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let parsed = parse_document(path, text)?;

        let (id, entries) = match parsed {
            Document::Manifest { id, entries } => (id, entries),
            Document::Foreign { root } if options.implicit => {
                log::debug!(
                    "{}: <{}> root, using device naming convention",
                    path.display(),
                    root
                );
                (stem.clone(), implicit_entries(&stem))
            }
            Document::Foreign { root } => {
                return Err(SessionError::malformed(
                    path,
                    format!("expected <{ROOT_ELEMENT}> root element, found <{root}>"),
                ));
            }
        };

        if naming::normalize_key(&id) != naming::normalize_key(&stem) {
            return Err(SessionError::malformed(
                path,
                format!("session id '{id}' does not match file name '{stem}'"),
            ));
        }

        if entries.is_empty() {
            return Err(SessionError::MissingPayload(id));
        }

        Ok(Self {
            id,
            descriptor_path: path.to_path_buf(),
            descriptor: bytes,
            entries,
        })
    }

    /// Match every entry to a file of the session or the shared pool.
    ///
    /// The first entry that matches nothing fails the whole session.
    pub fn resolve<'a>(
        &'a self,
        located: &'a Located,
        files: &'a SessionFiles,
    ) -> Result<Vec<ResolvedEntry<'a>>, SessionError> {
        self.entries
            .iter()
            .map(|entry| {
                located
                    .resolve(files, &entry.file)
                    .map(|file| ResolvedEntry { entry, file })
                    .ok_or_else(|| SessionError::UnresolvedEntry {
                        order: entry.order,
                        file: entry.file.clone(),
                    })
            })
            .collect()
    }
}

enum Document {
    Manifest { id: String, entries: Vec<Entry> },
    Foreign { root: String },
}

fn parse_document(path: &Path, text: &str) -> Result<Document, SessionError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    // Names of the currently open elements, outermost first.
    let mut open: Vec<String> = Vec::new();
    let mut id: Option<String> = None;
    let mut entries: BTreeMap<u32, Entry> = BTreeMap::new();

    loop {
        let (element, has_children) = match reader.read_event() {
            Ok(Event::Start(e)) => (e, true),
            Ok(Event::Empty(e)) => (e, false),
            Ok(Event::End(_)) => {
                open.pop();
                continue;
            }
            Ok(Event::Eof) => {
                if let Some(unclosed) = open.last() {
                    return Err(SessionError::malformed(
                        path,
                        format!("unclosed <{unclosed}> element at end of document"),
                    ));
                }
                break;
            }
            // Whitespace is trimmed, so any text outside the root is content.
            Ok(Event::Text(_) | Event::CData(_)) if open.is_empty() => {
                return Err(SessionError::malformed(
                    path,
                    format!("text outside the root element at byte {}", reader.buffer_position()),
                ));
            }
            Ok(_) => continue,
            Err(e) => {
                return Err(SessionError::malformed(
                    path,
                    format!("XML error at byte {}: {e}", reader.error_position()),
                ));
            }
        };

        let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();

        match open.len() {
            0 if id.is_some() => {
                return Err(SessionError::malformed(path, "multiple root elements"));
            }
            0 if name != ROOT_ELEMENT => return Ok(Document::Foreign { root: name }),
            0 => id = Some(required(path, &element, "id", &name)?),
            1 if name == ENTRY_ELEMENT => {
                let entry = parse_entry(path, &element)?;
                if let Some(previous) = entries.get(&entry.order) {
                    return Err(SessionError::malformed(
                        path,
                        format!(
                            "entries '{}' and '{}' share order {}",
                            previous.file, entry.file, entry.order
                        ),
                    ));
                }
                entries.insert(entry.order, entry);
            }
            _ => log::trace!("{}: ignoring <{}>", path.display(), name),
        }

        if has_children {
            open.push(name);
        }
    }

    let id = id.ok_or_else(|| SessionError::malformed(path, "document has no root element"))?;
    Ok(Document::Manifest {
        id,
        entries: entries.into_values().collect(),
    })
}

fn parse_entry(path: &Path, element: &BytesStart<'_>) -> Result<Entry, SessionError> {
    let order_text = required(path, element, "order", ENTRY_ELEMENT)?;
    let order = order_text
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|order| *order > 0)
        .ok_or_else(|| {
            SessionError::malformed(
                path,
                format!("entry order '{order_text}' is not a positive integer"),
            )
        })?;

    let tag = required(path, element, "type", ENTRY_ELEMENT)?;
    let file = required(path, element, "file", ENTRY_ELEMENT)?;
    if !is_bare_file_name(&file) {
        return Err(SessionError::malformed(
            path,
            format!("entry #{order} file '{file}' must be a plain file name"),
        ));
    }

    let name = attribute(path, element, "name")?;
    if let Some(name) = &name {
        if !is_bare_file_name(name) {
            return Err(SessionError::malformed(
                path,
                format!("entry #{order} member name '{name}' must be a plain file name"),
            ));
        }
    }

    Ok(Entry {
        order,
        tag,
        file,
        name,
    })
}

/// A non-empty attribute that must be present.
fn required(
    path: &Path,
    element: &BytesStart<'_>,
    key: &str,
    element_name: &str,
) -> Result<String, SessionError> {
    attribute(path, element, key)?.ok_or_else(|| {
        SessionError::malformed(
            path,
            format!("<{element_name}> is missing required attribute '{key}'"),
        )
    })
}

/// An optional attribute; present-but-blank counts as missing.
fn attribute(
    path: &Path,
    element: &BytesStart<'_>,
    key: &str,
) -> Result<Option<String>, SessionError> {
    for attr in element.attributes() {
        let attr = attr
            .map_err(|e| SessionError::malformed(path, format!("bad attribute: {e}")))?;
        if attr.key.as_ref() != key.as_bytes() {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| SessionError::malformed(path, format!("bad value for '{key}': {e}")))?;
        let value = value.trim();
        return Ok((!value.is_empty()).then(|| value.to_string()));
    }
    Ok(None)
}

/// Entries implied by the device naming convention.
fn implicit_entries(stem: &str) -> Vec<Entry> {
    vec![
        Entry {
            order: 1,
            tag: ELEMENTS_TYPE.to_string(),
            file: format!("{stem}.txt"),
            name: Some("Elements.txt".to_string()),
        },
        Entry {
            order: 2,
            tag: SIGHTINGS_TYPE.to_string(),
            file: format!("{stem}.dat"),
            name: Some("Sightings.DAT".to_string()),
        },
    ]
}
