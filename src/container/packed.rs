//! Packed container layout.
//!
//! ```text
//! Header (little-endian):
//! - magic        "CTXP"        4 bytes
//! - version      u16           2 bytes
//! - entry_count  u32           4 bytes
//! - id_len       u16           2 bytes
//! - id           UTF-8         id_len bytes
//!
//! Then, per entry in declared order:
//! - tag_len      u16           2 bytes
//! - tag          UTF-8         tag_len bytes
//! - payload_len  u64           8 bytes
//! - payload                    payload_len bytes
//! ```
//!
//! The buffer length always equals `header_len + Σ(entry_header_len + payload_len)`;
//! [`pack`] checks this before handing the buffer back.

use super::{ContainerSession, ReadError};
use crate::error::SessionError;

/// Format marker at offset 0.
pub const PACKED_MAGIC: [u8; 4] = *b"CTXP";
/// Layout version written by [`pack`].
pub const PACKED_VERSION: u16 = 1;
/// Header bytes before the session id.
pub const FIXED_HEADER_LEN: usize = 12;
/// Entry header bytes before the tag.
pub const ENTRY_FIXED_LEN: usize = 10;

/// An entry decoded from a packed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub tag: String,
    pub bytes: Vec<u8>,
}

/// A decoded packed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub version: u16,
    pub id: String,
    pub entries: Vec<UnpackedEntry>,
}

/// Header length for a session id.
#[must_use]
pub fn header_len(id: &str) -> usize {
    FIXED_HEADER_LEN + id.len()
}

/// Sub-header length for an entry tag.
#[must_use]
pub fn entry_header_len(tag: &str) -> usize {
    ENTRY_FIXED_LEN + tag.len()
}

/// Total container length, or `None` on overflow.
#[must_use]
pub fn packed_len(session: &ContainerSession) -> Option<usize> {
    session.entries.iter().try_fold(header_len(&session.id), |acc, entry| {
        acc.checked_add(entry_header_len(&entry.tag))?
            .checked_add(entry.bytes.len())
    })
}

/// Serialize a session into the packed layout.
pub fn pack(session: &ContainerSession) -> Result<Vec<u8>, SessionError> {
    let id_len = u16::try_from(session.id.len()).map_err(|_| {
        SessionError::IntegrityMismatch(format!(
            "session id is {} bytes, the header allows {}",
            session.id.len(),
            u16::MAX
        ))
    })?;
    let count = u32::try_from(session.entries.len()).map_err(|_| {
        SessionError::IntegrityMismatch(format!("{} entries exceed the header count field", session.entries.len()))
    })?;
    let expected = packed_len(session)
        .ok_or_else(|| SessionError::IntegrityMismatch("container size overflows".into()))?;

    let mut buf = Vec::with_capacity(expected);
    buf.extend_from_slice(&PACKED_MAGIC);
    buf.extend_from_slice(&PACKED_VERSION.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&id_len.to_le_bytes());
    buf.extend_from_slice(session.id.as_bytes());

    for entry in &session.entries {
        let tag_len = u16::try_from(entry.tag.len()).map_err(|_| {
            SessionError::IntegrityMismatch(format!(
                "entry tag '{}…' is longer than {} bytes",
                entry.tag.chars().take(16).collect::<String>(),
                u16::MAX
            ))
        })?;
        buf.extend_from_slice(&tag_len.to_le_bytes());
        buf.extend_from_slice(entry.tag.as_bytes());
        buf.extend_from_slice(&(entry.bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&entry.bytes);
    }

    if buf.len() != expected {
        return Err(SessionError::IntegrityMismatch(format!(
            "packed {} bytes, layout declares {}",
            buf.len(),
            expected
        )));
    }
    Ok(buf)
}

/// Decode a packed container, validating every declared length.
pub fn unpack(data: &[u8]) -> Result<Unpacked, ReadError> {
    let mut cursor = Cursor::new(data);

    if cursor.take(4)? != PACKED_MAGIC {
        return Err(ReadError::BadMagic);
    }
    let version = cursor.u16()?;
    if version != PACKED_VERSION {
        return Err(ReadError::UnsupportedVersion(version));
    }
    let count = cursor.u32()?;
    let id_len = usize::from(cursor.u16()?);
    let id = cursor.utf8(id_len, "session id")?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let tag_len = usize::from(cursor.u16()?);
        let tag = cursor.utf8(tag_len, "entry tag")?;
        let len = usize::try_from(cursor.u64()?).map_err(|_| ReadError::Truncated {
            offset: cursor.offset,
            needed: usize::MAX,
        })?;
        let bytes = cursor.take(len)?.to_vec();
        entries.push(UnpackedEntry { tag, bytes });
    }

    if cursor.remaining() > 0 {
        return Err(ReadError::TrailingBytes(cursor.remaining()));
    }

    Ok(Unpacked {
        version,
        id,
        entries,
    })
}

/// Bounds-checked little-endian reader.
pub(super) struct Cursor<'a> {
    data: &'a [u8],
    pub(super) offset: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(super) fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(super) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub(super) fn take(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ReadError::Truncated {
                offset: self.offset,
                needed: len,
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(super) fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.array::<1>()?[0])
    }

    pub(super) fn u16(&mut self) -> Result<u16, ReadError> {
        self.array().map(u16::from_le_bytes)
    }

    pub(super) fn u32(&mut self) -> Result<u32, ReadError> {
        self.array().map(u32::from_le_bytes)
    }

    pub(super) fn u64(&mut self) -> Result<u64, ReadError> {
        self.array().map(u64::from_le_bytes)
    }

    fn utf8(&mut self, len: usize, field: &'static str) -> Result<String, ReadError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReadError::InvalidUtf8(field))
    }
}
