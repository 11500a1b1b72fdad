//! Container builder: packs a resolved session into `.ctx` bytes.
//!
//! Two layouts are supported:
//!
//! - [`packed`]: header, then a tag/length sub-header and raw bytes per entry.
//! - [`cabinet`]: an uncompressed Microsoft Cabinet holding the descriptor as
//!   `Info.xml` followed by each entry under its member name, which is what
//!   CyberTracker devices export.
//!
//! Building is pure: the same [`ContainerSession`] always yields the same
//! bytes, and every builder checks the final length against its declared
//! layout before returning.
//!
//! # Example
//!
//! ```
//! use ctxbuild::container::{Container, ContainerEntry, ContainerFormat, ContainerSession};
//!
//! let session = ContainerSession {
//!     id: "session001".into(),
//!     descriptor: b"<Session id=\"session001\"/>".to_vec(),
//!     entries: vec![ContainerEntry {
//!         tag: "Sightings".into(),
//!         member_name: "Sightings.DAT".into(),
//!         bytes: b"payload".to_vec(),
//!     }],
//! };
//!
//! let container = Container::build(&session, ContainerFormat::Packed).unwrap();
//! assert_eq!(&container.bytes[..4], b"CTXP");
//! ```

pub mod cabinet;
pub mod packed;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SessionError;
pub use cabinet::{build_cabinet, read_cabinet, CabinetMember, CAB_MAGIC};
pub use packed::{pack, unpack, Unpacked, UnpackedEntry, PACKED_MAGIC, PACKED_VERSION};

/// Member name of the descriptor inside a cabinet.
pub const DESCRIPTOR_MEMBER: &str = "Info.xml";

/// Output layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Header plus tagged, length-prefixed entries
    #[default]
    Packed,
    /// Uncompressed Microsoft Cabinet (device export layout)
    Cabinet,
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Packed => write!(f, "packed"),
            Self::Cabinet => write!(f, "cabinet"),
        }
    }
}

/// Errors decoding an existing container.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("unrecognized container format marker")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("container truncated at byte {offset}: {needed} more bytes expected")]
    Truncated { offset: usize, needed: usize },

    #[error("{0} unexpected bytes after the last entry")]
    TrailingBytes(usize),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("unsupported cabinet compression type {0:#06x}")]
    Compressed(u16),

    #[error("malformed cabinet: {0}")]
    Cabinet(String),
}

/// One entry ready to be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Type tag (packed layout)
    pub tag: String,
    /// Archive member name (cabinet layout)
    pub member_name: String,
    pub bytes: Vec<u8>,
}

/// A session with every entry loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSession {
    pub id: String,
    /// Raw descriptor document
    pub descriptor: Vec<u8>,
    /// Entries in declared order
    pub entries: Vec<ContainerEntry>,
}

/// An assembled container.
#[derive(Debug, Clone)]
pub struct Container {
    pub format: ContainerFormat,
    pub bytes: Vec<u8>,
    pub entry_count: usize,
}

impl Container {
    /// Assemble `session` in the given layout.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingPayload`] for a session without entries, and
    /// [`SessionError::IntegrityMismatch`] when the layout cannot represent
    /// the session or the assembled length disagrees with it.
    pub fn build(session: &ContainerSession, format: ContainerFormat) -> Result<Self, SessionError> {
        if session.entries.is_empty() {
            return Err(SessionError::MissingPayload(session.id.clone()));
        }

        let bytes = match format {
            ContainerFormat::Packed => pack(session)?,
            ContainerFormat::Cabinet => {
                let mut members: Vec<(&str, &[u8])> = Vec::with_capacity(session.entries.len() + 1);
                members.push((DESCRIPTOR_MEMBER, session.descriptor.as_slice()));
                members.extend(
                    session
                        .entries
                        .iter()
                        .map(|e| (e.member_name.as_str(), e.bytes.as_slice())),
                );
                build_cabinet(&members)?
            }
        };

        log::trace!(
            "Built {} container for '{}': {} bytes",
            format,
            session.id,
            bytes.len()
        );

        Ok(Self {
            format,
            bytes,
            entry_count: session.entries.len(),
        })
    }

    /// Hex SHA-256 of the container bytes.
    #[must_use]
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

/// One entry listed by [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectedEntry {
    /// Tag (packed) or member name (cabinet)
    pub name: String,
    pub size: u64,
}

/// Summary of an existing container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub format: ContainerFormat,
    /// Session id, for packed containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub entries: Vec<InspectedEntry>,
}

/// Decode a container of either layout, chosen by its format marker.
pub fn inspect(data: &[u8]) -> Result<Inspection, ReadError> {
    if data.starts_with(&CAB_MAGIC) {
        let members = read_cabinet(data)?;
        return Ok(Inspection {
            format: ContainerFormat::Cabinet,
            session: None,
            entries: members
                .into_iter()
                .map(|m| InspectedEntry {
                    size: m.bytes.len() as u64,
                    name: m.name,
                })
                .collect(),
        });
    }

    let unpacked = unpack(data)?;
    Ok(Inspection {
        format: ContainerFormat::Packed,
        session: Some(unpacked.id),
        entries: unpacked
            .entries
            .into_iter()
            .map(|e| InspectedEntry {
                size: e.bytes.len() as u64,
                name: e.tag,
            })
            .collect(),
    })
}
