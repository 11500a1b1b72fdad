//! Microsoft Cabinet layout, as produced by the CyberTracker device export.
//!
//! Only what a `.ctx` needs is written: one cabinet, one uncompressed folder,
//! no reserved areas, no spanning. Data blocks carry a zero checksum, which
//! readers treat as "not computed". Every member gets the DOS epoch as its
//! timestamp so the same input always produces the same bytes.
//!
//! The reader also accepts MSZIP folders, which is what devices write: every
//! data block is `CK` followed by a raw deflate stream whose dictionary is
//! the previous 32 KiB of folder output.
//!
//! ```text
//! CFHEADER   36 bytes   "MSCF", cbCabinet, coffFiles, version 1.3, counts
//! CFFOLDER    8 bytes   coffCabStart, cCFData, typeCompress = 0
//! CFFILE     16 bytes + NUL-terminated name, per member
//! CFDATA      8 bytes + up to 32 768 data bytes, per block
//! ```

use std::collections::HashSet;

use flate2::{Decompress, FlushDecompress, Status};

use super::packed::Cursor;
use super::ReadError;
use crate::error::SessionError;

/// Format marker at offset 0.
pub const CAB_MAGIC: [u8; 4] = *b"MSCF";
pub const CAB_VERSION_MINOR: u8 = 3;
pub const CAB_VERSION_MAJOR: u8 = 1;
pub const CFHEADER_LEN: usize = 36;
pub const CFFOLDER_LEN: usize = 8;
pub const CFFILE_FIXED_LEN: usize = 16;
pub const CFDATA_HEADER_LEN: usize = 8;
/// Largest uncompressed payload of one CFDATA block.
pub const MAX_BLOCK_LEN: usize = 0x8000;

/// 1980-01-01 in DOS date format.
const DOS_DATE_EPOCH: u16 = (1 << 5) | 1;
const ATTRIB_ARCHIVE: u16 = 0x20;
const ATTRIB_NAME_IS_UTF: u16 = 0x80;
const TYPE_COMPRESS_NONE: u16 = 0;
const TYPE_COMPRESS_MSZIP: u16 = 1;
const MSZIP_SIGNATURE: [u8; 2] = *b"CK";
/// Longest member name, excluding the NUL terminator.
pub const MAX_NAME_LEN: usize = 255;

/// One file stored in a cabinet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Build a stored cabinet holding `members` in order.
pub fn build_cabinet(members: &[(&str, &[u8])]) -> Result<Vec<u8>, SessionError> {
    let file_count = u16::try_from(members.len()).map_err(|_| {
        SessionError::IntegrityMismatch(format!("{} members exceed the cabinet file limit", members.len()))
    })?;

    let mut seen = HashSet::new();
    for (name, _) in members {
        if name.is_empty() || name.contains('\0') {
            return Err(SessionError::IntegrityMismatch(format!("invalid member name '{name}'")));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SessionError::IntegrityMismatch(format!(
                "member name '{name}' is {} bytes, cabinets allow {MAX_NAME_LEN}",
                name.len()
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(SessionError::IntegrityMismatch(format!(
                "member name '{name}' appears twice"
            )));
        }
    }

    let stream: Vec<u8> = members.iter().map(|(_, bytes)| *bytes).collect::<Vec<_>>().concat();
    let block_count = u16::try_from(stream.len().div_ceil(MAX_BLOCK_LEN)).map_err(|_| {
        SessionError::IntegrityMismatch(format!("{} bytes need more than {} data blocks", stream.len(), u16::MAX))
    })?;

    let coff_files = CFHEADER_LEN + CFFOLDER_LEN;
    let file_table_len: usize = members
        .iter()
        .map(|(name, _)| CFFILE_FIXED_LEN + name.len() + 1)
        .sum();
    let coff_cab_start = coff_files + file_table_len;
    let expected = coff_cab_start + usize::from(block_count) * CFDATA_HEADER_LEN + stream.len();
    let total = u32::try_from(expected).map_err(|_| {
        SessionError::IntegrityMismatch(format!("cabinet of {expected} bytes exceeds 4 GiB"))
    })?;

    let mut buf = Vec::with_capacity(expected);

    // CFHEADER
    buf.extend_from_slice(&CAB_MAGIC);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&total.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&(coff_files as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(CAB_VERSION_MINOR);
    buf.push(CAB_VERSION_MAJOR);
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&file_count.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // flags
    buf.extend_from_slice(&0u16.to_le_bytes()); // setID
    buf.extend_from_slice(&0u16.to_le_bytes()); // iCabinet

    // CFFOLDER
    buf.extend_from_slice(&(coff_cab_start as u32).to_le_bytes());
    buf.extend_from_slice(&block_count.to_le_bytes());
    buf.extend_from_slice(&TYPE_COMPRESS_NONE.to_le_bytes());

    // CFFILE
    let mut folder_offset = 0u32;
    for (name, bytes) in members {
        let attribs = if name.is_ascii() {
            ATTRIB_ARCHIVE
        } else {
            ATTRIB_ARCHIVE | ATTRIB_NAME_IS_UTF
        };
        // bytes.len() <= stream.len() < u32::MAX, checked above
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&folder_offset.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // iFolder
        buf.extend_from_slice(&DOS_DATE_EPOCH.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // time
        buf.extend_from_slice(&attribs.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        folder_offset += bytes.len() as u32;
    }

    // CFDATA
    for block in stream.chunks(MAX_BLOCK_LEN) {
        let len = block.len() as u16;
        buf.extend_from_slice(&0u32.to_le_bytes()); // csum
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(block);
    }

    if buf.len() != expected {
        return Err(SessionError::IntegrityMismatch(format!(
            "cabinet is {} bytes, layout declares {}",
            buf.len(),
            expected
        )));
    }
    Ok(buf)
}

/// List the members of a stored or MSZIP cabinet.
pub fn read_cabinet(data: &[u8]) -> Result<Vec<CabinetMember>, ReadError> {
    let mut header = Cursor::new(data);
    if header.take(4)? != CAB_MAGIC {
        return Err(ReadError::BadMagic);
    }
    header.take(4)?;
    let declared = header.u32()? as usize;
    header.take(4)?;
    let coff_files = header.u32()? as usize;
    header.take(4)?;
    let minor = header.u8()?;
    let major = header.u8()?;
    if major != CAB_VERSION_MAJOR || minor != CAB_VERSION_MINOR {
        return Err(ReadError::UnsupportedVersion(u16::from_le_bytes([minor, major])));
    }
    let folder_count = header.u16()?;
    let file_count = header.u16()?;
    let flags = header.u16()?;
    header.take(4)?;
    if flags != 0 {
        return Err(ReadError::Cabinet(format!(
            "flags {flags:#06x} (reserved areas or spanning) are not supported"
        )));
    }

    if declared > data.len() {
        return Err(ReadError::Truncated {
            offset: data.len(),
            needed: declared - data.len(),
        });
    }
    if declared < data.len() {
        return Err(ReadError::TrailingBytes(data.len() - declared));
    }

    let mut folders = Vec::with_capacity(usize::from(folder_count));
    for _ in 0..folder_count {
        let start = header.u32()? as usize;
        let blocks = header.u16()?;
        let compression = header.u16()?;
        let mut inflater = match compression & 0x000f {
            TYPE_COMPRESS_NONE => None,
            TYPE_COMPRESS_MSZIP => Some(Decompress::new(false)),
            _ => return Err(ReadError::Compressed(compression)),
        };

        let mut block_cursor = Cursor::at(data, start);
        let mut folder = Vec::new();
        for index in 0..blocks {
            block_cursor.take(4)?;
            let packed_len = usize::from(block_cursor.u16()?);
            let unpacked_len = usize::from(block_cursor.u16()?);
            let block = block_cursor.take(packed_len)?;
            match inflater.as_mut() {
                None => folder.extend_from_slice(block),
                Some(inflater) => inflate_block(inflater, block, unpacked_len, &mut folder)
                    .map_err(|reason| ReadError::Cabinet(format!("data block {index}: {reason}")))?,
            }
        }
        folders.push(folder);
    }

    let mut files = Cursor::at(data, coff_files);
    let mut members = Vec::with_capacity(usize::from(file_count));
    for _ in 0..file_count {
        let size = files.u32()? as usize;
        let offset = files.u32()? as usize;
        let folder_index = usize::from(files.u16()?);
        files.take(4)?;
        let attribs = files.u16()?;

        let name_start = files.offset;
        while files.u8()? != 0 {}
        let raw_name = &data[name_start..files.offset - 1];
        let name = if attribs & ATTRIB_NAME_IS_UTF != 0 {
            String::from_utf8(raw_name.to_vec()).map_err(|_| ReadError::InvalidUtf8("member name"))?
        } else {
            String::from_utf8_lossy(raw_name).into_owned()
        };

        let folder = folders.get(folder_index).ok_or_else(|| {
            ReadError::Cabinet(format!("member '{name}' refers to missing folder {folder_index}"))
        })?;
        let bytes = offset
            .checked_add(size)
            .and_then(|end| folder.get(offset..end))
            .ok_or_else(|| ReadError::Cabinet(format!("member '{name}' lies outside its folder")))?
            .to_vec();
        members.push(CabinetMember { name, bytes });
    }

    Ok(members)
}

/// Inflate one MSZIP block onto the end of `folder`.
fn inflate_block(
    inflater: &mut Decompress,
    block: &[u8],
    unpacked_len: usize,
    folder: &mut Vec<u8>,
) -> Result<(), String> {
    let deflated = block
        .strip_prefix(&MSZIP_SIGNATURE[..])
        .ok_or("missing MSZIP signature")?;

    inflater.reset(false);
    if !folder.is_empty() {
        let window = &folder[folder.len().saturating_sub(MAX_BLOCK_LEN)..];
        inflater.set_dictionary(window).map_err(|e| e.to_string())?;
    }

    let start = folder.len();
    // One spare byte so an overlong block shows up as extra output.
    folder.reserve_exact(unpacked_len + 1);
    let status = inflater
        .decompress_vec(deflated, folder, FlushDecompress::Finish)
        .map_err(|e| e.to_string())?;
    let produced = folder.len() - start;
    if status != Status::StreamEnd && produced <= unpacked_len {
        return Err(format!("deflate stream ends early after {produced} bytes"));
    }
    if produced != unpacked_len {
        return Err(format!("inflates to {produced} bytes, header declares {unpacked_len}"));
    }
    Ok(())
}
