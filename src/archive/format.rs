// Package container header, entry table and trailer.
//
// Layout (integers are varints unless noted):
//
//   magic "PKG\0" (4 bytes) | format version (1 byte) | flags (1 byte)
//   compressor id (1 byte)
//   [DELTA: base_release, removed_count, removed paths...]
//   meta_len, meta JSON
//   payload blobs, in entry table order
//   entry table: count, then per entry path, size, stored_len, offset, sha256
//   trailer: table offset (8 bytes big-endian) | magic
//
// The table sits after the payload so entries can be streamed out without
// knowing their compressed sizes up front.

use std::io::{self, Read, Write};

use bitflags::bitflags;

use super::varint;
use super::{ContentId, DeltaInfo};
use crate::error::ArchiveError;

pub const MAGIC: [u8; 4] = *b"PKG\0";
pub const FORMAT_VERSION: u8 = 1;

/// Trailer: table offset + magic.
pub const TRAILER_LEN: u64 = 8 + MAGIC.len() as u64;

/// Upper bound on the metadata JSON.
pub const MAX_META_LEN: usize = 16 * 1024 * 1024;

/// Smallest possible encoded table entry: 1-byte path length + 1-byte path
/// + three 1-byte varints + 32-byte hash.
const MIN_TABLE_ENTRY_LEN: u64 = 1 + 1 + 3 + 32;

bitflags! {
    /// Header indicator bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// The archive is a delta; a `DeltaInfo` section follows.
        const DELTA = 1 << 0;
    }
}

fn invalid(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::Invalid(msg.into())
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed archive header.
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub compression_id: u8,
    pub delta: Option<DeltaInfo>,
    /// Raw metadata JSON.
    pub meta: Vec<u8>,
}

impl ArchiveHeader {
    pub fn flags(&self) -> HeaderFlags {
        if self.delta.is_some() {
            HeaderFlags::DELTA
        } else {
            HeaderFlags::empty()
        }
    }

    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&MAGIC)?;
        w.write_all(&[FORMAT_VERSION, self.flags().bits(), self.compression_id])?;

        if let Some(ref delta) = self.delta {
            varint::write_u64(w, delta.base_release)?;
            varint::write_usize(w, delta.removed.len())?;
            for path in &delta.removed {
                varint::write_bytes(w, path.as_bytes())?;
            }
        }

        varint::write_bytes(w, &self.meta)
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, ArchiveError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(invalid(format!(
                "bad magic: expected {:02X?}, got {magic:02X?}",
                MAGIC
            )));
        }

        let mut fixed = [0u8; 3];
        r.read_exact(&mut fixed)?;
        let [version, flag_bits, compression_id] = fixed;
        if version != FORMAT_VERSION {
            return Err(ArchiveError::Unsupported(format!(
                "format version {version}"
            )));
        }
        let flags = HeaderFlags::from_bits(flag_bits)
            .ok_or_else(|| invalid(format!("invalid header flags: {flag_bits:#04X}")))?;

        let delta = if flags.contains(HeaderFlags::DELTA) {
            let base_release = varint::read_u64(r)?;
            let count = varint::read_usize(r)?;
            let mut removed = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                removed.push(varint::read_string(r)?);
            }
            Some(DeltaInfo {
                base_release,
                removed,
            })
        } else {
            None
        };

        let meta = varint::read_bytes(r, MAX_META_LEN)?;

        Ok(Self {
            compression_id,
            delta,
            meta,
        })
    }
}

// ---------------------------------------------------------------------------
// Entry table
// ---------------------------------------------------------------------------

/// Location and identity of one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub path: String,
    /// Uncompressed size.
    pub size: u64,
    /// Bytes on disk; equal to `size` when stored raw.
    pub stored_len: u64,
    /// Absolute offset of the stored bytes.
    pub offset: u64,
    pub content_id: ContentId,
}

impl TableEntry {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        varint::write_bytes(w, self.path.as_bytes())?;
        varint::write_u64(w, self.size)?;
        varint::write_u64(w, self.stored_len)?;
        varint::write_u64(w, self.offset)?;
        w.write_all(&self.content_id.0)
    }

    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, ArchiveError> {
        let path = varint::read_string(r)?;
        let size = varint::read_u64(r)?;
        let stored_len = varint::read_u64(r)?;
        let offset = varint::read_u64(r)?;
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash)?;
        Ok(Self {
            path,
            size,
            stored_len,
            offset,
            content_id: ContentId(hash),
        })
    }
}

/// Write the entry table followed by the trailer.
pub fn encode_table<W: Write + ?Sized>(
    w: &mut W,
    entries: &[TableEntry],
    table_offset: u64,
) -> io::Result<()> {
    varint::write_usize(w, entries.len())?;
    for entry in entries {
        entry.encode(w)?;
    }
    w.write_all(&table_offset.to_be_bytes())?;
    w.write_all(&MAGIC)
}

/// Parse the trailer (the last `TRAILER_LEN` bytes). Returns the table offset.
pub fn decode_trailer(trailer: &[u8; TRAILER_LEN as usize]) -> Result<u64, ArchiveError> {
    let (offset, magic) = trailer.split_at(8);
    if magic != MAGIC {
        return Err(invalid("bad trailer magic"));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(offset);
    Ok(u64::from_be_bytes(be))
}

/// Parse the entry table and check it against the payload region
/// `[payload_start, table_offset)`.
pub fn decode_table<R: Read + ?Sized>(
    r: &mut R,
    payload_start: u64,
    table_offset: u64,
    table_len: u64,
) -> Result<Vec<TableEntry>, ArchiveError> {
    let count = varint::read_u64(r)?;
    if count > table_len / MIN_TABLE_ENTRY_LEN {
        return Err(invalid(format!(
            "entry count {count} does not fit in a {table_len}-byte table"
        )));
    }

    let mut entries: Vec<TableEntry> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let entry = TableEntry::decode(r)?;
        if entry.path.is_empty() {
            return Err(invalid("empty entry path"));
        }
        if let Some(prev) = entries.last() {
            if prev.path >= entry.path {
                return Err(invalid(format!(
                    "entry {:?} out of order after {:?}",
                    entry.path, prev.path
                )));
            }
        }
        if entry.stored_len > entry.size {
            return Err(invalid(format!(
                "entry {:?} stored larger than its content",
                entry.path
            )));
        }
        let end = entry.offset.checked_add(entry.stored_len);
        if entry.offset < payload_start || end.is_none_or(|end| end > table_offset) {
            return Err(invalid(format!(
                "entry {:?} lies outside the payload region",
                entry.path
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}
