// Package container reader.
//
// Parses header, trailer and entry table eagerly at open time; entry content
// is streamed on demand and verified against its SHA-256 content id.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::compression::{self, CompressBackend, PayloadCompression};
use super::format::{self, ArchiveHeader, TRAILER_LEN, TableEntry};
use super::{ContentId, DeltaInfo, Manifest, ManifestEntry, PackageArchive, PackageMeta};
use crate::error::ArchiveError;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// A package archive on disk.
pub type PackageFile = PackageReader<BufReader<File>>;

/// A package archive over any seekable byte source.
pub struct PackageReader<R> {
    inner: Option<R>,
    meta: PackageMeta,
    delta: Option<DeltaInfo>,
    manifest: Manifest,
    /// Parallel to `manifest`.
    table: Vec<TableEntry>,
    compression_id: u8,
    backend: Box<dyn CompressBackend>,
}

impl PackageFile {
    /// Open and parse the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::with_capacity(BUF_SIZE, file))
    }
}

impl<R: Read + Seek> PackageReader<R> {
    /// Parse an archive from the start of `inner`.
    pub fn new(mut inner: R) -> Result<Self, ArchiveError> {
        inner.seek(SeekFrom::Start(0))?;
        let header = ArchiveHeader::decode(&mut inner)?;
        let payload_start = inner.stream_position()?;

        let file_len = inner.seek(SeekFrom::End(0))?;
        if file_len < payload_start + TRAILER_LEN {
            return Err(ArchiveError::Invalid("archive truncated before trailer".into()));
        }
        let table_end = file_len - TRAILER_LEN;

        inner.seek(SeekFrom::Start(table_end))?;
        let mut trailer = [0u8; TRAILER_LEN as usize];
        inner.read_exact(&mut trailer)?;
        let table_offset = format::decode_trailer(&trailer)?;
        if table_offset < payload_start || table_offset > table_end {
            return Err(ArchiveError::Invalid(format!(
                "entry table offset {table_offset} out of range"
            )));
        }

        inner.seek(SeekFrom::Start(table_offset))?;
        let table_len = table_end - table_offset;
        let mut table_reader = (&mut inner).take(table_len);
        let table =
            format::decode_table(&mut table_reader, payload_start, table_offset, table_len)?;
        if table_reader.limit() != 0 {
            return Err(ArchiveError::Invalid(
                "trailing bytes after entry table".into(),
            ));
        }

        let meta = PackageMeta::from_json(&header.meta)?;
        let backend = compression::backend_for_id(header.compression_id)?;
        let manifest = Manifest::from_sorted(
            table
                .iter()
                .map(|e| ManifestEntry {
                    path: e.path.clone(),
                    content_id: e.content_id,
                    size: e.size,
                })
                .collect(),
        )?;

        log::trace!(
            "opened package {} ({} entries, compressor {})",
            meta.identity(),
            manifest.len(),
            header.compression_id
        );

        Ok(Self {
            inner: Some(inner),
            meta,
            delta: header.delta,
            manifest,
            table,
            compression_id: header.compression_id,
            backend,
        })
    }

    /// Compressor ID from the archive header.
    pub fn compression_id(&self) -> u8 {
        self.compression_id
    }
}

impl<R: Read + Seek> PackageArchive for PackageReader<R> {
    fn metadata(&self) -> &PackageMeta {
        &self.meta
    }

    fn delta_info(&self) -> Option<&DeltaInfo> {
        self.delta.as_ref()
    }

    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn read_entry(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64, ArchiveError> {
        let inner = self.inner.as_mut().ok_or(ArchiveError::Closed)?;
        let idx = self
            .manifest
            .position(path)
            .ok_or_else(|| ArchiveError::MissingEntry(path.to_string()))?;
        let entry = &self.table[idx];

        inner.seek(SeekFrom::Start(entry.offset))?;
        let mut out = HashingWriter {
            inner: sink,
            hasher: Sha256::new(),
        };
        compression::decompress_entry(
            self.backend.as_ref(),
            inner,
            entry.stored_len,
            entry.size,
            &mut out,
        )?;

        let actual = ContentId(out.hasher.finalize().into());
        if actual != entry.content_id {
            return Err(ArchiveError::ChecksumMismatch {
                path: entry.path.clone(),
                expected: entry.content_id,
                actual,
            });
        }
        Ok(entry.size)
    }

    fn payload_compression(&self) -> PayloadCompression {
        PayloadCompression::from_id(self.compression_id).unwrap_or_default()
    }

    fn close(&mut self) {
        self.inner = None;
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// Hashes everything that reaches `inner`.
struct HashingWriter<'a> {
    inner: &'a mut dyn Write,
    hasher: Sha256,
}

impl Write for HashingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
