// Package container writer.
//
// Entries are streamed out in path order; the entry table and trailer are
// appended by `finish()`. `AtomicFile` gives the on-disk variant
// write-to-temp-then-rename semantics so a failed build leaves nothing behind.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::compression::{self, CompressBackend, PayloadCompression};
use super::format::{self, ArchiveHeader, TableEntry};
use super::{ContentId, DeltaInfo, PackageMeta};
use crate::error::ArchiveError;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// Suffix of the temporary file an `AtomicFile` writes to.
pub const PARTIAL_SUFFIX: &str = ".partial";

// ---------------------------------------------------------------------------
// PackageWriter
// ---------------------------------------------------------------------------

/// Streaming package writer.
///
/// # Example
/// ```no_run
/// use pkgdelta::archive::{PackageMeta, PackageWriter};
/// use pkgdelta::archive::compression::PayloadCompression;
///
/// let meta = PackageMeta::new("nano", "4.7", 118, "x86_64");
/// let mut w = PackageWriter::new(Vec::new(), &meta, None, &PayloadCompression::None).unwrap();
/// w.add_entry("usr/bin/nano", b"binary").unwrap();
/// let (bytes, _len) = w.finish().unwrap();
/// ```
pub struct PackageWriter<W: Write> {
    out: W,
    position: u64,
    backend: Box<dyn CompressBackend>,
    table: Vec<TableEntry>,
    /// An entry was abandoned half-written; the payload is no longer aligned
    /// with the table.
    poisoned: bool,
}

impl<W: Write> PackageWriter<W> {
    /// Write the header. `delta` marks the archive as a delta package.
    pub fn new(
        mut out: W,
        meta: &PackageMeta,
        delta: Option<&DeltaInfo>,
        compression: &PayloadCompression,
    ) -> Result<Self, ArchiveError> {
        meta.validate()?;
        let backend = compression.backend();
        let header = ArchiveHeader {
            compression_id: backend.id(),
            delta: delta.cloned(),
            meta: meta.to_json()?,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf)?;
        out.write_all(&buf)?;

        Ok(Self {
            out,
            position: buf.len() as u64,
            backend,
            table: Vec::new(),
            poisoned: false,
        })
    }

    /// Start an entry. Paths must be strictly increasing.
    ///
    /// Content written to the returned [`EntryWriter`] is hashed as it
    /// arrives. Uncompressed archives stream it straight to the output; with a
    /// compressor the entry is buffered so the smaller form can be kept.
    pub fn begin_entry(&mut self, path: &str) -> Result<EntryWriter<'_, W>, ArchiveError> {
        if self.poisoned {
            return Err(ArchiveError::Invalid(
                "previous entry was not finished".into(),
            ));
        }
        if path.is_empty() {
            return Err(ArchiveError::Invalid("empty entry path".into()));
        }
        if let Some(prev) = self.table.last() {
            if prev.path.as_str() >= path {
                return Err(ArchiveError::OutOfOrder {
                    path: path.to_string(),
                    previous: prev.path.clone(),
                });
            }
        }

        let buffer = (self.backend.id() != compression::STORED_ID).then(Vec::new);
        Ok(EntryWriter {
            path: path.to_string(),
            offset: self.position,
            size: 0,
            hasher: Sha256::new(),
            buffer,
            done: false,
            writer: self,
        })
    }

    /// Append one entry.
    pub fn add_entry(&mut self, path: &str, data: &[u8]) -> Result<ContentId, ArchiveError> {
        let mut entry = self.begin_entry(path)?;
        entry.write_all(data)?;
        entry.finish()
    }

    /// Append one entry streamed from `reader`.
    pub fn add_entry_from<R: Read>(
        &mut self,
        path: &str,
        mut reader: R,
    ) -> Result<ContentId, ArchiveError> {
        let mut entry = self.begin_entry(path)?;
        io::copy(&mut reader, &mut entry)?;
        entry.finish()
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> usize {
        self.table.len()
    }

    /// Write the entry table and trailer. Returns the sink and the total
    /// archive length.
    pub fn finish(mut self) -> Result<(W, u64), ArchiveError> {
        if self.poisoned {
            return Err(ArchiveError::Invalid(
                "cannot finish archive after an abandoned entry".into(),
            ));
        }
        let mut buf = Vec::new();
        format::encode_table(&mut buf, &self.table, self.position)?;
        self.out.write_all(&buf)?;
        self.out.flush()?;
        Ok((self.out, self.position + buf.len() as u64))
    }
}

/// One entry being written. Call [`finish`](Self::finish) to record it;
/// dropping it unfinished poisons the archive.
pub struct EntryWriter<'a, W: Write> {
    writer: &'a mut PackageWriter<W>,
    path: String,
    offset: u64,
    size: u64,
    hasher: Sha256,
    /// Raw content, kept only when a compressor is configured.
    buffer: Option<Vec<u8>>,
    done: bool,
}

impl<W: Write> EntryWriter<'_, W> {
    /// Write the stored form and add the entry to the table.
    pub fn finish(mut self) -> Result<ContentId, ArchiveError> {
        let content_id = ContentId(std::mem::take(&mut self.hasher).finalize().into());
        let stored_len = match self.buffer.take() {
            Some(data) => {
                let stored = compression::compress_entry(self.writer.backend.as_ref(), &data)?;
                self.writer.out.write_all(&stored)?;
                stored.len() as u64
            }
            None => self.size,
        };

        self.writer.table.push(TableEntry {
            path: std::mem::take(&mut self.path),
            size: self.size,
            stored_len,
            offset: self.offset,
            content_id,
        });
        self.writer.position = self.offset + stored_len;
        self.done = true;
        Ok(content_id)
    }
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.buffer {
            Some(data) => data.extend_from_slice(buf),
            None => self.writer.out.write_all(buf)?,
        }
        self.hasher.update(buf);
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for EntryWriter<'_, W> {
    fn drop(&mut self) {
        if !self.done {
            self.writer.poisoned = true;
        }
    }
}

// ---------------------------------------------------------------------------
// AtomicFile
// ---------------------------------------------------------------------------

/// A file written under a unique `.<name>.XXXXXX.partial` temporary next to
/// `target` and moved into place by `commit()`. Dropping it uncommitted
/// deletes the temporary, so concurrent writers never share one.
///
/// A process crash between create and commit leaves the `.partial` file in
/// place.
pub struct AtomicFile {
    target: PathBuf,
    file: BufWriter<NamedTempFile>,
}

impl AtomicFile {
    pub fn create(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut prefix = OsString::from(".");
        if let Some(name) = target.file_name() {
            prefix.push(name);
            prefix.push(".");
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(PARTIAL_SUFFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o644));
        }
        let temp = builder.tempfile_in(&dir)?;

        Ok(Self {
            target,
            file: BufWriter::with_capacity(BUF_SIZE, temp),
        })
    }

    pub fn temp_path(&self) -> &Path {
        self.file.get_ref().path()
    }

    /// Flush, sync and move the file into place, replacing any existing file.
    pub fn commit(self) -> io::Result<PathBuf> {
        self.persist(true)
    }

    /// Like [`commit`](Self::commit) but fails with `AlreadyExists` instead of
    /// replacing an existing target.
    pub fn commit_new(self) -> io::Result<PathBuf> {
        self.persist(false)
    }

    fn persist(self, replace: bool) -> io::Result<PathBuf> {
        let temp = self.file.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        let persisted: Result<File, _> = if replace {
            temp.persist(&self.target)
        } else {
            temp.persist_noclobber(&self.target)
        };
        persisted.map_err(|e| e.error)?;
        Ok(self.target)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{PackageArchive, PackageFile};

    fn meta() -> PackageMeta {
        PackageMeta::new("nano", "4.6", 117, "x86_64")
    }

    fn partial_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(PARTIAL_SUFFIX))
            .collect()
    }

    #[test]
    fn rejects_out_of_order_entries() {
        let mut w = PackageWriter::new(Vec::new(), &meta(), None, &PayloadCompression::None)
            .unwrap();
        w.add_entry("b", b"1").unwrap();
        assert!(matches!(
            w.add_entry("a", b"2"),
            Err(ArchiveError::OutOfOrder { .. })
        ));
        assert!(matches!(
            w.add_entry("b", b"3"),
            Err(ArchiveError::OutOfOrder { .. })
        ));
        assert!(w.add_entry("", b"4").is_err());
        assert_eq!(w.entries(), 1);
    }

    #[test]
    fn rejects_invalid_metadata() {
        let bad = PackageMeta::new("", "4.6", 117, "x86_64");
        assert!(PackageWriter::new(Vec::new(), &bad, None, &PayloadCompression::None).is_err());
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let build = || {
            let mut w = PackageWriter::new(Vec::new(), &meta(), None, &PayloadCompression::None)
                .unwrap();
            w.add_entry("a", b"alpha").unwrap();
            w.add_entry_from("b", &b"beta"[..]).unwrap();
            w.finish().unwrap()
        };
        let (first, len) = build();
        assert_eq!(first.len() as u64, len);
        assert_eq!(first, build().0);
    }

    #[test]
    fn streamed_entries_match_whole_entries() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let whole = {
            let mut w = PackageWriter::new(Vec::new(), &meta(), None, &PayloadCompression::None)
                .unwrap();
            w.add_entry("usr/bin/nano", &data).unwrap();
            w.finish().unwrap().0
        };
        let streamed = {
            let mut w = PackageWriter::new(Vec::new(), &meta(), None, &PayloadCompression::None)
                .unwrap();
            let mut entry = w.begin_entry("usr/bin/nano").unwrap();
            for chunk in data.chunks(4096) {
                entry.write_all(chunk).unwrap();
            }
            assert_eq!(entry.finish().unwrap(), ContentId::of(&data));
            w.finish().unwrap().0
        };
        assert_eq!(whole, streamed);
    }

    #[test]
    fn abandoned_entry_poisons_writer() {
        let mut w = PackageWriter::new(Vec::new(), &meta(), None, &PayloadCompression::None)
            .unwrap();
        {
            let mut entry = w.begin_entry("a").unwrap();
            entry.write_all(b"half").unwrap();
        }
        assert!(matches!(w.add_entry("b", b"x"), Err(ArchiveError::Invalid(_))));
        assert!(w.finish().is_err());
    }

    #[test]
    fn atomic_file_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sub/nano.pkg");
        let file = AtomicFile::create(&target).unwrap();
        assert!(file.temp_path().exists());
        assert!(file.temp_path().to_string_lossy().ends_with(PARTIAL_SUFFIX));
        let temp = file.temp_path().to_path_buf();

        let mut w = PackageWriter::new(file, &meta(), None, &PayloadCompression::None).unwrap();
        w.add_entry("usr/bin/nano", b"elf").unwrap();
        let (file, _) = w.finish().unwrap();
        let path = file.commit().unwrap();

        assert_eq!(path, target);
        assert!(!temp.exists());
        let pkg = PackageFile::open(&path).unwrap();
        assert_eq!(pkg.identity().release, 117);
        assert_eq!(pkg.manifest().len(), 1);
    }

    #[test]
    fn atomic_file_dropped_uncommitted_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nano.pkg");
        {
            let mut file = AtomicFile::create(&target).unwrap();
            file.write_all(b"partial").unwrap();
        }
        assert!(!target.exists());
        assert!(partial_files(dir.path()).is_empty());
    }

    #[test]
    fn concurrent_atomic_files_use_distinct_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nano-117-118-x86_64.delta");
        let a = AtomicFile::create(&target).unwrap();
        let b = AtomicFile::create(&target).unwrap();
        assert_ne!(a.temp_path(), b.temp_path());

        drop(a);
        assert!(b.temp_path().exists());
        b.commit().unwrap();
        assert!(target.exists());
        assert!(partial_files(dir.path()).is_empty());
    }

    #[test]
    fn commit_new_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nano.pkg");
        fs::write(&target, b"keep me").unwrap();

        let mut file = AtomicFile::create(&target).unwrap();
        file.write_all(b"replacement").unwrap();
        let err = file.commit_new().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&target).unwrap(), b"keep me");
        assert!(partial_files(dir.path()).is_empty());
    }
}
