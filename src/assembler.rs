// Writes the delta archive: new metadata, base release, changed entries.

use std::io;
use std::path::{Path, PathBuf};

use crate::archive::compression::{self, PayloadCompression};
use crate::archive::{AtomicFile, ContentId, DeltaInfo, PackageArchive, PackageWriter};
use crate::config::OverwritePolicy;
use crate::diff::DifferenceSet;
use crate::error::{ArchiveError, DeltaError};
use crate::gate::DeltaDescriptor;

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyStats {
    pub path: PathBuf,
    /// Entries packaged (`added ∪ changed`).
    pub entries: usize,
    /// Uncompressed bytes of packaged entries.
    pub payload_bytes: u64,
    /// Size of the written archive.
    pub archive_size: u64,
}

/// Builds delta archives from a new package and a difference set.
#[derive(Debug, Clone, Default)]
pub struct DeltaAssembler {
    compression: PayloadCompression,
    overwrite: OverwritePolicy,
}

impl DeltaAssembler {
    pub fn new(compression: PayloadCompression, overwrite: OverwritePolicy) -> Self {
        Self {
            compression,
            overwrite,
        }
    }

    /// Write the delta to `output`.
    ///
    /// The archive is built in a unique `.partial` temporary next to `output`
    /// and renamed into place only once complete; on any error the temporary
    /// is removed. Entries are streamed from `new_archive` into the writer.
    pub fn assemble<A: PackageArchive + ?Sized>(
        &self,
        descriptor: &DeltaDescriptor,
        difference: &DifferenceSet,
        new_archive: &mut A,
        output: &Path,
    ) -> Result<AssemblyStats, DeltaError> {
        if self.overwrite == OverwritePolicy::Fail && output.exists() {
            return Err(DeltaError::OutputExists(output.to_path_buf()));
        }
        let fail = |e: ArchiveError| DeltaError::assembly(output, e);

        let compressor_id = self.compression.backend().id();
        if !compression::is_readable_id(compressor_id) {
            return Err(fail(ArchiveError::Unsupported(format!(
                "compressor ID {compressor_id} cannot be opened by this build"
            ))));
        }

        let meta = new_archive.metadata().clone();
        let manifest = new_archive.manifest();
        let expected = difference
            .payload()
            .map(|path| {
                manifest
                    .get(path)
                    .map(|e| (e.path.clone(), e.content_id))
                    .ok_or_else(|| fail(ArchiveError::MissingEntry(path.to_string())))
            })
            .collect::<Result<Vec<(String, ContentId)>, _>>()?;

        let info = DeltaInfo {
            base_release: descriptor.base_release,
            removed: difference.removed.iter().cloned().collect(),
        };

        let file = AtomicFile::create(output).map_err(|e| fail(e.into()))?;
        let mut writer =
            PackageWriter::new(file, &meta, Some(&info), &self.compression).map_err(fail)?;

        let mut payload_bytes = 0u64;
        for (path, expected_id) in &expected {
            let mut entry = writer.begin_entry(path).map_err(fail)?;
            let size = new_archive.read_entry(path, &mut entry).map_err(fail)?;
            let actual = entry.finish().map_err(fail)?;
            if actual != *expected_id {
                return Err(fail(ArchiveError::ChecksumMismatch {
                    path: path.clone(),
                    expected: *expected_id,
                    actual,
                }));
            }
            payload_bytes += size;
            log::trace!("packaged {path} ({size} bytes)");
        }

        let (file, archive_size) = writer.finish().map_err(fail)?;
        let committed = match self.overwrite {
            OverwritePolicy::Replace => file.commit(),
            OverwritePolicy::Fail => file.commit_new(),
        };
        let path = committed.map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                DeltaError::OutputExists(output.to_path_buf())
            } else {
                fail(e.into())
            }
        })?;

        Ok(AssemblyStats {
            path,
            entries: expected.len(),
            payload_bytes,
            archive_size,
        })
    }
}
