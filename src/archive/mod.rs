//! Package container: metadata, manifest and payload entries.
//!
//! The delta pipeline only talks to packages through the [`PackageArchive`]
//! trait. [`PackageFile`] is the built-in implementation backed by the
//! binary container described in [`format`]; [`PackageWriter`] produces it.

pub mod compression;
pub mod format;
pub mod reader;
pub mod varint;
pub mod writer;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ArchiveError;
use compression::PayloadCompression;

pub use reader::{PackageFile, PackageReader};
pub use writer::{AtomicFile, EntryWriter, PackageWriter};

// ---------------------------------------------------------------------------
// Identity and metadata
// ---------------------------------------------------------------------------

/// The fields that decide whether two packages can be related by a delta.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub release: u64,
    pub architecture: String,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.name, self.version, self.release, self.architecture
        )
    }
}

/// Full package metadata as stored in the archive header.
///
/// Unknown fields are kept in `extra` and written back unchanged, so a delta
/// carries the new package's metadata verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
    pub release: u64,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PackageMeta {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: u64,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release,
            architecture: architecture.into(),
            summary: String::new(),
            description: String::new(),
            homepage: None,
            license: None,
            dependencies: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            name: self.name.clone(),
            version: self.version.clone(),
            release: self.release,
            architecture: self.architecture.clone(),
        }
    }

    /// Name and architecture end up in file names, so they must be plain
    /// path components.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        for (field, value) in [("name", &self.name), ("architecture", &self.architecture)] {
            if !is_plain_component(value) {
                return Err(ArchiveError::Invalid(format!(
                    "metadata {field} {value:?} is not a plain file name component"
                )));
            }
        }
        if self.version.is_empty() {
            return Err(ArchiveError::Invalid("metadata version is empty".into()));
        }
        Ok(())
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn from_json(data: &[u8]) -> Result<Self, ArchiveError> {
        let meta: Self = serde_json::from_slice(data)?;
        meta.validate()?;
        Ok(meta)
    }
}

fn is_plain_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

/// Marks an archive as a delta: the release it upgrades from and the paths
/// the upgrade deletes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaInfo {
    pub base_release: u64,
    pub removed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Content identity and manifest
// ---------------------------------------------------------------------------

/// SHA-256 of an entry's uncompressed content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub [u8; 32]);

impl ContentId {
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}

/// One payload file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub content_id: ContentId,
    pub size: u64,
}

/// Payload entries, unique by path and sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from entries already in strictly increasing path order.
    pub fn from_sorted(entries: Vec<ManifestEntry>) -> Result<Self, ArchiveError> {
        for pair in entries.windows(2) {
            if pair[0].path >= pair[1].path {
                return Err(ArchiveError::OutOfOrder {
                    path: pair[1].path.clone(),
                    previous: pair[0].path.clone(),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.position(path).map(|i| &self.entries[i])
    }

    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of uncompressed entry sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// PackageArchive trait
// ---------------------------------------------------------------------------

/// An open package the delta pipeline can read from.
///
/// Metadata and manifest are parsed at open time and stay available after
/// `close()`; only entry reads need the underlying handle.
pub trait PackageArchive {
    fn metadata(&self) -> &PackageMeta;

    fn identity(&self) -> PackageIdentity {
        self.metadata().identity()
    }

    /// `Some` when this archive is itself a delta.
    fn delta_info(&self) -> Option<&DeltaInfo>;

    fn manifest(&self) -> &Manifest;

    /// Stream the uncompressed content of `path` into `sink`, verifying it
    /// against the manifest. Returns the number of bytes written.
    ///
    /// Content reaches `sink` as it is decoded; on error the sink may already
    /// hold part of the entry and must be discarded.
    fn read_entry(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64, ArchiveError>;

    /// Compression the archive's payload was written with.
    fn payload_compression(&self) -> PayloadCompression {
        PayloadCompression::None
    }

    /// Release the underlying handle. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}
