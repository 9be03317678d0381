//! Delta production: open, validate, diff, assemble, close.
//!
//! ```no_run
//! use pkgdelta::DeltaProducer;
//!
//! let mut producer = DeltaProducer::new(
//!     "nightly",
//!     "nano-4.6-117-1-x86_64.pkg",
//!     "nano-4.7-118-1-x86_64.pkg",
//! )?;
//! let delta = producer.create()?;
//! println!("wrote {}", delta.display());
//! producer.close();
//! # Ok::<(), pkgdelta::DeltaError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::archive::{PackageArchive, PackageFile};
use crate::assembler::{AssemblyStats, DeltaAssembler};
use crate::config::ProducerOptions;
use crate::diff::{self, DifferenceSet};
use crate::error::DeltaError;
use crate::gate::{self, DeltaDescriptor};

/// Lifecycle of a `DeltaProducer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerState {
    /// Both archives open and the release gate passed.
    Validated,
    /// A delta was written to the contained path.
    Created(PathBuf),
    /// The last `create` failed; its partial output was removed.
    Failed,
    /// Archives released. Terminal.
    Closed,
}

/// Produces one delta archive from an old and a new package.
///
/// Construction fails fast: both archives are opened and checked before a
/// producer exists, so a constructor error never leaves handles open.
/// `close()` is idempotent and also runs on drop.
pub struct DeltaProducer<A: PackageArchive = PackageFile> {
    label: String,
    old: A,
    new: A,
    descriptor: DeltaDescriptor,
    options: ProducerOptions,
    state: ProducerState,
    difference: Option<DifferenceSet>,
    stats: Option<AssemblyStats>,
}

impl DeltaProducer<PackageFile> {
    /// Open `old_path` and `new_path` with default options.
    pub fn new(
        label: impl Into<String>,
        old_path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
    ) -> Result<Self, DeltaError> {
        Self::with_options(label, old_path, new_path, ProducerOptions::default())
    }

    pub fn with_options(
        label: impl Into<String>,
        old_path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
        options: ProducerOptions,
    ) -> Result<Self, DeltaError> {
        let label = label.into();
        let (old_path, new_path) = (old_path.as_ref(), new_path.as_ref());

        let old = PackageFile::open(old_path).map_err(|e| {
            log::debug!("[{label}] cannot open old package {}: {e}", old_path.display());
            DeltaError::from_open(old_path, e)
        })?;
        // `old` is dropped, closing its file, if the new package fails to open.
        let new = PackageFile::open(new_path).map_err(|e| {
            log::debug!("[{label}] cannot open new package {}: {e}", new_path.display());
            DeltaError::from_open(new_path, e)
        })?;

        Self::from_archives(label, old, new, options)
    }
}

impl<A: PackageArchive> DeltaProducer<A> {
    /// Validate two already-open archives. On error both are closed.
    ///
    /// Both must be full packages: a delta input is rejected with
    /// `DeltaInput`, since every file it does not carry would be reported
    /// as removed.
    pub fn from_archives(
        label: impl Into<String>,
        mut old: A,
        mut new: A,
        options: ProducerOptions,
    ) -> Result<Self, DeltaError> {
        let label = label.into();
        let checked = full_package(&old)
            .and_then(|()| full_package(&new))
            .and_then(|()| gate::validate(&old.identity(), &new.identity()));
        let descriptor = match checked {
            Ok(d) => d,
            Err(e) => {
                log::debug!("[{label}] rejected: {e}");
                old.close();
                new.close();
                return Err(e);
            }
        };

        log::debug!(
            "[{label}] validated {} release {} -> {}",
            descriptor.identity.name,
            descriptor.base_release,
            descriptor.target_release
        );

        Ok(Self {
            label,
            old,
            new,
            descriptor,
            options,
            state: ProducerState::Validated,
            difference: None,
            stats: None,
        })
    }

    /// Compute the difference and write the delta. Returns its path.
    ///
    /// Calling again after success returns the same path without rewriting,
    /// as long as the file is still there.
    pub fn create(&mut self) -> Result<PathBuf, DeltaError> {
        match &self.state {
            ProducerState::Closed => return Err(DeltaError::AlreadyClosed),
            ProducerState::Created(path) if path.exists() => {
                log::debug!(
                    "[{}] delta already created at {}",
                    self.label,
                    path.display()
                );
                return Ok(path.clone());
            }
            _ => {}
        }

        let difference = diff::diff(self.old.manifest(), self.new.manifest());
        log::debug!(
            "[{}] {} added, {} changed, {} unchanged, {} removed",
            self.label,
            difference.added.len(),
            difference.changed.len(),
            difference.unchanged.len(),
            difference.removed.len()
        );
        if difference.is_metadata_only() {
            log::warn!(
                "[{}] payload of {} is identical across releases {} and {}; \
                 producing a metadata-only delta",
                self.label,
                self.descriptor.identity.name,
                self.descriptor.base_release,
                self.descriptor.target_release
            );
        }

        let compression = self
            .options
            .compression
            .clone()
            .unwrap_or_else(|| self.new.payload_compression());
        let assembler = DeltaAssembler::new(compression, self.options.overwrite);
        let output = self.output_path();

        match assembler.assemble(&self.descriptor, &difference, &mut self.new, &output) {
            Ok(stats) => {
                log::info!(
                    "[{}] wrote {} ({} entries, {} bytes)",
                    self.label,
                    stats.path.display(),
                    stats.entries,
                    stats.archive_size
                );
                self.state = ProducerState::Created(stats.path.clone());
                self.difference = Some(difference);
                let path = stats.path.clone();
                self.stats = Some(stats);
                Ok(path)
            }
            Err(e) => {
                log::warn!("[{}] delta creation failed: {e}", self.label);
                self.state = ProducerState::Failed;
                self.difference = None;
                self.stats = None;
                Err(e)
            }
        }
    }

    /// Where `create` writes the delta.
    pub fn output_path(&self) -> PathBuf {
        self.options.output_dir.join(self.descriptor.output_name())
    }

    /// Release both archives. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == ProducerState::Closed {
            return;
        }
        self.old.close();
        self.new.close();
        self.state = ProducerState::Closed;
        log::debug!("[{}] closed", self.label);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptor(&self) -> &DeltaDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &ProducerState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ProducerState::Closed
    }

    /// Difference set of the last successful `create`.
    pub fn difference(&self) -> Option<&DifferenceSet> {
        self.difference.as_ref()
    }

    /// Assembly statistics of the last successful `create`.
    pub fn stats(&self) -> Option<&AssemblyStats> {
        self.stats.as_ref()
    }
}

fn full_package<A: PackageArchive>(archive: &A) -> Result<(), DeltaError> {
    match archive.delta_info() {
        Some(info) => Err(DeltaError::DeltaInput {
            package: archive.identity().to_string(),
            base_release: info.base_release,
        }),
        None => Ok(()),
    }
}

impl<A: PackageArchive> Drop for DeltaProducer<A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<A: PackageArchive> std::fmt::Debug for DeltaProducer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaProducer")
            .field("label", &self.label)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
