//! pkgdelta: build delta packages between two releases of a package.
//!
//! A delta package carries the new release's full metadata, the release it
//! upgrades from, and only the payload files that were added or changed.
//!
//! The crate provides:
//! - A package container with SHA-256 content ids (`archive`)
//! - Release ordering checks (`gate`)
//! - Manifest differencing (`diff`)
//! - Delta archive assembly (`assembler`)
//! - The orchestrating `DeltaProducer` (`producer`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use pkgdelta::{DeltaProducer, ProducerOptions};
//! use pkgdelta::archive::{PackageArchive, PackageFile};
//!
//! let mut producer = DeltaProducer::with_options(
//!     "example",
//!     "nano-4.6-117-1-x86_64.pkg",
//!     "nano-4.7-118-1-x86_64.pkg",
//!     ProducerOptions::in_dir("deltas"),
//! )?;
//! let path = producer.create()?;
//! producer.close();
//!
//! let delta = PackageFile::open(&path)?;
//! assert_eq!(delta.metadata().release, 118);
//! assert_eq!(delta.delta_info().map(|d| d.base_release), Some(117));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod archive;
pub mod assembler;
pub mod config;
pub mod diff;
pub mod error;
pub mod gate;
pub mod producer;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{OverwritePolicy, ProducerOptions};
pub use error::{ArchiveError, DeltaError};
pub use producer::{DeltaProducer, ProducerState};
