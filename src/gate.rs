// Release-ordering checks that decide whether a delta may be produced.

use crate::archive::PackageIdentity;
use crate::error::DeltaError;

/// File extension of produced delta archives.
pub const DELTA_EXTENSION: &str = "delta";

/// A validated old→new transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaDescriptor {
    pub base_release: u64,
    pub target_release: u64,
    /// Identity of the new package.
    pub identity: PackageIdentity,
}

impl DeltaDescriptor {
    /// `<name>-<oldRelease>-<newRelease>-<arch>.delta`
    pub fn output_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.{DELTA_EXTENSION}",
            self.identity.name, self.base_release, self.target_release, self.identity.architecture
        )
    }
}

/// Check that `new` is a strictly later release of the same package as `old`.
pub fn validate(
    old: &PackageIdentity,
    new: &PackageIdentity,
) -> Result<DeltaDescriptor, DeltaError> {
    if old.name != new.name {
        return Err(DeltaError::NameMismatch {
            old: old.name.clone(),
            new: new.name.clone(),
        });
    }
    if old.architecture != new.architecture {
        return Err(DeltaError::ArchitectureMismatch {
            old: old.architecture.clone(),
            new: new.architecture.clone(),
        });
    }
    if new.release <= old.release {
        return Err(DeltaError::NonMonotonicRelease {
            old: old.release,
            new: new.release,
        });
    }

    Ok(DeltaDescriptor {
        base_release: old.release,
        target_release: new.release,
        identity: new.clone(),
    })
}
