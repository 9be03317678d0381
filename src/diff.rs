// File-level difference between two package manifests.

use std::collections::{BTreeSet, HashMap};

use crate::archive::{ContentId, Manifest};

/// Partition of the union of two manifests' paths.
///
/// Every set is ordered by path, so iterating it is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DifferenceSet {
    /// Only in the new manifest.
    pub added: BTreeSet<String>,
    /// In both, with different content.
    pub changed: BTreeSet<String>,
    /// In both, with identical content. Not packaged into the delta.
    pub unchanged: BTreeSet<String>,
    /// Only in the old manifest.
    pub removed: BTreeSet<String>,
}

impl DifferenceSet {
    /// Paths the delta must carry: `added ∪ changed`, in path order.
    pub fn payload(&self) -> impl Iterator<Item = &str> {
        self.added.union(&self.changed).map(String::as_str)
    }

    pub fn payload_len(&self) -> usize {
        self.added.len() + self.changed.len()
    }

    /// Releases differ but the payload is identical.
    pub fn is_metadata_only(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compare `old` and `new` by path and content id.
pub fn diff(old: &Manifest, new: &Manifest) -> DifferenceSet {
    let old_ids: HashMap<&str, &ContentId> = old
        .iter()
        .map(|e| (e.path.as_str(), &e.content_id))
        .collect();

    let mut set = DifferenceSet::default();
    for entry in new {
        let bucket = match old_ids.get(entry.path.as_str()) {
            None => &mut set.added,
            Some(&id) if *id != entry.content_id => &mut set.changed,
            Some(_) => &mut set.unchanged,
        };
        bucket.insert(entry.path.clone());
    }

    set.removed = old
        .iter()
        .filter(|e| new.get(&e.path).is_none())
        .map(|e| e.path.clone())
        .collect();

    set
}
