use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use pkgdelta::archive::compression::PayloadCompression;
use pkgdelta::archive::{
    ContentId, Manifest, ManifestEntry, PackageArchive, PackageMeta, PackageReader, PackageWriter,
};
use pkgdelta::diff::diff;
use pkgdelta::{DeltaProducer, ProducerOptions};
use proptest::prelude::*;

type Files = BTreeMap<String, Vec<u8>>;

fn files() -> impl Strategy<Value = Files> {
    proptest::collection::btree_map(
        "[a-d]{1,2}(/[a-d]{1,2})?",
        proptest::collection::vec(0u8..4, 0..16),
        0..12,
    )
}

fn manifest(files: &Files) -> Manifest {
    Manifest::from_sorted(
        files
            .iter()
            .map(|(path, data)| ManifestEntry {
                path: path.clone(),
                content_id: ContentId::of(data),
                size: data.len() as u64,
            })
            .collect(),
    )
    .unwrap()
}

fn package(release: u64, files: &Files) -> PackageReader<Cursor<Vec<u8>>> {
    let meta = PackageMeta::new("nano", "4.7", release, "x86_64");
    let mut w = PackageWriter::new(Vec::new(), &meta, None, &PayloadCompression::None).unwrap();
    for (path, data) in files {
        w.add_entry(path, data).unwrap();
    }
    PackageReader::new(Cursor::new(w.finish().unwrap().0)).unwrap()
}

fn contents<A: PackageArchive>(pkg: &mut A) -> Files {
    let paths: Vec<String> = pkg.manifest().iter().map(|e| e.path.clone()).collect();
    paths
        .into_iter()
        .map(|p| {
            let mut data = Vec::new();
            pkg.read_entry(&p, &mut data).unwrap();
            (p, data)
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_difference_partitions_all_paths(old in files(), new in files()) {
        let d = diff(&manifest(&old), &manifest(&new));

        let union: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        let total = d.added.len() + d.changed.len() + d.unchanged.len() + d.removed.len();
        prop_assert_eq!(total, union.len());

        let mut seen = BTreeSet::new();
        for set in [&d.added, &d.changed, &d.unchanged, &d.removed] {
            for path in set {
                prop_assert!(seen.insert(path.clone()), "{} in two sets", path);
            }
        }

        for path in &d.changed {
            prop_assert_ne!(&old[path], &new[path]);
        }
        for path in &d.unchanged {
            prop_assert_eq!(&old[path], &new[path]);
        }
    }

    #[test]
    fn prop_delta_over_old_reproduces_new(old in files(), new in files()) {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = DeltaProducer::from_archives(
            "prop",
            package(1, &old),
            package(2, &new),
            ProducerOptions::in_dir(dir.path()),
        )
        .unwrap();
        let path = producer.create().unwrap();
        producer.close();

        let mut delta = pkgdelta::archive::PackageFile::open(&path).unwrap();
        let mut installed = old.clone();
        for removed in &delta.delta_info().unwrap().removed {
            installed.remove(removed);
        }
        installed.extend(contents(&mut delta));
        prop_assert_eq!(installed, new);
    }
}
