#![no_main]
use libfuzzer_sys::fuzz_target;
use pkgdelta::archive::{PackageArchive, PackageReader};

fuzz_target!(|data: &[u8]| {
    let Ok(mut pkg) = PackageReader::new(std::io::Cursor::new(data)) else {
        return;
    };
    let paths: Vec<String> = pkg.manifest().iter().map(|e| e.path.clone()).collect();
    for path in paths {
        let _ = pkg.read_entry(&path, &mut std::io::sink());
    }
});
