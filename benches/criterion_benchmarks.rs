use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pkgdelta::archive::compression::PayloadCompression;
use pkgdelta::archive::{
    ContentId, Manifest, ManifestEntry, PackageMeta, PackageReader, PackageWriter,
};
use pkgdelta::diff::diff;
use pkgdelta::{DeltaProducer, ProducerOptions};
use std::io::Cursor;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

/// `count` files of `size` bytes; every `stride`-th file differs by seed.
fn gen_files(count: usize, size: usize, stride: usize, seed: u64) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let s = if i % stride.max(1) == 0 { seed } else { 0 };
            (format!("usr/lib/pkg/file{i:06}"), gen_data(size, i as u64 + s))
        })
        .collect()
}

fn manifest(files: &[(String, Vec<u8>)]) -> Manifest {
    Manifest::from_sorted(
        files
            .iter()
            .map(|(p, d)| ManifestEntry {
                path: p.clone(),
                content_id: ContentId::of(d),
                size: d.len() as u64,
            })
            .collect(),
    )
    .unwrap()
}

fn package(
    release: u64,
    files: &[(String, Vec<u8>)],
    compression: &PayloadCompression,
) -> PackageReader<Cursor<Vec<u8>>> {
    let meta = PackageMeta::new("bench", "1.0", release, "x86_64");
    let mut w = PackageWriter::new(Vec::new(), &meta, None, compression).unwrap();
    for (p, d) in files {
        w.add_entry(p, d).unwrap();
    }
    PackageReader::new(Cursor::new(w.finish().unwrap().0)).unwrap()
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for count in [100usize, 1_000, 10_000] {
        let old = manifest(&gen_files(count, 16, 10, 0));
        let new = manifest(&gen_files(count, 16, 10, 7));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(diff(&old, &new)))
        });
    }
    group.finish();
}

fn bench_create(c: &mut Criterion) {
    let dir = std::env::temp_dir().join("pkgdelta-bench");
    let old_files = gen_files(200, 16 * 1024, 4, 0);
    let new_files = gen_files(200, 16 * 1024, 4, 9);

    let mut group = c.benchmark_group("create");
    group.sample_size(10);
    let compressions = [
        ("stored", PayloadCompression::None),
        #[cfg(feature = "zlib")]
        ("zlib", PayloadCompression::Zlib { level: 6 }),
    ];
    for (name, compression) in compressions {
        group.bench_function(name, |b| {
            b.iter(|| {
                let opts = ProducerOptions {
                    compression: Some(compression.clone()),
                    ..ProducerOptions::in_dir(&dir)
                };
                let mut producer = DeltaProducer::from_archives(
                    "bench",
                    package(1, &old_files, &PayloadCompression::None),
                    package(2, &new_files, &PayloadCompression::None),
                    opts,
                )
                .unwrap();
                let path = producer.create().unwrap();
                producer.close();
                black_box(std::fs::remove_file(path).ok())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_diff, bench_create);
criterion_main!(benches);
